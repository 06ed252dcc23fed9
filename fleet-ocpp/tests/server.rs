//! WebSocket server round trip against a local client

use std::sync::Arc;
use std::time::Duration;

use fleet_ocpp::{BroadcastNotifier, ChargePoint, ChargePointStore, Frame, MemoryStore, Server, ServerConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        Message,
    },
};

async fn start_server(store: Arc<MemoryStore>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(ServerConfig::default(), store, Arc::new(BroadcastNotifier::default()));
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

#[tokio::test]
async fn test_boot_over_websocket() {
    let store = Arc::new(MemoryStore::new());
    store
        .save(&ChargePoint::new(1, "ACE1", "Alfen BV", "NG920", "cp-ace1"))
        .unwrap();
    let addr = start_server(store.clone()).await;

    let mut request = format!("ws://{}/ocpp/ACE1", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("ocpp1.6"));
    let (mut ws, response) = connect_async(request).await.unwrap();
    assert_eq!(
        response.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
        "ocpp1.6"
    );

    let boot = json!([2, "1", "BootNotification", {
        "chargePointVendor": "Alfen BV",
        "chargePointModel": "NG920",
        "chargePointSerialNumber": "ACE1",
        "firmwareVersion": "5.5",
    }]);
    ws.send(Message::Text(boot.to_string().into())).await.unwrap();

    let reply = loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => break Frame::parse(&text).unwrap(),
            _ => continue,
        }
    };
    match reply {
        Frame::CallResult(result) => {
            assert_eq!(result.message_id, 1);
            assert_eq!(result.payload["status"], "Accepted");
        }
        other => panic!("Expected response, got {:?}", other),
    }
    assert!(store.find_by_id(1).unwrap().unwrap().is_online());

    ws.close(None).await.unwrap();

    // Teardown runs on the server's worker
    for _ in 0..50 {
        if !store.find_by_id(1).unwrap().unwrap().is_online() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Charge point still online after close");
}

#[tokio::test]
async fn test_unknown_subprotocol_gets_no_answer() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;

    let (mut ws, response) = connect_async(format!("ws://{}/ocpp/X", addr)).await.unwrap();
    assert!(response.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());

    let boot = json!([2, "1", "BootNotification", {
        "chargePointVendor": "Alfen BV",
        "chargePointModel": "NG920",
    }]);
    ws.send(Message::Text(boot.to_string().into())).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(reply.is_err(), "unassociated connection must stay silent");
}
