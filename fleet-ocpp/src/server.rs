//! OCPP WebSocket server
//!
//! Accepts charge point connections, negotiates the OCPP subprotocol and
//! pumps frames between the socket and the [`ConnectionRegistry`]:
//! - a writer task drains the session's outgoing channel into the socket
//! - the reader forwards text frames, errors and close to the registry

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        error::ProtocolError,
        handshake::server::{ErrorResponse, Request, Response},
        http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
        protocol::WebSocketConfig,
        Error as WsError, Message,
    },
};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::notify::Notifier;
use crate::observer::Provisioner;
use crate::ocpp::OcppVersion;
use crate::registry::ConnectionRegistry;
use crate::store::ChargePointStore;

/// Outgoing frames buffered per connection
const OUTGOING_BUFFER: usize = 64;

/// The provisioning server
pub struct Server {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<dyn ChargePointStore>, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config);
        let provisioner = Provisioner::new(store, notifier, config.clone());
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new(provisioner)),
        }
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Error> {
        info!("OCPP server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let registry = self.registry.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(registry, config, stream, peer).await {
                    warn!("[{}] Connection failed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    registry: Arc<ConnectionRegistry>,
    config: Arc<ServerConfig>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), Error> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);

    let mut requested: Option<String> = None;
    let callback = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        let header = req
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok());
        if let Some(header) = header {
            if let Some(version) = OcppVersion::negotiate(header) {
                resp.headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(version.subprotocol()));
            }
            requested = Some(header.to_string());
        }
        debug!("[{}] Handshake for {}", peer, req.uri());
        Ok(resp)
    };

    let ws_stream = accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;
    let (mut write, mut read) = ws_stream.split();

    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(OUTGOING_BUFFER);
    let associated = registry
        .on_connect(peer, requested.as_deref(), outgoing_tx.clone())
        .is_some();
    // Unassociated sockets stay open; the registry drops their frames
    let idle_sender = (!associated).then_some(outgoing_tx);

    // Ends once every sender (the session's included) is dropped
    let writer = tokio::spawn(async move {
        while let Some(text) = outgoing_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                warn!("[{}] Failed to send: {}", peer, e);
                break;
            }
        }
        if let Err(e) = write.close().await {
            debug!("[{}] Close: {}", peer, e);
        }
    });

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                registry.on_frame(&peer, text.to_string());
            }
            Ok(Message::Close(frame)) => {
                info!("[{}] Closed by peer: {:?}", peer, frame);
                break;
            }
            Ok(Message::Binary(_)) => debug!("[{}] Ignoring binary frame", peer),
            Ok(_) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)) => {
                warn!("[{}] Connection reset by peer", peer);
                break;
            }
            Err(e) => {
                error!("[{}] Transport error: {}", peer, e);
                registry.on_error(&peer, e.to_string());
                break;
            }
        }
    }

    drop(idle_sender);
    if let Some(worker) = registry.on_close(&peer) {
        if let Err(e) = worker.await {
            error!("[{}] Worker panicked: {}", peer, e);
        }
    }
    if let Err(e) = writer.await {
        error!("[{}] Writer panicked: {}", peer, e);
    }
    Ok(())
}
