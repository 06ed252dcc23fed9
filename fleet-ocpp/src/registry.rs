//! Live connections and their workers
//!
//! Each connection negotiated to a known OCPP version gets one worker
//! task owning its [`ChargePointManager`]. Transport events are queued to
//! that worker, so frames of one connection are handled strictly in
//! arrival order while different connections run in parallel.

use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::manager::ChargePointManager;
use crate::observer::{Observer16, Observer201, OcppObserver, Provisioner};
use crate::ocpp::{OcppVersion, Session};

/// Transport event for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Inbound text frame
    Frame(String),
    /// Transport failure
    Error(String),
    /// Connection closed
    Closed,
}

struct ConnectionHandle {
    version: OcppVersion,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    worker: JoinHandle<()>,
}

/// Maps remote endpoints to their connection worker
pub struct ConnectionRegistry {
    provisioner: Provisioner,
    connections: Mutex<HashMap<SocketAddr, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// `subprotocol` is the raw `Sec-WebSocket-Protocol` header. Returns the
    /// negotiated version, or `None` when the connection stays unassociated
    /// (its frames are then dropped).
    pub fn on_connect(
        &self,
        peer: SocketAddr,
        subprotocol: Option<&str>,
        outgoing: mpsc::Sender<String>,
    ) -> Option<OcppVersion> {
        info!("New connection from {}", peer);
        let Some(version) = subprotocol.and_then(OcppVersion::negotiate) else {
            warn!("[{}] Unknown OCPP version: {:?}", peer, subprotocol);
            return None;
        };

        let mut connections = self.connections.lock();
        if connections.contains_key(&peer) {
            warn!("[{}] Already connected, ignoring", peer);
            return None;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session::new(peer.to_string(), outgoing);
        let worker = match version {
            OcppVersion::V16 => spawn_worker::<Observer16>(session, self.provisioner.clone(), events_rx),
            OcppVersion::V201 => spawn_worker::<Observer201>(session, self.provisioner.clone(), events_rx),
        };
        connections.insert(
            peer,
            ConnectionHandle {
                version,
                events: events_tx,
                worker,
            },
        );

        info!("[{}] Speaking {}", peer, version);
        Some(version)
    }

    /// Queue an inbound frame. Returns false if the peer is not registered.
    pub fn on_frame(&self, peer: &SocketAddr, text: String) -> bool {
        self.dispatch(peer, ConnectionEvent::Frame(text))
    }

    pub fn on_error(&self, peer: &SocketAddr, reason: String) -> bool {
        self.dispatch(peer, ConnectionEvent::Error(reason))
    }

    /// Unregister a connection. The returned worker finishes once teardown
    /// is done.
    pub fn on_close(&self, peer: &SocketAddr) -> Option<JoinHandle<()>> {
        let handle = self.connections.lock().remove(peer)?;
        if handle.events.send(ConnectionEvent::Closed).is_err() {
            debug!("[{}] Worker already gone", peer);
        }
        Some(handle.worker)
    }

    pub fn version(&self, peer: &SocketAddr) -> Option<OcppVersion> {
        self.connections.lock().get(peer).map(|handle| handle.version)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    fn dispatch(&self, peer: &SocketAddr, event: ConnectionEvent) -> bool {
        let connections = self.connections.lock();
        match connections.get(peer) {
            Some(handle) => handle.events.send(event).is_ok(),
            None => {
                debug!("[{}] No session, dropping {:?}", peer, event);
                false
            }
        }
    }
}

fn spawn_worker<O: OcppObserver>(
    session: Session,
    provisioner: Provisioner,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
) -> JoinHandle<()> {
    let manager = ChargePointManager::<O>::new(session, provisioner);
    tokio::spawn(run_worker(manager, events))
}

async fn run_worker<O: OcppObserver>(
    mut manager: ChargePointManager<O>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    let peer = manager.session().peer().to_string();

    while let Some(event) = events.recv().await {
        let result = match event {
            ConnectionEvent::Frame(text) => manager.process_frame(&text).await,
            ConnectionEvent::Error(reason) => manager.on_error(&reason),
            ConnectionEvent::Closed => break,
        };
        if let Err(e) = result {
            error!("[{}] Failed to handle event: {}", peer, e);
        }
    }

    if let Err(e) = manager.on_disconnection().await {
        error!("[{}] Teardown failed: {}", peer, e);
    }
    debug!("[{}] Worker stopped", peer);
}
