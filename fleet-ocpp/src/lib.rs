//! # Fleet OCPP
//!
//! Provisioning engine for fleets of EV charge points speaking OCPP 1.6
//! or 2.0.1. Each device that boots is authenticated against the record
//! store, stepped through firmware upgrades one release at a time, then
//! configured key by key, and finally reset.
//!
//! ## Architecture
//!
//! ```text
//! Charge points
//!       │ WebSocket (ocpp1.6 / ocpp2.0.1)
//!       ▼
//! ┌───────────────────────────────────────────┐
//! │  Server ──► ConnectionRegistry            │
//! │               │ one worker per connection │
//! │               ▼                           │
//! │  ChargePointManager                       │
//! │   Frame codec ─► Session ─► Observer      │
//! │                  (ids,      (v16 / v201)  │
//! │                   pending)     │          │
//! └────────────────────────────────┼──────────┘
//!                                  ▼
//!              ChargePointStore · Firmware selector · Notifier
//! ```
//!
//! ## Provisioning sequence
//!
//! | Phase | OCPP 1.6 | OCPP 2.0.1 |
//! |-------|----------|------------|
//! | Boot | BootNotification → Accepted / Rejected | same |
//! | Firmware | UpdateFirmware, wait for `Installed`, Reset Hard | UpdateFirmware, Reset Immediate |
//! | Configuration | one ChangeConfiguration per key, then identity and redirect | one SetVariables batch |
//! | Close | Reset Hard | none |
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleet_ocpp::{BroadcastNotifier, MemoryStore, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::load("fleet.json")?);
//!     let notifier = Arc::new(BroadcastNotifier::default());
//!
//!     let server = Server::new(ServerConfig::from_env(), store, notifier);
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod firmware;
pub mod manager;
pub mod model;
pub mod notify;
pub mod observer;
pub mod ocpp;
pub mod registry;
pub mod server;
pub mod store;
pub mod transcript;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use firmware::{select_next, FirmwareStep};
pub use manager::ChargePointManager;
pub use model::{ChargePoint, ChargePointId, Firmware, ProvisioningPlan, StatusProcess, Step, TypeAllowed};
pub use notify::{BroadcastNotifier, Criticality, Notification, Notifier};
pub use observer::{Observer16, Observer201, OcppObserver, Provisioner};
pub use ocpp::{Action, Frame, OcppError, OcppVersion, Session};
pub use registry::{ConnectionEvent, ConnectionRegistry};
pub use server::Server;
pub use store::{ChargePointStore, FleetFile, MemoryStore, SortOrder, StoreError};
pub use transcript::{ConfigKey, FirmwareMajor};
