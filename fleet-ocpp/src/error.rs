//! Crate-level error type

use thiserror::Error;

use crate::ocpp::OcppError;
use crate::store::StoreError;

/// Errors surfaced by the provisioning engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("OCPP error: {0}")]
    Ocpp(#[from] OcppError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown firmware version: {0}")]
    UnknownFirmware(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
