//! OCPP 1.6 / 2.0.1 protocol layer
//!
//! - `messages`: OCPP-J framing (CALL, CALLRESULT) and the typed decode seam
//! - `validate`: CiString ceilings and required fields
//! - `version`: subprotocol negotiation
//! - `v16` / `v201`: version-scoped payload types
//! - `session`: per-connection message id and pending-request correlation

pub mod messages;
pub mod session;
pub mod v16;
pub mod v201;
pub mod validate;
pub mod version;

pub use messages::{Action, Call, CallResult, DecodeMessage, Frame, MessageId, MessageType, OcppError};
pub use session::Session;
pub use validate::{Validate, Violation};
pub use version::OcppVersion;
