//! OCPP-J frame codec
//!
//! Charge points exchange one JSON array per WebSocket text frame:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//!
//! Any other call type is rejected. Message ids are numeric: they are read
//! from a JSON number or a quoted number, and always written quoted.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::validate::{Validate, Violation};

/// Numeric OCPP message id, monotonic within one session
pub type MessageId = i64;

/// OCPP message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
}

impl MessageType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(MessageType::Call),
            3 => Some(MessageType::CallResult),
            _ => None,
        }
    }
}

/// OCPP action names the engine acts upon.
///
/// Anything else decodes as [`Action::Other`], which is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    BootNotification,
    FirmwareStatusNotification,
    UpdateFirmware,
    ChangeConfiguration,
    SetVariables,
    Reset,
    Other(String),
}

impl Action {
    pub fn parse(name: &str) -> Self {
        match name {
            "BootNotification" => Action::BootNotification,
            "FirmwareStatusNotification" => Action::FirmwareStatusNotification,
            "UpdateFirmware" => Action::UpdateFirmware,
            "ChangeConfiguration" => Action::ChangeConfiguration,
            "SetVariables" => Action::SetVariables,
            "Reset" => Action::Reset,
            other => Action::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Action::BootNotification => "BootNotification",
            Action::FirmwareStatusNotification => "FirmwareStatusNotification",
            Action::UpdateFirmware => "UpdateFirmware",
            Action::ChangeConfiguration => "ChangeConfiguration",
            Action::SetVariables => "SetVariables",
            Action::Reset => "Reset",
            Action::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors in OCPP message handling
#[derive(Debug, Error)]
pub enum OcppError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid message format: {0}")]
    InvalidFormat(&'static str),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(i64),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("Unsolicited response {0}: no request pending")]
    UnsolicitedResponse(MessageId),

    #[error("Invalid message: {0}")]
    Violation(#[from] Violation),
}

/// OCPP CALL message (request)
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub message_id: MessageId,
    pub action: Action,
    pub payload: Value,
}

impl Call {
    pub fn new(message_id: MessageId, action: Action, payload: impl Serialize) -> Result<Self, OcppError> {
        Ok(Self {
            message_id,
            action,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to OCPP wire format: [2, "messageId", action, payload]
    pub fn to_text(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            self.message_id.to_string(),
            self.action.as_str(),
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }

    /// Parse the payload as a specific request type
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, OcppError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// OCPP CALLRESULT message (response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub message_id: MessageId,
    pub payload: Value,
}

impl CallResult {
    pub fn new(message_id: MessageId, payload: impl Serialize) -> Result<Self, OcppError> {
        Ok(Self {
            message_id,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize to OCPP wire format: [3, "messageId", payload]
    pub fn to_text(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            self.message_id.to_string(),
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }

    /// Parse the payload as a specific response type
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, OcppError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Parsed OCPP frame (either direction)
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Call(Call),
    CallResult(CallResult),
}

impl Frame {
    /// Parse an OCPP frame from a WebSocket text message
    pub fn parse(text: &str) -> Result<Self, OcppError> {
        let array: Vec<Value> = serde_json::from_str(text)?;

        let msg_type = array
            .first()
            .ok_or(OcppError::InvalidFormat("empty frame"))?
            .as_i64()
            .ok_or(OcppError::InvalidFormat("call type is not an integer"))?;

        match MessageType::from_code(msg_type) {
            Some(MessageType::Call) => {
                if array.len() != 4 {
                    return Err(OcppError::InvalidFormat("CALL must have 4 elements"));
                }
                let message_id = parse_message_id(&array[1])?;
                let action = array[2]
                    .as_str()
                    .ok_or(OcppError::InvalidFormat("action is not a string"))?;

                Ok(Frame::Call(Call {
                    message_id,
                    action: Action::parse(action),
                    payload: array[3].clone(),
                }))
            }
            Some(MessageType::CallResult) => {
                if array.len() != 3 {
                    return Err(OcppError::InvalidFormat("CALLRESULT must have 3 elements"));
                }
                let message_id = parse_message_id(&array[1])?;

                Ok(Frame::CallResult(CallResult {
                    message_id,
                    payload: array[2].clone(),
                }))
            }
            None => Err(OcppError::UnknownMessageType(msg_type)),
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Frame::Call(c) => c.message_id,
            Frame::CallResult(r) => r.message_id,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::Call(_) => MessageType::Call,
            Frame::CallResult(_) => MessageType::CallResult,
        }
    }

    pub fn to_text(&self) -> Result<String, OcppError> {
        match self {
            Frame::Call(c) => c.to_text(),
            Frame::CallResult(r) => r.to_text(),
        }
    }
}

/// Ids must leave room for the session to advance past them
fn parse_message_id(value: &Value) -> Result<MessageId, OcppError> {
    let id = match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| OcppError::InvalidMessageId(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| OcppError::InvalidMessageId(s.clone())),
        other => Err(OcppError::InvalidMessageId(other.to_string())),
    }?;
    if !(0..MessageId::MAX).contains(&id) {
        return Err(OcppError::InvalidMessageId(id.to_string()));
    }
    Ok(id)
}

/// Typed, version-scoped view of an inbound frame.
///
/// Requests carry their own action; responses are interpreted through the
/// request they answer.
pub trait DecodeMessage: Validate + Sized + Send {
    /// `Ok(None)` means the action is not one this protocol acts upon.
    fn from_call(call: &Call) -> Result<Option<Self>, OcppError>;

    fn from_result(request: &Call, result: &CallResult) -> Result<Option<Self>, OcppError>;
}
