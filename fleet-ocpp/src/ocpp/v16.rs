//! OCPP 1.6 message types
//!
//! Only the messages the provisioning sequence needs:
//! - BootNotification (CP -> CS)
//! - FirmwareStatusNotification (CP -> CS)
//! - UpdateFirmware, ChangeConfiguration, Reset (CS -> CP)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::messages::{Action, Call, CallResult, DecodeMessage, OcppError};
use super::validate::{self, Validate, Violation};

// ============================================================================
// Enumerations
// ============================================================================

/// Registration status for BootNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

/// Firmware installation progress reported by the charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmwareStatus {
    Downloaded,
    DownloadFailed,
    Downloading,
    Idle,
    InstallationFailed,
    Installing,
    Installed,
}

/// Outcome of a ChangeConfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigurationStatus {
    Accepted,
    Rejected,
    RebootRequired,
    NotSupported,
}

/// Status name as recorded on a failed configuration pass
impl fmt::Display for ConfigurationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationStatus::Accepted => f.write_str("ACCEPTED"),
            ConfigurationStatus::Rejected => f.write_str("REJECTED"),
            ConfigurationStatus::RebootRequired => f.write_str("REBOOT_REQUIRED"),
            ConfigurationStatus::NotSupported => f.write_str("NOT_SUPPORTED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetStatus {
    Accepted,
    Rejected,
}

// ============================================================================
// Charge point -> central system
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_box_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_serial_number: Option<String>,
}

impl Validate for BootNotificationRequest {
    fn validate(&self) -> Result<(), Violation> {
        validate::required("chargePointVendor", &self.charge_point_vendor, 20)?;
        validate::required("chargePointModel", &self.charge_point_model, 20)?;
        validate::optional("chargePointSerialNumber", self.charge_point_serial_number.as_ref(), 25)?;
        validate::optional("chargeBoxSerialNumber", self.charge_box_serial_number.as_ref(), 25)?;
        validate::optional("firmwareVersion", self.firmware_version.as_ref(), 50)?;
        validate::optional("iccid", self.iccid.as_ref(), 20)?;
        validate::optional("imsi", self.imsi.as_ref(), 20)?;
        validate::optional("meterType", self.meter_type.as_ref(), 25)?;
        validate::optional("meterSerialNumber", self.meter_serial_number.as_ref(), 25)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub current_time: DateTime<Utc>,
    pub interval: i32,
    pub status: RegistrationStatus,
}

impl BootNotificationResponse {
    pub fn new(status: RegistrationStatus, interval: i32) -> Self {
        Self {
            current_time: Utc::now(),
            interval,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareStatusNotificationRequest {
    pub status: FirmwareStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirmwareStatusNotificationResponse {}

// ============================================================================
// Central system -> charge point
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFirmwareRequest {
    pub location: String,
    pub retrieve_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<i32>,
}

impl UpdateFirmwareRequest {
    /// Download right away, single attempt
    pub fn now(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            retrieve_date: Utc::now(),
            retries: None,
            retry_interval: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFirmwareResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeConfigurationRequest {
    pub key: String,
    pub value: String,
}

impl Validate for ChangeConfigurationRequest {
    fn validate(&self) -> Result<(), Violation> {
        validate::required("key", &self.key, 50)?;
        validate::max_len("value", &self.value, 500)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeConfigurationResponse {
    pub status: ConfigurationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub reset_type: ResetType,
}

impl ResetRequest {
    pub fn hard() -> Self {
        Self {
            reset_type: ResetType::Hard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: ResetStatus,
}

// ============================================================================
// Decoded inbound messages
// ============================================================================

/// Every OCPP 1.6 message the provisioning observer can receive
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    BootNotification(BootNotificationRequest),
    FirmwareStatusNotification(FirmwareStatusNotificationRequest),
    UpdateFirmwareResponse(UpdateFirmwareResponse),
    ChangeConfigurationResponse(ChangeConfigurationResponse),
    ResetResponse(ResetResponse),
    /// A known action arriving where the sequence does not expect it
    Unexpected(Action),
}

impl Validate for Message {
    fn validate(&self) -> Result<(), Violation> {
        match self {
            Message::BootNotification(req) => req.validate(),
            _ => Ok(()),
        }
    }
}

impl DecodeMessage for Message {
    fn from_call(call: &Call) -> Result<Option<Self>, OcppError> {
        let message = match &call.action {
            Action::BootNotification => Message::BootNotification(call.parse_payload()?),
            Action::FirmwareStatusNotification => {
                Message::FirmwareStatusNotification(call.parse_payload()?)
            }
            Action::Other(_) => return Ok(None),
            action => Message::Unexpected(action.clone()),
        };
        Ok(Some(message))
    }

    fn from_result(request: &Call, result: &CallResult) -> Result<Option<Self>, OcppError> {
        let message = match &request.action {
            Action::UpdateFirmware => Message::UpdateFirmwareResponse(result.parse_payload()?),
            Action::ChangeConfiguration => {
                Message::ChangeConfigurationResponse(result.parse_payload()?)
            }
            Action::Reset => Message::ResetResponse(result.parse_payload()?),
            Action::Other(_) => return Ok(None),
            action => Message::Unexpected(action.clone()),
        };
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn boot_payload() -> serde_json::Value {
        json!({
            "chargePointVendor": "Alfen BV",
            "chargePointModel": "NG920-5250",
            "chargePointSerialNumber": "ACE1",
            "firmwareVersion": "5.5.1"
        })
    }

    #[test]
    fn test_boot_notification_request() {
        let call = Call::new(1, Action::BootNotification, boot_payload()).unwrap();
        let message = Message::from_call(&call).unwrap().unwrap();

        match message {
            Message::BootNotification(req) => {
                assert_eq!(req.charge_point_vendor, "Alfen BV");
                assert_eq!(req.charge_point_serial_number.as_deref(), Some("ACE1"));
                assert_eq!(req.firmware_version.as_deref(), Some("5.5.1"));
                assert!(req.charge_box_serial_number.is_none());
            }
            other => panic!("Expected BootNotification, got {:?}", other),
        }
    }

    #[test]
    fn test_boot_notification_missing_vendor() {
        let call = Call::new(1, Action::BootNotification, json!({"chargePointModel": "X"})).unwrap();
        assert!(matches!(Message::from_call(&call), Err(OcppError::Json(_))));
    }

    #[test]
    fn test_boot_notification_constraints() {
        let mut req: BootNotificationRequest = serde_json::from_value(boot_payload()).unwrap();
        assert!(req.validate().is_ok());

        req.charge_point_vendor = "A vendor name that is too long".into();
        assert_eq!(req.validate().unwrap_err().field, "chargePointVendor");
    }

    #[test]
    fn test_response_uses_pending_action() {
        let payload = json!({"status": "RebootRequired"});
        let request = Call::new(
            3,
            Action::ChangeConfiguration,
            ChangeConfigurationRequest {
                key: "Identity".into(),
                value: "ACE1".into(),
            },
        )
        .unwrap();
        let result = CallResult::new(3, &payload).unwrap();

        assert_eq!(
            Message::from_result(&request, &result).unwrap(),
            Some(Message::ChangeConfigurationResponse(ChangeConfigurationResponse {
                status: ConfigurationStatus::RebootRequired,
            }))
        );

        let reset = Call::new(4, Action::Reset, ResetRequest::hard()).unwrap();
        assert!(Message::from_result(&reset, &result).is_err());
    }

    #[test]
    fn test_update_firmware_ack_is_empty() {
        let request = Call::new(2, Action::UpdateFirmware, UpdateFirmwareRequest::now("http://fw/5.6")).unwrap();
        let result = CallResult::new(2, json!({})).unwrap();
        assert_eq!(
            Message::from_result(&request, &result).unwrap(),
            Some(Message::UpdateFirmwareResponse(UpdateFirmwareResponse {}))
        );
    }

    #[test]
    fn test_server_actions_from_device_are_unexpected() {
        let call = Call::new(9, Action::Reset, json!({"type": "Soft"})).unwrap();
        assert_eq!(
            Message::from_call(&call).unwrap(),
            Some(Message::Unexpected(Action::Reset))
        );

        let call = Call::new(9, Action::Other("Heartbeat".into()), json!({})).unwrap();
        assert_eq!(Message::from_call(&call).unwrap(), None);
    }

    #[test]
    fn test_reset_request_wire_shape() {
        let json = serde_json::to_value(ResetRequest::hard()).unwrap();
        assert_eq!(json, json!({"type": "Hard"}));
    }

    #[test]
    fn test_configuration_status_name() {
        assert_eq!(ConfigurationStatus::Rejected.to_string(), "REJECTED");
        assert_eq!(ConfigurationStatus::NotSupported.to_string(), "NOT_SUPPORTED");
        // Wire form is unchanged
        assert_eq!(
            serde_json::to_value(ConfigurationStatus::NotSupported).unwrap(),
            json!("NotSupported")
        );
    }

    #[test]
    fn test_typed_round_trip() {
        let req = FirmwareStatusNotificationRequest {
            status: FirmwareStatus::InstallationFailed,
        };
        let call = Call::new(11, Action::FirmwareStatusNotification, &req).unwrap();
        let decoded = crate::ocpp::Frame::parse(&call.to_text().unwrap()).unwrap();

        match decoded {
            crate::ocpp::Frame::Call(call) => assert_eq!(
                Message::from_call(&call).unwrap(),
                Some(Message::FirmwareStatusNotification(req))
            ),
            _ => panic!("Expected Call"),
        }
    }
}
