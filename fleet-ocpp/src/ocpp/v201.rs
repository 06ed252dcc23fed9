//! OCPP 2.0.1 message types
//!
//! Same provisioning subset as 1.6, with the 2.0.1 shapes:
//! - BootNotification nests the station identity under `chargingStation`
//! - configuration is written in one `SetVariables` batch
//! - UpdateFirmware carries a `requestId` and a nested `firmware` object

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::messages::{Action, Call, CallResult, DecodeMessage, OcppError};
use super::validate::{self, Validate, Violation};

pub use super::v16::RegistrationStatus;

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootReason {
    ApplicationReset,
    FirmwareUpdate,
    LocalReset,
    PowerUp,
    RemoteReset,
    ScheduledReset,
    Triggered,
    Unknown,
    Watchdog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmwareStatus {
    Downloaded,
    DownloadFailed,
    Downloading,
    DownloadScheduled,
    DownloadPaused,
    Idle,
    InstallationFailed,
    Installing,
    Installed,
    InstallRebooting,
    InstallScheduled,
    InstallVerificationFailed,
    InvalidSignature,
    SignatureVerified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateFirmwareStatus {
    Accepted,
    Rejected,
    AcceptedCanceled,
    InvalidCertificate,
    RevokedCertificate,
}

/// Per-variable outcome of a SetVariables batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetVariableStatus {
    Accepted,
    Rejected,
    UnknownComponent,
    UnknownVariable,
    NotSupportedAttributeType,
    RebootRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    Immediate,
    OnIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetStatus {
    Accepted,
    Rejected,
    Scheduled,
}

// ============================================================================
// Shared structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iccid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    pub model: String,
    pub vendor_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modem: Option<Modem>,
}

impl Validate for ChargingStation {
    fn validate(&self) -> Result<(), Violation> {
        validate::optional("serialNumber", self.serial_number.as_ref(), 25)?;
        validate::required("model", &self.model, 20)?;
        validate::required("vendorName", &self.vendor_name, 50)?;
        validate::optional("firmwareVersion", self.firmware_version.as_ref(), 50)?;
        if let Some(modem) = &self.modem {
            validate::optional("iccid", modem.iccid.as_ref(), 20)?;
            validate::optional("imsi", modem.imsi.as_ref(), 20)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Component {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Variable {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
        }
    }
}

// ============================================================================
// Charging station -> CSMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charging_station: ChargingStation,
    pub reason: BootReason,
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
#[serde(rename_all = "camelCase")]
pub struct FirmwareStatusNotificationRequest {
    pub status: FirmwareStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirmwareStatusNotificationResponse {}

// ============================================================================
// CSMS -> charging station
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableData {
    pub attribute_value: String,
    pub component: Component,
    pub variable: Variable,
}

impl SetVariableData {
    pub fn new(component: &str, variable: &str, value: impl Into<String>) -> Self {
        Self {
            attribute_value: value.into(),
            component: Component::named(component),
            variable: Variable::named(variable),
        }
    }
}

impl Validate for SetVariableData {
    fn validate(&self) -> Result<(), Violation> {
        validate::max_len("attributeValue", &self.attribute_value, 1000)?;
        validate::required("component.name", &self.component.name, 50)?;
        validate::required("variable.name", &self.variable.name, 50)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariablesRequest {
    pub set_variable_data: Vec<SetVariableData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableResult {
    pub attribute_status: SetVariableStatus,
    pub component: Component,
    pub variable: Variable,
}

impl SetVariableResult {
    /// One-line description used as the pass error text
    pub fn describe(&self) -> String {
        format!(
            "{:?}: {}/{}",
            self.attribute_status, self.component.name, self.variable.name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariablesResponse {
    pub set_variable_result: Vec<SetVariableResult>,
}

impl Validate for SetVariablesResponse {
    fn validate(&self) -> Result<(), Violation> {
        if self.set_variable_result.is_empty() {
            return Err(Violation::new("setVariableResult", "must not be empty"));
        }
        for result in &self.set_variable_result {
            validate::required("component.name", &result.component.name, 50)?;
            validate::required("variable.name", &result.variable.name, 50)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firmware {
    pub location: String,
    pub retrieve_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFirmwareRequest {
    pub request_id: i32,
    pub firmware: Firmware,
}

impl UpdateFirmwareRequest {
    pub fn now(request_id: i32, location: impl Into<String>) -> Self {
        Self {
            request_id,
            firmware: Firmware {
                location: location.into(),
                retrieve_date_time: Utc::now(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFirmwareResponse {
    pub status: UpdateFirmwareStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub reset_type: ResetType,
}

impl ResetRequest {
    pub fn immediate() -> Self {
        Self {
            reset_type: ResetType::Immediate,
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

/// Every OCPP 2.0.1 message the provisioning observer can receive
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    BootNotification(BootNotificationRequest),
    FirmwareStatusNotification(FirmwareStatusNotificationRequest),
    UpdateFirmwareResponse(UpdateFirmwareResponse),
    SetVariablesResponse(SetVariablesResponse),
    ResetResponse(ResetResponse),
    Unexpected(Action),
}

impl Validate for Message {
    fn validate(&self) -> Result<(), Violation> {
        match self {
            Message::BootNotification(req) => req.charging_station.validate(),
            Message::SetVariablesResponse(resp) => resp.validate(),
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
            Action::SetVariables => Message::SetVariablesResponse(result.parse_payload()?),
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

    #[test]
    fn test_boot_notification_request() {
        let payload = json!({
            "chargingStation": {
                "serialNumber": "ACE1",
                "model": "NG920",
                "vendorName": "Alfen BV",
                "firmwareVersion": "6.1.0"
            },
            "reason": "PowerUp"
        });
        let call = Call::new(1, Action::BootNotification, payload).unwrap();

        match Message::from_call(&call).unwrap() {
            Some(Message::BootNotification(req)) => {
                assert_eq!(req.reason, BootReason::PowerUp);
                assert_eq!(req.charging_station.vendor_name, "Alfen BV");
                assert!(req.charging_station.validate().is_ok());
            }
            other => panic!("Expected BootNotification, got {:?}", other),
        }
    }

    #[test]
    fn test_vendor_name_ceiling() {
        let station = ChargingStation {
            serial_number: None,
            model: "NG920".into(),
            vendor_name: "v".repeat(51),
            firmware_version: None,
            modem: None,
        };
        assert_eq!(station.validate().unwrap_err().field, "vendorName");
    }

    #[test]
    fn test_set_variables_wire_shape() {
        let request = SetVariablesRequest {
            set_variable_data: vec![SetVariableData::new("SecurityCtrlr", "Identity", "ACE1")],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "setVariableData": [{
                    "attributeValue": "ACE1",
                    "component": {"name": "SecurityCtrlr"},
                    "variable": {"name": "Identity"}
                }]
            })
        );
    }

    #[test]
    fn test_set_variables_response() {
        let request = Call::new(
            4,
            Action::SetVariables,
            SetVariablesRequest {
                set_variable_data: vec![],
            },
        )
        .unwrap();
        let result = CallResult::new(
            4,
            json!({
                "setVariableResult": [{
                    "attributeStatus": "UnknownVariable",
                    "component": {"name": "SecurityCtrlr"},
                    "variable": {"name": "Identity"}
                }]
            }),
        )
        .unwrap();

        match Message::from_result(&request, &result).unwrap() {
            Some(Message::SetVariablesResponse(resp)) => {
                assert_eq!(
                    resp.set_variable_result[0].describe(),
                    "UnknownVariable: SecurityCtrlr/Identity"
                );
            }
            other => panic!("Expected SetVariablesResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_result_batch_is_invalid() {
        let resp = Message::SetVariablesResponse(SetVariablesResponse {
            set_variable_result: vec![],
        });
        assert!(resp.validate().is_err());
    }

    #[test]
    fn test_update_firmware_wire_shape() {
        let json = serde_json::to_value(UpdateFirmwareRequest::now(3, "http://fw/6.1")).unwrap();
        assert_eq!(json["requestId"], 3);
        assert_eq!(json["firmware"]["location"], "http://fw/6.1");
        assert!(json["firmware"]["retrieveDateTime"].is_string());
    }

    #[test]
    fn test_reset_immediate() {
        assert_eq!(
            serde_json::to_value(ResetRequest::immediate()).unwrap(),
            json!({"type": "Immediate"})
        );
    }
}
