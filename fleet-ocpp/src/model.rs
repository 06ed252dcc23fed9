//! Device records, provisioning plans and the firmware catalog
//!
//! A [`ChargePoint`] is owned by the record store. Its provisioning state
//! (`online`, `step`, `status`, `error`) only changes through the setters
//! below, and every setter refreshes `last_update`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::ConfigKey;

/// Store-assigned device id
pub type ChargePointId = u32;

/// Provisioning phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    #[default]
    Firmware,
    Configuration,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Firmware => f.write_str("FIRMWARE"),
            Step::Configuration => f.write_str("CONFIGURATION"),
        }
    }
}

/// Lifecycle of the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusProcess {
    #[default]
    Pending,
    Processing,
    Finished,
    Failed,
}

impl fmt::Display for StatusProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusProcess::Pending => "PENDING",
            StatusProcess::Processing => "PROCESSING",
            StatusProcess::Finished => "FINISHED",
            StatusProcess::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A (vendor, device type) pair a firmware image supports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeAllowed {
    pub vendor: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

impl TypeAllowed {
    pub fn new(vendor: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            device_type: device_type.into(),
        }
    }
}

/// Firmware catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firmware {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub compatible: Vec<TypeAllowed>,
}

impl Firmware {
    pub fn new(version: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            url: url.into(),
            compatible: Vec::new(),
        }
    }

    pub fn with_compatible(mut self, type_allowed: TypeAllowed) -> Self {
        self.compatible.push(type_allowed);
        self
    }

    pub fn supports(&self, type_allowed: &TypeAllowed) -> bool {
        self.compatible.contains(type_allowed)
    }
}

/// Operator-assigned target: a firmware version plus settings to push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    pub target_firmware: String,
    /// Pushed in [`ConfigKey`] order, whatever order they were added in.
    /// One value per key.
    #[serde(default)]
    pub settings: BTreeMap<ConfigKey, String>,
}

impl ProvisioningPlan {
    pub fn new(target_firmware: impl Into<String>) -> Self {
        Self {
            target_firmware: target_firmware.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.settings.insert(key, value.into());
        self
    }
}

/// Device record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargePoint {
    id: ChargePointId,
    serial_number: String,
    vendor: String,
    device_type: String,
    client_id: String,
    #[serde(default)]
    online: bool,
    #[serde(default)]
    step: Step,
    #[serde(default)]
    status: StatusProcess,
    #[serde(default)]
    error: String,
    #[serde(default = "Utc::now")]
    last_update: DateTime<Utc>,
    #[serde(default)]
    plan: Option<ProvisioningPlan>,
}

impl ChargePoint {
    pub fn new(
        id: ChargePointId,
        serial_number: impl Into<String>,
        vendor: impl Into<String>,
        device_type: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            serial_number: serial_number.into(),
            vendor: vendor.into(),
            device_type: device_type.into(),
            client_id: client_id.into(),
            online: false,
            step: Step::default(),
            status: StatusProcess::default(),
            error: String::new(),
            last_update: Utc::now(),
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: ProvisioningPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_step(mut self, step: Step, status: StatusProcess) -> Self {
        self.step = step;
        self.status = status;
        self
    }

    pub fn id(&self) -> ChargePointId {
        self.id
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Identity pushed to the device at the end of a configuration pass
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn type_allowed(&self) -> TypeAllowed {
        TypeAllowed::new(&self.vendor, &self.device_type)
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn status(&self) -> StatusProcess {
        self.status
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn plan(&self) -> Option<&ProvisioningPlan> {
        self.plan.as_ref()
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
        self.touch();
    }

    pub fn set_step(&mut self, step: Step) {
        self.step = step;
        self.touch();
    }

    pub fn set_status(&mut self, status: StatusProcess) {
        self.status = status;
        self.touch();
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = error.into();
        self.touch();
    }

    pub fn set_plan(&mut self, plan: Option<ProvisioningPlan>) {
        self.plan = plan;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_update = Utc::now();
    }
}
