//! Device record store
//!
//! The engine reads and writes device records through [`ChargePointStore`].
//! Each call is atomic on its own; the engine never holds a lock across
//! calls. [`MemoryStore`] keeps everything in memory and can be seeded
//! from a JSON fleet file:
//!
//! ```json
//! {
//!   "charge_points": [ { "id": 1, "serial_number": "ACE1", ... } ],
//!   "firmwares": [ { "version": "5.8.1", "url": "...", "compatible": [...] } ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{ChargePoint, ChargePointId, Firmware, TypeAllowed};

/// Errors from the record store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Catalog listing order, by version string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Record store consumed by the provisioning engine
pub trait ChargePointStore: Send + Sync {
    /// Look up a device by (serial number, vendor)
    fn find_by_identity(&self, serial_number: &str, vendor: &str) -> Result<Option<ChargePoint>, StoreError>;

    fn find_by_id(&self, id: ChargePointId) -> Result<Option<ChargePoint>, StoreError>;

    /// Insert or replace a device record
    fn save(&self, charge_point: &ChargePoint) -> Result<(), StoreError>;

    fn find_firmware(&self, version: &str) -> Result<Option<Firmware>, StoreError>;

    /// Catalog entries supporting `type_allowed`, sorted by version string
    fn list_compatible_firmwares(
        &self,
        type_allowed: &TypeAllowed,
        order: SortOrder,
    ) -> Result<Vec<Firmware>, StoreError>;
}

/// Serialized fleet: devices plus firmware catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub charge_points: Vec<ChargePoint>,
    #[serde(default)]
    pub firmwares: Vec<Firmware>,
}

#[derive(Default)]
struct Records {
    charge_points: HashMap<ChargePointId, ChargePoint>,
    firmwares: HashMap<String, Firmware>,
}

/// In-memory record store
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a fleet description
    pub fn from_fleet(fleet: FleetFile) -> Result<Self, StoreError> {
        let store = Self::new();
        for firmware in fleet.firmwares {
            store.add_firmware(firmware);
        }
        for charge_point in fleet.charge_points {
            validate_record(&charge_point)?;
            store.save(&charge_point)?;
        }
        Ok(store)
    }

    /// Load a JSON fleet file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let fleet: FleetFile = serde_json::from_str(&text)?;
        info!(
            "Loaded fleet file {}: {} charge points, {} firmwares",
            path.display(),
            fleet.charge_points.len(),
            fleet.firmwares.len()
        );
        Self::from_fleet(fleet)
    }

    /// Write the current records back as a fleet file
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let fleet = self.snapshot();
        let text = serde_json::to_string_pretty(&fleet)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn snapshot(&self) -> FleetFile {
        let records = self.records.read();
        let mut charge_points: Vec<_> = records.charge_points.values().cloned().collect();
        charge_points.sort_by_key(|cp| cp.id());
        let mut firmwares: Vec<_> = records.firmwares.values().cloned().collect();
        firmwares.sort_by(|a, b| a.version.cmp(&b.version));
        FleetFile {
            charge_points,
            firmwares,
        }
    }

    pub fn add_firmware(&self, firmware: Firmware) {
        debug!("Catalog entry {} -> {}", firmware.version, firmware.url);
        self.records
            .write()
            .firmwares
            .insert(firmware.version.clone(), firmware);
    }

    pub fn charge_point_count(&self) -> usize {
        self.records.read().charge_points.len()
    }
}

impl ChargePointStore for MemoryStore {
    fn find_by_identity(&self, serial_number: &str, vendor: &str) -> Result<Option<ChargePoint>, StoreError> {
        let records = self.records.read();
        Ok(records
            .charge_points
            .values()
            .find(|cp| cp.serial_number() == serial_number && cp.vendor() == vendor)
            .cloned())
    }

    fn find_by_id(&self, id: ChargePointId) -> Result<Option<ChargePoint>, StoreError> {
        Ok(self.records.read().charge_points.get(&id).cloned())
    }

    fn save(&self, charge_point: &ChargePoint) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let clash = records.charge_points.values().any(|cp| {
            cp.id() != charge_point.id()
                && cp.serial_number() == charge_point.serial_number()
                && cp.vendor() == charge_point.vendor()
        });
        if clash {
            return Err(StoreError::InvalidRecord(format!(
                "identity ({}, {}) already taken",
                charge_point.serial_number(),
                charge_point.vendor()
            )));
        }
        records
            .charge_points
            .insert(charge_point.id(), charge_point.clone());
        Ok(())
    }

    fn find_firmware(&self, version: &str) -> Result<Option<Firmware>, StoreError> {
        Ok(self.records.read().firmwares.get(version).cloned())
    }

    fn list_compatible_firmwares(
        &self,
        type_allowed: &TypeAllowed,
        order: SortOrder,
    ) -> Result<Vec<Firmware>, StoreError> {
        let records = self.records.read();
        let mut firmwares: Vec<Firmware> = records
            .firmwares
            .values()
            .filter(|fw| fw.supports(type_allowed))
            .cloned()
            .collect();
        firmwares.sort_by(|a, b| a.version.cmp(&b.version));
        if order == SortOrder::Descending {
            firmwares.reverse();
        }
        Ok(firmwares)
    }
}

fn validate_record(charge_point: &ChargePoint) -> Result<(), StoreError> {
    let Some(plan) = charge_point.plan() else {
        return Ok(());
    };
    for (key, value) in &plan.settings {
        if !key.accepts(value) {
            return Err(StoreError::InvalidRecord(format!(
                "charge point {}: value {:?} not allowed for {}",
                charge_point.serial_number(),
                value,
                key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProvisioningPlan;
    use crate::transcript::ConfigKey;
    use std::io::Write;

    fn alfen() -> TypeAllowed {
        TypeAllowed::new("Alfen BV", "NG920")
    }

    fn catalog_store() -> MemoryStore {
        let store = MemoryStore::new();
        for version in ["5.5", "4.0", "6.1", "5.0"] {
            store.add_firmware(
                Firmware::new(version, format!("http://fw/{version}")).with_compatible(alfen()),
            );
        }
        store.add_firmware(Firmware::new("5.7", "http://fw/other"));
        store
    }

    #[test]
    fn test_find_by_identity() {
        let store = MemoryStore::new();
        store
            .save(&ChargePoint::new(1, "ACE1", "Alfen BV", "NG920", "cp-ace1"))
            .unwrap();

        assert!(store.find_by_identity("ACE1", "Alfen BV").unwrap().is_some());
        assert!(store.find_by_identity("ACE1", "Other").unwrap().is_none());
        assert!(store.find_by_id(1).unwrap().is_some());
    }

    #[test]
    fn test_identity_is_unique() {
        let store = MemoryStore::new();
        store
            .save(&ChargePoint::new(1, "ACE1", "Alfen BV", "NG920", "a"))
            .unwrap();
        let result = store.save(&ChargePoint::new(2, "ACE1", "Alfen BV", "NG920", "b"));
        assert!(matches!(result, Err(StoreError::InvalidRecord(_))));
    }

    #[test]
    fn test_list_compatible_sorted() {
        let store = catalog_store();

        let asc: Vec<_> = store
            .list_compatible_firmwares(&alfen(), SortOrder::Ascending)
            .unwrap()
            .into_iter()
            .map(|fw| fw.version)
            .collect();
        assert_eq!(asc, ["4.0", "5.0", "5.5", "6.1"]);

        let desc = store
            .list_compatible_firmwares(&alfen(), SortOrder::Descending)
            .unwrap();
        assert_eq!(desc[0].version, "6.1");
        assert_eq!(desc.len(), 4);
    }

    #[test]
    fn test_load_fleet_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "charge_points": [{{
                    "id": 7, "serial_number": "ACE1", "vendor": "Alfen BV",
                    "device_type": "NG920", "client_id": "cp-ace1",
                    "plan": {{"target_firmware": "6.1", "settings": {{"light_intensity": "80"}}}}
                }}],
                "firmwares": [{{"version": "6.1", "url": "http://fw/6.1",
                    "compatible": [{{"vendor": "Alfen BV", "type": "NG920"}}]}}]
            }}"#
        )
        .unwrap();

        let store = MemoryStore::load(file.path()).unwrap();
        assert_eq!(store.charge_point_count(), 1);
        let cp = store.find_by_id(7).unwrap().unwrap();
        assert_eq!(cp.plan().unwrap().target_firmware, "6.1");
        assert!(store.find_firmware("6.1").unwrap().is_some());
    }

    #[test]
    fn test_dump_and_reload() {
        let store = catalog_store();
        store
            .save(
                &ChargePoint::new(1, "ACE1", "Alfen BV", "NG920", "cp-ace1")
                    .with_plan(ProvisioningPlan::new("6.1").with_setting(ConfigKey::LocalAuthList, "true")),
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        store.dump(&path).unwrap();

        let reloaded = MemoryStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().firmwares.len(), 5);
        assert_eq!(
            reloaded.find_by_id(1).unwrap(),
            store.find_by_id(1).unwrap()
        );
    }

    #[test]
    fn test_invalid_plan_value_rejected() {
        let fleet = FleetFile {
            charge_points: vec![ChargePoint::new(1, "ACE1", "Alfen BV", "NG920", "cp")
                .with_plan(ProvisioningPlan::new("6.1").with_setting(ConfigKey::LightIntensity, "250"))],
            firmwares: vec![],
        };
        assert!(matches!(
            MemoryStore::from_fleet(fleet),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MemoryStore::load("/nonexistent/fleet.json"),
            Err(StoreError::Io(_))
        ));
    }
}
