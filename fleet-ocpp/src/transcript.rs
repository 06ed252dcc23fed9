//! Logical configuration settings and their wire names
//!
//! A provisioning plan names settings by [`ConfigKey`]. The wire key
//! depends on the protocol and, for OCPP 1.6, on the firmware major
//! version the device reports at boot:
//!
//! | id | setting             | 1.6 (major 4 / 5 / 6)                                       | 2.0.1 component/variable               |
//! |----|---------------------|-------------------------------------------------------------|----------------------------------------|
//! | 1  | LightIntensity      | LightIntensity                                              | -                                      |
//! | 2  | NetworkProfile      | BackOffice-URL-wired / BackOffice-URL-wired / BackOfficeNetworkProfile1 | -                          |
//! | 3  | ChargePointIdentity | Identity                                                    | SecurityCtrlr/Identity                 |
//! | 4  | LocalAuthList       | LocalAuthListEnabled                                        | LocalAuthListCtrlr/LocalAuthListEnabled |
//! | 5  | StationMaxCurrent   | Station-MaxCurrent                                          | -                                      |
//! | 6  | StationPassword     | PW-SetChargerPassword                                       | SecurityCtrlr/BasicAuthPassword        |

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Firmware major versions with a known key layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareMajor {
    V4,
    V5,
    V6,
}

impl FirmwareMajor {
    /// Major version is the text before the first '.'
    pub fn of(firmware_version: &str) -> Result<Self, Error> {
        let major = firmware_version.split('.').next().unwrap_or_default();
        match major {
            "4" => Ok(FirmwareMajor::V4),
            "5" => Ok(FirmwareMajor::V5),
            "6" => Ok(FirmwareMajor::V6),
            _ => Err(Error::UnknownFirmware(firmware_version.to_string())),
        }
    }
}

/// Logical setting of a provisioning plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    LightIntensity,
    NetworkProfile,
    ChargePointIdentity,
    LocalAuthList,
    StationMaxCurrent,
    StationPassword,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 6] = [
        ConfigKey::LightIntensity,
        ConfigKey::NetworkProfile,
        ConfigKey::ChargePointIdentity,
        ConfigKey::LocalAuthList,
        ConfigKey::StationMaxCurrent,
        ConfigKey::StationPassword,
    ];

    pub fn id(&self) -> u8 {
        match self {
            ConfigKey::LightIntensity => 1,
            ConfigKey::NetworkProfile => 2,
            ConfigKey::ChargePointIdentity => 3,
            ConfigKey::LocalAuthList => 4,
            ConfigKey::StationMaxCurrent => 5,
            ConfigKey::StationPassword => 6,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.id() == id)
    }

    /// Operator-facing label
    pub fn label(&self) -> &'static str {
        match self {
            ConfigKey::LightIntensity => "LED intensity",
            ConfigKey::NetworkProfile => "Next server address",
            ConfigKey::ChargePointIdentity => "Charge point name",
            ConfigKey::LocalAuthList => "Enable the local authorization list",
            ConfigKey::StationMaxCurrent => "Station max current",
            ConfigKey::StationPassword => "Station password",
        }
    }

    /// Plan-side value check, applied when records are loaded
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            // 0..=100, at most two digits below 100
            ConfigKey::LightIntensity => {
                value == "100"
                    || (!value.is_empty()
                        && value.len() <= 2
                        && value.chars().all(|c| c.is_ascii_digit()))
            }
            ConfigKey::ChargePointIdentity => value.chars().count() <= 20,
            ConfigKey::StationPassword => {
                (10..=40).contains(&value.chars().count())
                    && !value.contains(['\\', '"', ','])
            }
            _ => true,
        }
    }

    /// OCPP 1.6 configuration key for a firmware major
    pub fn v16_key(&self, major: FirmwareMajor) -> &'static str {
        match self {
            ConfigKey::LightIntensity => "LightIntensity",
            ConfigKey::NetworkProfile => match major {
                FirmwareMajor::V4 | FirmwareMajor::V5 => "BackOffice-URL-wired",
                FirmwareMajor::V6 => "BackOfficeNetworkProfile1",
            },
            ConfigKey::ChargePointIdentity => "Identity",
            ConfigKey::LocalAuthList => "LocalAuthListEnabled",
            ConfigKey::StationMaxCurrent => "Station-MaxCurrent",
            ConfigKey::StationPassword => "PW-SetChargerPassword",
        }
    }

    /// OCPP 1.6 value as the firmware expects it
    pub fn v16_value(&self, major: FirmwareMajor, value: &str) -> String {
        match (self, major) {
            (ConfigKey::NetworkProfile, FirmwareMajor::V6) => format!(
                "ocppVersion{{OCPP16}}ocppCsmsUrl{{{}}}messageTimeout{{10}}securityProfile{{0}}ocppInterface{{Wired0}}",
                value
            ),
            _ => value.to_string(),
        }
    }

    /// OCPP 2.0.1 (component, variable), if the setting exists there
    pub fn v201_variable(&self) -> Option<(&'static str, &'static str)> {
        match self {
            ConfigKey::ChargePointIdentity => Some(("SecurityCtrlr", "Identity")),
            ConfigKey::LocalAuthList => Some(("LocalAuthListCtrlr", "LocalAuthListEnabled")),
            ConfigKey::StationPassword => Some(("SecurityCtrlr", "BasicAuthPassword")),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_major() {
        assert_eq!(FirmwareMajor::of("4.11.0-4166").unwrap(), FirmwareMajor::V4);
        assert_eq!(FirmwareMajor::of("5.8.1").unwrap(), FirmwareMajor::V5);
        assert_eq!(FirmwareMajor::of("6").unwrap(), FirmwareMajor::V6);
        assert!(matches!(
            FirmwareMajor::of("7.0.0"),
            Err(Error::UnknownFirmware(v)) if v == "7.0.0"
        ));
        assert!(FirmwareMajor::of("").is_err());
    }

    #[test]
    fn test_network_profile_by_major() {
        let key = ConfigKey::NetworkProfile;
        assert_eq!(key.v16_key(FirmwareMajor::V5), "BackOffice-URL-wired");
        assert_eq!(key.v16_key(FirmwareMajor::V6), "BackOfficeNetworkProfile1");
        assert_eq!(key.v16_value(FirmwareMajor::V4, "ws://final:8887"), "ws://final:8887");
        assert_eq!(
            key.v16_value(FirmwareMajor::V6, "ws://final:8887"),
            "ocppVersion{OCPP16}ocppCsmsUrl{ws://final:8887}messageTimeout{10}securityProfile{0}ocppInterface{Wired0}"
        );
    }

    #[test]
    fn test_only_network_profile_is_reformatted() {
        assert_eq!(
            ConfigKey::ChargePointIdentity.v16_value(FirmwareMajor::V6, "cp-ace1"),
            "cp-ace1"
        );
    }

    #[test]
    fn test_ids() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::from_id(key.id()), Some(key));
        }
        assert_eq!(ConfigKey::from_id(7), None);
    }

    #[test]
    fn test_v201_mapping() {
        assert_eq!(
            ConfigKey::ChargePointIdentity.v201_variable(),
            Some(("SecurityCtrlr", "Identity"))
        );
        assert_eq!(ConfigKey::LightIntensity.v201_variable(), None);
        assert_eq!(ConfigKey::NetworkProfile.v201_variable(), None);
    }

    #[test]
    fn test_value_rules() {
        assert!(ConfigKey::LightIntensity.accepts("0"));
        assert!(ConfigKey::LightIntensity.accepts("100"));
        assert!(!ConfigKey::LightIntensity.accepts("101"));
        assert!(!ConfigKey::LightIntensity.accepts(""));
        assert!(ConfigKey::StationPassword.accepts("correct-horse"));
        assert!(!ConfigKey::StationPassword.accepts("short"));
        assert!(!ConfigKey::StationPassword.accepts("has,a,comma,inside"));
        assert!(!ConfigKey::ChargePointIdentity.accepts(&"x".repeat(21)));
    }
}
