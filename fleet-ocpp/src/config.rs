//! Server configuration
//!
//! Everything the engine reads once at start-up: listen address, the
//! redirect target pushed at the end of a configuration pass, and the
//! timings the provisioning sequence relies on.

use std::net::SocketAddr;
use std::time::Duration;

/// Environment variable holding the final server address
pub const FINAL_SERVER_ADDRESS_ENV: &str = "FINAL_WS_SERVER_ADDRESS";

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address
    pub listen_addr: SocketAddr,

    /// Address devices are redirected to once provisioned (optional)
    pub final_server_address: Option<String>,

    /// Pause after a failed firmware download/installation
    pub firmware_failure_delay: Duration,

    /// Heartbeat interval hint sent with an accepted boot
    pub accepted_interval: Duration,

    /// Retry interval hint sent with a rejected boot
    pub rejected_interval: Duration,

    /// Largest inbound WebSocket message
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8887)),
            final_server_address: None,
            firmware_failure_delay: Duration::from_secs(5),
            accepted_interval: Duration::from_secs(5),
            rejected_interval: Duration::from_secs(10),
            max_message_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Defaults, with the final server address taken from the environment
    pub fn from_env() -> Self {
        let final_server_address = std::env::var(FINAL_SERVER_ADDRESS_ENV)
            .ok()
            .filter(|addr| !addr.trim().is_empty());

        Self {
            final_server_address,
            ..Default::default()
        }
    }

    /// Set listen address
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the redirect target
    pub fn with_final_server_address(mut self, addr: impl Into<String>) -> Self {
        self.final_server_address = Some(addr.into());
        self
    }

    /// Set firmware failure pacing delay
    pub fn with_firmware_failure_delay(mut self, delay: Duration) -> Self {
        self.firmware_failure_delay = delay;
        self
    }

    /// Set boot interval hints
    pub fn with_boot_intervals(mut self, accepted: Duration, rejected: Duration) -> Self {
        self.accepted_interval = accepted;
        self.rejected_interval = rejected;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Accepted interval in whole seconds, as sent on the wire
    pub fn accepted_interval_secs(&self) -> i32 {
        interval_secs(self.accepted_interval)
    }

    pub fn rejected_interval_secs(&self) -> i32 {
        interval_secs(self.rejected_interval)
    }
}

fn interval_secs(interval: Duration) -> i32 {
    i32::try_from(interval.as_secs()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 8887);
        assert_eq!(config.accepted_interval_secs(), 5);
        assert_eq!(config.rejected_interval_secs(), 10);
        assert_eq!(config.firmware_failure_delay, Duration::from_secs(5));
        assert!(config.final_server_address.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::default()
            .with_listen_addr("127.0.0.1:9000".parse().unwrap())
            .with_final_server_address("ws://prod.example:8887")
            .with_firmware_failure_delay(Duration::ZERO)
            .with_boot_intervals(Duration::from_secs(30), Duration::from_secs(60));

        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(
            config.final_server_address.as_deref(),
            Some("ws://prod.example:8887")
        );
        assert_eq!(config.firmware_failure_delay, Duration::ZERO);
        assert_eq!(config.accepted_interval_secs(), 30);
        assert_eq!(config.rejected_interval_secs(), 60);
    }
}
