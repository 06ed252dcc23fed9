//! OCPP protocol version negotiation

/// OCPP 1.6 WebSocket subprotocol
pub const OCPP16_SUBPROTOCOL: &str = "ocpp1.6";

/// OCPP 2.0.1 WebSocket subprotocol
pub const OCPP201_SUBPROTOCOL: &str = "ocpp2.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcppVersion {
    V16,
    V201,
}

impl OcppVersion {
    /// Parse a single subprotocol token
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            OCPP16_SUBPROTOCOL => Some(OcppVersion::V16),
            OCPP201_SUBPROTOCOL => Some(OcppVersion::V201),
            _ => None,
        }
    }

    /// Pick the first known version from a `Sec-WebSocket-Protocol` header value,
    /// which may list several comma-separated tokens.
    pub fn negotiate(header: &str) -> Option<Self> {
        header.split(',').find_map(Self::parse)
    }

    pub fn subprotocol(&self) -> &'static str {
        match self {
            OcppVersion::V16 => OCPP16_SUBPROTOCOL,
            OcppVersion::V201 => OCPP201_SUBPROTOCOL,
        }
    }
}

impl std::fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subprotocol())
    }
}
