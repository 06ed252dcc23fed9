//! Structural constraints on decoded OCPP payloads
//!
//! OCPP bounds most text fields (`CiString20Type`, `CiString50Type`, ...).
//! Frames that break these bounds are discarded before they reach an
//! observer.

use thiserror::Error;

/// A single broken constraint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {reason}")]
pub struct Violation {
    pub field: &'static str,
    pub reason: String,
}

impl Violation {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Shape check for a decoded payload
pub trait Validate {
    fn validate(&self) -> Result<(), Violation>;
}

/// Required text: non-empty and at most `max` characters
pub fn required(field: &'static str, value: &str, max: usize) -> Result<(), Violation> {
    if value.is_empty() {
        return Err(Violation::new(field, "must not be empty"));
    }
    max_len(field, value, max)
}

pub fn max_len(field: &'static str, value: &str, max: usize) -> Result<(), Violation> {
    let len = value.chars().count();
    if len > max {
        return Err(Violation::new(
            field,
            format!("is {} characters long, at most {} allowed", len, max),
        ));
    }
    Ok(())
}

pub fn optional(field: &'static str, value: Option<&String>, max: usize) -> Result<(), Violation> {
    match value {
        Some(v) => max_len(field, v, max),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        assert!(required("vendor", "Alfen BV", 20).is_ok());
        assert_eq!(
            required("vendor", "", 20).unwrap_err(),
            Violation::new("vendor", "must not be empty")
        );
        assert!(required("vendor", &"x".repeat(21), 20).is_err());
    }

    #[test]
    fn test_length_counts_characters() {
        // 20 characters, 40 bytes
        let text = "é".repeat(20);
        assert!(max_len("model", &text, 20).is_ok());
    }

    #[test]
    fn test_optional() {
        assert!(optional("serial", None, 25).is_ok());
        assert!(optional("serial", Some(&"A".repeat(26)), 25).is_err());
    }
}
