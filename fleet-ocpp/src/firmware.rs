//! Firmware stepping
//!
//! Picks the next image to install, one catalog release at a time.
//! Versions are compared as plain strings, so catalog versions must sort
//! correctly as strings ("5.10" sorts before "5.9").

use std::cmp::Ordering;

use crate::model::{Firmware, TypeAllowed};

/// Outcome of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStep<'a> {
    /// Install this image next
    Upgrade(&'a Firmware),
    /// The target is older than the device; this image would roll it back.
    /// Never installed.
    Rollback(&'a Firmware),
    /// Device already runs the target
    Current,
    /// No compatible image lies between current and target
    Exhausted,
}

impl<'a> FirmwareStep<'a> {
    /// Image to install, if any
    pub fn upgrade(&self) -> Option<&'a Firmware> {
        match *self {
            FirmwareStep::Upgrade(fw) => Some(fw),
            _ => None,
        }
    }
}

/// Select the next firmware for a device.
///
/// Entries not supporting `type_allowed` are ignored. When `target` sorts
/// after `current`, the smallest compatible version after `current` wins,
/// even when it sorts after `target`.
pub fn select_next<'a>(
    catalog: &'a [Firmware],
    type_allowed: &TypeAllowed,
    current: &str,
    target: &str,
) -> FirmwareStep<'a> {
    let mut compatible: Vec<&Firmware> = catalog.iter().filter(|fw| fw.supports(type_allowed)).collect();
    compatible.sort_by(|a, b| a.version.as_str().cmp(b.version.as_str()));

    match target.cmp(current) {
        Ordering::Greater => compatible
            .into_iter()
            .find(|fw| fw.version.as_str() > current)
            .map_or(FirmwareStep::Exhausted, FirmwareStep::Upgrade),
        Ordering::Less => compatible
            .into_iter()
            .rev()
            .find(|fw| fw.version.as_str() < current)
            .map_or(FirmwareStep::Exhausted, FirmwareStep::Rollback),
        Ordering::Equal => FirmwareStep::Current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alfen() -> TypeAllowed {
        TypeAllowed::new("Alfen BV", "NG920")
    }

    fn catalog() -> Vec<Firmware> {
        ["6.1", "4.0", "5.5", "5.0"]
            .into_iter()
            .map(|v| Firmware::new(v, format!("http://fw/{v}")).with_compatible(alfen()))
            .chain(std::iter::once(
                Firmware::new("5.2", "http://fw/other")
                    .with_compatible(TypeAllowed::new("Alfen BV", "NG910")),
            ))
            .collect()
    }

    #[test]
    fn test_steps_one_release_at_a_time() {
        let catalog = catalog();

        let first = select_next(&catalog, &alfen(), "5.0", "6.1");
        assert_eq!(first.upgrade().map(|fw| fw.version.as_str()), Some("5.5"));

        let second = select_next(&catalog, &alfen(), "5.5", "6.1");
        assert_eq!(second.upgrade().map(|fw| fw.url.as_str()), Some("http://fw/6.1"));

        assert_eq!(select_next(&catalog, &alfen(), "6.1", "6.1"), FirmwareStep::Current);
    }

    #[test]
    fn test_incompatible_entries_ignored() {
        let catalog = catalog();
        let next = select_next(&catalog, &alfen(), "5.0", "5.5");
        assert_eq!(next.upgrade().map(|fw| fw.version.as_str()), Some("5.5"));

        let other = TypeAllowed::new("Alfen BV", "NG910");
        assert_eq!(
            select_next(&catalog, &other, "5.2", "6.1"),
            FirmwareStep::Exhausted
        );
    }

    #[test]
    fn test_not_bounded_by_target() {
        let catalog = catalog();
        let next = select_next(&catalog, &alfen(), "5.5", "5.9");
        assert_eq!(next.upgrade().map(|fw| fw.version.as_str()), Some("6.1"));
    }

    #[test]
    fn test_downgrade_reports_rollback() {
        let catalog = catalog();
        match select_next(&catalog, &alfen(), "6.1", "5.0") {
            FirmwareStep::Rollback(fw) => assert_eq!(fw.version, "5.5"),
            other => panic!("Expected Rollback, got {:?}", other),
        }
        assert!(select_next(&catalog, &alfen(), "6.1", "5.0").upgrade().is_none());
        assert_eq!(
            select_next(&catalog, &alfen(), "4.0", "3.0"),
            FirmwareStep::Exhausted
        );
    }

    #[test]
    fn test_string_ordering() {
        let catalog = vec![
            Firmware::new("5.10", "http://fw/5.10").with_compatible(alfen()),
            Firmware::new("5.9", "http://fw/5.9").with_compatible(alfen()),
        ];
        // "5.10" < "5.8" as strings
        let next = select_next(&catalog, &alfen(), "5.8", "6.0");
        assert_eq!(next.upgrade().map(|fw| fw.version.as_str()), Some("5.9"));
    }

    #[test]
    fn test_empty_catalog() {
        assert_eq!(
            select_next(&[], &alfen(), "5.0", "6.1"),
            FirmwareStep::Exhausted
        );
    }
}
