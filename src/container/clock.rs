//! Timestamp and identifier boundary

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Format version written to `nwb_version`.
pub const FORMAT_VERSION: &str = "NWB-1.0.6";

/// Source of "now" for the modification log.
pub trait Clock: Debug + Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identifier derived from a session description. The same description
/// always yields the same identifier.
#[must_use]
pub fn create_identifier(description: &str) -> String {
    let slug: String = description
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    format!("{FORMAT_VERSION}: {slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_deterministic() {
        assert_eq!(
            create_identifier("reference image test"),
            create_identifier("reference image test")
        );
        assert_eq!(
            create_identifier("  Interface  timeseries example! "),
            "NWB-1.0.6: interface-timeseries-example"
        );
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
