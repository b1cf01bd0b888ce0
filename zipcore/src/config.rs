//! Configuration for a controlled zip instance.
//!
//! Every parameter is a `nutype` newtype validated at construction, so a
//! [`ZipConfig`] that exists is always usable.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Label identifying a combinator instance in logs and errors.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ZipName(String);

impl Default for ZipName {
    fn default() -> Self {
        Self::try_new("controlled-zip").expect("default zip name is valid")
    }
}

/// Initial capacity of the buffer collecting one pairing loop's output.
///
/// Validated to be between 1 and 65 536 elements.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 65_536),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct OutputCapacity(usize);

impl Default for OutputCapacity {
    fn default() -> Self {
        Self::try_new(64).expect("64 is a valid output capacity")
    }
}

/// Settings for one [`ControlledZip`](crate::zip::ControlledZip).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZipConfig {
    /// Instance label used in log fields and internal errors.
    #[serde(default)]
    pub name: ZipName,
    /// Initial capacity of the per-loop output buffer.
    #[serde(default)]
    pub output_capacity: OutputCapacity,
    /// Capture a backtrace when the combinator is built.
    #[serde(default)]
    pub capture_backtrace: bool,
}

impl ZipConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance label.
    #[must_use]
    pub fn with_name(mut self, name: ZipName) -> Self {
        self.name = name;
        self
    }

    /// Sets the initial output buffer capacity.
    #[must_use]
    pub const fn with_output_capacity(mut self, capacity: OutputCapacity) -> Self {
        self.output_capacity = capacity;
        self
    }

    /// Enables or disables backtrace capture at build time.
    #[must_use]
    pub const fn with_backtrace(mut self, capture: bool) -> Self {
        self.capture_backtrace = capture;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_name_is_trimmed_and_validated() {
        let name = ZipName::try_new("  orders  ").unwrap();
        assert_eq!(name.as_ref(), "orders");
        assert!(ZipName::try_new("   ").is_err());
        assert!(ZipName::try_new("x".repeat(256)).is_err());
    }

    #[test]
    fn test_output_capacity_bounds() {
        assert!(OutputCapacity::try_new(0).is_err());
        assert!(OutputCapacity::try_new(65_537).is_err());
        assert_eq!(OutputCapacity::try_new(1).unwrap().into_inner(), 1);
        assert_eq!(OutputCapacity::default().into_inner(), 64);
    }

    #[test]
    fn test_config_builder() {
        let config = ZipConfig::new()
            .with_name(ZipName::try_new("trades").unwrap())
            .with_output_capacity(OutputCapacity::try_new(8).unwrap())
            .with_backtrace(true);

        assert_eq!(config.name.as_ref(), "trades");
        assert_eq!(config.output_capacity.into_inner(), 8);
        assert!(config.capture_backtrace);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ZipConfig = serde_json::from_str(r#"{"name": "joins"}"#).unwrap();
        assert_eq!(config.name.as_ref(), "joins");
        assert_eq!(config.output_capacity, OutputCapacity::default());
        assert!(!config.capture_backtrace);

        let invalid = serde_json::from_str::<ZipConfig>(r#"{"output_capacity": 0}"#);
        assert!(invalid.is_err());
    }
}
