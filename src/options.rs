//! Decoder and encoder configuration.

use serde::{Deserialize, Serialize};

use crate::scheme::TimeUnit;

/// Settings shared by a stream's encoder and every iterator that reads it.
///
/// Both sides must agree on `int_optimized`; a mismatch is not detected and
/// produces garbage values.
///
/// Loadable from JSON, with every field optional:
///
/// ```
/// use m3tsz::{Options, TimeUnit};
///
/// let opts: Options = serde_json::from_str(r#"{"default_time_unit": "millisecond"}"#).unwrap();
/// assert_eq!(opts.default_time_unit, TimeUnit::Millisecond);
/// assert!(opts.int_optimized);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Options {
    /// Unit assumed for the first timestamp when the block start is aligned
    /// to it. Streams that start unaligned carry an explicit unit marker.
    pub default_time_unit: TimeUnit,

    /// Whether values may be carried as scaled integer diffs. When off, every
    /// value is an XOR float and the fast-path token is two bits wide.
    pub int_optimized: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_time_unit: TimeUnit::Second,
            int_optimized: true,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_time_unit(mut self, unit: TimeUnit) -> Self {
        self.default_time_unit = unit;
        self
    }

    pub fn with_int_optimized(mut self, enabled: bool) -> Self {
        self.int_optimized = enabled;
        self
    }
}
