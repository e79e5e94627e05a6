//! Save version policy
//!
//! Out-of-range versions never stop a parse. They produce a single warning
//! and decoding continues best-effort.

use serde::{Deserialize, Serialize};

use crate::error::SaveError;

/// Result of classifying a header version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionClass {
    Supported,
    OutOfRange,
}

/// Accepted `(major, minor)` versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionPolicy {
    /// Majors the codec understands (default: [7])
    pub known_majors: Vec<i32>,
    /// Lowest supported minor, inclusive (default: 11)
    pub min_minor: i32,
    /// Highest supported minor, inclusive (default: 36)
    pub max_minor: i32,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self { known_majors: vec![7], min_minor: 11, max_minor: 36 }
    }
}

impl VersionPolicy {
    pub fn classify(&self, major: i32, minor: i32) -> VersionClass {
        let known_major = self.known_majors.contains(&major);
        if known_major && (self.min_minor..=self.max_minor).contains(&minor) {
            VersionClass::Supported
        } else {
            VersionClass::OutOfRange
        }
    }

    /// The one warning an out-of-range version produces, if any.
    pub fn check(&self, major: i32, minor: i32) -> Option<SaveError> {
        match self.classify(major, minor) {
            VersionClass::Supported => None,
            VersionClass::OutOfRange => {
                log::warn!(
                    "Save version {}.{} outside supported range {:?} {}..={}, decoding best-effort",
                    major,
                    minor,
                    self.known_majors,
                    self.min_minor,
                    self.max_minor
                );
                Some(SaveError::VersionOutOfRange {
                    major,
                    minor,
                    min_minor: self.min_minor,
                    max_minor: self.max_minor,
                })
            }
        }
    }
}
