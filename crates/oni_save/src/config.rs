//! Codec configuration

use serde::{Deserialize, Serialize};

use crate::version::VersionPolicy;

/// Tunables for parsing and writing saves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Versions accepted without a warning
    pub version_policy: VersionPolicy,

    // === Writing ===
    /// zlib level used when re-compressing sections, 0-9 (default: 6)
    pub compression_level: u32,

    // === Limits ===
    /// Largest decompressed section accepted (default: 512 MiB)
    pub max_section_size: usize,
    /// Deepest template nesting decoded before a component is kept opaque (default: 32)
    pub max_template_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version_policy: VersionPolicy::default(),
            compression_level: 6,
            max_section_size: 512 * 1024 * 1024,
            max_template_depth: 32,
        }
    }
}

impl CodecConfig {
    /// Small limits for untrusted input.
    pub fn strict() -> Self {
        Self { max_section_size: 64 * 1024 * 1024, max_template_depth: 8, ..Self::default() }
    }

    /// Generous limits for very large colonies.
    pub fn lenient() -> Self {
        Self { max_section_size: 1024 * 1024 * 1024, max_template_depth: 128, ..Self::default() }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str::<CodecConfig>(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
compression_level: 9
version_policy:
  max_minor: 40
"#;
        let config = CodecConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.version_policy.max_minor, 40);
        assert_eq!(config.version_policy.min_minor, 11);
        assert_eq!(config.version_policy.known_majors, vec![7]);
        assert_eq!(config.max_template_depth, 32);
    }

    #[test]
    fn test_presets() {
        assert!(CodecConfig::strict().max_section_size < CodecConfig::default().max_section_size);
        assert!(CodecConfig::lenient().max_template_depth > CodecConfig::default().max_template_depth);
        assert_eq!(CodecConfig::strict().version_policy, VersionPolicy::default());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(CodecConfig::from_yaml_str("compression_level: [1, 2]").is_err());
    }
}
