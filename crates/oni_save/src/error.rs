use thiserror::Error;

use crate::framing::SectionKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    #[error("Unsupported save version {major}.{minor} (supported minors: {min_minor}..={max_minor})")]
    VersionOutOfRange { major: i32, minor: i32, min_minor: i32, max_minor: i32 },

    #[error("Corrupt {section} section at offset {offset}: {reason}")]
    CorruptSection { section: SectionKind, offset: usize, reason: String },

    #[error("Truncated stream at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedStream { offset: usize, needed: usize, available: usize },

    #[error("Compression error in {section} section: {message}")]
    CompressionError { section: SectionKind, message: String },

    #[error("Component '{component}' at offset {offset} kept opaque: {reason}")]
    UnknownTemplateField { component: String, offset: usize, reason: String },
}

impl SaveError {
    /// Whether parsing can continue past this error.
    ///
    /// Only header failures stop a parse; the parser decides that by stage,
    /// so every variant here is recoverable at section granularity except a
    /// truncation, which ends the stream for every later section.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SaveError::VersionOutOfRange { .. } => true,
            SaveError::UnknownTemplateField { .. } => true,
            SaveError::CompressionError { .. } => true,
            SaveError::CorruptSection { .. } => true,
            SaveError::TruncatedStream { .. } => false,
        }
    }

    /// Re-tag a cursor-level error with the section it happened in.
    pub fn in_section(self, kind: SectionKind) -> Self {
        match self {
            SaveError::CorruptSection { offset, reason, .. } => {
                SaveError::CorruptSection { section: kind, offset, reason }
            }
            SaveError::CompressionError { message, .. } => {
                SaveError::CompressionError { section: kind, message }
            }
            other => other,
        }
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        SaveError::CorruptSection { section: SectionKind::Unknown, offset, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, SaveError>;
