//! # oni_save - Template-described save file codec
//!
//! Reads and writes ONI-style colony saves: a small JSON-carrying header
//! followed by six framed, optionally zlib-compressed sections. Known
//! structures (type templates, the game object graph) are decoded into typed
//! values; everything else is carried as opaque bytes so a parsed save can be
//! written back with its content intact.
//!
//! ## Features
//! - Byte-exact round trips for uncompressed saves, content-exact for compressed ones
//! - Per-section error recovery: one bad section never hides the others
//! - Resumable, cancellable step-wise parsing
//! - Stable JSON projection for downstream consumers

// Large enum variants - the parser hands itself back by value on every step
#![allow(clippy::large_enum_variant)]

pub mod config;
pub mod contract;
pub mod cursor;
pub mod document;
pub mod error;
pub mod framing;
pub mod objects;
pub mod parser;
pub mod template;
pub mod version;
pub mod writer;

pub use config::CodecConfig;
pub use contract::{project, project_outcome, ContractDocument, CONTRACT_VERSION};
pub use document::{BlobSection, OpaqueBlob, SaveDocument, SaveHeader, Section};
pub use error::{Result, SaveError};
pub use framing::{logical_image, SectionInfo, SectionKind, SectionStatus};
pub use objects::{
    Component, ComponentBody, ComponentInstance, GameObject, GameObjectGroup, GameObjects, GroupWalk, ObjectDecoder, Value,
};
pub use parser::{parse, parse_with, parse_with_progress, ParseOutcome, Progress, SaveParser, Stage, Step};
pub use template::{TemplateRegistry, TypeTemplate};
pub use version::{VersionClass, VersionPolicy};
pub use writer::{write_document, SaveWriter};
