//! Save document model
//!
//! A `SaveDocument` owns everything read from one stream: the header, the
//! template registry, the decoded object graph and every section kept as raw
//! bytes. Nothing in it is shared with other documents.

use serde_json::{Map, Value as JsonValue};

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{Result, SaveError};
use crate::framing::{SectionInfo, SectionKind, SectionStatus};
use crate::objects::GameObjects;
use crate::template::TemplateRegistry;

/// Header versions from this one on carry a compression flag.
pub const COMPRESSION_FLAG_HEADER_VERSION: u32 = 1;

/// Bytes kept verbatim because they were not (or could not be) interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpaqueBlob {
    pub bytes: Vec<u8>,
}

impl OpaqueBlob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// Header
// ============================================================================

/// Uncompressed preamble of a save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveHeader {
    major: i32,
    minor: i32,
    header_version: u32,
    game_info: Map<String, JsonValue>,
    raw_info: String,
    compression_flag: u32,
    info_error: Option<SaveError>,
}

impl SaveHeader {
    /// Header for a new stream; `game_info` must be a JSON object to be
    /// exposed through the accessors.
    pub fn new(major: i32, minor: i32, game_info: JsonValue, compressed: bool) -> Self {
        let raw_info = game_info.to_string();
        let game_info = match game_info {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            major,
            minor,
            header_version: COMPRESSION_FLAG_HEADER_VERSION,
            game_info,
            raw_info,
            compression_flag: u32::from(compressed),
            info_error: None,
        }
    }

    /// Read the header. Truncation or a malformed string is an error; game
    /// info that is not a JSON object only leaves `game_info` empty and is
    /// reported through `info_error`.
    pub fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let retag = |e: SaveError| e.in_section(SectionKind::Header);
        let major = r.read_i32().map_err(retag)?;
        let minor = r.read_i32().map_err(retag)?;
        let header_version = r.read_u32().map_err(retag)?;
        let info_offset = r.offset();
        let raw_info = r.read_string().map_err(retag)?;
        let compression_flag = if header_version >= COMPRESSION_FLAG_HEADER_VERSION {
            r.read_u32().map_err(retag)?
        } else {
            0
        };

        let (game_info, info_error) = match serde_json::from_str::<JsonValue>(&raw_info) {
            Ok(JsonValue::Object(map)) => (map, None),
            Ok(other) => (
                Map::new(),
                Some(SaveError::CorruptSection {
                    section: SectionKind::Header,
                    offset: info_offset,
                    reason: format!("game info is not a JSON object ({})", json_kind(&other)),
                }),
            ),
            Err(e) => (
                Map::new(),
                Some(SaveError::CorruptSection {
                    section: SectionKind::Header,
                    offset: info_offset,
                    reason: format!("game info is not valid JSON: {}", e),
                }),
            ),
        };

        Ok(Self { major, minor, header_version, game_info, raw_info, compression_flag, info_error })
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.write_i32(self.major);
        w.write_i32(self.minor);
        w.write_u32(self.header_version);
        w.write_string(&self.raw_info);
        if self.header_version >= COMPRESSION_FLAG_HEADER_VERSION {
            w.write_u32(self.compression_flag);
        }
    }

    pub fn major(&self) -> i32 {
        self.major
    }

    pub fn minor(&self) -> i32 {
        self.minor
    }

    /// `"major.minor"`
    pub fn version_string(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn header_version(&self) -> u32 {
        self.header_version
    }

    pub fn compression_flag(&self) -> u32 {
        self.compression_flag
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_flag != 0
    }

    /// Game info in stream order.
    pub fn game_info(&self) -> &Map<String, JsonValue> {
        &self.game_info
    }

    /// Game info JSON exactly as stored.
    pub fn raw_info(&self) -> &str {
        &self.raw_info
    }

    pub fn info_error(&self) -> Option<&SaveError> {
        self.info_error.as_ref()
    }

    fn first(&self, keys: &[&str]) -> Option<&JsonValue> {
        keys.iter().find_map(|k| self.game_info.get(*k).filter(|v| truthy(v)))
    }

    fn non_negative(&self, keys: &[&str]) -> u64 {
        self.first(keys).and_then(json_to_u64).unwrap_or(0)
    }

    pub fn cycles(&self) -> u64 {
        self.non_negative(&["numberOfCycles", "cycles"])
    }

    pub fn duplicant_count(&self) -> u64 {
        self.non_negative(&["numberOfDuplicants", "duplicants"])
    }

    pub fn base_name(&self) -> &str {
        self.first(&["baseName"]).and_then(JsonValue::as_str).unwrap_or("")
    }

    pub fn cluster_id(&self) -> &str {
        self.first(&["clusterId", "ClusterId"]).and_then(JsonValue::as_str).unwrap_or("")
    }

    /// World size in cells, zero when absent.
    pub fn world_size(&self) -> (u64, u64) {
        (
            self.non_negative(&["WidthInCells", "widthInCells"]),
            self.non_negative(&["HeightInCells", "heightInCells"]),
        )
    }

    pub fn dlc_ids(&self) -> Vec<String> {
        match self.first(&["dlcIds", "DlcIds"]) {
            Some(JsonValue::String(id)) => vec![id.clone()],
            Some(JsonValue::Array(ids)) => ids
                .iter()
                .map(|id| match id {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_dlc(&self) -> bool {
        self.first(&["hasDlc", "hasDLc", "hasDLC", "enableDlc", "expansionEnabled"]).is_some()
            || !self.dlc_ids().is_empty()
    }

    pub fn has_mods(&self) -> bool {
        matches!(
            self.first(&["mods", "Mods", "enabledMods"]),
            Some(JsonValue::Array(_)) | Some(JsonValue::Object(_))
        )
    }
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

fn json_to_u64(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        JsonValue::String(s) => s.trim().parse::<i64>().ok().map(|i| i.max(0) as u64),
        _ => None,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

// ============================================================================
// Sections
// ============================================================================

/// A section the codec knows how to decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    Decoded(T),
    /// Logical bytes kept because decoding failed
    Opaque(OpaqueBlob),
    /// Physical bytes kept because decompression failed
    Unreadable(OpaqueBlob),
    /// The stream ended before this section
    Missing,
}

impl<T> Section<T> {
    pub fn decoded(&self) -> Option<&T> {
        match self {
            Section::Decoded(value) => Some(value),
            _ => None,
        }
    }

    pub fn status(&self) -> SectionStatus {
        match self {
            Section::Decoded(_) => SectionStatus::Decoded,
            Section::Opaque(_) => SectionStatus::Opaque,
            Section::Unreadable(_) => SectionStatus::Unreadable,
            Section::Missing => SectionStatus::Missing,
        }
    }
}

/// A section that is only ever carried as bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobSection {
    Present(OpaqueBlob),
    Unreadable(OpaqueBlob),
    Missing,
}

impl BlobSection {
    pub fn blob(&self) -> Option<&OpaqueBlob> {
        match self {
            BlobSection::Present(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn status(&self) -> SectionStatus {
        match self {
            BlobSection::Present(_) => SectionStatus::Opaque,
            BlobSection::Unreadable(_) => SectionStatus::Unreadable,
            BlobSection::Missing => SectionStatus::Missing,
        }
    }
}

impl Default for BlobSection {
    fn default() -> Self {
        BlobSection::Present(OpaqueBlob::default())
    }
}

// ============================================================================
// Document
// ============================================================================

/// Everything read from one save stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveDocument {
    pub header: SaveHeader,
    pub templates: Section<TemplateRegistry>,
    pub world: BlobSection,
    pub settings: BlobSection,
    pub sim: BlobSection,
    pub game_objects: Section<GameObjects>,
    pub game_data: BlobSection,
    /// Bytes after the last section
    pub trailing: Vec<u8>,
    /// Diagnostics for each framed section, in stream order
    pub sections: Vec<SectionInfo>,
}

impl SaveDocument {
    /// Document with empty, fully decoded sections.
    pub fn new(header: SaveHeader) -> Self {
        Self {
            header,
            templates: Section::Decoded(TemplateRegistry::new()),
            world: BlobSection::default(),
            settings: BlobSection::default(),
            sim: BlobSection::default(),
            game_objects: Section::Decoded(GameObjects::default()),
            game_data: BlobSection::default(),
            trailing: Vec::new(),
            sections: Vec::new(),
        }
    }

    pub fn registry(&self) -> Option<&TemplateRegistry> {
        self.templates.decoded()
    }

    pub fn objects(&self) -> Option<&GameObjects> {
        self.game_objects.decoded()
    }

    pub fn blob_section(&self, kind: SectionKind) -> Option<&BlobSection> {
        match kind {
            SectionKind::World => Some(&self.world),
            SectionKind::Settings => Some(&self.settings),
            SectionKind::Sim => Some(&self.sim),
            SectionKind::GameData => Some(&self.game_data),
            _ => None,
        }
    }

    pub fn section_status(&self, kind: SectionKind) -> SectionStatus {
        match kind {
            SectionKind::Templates => self.templates.status(),
            SectionKind::GameObjects => self.game_objects.status(),
            SectionKind::Header => SectionStatus::Decoded,
            other => self.blob_section(other).map_or(SectionStatus::Missing, BlobSection::status),
        }
    }

    pub fn section_info(&self, kind: SectionKind) -> Option<&SectionInfo> {
        self.sections.iter().find(|info| info.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header_bytes(version: u32, info: &str, flag: Option<u32>) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_i32(7);
        w.write_i32(36);
        w.write_u32(version);
        w.write_string(info);
        if let Some(flag) = flag {
            w.write_u32(flag);
        }
        w.into_inner()
    }

    #[test]
    fn test_header_preserves_game_info_order_and_text() {
        let info = r#"{"numberOfCycles": 42,"baseName":"Rocky","clusterId":"SandstoneDefault","WidthInCells":256,"HeightInCells":384}"#;
        let bytes = header_bytes(1, info, Some(1));
        let mut r = ByteReader::new(&bytes);
        let header = SaveHeader::read(&mut r).unwrap();
        assert!(r.is_empty());
        assert!(header.is_compressed());
        assert_eq!(header.version_string(), "7.36");
        assert_eq!(header.cycles(), 42);
        assert_eq!(header.base_name(), "Rocky");
        assert_eq!(header.cluster_id(), "SandstoneDefault");
        assert_eq!(header.world_size(), (256, 384));
        let keys: Vec<&str> = header.game_info().keys().map(String::as_str).collect();
        assert_eq!(keys, ["numberOfCycles", "baseName", "clusterId", "WidthInCells", "HeightInCells"]);

        let mut w = ByteWriter::new();
        header.write(&mut w);
        assert_eq!(w.into_inner(), bytes);
    }

    #[test]
    fn test_header_version_zero_has_no_flag() {
        let bytes = header_bytes(0, "{}", None);
        let mut r = ByteReader::new(&bytes);
        let header = SaveHeader::read(&mut r).unwrap();
        assert!(!header.is_compressed());
        assert!(r.is_empty());
    }

    #[test]
    fn test_bad_game_info_is_not_fatal() {
        let bytes = header_bytes(1, "not json", Some(0));
        let header = SaveHeader::read(&mut ByteReader::new(&bytes)).unwrap();
        assert!(header.game_info().is_empty());
        assert!(matches!(header.info_error(), Some(SaveError::CorruptSection { .. })));
        assert_eq!(header.raw_info(), "not json");
    }

    #[test]
    fn test_truncated_header_is_error() {
        let bytes = header_bytes(1, "{}", Some(0));
        let cut = &bytes[..bytes.len() - 1];
        let err = SaveHeader::read(&mut ByteReader::new(cut)).unwrap_err();
        assert_eq!(err, SaveError::TruncatedStream { offset: cut.len(), needed: 4, available: 3 });
    }

    #[test]
    fn test_dlc_and_mod_normalisation() {
        let header = SaveHeader::new(
            7,
            36,
            json!({"dlcIds": "EXPANSION1_ID", "mods": [], "numberOfDuplicants": -3}),
            false,
        );
        assert_eq!(header.dlc_ids(), vec!["EXPANSION1_ID".to_string()]);
        assert!(header.has_dlc());
        assert!(!header.has_mods());
        assert_eq!(header.duplicant_count(), 0);

        let header = SaveHeader::new(7, 36, json!({"enabledMods": {"a": 1}}), false);
        assert!(header.has_mods());
        assert!(!header.has_dlc());
    }

    #[test]
    fn test_new_document_sections_are_decoded() {
        let doc = SaveDocument::new(SaveHeader::new(7, 36, json!({}), false));
        assert_eq!(doc.section_status(SectionKind::Templates), SectionStatus::Decoded);
        assert_eq!(doc.section_status(SectionKind::World), SectionStatus::Opaque);
        assert!(doc.objects().unwrap().groups.is_empty());
    }
}
