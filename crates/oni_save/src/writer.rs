//! Round-trip writer
//!
//! Re-serialises a `SaveDocument`. Counts and component lengths are
//! recomputed from what is actually emitted; everything kept as bytes goes
//! out unchanged.

use std::borrow::Cow;

use crate::config::CodecConfig;
use crate::cursor::ByteWriter;
use crate::document::{BlobSection, SaveDocument, Section};
use crate::error::Result;
use crate::framing::{frame_section, write_frame, SectionKind};

/// Byte counts of the last `write`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub sections_written: usize,
    pub logical_bytes: usize,
    pub physical_bytes: usize,
}

enum Payload<'d> {
    /// Needs framing (and compression when the header asks for it)
    Logical(Cow<'d, [u8]>),
    /// Already in on-disk form
    Physical(&'d [u8]),
    Missing,
}

fn section_payload<T>(section: &Section<T>, encode: impl FnOnce(&T) -> Vec<u8>) -> Payload<'_> {
    match section {
        Section::Decoded(value) => Payload::Logical(Cow::Owned(encode(value))),
        Section::Opaque(blob) => Payload::Logical(Cow::Borrowed(&blob.bytes)),
        Section::Unreadable(blob) => Payload::Physical(&blob.bytes),
        Section::Missing => Payload::Missing,
    }
}

fn blob_payload(section: &BlobSection) -> Payload<'_> {
    match section {
        BlobSection::Present(blob) => Payload::Logical(Cow::Borrowed(&blob.bytes)),
        BlobSection::Unreadable(blob) => Payload::Physical(&blob.bytes),
        BlobSection::Missing => Payload::Missing,
    }
}

fn payload(doc: &SaveDocument, kind: SectionKind) -> Payload<'_> {
    match kind {
        SectionKind::Templates => section_payload(&doc.templates, |r| r.to_bytes()),
        SectionKind::GameObjects => section_payload(&doc.game_objects, |o| o.to_bytes()),
        other => doc.blob_section(other).map_or(Payload::Missing, blob_payload),
    }
}

pub struct SaveWriter {
    compression_level: u32,
    stats: WriteStats,
}

impl SaveWriter {
    pub fn new(config: &CodecConfig) -> Self {
        Self { compression_level: config.compression_level, stats: WriteStats::default() }
    }

    pub fn write(&mut self, doc: &SaveDocument) -> Result<Vec<u8>> {
        let mut stats = WriteStats::default();
        let mut out = ByteWriter::new();
        doc.header.write(&mut out);

        let compressed = doc.header.is_compressed();
        let mut complete = true;
        for kind in SectionKind::FRAMED {
            let physical = match payload(doc, kind) {
                // A missing section means the source stream ended here
                Payload::Missing => {
                    complete = false;
                    break;
                }
                Payload::Physical(bytes) => Cow::Borrowed(bytes),
                Payload::Logical(logical) => {
                    stats.logical_bytes += logical.len();
                    Cow::Owned(
                        frame_section(&logical, compressed, self.compression_level)
                            .map_err(|e| e.in_section(kind))?,
                    )
                }
            };
            stats.physical_bytes += physical.len();
            stats.sections_written += 1;
            write_frame(&mut out, &physical);
        }
        if complete {
            out.write_bytes(&doc.trailing);
        }

        self.stats = stats;
        Ok(out.into_inner())
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

/// Serialise a document with the given configuration.
pub fn write_document(doc: &SaveDocument, config: &CodecConfig) -> Result<Vec<u8>> {
    SaveWriter::new(config).write(doc)
}

impl SaveDocument {
    /// Serialise with the default configuration.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        write_document(self, &CodecConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{OpaqueBlob, SaveHeader};
    use crate::framing::logical_image;
    use crate::objects::{Component, ComponentInstance, FieldValue, GameObject, GameObjectGroup, GameObjects, Position, Value};
    use crate::parser::parse;
    use crate::template::{FieldDescriptor, PrimitiveKind, TemplateRegistry, TypeTemplate};
    use serde_json::json;

    fn sample_document(compressed: bool) -> SaveDocument {
        let header = SaveHeader::new(
            7,
            36,
            json!({"baseName": "Rocky", "numberOfCycles": 12, "numberOfDuplicants": 1}),
            compressed,
        );
        let mut doc = SaveDocument::new(header);
        doc.templates = Section::Decoded(TemplateRegistry::from_templates(vec![TypeTemplate::new(
            "PrimaryElement",
            vec![
                FieldDescriptor::primitive("ElementID", PrimitiveKind::I32),
                FieldDescriptor::primitive("Temperature", PrimitiveKind::F32),
            ],
        )]));
        doc.world = BlobSection::Present(OpaqueBlob::new(vec![3u8; 64]));
        doc.sim = BlobSection::Present(OpaqueBlob::new((0..=255u8).collect()));
        let element = ComponentInstance::new(
            "PrimaryElement",
            vec![
                FieldValue::new("ElementID", Value::I32(1836671383)),
                FieldValue::new("Temperature", Value::F32(293.15)),
            ],
        );
        doc.game_objects = Section::Decoded(GameObjects::new(vec![GameObjectGroup::new(
            "Tile",
            vec![GameObject {
                instance_id: 5,
                position: Some(Position { x: 1.0, y: 2.0 }),
                components: vec![Component::decoded(element), Component::opaque("Building", vec![1, 2, 3])],
            }],
        )]));
        doc.trailing = vec![0xee];
        doc
    }

    #[test]
    fn test_uncompressed_round_trip_is_byte_exact() {
        let bytes = sample_document(false).to_bytes().unwrap();
        let outcome = parse(&bytes).unwrap();
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.document.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_compressed_round_trip_is_identical_after_decompression() {
        let config = CodecConfig::default();
        let bytes = sample_document(true).to_bytes().unwrap();
        let outcome = parse(&bytes).unwrap();
        let rewritten = outcome.document.to_bytes().unwrap();
        assert_eq!(logical_image(&rewritten, &config).unwrap(), logical_image(&bytes, &config).unwrap());
        assert_eq!(parse(&rewritten).unwrap().document.objects(), outcome.document.objects());
    }

    #[test]
    fn test_recomputes_counts_from_emitted_objects() {
        let mut doc = sample_document(false);
        if let Section::Decoded(objects) = &mut doc.game_objects {
            objects.groups[0].declared_count = 99;
        }
        let outcome = parse(&doc.to_bytes().unwrap()).unwrap();
        let group = &outcome.document.objects().unwrap().groups[0];
        assert_eq!(group.declared_count, 1);
        assert_eq!(group.objects.len(), 1);
    }

    #[test]
    fn test_missing_sections_end_the_stream() {
        let mut doc = sample_document(false);
        doc.game_objects = Section::Missing;
        doc.game_data = BlobSection::Missing;
        let mut writer = SaveWriter::new(&CodecConfig::default());
        let bytes = writer.write(&doc).unwrap();
        assert_eq!(writer.stats().sections_written, 4);
        let outcome = parse(&bytes).unwrap();
        assert_eq!(outcome.document.game_objects, Section::Missing);
        assert!(outcome.document.trailing.is_empty());
    }

    #[test]
    fn test_unreadable_sections_are_written_verbatim() {
        let mut doc = sample_document(true);
        doc.settings = BlobSection::Unreadable(OpaqueBlob::new(b"not zlib".to_vec()));
        let bytes = doc.to_bytes().unwrap();
        let outcome = parse(&bytes).unwrap();
        assert_eq!(outcome.document.settings, doc.settings);
        assert_eq!(outcome.document.to_bytes().unwrap().len(), bytes.len());
    }
}
