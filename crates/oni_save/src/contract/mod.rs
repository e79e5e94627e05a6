//! Stable JSON contract
//!
//! Projects a `SaveDocument` into the versioned, agent-facing JSON document.
//! Projection is total: whatever state the document is in, every top-level
//! key is present and undecoded data shows up as nulls or empty collections.

mod duplicants;
mod world;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::document::SaveDocument;
use crate::framing::SectionInfo;
use crate::parser::ParseOutcome;

pub use duplicants::{DuplicantEntry, Duplicants, Identity, PositionEntry, Vitals};
pub use world::{structures_histogram, temperature_bucket, Histograms, WorldGridSummary};

pub const CONTRACT_VERSION: &str = "0.1";

/// String-keyed map that serialises in insertion order.
pub type OrderedMap<V> = IndexMap<String, V>;

/// Add `n` to the count under `key`, appending the key if it is new.
pub fn add_count(counts: &mut OrderedMap<u64>, key: &str, n: u64) {
    match counts.get_mut(key) {
        Some(count) => *count += n,
        None => {
            counts.insert(key.to_string(), n);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// `"major.minor"`
    pub version: String,
    pub cycles: u64,
    pub duplicant_count: u64,
    pub base_name: String,
    pub cluster_id: String,
    pub game_info: Map<String, JsonValue>,
    pub header_version: u32,
    pub compressed: bool,
    pub dlc_ids: Vec<String>,
    pub has_dlc: bool,
    pub has_mods: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub group_count: usize,
    pub total_instances: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub sections: Vec<SectionInfo>,
    pub summary: ObjectSummary,
    pub warnings: Vec<String>,
}

/// The contract document, serialised with `serde_json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractDocument {
    pub contract_version: String,
    pub metadata: Metadata,
    pub duplicants: Duplicants,
    pub world_grid_summary: WorldGridSummary,
    pub object_group_counts: OrderedMap<u64>,
    pub diagnostics: Diagnostics,
}

impl ContractDocument {
    pub fn to_value(&self) -> serde_json::Result<JsonValue> {
        serde_json::to_value(self)
    }

    pub fn to_json_string(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

fn metadata(doc: &SaveDocument) -> Metadata {
    let header = &doc.header;
    Metadata {
        version: header.version_string(),
        cycles: header.cycles(),
        duplicant_count: header.duplicant_count(),
        base_name: header.base_name().to_string(),
        cluster_id: header.cluster_id().to_string(),
        game_info: header.game_info().clone(),
        header_version: header.header_version(),
        compressed: header.is_compressed(),
        dlc_ids: header.dlc_ids(),
        has_dlc: header.has_dlc(),
        has_mods: header.has_mods(),
    }
}

fn object_group_counts(doc: &SaveDocument) -> OrderedMap<u64> {
    let mut counts = OrderedMap::new();
    if let Some(objects) = doc.objects() {
        for group in &objects.groups {
            add_count(&mut counts, &group.name, group.objects.len() as u64);
        }
    }
    counts
}

/// Project a document into the contract.
pub fn project(doc: &SaveDocument) -> ContractDocument {
    let summary = doc.objects().map_or(
        ObjectSummary { group_count: 0, total_instances: 0 },
        |objects| ObjectSummary {
            group_count: objects.groups.len(),
            total_instances: objects.total_objects(),
        },
    );
    let object_group_counts = object_group_counts(doc);

    ContractDocument {
        contract_version: CONTRACT_VERSION.to_string(),
        metadata: metadata(doc),
        duplicants: duplicants::project(doc),
        world_grid_summary: world::project(doc, &object_group_counts),
        object_group_counts,
        diagnostics: Diagnostics { sections: doc.sections.clone(), summary, warnings: Vec::new() },
    }
}

/// Project a parse result, carrying its warnings into the diagnostics.
pub fn project_outcome(outcome: &ParseOutcome) -> ContractDocument {
    let mut contract = project(&outcome.document);
    contract.diagnostics.warnings = outcome.warnings.iter().map(ToString::to_string).collect();
    contract
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteWriter;
    use crate::document::{OpaqueBlob, SaveHeader, Section};
    use crate::objects::ComponentBody;
    use crate::parser::parse;
    use serde_json::json;

    /// Header 7.36 uncompressed, one "Minion" with an 8-byte component that
    /// has no template.
    fn minion_save() -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_i32(7);
        w.write_i32(36);
        w.write_u32(1);
        w.write_string(r#"{"baseName":"Minion Test","numberOfCycles":3}"#);
        w.write_u32(0);

        let frame = |w: &mut ByteWriter, bytes: &[u8]| {
            w.write_u32(bytes.len() as u32);
            w.write_bytes(bytes);
        };
        frame(&mut w, &0i32.to_le_bytes()); // no templates
        frame(&mut w, &[]);
        frame(&mut w, &[]);
        frame(&mut w, &[]);

        let mut objects = ByteWriter::new();
        objects.write_i32(1);
        objects.write_string("Minion");
        objects.write_i32(1);
        objects.write_i32(100);
        objects.write_u8(0);
        objects.write_i32(1);
        objects.write_string("MinionIdentity");
        objects.write_i32(8);
        objects.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        frame(&mut w, objects.as_slice());
        frame(&mut w, &[]);
        w.into_inner()
    }

    #[test]
    fn test_minion_with_unknown_component() {
        let outcome = parse(&minion_save()).unwrap();
        assert!(outcome.is_clean());
        let group = outcome.document.objects().unwrap().group("Minion").unwrap();
        assert_eq!(group.objects.len(), 1);
        match &group.objects[0].components[0].body {
            ComponentBody::Opaque(blob) => assert_eq!(blob.len(), 8),
            other => panic!("expected opaque component, got {:?}", other),
        }

        let contract = project_outcome(&outcome);
        assert_eq!(contract.object_group_counts.get("Minion"), Some(&1));
        let value = contract.to_value().unwrap();
        assert_eq!(value["object_group_counts"]["Minion"], json!(1));
        assert_eq!(value["metadata"]["version"], json!("7.36"));
        assert_eq!(value["metadata"]["cycles"], json!(3));
        assert_eq!(value["duplicants"]["count"], json!(1));
        let entry = &value["duplicants"]["list"][0];
        assert_eq!(entry["role"], json!("NoRole"));
        assert_eq!(entry["identity"]["name"], JsonValue::Null);
        assert_eq!(entry["instance_id"], json!(100));

        // The opaque component goes back out byte for byte
        assert_eq!(outcome.document.to_bytes().unwrap(), minion_save());
    }

    #[test]
    fn test_contract_keys_always_present() {
        let mut doc = SaveDocument::new(SaveHeader::new(7, 40, json!(null), true));
        doc.templates = Section::Opaque(OpaqueBlob::new(vec![0xff]));
        doc.game_objects = Section::Missing;
        let value = project(&doc).to_value().unwrap();

        for key in ["metadata", "duplicants", "world_grid_summary", "object_group_counts"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        for key in ["version", "cycles", "duplicant_count", "base_name", "cluster_id", "game_info"] {
            assert!(value["metadata"].get(key).is_some(), "missing metadata.{}", key);
        }
        assert_eq!(value["duplicants"]["count"], json!(0));
        assert_eq!(value["duplicants"]["list"], json!([]));
        let summary = &value["world_grid_summary"];
        for key in ["width", "height", "cell_count", "histograms", "breathable_percent", "warnings"] {
            assert!(summary.get(key).is_some(), "missing world_grid_summary.{}", key);
        }
        let histogram_keys: Vec<&String> = summary["histograms"].as_object().unwrap().keys().collect();
        assert_eq!(histogram_keys, ["elements", "temperatures", "diseases", "radiation"]);
        assert_eq!(summary["breathable_percent"], JsonValue::Null);
        assert_eq!(summary["cell_count"], json!(0));
        assert_eq!(value["object_group_counts"], json!({}));
    }

    #[test]
    fn test_game_info_order_survives_serialisation() {
        let outcome = parse(&minion_save()).unwrap();
        let text = project(&outcome.document).to_json_string(false).unwrap();
        let base = text.find("\"baseName\"").unwrap();
        let cycles = text.find("\"numberOfCycles\"").unwrap();
        assert!(base < cycles);
    }

    #[test]
    fn test_group_counts_keep_stream_order_and_sum_duplicates() {
        let mut counts = OrderedMap::new();
        add_count(&mut counts, "Tile", 4);
        add_count(&mut counts, "Minion", 1);
        add_count(&mut counts, "Tile", 2);
        let value = serde_json::to_value(&counts).unwrap();
        assert_eq!(value, json!({"Tile": 6, "Minion": 1}));
        let keys: Vec<&str> = counts.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Tile", "Minion"]);
    }

    #[test]
    fn test_outcome_warnings_reach_diagnostics() {
        let mut bytes = minion_save();
        bytes[4] = 37; // minor
        let outcome = parse(&bytes).unwrap();
        let contract = project_outcome(&outcome);
        assert_eq!(contract.diagnostics.warnings.len(), 1);
        assert!(contract.diagnostics.warnings[0].contains("7.37"));
        assert_eq!(contract.diagnostics.sections.len(), 6);
        assert_eq!(contract.diagnostics.summary, ObjectSummary { group_count: 1, total_instances: 1 });
    }
}
