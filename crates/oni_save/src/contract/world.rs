//! World grid summary.
//!
//! The simulation section stays opaque, so the cell histograms are empty and
//! `breathable_percent` is null. Temperatures come from the decoded
//! `PrimaryElement` components of the object graph instead.

use serde::Serialize;

use super::{add_count, OrderedMap};
use crate::document::{BlobSection, SaveDocument};
use crate::objects::Value;

const PRIMARY_ELEMENT: &str = "PrimaryElement";
const TEMPERATURE_FIELDS: &[&str] = &["Temperature", "temperature", "_Temperature"];

/// Kelvin thresholds between temperature buckets.
const TEMPERATURE_EDGES: [f64; 5] = [240.0, 280.0, 300.0, 320.0, 360.0];
const TEMPERATURE_LABELS: [&str; 6] = ["<240K", "240-280K", "280-300K", "300-320K", "320-360K", ">360K"];

/// Groups shown individually in the structures histogram.
pub const STRUCTURES_TOP_N: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Histograms {
    pub elements: OrderedMap<u64>,
    pub temperatures: OrderedMap<u64>,
    pub diseases: OrderedMap<u64>,
    pub radiation: OrderedMap<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldGridSummary {
    pub width: u64,
    pub height: u64,
    pub cell_count: u64,
    pub histograms: Histograms,
    pub breathable_percent: Option<f64>,
    /// Object groups by size, largest first, the tail folded into `other`
    pub structures: OrderedMap<u64>,
    pub warnings: Vec<String>,
}

/// Bucket label for a Kelvin temperature, `None` for non-physical values.
pub fn temperature_bucket(kelvin: f64) -> Option<&'static str> {
    if !kelvin.is_finite() || kelvin <= 0.0 {
        return None;
    }
    let idx = TEMPERATURE_EDGES.iter().position(|&edge| kelvin < edge).unwrap_or(TEMPERATURE_EDGES.len());
    Some(TEMPERATURE_LABELS[idx])
}

/// Keep the `top_n` largest groups, summing the rest under `other`.
pub fn structures_histogram(group_counts: &OrderedMap<u64>, top_n: usize) -> OrderedMap<u64> {
    let mut items: Vec<(&str, u64)> = group_counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    // stable: ties keep stream order
    items.sort_by(|a, b| b.1.cmp(&a.1));

    let mut histogram = OrderedMap::new();
    let split = top_n.min(items.len());
    for (name, count) in &items[..split] {
        add_count(&mut histogram, name, *count);
    }
    let other: u64 = items[split..].iter().map(|(_, count)| count).sum();
    if other > 0 {
        add_count(&mut histogram, "other", other);
    }
    histogram
}

fn temperature_histogram(doc: &SaveDocument) -> OrderedMap<u64> {
    let mut buckets = [0u64; TEMPERATURE_LABELS.len()];
    let instances = doc
        .objects()
        .into_iter()
        .flat_map(|objects| objects.groups.iter())
        .flat_map(|group| group.objects.iter())
        .filter_map(|object| object.decoded_component(&[PRIMARY_ELEMENT]));
    for element in instances {
        let kelvin = TEMPERATURE_FIELDS.iter().find_map(|f| element.field(f).and_then(Value::as_f64));
        if let Some(label) = kelvin.and_then(temperature_bucket) {
            if let Some(idx) = TEMPERATURE_LABELS.iter().position(|l| *l == label) {
                buckets[idx] += 1;
            }
        }
    }

    let mut histogram = OrderedMap::new();
    for (label, count) in TEMPERATURE_LABELS.iter().zip(buckets) {
        if count > 0 {
            add_count(&mut histogram, label, count);
        }
    }
    histogram
}

fn warnings(doc: &SaveDocument, width: u64, height: u64) -> Vec<String> {
    let mut warnings = Vec::new();
    if width == 0 || height == 0 {
        warnings.push("world dimensions missing from header".to_string());
    }
    warnings.push(
        match doc.sim {
            BlobSection::Present(_) => "simulation data kept opaque; cell histograms unavailable",
            BlobSection::Unreadable(_) => "simulation section could not be decompressed",
            BlobSection::Missing => "simulation section missing from stream",
        }
        .to_string(),
    );
    if doc.objects().is_none() {
        warnings.push("object graph not decoded; temperature histogram unavailable".to_string());
    }
    warnings
}

pub(super) fn project(doc: &SaveDocument, group_counts: &OrderedMap<u64>) -> WorldGridSummary {
    let (width, height) = doc.header.world_size();
    let cell_count = if width > 0 && height > 0 { width.saturating_mul(height) } else { 0 };
    WorldGridSummary {
        width,
        height,
        cell_count,
        histograms: Histograms { temperatures: temperature_histogram(doc), ..Histograms::default() },
        breathable_percent: None,
        structures: structures_histogram(group_counts, STRUCTURES_TOP_N),
        warnings: warnings(doc, width, height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SaveHeader, Section};
    use crate::objects::{Component, ComponentInstance, FieldValue, GameObject, GameObjectGroup, GameObjects};
    use serde_json::json;

    fn element(kelvin: f32) -> GameObject {
        GameObject {
            instance_id: 0,
            position: None,
            components: vec![Component::decoded(ComponentInstance::new(
                PRIMARY_ELEMENT,
                vec![FieldValue::new("Temperature", Value::F32(kelvin))],
            ))],
        }
    }

    #[test]
    fn test_temperature_buckets() {
        assert_eq!(temperature_bucket(239.9), Some("<240K"));
        assert_eq!(temperature_bucket(240.0), Some("240-280K"));
        assert_eq!(temperature_bucket(293.15), Some("280-300K"));
        assert_eq!(temperature_bucket(360.0), Some(">360K"));
        assert_eq!(temperature_bucket(0.0), None);
        assert_eq!(temperature_bucket(f64::NAN), None);
    }

    #[test]
    fn test_summary_from_header_and_objects() {
        let mut doc = SaveDocument::new(SaveHeader::new(
            7,
            36,
            json!({"WidthInCells": 256, "HeightInCells": 384}),
            false,
        ));
        doc.game_objects = Section::Decoded(GameObjects::new(vec![GameObjectGroup::new(
            "Tile",
            vec![element(293.15), element(295.0), element(500.0), element(f32::NAN)],
        )]));
        let mut counts = OrderedMap::new();
        add_count(&mut counts, "Tile", 4);

        let summary = project(&doc, &counts);
        assert_eq!(summary.cell_count, 256 * 384);
        assert_eq!(summary.histograms.temperatures.get("280-300K"), Some(&2));
        assert_eq!(summary.histograms.temperatures.get(">360K"), Some(&1));
        assert_eq!(summary.histograms.temperatures.len(), 2);
        assert!(summary.histograms.elements.is_empty());
        assert_eq!(summary.breathable_percent, None);
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn test_missing_dimensions_give_zero_cells() {
        let mut doc = SaveDocument::new(SaveHeader::new(7, 36, json!({"WidthInCells": 256}), false));
        doc.game_objects = Section::Missing;
        let summary = project(&doc, &OrderedMap::new());
        assert_eq!(summary.cell_count, 0);
        assert_eq!(summary.warnings.len(), 3);
    }

    #[test]
    fn test_structures_histogram_folds_tail() {
        let mut counts = OrderedMap::new();
        for (name, n) in [("Tile", 40), ("Ladder", 5), ("Door", 9), ("Bed", 5)] {
            add_count(&mut counts, name, n);
        }
        let histogram = structures_histogram(&counts, 2);
        let entries: Vec<(&str, u64)> = histogram.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(entries, vec![("Tile", 40), ("Door", 9), ("other", 10)]);
        assert!(structures_histogram(&OrderedMap::new(), 2).is_empty());
    }
}
