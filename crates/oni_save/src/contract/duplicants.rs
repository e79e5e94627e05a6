//! Duplicant entries from the `Minion` object group.

use serde::Serialize;

use super::OrderedMap;
use crate::document::SaveDocument;
use crate::objects::{ComponentInstance, FieldValue, GameObject, Value};

pub const MINION_GROUP: &str = "Minion";

const IDENTITY: &[&str] = &["MinionIdentity"];
const RESUME: &[&str] = &["MinionResume"];
const MODIFIERS: &[&str] = &["MinionModifiers", "Modifiers"];
const TRAITS: &[&str] = &["Traits", "Klei.AI.Traits"];
const EFFECTS: &[&str] = &["Effects", "Klei.AI.Effects"];

const DEFAULT_ROLE: &str = "NoRole";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identity {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub arrival_time: Option<i64>,
}

/// Amount values by contract key. `None` when the save does not carry one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Vitals {
    pub calories: Option<f64>,
    pub health: Option<f64>,
    pub stress: Option<f64>,
    pub stamina: Option<f64>,
    pub decor: Option<f64>,
    pub temperature: Option<f64>,
    pub breath: Option<f64>,
    pub bladder: Option<f64>,
    pub immune_level: Option<f64>,
    pub toxicity: Option<f64>,
    pub radiation_balance: Option<f64>,
    pub morale: Option<f64>,
}

impl Vitals {
    /// Slot for an in-game amount id.
    fn slot(&mut self, amount: &str) -> Option<&mut Option<f64>> {
        Some(match amount {
            "Calories" => &mut self.calories,
            "HitPoints" | "Health" => &mut self.health,
            "Stress" => &mut self.stress,
            "Stamina" => &mut self.stamina,
            "Decor" => &mut self.decor,
            "Temperature" => &mut self.temperature,
            "Breath" => &mut self.breath,
            "Bladder" => &mut self.bladder,
            "ImmuneLevel" => &mut self.immune_level,
            "Toxicity" => &mut self.toxicity,
            "RadiationBalance" => &mut self.radiation_balance,
            "QualityOfLife" => &mut self.morale,
            _ => return None,
        })
    }

    fn record(&mut self, amount: &str, value: Option<f64>) {
        if let (Some(slot), Some(value)) = (self.slot(amount), value) {
            *slot = Some(value);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionEntry {
    pub x: Option<f32>,
    pub y: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicantEntry {
    pub instance_id: i32,
    pub identity: Identity,
    pub role: String,
    pub vitals: Vitals,
    pub traits: Vec<String>,
    pub effects: Vec<String>,
    pub aptitudes: OrderedMap<f64>,
    pub position: PositionEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicants {
    pub count: u64,
    pub list: Vec<DuplicantEntry>,
}

fn string_field(instance: Option<&ComponentInstance>, names: &[&str]) -> Option<String> {
    let instance = instance?;
    names
        .iter()
        .find_map(|n| instance.field(n).and_then(Value::as_str))
        .map(str::to_string)
}

/// Strings from an array field, or the `id`/`name` of object elements.
fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => item
                .get("id")
                .or_else(|| item.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

fn list_component(object: &GameObject, names: &[&str]) -> Vec<String> {
    let Some(instance) = object.decoded_component(names) else {
        return Vec::new();
    };
    instance.fields.iter().flat_map(|f| string_list(&f.value)).collect()
}

fn vitals(object: &GameObject) -> Vitals {
    let mut vitals = Vitals::default();
    let Some(modifiers) = object.decoded_component(MODIFIERS) else {
        return vitals;
    };
    for FieldValue { name, value } in &modifiers.fields {
        match value {
            // Amount lists: [{ name/id, value }, ...]
            Value::Array(items) => {
                for item in items {
                    let amount = item.get("name").or_else(|| item.get("id")).and_then(Value::as_str);
                    if let Some(amount) = amount {
                        vitals.record(amount, item.get("value").and_then(Value::as_f64));
                    }
                }
            }
            other => vitals.record(name, other.as_f64()),
        }
    }
    vitals
}

/// Skill group → level from `AptitudeBySkillGroup` (`[{ key, value }, ...]`).
fn aptitudes(resume: Option<&ComponentInstance>) -> OrderedMap<f64> {
    let mut aptitudes = OrderedMap::new();
    let entries = resume
        .and_then(|r| r.field("AptitudeBySkillGroup"))
        .and_then(Value::as_array)
        .unwrap_or_default();
    for entry in entries {
        let key = entry.get("key").and_then(Value::as_str);
        let value = entry.get("value").and_then(Value::as_f64);
        if let (Some(key), Some(value)) = (key, value) {
            aptitudes.insert(key.to_string(), value);
        }
    }
    aptitudes
}

fn entry(object: &GameObject) -> DuplicantEntry {
    let identity = object.decoded_component(IDENTITY);
    let resume = object.decoded_component(RESUME);
    DuplicantEntry {
        instance_id: object.instance_id,
        identity: Identity {
            name: string_field(identity, &["name"]),
            gender: string_field(identity, &["gender", "genderStringKey"]),
            arrival_time: identity.and_then(|i| i.field("arrivalTime")).and_then(Value::as_i64),
        },
        role: string_field(resume, &["currentRole", "targetRole"])
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        vitals: vitals(object),
        traits: list_component(object, TRAITS),
        effects: list_component(object, EFFECTS),
        aptitudes: aptitudes(resume),
        position: PositionEntry {
            x: object.position.map(|p| p.x),
            y: object.position.map(|p| p.y),
        },
    }
}

pub(super) fn project(doc: &SaveDocument) -> Duplicants {
    let list: Vec<DuplicantEntry> = doc
        .objects()
        .and_then(|objects| objects.group(MINION_GROUP))
        .map(|group| group.objects.iter().map(entry).collect())
        .unwrap_or_default();
    let declared = doc.header.duplicant_count();
    Duplicants { count: if declared > 0 { declared } else { list.len() as u64 }, list }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SaveHeader, Section};
    use crate::objects::{Component, GameObjectGroup, GameObjects, Position};
    use serde_json::json;

    fn field(name: &str, value: Value) -> FieldValue {
        FieldValue::new(name, value)
    }

    fn pair(k: (&str, &str), v: (&str, Value)) -> Value {
        Value::Object(vec![field(k.0, Value::String(k.1.to_string())), field(v.0, v.1)])
    }

    fn minion() -> GameObject {
        GameObject {
            instance_id: 42,
            position: Some(Position { x: 12.5, y: 40.0 }),
            components: vec![
                Component::decoded(ComponentInstance::new(
                    "MinionIdentity",
                    vec![
                        field("name", Value::String("Meep".into())),
                        field("gender", Value::String("MALE".into())),
                        field("arrivalTime", Value::I32(7)),
                    ],
                )),
                Component::decoded(ComponentInstance::new(
                    "MinionResume",
                    vec![
                        field("currentRole", Value::String("Digger".into())),
                        field(
                            "AptitudeBySkillGroup",
                            Value::Array(vec![pair(("key", "Mining"), ("value", Value::F32(2.0)))]),
                        ),
                    ],
                )),
                Component::decoded(ComponentInstance::new(
                    "MinionModifiers",
                    vec![
                        field("Stress", Value::F32(12.0)),
                        field(
                            "amounts",
                            Value::Array(vec![
                                pair(("name", "Calories"), ("value", Value::F64(3_000_000.0))),
                                pair(("name", "QualityOfLife"), ("value", Value::I32(5))),
                                pair(("name", "SomethingElse"), ("value", Value::I32(1))),
                            ]),
                        ),
                    ],
                )),
                Component::decoded(ComponentInstance::new(
                    "Klei.AI.Traits",
                    vec![field("TraitIds", Value::Array(vec![Value::String("Hemophobia".into())]))],
                )),
                Component::opaque("Effects", vec![0; 4]),
            ],
        }
    }

    fn document(objects: Vec<GameObject>, info: serde_json::Value) -> SaveDocument {
        let mut doc = SaveDocument::new(SaveHeader::new(7, 36, info, false));
        doc.game_objects = Section::Decoded(GameObjects::new(vec![GameObjectGroup::new(MINION_GROUP, objects)]));
        doc
    }

    #[test]
    fn test_decoded_components_fill_the_entry() {
        let duplicants = project(&document(vec![minion()], json!({})));
        assert_eq!(duplicants.count, 1);
        let entry = &duplicants.list[0];
        assert_eq!(entry.identity.name.as_deref(), Some("Meep"));
        assert_eq!(entry.identity.gender.as_deref(), Some("MALE"));
        assert_eq!(entry.identity.arrival_time, Some(7));
        assert_eq!(entry.role, "Digger");
        assert_eq!(entry.vitals.stress, Some(12.0));
        assert_eq!(entry.vitals.calories, Some(3_000_000.0));
        assert_eq!(entry.vitals.morale, Some(5.0));
        assert_eq!(entry.vitals.health, None);
        assert_eq!(entry.traits, vec!["Hemophobia".to_string()]);
        assert!(entry.effects.is_empty());
        assert_eq!(entry.aptitudes.get("Mining"), Some(&2.0));
        assert_eq!(entry.position.x, Some(12.5));
    }

    #[test]
    fn test_undecoded_minion_gets_nulls_and_default_role() {
        let bare = GameObject { instance_id: 1, position: None, components: vec![Component::opaque("MinionIdentity", vec![1])] };
        let duplicants = project(&document(vec![bare], json!({"numberOfDuplicants": 3})));
        assert_eq!(duplicants.count, 3);
        let value = serde_json::to_value(&duplicants.list[0]).unwrap();
        assert_eq!(value["identity"], json!({"name": null, "gender": null, "arrival_time": null}));
        assert_eq!(value["role"], json!("NoRole"));
        assert_eq!(value["vitals"]["immune_level"], serde_json::Value::Null);
        assert_eq!(value["vitals"].as_object().unwrap().len(), 12);
        assert_eq!(value["position"], json!({"x": null, "y": null}));
        assert_eq!(value["aptitudes"], json!({}));
    }

    #[test]
    fn test_no_object_graph_means_no_entries() {
        let mut doc = document(vec![], json!({}));
        doc.game_objects = Section::Missing;
        let duplicants = project(&doc);
        assert_eq!(duplicants.count, 0);
        assert!(duplicants.list.is_empty());
    }
}
