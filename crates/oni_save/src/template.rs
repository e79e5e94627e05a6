//! Type template registry
//!
//! The templates section describes the field layout of every serialised
//! component type. Records are kept in file order so the section can be
//! written back unchanged; lookups go through a name index where the last
//! record with a given name wins.

use std::collections::{HashMap, HashSet};

use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{Result, SaveError};

/// Primitive field kinds and their wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Vector2,
    Vector2I,
    Vector3,
    Colour,
}

impl PrimitiveKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => PrimitiveKind::Bool,
            2 => PrimitiveKind::I8,
            3 => PrimitiveKind::U8,
            4 => PrimitiveKind::I16,
            5 => PrimitiveKind::U16,
            6 => PrimitiveKind::I32,
            7 => PrimitiveKind::U32,
            8 => PrimitiveKind::I64,
            9 => PrimitiveKind::U64,
            10 => PrimitiveKind::F32,
            11 => PrimitiveKind::F64,
            12 => PrimitiveKind::String,
            13 => PrimitiveKind::Vector2,
            14 => PrimitiveKind::Vector2I,
            15 => PrimitiveKind::Vector3,
            16 => PrimitiveKind::Colour,
            _ => return None,
        })
    }

    pub fn tag(&self) -> u8 {
        match self {
            PrimitiveKind::Bool => 1,
            PrimitiveKind::I8 => 2,
            PrimitiveKind::U8 => 3,
            PrimitiveKind::I16 => 4,
            PrimitiveKind::U16 => 5,
            PrimitiveKind::I32 => 6,
            PrimitiveKind::U32 => 7,
            PrimitiveKind::I64 => 8,
            PrimitiveKind::U64 => 9,
            PrimitiveKind::F32 => 10,
            PrimitiveKind::F64 => 11,
            PrimitiveKind::String => 12,
            PrimitiveKind::Vector2 => 13,
            PrimitiveKind::Vector2I => 14,
            PrimitiveKind::Vector3 => 15,
            PrimitiveKind::Colour => 16,
        }
    }

    /// Smallest possible encoding (strings: just the length prefix).
    pub fn min_size(&self) -> usize {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => 1,
            PrimitiveKind::I16 | PrimitiveKind::U16 => 2,
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => 8,
            PrimitiveKind::String => 4,
            PrimitiveKind::Vector2 | PrimitiveKind::Vector2I => 8,
            PrimitiveKind::Vector3 => 12,
            PrimitiveKind::Colour => 4,
        }
    }
}

/// Tag used for fields that reference another template by name.
pub const NESTED_TAG: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveKind),
    Template(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub is_array: bool,
}

impl FieldDescriptor {
    pub fn primitive(name: &str, kind: PrimitiveKind) -> Self {
        Self { name: name.to_string(), field_type: FieldType::Primitive(kind), is_array: false }
    }

    pub fn nested(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Template(type_name.to_string()),
            is_array: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let name = r.read_string()?;
        let tag_offset = r.offset();
        let tag = r.read_u8()?;
        let field_type = if tag == NESTED_TAG {
            FieldType::Template(r.read_string()?)
        } else {
            let kind = PrimitiveKind::from_tag(tag).ok_or_else(|| {
                SaveError::corrupt(tag_offset, format!("unknown kind tag {} for field '{}'", tag, name))
            })?;
            FieldType::Primitive(kind)
        };
        let flag_offset = r.offset();
        let is_array = match r.read_u8()? {
            0 => false,
            1 => true,
            other => {
                return Err(SaveError::corrupt(
                    flag_offset,
                    format!("invalid array flag {} for field '{}'", other, name),
                ))
            }
        };
        Ok(Self { name, field_type, is_array })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.write_string(&self.name);
        match &self.field_type {
            FieldType::Template(type_name) => {
                w.write_u8(NESTED_TAG);
                w.write_string(type_name);
            }
            FieldType::Primitive(kind) => w.write_u8(kind.tag()),
        }
        w.write_u8(u8::from(self.is_array));
    }
}

/// Layout of one serialised type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTemplate {
    pub name: String,
    pub version: i32,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeTemplate {
    pub fn new(name: &str, fields: Vec<FieldDescriptor>) -> Self {
        Self { name: name.to_string(), version: 1, fields }
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let name = r.read_string()?;
        let version = r.read_i32()?;
        let fields = r.read_array(FieldDescriptor::read)?;
        Ok(Self { name, version, fields })
    }

    fn write(&self, w: &mut ByteWriter) {
        w.write_string(&self.name);
        w.write_i32(self.version);
        w.write_array(&self.fields, |w, f| f.write(w));
    }
}

/// Template references followed when sizing one template; deeper ones count as zero.
const MIN_SIZE_DEPTH_LIMIT: usize = 256;

/// All templates of one save, read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateRegistry {
    records: Vec<TypeTemplate>,
    index: HashMap<String, usize>,
    /// Lower bound on the encoded size of each resolvable template
    min_sizes: HashMap<String, usize>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from templates in the order they should be written.
    pub fn from_templates(templates: Vec<TypeTemplate>) -> Self {
        let mut registry = Self::new();
        for template in templates {
            registry.push(template);
        }
        registry.min_sizes = registry.compute_min_sizes();
        registry
    }

    fn compute_min_sizes(&self) -> HashMap<String, usize> {
        let mut sizes = HashMap::with_capacity(self.index.len());
        let mut visiting = HashSet::new();
        for name in self.index.keys() {
            self.template_min_size(name, 0, &mut sizes, &mut visiting);
        }
        sizes
    }

    /// Each template is sized once. A reference back into a template still
    /// being sized counts as zero, which keeps the result a lower bound.
    fn template_min_size(
        &self,
        name: &str,
        depth: usize,
        sizes: &mut HashMap<String, usize>,
        visiting: &mut HashSet<String>,
    ) -> usize {
        if let Some(&size) = sizes.get(name) {
            return size;
        }
        let Some(template) = self.resolve(name) else {
            return 0;
        };
        if depth >= MIN_SIZE_DEPTH_LIMIT || !visiting.insert(name.to_string()) {
            return 0;
        }
        let mut size = 0usize;
        for field in &template.fields {
            let field_size = match &field.field_type {
                _ if field.is_array => 4,
                FieldType::Primitive(kind) => kind.min_size(),
                FieldType::Template(nested) => self.template_min_size(nested, depth + 1, sizes, visiting),
            };
            size = size.saturating_add(field_size);
        }
        visiting.remove(name);
        sizes.insert(name.to_string(), size);
        size
    }

    fn push(&mut self, template: TypeTemplate) {
        if self.index.contains_key(&template.name) {
            log::debug!("Template '{}' defined more than once, last definition wins", template.name);
        }
        self.index.insert(template.name.clone(), self.records.len());
        self.records.push(template);
    }

    /// Parse the logical bytes of a templates section.
    pub fn load(bytes: &[u8], base: usize) -> Result<Self> {
        let mut r = ByteReader::with_base(bytes, base);
        let templates = r.read_array(TypeTemplate::read)?;
        if !r.is_empty() {
            return Err(SaveError::corrupt(
                r.offset(),
                format!("{} unexpected bytes after template records", r.remaining()),
            ));
        }
        Ok(Self::from_templates(templates))
    }

    pub fn resolve(&self, name: &str) -> Option<&TypeTemplate> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    /// Records in file order, duplicates included.
    pub fn records(&self) -> &[TypeTemplate] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_array(&self.records, |w, t| t.write(w));
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_inner()
    }

    /// Smallest number of bytes one value of `field_type` can occupy.
    pub fn min_size(&self, field_type: &FieldType) -> usize {
        match field_type {
            FieldType::Primitive(kind) => kind.min_size(),
            FieldType::Template(name) => self.min_sizes.get(name).copied().unwrap_or(0),
        }
    }
}
