//! Object graph decoding
//!
//! The game objects section is a list of named groups, each holding game
//! objects with an ordered list of components. Components are length-framed,
//! so one that cannot be decoded against its template is kept as raw bytes
//! and the walk continues with the next one.

use crate::cursor::{ByteReader, ByteWriter};
use crate::document::OpaqueBlob;
use crate::error::{Result, SaveError};
use crate::template::{FieldType, PrimitiveKind, TemplateRegistry, TypeTemplate};

// ============================================================================
// Values
// ============================================================================

/// A decoded field value. Values carry their own kind so they can be
/// re-encoded without the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Vector2([f32; 2]),
    Vector2I([i32; 2]),
    Vector3([f32; 3]),
    Colour([u8; 4]),
    Array(Vec<Value>),
    Object(Vec<FieldValue>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::I8(v) => Some(v as f64),
            Value::U8(v) => Some(v as f64),
            Value::I16(v) => Some(v as f64),
            Value::U16(v) => Some(v as f64),
            Value::I32(v) => Some(v as f64),
            Value::U32(v) => Some(v as f64),
            Value::I64(v) => Some(v as f64),
            Value::U64(v) => Some(v as f64),
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::U8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            Value::F32(v) if v.is_finite() => Some(v as i64),
            Value::F64(v) if v.is_finite() => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[FieldValue]> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a field when this value is a nested object.
    pub fn get(&self, name: &str) -> Option<&Value> {
        find_field(self.as_object()?, name)
    }

    pub fn write(&self, w: &mut ByteWriter) {
        match self {
            Value::Bool(v) => w.write_bool(*v),
            Value::I8(v) => w.write_i8(*v),
            Value::U8(v) => w.write_u8(*v),
            Value::I16(v) => w.write_i16(*v),
            Value::U16(v) => w.write_u16(*v),
            Value::I32(v) => w.write_i32(*v),
            Value::U32(v) => w.write_u32(*v),
            Value::I64(v) => w.write_i64(*v),
            Value::U64(v) => w.write_u64(*v),
            Value::F32(v) => w.write_f32(*v),
            Value::F64(v) => w.write_f64(*v),
            Value::String(v) => w.write_string(v),
            Value::Vector2(v) => v.iter().for_each(|c| w.write_f32(*c)),
            Value::Vector2I(v) => v.iter().for_each(|c| w.write_i32(*c)),
            Value::Vector3(v) => v.iter().for_each(|c| w.write_f32(*c)),
            Value::Colour(v) => w.write_bytes(v),
            Value::Array(items) => w.write_array(items, |w, item| item.write(w)),
            Value::Object(fields) => fields.iter().for_each(|f| f.value.write(w)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

impl FieldValue {
    pub fn new(name: &str, value: Value) -> Self {
        Self { name: name.to_string(), value }
    }
}

fn find_field<'v>(fields: &'v [FieldValue], name: &str) -> Option<&'v Value> {
    fields.iter().find(|f| f.name == name).map(|f| &f.value)
}

// ============================================================================
// Object graph
// ============================================================================

/// A component decoded against its template.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInstance {
    pub template: String,
    pub fields: Vec<FieldValue>,
    /// Bytes left inside the component frame after the template's fields
    pub trailing: Vec<u8>,
}

impl ComponentInstance {
    pub fn new(template: &str, fields: Vec<FieldValue>) -> Self {
        Self { template: template.to_string(), fields, trailing: Vec::new() }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        find_field(&self.fields, name)
    }

    fn encode(&self, w: &mut ByteWriter) {
        for field in &self.fields {
            field.value.write(w);
        }
        w.write_bytes(&self.trailing);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentBody {
    Decoded(ComponentInstance),
    Opaque(OpaqueBlob),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub body: ComponentBody,
}

impl Component {
    pub fn decoded(instance: ComponentInstance) -> Self {
        Self { name: instance.template.clone(), body: ComponentBody::Decoded(instance) }
    }

    pub fn opaque(name: &str, bytes: Vec<u8>) -> Self {
        Self { name: name.to_string(), body: ComponentBody::Opaque(OpaqueBlob::new(bytes)) }
    }

    pub fn instance(&self) -> Option<&ComponentInstance> {
        match &self.body {
            ComponentBody::Decoded(instance) => Some(instance),
            ComponentBody::Opaque(_) => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.body, ComponentBody::Opaque(_))
    }

    fn encode(&self, w: &mut ByteWriter) {
        let payload = match &self.body {
            ComponentBody::Decoded(instance) => {
                let mut inner = ByteWriter::new();
                instance.encode(&mut inner);
                inner.into_inner()
            }
            ComponentBody::Opaque(blob) => blob.bytes.clone(),
        };
        w.write_string(&self.name);
        w.write_i32(payload.len() as i32);
        w.write_bytes(&payload);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameObject {
    pub instance_id: i32,
    pub position: Option<Position>,
    pub components: Vec<Component>,
}

impl GameObject {
    /// First component with this name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// First decoded component matching any of `names`, in order of preference.
    pub fn decoded_component(&self, names: &[&str]) -> Option<&ComponentInstance> {
        names.iter().find_map(|name| self.component(name).and_then(Component::instance))
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.write_i32(self.instance_id);
        match self.position {
            Some(p) => {
                w.write_u8(1);
                w.write_f32(p.x);
                w.write_f32(p.y);
            }
            None => w.write_u8(0),
        }
        w.write_array(&self.components, |w, c| c.encode(w));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameObjectGroup {
    pub name: String,
    /// Count as read from the stream; always equals `objects.len()` after a decode
    pub declared_count: usize,
    pub objects: Vec<GameObject>,
}

impl GameObjectGroup {
    pub fn new(name: &str, objects: Vec<GameObject>) -> Self {
        Self { name: name.to_string(), declared_count: objects.len(), objects }
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.write_string(&self.name);
        w.write_array(&self.objects, |w, o| o.encode(w));
    }
}

/// Decoded game objects section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameObjects {
    pub groups: Vec<GameObjectGroup>,
    /// Bytes after the last group
    pub trailing: Vec<u8>,
}

impl GameObjects {
    pub fn new(groups: Vec<GameObjectGroup>) -> Self {
        Self { groups, trailing: Vec::new() }
    }

    pub fn group(&self, name: &str) -> Option<&GameObjectGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn total_objects(&self) -> usize {
        self.groups.iter().map(|g| g.objects.len()).sum()
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.write_array(&self.groups, |w, g| g.encode(w));
        w.write_bytes(&self.trailing);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.into_inner()
    }
}

// ============================================================================
// Decoder
// ============================================================================

// Smallest encodings, used to reject counts the remaining bytes cannot hold
const MIN_GROUP_SIZE: usize = 8;
const MIN_OBJECT_SIZE: usize = 9;
const MIN_COMPONENT_SIZE: usize = 8;

// Values one component may decode: a fixed allowance plus a few per body byte
const VALUE_BUDGET_BASE: usize = 4096;
const VALUE_BUDGET_PER_BYTE: usize = 4;

fn checked_count(r: &mut ByteReader<'_>, min_size: usize, what: &str) -> Result<i32> {
    let at = r.offset();
    let n = r.read_i32()?;
    if n > 0 && (n as usize).saturating_mul(min_size.max(1)) > r.remaining() {
        return Err(SaveError::corrupt(
            at,
            format!("{} count {} cannot fit in {} remaining bytes", what, n, r.remaining()),
        ));
    }
    Ok(n)
}

/// Walks a game objects section against a template registry.
pub struct ObjectDecoder<'r> {
    registry: &'r TemplateRegistry,
    max_depth: usize,
}

impl<'r> ObjectDecoder<'r> {
    pub fn new(registry: &'r TemplateRegistry, max_depth: usize) -> Self {
        Self { registry, max_depth }
    }

    /// Leading group count of the section.
    pub fn read_group_count(&self, r: &mut ByteReader<'_>) -> Result<usize> {
        let at = r.offset();
        let n = checked_count(r, MIN_GROUP_SIZE, "group")?;
        usize::try_from(n).map_err(|_| SaveError::corrupt(at, format!("negative group count {}", n)))
    }

    /// Decode a whole section. Any framing error aborts; component-level
    /// problems come back as warnings.
    pub fn decode_section(&self, bytes: &[u8], base: usize) -> Result<(GameObjects, Vec<SaveError>)> {
        let mut walk = GroupWalk::new(bytes.to_vec(), base);
        walk.read_count(self)?;
        while !walk.is_done() {
            walk.next_group(self)?;
        }
        Ok(walk.finish())
    }

    pub fn decode_group(&self, r: &mut ByteReader<'_>) -> Result<(GameObjectGroup, Vec<SaveError>)> {
        let name = r.read_string()?;
        let mut warnings = Vec::new();
        let objects = r.read_array_with(
            |r| checked_count(r, MIN_OBJECT_SIZE, "object"),
            |r| self.decode_object(r, &mut warnings),
        )?;
        Ok((GameObjectGroup::new(&name, objects), warnings))
    }

    fn decode_object(&self, r: &mut ByteReader<'_>, warnings: &mut Vec<SaveError>) -> Result<GameObject> {
        let instance_id = r.read_i32()?;
        let flag_offset = r.offset();
        let position = match r.read_u8()? {
            0 => None,
            1 => Some(Position { x: r.read_f32()?, y: r.read_f32()? }),
            other => {
                return Err(SaveError::corrupt(flag_offset, format!("invalid position flag {}", other)))
            }
        };
        let components = r.read_array_with(
            |r| checked_count(r, MIN_COMPONENT_SIZE, "component"),
            |r| self.read_component(r, warnings),
        )?;
        Ok(GameObject { instance_id, position, components })
    }

    fn read_component(&self, r: &mut ByteReader<'_>, warnings: &mut Vec<SaveError>) -> Result<Component> {
        let name = r.read_string()?;
        let len_offset = r.offset();
        let len = r.read_i32()?;
        if len < 0 {
            return Err(SaveError::corrupt(
                len_offset,
                format!("negative length {} for component '{}'", len, name),
            ));
        }
        let body = r.sub_reader(len as usize)?;
        let (component, warning) = self.decode_component(&name, body);
        if let Some(warning) = warning {
            log::warn!("{}", warning);
            warnings.push(warning);
        }
        Ok(component)
    }

    /// Decode one component body. Never fails: anything that does not match
    /// its template falls back to the raw bytes.
    pub fn decode_component(&self, name: &str, mut body: ByteReader<'_>) -> (Component, Option<SaveError>) {
        let Some(template) = self.registry.resolve(name) else {
            let raw = body.read_rest().to_vec();
            log::debug!("No template for component '{}', keeping {} bytes opaque", name, raw.len());
            return (Component::opaque(name, raw), None);
        };

        let start = body.offset();
        let checkpoint = body.checkpoint();
        let mut budget = VALUE_BUDGET_BASE.saturating_add(body.remaining().saturating_mul(VALUE_BUDGET_PER_BYTE));
        match self.decode_fields(template, &mut body, 0, &mut budget) {
            Ok(fields) => {
                let trailing = body.read_rest().to_vec();
                if !trailing.is_empty() {
                    log::debug!(
                        "Component '{}' has {} bytes after its template fields",
                        name,
                        trailing.len()
                    );
                }
                let instance = ComponentInstance { template: template.name.clone(), fields, trailing };
                (Component { name: name.to_string(), body: ComponentBody::Decoded(instance) }, None)
            }
            Err(e) => {
                body.rewind(checkpoint);
                let warning = SaveError::UnknownTemplateField {
                    component: name.to_string(),
                    offset: start,
                    reason: e.to_string(),
                };
                (Component::opaque(name, body.read_rest().to_vec()), Some(warning))
            }
        }
    }

    fn decode_fields(
        &self,
        template: &TypeTemplate,
        r: &mut ByteReader<'_>,
        depth: usize,
        budget: &mut usize,
    ) -> Result<Vec<FieldValue>> {
        if depth > self.max_depth {
            return Err(SaveError::corrupt(
                r.offset(),
                format!("template '{}' nested deeper than {}", template.name, self.max_depth),
            ));
        }
        let mut fields = Vec::with_capacity(template.fields.len());
        for field in &template.fields {
            let value = if field.is_array {
                let min_size = self.registry.min_size(&field.field_type);
                Value::Array(r.read_array_with(
                    |r| checked_count(r, min_size, "array element"),
                    |r| self.decode_value(&field.field_type, r, depth, budget),
                )?)
            } else {
                self.decode_value(&field.field_type, r, depth, budget)?
            };
            fields.push(FieldValue { name: field.name.clone(), value });
        }
        Ok(fields)
    }

    fn decode_value(
        &self,
        field_type: &FieldType,
        r: &mut ByteReader<'_>,
        depth: usize,
        budget: &mut usize,
    ) -> Result<Value> {
        // Zero-width nested templates consume no bytes, so count values instead
        if *budget == 0 {
            return Err(SaveError::corrupt(r.offset(), "too many values for the component size"));
        }
        *budget -= 1;
        let kind = match field_type {
            FieldType::Template(type_name) => {
                let nested = self.registry.resolve(type_name).ok_or_else(|| {
                    SaveError::corrupt(r.offset(), format!("unknown nested template '{}'", type_name))
                })?;
                return Ok(Value::Object(self.decode_fields(nested, r, depth + 1, budget)?));
            }
            FieldType::Primitive(kind) => *kind,
        };
        Ok(match kind {
            PrimitiveKind::Bool => {
                let at = r.offset();
                match r.read_u8()? {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => return Err(SaveError::corrupt(at, format!("invalid bool byte {}", other))),
                }
            }
            PrimitiveKind::I8 => Value::I8(r.read_i8()?),
            PrimitiveKind::U8 => Value::U8(r.read_u8()?),
            PrimitiveKind::I16 => Value::I16(r.read_i16()?),
            PrimitiveKind::U16 => Value::U16(r.read_u16()?),
            PrimitiveKind::I32 => Value::I32(r.read_i32()?),
            PrimitiveKind::U32 => Value::U32(r.read_u32()?),
            PrimitiveKind::I64 => Value::I64(r.read_i64()?),
            PrimitiveKind::U64 => Value::U64(r.read_u64()?),
            PrimitiveKind::F32 => Value::F32(r.read_f32()?),
            PrimitiveKind::F64 => Value::F64(r.read_f64()?),
            PrimitiveKind::String => Value::String(r.read_string()?),
            PrimitiveKind::Vector2 => Value::Vector2([r.read_f32()?, r.read_f32()?]),
            PrimitiveKind::Vector2I => Value::Vector2I([r.read_i32()?, r.read_i32()?]),
            PrimitiveKind::Vector3 => Value::Vector3([r.read_f32()?, r.read_f32()?, r.read_f32()?]),
            PrimitiveKind::Colour => {
                let b = r.read_bytes(4)?;
                Value::Colour([b[0], b[1], b[2], b[3]])
            }
        })
    }
}

/// Group-at-a-time walk over the logical bytes of a game objects section.
#[derive(Debug)]
pub struct GroupWalk {
    logical: Vec<u8>,
    base: usize,
    pos: usize,
    total: usize,
    groups: Vec<GameObjectGroup>,
    warnings: Vec<SaveError>,
}

impl GroupWalk {
    pub fn new(logical: Vec<u8>, base: usize) -> Self {
        Self { logical, base, pos: 0, total: 0, groups: Vec::new(), warnings: Vec::new() }
    }

    fn reader(&self) -> ByteReader<'_> {
        ByteReader::with_base(&self.logical[self.pos..], self.base + self.pos)
    }

    /// Read the leading group count. Call once, before `next_group`.
    pub fn read_count(&mut self, decoder: &ObjectDecoder<'_>) -> Result<usize> {
        let mut r = self.reader();
        let total = decoder.read_group_count(&mut r)?;
        let consumed = r.position();
        self.pos += consumed;
        self.total = total;
        self.groups.reserve(total);
        Ok(total)
    }

    /// Decode the next group. An error leaves the walk unusable.
    pub fn next_group(&mut self, decoder: &ObjectDecoder<'_>) -> Result<()> {
        let mut r = self.reader();
        let (group, mut warnings) = decoder.decode_group(&mut r)?;
        let consumed = r.position();
        self.pos += consumed;
        self.groups.push(group);
        self.warnings.append(&mut warnings);
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.groups.len() >= self.total
    }

    pub fn decoded(&self) -> usize {
        self.groups.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// The decoded section and its component warnings.
    pub fn finish(self) -> (GameObjects, Vec<SaveError>) {
        let trailing = self.logical[self.pos..].to_vec();
        (GameObjects { groups: self.groups, trailing }, self.warnings)
    }

    /// Give the section bytes back, for keeping the section opaque.
    pub fn into_bytes(self) -> Vec<u8> {
        self.logical
    }
}
