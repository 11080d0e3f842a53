//! The opaque fallback for values no registered loader accepts.
//!
//! The value graph below the node is serialized with `bincode` into a single
//! opaque dataset. Object classes are stored by qualified name and must be
//! known to the registry when the file is loaded. Dumping registers every
//! class it meets, so a registry can always reload its own dumps; another
//! registry needs [`LoaderManager::register_class`] first. Shared handles
//! inside the payload are written once per occurrence; a cycle inside the
//! payload cannot be stored.
//!
//! [`LoaderManager::register_class`]: crate::registry::LoaderManager::register_class

use std::collections::HashSet;

use hkl_store::Dataset;
use hkl_types::{Class, Complex, Instance, Key, NdArray, Value};
use serde::{Deserialize, Serialize};

use crate::accumulator::NodeInfo;
use crate::encode::{EncodeTarget, Encoded};
use crate::error::{LoaderError, LoaderResult};
use crate::registry::{ClassTable, LoaderEntry, OPAQUE_BASE_TYPE};

/// Serialized form of a value graph.
#[derive(Debug, Serialize, Deserialize)]
enum Mirror {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(f64, f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Mirror>),
    Tuple(Vec<Mirror>),
    Set(Vec<Key>),
    Dict(Vec<(Key, Mirror)>),
    Array(NdArray),
    Object {
        class: String,
        fields: Vec<(String, Mirror)>,
    },
}

/// Identities of the handles currently being mirrored.
#[derive(Default)]
struct Active(HashSet<usize>);

impl Active {
    fn enter(&mut self, value: &Value) -> LoaderResult<()> {
        if let Some(id) = value.identity() {
            if !self.0.insert(id) {
                return Err(LoaderError::Cycle(value.class().qualname()));
            }
        }
        Ok(())
    }

    fn leave(&mut self, value: &Value) {
        if let Some(id) = value.identity() {
            self.0.remove(&id);
        }
    }
}

fn mirror(value: &Value, active: &mut Active) -> LoaderResult<Mirror> {
    active.enter(value)?;
    let mirrored = match value {
        Value::None => Mirror::None,
        Value::Bool(b) => Mirror::Bool(*b),
        Value::Int(i) => Mirror::Int(*i),
        Value::Float(f) => Mirror::Float(*f),
        Value::Complex(c) => Mirror::Complex(c.re, c.im),
        Value::Str(s) => Mirror::Str(s.clone()),
        Value::Bytes(b) => Mirror::Bytes(b.clone()),
        Value::List(l) => Mirror::List(mirror_all(&l.snapshot(), active)?),
        Value::Tuple(t) => Mirror::Tuple(mirror_all(t.items(), active)?),
        Value::Set(s) => Mirror::Set(s.snapshot()),
        Value::Dict(d) => Mirror::Dict(
            d.snapshot()
                .into_iter()
                .map(|(k, v)| Ok((k, mirror(&v, active)?)))
                .collect::<LoaderResult<_>>()?,
        ),
        Value::Array(a) => Mirror::Array(a.get().clone()),
        Value::Object(o) => {
            let (class, fields) = {
                let inst = o.borrow();
                (inst.class().qualname(), inst.fields().to_vec())
            };
            Mirror::Object {
                class,
                fields: fields
                    .into_iter()
                    .map(|(name, v)| Ok((name, mirror(&v, active)?)))
                    .collect::<LoaderResult<_>>()?,
            }
        }
    };
    active.leave(value);
    Ok(mirrored)
}

fn mirror_all(items: &[Value], active: &mut Active) -> LoaderResult<Vec<Mirror>> {
    items.iter().map(|v| mirror(v, active)).collect()
}

fn restore(mirror: Mirror, classes: &ClassTable) -> LoaderResult<Value> {
    let restore_all = |items: Vec<Mirror>| {
        items
            .into_iter()
            .map(|m| restore(m, classes))
            .collect::<LoaderResult<Vec<_>>>()
    };
    Ok(match mirror {
        Mirror::None => Value::None,
        Mirror::Bool(b) => Value::Bool(b),
        Mirror::Int(i) => Value::Int(i),
        Mirror::Float(f) => Value::Float(f),
        Mirror::Complex(re, im) => Value::Complex(Complex::new(re, im)),
        Mirror::Str(s) => Value::Str(s),
        Mirror::Bytes(b) => Value::Bytes(b),
        Mirror::List(items) => Value::list(restore_all(items)?),
        Mirror::Tuple(items) => Value::tuple(restore_all(items)?),
        Mirror::Set(keys) => Value::set(keys),
        Mirror::Dict(entries) => Value::dict(
            entries
                .into_iter()
                .map(|(k, m)| Ok((k, restore(m, classes)?)))
                .collect::<LoaderResult<Vec<_>>>()?,
        ),
        Mirror::Array(array) => Value::array(array),
        Mirror::Object { class, fields } => {
            let class: Class = classes
                .get(&class)
                .cloned()
                .ok_or(LoaderError::MissingClass(class))?;
            let mut inst = Instance::new(class);
            for (name, m) in fields {
                inst.set(name, restore(m, classes)?);
            }
            Value::object(inst)
        }
    })
}

fn encode_opaque(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let mirrored = mirror(value, &mut Active::default())?;
    let bytes =
        bincode::serialize(&mirrored).map_err(|e| LoaderError::Serialization(e.to_string()))?;
    target.create_dataset(&Dataset::opaque(bytes))?;
    Ok(Encoded::leaf())
}

fn decode_opaque(dataset: &Dataset, info: &NodeInfo<'_>) -> LoaderResult<Value> {
    let mirrored: Mirror = bincode::deserialize(dataset.bytes())
        .map_err(|e| LoaderError::Serialization(e.to_string()))?;
    restore(mirrored, info.classes)
}

/// The entry used when no registered loader matches a value's class.
pub(crate) fn fallback_entry() -> LoaderEntry {
    LoaderEntry::leaf(Class::object(), OPAQUE_BASE_TYPE, encode_opaque, decode_opaque)
}
