//! Loader for `dict`.
//!
//! A dict is a group with one child per entry. Keys of simple types become
//! the child's name, tagged with `key_base_type`; tuple and complex keys
//! are stored as a `(key, value)` pair child named `data<i>`. Every child
//! carries `key_idx`, its insertion position.

use hkl_store::Attrs;
use hkl_types::{Class, Dict, Key, Value};

use super::names::{quote, quote_bytes, unquote, unquote_bytes};
use super::sequences::ATTR_LENGTH;
use crate::accumulator::{Accumulator, ChildNode, NodeInfo};
use crate::encode::{Child, EncodeTarget, Encoded};
use crate::error::{LoaderError, LoaderResult};
use crate::registry::LoaderEntry;

pub(crate) const ATTR_KEY_BASE_TYPE: &str = "key_base_type";
pub(crate) const ATTR_KEY_IDX: &str = "key_idx";

/// `key_base_type` of entries stored as a pair tuple.
const KEY_VALUE: &str = "key_value";

/// Node name and `key_base_type` for keys that fit in a name.
fn key_name(key: &Key) -> Option<(String, &'static str)> {
    Some(match key {
        Key::Str(s) => (quote(s), "str"),
        Key::Bytes(b) => (quote_bytes(b), "bytes"),
        Key::Int(i) => (i.to_string(), "int"),
        Key::Float(f) => (format!("{f:?}"), "float"),
        Key::Bool(true) => ("True".to_string(), "bool"),
        Key::Bool(false) => ("False".to_string(), "bool"),
        Key::None => ("None".to_string(), "NoneType"),
        Key::Complex(_) | Key::Tuple(_) => return None,
    })
}

fn parse_key(name: &str, key_base_type: &str) -> LoaderResult<Key> {
    let bad = || LoaderError::Malformed(format!("cannot read {key_base_type} key from {name:?}"));
    Ok(match key_base_type {
        "str" => Key::Str(unquote(name)?),
        "bytes" => Key::Bytes(unquote_bytes(name)?),
        "int" => Key::Int(name.parse().map_err(|_| bad())?),
        "float" => Key::Float(name.parse().map_err(|_| bad())?),
        "bool" => match name {
            "True" => Key::Bool(true),
            "False" => Key::Bool(false),
            _ => return Err(bad()),
        },
        "NoneType" | "None" if name == "None" => Key::None,
        _ => return Err(bad()),
    })
}

fn encode_dict(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let dict = value.as_dict().ok_or_else(|| {
        LoaderError::Unsupported(format!("dict loader cannot encode {}", value.class()))
    })?;
    target.create_group()?;
    let entries = dict.snapshot();
    let attrs = Attrs::new().with(ATTR_LENGTH, entries.len());
    let children = entries.into_iter().enumerate().map(|(idx, (key, value))| {
        let (name, kind, value) = match key_name(&key) {
            Some((name, kind)) => (name, kind, value),
            None => (
                format!("data{idx}"),
                KEY_VALUE,
                Value::tuple(vec![key.to_value(), value]),
            ),
        };
        Child::new(name, value).with_attrs(
            Attrs::new()
                .with(ATTR_KEY_BASE_TYPE, kind)
                .with(ATTR_KEY_IDX, idx),
        )
    });
    Ok(Encoded::leaf().with_attrs(attrs).with_children(children))
}

struct DictAccumulator {
    dict: Dict,
    expected: Option<usize>,
}

impl Accumulator for DictAccumulator {
    fn filter(&self, mut children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
        children.sort_by_key(|c| c.attrs.get_int(ATTR_KEY_IDX).unwrap_or(i64::MAX));
        Ok(children)
    }

    fn placeholder(&self) -> Option<Value> {
        Some(Value::Dict(self.dict.clone()))
    }

    fn append(&mut self, name: &str, value: Value, attrs: &Attrs) -> LoaderResult<()> {
        let (key, value) = match attrs.get_str(ATTR_KEY_BASE_TYPE) {
            Some(KEY_VALUE) => {
                let pair = value
                    .as_tuple()
                    .filter(|t| t.len() == 2)
                    .ok_or_else(|| {
                        LoaderError::Malformed(format!("{name} is not a (key, value) pair"))
                    })?;
                (Key::try_from(&pair.items()[0])?, pair.items()[1].clone())
            }
            Some(kind) => (parse_key(name, kind)?, value),
            None => (Key::Str(unquote(name)?), value),
        };
        self.dict.borrow_mut().insert(key, value);
        Ok(())
    }

    fn convert(self: Box<Self>) -> LoaderResult<Value> {
        if let Some(expected) = self.expected {
            let actual = self.dict.len();
            if expected != actual {
                return Err(LoaderError::MissingChildren { expected, actual });
            }
        }
        Ok(Value::Dict(self.dict))
    }
}

fn dict_container(info: &NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> {
    Ok(Box::new(DictAccumulator {
        dict: Dict::new(Vec::new()),
        expected: info
            .attrs
            .get_int(ATTR_LENGTH)
            .and_then(|n| usize::try_from(n).ok()),
    }))
}

pub(crate) fn entries() -> Vec<LoaderEntry> {
    vec![LoaderEntry::container(
        Class::dict_type(),
        "dict",
        encode_dict,
        dict_container,
    )]
}
