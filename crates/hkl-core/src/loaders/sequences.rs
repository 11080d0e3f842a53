//! Loaders for `list`, `tuple` and `set`.
//!
//! A sequence whose items are all booleans, all integers or all floats is
//! stored as one array dataset; an empty sequence as an empty dataset.
//! Anything else becomes a group with one child per item, named
//! `data0`, `data1`, ... and a `length` attribute.

use hkl_store::{Attrs, DType, Dataset};
use hkl_types::{Class, Key, List, Set, Value};

use crate::accumulator::{Accumulator, ChildNode, NodeInfo};
use crate::encode::{Child, EncodeTarget, Encoded};
use crate::error::{LoaderError, LoaderResult};
use crate::registry::LoaderEntry;

pub(crate) const ATTR_LENGTH: &str = "length";
const ITEM_PREFIX: &str = "data";

/// Items of a homogeneous scalar sequence.
enum Flat {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Flat {
    fn from_items(items: &[Value]) -> Option<Flat> {
        match items.first()? {
            Value::Bool(_) => items
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Flat::Bool),
            Value::Int(_) => items
                .iter()
                .map(Value::as_int)
                .collect::<Option<Vec<_>>>()
                .map(Flat::Int),
            Value::Float(_) => items
                .iter()
                .map(Value::as_float)
                .collect::<Option<Vec<_>>>()
                .map(Flat::Float),
            _ => None,
        }
    }

    fn to_dataset(&self) -> Dataset {
        match self {
            Flat::Bool(v) => Dataset::from_slice(v),
            Flat::Int(v) => Dataset::from_slice(v),
            Flat::Float(v) => Dataset::from_slice(v),
        }
    }
}

/// Items stored in a flattened sequence dataset.
fn items_from_dataset(dataset: &Dataset) -> LoaderResult<Vec<Value>> {
    if dataset.shape().len() != 1 {
        return Err(LoaderError::Malformed(format!(
            "sequence dataset must be one-dimensional, found shape {:?}",
            dataset.shape()
        )));
    }
    Ok(match dataset.dtype() {
        DType::Opaque if dataset.is_empty() => Vec::new(),
        DType::Bool => dataset.to_elements::<bool>()?.into_iter().map(Value::Bool).collect(),
        DType::Int64 => dataset.to_elements::<i64>()?.into_iter().map(Value::Int).collect(),
        DType::Float64 => dataset.to_elements::<f64>()?.into_iter().map(Value::Float).collect(),
        other => {
            return Err(LoaderError::Malformed(format!(
                "sequence dataset has unsupported dtype {}",
                other.name()
            )))
        }
    })
}

/// Write `items` as a dataset or as a group of `data<i>` children.
fn encode_items(items: Vec<Value>, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    if items.is_empty() {
        target.create_dataset(&Dataset::empty())?;
        return Ok(Encoded::leaf());
    }
    if let Some(flat) = Flat::from_items(&items) {
        target.create_dataset(&flat.to_dataset())?;
        return Ok(Encoded::leaf());
    }
    target.create_group()?;
    let attrs = Attrs::new().with(ATTR_LENGTH, items.len());
    Ok(Encoded::leaf().with_attrs(attrs).with_children(
        items
            .into_iter()
            .enumerate()
            .map(|(i, v)| Child::new(format!("{ITEM_PREFIX}{i}"), v)),
    ))
}

/// Order `data<i>` children by index rather than by name.
pub(crate) fn order_by_index(mut children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
    let mut keyed = Vec::with_capacity(children.len());
    for child in children.drain(..) {
        let index = child
            .name
            .strip_prefix(ITEM_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| {
                LoaderError::Malformed(format!("unexpected sequence item {:?}", child.name))
            })?;
        keyed.push((index, child));
    }
    keyed.sort_by_key(|(index, _)| *index);
    Ok(keyed.into_iter().map(|(_, child)| child).collect())
}

fn check_length(expected: Option<usize>, actual: usize) -> LoaderResult<()> {
    match expected {
        Some(expected) if expected != actual => {
            Err(LoaderError::MissingChildren { expected, actual })
        }
        _ => Ok(()),
    }
}

fn recorded_length(info: &NodeInfo<'_>) -> Option<usize> {
    info.attrs
        .get_int(ATTR_LENGTH)
        .and_then(|n| usize::try_from(n).ok())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn encode_list(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let list = value
        .as_list()
        .ok_or_else(|| LoaderError::Unsupported(format!("list loader cannot encode {}", value.class())))?;
    encode_items(list.snapshot(), target)
}

struct ListAccumulator {
    list: List,
    expected: Option<usize>,
}

impl Accumulator for ListAccumulator {
    fn filter(&self, children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
        order_by_index(children)
    }

    fn placeholder(&self) -> Option<Value> {
        Some(Value::List(self.list.clone()))
    }

    fn append(&mut self, _: &str, value: Value, _: &Attrs) -> LoaderResult<()> {
        self.list.push(value);
        Ok(())
    }

    fn accept_dataset(&mut self, dataset: &Dataset) -> LoaderResult<()> {
        self.list.borrow_mut().extend(items_from_dataset(dataset)?);
        Ok(())
    }

    fn convert(self: Box<Self>) -> LoaderResult<Value> {
        check_length(self.expected, self.list.len())?;
        Ok(Value::List(self.list))
    }
}

fn list_container(info: &NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> {
    Ok(Box::new(ListAccumulator {
        list: List::new(Vec::new()),
        expected: recorded_length(info),
    }))
}

// ---------------------------------------------------------------------------
// tuple
// ---------------------------------------------------------------------------

fn encode_tuple(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let tuple = value
        .as_tuple()
        .ok_or_else(|| LoaderError::Unsupported(format!("tuple loader cannot encode {}", value.class())))?;
    encode_items(tuple.items().to_vec(), target)
}

/// Tuples are immutable, so no handle exists until every item is known.
struct TupleAccumulator {
    items: Vec<Value>,
    expected: Option<usize>,
}

impl Accumulator for TupleAccumulator {
    fn filter(&self, children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
        order_by_index(children)
    }

    fn append(&mut self, _: &str, value: Value, _: &Attrs) -> LoaderResult<()> {
        self.items.push(value);
        Ok(())
    }

    fn accept_dataset(&mut self, dataset: &Dataset) -> LoaderResult<()> {
        self.items.extend(items_from_dataset(dataset)?);
        Ok(())
    }

    fn convert(self: Box<Self>) -> LoaderResult<Value> {
        check_length(self.expected, self.items.len())?;
        Ok(Value::tuple(self.items))
    }
}

fn tuple_container(info: &NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> {
    Ok(Box::new(TupleAccumulator {
        items: Vec::new(),
        expected: recorded_length(info),
    }))
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

fn encode_set(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let set = value
        .as_set()
        .ok_or_else(|| LoaderError::Unsupported(format!("set loader cannot encode {}", value.class())))?;
    encode_items(set.snapshot().iter().map(Key::to_value).collect(), target)
}

struct SetAccumulator {
    set: Set,
    appended: usize,
    expected: Option<usize>,
}

impl SetAccumulator {
    fn add(&mut self, value: Value) -> LoaderResult<()> {
        self.set.insert(Key::try_from(value)?);
        self.appended += 1;
        Ok(())
    }
}

impl Accumulator for SetAccumulator {
    fn filter(&self, children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
        order_by_index(children)
    }

    fn placeholder(&self) -> Option<Value> {
        Some(Value::Set(self.set.clone()))
    }

    fn append(&mut self, _: &str, value: Value, _: &Attrs) -> LoaderResult<()> {
        self.add(value)
    }

    fn accept_dataset(&mut self, dataset: &Dataset) -> LoaderResult<()> {
        for value in items_from_dataset(dataset)? {
            self.add(value)?;
        }
        Ok(())
    }

    fn convert(self: Box<Self>) -> LoaderResult<Value> {
        check_length(self.expected, self.appended)?;
        Ok(Value::Set(self.set))
    }
}

fn set_container(info: &NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> {
    Ok(Box::new(SetAccumulator {
        set: Set::new(Vec::new()),
        appended: 0,
        expected: recorded_length(info),
    }))
}

pub(crate) fn entries() -> Vec<LoaderEntry> {
    vec![
        LoaderEntry::container(Class::list_type(), "list", encode_list, list_container),
        LoaderEntry::container(Class::tuple_type(), "tuple", encode_tuple, tuple_container),
        LoaderEntry::container(Class::set_type(), "set", encode_set, set_container),
    ]
}
