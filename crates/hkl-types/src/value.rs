//! The runtime value graph.
//!
//! Scalars (`None`, `Bool`, `Int`, `Float`, `Complex`, `Str`, `Bytes`) are
//! plain data: copying them is indistinguishable from sharing them. Every
//! other variant is a reference-counted handle, so the same container can be
//! reachable from several places in a graph, including from inside itself.
//! [`Value::identity`] exposes that sharing to the dump engine.
//!
//! Equality is deep and structural. Comparing or `Debug`-printing two
//! distinct cyclic graphs does not terminate for equality and is truncated
//! for `Debug`; compare cyclic graphs by identity instead.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::array::NdArray;
use crate::class::Class;
use crate::error::TypeError;
use crate::key::Key;
use crate::object::Instance;

/// A complex number with `f64` parts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

// ---------------------------------------------------------------------------
// Shared handles
// ---------------------------------------------------------------------------

fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Mutable, shared sequence.
#[derive(Clone)]
pub struct List(Rc<RefCell<Vec<Value>>>);

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Cheap copy of the current items (handles are cloned, not deep-copied).
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Immutable, shared sequence.
#[derive(Clone)]
pub struct Tuple(Rc<Vec<Value>>);

impl Tuple {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(items))
    }

    pub fn items(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ptr_eq(&self, other: &Tuple) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Contents of a [`Set`]: unique keys, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct SetData {
    items: Vec<Key>,
    index: HashSet<Key>,
}

impl SetData {
    /// Insert a key; returns `false` if it was already present.
    pub fn insert(&mut self, key: Key) -> bool {
        if self.index.contains(&key) {
            return false;
        }
        self.index.insert(key.clone());
        self.items.push(key);
        true
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.index.contains(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartialEq for SetData {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.items.iter().all(|k| other.contains(k))
    }
}

/// Mutable, shared set of hashable keys.
#[derive(Clone)]
pub struct Set(Rc<RefCell<SetData>>);

impl Set {
    pub fn new(items: impl IntoIterator<Item = Key>) -> Self {
        let mut data = SetData::default();
        for key in items {
            data.insert(key);
        }
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn borrow(&self) -> Ref<'_, SetData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, SetData> {
        self.0.borrow_mut()
    }

    pub fn insert(&self, key: impl Into<Key>) -> bool {
        self.0.borrow_mut().insert(key.into())
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.0.borrow().contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Current elements in insertion order.
    pub fn snapshot(&self) -> Vec<Key> {
        self.0.borrow().items.clone()
    }

    pub fn ptr_eq(&self, other: &Set) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Contents of a [`Dict`]: entries in insertion order plus a key index.
#[derive(Clone, Debug, Default)]
pub struct DictData {
    entries: Vec<(Key, Value)>,
    index: HashMap<Key, usize>,
}

impl DictData {
    /// Insert or replace; a replaced entry keeps its original position.
    pub fn insert(&mut self, key: Key, value: Value) -> Option<Value> {
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for DictData {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

/// Mutable, shared, insertion-ordered mapping.
#[derive(Clone)]
pub struct Dict(Rc<RefCell<DictData>>);

impl Dict {
    pub fn new(entries: impl IntoIterator<Item = (Key, Value)>) -> Self {
        let mut data = DictData::default();
        for (k, v) in entries {
            data.insert(k, v);
        }
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn borrow(&self) -> Ref<'_, DictData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, DictData> {
        self.0.borrow_mut()
    }

    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Current keys in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Current entries in insertion order.
    pub fn snapshot(&self) -> Vec<(Key, Value)> {
        self.0.borrow().entries.clone()
    }

    pub fn ptr_eq(&self, other: &Dict) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Shared, immutable numeric array.
#[derive(Clone)]
pub struct Array(Rc<NdArray>);

impl Array {
    pub fn new(array: NdArray) -> Self {
        Self(Rc::new(array))
    }

    pub fn get(&self) -> &NdArray {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Mutable, shared instance of a user-defined class.
#[derive(Clone)]
pub struct Object(Rc<RefCell<Instance>>);

impl Object {
    pub fn new(instance: Instance) -> Self {
        Self(Rc::new(RefCell::new(instance)))
    }

    pub fn borrow(&self) -> Ref<'_, Instance> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Instance> {
        self.0.borrow_mut()
    }

    pub fn class(&self) -> Class {
        self.0.borrow().class().clone()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A node of a runtime value graph.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Str(String),
    Bytes(Vec<u8>),
    List(List),
    Tuple(Tuple),
    Set(Set),
    Dict(Dict),
    Array(Array),
    Object(Object),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(List::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Tuple::new(items))
    }

    pub fn set(items: impl IntoIterator<Item = Key>) -> Self {
        Value::Set(Set::new(items))
    }

    pub fn dict(entries: impl IntoIterator<Item = (Key, Value)>) -> Self {
        Value::Dict(Dict::new(entries))
    }

    pub fn array(array: NdArray) -> Self {
        Value::Array(Array::new(array))
    }

    pub fn object(instance: Instance) -> Self {
        Value::Object(Object::new(instance))
    }

    /// Runtime class of this value.
    pub fn class(&self) -> Class {
        match self {
            Value::None => Class::none_type(),
            Value::Bool(_) => Class::bool_type(),
            Value::Int(_) => Class::int_type(),
            Value::Float(_) => Class::float_type(),
            Value::Complex(_) => Class::complex_type(),
            Value::Str(_) => Class::str_type(),
            Value::Bytes(_) => Class::bytes_type(),
            Value::List(_) => Class::list_type(),
            Value::Tuple(_) => Class::tuple_type(),
            Value::Set(_) => Class::set_type(),
            Value::Dict(_) => Class::dict_type(),
            Value::Array(_) => Class::ndarray_type(),
            Value::Object(o) => o.class(),
        }
    }

    /// Address of the shared handle, or `None` for by-value scalars.
    ///
    /// Only meaningful while the handle is alive; callers that key tables by
    /// identity must keep the value alive for the table's lifetime.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(addr(&l.0)),
            Value::Tuple(t) => Some(addr(&t.0)),
            Value::Set(s) => Some(addr(&s.0)),
            Value::Dict(d) => Some(addr(&d.0)),
            Value::Array(a) => Some(addr(&a.0)),
            Value::Object(o) => Some(addr(&o.0)),
            _ => None,
        }
    }

    /// `true` if both values are the same shared handle.
    pub fn is_same(&self, other: &Value) -> bool {
        matches!((self.identity(), other.identity()), (Some(a), Some(b)) if a == b)
    }

    pub fn is_scalar(&self) -> bool {
        self.identity().is_none()
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Like [`Value::as_object`] but reports the actual type on mismatch.
    pub fn expect_object(&self) -> Result<&Object, TypeError> {
        self.as_object().ok_or_else(|| TypeError::WrongType {
            expected: "object".into(),
            actual: self.class().qualname(),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Complex(a), Value::Complex(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a.ptr_eq(b) || a.items() == b.items(),
            (Value::Set(a), Value::Set(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.get() == b.get(),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            _ => false,
        }
    }
}

thread_local! {
    static DEBUG_DEPTH: Cell<usize> = const { Cell::new(0) };
}

const MAX_DEBUG_DEPTH: usize = 48;

fn nested(
    f: &mut fmt::Formatter<'_>,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    let depth = DEBUG_DEPTH.with(Cell::get);
    if depth >= MAX_DEBUG_DEPTH {
        return write!(f, "...");
    }
    DEBUG_DEPTH.with(|d| d.set(depth + 1));
    let result = body(f);
    DEBUG_DEPTH.with(|d| d.set(depth));
    result
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Complex(c) => write!(f, "({}{:+}j)", c.re, c.im),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::Array(a) => write!(f, "{:?}", a.get()),
            Value::List(l) => nested(f, |f| match l.0.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => write!(f, "[<borrowed>]"),
            }),
            Value::Tuple(t) => nested(f, |f| {
                write!(f, "(")?;
                for (i, item) in t.items().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                if t.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }),
            Value::Set(s) => nested(f, |f| match s.0.try_borrow() {
                Ok(data) => f.debug_set().entries(data.iter()).finish(),
                Err(_) => write!(f, "{{<borrowed>}}"),
            }),
            Value::Dict(d) => nested(f, |f| match d.0.try_borrow() {
                Ok(data) => f.debug_map().entries(data.iter()).finish(),
                Err(_) => write!(f, "{{<borrowed>}}"),
            }),
            Value::Object(o) => nested(f, |f| match o.0.try_borrow() {
                Ok(inst) => {
                    let mut s = f.debug_struct(inst.class().name());
                    for (name, value) in inst.fields() {
                        s.field(name, value);
                    }
                    s.finish()
                }
                Err(_) => write!(f, "<borrowed object>"),
            }),
        }
    }
}

// Handles print through `Value` so the depth guard also covers them.
macro_rules! debug_via_value {
    ($($handle:ident),* $(,)?) => {
        $(
            impl fmt::Debug for $handle {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Debug::fmt(&Value::$handle(self.clone()), f)
                }
            }
        )*
    };
}

debug_via_value!(List, Tuple, Set, Dict, Array, Object);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Complex> for Value {
    fn from(c: Complex) -> Self {
        Value::Complex(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<NdArray> for Value {
    fn from(array: NdArray) -> Self {
        Value::array(array)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::object(instance)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dict(d)
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        k.to_value()
    }
}
