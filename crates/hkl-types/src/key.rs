use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::{Complex, Value};

/// A hashable value usable as a dictionary key or set element.
///
/// Floats hash and compare by bit pattern after folding `-0.0` onto `0.0`
/// and every NaN onto one canonical NaN, so a `Key` is always `Eq`.
/// Keys of different variants never compare equal (`Int(1)` is not
/// `Float(1.0)`).
#[derive(Clone, Serialize, Deserialize)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Key>),
}

fn canonical_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

impl Key {
    /// Name of the built-in class this key belongs to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Key::None => "NoneType",
            Key::Bool(_) => "bool",
            Key::Int(_) => "int",
            Key::Float(_) => "float",
            Key::Complex(_) => "complex",
            Key::Str(_) => "str",
            Key::Bytes(_) => "bytes",
            Key::Tuple(_) => "tuple",
        }
    }

    /// Convert into a fresh [`Value`]. Tuple keys become new tuple handles.
    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(f) => Value::Float(*f),
            Key::Complex(c) => Value::Complex(*c),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Bytes(b) => Value::Bytes(b.clone()),
            Key::Tuple(items) => Value::tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

impl TryFrom<&Value> for Key {
    type Error = TypeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => Key::Float(*f),
            Value::Complex(c) => Key::Complex(*c),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Bytes(b) => Key::Bytes(b.clone()),
            Value::Tuple(t) => Key::Tuple(
                t.items()
                    .iter()
                    .map(Key::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(TypeError::Unhashable(other.class().qualname())),
        })
    }
}

impl TryFrom<Value> for Key {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Key::try_from(&value)
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::None, Key::None) => true,
            (Key::Bool(a), Key::Bool(b)) => a == b,
            (Key::Int(a), Key::Int(b)) => a == b,
            (Key::Float(a), Key::Float(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Key::Complex(a), Key::Complex(b)) => {
                canonical_bits(a.re) == canonical_bits(b.re)
                    && canonical_bits(a.im) == canonical_bits(b.im)
            }
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Bytes(a), Key::Bytes(b)) => a == b,
            (Key::Tuple(a), Key::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Key::None => {}
            Key::Bool(b) => b.hash(state),
            Key::Int(i) => i.hash(state),
            Key::Float(f) => canonical_bits(*f).hash(state),
            Key::Complex(c) => {
                canonical_bits(c.re).hash(state);
                canonical_bits(c.im).hash(state);
            }
            Key::Str(s) => s.hash(state),
            Key::Bytes(b) => b.hash(state),
            Key::Tuple(items) => items.hash(state),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::None => write!(f, "None"),
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Float(x) => write!(f, "{x:?}"),
            Key::Complex(c) => write!(f, "{c:?}"),
            Key::Str(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Key::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}
