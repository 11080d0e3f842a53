//! Leaf loaders for `None`, numbers, strings and bytes.
//!
//! Scalars are always written without storage filters.

use hkl_store::Dataset;
use hkl_types::{Class, Complex, Value};

use crate::accumulator::NodeInfo;
use crate::encode::{EncodeTarget, Encoded};
use crate::error::{LoaderError, LoaderResult};
use crate::registry::LoaderEntry;

fn unexpected(expected: &str, value: &Value) -> LoaderError {
    LoaderError::Unsupported(format!(
        "{expected} loader cannot encode {}",
        value.class()
    ))
}

fn encode_none(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::None => {
            target.create_scalar(&Dataset::empty())?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("None", other)),
    }
}

fn decode_none(_: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    Ok(Value::None)
}

fn encode_bool(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::Bool(b) => {
            target.create_scalar(&Dataset::scalar(*b))?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("bool", other)),
    }
}

fn decode_bool(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    Ok(Value::Bool(dataset.to_scalar::<bool>()?))
}

fn encode_int(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::Int(i) => {
            target.create_scalar(&Dataset::scalar(*i))?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("int", other)),
    }
}

fn decode_int(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    Ok(Value::Int(dataset.to_scalar::<i64>()?))
}

fn encode_float(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::Float(f) => {
            target.create_scalar(&Dataset::scalar(*f))?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("float", other)),
    }
}

fn decode_float(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    Ok(Value::Float(dataset.to_scalar::<f64>()?))
}

fn encode_complex(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::Complex(c) => {
            target.create_scalar(&Dataset::scalar([c.re, c.im]))?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("complex", other)),
    }
}

fn decode_complex(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    let [re, im] = dataset.to_scalar::<[f64; 2]>()?;
    Ok(Value::Complex(Complex::new(re, im)))
}

fn encode_str(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::Str(s) => {
            target.create_dataset(&Dataset::utf8(s))?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("str", other)),
    }
}

fn decode_str(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    Ok(Value::Str(dataset.as_str()?.to_string()))
}

fn encode_bytes(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    match value {
        Value::Bytes(b) => {
            target.create_dataset(&Dataset::opaque(b.clone()))?;
            Ok(Encoded::leaf())
        }
        other => Err(unexpected("bytes", other)),
    }
}

fn decode_bytes(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    Ok(Value::Bytes(dataset.bytes().to_vec()))
}

pub(crate) fn entries() -> Vec<LoaderEntry> {
    vec![
        LoaderEntry::leaf(Class::none_type(), "None", encode_none, decode_none),
        LoaderEntry::leaf(Class::bool_type(), "bool", encode_bool, decode_bool),
        LoaderEntry::leaf(Class::int_type(), "int", encode_int, decode_int),
        LoaderEntry::leaf(Class::float_type(), "float", encode_float, decode_float),
        LoaderEntry::leaf(Class::complex_type(), "complex", encode_complex, decode_complex),
        LoaderEntry::leaf(Class::str_type(), "str", encode_str, decode_str),
        LoaderEntry::leaf(Class::bytes_type(), "bytes", encode_bytes, decode_bytes),
    ]
}
