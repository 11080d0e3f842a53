//! Leaf loader for `ndarray`: one dataset with the array's dtype and shape.

use hkl_store::{DType, Dataset};
use hkl_types::{ArrayData, Class, NdArray, Value};

use crate::accumulator::NodeInfo;
use crate::encode::{EncodeTarget, Encoded};
use crate::error::{LoaderError, LoaderResult};
use crate::registry::LoaderEntry;

fn to_dataset(array: &NdArray) -> LoaderResult<Dataset> {
    let shape = array.shape().to_vec();
    Ok(match array.data() {
        ArrayData::Bool(v) => Dataset::from_elements(shape, v)?,
        ArrayData::UInt8(v) => Dataset::from_elements(shape, v)?,
        ArrayData::Int32(v) => Dataset::from_elements(shape, v)?,
        ArrayData::Int64(v) => Dataset::from_elements(shape, v)?,
        ArrayData::Float32(v) => Dataset::from_elements(shape, v)?,
        ArrayData::Float64(v) => Dataset::from_elements(shape, v)?,
    })
}

fn encode_ndarray(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let array = value.as_array().ok_or_else(|| {
        LoaderError::Unsupported(format!("ndarray loader cannot encode {}", value.class()))
    })?;
    target.create_dataset(&to_dataset(array.get())?)?;
    Ok(Encoded::leaf())
}

fn decode_ndarray(dataset: &Dataset, _: &NodeInfo<'_>) -> LoaderResult<Value> {
    let data = match dataset.dtype() {
        DType::Bool => ArrayData::Bool(dataset.to_elements()?),
        DType::UInt8 => ArrayData::UInt8(dataset.to_elements()?),
        DType::Int32 => ArrayData::Int32(dataset.to_elements()?),
        DType::Int64 => ArrayData::Int64(dataset.to_elements()?),
        DType::Float32 => ArrayData::Float32(dataset.to_elements()?),
        DType::Float64 => ArrayData::Float64(dataset.to_elements()?),
        other => {
            return Err(LoaderError::Malformed(format!(
                "ndarray cannot hold {} elements",
                other.name()
            )))
        }
    };
    Ok(Value::array(NdArray::new(dataset.shape().to_vec(), data)?))
}

pub(crate) fn entries() -> Vec<LoaderEntry> {
    vec![LoaderEntry::leaf(
        Class::ndarray_type(),
        "ndarray",
        encode_ndarray,
        decode_ndarray,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Engine;
    use crate::config::{DumpOptions, LoadOptions};
    use hkl_store::{InMemoryNodeStore, NodePath, NodeStore, StorageOptions};

    fn roundtrip_with(value: &Value, storage: StorageOptions) -> (Value, InMemoryNodeStore) {
        let mut store = InMemoryNodeStore::new();
        let mut engine = Engine::new();
        engine
            .dump(value, &mut store, &DumpOptions::default().with_storage(storage))
            .unwrap();
        let loaded = engine.load(&store, &LoadOptions::default()).unwrap();
        (loaded, store)
    }

    #[test]
    fn shape_and_dtype_preserved() {
        let arrays = [
            NdArray::new(vec![2, 3], ArrayData::Int32(vec![1, 2, 3, 4, 5, 6])).unwrap(),
            NdArray::new(vec![], ArrayData::Float64(vec![2.5])).unwrap(),
            NdArray::from_vec(ArrayData::Bool(vec![true, false])),
            NdArray::new(vec![0, 4], ArrayData::Float32(vec![])).unwrap(),
            NdArray::from_vec(ArrayData::UInt8(b"bytes".to_vec())),
        ];
        for array in arrays {
            let value = Value::array(array.clone());
            let (loaded, store) = roundtrip_with(&value, StorageOptions::default());
            assert_eq!(loaded.as_array().unwrap().get(), &array);
            let ds = store.read_dataset(&NodePath::parse("/data").unwrap()).unwrap();
            assert_eq!(ds.shape(), array.shape());
        }
    }

    #[test]
    fn arrays_use_forwarded_filters() {
        let array = NdArray::from_vec(ArrayData::Int64(vec![0; 4096]));
        let (loaded, store) = roundtrip_with(
            &Value::array(array.clone()),
            StorageOptions::zstd(3).with_checksum(true),
        );
        assert_eq!(loaded.as_array().unwrap().get(), &array);
        assert!(store.stored_bytes() < 4096 * 8 / 4);
    }

    #[test]
    fn text_dataset_is_not_an_array() {
        let err = decode_ndarray(
            &Dataset::utf8("abc"),
            &NodeInfo {
                path: &NodePath::root(),
                attrs: &hkl_store::Attrs::new(),
                base_type: "ndarray",
                type_tag: "builtins.ndarray",
                class: None,
                classes: &crate::registry::ClassTable::with_builtins(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, LoaderError::Malformed(_)));
    }
}
