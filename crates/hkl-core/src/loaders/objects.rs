//! Opt-in loader for user-defined objects.
//!
//! Registered on `object` itself, so it only handles classes that no more
//! specific loader claims, and only while custom loaders are enabled.
//! Otherwise such objects go to the opaque fallback.
//!
//! An object is a group with one child per field, named by the quoted field
//! name and carrying `field_idx`.

use hkl_store::Attrs;
use hkl_types::{Class, Instance, Object, Value};

use super::names::{quote, unquote};
use crate::accumulator::{Accumulator, ChildNode, NodeInfo};
use crate::encode::{Child, EncodeTarget, Encoded};
use crate::error::LoaderResult;
use crate::registry::LoaderEntry;

pub(crate) const ATTR_FIELD_IDX: &str = "field_idx";

fn encode_object(value: &Value, target: &mut EncodeTarget<'_>) -> LoaderResult<Encoded> {
    let object = value.expect_object()?;
    let fields = object.borrow().fields().to_vec();
    target.create_group()?;
    Ok(Encoded::leaf().with_children(fields.into_iter().enumerate().map(
        |(idx, (name, value))| {
            Child::new(quote(&name), value).with_attrs(Attrs::new().with(ATTR_FIELD_IDX, idx))
        },
    )))
}

struct ObjectAccumulator {
    object: Object,
}

impl Accumulator for ObjectAccumulator {
    fn filter(&self, mut children: Vec<ChildNode>) -> LoaderResult<Vec<ChildNode>> {
        children.sort_by_key(|c| c.attrs.get_int(ATTR_FIELD_IDX).unwrap_or(i64::MAX));
        Ok(children)
    }

    fn placeholder(&self) -> Option<Value> {
        Some(Value::Object(self.object.clone()))
    }

    fn append(&mut self, name: &str, value: Value, _: &Attrs) -> LoaderResult<()> {
        self.object.borrow_mut().set(unquote(name)?, value);
        Ok(())
    }

    fn convert(self: Box<Self>) -> LoaderResult<Value> {
        Ok(Value::Object(self.object))
    }
}

fn object_container(info: &NodeInfo<'_>) -> LoaderResult<Box<dyn Accumulator>> {
    Ok(Box::new(ObjectAccumulator {
        object: Object::new(Instance::new(info.require_class()?)),
    }))
}

pub(crate) fn entries() -> Vec<LoaderEntry> {
    vec![
        LoaderEntry::container(Class::object(), "object", encode_object, object_container)
            .custom(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Engine;
    use crate::config::{DumpOptions, LoadOptions};
    use crate::error::{HklError, LoaderError};
    use crate::registry::OPAQUE_BASE_TYPE;
    use hkl_store::{InMemoryNodeStore, NodePath, NodeStore};

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn particle() -> Class {
        Class::new("physics", "Particle", &[]).unwrap()
    }

    fn sample() -> Value {
        Value::object(
            Instance::new(particle())
                .with_field("z/pos", 3.0)
                .with_field("mass", 1i64)
                .with_field("tags", Value::list(vec![Value::from("fast")])),
        )
    }

    #[test]
    fn fields_roundtrip_in_order() {
        let mut engine = Engine::new();
        engine.manager_mut().register_class(particle());
        let mut store = InMemoryNodeStore::new();
        engine
            .dump(&sample(), &mut store, &DumpOptions::default().with_custom_loaders(true))
            .unwrap();
        let attrs = store.attrs(&p("/data")).unwrap();
        assert_eq!(attrs.get_str("base_type"), Some("object"));
        assert_eq!(attrs.get_str("type"), Some("physics.Particle"));

        // The root records that custom loaders were on.
        let loaded = engine.load(&store, &LoadOptions::default()).unwrap();
        assert_eq!(loaded, sample());
        let names: Vec<_> = loaded
            .expect_object()
            .unwrap()
            .borrow()
            .fields()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        assert_eq!(names, vec!["z/pos", "mass", "tags"]);
    }

    #[test]
    fn disabled_by_default() {
        let mut store = InMemoryNodeStore::new();
        Engine::new()
            .dump(&sample(), &mut store, &DumpOptions::default())
            .unwrap();
        let attrs = store.attrs(&p("/data")).unwrap();
        assert_eq!(attrs.get_str("base_type"), Some(OPAQUE_BASE_TYPE));
    }

    #[test]
    fn unknown_class_fails_to_rebuild() {
        let mut store = InMemoryNodeStore::new();
        let opts = DumpOptions::default().with_custom_loaders(true);
        Engine::new().dump(&sample(), &mut store, &opts).unwrap();
        let err = Engine::new()
            .load(&store, &LoadOptions::default())
            .unwrap_err();
        match err {
            HklError::Reconstruction { type_name, source, .. } => {
                assert_eq!(type_name, "physics.Particle");
                assert!(matches!(source, LoaderError::MissingClass(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn builtin_subclass_instance_roundtrips() {
        let my_list = Class::new("app", "MyList", &[Class::list_type()]).unwrap();
        let value = Value::object(
            Instance::new(my_list).with_field("items", Value::list(vec![Value::Int(1)])),
        );
        let mut engine = Engine::new();
        for (custom, base_type) in [(false, OPAQUE_BASE_TYPE), (true, "object")] {
            let mut store = InMemoryNodeStore::new();
            let opts = DumpOptions::default().with_custom_loaders(custom);
            engine.dump(&value, &mut store, &opts).unwrap();
            let attrs = store.attrs(&p("/data")).unwrap();
            assert_eq!(attrs.get_str("base_type"), Some(base_type));
            assert_eq!(attrs.get_str("type"), Some("app.MyList"));
            assert_eq!(engine.load(&store, &LoadOptions::default()).unwrap(), value);
        }
    }

    #[test]
    fn object_referring_to_itself() {
        let node = Value::object(Instance::new(particle()));
        node.expect_object().unwrap().borrow_mut().set("next", node.clone());
        let mut engine = Engine::new();
        engine.manager_mut().register_class(particle());
        let mut store = InMemoryNodeStore::new();
        let opts = DumpOptions::default().with_custom_loaders(true);
        engine.dump(&node, &mut store, &opts).unwrap();
        let loaded = engine.load(&store, &LoadOptions::default()).unwrap();
        let next = loaded.expect_object().unwrap().borrow().get("next").cloned().unwrap();
        assert!(next.is_same(&loaded));
        node.expect_object().unwrap().borrow_mut().set("next", Value::None);
        loaded.expect_object().unwrap().borrow_mut().set("next", Value::None);
    }
}
