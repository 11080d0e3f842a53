use crate::class::Class;
use crate::value::Value;

/// State of a user-defined object: its class plus ordered named fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    class: Class,
    fields: Vec<(String, Value)>,
}

impl Instance {
    /// An instance of `class` with no fields set.
    pub fn new(class: Class) -> Self {
        Self {
            class,
            fields: Vec::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Set a field, keeping its original position if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let point = Class::new("geometry", "Point", &[]).unwrap();
        let mut inst = Instance::new(point)
            .with_field("x", 1i64)
            .with_field("y", 2i64);
        inst.set("x", 10i64);
        let names: Vec<_> = inst.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(inst.get("x"), Some(&Value::Int(10)));
        assert!(inst.get("z").is_none());
    }
}
