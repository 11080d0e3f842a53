//! Runtime type descriptors.
//!
//! A [`Class`] describes the runtime type of a [`Value`](crate::Value): a
//! module, a name, and an ordered list of base classes. The dump engine never
//! relies on Rust's static types to pick an encoder; it walks
//! [`Class::mro`] instead, which is what lets it handle types defined by
//! callers it was never compiled against.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::error::TypeError;

/// Module name shared by all built-in classes.
pub const BUILTINS_MODULE: &str = "builtins";

struct ClassInfo {
    module: String,
    name: String,
    bases: Vec<Class>,
    /// Linearized ancestors, excluding the class itself.
    ancestors: OnceLock<Vec<Class>>,
}

/// A shared, immutable runtime type descriptor.
///
/// Two classes are equal when their qualified names (`module.name`) are
/// equal. Classes are cheap to clone.
#[derive(Clone)]
pub struct Class(Arc<ClassInfo>);

impl Class {
    /// Define a class. An empty `bases` slice means "derives from `object`".
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        bases: &[Class],
    ) -> Result<Self, TypeError> {
        let module = module.into();
        let name = name.into();
        if module.is_empty() || name.is_empty() || name.contains('.') {
            return Err(TypeError::InvalidClassName(format!("{module}.{name}")));
        }
        let bases = if bases.is_empty() {
            vec![Class::object()]
        } else {
            bases.to_vec()
        };
        Ok(Self::raw(module, name, bases))
    }

    fn raw(module: String, name: String, bases: Vec<Class>) -> Self {
        Self(Arc::new(ClassInfo {
            module,
            name,
            bases,
            ancestors: OnceLock::new(),
        }))
    }

    /// Module the class is defined in.
    pub fn module(&self) -> &str {
        &self.0.module
    }

    /// Bare class name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Fully qualified `module.name`, used as the class identity.
    pub fn qualname(&self) -> String {
        format!("{}.{}", self.0.module, self.0.name)
    }

    /// Top-level package of the defining module.
    pub fn package(&self) -> &str {
        self.0.module.split('.').next().unwrap_or(&self.0.module)
    }

    /// Direct base classes, in declaration order.
    pub fn bases(&self) -> &[Class] {
        &self.0.bases
    }

    /// Method resolution order: the class itself followed by its ancestors,
    /// most derived first.
    ///
    /// Uses C3 linearization; hierarchies C3 rejects fall back to
    /// depth-first, left-to-right order with duplicates removed.
    pub fn mro(&self) -> Vec<Class> {
        let ancestors = self.0.ancestors.get_or_init(|| {
            let mut order = c3_linearize(self).unwrap_or_else(|| depth_first(self));
            order.remove(0);
            order
        });
        let mut mro = Vec::with_capacity(ancestors.len() + 1);
        mro.push(self.clone());
        mro.extend(ancestors.iter().cloned());
        mro
    }

    /// `true` if `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        self == other || self.mro().iter().any(|c| c == other)
    }

    /// `true` for classes defined in the `builtins` module.
    pub fn is_builtin(&self) -> bool {
        self.0.module == BUILTINS_MODULE
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.module == other.0.module && self.0.name == other.0.name)
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.module.hash(state);
        self.0.name.hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.qualname())
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualname())
    }
}

fn c3_linearize(class: &Class) -> Option<Vec<Class>> {
    let mut seqs: Vec<Vec<Class>> = class.bases().iter().map(Class::mro).collect();
    seqs.push(class.bases().to_vec());
    let mut result = vec![class.clone()];
    loop {
        seqs.retain(|s| !s.is_empty());
        if seqs.is_empty() {
            return Some(result);
        }
        let candidate = seqs
            .iter()
            .map(|s| &s[0])
            .find(|head| !seqs.iter().any(|s| s[1..].contains(head)))?
            .clone();
        for seq in seqs.iter_mut() {
            if seq[0] == candidate {
                seq.remove(0);
            }
        }
        result.push(candidate);
    }
}

fn depth_first(class: &Class) -> Vec<Class> {
    fn visit(class: &Class, out: &mut Vec<Class>) {
        if out.contains(class) {
            return;
        }
        out.push(class.clone());
        for base in class.bases() {
            visit(base, out);
        }
    }
    let mut out = Vec::new();
    visit(class, &mut out);
    out
}

// ---------------------------------------------------------------------------
// Built-in classes
// ---------------------------------------------------------------------------

struct Builtins {
    object: Class,
    none: Class,
    int: Class,
    bool: Class,
    float: Class,
    complex: Class,
    str: Class,
    bytes: Class,
    list: Class,
    tuple: Class,
    set: Class,
    dict: Class,
    ndarray: Class,
}

fn builtins() -> &'static Builtins {
    static BUILTINS: OnceLock<Builtins> = OnceLock::new();
    BUILTINS.get_or_init(|| {
        let object = Class::raw(BUILTINS_MODULE.into(), "object".into(), Vec::new());
        let derive = |name: &str, base: &Class| {
            Class::raw(BUILTINS_MODULE.into(), name.into(), vec![base.clone()])
        };
        let int = derive("int", &object);
        Builtins {
            none: derive("NoneType", &object),
            bool: derive("bool", &int),
            float: derive("float", &object),
            complex: derive("complex", &object),
            str: derive("str", &object),
            bytes: derive("bytes", &object),
            list: derive("list", &object),
            tuple: derive("tuple", &object),
            set: derive("set", &object),
            dict: derive("dict", &object),
            ndarray: derive("ndarray", &object),
            int,
            object,
        }
    })
}

impl Class {
    /// Root of every class hierarchy.
    pub fn object() -> Class {
        builtins().object.clone()
    }

    pub fn none_type() -> Class {
        builtins().none.clone()
    }

    /// `bool` derives from `int`.
    pub fn bool_type() -> Class {
        builtins().bool.clone()
    }

    pub fn int_type() -> Class {
        builtins().int.clone()
    }

    pub fn float_type() -> Class {
        builtins().float.clone()
    }

    pub fn complex_type() -> Class {
        builtins().complex.clone()
    }

    pub fn str_type() -> Class {
        builtins().str.clone()
    }

    pub fn bytes_type() -> Class {
        builtins().bytes.clone()
    }

    pub fn list_type() -> Class {
        builtins().list.clone()
    }

    pub fn tuple_type() -> Class {
        builtins().tuple.clone()
    }

    pub fn set_type() -> Class {
        builtins().set.clone()
    }

    pub fn dict_type() -> Class {
        builtins().dict.clone()
    }

    pub fn ndarray_type() -> Class {
        builtins().ndarray.clone()
    }

    /// Every built-in class, for seeding class tables.
    pub fn all_builtins() -> Vec<Class> {
        let b = builtins();
        vec![
            b.object.clone(),
            b.none.clone(),
            b.int.clone(),
            b.bool.clone(),
            b.float.clone(),
            b.complex.clone(),
            b.str.clone(),
            b.bytes.clone(),
            b.list.clone(),
            b.tuple.clone(),
            b.set.clone(),
            b.dict.clone(),
            b.ndarray.clone(),
        ]
    }
}
