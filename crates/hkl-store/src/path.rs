use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Absolute, `/`-separated location of a node inside a store.
///
/// The root is `/`. Non-root paths never end with a separator and never
/// contain empty components.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodePath(String);

impl NodePath {
    /// The root group.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse an absolute path, collapsing repeated separators.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        if !raw.starts_with('/') {
            return Err(StoreError::InvalidName {
                name: raw.to_string(),
                reason: "path must be absolute".into(),
            });
        }
        let mut path = Self::root();
        for component in raw.split('/').filter(|c| !c.is_empty()) {
            path = path.join(component)?;
        }
        Ok(path)
    }

    /// Check that `name` is usable as a single node name.
    pub fn validate_name(name: &str) -> StoreResult<()> {
        let reason = if name.is_empty() {
            "name is empty"
        } else if name.contains('/') {
            "name contains '/'"
        } else if name == "." || name == ".." {
            "name is reserved"
        } else {
            return Ok(());
        };
        Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        })
    }

    /// Path of the child `name` under this path.
    pub fn join(&self, name: &str) -> StoreResult<Self> {
        Self::validate_name(name)?;
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// Enclosing group, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Last component; empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Components from the root downwards.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// `true` if `self` equals `ancestor` or lies beneath it.
    pub fn starts_with(&self, ancestor: &NodePath) -> bool {
        ancestor.is_root()
            || self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0) && self.0[ancestor.0.len()..].starts_with('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({})", self.0)
    }
}

impl std::str::FromStr for NodePath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_parent() {
        let root = NodePath::root();
        let a = root.join("a").unwrap();
        let b = a.join("b").unwrap();
        assert_eq!(a.as_str(), "/a");
        assert_eq!(b.as_str(), "/a/b");
        assert_eq!(b.parent(), Some(a.clone()));
        assert_eq!(a.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
        assert_eq!(b.name(), "b");
        assert_eq!(root.name(), "");
    }

    #[test]
    fn parse_normalizes_separators() {
        let p = NodePath::parse("//data///x/").unwrap();
        assert_eq!(p.as_str(), "/data/x");
        assert_eq!(p.components().collect::<Vec<_>>(), vec!["data", "x"]);
        assert!(NodePath::parse("/").unwrap().is_root());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(NodePath::parse("relative").is_err());
        assert!(NodePath::root().join("").is_err());
        assert!(NodePath::root().join("a/b").is_err());
        assert!(NodePath::root().join("..").is_err());
    }

    #[test]
    fn ancestry() {
        let a = NodePath::parse("/data").unwrap();
        assert!(NodePath::parse("/data/x").unwrap().starts_with(&a));
        assert!(!NodePath::parse("/database").unwrap().starts_with(&a));
        assert!(a.starts_with(&NodePath::root()));
    }
}
