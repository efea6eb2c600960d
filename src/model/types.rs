//! Object types and typed objects.
//!
//! Types form a single-rooted tree: every [`ObjType`] except the root
//! ([`ObjType::root`], named `object`) has a parent. A type is a cheap,
//! reference-counted handle, so objects can carry it by value.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

/// Name of the implicit root type.
pub const ROOT_TYPE_NAME: &str = "object";

static ROOT: LazyLock<ObjType> = LazyLock::new(|| ObjType {
    inner: Arc::new(TypeNode {
        name: ROOT_TYPE_NAME.to_string(),
        parent: None,
    }),
});

#[derive(Debug, Serialize, Deserialize)]
struct TypeNode {
    name: String,
    parent: Option<ObjType>,
}

/// An object type, as used in PDDL to narrow down the objects that can fill
/// predicate or action arguments.
///
/// Parents are fixed at construction, so the hierarchy cannot contain cycles.
/// Two types are equal when their paths from the root are equal.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjType {
    inner: Arc<TypeNode>,
}

impl ObjType {
    /// The root type `object`.
    pub fn root() -> Self {
        ROOT.clone()
    }

    /// Create a direct subtype of `parent`.
    pub fn new(name: impl Into<String>, parent: &ObjType) -> Self {
        Self {
            inner: Arc::new(TypeNode {
                name: name.into().to_lowercase(),
                parent: Some(parent.clone()),
            }),
        }
    }

    /// Create a direct subtype of the root type.
    pub fn with_root_parent(name: impl Into<String>) -> Self {
        Self::new(name, &Self::root())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&ObjType> {
        self.inner.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Types from the root down to `self` (inclusive).
    pub fn path_from_root(&self) -> Vec<ObjType> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(t) = current {
            path.push(t.clone());
            current = t.parent();
        }
        path.reverse();
        path
    }

    /// Whether `self` equals `other` or descends from it.
    pub fn is_subtype(&self, other: &ObjType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    pub fn is_supertype(&self, other: &ObjType) -> bool {
        other.is_subtype(self)
    }

    /// The deepest type that both `self` and `other` descend from, or `None`
    /// when the two hierarchies are unrelated.
    pub fn lowest_common_ancestor(&self, other: &ObjType) -> Option<ObjType> {
        let mine = self.path_from_root();
        let theirs = other.path_from_root();
        let mut lca = None;
        for (a, b) in mine.iter().zip(theirs.iter()) {
            if a != b {
                break;
            }
            lca = Some(a.clone());
        }
        lca
    }

    /// Type-as-factory: build an object of this type.
    pub fn object(&self, name: impl Into<String>) -> Object {
        Object::new(name, self.clone())
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(t) = current {
            depth += 1;
            current = t.parent();
        }
        depth
    }
}

impl PartialEq for ObjType {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.inner.name == other.inner.name && self.inner.parent == other.inner.parent
    }
}

impl Eq for ObjType {}

impl Hash for ObjType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // The name and depth are enough to spread the hash; equality settles ties.
        self.inner.name.hash(state);
        self.depth().hash(state);
    }
}

impl Ord for ObjType {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }
        let mine = self.path_from_root();
        let theirs = other.path_from_root();
        mine.iter()
            .map(ObjType::name)
            .cmp(theirs.iter().map(ObjType::name))
    }
}

impl PartialOrd for ObjType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent() {
            Some(parent) => write!(f, "{} - {}", self.name(), parent.name()),
            None => write!(f, "{}", self.name()),
        }
    }
}

impl fmt::Debug for ObjType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjType({self})")
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// A typed STRIPS object. Objects whose name starts with `?` are variables,
/// the rest are constants. Names are normalized to lowercase.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Object {
    name: String,
    objtype: ObjType,
}

impl Object {
    pub fn new(name: impl Into<String>, objtype: ObjType) -> Self {
        Self {
            name: name.into().to_lowercase(),
            objtype,
        }
    }

    /// A constant (or variable) of the root type.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, ObjType::root())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objtype(&self) -> &ObjType {
        &self.objtype
    }

    pub fn is_variable(&self) -> bool {
        self.name.starts_with('?')
    }

    pub fn is_constant(&self) -> bool {
        !self.is_variable()
    }

    /// Whether `self` may stand where an object of `other`'s type is expected.
    pub fn is_compatible(&self, other: &Object) -> bool {
        self.objtype.is_subtype(&other.objtype)
    }

    /// `sigma[self]` if present, otherwise `self`.
    pub fn replace(&self, sigma: &super::atom::Substitution) -> Object {
        sigma.get(self).cloned().unwrap_or_else(|| self.clone())
    }

    /// PDDL rendering, optionally followed by ` - type`.
    pub fn to_pddl(&self, include_type: bool) -> String {
        if include_type {
            format!("{} - {}", self.name, self.objtype.name())
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({} - {})", self.name, self.objtype.name())
    }
}
