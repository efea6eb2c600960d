//! Core data model: typed objects, atoms, labeled atoms and world states.

pub mod atom;
pub mod context;
pub mod types;

pub use atom::{Atom, LabeledAtom, Predicate, Section, Substitution};
pub use context::{Context, Transition};
pub use types::{ObjType, Object, ROOT_TYPE_NAME};
