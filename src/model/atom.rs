//! Predicates, atoms and labeled atoms.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

use super::types::{ObjType, Object};

/// A substitution from objects to objects (usually variables to constants, or
/// original objects to merged objects).
pub type Substitution = BTreeMap<Object, Object>;

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// A predicate signature: a head plus one type per argument position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    pub head: String,
    pub arg_types: Vec<ObjType>,
}

impl Predicate {
    pub fn new(head: impl Into<String>, arg_types: Vec<ObjType>) -> Self {
        Self {
            head: head.into(),
            arg_types,
        }
    }

    /// A predicate whose `arity` arguments are all of the root type.
    pub fn untyped(head: impl Into<String>, arity: usize) -> Self {
        Self::new(head, vec![ObjType::root(); arity])
    }

    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    /// Build an atom, checking arity and argument types.
    pub fn instantiate(&self, args: Vec<Object>) -> ModelResult<Atom> {
        if args.len() != self.arity() {
            return Err(ModelError::ArityMismatch {
                head: self.head.clone(),
                expected: self.arity(),
                actual: args.len(),
            });
        }
        for (arg, ty) in args.iter().zip(&self.arg_types) {
            if !arg.objtype().is_subtype(ty) {
                return Err(ModelError::TypeMismatch {
                    head: self.head.clone(),
                    argument: arg.to_pddl(true),
                    expected: ty.name().to_string(),
                });
            }
        }
        Ok(Atom::new(self.head.clone(), args))
    }

    /// Whether `atom` could have been produced by [`Predicate::instantiate`].
    pub fn has_generated(&self, atom: &Atom) -> bool {
        atom.head == self.head
            && atom.arity() == self.arity()
            && atom
                .args
                .iter()
                .zip(&self.arg_types)
                .all(|(arg, ty)| arg.objtype().is_subtype(ty))
    }

    pub fn to_pddl(&self, include_types: bool) -> String {
        let dummies: Vec<Object> = self
            .arg_types
            .iter()
            .enumerate()
            .map(|(i, t)| t.object(format!("?x{i}")))
            .collect();
        Atom::new(self.head.clone(), dummies).to_pddl(include_types)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_pddl(true))
    }
}

// ---------------------------------------------------------------------------
// Atom
// ---------------------------------------------------------------------------

/// A predicate applied to objects. Lifted when any argument is a variable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Atom {
    pub head: String,
    pub args: Vec<Object>,
}

impl Atom {
    pub fn new(head: impl Into<String>, args: Vec<Object>) -> Self {
        Self {
            head: head.into(),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// `(head, arity)`: two atoms can only ever match if these agree.
    pub fn signature(&self) -> (&str, usize) {
        (&self.head, self.arity())
    }

    pub fn is_lifted(&self) -> bool {
        self.args.iter().any(Object::is_variable)
    }

    pub fn is_ground(&self) -> bool {
        !self.is_lifted()
    }

    /// A new atom with every argument found in `sigma` replaced.
    pub fn replace(&self, sigma: &Substitution) -> Atom {
        Atom {
            head: self.head.clone(),
            args: self.args.iter().map(|a| a.replace(sigma)).collect(),
        }
    }

    pub fn to_pddl(&self, include_types: bool) -> String {
        if self.args.is_empty() {
            return format!("({})", self.head);
        }
        let args: Vec<String> = self.args.iter().map(|a| a.to_pddl(include_types)).collect();
        format!("({} {})", self.head, args.join(" "))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self.args.iter().map(Object::name).collect();
        write!(f, "{}({})", self.head, args.join(","))
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({self})")
    }
}

// ---------------------------------------------------------------------------
// Labeled atom
// ---------------------------------------------------------------------------

/// The section of an action an atom belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Pre,
    Add,
    Del,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Pre, Section::Add, Section::Del];

    pub fn is_effect(self) -> bool {
        !matches!(self, Section::Pre)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Pre => write!(f, "pre"),
            Section::Add => write!(f, "add"),
            Section::Del => write!(f, "del"),
        }
    }
}

/// An atom labeled with its action section and a certainty flag. Uncertain
/// atoms model partial observability: the atom *may* hold or change.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabeledAtom {
    pub atom: Atom,
    pub section: Section,
    pub certain: bool,
}

impl LabeledAtom {
    pub fn new(atom: Atom, section: Section, certain: bool) -> Self {
        Self {
            atom,
            section,
            certain,
        }
    }

    pub fn pre(atom: Atom) -> Self {
        Self::new(atom, Section::Pre, true)
    }

    pub fn add(atom: Atom) -> Self {
        Self::new(atom, Section::Add, true)
    }

    pub fn del(atom: Atom) -> Self {
        Self::new(atom, Section::Del, true)
    }

    /// Same atom, marked uncertain.
    pub fn uncertain(mut self) -> Self {
        self.certain = false;
        self
    }

    pub fn head(&self) -> &str {
        &self.atom.head
    }

    pub fn args(&self) -> &[Object] {
        &self.atom.args
    }

    pub fn replace(&self, sigma: &Substitution) -> LabeledAtom {
        LabeledAtom {
            atom: self.atom.replace(sigma),
            section: self.section,
            certain: self.certain,
        }
    }

    /// Whether `self` and `other` may be merged: same section and signature.
    pub fn is_compatible(&self, other: &LabeledAtom) -> bool {
        self.section == other.section && self.atom.signature() == other.atom.signature()
    }
}

impl fmt::Display for LabeledAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.certain { "" } else { "?" };
        write!(f, "{}:{mark}{}", self.section, self.atom)
    }
}

impl fmt::Debug for LabeledAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabeledAtom({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> ObjType {
        ObjType::with_root_parent("location")
    }

    #[test]
    fn predicate_validates_arity_and_types() {
        let agent = ObjType::with_root_parent("agent");
        let at = Predicate::new("at", vec![agent.clone(), location()]);

        let ok = at.instantiate(vec![agent.object("r"), location().object("a")]);
        assert!(ok.is_ok());

        let arity = at.instantiate(vec![agent.object("r")]);
        assert!(matches!(arity, Err(ModelError::ArityMismatch { expected: 2, actual: 1, .. })));

        let types = at.instantiate(vec![location().object("a"), agent.object("r")]);
        assert!(matches!(types, Err(ModelError::TypeMismatch { .. })));
    }

    #[test]
    fn predicate_recognizes_generated_atoms() {
        let adj = Predicate::new("adjacent", vec![location(), location()]);
        let atom = adj
            .instantiate(vec![location().object("a"), location().object("b")])
            .unwrap();
        assert!(adj.has_generated(&atom));
        assert!(!adj.has_generated(&Atom::new("adjacent", vec![location().object("a")])));
        assert!(!Predicate::untyped("at", 2).has_generated(&atom));
    }

    #[test]
    fn replace_is_pure() {
        let x = Object::untyped("?x");
        let a = Object::untyped("a");
        let atom = Atom::new("p", vec![x.clone(), x.clone()]);
        let sigma: Substitution = [(x.clone(), a.clone())].into_iter().collect();
        let replaced = atom.replace(&sigma);
        assert_eq!(replaced.args, vec![a.clone(), a]);
        assert!(atom.is_lifted());
        assert!(replaced.is_ground());
    }

    #[test]
    fn labeled_atom_display_marks_uncertainty() {
        let atom = Atom::new("on", vec![Object::untyped("a"), Object::untyped("b")]);
        assert_eq!(LabeledAtom::pre(atom.clone()).to_string(), "pre:on(a,b)");
        assert_eq!(LabeledAtom::del(atom).uncertain().to_string(), "del:?on(a,b)");
    }

    #[test]
    fn compatibility_requires_section_and_signature() {
        let a = Atom::new("on", vec![Object::untyped("a"), Object::untyped("b")]);
        let b = Atom::new("on", vec![Object::untyped("c"), Object::untyped("d")]);
        let c = Atom::new("on", vec![Object::untyped("c")]);
        assert!(LabeledAtom::pre(a.clone()).is_compatible(&LabeledAtom::pre(b.clone()).uncertain()));
        assert!(!LabeledAtom::pre(a.clone()).is_compatible(&LabeledAtom::add(b)));
        assert!(!LabeledAtom::pre(a).is_compatible(&LabeledAtom::pre(c)));
    }

    #[test]
    fn pddl_rendering() {
        let adj = Predicate::new("adjacent", vec![location(), location()]);
        assert_eq!(adj.to_pddl(true), "(adjacent ?x0 - location ?x1 - location)");
        assert_eq!(Atom::new("handempty", vec![]).to_pddl(false), "(handempty)");
    }
}
