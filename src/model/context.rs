//! World-state snapshots with certain and uncertain facts.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::atom::Atom;
use super::types::Object;

/// A world state: the objects in scope, the facts known to hold, and the facts
/// that may hold (partial observability). `atoms` and `uncertain_atoms` are
/// expected to be disjoint; the caller is responsible for that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub objects: BTreeSet<Object>,
    pub atoms: BTreeSet<Atom>,
    #[serde(default)]
    pub uncertain_atoms: BTreeSet<Atom>,
}

impl Context {
    pub fn new(
        objects: impl IntoIterator<Item = Object>,
        atoms: impl IntoIterator<Item = Atom>,
        uncertain_atoms: impl IntoIterator<Item = Atom>,
    ) -> Self {
        Self {
            objects: objects.into_iter().collect(),
            atoms: atoms.into_iter().collect(),
            uncertain_atoms: uncertain_atoms.into_iter().collect(),
        }
    }

    /// A fully observed state whose objects are exactly those mentioned by `atoms`.
    pub fn from_atoms(atoms: impl IntoIterator<Item = Atom>) -> Self {
        let atoms: BTreeSet<Atom> = atoms.into_iter().collect();
        let objects = atoms.iter().flat_map(|a| a.args.iter().cloned()).collect();
        Self {
            objects,
            atoms,
            uncertain_atoms: BTreeSet::new(),
        }
    }

    /// Same as [`Context::from_atoms`], with some facts marked uncertain.
    pub fn from_partial(
        atoms: impl IntoIterator<Item = Atom>,
        uncertain_atoms: impl IntoIterator<Item = Atom>,
    ) -> Self {
        let mut ctx = Self::from_atoms(atoms);
        for atom in uncertain_atoms {
            ctx.objects.extend(atom.args.iter().cloned());
            ctx.uncertain_atoms.insert(atom);
        }
        ctx
    }

    pub fn contains(&self, atom: &Atom) -> bool {
        self.atoms.contains(atom)
    }

    pub fn is_uncertain(&self) -> bool {
        !self.uncertain_atoms.is_empty()
    }

    /// Atoms that must (`certain = true`) or might (`certain = false`) be added
    /// to `other` to turn it into `self`.
    pub fn difference(&self, other: &Context, certain: bool) -> BTreeSet<Atom> {
        if certain {
            self.atoms
                .iter()
                .filter(|a| !other.atoms.contains(a) && !other.uncertain_atoms.contains(a))
                .cloned()
                .collect()
        } else {
            let known_here_maybe_there = self
                .atoms
                .iter()
                .filter(|a| other.uncertain_atoms.contains(a));
            let maybe_here_not_there = self
                .uncertain_atoms
                .iter()
                .filter(|a| !other.atoms.contains(a));
            known_here_maybe_there
                .chain(maybe_here_not_there)
                .cloned()
                .collect()
        }
    }

    /// Two states describe the same world when their certain facts agree.
    pub fn same_facts(&self, other: &Context) -> bool {
        self.atoms == other.atoms
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<String> = self.atoms.iter().map(Atom::to_string).collect();
        let maybe: Vec<String> = self.uncertain_atoms.iter().map(Atom::to_string).collect();
        write!(f, "{{ {}; maybe {} }}", known.join(","), maybe.join(","))
    }
}

/// One observed `(pre, post)` state pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub pre: Context,
    pub post: Context,
}

impl Transition {
    pub fn new(pre: Context, post: Context) -> Self {
        Self { pre, post }
    }
}
