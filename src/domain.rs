//! Declared STRIPS domains: types, predicates and hand-written action schemas.
//!
//! Unlike a learned library, a declared domain is validated on every
//! declaration: names are unique, types are declared before use, and every
//! atom of an action must be generated by a declared predicate.

use std::collections::BTreeSet;

use crate::action::Action;
use crate::error::{ModelError, ModelResult};
use crate::model::{LabeledAtom, ObjType, Object, Predicate, Section, ROOT_TYPE_NAME};
use crate::pddl;

#[derive(Debug, Clone, Default)]
pub struct Domain {
    name: String,
    types: Vec<ObjType>,
    predicates: Vec<Predicate>,
    actions: Vec<Action>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[ObjType] {
        &self.types
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn predicate(&self, head: &str) -> Option<&Predicate> {
        self.predicates.iter().find(|p| p.head == head)
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name() == name)
    }

    fn is_known_type(&self, ty: &ObjType) -> bool {
        ty.is_root() || self.types.contains(ty)
    }

    /// Declare a type. `None` as parent means the root type.
    pub fn declare_type(&mut self, name: &str, parent: Option<&ObjType>) -> ModelResult<ObjType> {
        let objtype = match parent {
            Some(parent) => ObjType::new(name, parent),
            None => ObjType::with_root_parent(name),
        };
        if objtype.name() == ROOT_TYPE_NAME || self.types.iter().any(|t| t.name() == objtype.name()) {
            return Err(ModelError::DuplicateType {
                name: objtype.name().to_string(),
            });
        }
        if let Some(parent) = parent
            && !self.is_known_type(parent)
        {
            return Err(ModelError::UndeclaredParentType {
                name: objtype.name().to_string(),
                parent: parent.name().to_string(),
            });
        }
        self.types.push(objtype.clone());
        Ok(objtype)
    }

    pub fn declare_predicate(&mut self, head: &str, arg_types: Vec<ObjType>) -> ModelResult<Predicate> {
        if self.predicate(head).is_some() {
            return Err(ModelError::DuplicatePredicate { head: head.to_string() });
        }
        if let Some(unknown) = arg_types.iter().find(|t| !self.is_known_type(t)) {
            return Err(ModelError::UnknownType {
                name: unknown.name().to_string(),
                declaration: head.to_string(),
            });
        }
        let predicate = Predicate::new(head, arg_types);
        self.predicates.push(predicate.clone());
        Ok(predicate)
    }

    /// Declare an action from explicit parameters and its three atom lists.
    pub fn declare_action(
        &mut self,
        name: &str,
        parameters: Vec<Object>,
        atoms: Vec<LabeledAtom>,
    ) -> ModelResult<&Action> {
        if self.action(name).is_some() {
            return Err(ModelError::DuplicateAction { name: name.to_string() });
        }
        if let Some(unknown) = parameters.iter().find(|p| !self.is_known_type(p.objtype())) {
            return Err(ModelError::UnknownType {
                name: unknown.objtype().name().to_string(),
                declaration: name.to_string(),
            });
        }
        for latom in &atoms {
            if !self.predicates.iter().any(|p| p.has_generated(&latom.atom)) {
                return Err(ModelError::UnknownPredicateSignature {
                    atom: latom.atom.to_string(),
                });
            }
        }
        let action = Action::with_parameters(name, parameters, atoms)?;
        tracing::debug!(domain = %self.name, action = name, "action declared");
        self.actions.push(action);
        Ok(&self.actions[self.actions.len() - 1])
    }

    /// Heads of the predicates that no action ever adds or deletes.
    pub fn static_predicates(&self) -> BTreeSet<String> {
        let mut heads: BTreeSet<String> = self.predicates.iter().map(|p| p.head.clone()).collect();
        for action in &self.actions {
            for latom in action.atoms().iter().filter(|l| l.section != Section::Pre) {
                heads.remove(latom.head());
            }
        }
        heads
    }

    pub fn to_pddl(&self) -> String {
        pddl::domain_to_pddl(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Atom, Context};

    /// A typed logistics fragment: trucks move between locations connected
    /// by roads.
    fn logistics() -> (Domain, ObjType, ObjType) {
        let mut domain = Domain::new("logistics");
        let vehicle = domain.declare_type("vehicle", None).unwrap();
        let truck = domain.declare_type("truck", Some(&vehicle)).unwrap();
        let location = domain.declare_type("location", None).unwrap();
        domain
            .declare_predicate("at", vec![vehicle.clone(), location.clone()])
            .unwrap();
        domain
            .declare_predicate("road", vec![location.clone(), location.clone()])
            .unwrap();
        let (t, from, to) = (truck.object("?t"), location.object("?from"), location.object("?to"));
        let at = |loc: &Object| Atom::new("at", vec![t.clone(), loc.clone()]);
        domain
            .declare_action(
                "drive",
                vec![t.clone(), from.clone(), to.clone()],
                vec![
                    LabeledAtom::pre(at(&from)),
                    LabeledAtom::pre(Atom::new("road", vec![from.clone(), to.clone()])),
                    LabeledAtom::add(at(&to)),
                    LabeledAtom::del(at(&from)),
                ],
            )
            .unwrap();
        (domain, truck, location)
    }

    #[test]
    fn declared_action_is_executable() {
        let (domain, truck, location) = logistics();
        let drive = domain.action("drive").unwrap();
        let t1 = truck.object("t1");
        let (a, b) = (location.object("a"), location.object("b"));
        let pre = Context::from_atoms([
            Atom::new("at", vec![t1.clone(), a.clone()]),
            Atom::new("road", vec![a.clone(), b.clone()]),
        ]);
        let sigmas: Vec<_> = drive.groundings(&pre).collect();
        assert_eq!(sigmas.len(), 1);
        let post = drive.instantiate(&sigmas[0], false).apply(&pre).unwrap().unwrap();
        assert!(post.contains(&Atom::new("at", vec![t1, b])));
    }

    #[test]
    fn static_predicates_are_never_effects() {
        let (domain, _, _) = logistics();
        assert_eq!(domain.static_predicates(), BTreeSet::from(["road".to_string()]));
    }

    #[test]
    fn duplicate_and_root_types_are_rejected() {
        let (mut domain, _, _) = logistics();
        assert!(matches!(
            domain.declare_type("truck", None),
            Err(ModelError::DuplicateType { .. })
        ));
        assert!(matches!(
            domain.declare_type("object", None),
            Err(ModelError::DuplicateType { .. })
        ));
    }

    #[test]
    fn parent_must_be_declared() {
        let mut domain = Domain::new("d");
        let stray = ObjType::with_root_parent("stray");
        let err = domain.declare_type("child", Some(&stray)).unwrap_err();
        assert!(matches!(err, ModelError::UndeclaredParentType { ref parent, .. } if parent == "stray"));
    }

    #[test]
    fn predicate_validation() {
        let (mut domain, _, _) = logistics();
        assert!(matches!(
            domain.declare_predicate("at", vec![]),
            Err(ModelError::DuplicatePredicate { .. })
        ));
        let stray = ObjType::with_root_parent("stray");
        assert!(matches!(
            domain.declare_predicate("lost", vec![stray]),
            Err(ModelError::UnknownType { .. })
        ));
    }

    #[test]
    fn action_validation() {
        let (mut domain, truck, location) = logistics();
        let t = truck.object("?t");
        assert!(matches!(
            domain.declare_action("drive", vec![], vec![]),
            Err(ModelError::DuplicateAction { .. })
        ));
        // `at` is declared with arity 2.
        let bad = LabeledAtom::add(Atom::new("at", vec![t.clone()]));
        assert!(matches!(
            domain.declare_action("park", vec![t.clone()], vec![bad]),
            Err(ModelError::UnknownPredicateSignature { .. })
        ));
        // Arguments swapped: a location does not fit the vehicle slot.
        let l = location.object("?l");
        let swapped = LabeledAtom::add(Atom::new("at", vec![l.clone(), t.clone()]));
        assert!(matches!(
            domain.declare_action("swap", vec![t.clone(), l.clone()], vec![swapped]),
            Err(ModelError::UnknownPredicateSignature { .. })
        ));
        let free = LabeledAtom::add(Atom::new("at", vec![t, l]));
        assert!(matches!(
            domain.declare_action("teleport", vec![], vec![free]),
            Err(ModelError::FreeVariable { .. })
        ));
    }

    #[test]
    fn typed_pddl_dump() {
        let (domain, _, _) = logistics();
        let text = domain.to_pddl();
        assert!(text.contains("(:requirements :strips :typing)"));
        assert!(text.contains("  truck - vehicle"));
        assert!(text.contains("(at ?x0 - vehicle ?x1 - location)"));
        assert!(text.contains(":parameters (?t - truck ?from - location ?to - location)"));
    }
}
