//! Action schemas: named, parameterized bundles of labeled atoms.
//!
//! Actions are immutable values. Every "mutation" (renaming objects, dropping
//! uncertain atoms, filtering) produces a new [`Action`].
//!
//! ## Grounding
//!
//! [`Action::groundings`] first enumerates the substitutions satisfying the
//! precondition against a state ([`GoalMatch`]) and then completes every
//! parameter the precondition leaves unbound with the type-compatible objects of
//! the state ([`ParameterProduct`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::model::{Atom, Context, LabeledAtom, Object, Section, Substitution};
use crate::unify::{GoalMatch, ParameterProduct};

/// Multiset of predicate heads, keyed by head.
pub type RoleCount = BTreeMap<String, usize>;

/// `(certain atoms, uncertain atoms, arity)`. Two versions of an action carry
/// the same information exactly when their digests agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDigest {
    pub certain: usize,
    pub uncertain: usize,
    pub arity: usize,
}

/// A STRIPS-style action schema.
///
/// Invariants: every parameter is a variable, and every variable occurring in
/// an atom is a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    name: String,
    parameters: Vec<Object>,
    atoms: Vec<LabeledAtom>,
}

impl Action {
    /// Build an action whose parameters are the variables of its atoms, in
    /// canonical (sorted) order.
    pub fn new(name: impl Into<String>, atoms: Vec<LabeledAtom>) -> Self {
        let parameters = collect_variables(&atoms).into_iter().collect();
        Self {
            name: name.into(),
            parameters,
            atoms,
        }
    }

    /// Build an action with an explicit parameter list. Parameters may include
    /// variables that no atom mentions; those are grounded by enumeration.
    pub fn with_parameters(
        name: impl Into<String>,
        parameters: Vec<Object>,
        atoms: Vec<LabeledAtom>,
    ) -> ModelResult<Self> {
        let name = name.into();
        if let Some(param) = parameters.iter().find(|p| !p.is_variable()) {
            return Err(ModelError::NotAVariable {
                action: name,
                parameter: param.to_string(),
            });
        }
        let declared: BTreeSet<&Object> = parameters.iter().collect();
        for var in collect_variables(&atoms) {
            if !declared.contains(&var) {
                return Err(ModelError::FreeVariable {
                    action: name,
                    variable: var.to_string(),
                });
            }
        }
        Ok(Self {
            name,
            parameters,
            atoms,
        })
    }

    /// The leaf action explaining one observed transition: the whole pre-state
    /// as precondition, and the certain/uncertain differences as effects.
    pub fn from_transition(name: impl Into<String>, pre: &Context, post: &Context) -> Self {
        let mut atoms = Vec::new();
        atoms.extend(pre.atoms.iter().cloned().map(LabeledAtom::pre));
        atoms.extend(
            pre.uncertain_atoms
                .iter()
                .cloned()
                .map(|a| LabeledAtom::pre(a).uncertain()),
        );
        atoms.extend(post.difference(pre, true).into_iter().map(LabeledAtom::add));
        atoms.extend(
            post.difference(pre, false)
                .into_iter()
                .map(|a| LabeledAtom::add(a).uncertain()),
        );
        atoms.extend(pre.difference(post, true).into_iter().map(LabeledAtom::del));
        atoms.extend(
            pre.difference(post, false)
                .into_iter()
                .map(|a| LabeledAtom::del(a).uncertain()),
        );
        Self::new(name, atoms)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Object] {
        &self.parameters
    }

    pub fn atoms(&self) -> &[LabeledAtom] {
        &self.atoms
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Same action under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Same name and parameters, different atoms. Parameters that no longer
    /// occur in any atom are dropped.
    pub fn with_atoms(&self, atoms: Vec<LabeledAtom>) -> Self {
        let used = collect_variables(&atoms);
        Self {
            name: self.name.clone(),
            parameters: self
                .parameters
                .iter()
                .filter(|p| used.contains(*p))
                .cloned()
                .collect(),
            atoms,
        }
    }

    pub fn atoms_in(&self, section: Section) -> impl Iterator<Item = &LabeledAtom> {
        self.atoms.iter().filter(move |l| l.section == section)
    }

    pub fn precondition(&self) -> impl Iterator<Item = &Atom> {
        self.atoms_in(Section::Pre).map(|l| &l.atom)
    }

    pub fn add_list(&self) -> impl Iterator<Item = &Atom> {
        self.atoms_in(Section::Add).map(|l| &l.atom)
    }

    pub fn del_list(&self) -> impl Iterator<Item = &Atom> {
        self.atoms_in(Section::Del).map(|l| &l.atom)
    }

    /// Objects (constants and variables) referenced by atoms of the given
    /// sections; all sections when `sections` is empty.
    pub fn referenced_objects(&self, sections: &[Section]) -> BTreeSet<Object> {
        self.atoms
            .iter()
            .filter(|l| sections.is_empty() || sections.contains(&l.section))
            .flat_map(|l| l.args().iter().cloned())
            .collect()
    }

    pub fn is_ground(&self) -> bool {
        self.atoms.iter().all(|l| l.atom.is_ground())
    }

    pub fn is_certain(&self) -> bool {
        self.atoms.iter().all(|l| l.certain)
    }

    /// The action restricted to its certain atoms.
    pub fn certain_fragment(&self) -> Self {
        self.with_atoms(self.atoms.iter().filter(|l| l.certain).cloned().collect())
    }

    /// Substitute objects everywhere, keeping the name. Parameters are
    /// recomputed from the resulting atoms.
    pub fn replace(&self, sigma: &Substitution) -> Self {
        let atoms = self.atoms.iter().map(|l| l.replace(sigma)).collect();
        Self::new(self.name.clone(), atoms)
    }

    /// Substitute the parameters with constants. Uncertain atoms are kept only
    /// when `include_uncertain` is set.
    pub fn instantiate(&self, sigma: &Substitution, include_uncertain: bool) -> Self {
        let atoms = self
            .atoms
            .iter()
            .filter(|l| l.certain || include_uncertain)
            .map(|l| l.replace(sigma))
            .collect();
        Self::new(self.name.clone(), atoms)
    }

    /// Every substitution of the parameters with objects of `ctx` under which
    /// the precondition holds in `ctx`.
    pub fn groundings<'a>(&'a self, ctx: &'a Context) -> impl Iterator<Item = Substitution> + 'a {
        let goals: Vec<Atom> = self.precondition().cloned().collect();
        GoalMatch::new(&ctx.atoms, goals)
            .flat_map(move |sigma| ParameterProduct::new(&self.parameters, &ctx.objects, sigma))
    }

    /// Apply a ground, certain action. Returns `Ok(None)` when some
    /// precondition atom does not hold in `ctx`.
    pub fn apply(&self, ctx: &Context) -> ModelResult<Option<Context>> {
        for latom in &self.atoms {
            if latom.atom.is_lifted() {
                return Err(ModelError::NotGround {
                    action: self.name.clone(),
                    atom: latom.atom.to_string(),
                });
            }
            if !latom.certain {
                return Err(ModelError::UncertainAtom {
                    action: self.name.clone(),
                    atom: latom.atom.to_string(),
                });
            }
        }
        if !self.precondition().all(|a| ctx.contains(a)) {
            return Ok(None);
        }
        let mut next = ctx.clone();
        for atom in self.add_list() {
            next.atoms.insert(atom.clone());
        }
        for atom in self.del_list() {
            next.atoms.remove(atom);
        }
        Ok(Some(next))
    }

    /// Whether some grounding of the certain fragment, applied to `pre`,
    /// yields exactly the facts of `post`.
    pub fn can_produce_transition(&self, pre: &Context, post: &Context) -> bool {
        let fragment = self.certain_fragment();
        fragment.groundings(pre).any(|sigma| {
            let grounded = fragment.instantiate(&sigma, false);
            matches!(grounded.apply(pre), Ok(Some(next)) if next.same_facts(post))
        })
    }

    /// Occurrences of each predicate head among the atoms of `sections`.
    pub fn role_count(&self, sections: &[Section], include_uncertain: bool) -> RoleCount {
        let mut count = RoleCount::new();
        for latom in &self.atoms {
            if sections.contains(&latom.section) && (latom.certain || include_uncertain) {
                *count.entry(latom.head().to_string()).or_insert(0) += 1;
            }
        }
        count
    }

    pub fn digest(&self) -> ActionDigest {
        let certain = self.atoms.iter().filter(|l| l.certain).count();
        ActionDigest {
            certain,
            uncertain: self.atoms.len() - certain,
            arity: self.arity(),
        }
    }

    /// Atoms of `section` in canonical order.
    pub fn sorted_atoms(&self, section: Section) -> Vec<&LabeledAtom> {
        let mut atoms: Vec<&LabeledAtom> = self.atoms_in(section).collect();
        atoms.sort_by(|a, b| a.atom.cmp(&b.atom));
        atoms
    }
}

fn collect_variables(atoms: &[LabeledAtom]) -> BTreeSet<Object> {
    atoms
        .iter()
        .flat_map(|l| l.args().iter())
        .filter(|o| o.is_variable())
        .cloned()
        .collect()
}

fn dominated(smaller: &RoleCount, larger: &RoleCount) -> bool {
    smaller
        .iter()
        .all(|(head, n)| *n <= larger.get(head).copied().unwrap_or(0))
}

/// Cheap necessary condition for two actions to be mergeable: the certain
/// add/del heads of each side must fit in the (certain or uncertain) add/del
/// heads of the other, counted as multisets.
pub fn broadphase_test(left: &Action, right: &Action) -> bool {
    [Section::Add, Section::Del].iter().all(|&section| {
        let s = [section];
        dominated(&left.role_count(&s, false), &right.role_count(&s, true))
            && dominated(&right.role_count(&s, false), &left.role_count(&s, true))
    })
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |section| {
            self.sorted_atoms(section)
                .iter()
                .map(|l| {
                    if l.certain {
                        l.atom.to_string()
                    } else {
                        format!("{}?", l.atom)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let params: Vec<&str> = self.parameters.iter().map(Object::name).collect();
        writeln!(f, "Action{{")?;
        writeln!(f, "  name = {},", self.name)?;
        writeln!(f, "  parameters = [{}],", params.join(", "))?;
        writeln!(f, "  precondition = [{}],", join(Section::Pre))?;
        writeln!(f, "  add list = [{}],", join(Section::Add))?;
        writeln!(f, "  del list = [{}]", join(Section::Del))?;
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjType;

    fn obj(name: &str) -> Object {
        Object::untyped(name)
    }

    fn p(head: &str, args: &[&str]) -> Atom {
        Atom::new(head, args.iter().map(|a| obj(a)).collect())
    }

    fn move_action() -> Action {
        Action::new(
            "move",
            vec![
                LabeledAtom::pre(p("at", &["?agent", "?from"])),
                LabeledAtom::pre(p("adjacent", &["?from", "?to"])),
                LabeledAtom::add(p("at", &["?agent", "?to"])),
                LabeledAtom::del(p("at", &["?agent", "?from"])),
            ],
        )
    }

    #[test]
    fn parameters_are_deduced_and_sorted() {
        let a = move_action();
        let names: Vec<&str> = a.parameters().iter().map(Object::name).collect();
        assert_eq!(names, vec!["?agent", "?from", "?to"]);
    }

    #[test]
    fn explicit_parameters_are_validated() {
        let atoms = move_action().atoms().to_vec();
        let missing = Action::with_parameters("m", vec![obj("?agent"), obj("?from")], atoms.clone());
        assert!(matches!(missing, Err(ModelError::FreeVariable { .. })));

        let constant = Action::with_parameters("m", vec![obj("robot")], vec![]);
        assert!(matches!(constant, Err(ModelError::NotAVariable { .. })));

        let extra = Action::with_parameters(
            "m",
            vec![obj("?agent"), obj("?from"), obj("?to"), obj("?spare")],
            atoms,
        );
        assert_eq!(extra.unwrap().arity(), 4);
    }

    #[test]
    fn from_transition_labels_sections() {
        let nullary = |h: &str| Atom::new(h, vec![]);
        let s1 = Context::from_partial(
            [nullary("a"), nullary("b")],
            [nullary("c"), nullary("d"), nullary("e")],
        );
        let s2 = Context::from_partial([nullary("a"), nullary("d"), nullary("f")], [nullary("c"), nullary("e")]);
        let action = Action::from_transition("t", &s1, &s2);

        let rendered = action.to_string();
        assert!(rendered.contains("precondition = [a(), b(), c()?, d()?, e()?]"), "{rendered}");
        assert!(rendered.contains("add list = [c()?, d()?, e()?, f()]"), "{rendered}");
        assert!(rendered.contains("del list = [b(), c()?, e()?]"), "{rendered}");
        assert_eq!(action.digest(), ActionDigest { certain: 4, uncertain: 8, arity: 0 });
    }

    #[test]
    fn apply_adds_and_deletes() {
        let state = Context::from_atoms([p("at", &["r", "a"]), p("adjacent", &["a", "b"])]);
        let sigma: Substitution = [("?agent", "r"), ("?from", "a"), ("?to", "b")]
            .iter()
            .map(|(k, v)| (obj(k), obj(v)))
            .collect();
        let grounded = move_action().instantiate(&sigma, false);
        let next = grounded.apply(&state).unwrap().unwrap();
        assert!(next.contains(&p("at", &["r", "b"])));
        assert!(!next.contains(&p("at", &["r", "a"])));
        assert!(next.contains(&p("adjacent", &["a", "b"])));
    }

    #[test]
    fn apply_fails_softly_when_precondition_missing() {
        let state = Context::from_atoms([p("at", &["r", "a"])]);
        let grounded = Action::new("g", vec![LabeledAtom::pre(p("adjacent", &["a", "b"]))]);
        assert_eq!(grounded.apply(&state).unwrap(), None);
    }

    #[test]
    fn apply_rejects_lifted_or_uncertain_actions() {
        let state = Context::from_atoms([p("at", &["r", "a"])]);
        assert!(matches!(move_action().apply(&state), Err(ModelError::NotGround { .. })));
        let uncertain = Action::new("u", vec![LabeledAtom::add(p("at", &["r", "b"])).uncertain()]);
        assert!(matches!(uncertain.apply(&state), Err(ModelError::UncertainAtom { .. })));
    }

    #[test]
    fn groundings_follow_the_precondition() {
        let state = Context::from_atoms([
            p("at", &["r", "a"]),
            p("adjacent", &["a", "b"]),
            p("adjacent", &["a", "c"]),
            p("adjacent", &["b", "c"]),
        ]);
        let action = move_action();
        let targets: BTreeSet<Object> = action
            .groundings(&state)
            .map(|s| s[&obj("?to")].clone())
            .collect();
        assert_eq!(targets, [obj("b"), obj("c")].into_iter().collect());
    }

    #[test]
    fn groundings_enumerate_unconstrained_parameters_by_type() {
        let block = ObjType::with_root_parent("block");
        let table = ObjType::with_root_parent("table");
        let ctx = Context::new(
            [block.object("a"), block.object("b"), table.object("t")],
            [],
            [],
        );
        let spawn = Action::new("spawn", vec![LabeledAtom::add(Atom::new("clear", vec![block.object("?x")]))]);
        assert_eq!(spawn.groundings(&ctx).count(), 2);
    }

    #[test]
    fn can_produce_transition_checks_exact_result() {
        let pre = Context::from_atoms([p("at", &["r", "a"]), p("adjacent", &["a", "b"])]);
        let good = Context::from_atoms([p("at", &["r", "b"]), p("adjacent", &["a", "b"])]);
        let bad = Context::from_atoms([p("at", &["r", "a"]), p("at", &["r", "b"]), p("adjacent", &["a", "b"])]);
        assert!(move_action().can_produce_transition(&pre, &good));
        assert!(!move_action().can_produce_transition(&pre, &bad));
    }

    #[test]
    fn can_produce_transition_ignores_uncertain_atoms() {
        let pre = Context::from_atoms([p("at", &["r", "a"]), p("adjacent", &["a", "b"])]);
        let post = Context::from_atoms([p("at", &["r", "b"]), p("adjacent", &["a", "b"])]);
        let mut atoms = move_action().atoms().to_vec();
        atoms.push(LabeledAtom::pre(p("sunny", &["?to"])).uncertain());
        let action = Action::new("move", atoms);
        assert!(action.can_produce_transition(&pre, &post));
    }

    #[test]
    fn broadphase_compares_effect_multisets() {
        let a = Action::new(
            "a",
            vec![
                LabeledAtom::add(p("p", &["x"])),
                LabeledAtom::add(p("p", &["y"])).uncertain(),
                LabeledAtom::del(p("p", &["s"])),
                LabeledAtom::del(p("p", &["t"])),
                LabeledAtom::del(p("p", &["u"])).uncertain(),
            ],
        );
        let b = Action::new(
            "b",
            vec![
                LabeledAtom::add(p("p", &["x"])),
                LabeledAtom::add(p("p", &["y"])),
                LabeledAtom::del(p("p", &["t"])).uncertain(),
                LabeledAtom::del(p("p", &["u"])).uncertain(),
            ],
        );
        let c = Action::new(
            "c",
            vec![
                LabeledAtom::add(p("p", &["x"])),
                LabeledAtom::add(p("p", &["y"])),
                LabeledAtom::del(p("p", &["u"])).uncertain(),
            ],
        );
        assert!(broadphase_test(&a, &b));
        assert!(!broadphase_test(&a, &c));
        assert!(broadphase_test(&b, &c));
    }

    #[test]
    fn certain_fragment_drops_orphaned_parameters() {
        let action = Action::new(
            "a",
            vec![
                LabeledAtom::add(p("p", &["?x"])),
                LabeledAtom::pre(p("q", &["?y"])).uncertain(),
            ],
        );
        let fragment = action.certain_fragment();
        assert_eq!(fragment.parameters(), &[obj("?x")]);
        assert!(fragment.is_certain());
    }
}
