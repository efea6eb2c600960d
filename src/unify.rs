//! Matching lifted atoms against ground facts.
//!
//! [`match_unify`] extends a substitution so that one pattern atom equals one
//! ground reference atom. [`GoalMatch`] is a depth-first backtracking search that
//! lazily enumerates every substitution under which a list of goal atoms all
//! match some fact. [`ParameterProduct`] enumerates type-compatible constants for
//! parameters that no goal atom constrains.

use std::collections::HashMap;

use crate::model::{Atom, Object, Substitution};

/// Find the extension of `sigma` that makes `pattern` equal to the ground
/// `reference` atom, or `None` if the heads/arities differ, a variable would
/// need two different values, a constant disagrees, or a type does not fit.
pub fn match_unify(reference: &Atom, pattern: &Atom, sigma: &Substitution) -> Option<Substitution> {
    if reference.head != pattern.head || reference.arity() != pattern.arity() {
        return None;
    }
    let mut extended = sigma.clone();
    for (ref_obj, obj) in reference.args.iter().zip(&pattern.args) {
        let obj = extended.get(obj).cloned().unwrap_or_else(|| obj.clone());
        if !ref_obj.is_compatible(&obj) {
            return None;
        }
        if obj.is_variable() {
            extended.insert(obj, ref_obj.clone());
        } else if &obj != ref_obj {
            return None;
        }
    }
    Some(extended)
}

/// Facts grouped by predicate head, so each goal atom only scans candidates
/// that could possibly match.
#[derive(Debug, Clone, Default)]
pub struct FactIndex<'a> {
    by_head: HashMap<&'a str, Vec<&'a Atom>>,
}

impl<'a> FactIndex<'a> {
    pub fn new(facts: impl IntoIterator<Item = &'a Atom>) -> Self {
        let mut by_head: HashMap<&'a str, Vec<&'a Atom>> = HashMap::new();
        for fact in facts {
            by_head.entry(fact.head.as_str()).or_default().push(fact);
        }
        Self { by_head }
    }

    pub fn candidates(&self, head: &str) -> &[&'a Atom] {
        self.by_head.get(head).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, atom: &Atom) -> bool {
        self.candidates(&atom.head).iter().any(|f| *f == atom)
    }
}

/// Lazy enumeration of the substitutions under which every goal atom, in
/// order, matches a fact.
///
/// Uses an explicit `(position, substitution)` stack, so the search depth is
/// not bounded by the call stack. Cloning the iterator (or calling
/// [`GoalMatch::restart`]) restarts the enumeration from scratch.
#[derive(Debug, Clone)]
pub struct GoalMatch<'a> {
    index: FactIndex<'a>,
    goals: Vec<Atom>,
    initial: Substitution,
    stack: Vec<(usize, Substitution)>,
}

impl<'a> GoalMatch<'a> {
    pub fn new(facts: impl IntoIterator<Item = &'a Atom>, goals: Vec<Atom>) -> Self {
        Self::with_substitution(facts, goals, Substitution::new())
    }

    /// Start the search from a partial substitution.
    pub fn with_substitution(
        facts: impl IntoIterator<Item = &'a Atom>,
        goals: Vec<Atom>,
        initial: Substitution,
    ) -> Self {
        let stack = vec![(0, initial.clone())];
        Self {
            index: FactIndex::new(facts),
            goals,
            initial,
            stack,
        }
    }

    /// Rewind to the first substitution.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push((0, self.initial.clone()));
    }
}

impl Iterator for GoalMatch<'_> {
    type Item = Substitution;

    fn next(&mut self) -> Option<Substitution> {
        while let Some((idx, sigma)) = self.stack.pop() {
            if idx == self.goals.len() {
                return Some(sigma);
            }
            let goal = self.goals[idx].replace(&sigma);
            if goal.is_lifted() {
                // Pushed in reverse so facts are explored in index order.
                for fact in self.index.candidates(&goal.head).iter().rev() {
                    if let Some(extended) = match_unify(fact, &goal, &sigma) {
                        self.stack.push((idx + 1, extended));
                    }
                }
            } else if self.index.contains(&goal) {
                self.stack.push((idx + 1, sigma));
            }
        }
        None
    }
}

/// Convenience constructor for [`GoalMatch`].
pub fn goal_match<'a>(facts: impl IntoIterator<Item = &'a Atom>, goals: &[Atom]) -> GoalMatch<'a> {
    GoalMatch::new(facts, goals.to_vec())
}

/// Cross product of candidate objects for the parameters a base substitution
/// leaves unbound.
///
/// Candidates are filtered per parameter position by type before the
/// enumeration starts, so incompatible combinations are never generated.
#[derive(Debug, Clone)]
pub struct ParameterProduct {
    parameters: Vec<Object>,
    candidates: Vec<Vec<Object>>,
    stack: Vec<(usize, Substitution)>,
}

impl ParameterProduct {
    pub fn new<'o>(
        parameters: &[Object],
        objects: impl IntoIterator<Item = &'o Object> + Clone,
        base: Substitution,
    ) -> Self {
        let candidates: Vec<Vec<Object>> = parameters
            .iter()
            .map(|param| {
                if base.contains_key(param) {
                    Vec::new()
                } else {
                    objects
                        .clone()
                        .into_iter()
                        .filter(|o| o.is_constant() && o.is_compatible(param))
                        .cloned()
                        .collect()
                }
            })
            .collect();
        Self {
            parameters: parameters.to_vec(),
            candidates,
            stack: vec![(0, base)],
        }
    }
}

impl Iterator for ParameterProduct {
    type Item = Substitution;

    fn next(&mut self) -> Option<Substitution> {
        while let Some((idx, sigma)) = self.stack.pop() {
            if idx == self.parameters.len() {
                return Some(sigma);
            }
            let param = &self.parameters[idx];
            if sigma.contains_key(param) {
                self.stack.push((idx + 1, sigma));
                continue;
            }
            for obj in self.candidates[idx].iter().rev() {
                let mut extended = sigma.clone();
                extended.insert(param.clone(), obj.clone());
                self.stack.push((idx + 1, extended));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjType;

    fn obj(name: &str) -> Object {
        Object::untyped(name)
    }

    fn on(a: &str, b: &str) -> Atom {
        Atom::new("on", vec![obj(a), obj(b)])
    }

    fn sub(pairs: &[(&str, &str)]) -> Substitution {
        pairs.iter().map(|(k, v)| (obj(k), obj(v))).collect()
    }

    #[test]
    fn match_unify_binds_variables() {
        assert_eq!(
            match_unify(&on("a", "b"), &on("?x", "?y"), &Substitution::new()),
            Some(sub(&[("?x", "a"), ("?y", "b")]))
        );
    }

    #[test]
    fn match_unify_rejects_conflicting_binding() {
        assert_eq!(match_unify(&on("a", "b"), &on("?x", "?x"), &Substitution::new()), None);
    }

    #[test]
    fn match_unify_keeps_unrelated_bindings() {
        assert_eq!(
            match_unify(&on("a", "b"), &on("?x", "?y"), &sub(&[("?z", "c")])),
            Some(sub(&[("?x", "a"), ("?y", "b"), ("?z", "c")]))
        );
    }

    #[test]
    fn match_unify_nullary_and_head_mismatch() {
        let dummy = Atom::new("dummy", vec![]);
        assert_eq!(match_unify(&dummy, &dummy, &Substitution::new()), Some(Substitution::new()));
        assert_eq!(
            match_unify(&dummy, &Atom::new("ducky", vec![]), &Substitution::new()),
            None
        );
    }

    #[test]
    fn match_unify_respects_existing_binding_and_constants() {
        assert_eq!(match_unify(&on("a", "b"), &on("?x", "c"), &Substitution::new()), None);
        assert_eq!(match_unify(&on("a", "b"), &on("?x", "b"), &sub(&[("?x", "c")])), None);
    }

    #[test]
    fn match_unify_checks_types() {
        let loc = ObjType::with_root_parent("location");
        let agent = ObjType::with_root_parent("agent");
        let reference = Atom::new("at", vec![agent.object("r")]);
        assert!(match_unify(&reference, &Atom::new("at", vec![agent.object("?a")]), &Substitution::new()).is_some());
        assert!(match_unify(&reference, &Atom::new("at", vec![loc.object("?a")]), &Substitution::new()).is_none());
        assert!(match_unify(&reference, &Atom::new("at", vec![obj("?a")]), &Substitution::new()).is_some());
    }

    #[test]
    fn goal_match_enumerates_all_joins() {
        let facts = vec![on("a", "b"), on("b", "c"), on("c", "d")];
        let goals = vec![on("?x", "?y"), on("?y", "?z")];
        let results: Vec<Substitution> = goal_match(&facts, &goals).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], sub(&[("?x", "a"), ("?y", "b"), ("?z", "c")]));
        assert_eq!(results[1], sub(&[("?x", "b"), ("?y", "c"), ("?z", "d")]));
    }

    #[test]
    fn goal_match_checks_ground_goals() {
        let facts = vec![on("a", "b")];
        assert_eq!(goal_match(&facts, &[on("a", "b")]).count(), 1);
        assert_eq!(goal_match(&facts, &[on("b", "a")]).count(), 0);
        assert_eq!(goal_match(&facts, &[]).count(), 1);
    }

    #[test]
    fn goal_match_is_restartable() {
        let facts = vec![on("a", "b"), on("b", "c")];
        let goals = vec![on("?x", "?y")];
        let mut search = goal_match(&facts, &goals);
        let first: Vec<_> = search.by_ref().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(search.next(), None);
        search.restart();
        assert_eq!(search.count(), 2);
    }

    #[test]
    fn parameter_product_filters_by_type() {
        let loc = ObjType::with_root_parent("location");
        let agent = ObjType::with_root_parent("agent");
        let objects = vec![loc.object("a"), loc.object("b"), agent.object("r")];
        let params = vec![agent.object("?who"), loc.object("?where")];

        let all: Vec<Substitution> = ParameterProduct::new(&params, &objects, Substitution::new()).collect();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| s[&params[0]] == agent.object("r")));

        let base: Substitution = [(params[1].clone(), loc.object("b"))].into_iter().collect();
        let bound: Vec<Substitution> = ParameterProduct::new(&params, &objects, base).collect();
        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0][&params[1]], loc.object("b"));
    }

    #[test]
    fn parameter_product_without_candidates_is_empty() {
        let agent = ObjType::with_root_parent("agent");
        let params = vec![agent.object("?who")];
        let objects: Vec<Object> = vec![obj("a")];
        assert_eq!(ParameterProduct::new(&params, &objects, Substitution::new()).count(), 0);
    }
}
