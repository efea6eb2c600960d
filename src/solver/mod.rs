//! Weighted MaxSAT adapter.
//!
//! The cluster encoder talks to its optimizer only through [`MaxSatSolver`]:
//! declare boolean variables, add hard clauses and at-most-one constraints, add
//! weighted soft literals, and solve under an optional timeout. Two backends
//! implement it:
//!
//! - [`native::NativeSolver`]: built-in branch-and-bound search (always available)
//! - [`z3::Z3Solver`]: Z3's `Optimize` engine (`z3` cargo feature)

pub mod native;
#[cfg(feature = "z3")]
pub mod z3;

use std::fmt;
use std::ops::Not;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};

/// A boolean variable, numbered from 0 in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

impl Var {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn pos(self) -> Lit {
        Lit {
            var: self,
            positive: true,
        }
    }

    pub fn neg(self) -> Lit {
        Lit {
            var: self,
            positive: false,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lit {
    pub var: Var,
    pub positive: bool,
}

impl Lit {
    /// Truth value of the literal when its variable takes `value`.
    pub fn eval(self, value: bool) -> bool {
        value == self.positive
    }
}

impl Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit {
            var: self.var,
            positive: !self.positive,
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}", self.var)
        } else {
            write!(f, "-{}", self.var)
        }
    }
}

/// How "at most one of these literals is true" is handed to the backend.
///
/// All encodings are functionally equivalent; they only differ in how well a
/// given backend handles them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmoEncoding {
    /// One binary clause per pair of literals.
    #[default]
    Quadratic,
    /// A single pseudo-boolean constraint `sum(l) <= 1`.
    PseudoBoolean,
    /// An integer sum over if-then-else terms.
    Arithmetic,
}

/// Which optimizer backs the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    #[default]
    Native,
    Z3,
}

impl fmt::Display for SolverBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverBackend::Native => write!(f, "native"),
            SolverBackend::Z3 => write!(f, "z3"),
        }
    }
}

/// An optimal assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    values: Vec<bool>,
    cost: u64,
}

impl Model {
    pub fn new(values: Vec<bool>, cost: u64) -> Self {
        Self { values, cost }
    }

    pub fn value(&self, var: Var) -> bool {
        self.values.get(var.index()).copied().unwrap_or(false)
    }

    pub fn lit_value(&self, lit: Lit) -> bool {
        lit.eval(self.value(lit.var))
    }

    /// Total weight of the violated soft literals.
    pub fn cost(&self) -> u64 {
        self.cost
    }
}

/// Result of [`MaxSatSolver::solve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    Optimal(Model),
    Unsatisfiable,
    TimedOut,
}

/// Counters reported by a backend after solving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverStats {
    pub variables: usize,
    pub hard_constraints: usize,
    pub soft_constraints: usize,
    /// Search nodes explored (native backend only).
    pub nodes: u64,
    pub conflicts: u64,
}

/// The black-box weighted MaxSAT interface used by the cluster encoder.
pub trait MaxSatSolver {
    fn new_var(&mut self) -> Var;

    fn num_vars(&self) -> usize;

    /// Hard constraint: at least one literal is true. An empty clause makes the
    /// problem unsatisfiable.
    fn add_clause(&mut self, clause: &[Lit]) -> SolverResult<()>;

    /// Hard constraint: at most one literal is true.
    fn add_at_most_one(&mut self, lits: &[Lit]) -> SolverResult<()>;

    /// Soft constraint: pay `weight` if `lit` is false in the model.
    fn add_soft(&mut self, lit: Lit, weight: u64) -> SolverResult<()>;

    /// Minimize the total weight of violated soft constraints subject to all
    /// hard constraints.
    fn solve(&mut self, timeout: Option<Duration>) -> SolverResult<SolveOutcome>;

    fn stats(&self) -> SolverStats;

    /// Check that every literal refers to a declared variable.
    fn check_lits(&self, lits: &[Lit]) -> SolverResult<()> {
        match lits.iter().find(|l| l.var.index() >= self.num_vars()) {
            Some(lit) => Err(SolverError::UndeclaredVariable { var: lit.var.0 }),
            None => Ok(()),
        }
    }

    /// `target <=> AND(lits)`. With no operands `target` is forced true.
    fn add_equiv_and(&mut self, target: Lit, lits: &[Lit]) -> SolverResult<()> {
        for &lit in lits {
            self.add_clause(&[!target, lit])?;
        }
        let mut clause: Vec<Lit> = lits.iter().map(|&l| !l).collect();
        clause.push(target);
        self.add_clause(&clause)
    }

    /// `target <=> OR(lits)`. With no operands `target` is forced false.
    fn add_equiv_or(&mut self, target: Lit, lits: &[Lit]) -> SolverResult<()> {
        for &lit in lits {
            self.add_clause(&[target, !lit])?;
        }
        let mut clause: Vec<Lit> = lits.to_vec();
        clause.push(!target);
        self.add_clause(&clause)
    }
}

/// Pairwise expansion of an at-most-one constraint.
pub fn quadratic_at_most_one<S: MaxSatSolver + ?Sized>(solver: &mut S, lits: &[Lit]) -> SolverResult<()> {
    for (i, &u) in lits.iter().enumerate() {
        for &v in &lits[i + 1..] {
            solver.add_clause(&[!u, !v])?;
        }
    }
    Ok(())
}

/// Instantiate a backend.
pub fn make_solver(backend: SolverBackend, encoding: AmoEncoding) -> SolverResult<Box<dyn MaxSatSolver>> {
    match backend {
        SolverBackend::Native => Ok(Box::new(native::NativeSolver::new(encoding))),
        #[cfg(feature = "z3")]
        SolverBackend::Z3 => Ok(Box::new(z3::Z3Solver::new(encoding))),
        #[cfg(not(feature = "z3"))]
        SolverBackend::Z3 => Err(SolverError::BackendUnavailable {
            backend: backend.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_negation_and_eval() {
        let v = Var(3);
        assert!(v.pos().eval(true));
        assert!(!v.neg().eval(true));
        assert_eq!(!v.pos(), v.neg());
        assert_eq!(v.neg().to_string(), "-v3");
    }

    #[test]
    fn encodings_deserialize_from_snake_case() {
        let enc: AmoEncoding = serde_json::from_str("\"pseudo_boolean\"").unwrap();
        assert_eq!(enc, AmoEncoding::PseudoBoolean);
        let backend: SolverBackend = serde_json::from_str("\"z3\"").unwrap();
        assert_eq!(backend, SolverBackend::Z3);
    }

    #[cfg(not(feature = "z3"))]
    #[test]
    fn z3_backend_requires_feature() {
        let err = make_solver(SolverBackend::Z3, AmoEncoding::Quadratic).err();
        assert!(matches!(err, Some(SolverError::BackendUnavailable { .. })));
    }
}
