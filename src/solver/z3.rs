//! Z3 `Optimize` backend (`z3` feature).
//!
//! Constraints are buffered as plain literals and translated into a fresh Z3
//! context on every [`MaxSatSolver::solve`] call, so the solver value carries no
//! context lifetime.

use std::time::Duration;

use z3::ast::{Ast, Bool, Int};
use z3::{Config, Context, Optimize, Params, SatResult};

use crate::error::{SolverError, SolverResult};

use super::{quadratic_at_most_one, AmoEncoding, Lit, MaxSatSolver, Model, SolveOutcome, SolverStats, Var};

/// Weighted MaxSAT through Z3's optimization engine.
#[derive(Debug, Clone, Default)]
pub struct Z3Solver {
    encoding: AmoEncoding,
    num_vars: usize,
    clauses: Vec<Vec<Lit>>,
    at_most_one: Vec<Vec<Lit>>,
    soft: Vec<(Lit, u64)>,
    stats: SolverStats,
}

impl Z3Solver {
    pub fn new(encoding: AmoEncoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }
}

impl MaxSatSolver for Z3Solver {
    fn new_var(&mut self) -> Var {
        let var = Var(self.num_vars as u32);
        self.num_vars += 1;
        self.stats.variables += 1;
        var
    }

    fn num_vars(&self) -> usize {
        self.num_vars
    }

    fn add_clause(&mut self, clause: &[Lit]) -> SolverResult<()> {
        self.check_lits(clause)?;
        self.clauses.push(clause.to_vec());
        self.stats.hard_constraints += 1;
        Ok(())
    }

    fn add_at_most_one(&mut self, lits: &[Lit]) -> SolverResult<()> {
        self.check_lits(lits)?;
        if lits.len() < 2 {
            return Ok(());
        }
        match self.encoding {
            AmoEncoding::Quadratic => quadratic_at_most_one(self, lits),
            AmoEncoding::PseudoBoolean | AmoEncoding::Arithmetic => {
                self.at_most_one.push(lits.to_vec());
                self.stats.hard_constraints += 1;
                Ok(())
            }
        }
    }

    fn add_soft(&mut self, lit: Lit, weight: u64) -> SolverResult<()> {
        self.check_lits(&[lit])?;
        self.soft.push((lit, weight));
        self.stats.soft_constraints += 1;
        Ok(())
    }

    fn solve(&mut self, timeout: Option<Duration>) -> SolverResult<SolveOutcome> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let opt = Optimize::new(&ctx);
        if let Some(timeout) = timeout {
            let mut params = Params::new(&ctx);
            params.set_u32("timeout", u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
            opt.set_params(&params);
        }

        let vars: Vec<Bool> = (0..self.num_vars)
            .map(|i| Bool::new_const(&ctx, format!("v{i}")))
            .collect();
        let term = |lit: Lit| {
            let v = &vars[lit.var.index()];
            if lit.positive { v.clone() } else { v.not() }
        };

        for clause in &self.clauses {
            let terms: Vec<Bool> = clause.iter().map(|&l| term(l)).collect();
            let refs: Vec<&Bool> = terms.iter().collect();
            opt.assert(&Bool::or(&ctx, &refs));
        }
        for group in &self.at_most_one {
            let terms: Vec<Bool> = group.iter().map(|&l| term(l)).collect();
            let constraint = match self.encoding {
                AmoEncoding::Arithmetic => {
                    let one = Int::from_i64(&ctx, 1);
                    let zero = Int::from_i64(&ctx, 0);
                    let summands: Vec<Int> = terms.iter().map(|t| t.ite(&one, &zero)).collect();
                    let refs: Vec<&Int> = summands.iter().collect();
                    Int::add(&ctx, &refs).le(&one)
                }
                _ => {
                    let weighted: Vec<(&Bool, i32)> = terms.iter().map(|t| (t, 1)).collect();
                    Bool::pb_le(&ctx, &weighted, 1)
                }
            };
            opt.assert(&constraint);
        }
        for &(lit, weight) in &self.soft {
            opt.assert_soft(&term(lit), weight, None);
        }

        match opt.check(&[]) {
            SatResult::Unsat => Ok(SolveOutcome::Unsatisfiable),
            SatResult::Unknown => Ok(SolveOutcome::TimedOut),
            SatResult::Sat => {
                let model = opt.get_model().ok_or_else(|| SolverError::Backend {
                    message: "z3 reported sat but produced no model".into(),
                })?;
                let values: Vec<bool> = vars
                    .iter()
                    .map(|v| model.eval(v, true).and_then(|b| b.as_bool()).unwrap_or(false))
                    .collect();
                let cost = self
                    .soft
                    .iter()
                    .filter(|(lit, _)| !lit.eval(values[lit.var.index()]))
                    .map(|(_, w)| w)
                    .sum();
                Ok(SolveOutcome::Optimal(Model::new(values, cost)))
            }
        }
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agrees_with_native_on_small_problem() {
        for encoding in [AmoEncoding::Quadratic, AmoEncoding::PseudoBoolean, AmoEncoding::Arithmetic] {
            let mut s = Z3Solver::new(encoding);
            let vars: Vec<Var> = (0..3).map(|_| s.new_var()).collect();
            let lits: Vec<Lit> = vars.iter().map(|v| v.pos()).collect();
            s.add_at_most_one(&lits).unwrap();
            s.add_soft(lits[0], 2).unwrap();
            s.add_soft(lits[1], 5).unwrap();
            s.add_soft(lits[2], 1).unwrap();
            match s.solve(None).unwrap() {
                SolveOutcome::Optimal(model) => {
                    assert_eq!(model.cost(), 3);
                    assert!(model.value(vars[1]));
                }
                other => panic!("{other:?}"),
            }
        }
    }
}
