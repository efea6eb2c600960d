//! Built-in weighted MaxSAT backend.
//!
//! Depth-first branch and bound over the variables in declaration order. Every
//! decision is followed by unit propagation over clauses and native
//! at-most-one constraints; the accumulated weight of violated soft literals is
//! the lower bound, and any node whose bound reaches the best known cost is
//! pruned. The search keeps its own decision stack, so problem size never
//! touches the call stack.
//!
//! Declaring the "structural" variables first (the encoder declares object
//! correspondences before atom matches) lets propagation derive most of the
//! remaining ones, which keeps the tree small.

use std::time::{Duration, Instant};

use crate::error::SolverResult;

use super::{quadratic_at_most_one, AmoEncoding, Lit, MaxSatSolver, Model, SolveOutcome, SolverStats, Var};

/// How many nodes are explored between two deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

#[derive(Debug, Clone)]
enum Constraint {
    Clause(Vec<Lit>),
    AtMostOne(Vec<Lit>),
}

/// Branch-and-bound MaxSAT solver.
#[derive(Debug, Clone)]
pub struct NativeSolver {
    encoding: AmoEncoding,
    constraints: Vec<Constraint>,
    /// Constraint indices per variable.
    occurs: Vec<Vec<usize>>,
    soft: Vec<(Lit, u64)>,
    /// Soft constraint indices per variable.
    soft_by_var: Vec<Vec<usize>>,
    has_empty_clause: bool,
    stats: SolverStats,
}

impl NativeSolver {
    pub fn new(encoding: AmoEncoding) -> Self {
        Self {
            encoding,
            constraints: Vec::new(),
            occurs: Vec::new(),
            soft: Vec::new(),
            soft_by_var: Vec::new(),
            has_empty_clause: false,
            stats: SolverStats::default(),
        }
    }

    fn push_constraint(&mut self, constraint: Constraint) {
        let idx = self.constraints.len();
        let lits = match &constraint {
            Constraint::Clause(lits) | Constraint::AtMostOne(lits) => lits,
        };
        let mut vars: Vec<usize> = lits.iter().map(|l| l.var.index()).collect();
        vars.sort_unstable();
        vars.dedup();
        for v in vars {
            self.occurs[v].push(idx);
        }
        self.constraints.push(constraint);
        self.stats.hard_constraints += 1;
    }
}

impl Default for NativeSolver {
    fn default() -> Self {
        Self::new(AmoEncoding::default())
    }
}

impl MaxSatSolver for NativeSolver {
    fn new_var(&mut self) -> Var {
        let var = Var(self.occurs.len() as u32);
        self.occurs.push(Vec::new());
        self.soft_by_var.push(Vec::new());
        self.stats.variables += 1;
        var
    }

    fn num_vars(&self) -> usize {
        self.occurs.len()
    }

    fn add_clause(&mut self, clause: &[Lit]) -> SolverResult<()> {
        self.check_lits(clause)?;
        if clause.is_empty() {
            self.has_empty_clause = true;
            self.stats.hard_constraints += 1;
            return Ok(());
        }
        self.push_constraint(Constraint::Clause(clause.to_vec()));
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
                self.push_constraint(Constraint::AtMostOne(lits.to_vec()));
                Ok(())
            }
        }
    }

    fn add_soft(&mut self, lit: Lit, weight: u64) -> SolverResult<()> {
        self.check_lits(&[lit])?;
        if weight == 0 {
            return Ok(());
        }
        self.soft_by_var[lit.var.index()].push(self.soft.len());
        self.soft.push((lit, weight));
        self.stats.soft_constraints += 1;
        Ok(())
    }

    fn solve(&mut self, timeout: Option<Duration>) -> SolverResult<SolveOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        if self.has_empty_clause {
            return Ok(SolveOutcome::Unsatisfiable);
        }
        let mut search = Search::new(self);
        let outcome = search.run(deadline);
        let (nodes, conflicts) = (search.nodes, search.conflicts);
        self.stats.nodes = nodes;
        self.stats.conflicts = conflicts;
        tracing::trace!(nodes, conflicts, "native MaxSAT search finished");
        Ok(outcome)
    }

    fn stats(&self) -> SolverStats {
        self.stats
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    trail_len: usize,
    var: Var,
    value: bool,
    flipped: bool,
}

struct Search<'a> {
    solver: &'a NativeSolver,
    assignment: Vec<Option<bool>>,
    trail: Vec<Var>,
    /// Next trail position to propagate.
    head: usize,
    cost: u64,
    frames: Vec<Frame>,
    best: Option<(Vec<bool>, u64)>,
    nodes: u64,
    conflicts: u64,
}

impl<'a> Search<'a> {
    fn new(solver: &'a NativeSolver) -> Self {
        Self {
            solver,
            assignment: vec![None; solver.num_vars()],
            trail: Vec::new(),
            head: 0,
            cost: 0,
            frames: Vec::new(),
            best: None,
            nodes: 0,
            conflicts: 0,
        }
    }

    fn value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.var.index()].map(|v| lit.eval(v))
    }

    fn assign(&mut self, lit: Lit) {
        let solver = self.solver;
        let value = lit.positive;
        self.assignment[lit.var.index()] = Some(value);
        self.trail.push(lit.var);
        for &si in &solver.soft_by_var[lit.var.index()] {
            let (soft, weight) = solver.soft[si];
            if !soft.eval(value) {
                self.cost += weight;
            }
        }
    }

    fn undo_to(&mut self, len: usize) {
        let solver = self.solver;
        while self.trail.len() > len {
            let Some(var) = self.trail.pop() else { break };
            if let Some(value) = self.assignment[var.index()].take() {
                for &si in &solver.soft_by_var[var.index()] {
                    let (soft, weight) = solver.soft[si];
                    if !soft.eval(value) {
                        self.cost -= weight;
                    }
                }
            }
        }
        self.head = self.head.min(len);
    }

    /// Unit propagation from the unpropagated part of the trail. Returns
    /// `false` on conflict.
    fn propagate(&mut self) -> bool {
        let solver = self.solver;
        while self.head < self.trail.len() {
            let var = self.trail[self.head];
            self.head += 1;
            for &ci in &solver.occurs[var.index()] {
                match &solver.constraints[ci] {
                    Constraint::Clause(lits) => {
                        let mut open = None;
                        let mut open_count = 0;
                        let mut satisfied = false;
                        for &lit in lits {
                            match self.value(lit) {
                                Some(true) => {
                                    satisfied = true;
                                    break;
                                }
                                Some(false) => {}
                                None => {
                                    open_count += 1;
                                    open = Some(lit);
                                }
                            }
                        }
                        if satisfied {
                            continue;
                        }
                        match (open_count, open) {
                            (0, _) => return false,
                            (1, Some(lit)) => self.assign(lit),
                            _ => {}
                        }
                    }
                    Constraint::AtMostOne(lits) => {
                        let true_count = lits.iter().filter(|&&l| self.value(l) == Some(true)).count();
                        if true_count > 1 {
                            return false;
                        }
                        if true_count == 1 {
                            for &lit in lits {
                                if self.value(lit).is_none() {
                                    self.assign(!lit);
                                }
                            }
                        }
                    }
                }
            }
        }
        true
    }

    /// Unit clauses are the only constraints that propagate before any
    /// assignment has been made.
    fn propagate_root(&mut self) -> bool {
        let solver = self.solver;
        for constraint in &solver.constraints {
            if let Constraint::Clause(lits) = constraint
                && let [lit] = lits.as_slice()
            {
                match self.value(*lit) {
                    Some(false) => return false,
                    Some(true) => {}
                    None => self.assign(*lit),
                }
            }
        }
        self.propagate()
    }

    fn pick_var(&self) -> Option<Var> {
        // Decisions are taken in increasing order and propagation only ever
        // assigns, so everything before the last decision is assigned.
        let start = self.frames.last().map_or(0, |f| f.var.index() + 1);
        (start..self.assignment.len())
            .find(|&i| self.assignment[i].is_none())
            .map(|i| Var(i as u32))
    }

    /// The polarity satisfying the heavier soft constraints; true otherwise.
    fn preferred_value(&self, var: Var) -> bool {
        let (mut pos, mut neg) = (0u64, 0u64);
        for &si in &self.solver.soft_by_var[var.index()] {
            let (lit, weight) = self.solver.soft[si];
            if lit.positive {
                pos += weight;
            } else {
                neg += weight;
            }
        }
        pos >= neg
    }

    fn best_cost(&self) -> u64 {
        self.best.as_ref().map_or(u64::MAX, |(_, c)| *c)
    }

    fn run(&mut self, deadline: Option<Instant>) -> SolveOutcome {
        let mut conflict = !self.propagate_root();
        loop {
            if let Some(deadline) = deadline
                && self.nodes % DEADLINE_CHECK_INTERVAL == 0
                && Instant::now() >= deadline
            {
                return SolveOutcome::TimedOut;
            }
            self.nodes += 1;

            if conflict {
                self.conflicts += 1;
            } else if self.cost < self.best_cost() {
                match self.pick_var() {
                    Some(var) => {
                        let value = self.preferred_value(var);
                        self.frames.push(Frame {
                            trail_len: self.trail.len(),
                            var,
                            value,
                            flipped: false,
                        });
                        self.assign(Lit { var, positive: value });
                        conflict = !self.propagate();
                        continue;
                    }
                    None => {
                        let values = self.assignment.iter().map(|v| v.unwrap_or(false)).collect();
                        self.best = Some((values, self.cost));
                        if self.cost == 0 {
                            break;
                        }
                    }
                }
            }

            // Backtrack to the most recent decision with an untried branch.
            let mut resumed = false;
            while let Some(frame) = self.frames.pop() {
                self.undo_to(frame.trail_len);
                if !frame.flipped {
                    let value = !frame.value;
                    self.frames.push(Frame {
                        value,
                        flipped: true,
                        ..frame
                    });
                    self.assign(Lit {
                        var: frame.var,
                        positive: value,
                    });
                    conflict = !self.propagate();
                    resumed = true;
                    break;
                }
            }
            if !resumed {
                break;
            }
        }
        match self.best.take() {
            Some((values, cost)) => SolveOutcome::Optimal(Model::new(values, cost)),
            None => SolveOutcome::Unsatisfiable,
        }
    }
}
