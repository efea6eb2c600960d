//! The cluster encoder: merging two actions into one more general schema.
//!
//! Merging is posed as weighted MaxSAT over three families of variables:
//!
//! - `x[o_l, o_r]`: object `o_l` of the left action is identified with `o_r`
//! - `y[i, j]`: left atom `i` is merged with right atom `j`
//! - `z[side, i]`: atom `i` of `side` survives in the merged action
//!
//! Hard constraints make the object correspondence a partial injection (H1),
//! tie atom matches to argument matches (H2) and atom survival to atom matches
//! (H3), and forbid dropping certain effects (H4). Soft constraints discourage
//! identifying distinct constants (S1, weight 1) and reward keeping
//! preconditions and uncertain atoms (S2, weight `1 + min(|O_l|, |O_r|)`, which
//! outweighs every possible S1 penalty).
//!
//! The outcome is explicit: [`ClusterOutcome::Merged`], [`ClusterOutcome::NoMerge`]
//! or [`ClusterOutcome::TimedOut`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::action::{broadphase_test, Action};
use crate::error::EncodeResult;
use crate::learner::operation::Stopwatch;
use crate::model::{LabeledAtom, ObjType, Object, Section, Substitution};
use crate::solver::{make_solver, AmoEncoding, Lit, SolveOutcome, SolverBackend, SolverStats, Var};

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Source of fresh action names and variable names.
///
/// Owned by a learner instance, so independent learners never share state.
/// Atomic counters make it safe to share one allocator between threads that
/// run independent encoder calls. Counters are zero-padded so names sort in
/// allocation order.
#[derive(Debug, Default)]
pub struct NameAllocator {
    next_variable: AtomicU64,
    next_action: AtomicU64,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A variable `?v<n>` of the given type.
    pub fn fresh_variable(&self, objtype: &ObjType) -> Object {
        let n = self.next_variable.fetch_add(1, Ordering::Relaxed);
        objtype.object(format!("?v{n:08}"))
    }

    /// An action name `action-<n>`.
    pub fn fresh_action_name(&self) -> String {
        let n = self.next_action.fetch_add(1, Ordering::Relaxed);
        format!("action-{n:08}")
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why two actions could not be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMergeReason {
    /// Rejected by [`broadphase_test`] before encoding.
    Broadphase,
    /// The hard constraints admit no model.
    Unsatisfiable,
}

/// Provenance and measurements of a merge.
#[derive(Debug, Clone)]
pub struct MergeInfo {
    pub distance: f64,
    pub normalized_distance: f64,
    /// Objective value of the optimal model (total violated soft weight).
    pub objective: u64,
    /// The S2 weight, `1 + min(|O_l|, |O_r|)`.
    pub preserve_weight: u64,
    /// Object correspondence, left to right. A partial injection.
    pub tau: Substitution,
    /// Left object to merged object.
    pub sigma_left: Substitution,
    /// Right object to merged object.
    pub sigma_right: Substitution,
    pub left_parent: String,
    pub right_parent: String,
    pub solver: SolverStats,
    pub elapsed_wall_ms: u64,
    pub elapsed_cpu_ms: u64,
}

/// An action together with the merge that produced it. A result without
/// [`MergeInfo`] is a leaf: an action observed directly from one transition.
#[derive(Debug, Clone)]
pub struct ClusterResult {
    pub action: Action,
    pub info: Option<MergeInfo>,
}

impl ClusterResult {
    pub fn leaf(action: Action) -> Self {
        Self { action, info: None }
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    pub fn is_leaf(&self) -> bool {
        self.info.is_none()
    }

    /// Zero for leaves.
    pub fn distance(&self) -> f64 {
        self.info.as_ref().map_or(0.0, |i| i.distance)
    }

    pub fn normalized_distance(&self) -> f64 {
        self.info.as_ref().map_or(0.0, |i| i.normalized_distance)
    }

    /// Names of the two merged actions, if any.
    pub fn parents(&self) -> Option<(&str, &str)> {
        self.info
            .as_ref()
            .map(|i| (i.left_parent.as_str(), i.right_parent.as_str()))
    }

    /// The same merge seen from the other side: parents and substitutions swap
    /// roles and the correspondence is inverted.
    pub fn mirrored(mut self) -> Self {
        if let Some(info) = self.info.as_mut() {
            std::mem::swap(&mut info.sigma_left, &mut info.sigma_right);
            std::mem::swap(&mut info.left_parent, &mut info.right_parent);
            info.tau = info.tau.iter().map(|(l, r)| (r.clone(), l.clone())).collect();
        }
        self
    }

    /// The merged action grounded back onto the objects of its right parent.
    /// Leaves are returned unchanged.
    pub fn ground_right(&self) -> Action {
        match &self.info {
            Some(info) => {
                let inverse: Substitution = info
                    .sigma_right
                    .iter()
                    .map(|(original, merged)| (merged.clone(), original.clone()))
                    .collect();
                self.action.replace(&inverse)
            }
            None => self.action.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ClusterOutcome {
    Merged(ClusterResult),
    NoMerge(NoMergeReason),
    TimedOut,
}

impl ClusterOutcome {
    pub fn merged(self) -> Option<ClusterResult> {
        match self {
            ClusterOutcome::Merged(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterOutcome::TimedOut)
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Copy)]
pub struct ClusterOptions {
    pub timeout: Option<Duration>,
    pub amo_encoding: AmoEncoding,
    pub backend: SolverBackend,
    /// Run [`broadphase_test`] before encoding. Disabling it never changes
    /// which pairs merge, only how fast impossible pairs are rejected.
    pub broadphase: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            amo_encoding: AmoEncoding::default(),
            backend: SolverBackend::default(),
            broadphase: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

struct Encoding {
    /// Object correspondence variables, keyed by (left index, right index).
    x: BTreeMap<(usize, usize), Var>,
    /// Atom match variables `(i, j, y)`.
    y: Vec<(usize, usize, Var)>,
    z_left: Vec<Var>,
    z_right: Vec<Var>,
}

fn object_index(objects: &[Object]) -> BTreeMap<&Object, usize> {
    objects.iter().enumerate().map(|(i, o)| (o, i)).collect()
}

fn is_soft_preserved(latom: &LabeledAtom) -> bool {
    latom.section == Section::Pre || !latom.certain
}

/// Merge `left` and `right` into the most specific action explaining both.
///
/// The merged action is named by `names`; its provenance records the names of
/// `left` and `right`.
pub fn cluster(
    left: &Action,
    right: &Action,
    options: &ClusterOptions,
    names: &NameAllocator,
) -> EncodeResult<ClusterOutcome> {
    let stopwatch = Stopwatch::start();

    if options.broadphase && !broadphase_test(left, right) {
        tracing::trace!(left = left.name(), right = right.name(), "broadphase rejected pair");
        return Ok(ClusterOutcome::NoMerge(NoMergeReason::Broadphase));
    }

    let objects_left: Vec<Object> = left.referenced_objects(&[]).into_iter().collect();
    let objects_right: Vec<Object> = right.referenced_objects(&[]).into_iter().collect();
    let index_left = object_index(&objects_left);
    let index_right = object_index(&objects_right);
    let preserve_weight = 1 + objects_left.len().min(objects_right.len()) as u64;

    let latoms_left = left.atoms();
    let latoms_right = right.atoms();

    // Compatible atom pairs, and the object pairs their arguments relate.
    let mut atom_pairs: Vec<(usize, usize)> = Vec::new();
    let mut object_pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for (i, la) in latoms_left.iter().enumerate() {
        for (j, ra) in latoms_right.iter().enumerate() {
            if !la.is_compatible(ra) {
                continue;
            }
            atom_pairs.push((i, j));
            for (ol, or) in la.args().iter().zip(ra.args()) {
                if let (Some(&l), Some(&r)) = (index_left.get(ol), index_right.get(or)) {
                    object_pairs.insert((l, r));
                }
            }
        }
    }

    let mut solver = make_solver(options.backend, options.amo_encoding)?;

    // Object variables first: the native backend branches in declaration order.
    let mut enc = Encoding {
        x: BTreeMap::new(),
        y: Vec::with_capacity(atom_pairs.len()),
        z_left: Vec::with_capacity(latoms_left.len()),
        z_right: Vec::with_capacity(latoms_right.len()),
    };
    for &pair in &object_pairs {
        enc.x.insert(pair, solver.new_var());
    }
    for &(i, j) in &atom_pairs {
        enc.y.push((i, j, solver.new_var()));
    }
    for _ in latoms_left {
        enc.z_left.push(solver.new_var());
    }
    for _ in latoms_right {
        enc.z_right.push(solver.new_var());
    }

    // H1: partial injection.
    let mut by_left: BTreeMap<usize, Vec<Lit>> = BTreeMap::new();
    let mut by_right: BTreeMap<usize, Vec<Lit>> = BTreeMap::new();
    for (&(l, r), &var) in &enc.x {
        by_left.entry(l).or_default().push(var.pos());
        by_right.entry(r).or_default().push(var.pos());
    }
    for lits in by_left.values().chain(by_right.values()) {
        solver.add_at_most_one(lits)?;
    }

    // H2: atoms match iff all their arguments correspond.
    for &(i, j, y) in &enc.y {
        let mut args: Vec<Lit> = Vec::new();
        for (ol, or) in latoms_left[i].args().iter().zip(latoms_right[j].args()) {
            let key = (index_left[ol], index_right[or]);
            if let Some(&x) = enc.x.get(&key) {
                args.push(x.pos());
            }
        }
        solver.add_equiv_and(y.pos(), &args)?;
    }

    // H3: an atom survives iff it is matched at least once.
    let mut matches_left: Vec<Vec<Lit>> = vec![Vec::new(); latoms_left.len()];
    let mut matches_right: Vec<Vec<Lit>> = vec![Vec::new(); latoms_right.len()];
    for &(i, j, y) in &enc.y {
        matches_left[i].push(y.pos());
        matches_right[j].push(y.pos());
    }
    for (z, ys) in enc.z_left.iter().zip(&matches_left) {
        solver.add_equiv_or(z.pos(), ys)?;
    }
    for (z, ys) in enc.z_right.iter().zip(&matches_right) {
        solver.add_equiv_or(z.pos(), ys)?;
    }

    // H4 and S2: certain effects are mandatory, everything else is rewarded.
    for (latoms, zs) in [(latoms_left, &enc.z_left), (latoms_right, &enc.z_right)] {
        for (latom, z) in latoms.iter().zip(zs.iter()) {
            if is_soft_preserved(latom) {
                solver.add_soft(z.pos(), preserve_weight)?;
            } else {
                solver.add_clause(&[z.pos()])?;
            }
        }
    }

    // S1: avoid identifying distinct constants.
    for (&(l, r), &x) in &enc.x {
        let (ol, or) = (&objects_left[l], &objects_right[r]);
        if ol.is_constant() && or.is_constant() && ol != or {
            solver.add_soft(x.neg(), 1)?;
        }
    }

    let model = match solver.solve(options.timeout)? {
        SolveOutcome::Optimal(model) => model,
        SolveOutcome::Unsatisfiable => {
            tracing::debug!(left = left.name(), right = right.name(), "merge unsatisfiable");
            return Ok(ClusterOutcome::NoMerge(NoMergeReason::Unsatisfiable));
        }
        SolveOutcome::TimedOut => {
            tracing::warn!(
                left = left.name(),
                right = right.name(),
                timeout_ms = options.timeout.map(|t| t.as_millis() as u64),
                "solver timed out"
            );
            return Ok(ClusterOutcome::TimedOut);
        }
    };

    // Decode the object correspondence.
    let mut tau = Substitution::new();
    let mut sigma_left = Substitution::new();
    let mut sigma_right = Substitution::new();
    let mut taken: BTreeSet<String> = BTreeSet::new();
    let reserved: BTreeSet<&str> = objects_left
        .iter()
        .chain(&objects_right)
        .map(Object::name)
        .collect();
    for (&(l, r), &x) in &enc.x {
        if !model.value(x) {
            continue;
        }
        let (ol, or) = (&objects_left[l], &objects_right[r]);
        let merged = merged_object(ol, or, &taken, &reserved, names);
        taken.insert(merged.name().to_string());
        tau.insert(ol.clone(), or.clone());
        sigma_left.insert(ol.clone(), merged.clone());
        sigma_right.insert(or.clone(), merged);
    }

    // Surviving left atoms, certain if either side of a match is.
    let mut merged_atoms: Vec<LabeledAtom> = Vec::new();
    for (i, latom) in latoms_left.iter().enumerate() {
        if !model.value(enc.z_left[i]) {
            continue;
        }
        let certain = latom.certain
            || enc
                .y
                .iter()
                .any(|&(li, j, y)| li == i && model.value(y) && latoms_right[j].certain);
        let mut merged = latom.replace(&sigma_left);
        merged.certain = certain;
        merged_atoms.push(merged);
    }

    let action = Action::new(names.fresh_action_name(), merged_atoms);

    let objective = model.cost();
    let distance = objective as f64 / preserve_weight as f64;
    let normalized_distance = normalize_distance(
        distance,
        left.atoms_in(Section::Pre).count(),
        right.atoms_in(Section::Pre).count(),
        preserve_weight,
    );
    let (wall, cpu) = stopwatch.elapsed();

    tracing::debug!(
        left = left.name(),
        right = right.name(),
        merged = action.name(),
        variables = solver.num_vars(),
        distance,
        "merged actions"
    );

    Ok(ClusterOutcome::Merged(ClusterResult {
        action,
        info: Some(MergeInfo {
            distance,
            normalized_distance,
            objective,
            preserve_weight,
            tau,
            sigma_left,
            sigma_right,
            left_parent: left.name().to_string(),
            right_parent: right.name().to_string(),
            solver: solver.stats(),
            elapsed_wall_ms: wall.as_millis() as u64,
            elapsed_cpu_ms: cpu.as_millis() as u64,
        }),
    }))
}

/// The object standing for a corresponding pair in the merged action. Types
/// are generalized to the lowest common ancestor; a variable is reused only if
/// it already has that type and nobody else took its name.
fn merged_object(
    left: &Object,
    right: &Object,
    taken: &BTreeSet<String>,
    reserved: &BTreeSet<&str>,
    names: &NameAllocator,
) -> Object {
    let objtype = left
        .objtype()
        .lowest_common_ancestor(right.objtype())
        .unwrap_or_else(ObjType::root);
    let reusable = |o: &Object| o.is_variable() && o.objtype() == &objtype && !taken.contains(o.name());
    if reusable(left) {
        return left.clone();
    }
    if reusable(right) {
        return right.clone();
    }
    if left.is_constant() && left == right && !taken.contains(left.name()) {
        return left.clone();
    }
    loop {
        let fresh = names.fresh_variable(&objtype);
        if !taken.contains(fresh.name()) && !reserved.contains(fresh.name()) {
            return fresh;
        }
    }
}

/// Rescale a distance using the bounds implied by the precondition sizes.
pub fn normalize_distance(distance: f64, pre_left: usize, pre_right: usize, preserve_weight: u64) -> f64 {
    let w = preserve_weight as f64;
    let min_dist = pre_left.abs_diff(pre_right) as f64;
    let max_dist = (pre_left + pre_right) as f64 + (w - 1.0) / w;
    if max_dist <= 0.0 {
        return 0.0;
    }
    (distance - min_dist) / max_dist
}
