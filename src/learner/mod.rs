//! OARU: online action recognition and update.
//!
//! [`OaruAlgorithm`] maintains a library of action schemas over a stream of
//! observed transitions:
//!
//! 1. every transition becomes a leaf action (filtered by the current
//!    [`AtomFilter`](crate::filter::AtomFilter) level)
//! 2. the leaf is clustered with every library entry, and the closest merge
//!    that reproduces no negative example replaces its library parent
//! 3. without any admissible merge, the leaf joins the library as is
//!
//! Negative examples are permanent. Registering one makes the library
//! consistent again, either by replaying every demonstration
//! ([`ReconcileStrategy::Replay`], the reference behavior) or by rewinding
//! to the first demonstration whose schema reproduces the new example and
//! replaying only from there ([`ReconcileStrategy::Refactor`]). Both end with
//! the same library.
//!
//! Every result ever produced is kept in a provenance arena keyed by action
//! name; merge results refer to their parents by name, so evicting a library
//! entry never leaves dangling references.

pub mod error;
pub mod operation;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use crate::action::Action;
use crate::cluster::{cluster, ClusterOptions, ClusterOutcome, ClusterResult, NameAllocator};
use crate::config::{LearnerConfig, ReconcileStrategy};
use crate::filter::AtomFilter;
use crate::model::{Context, Transition};
use crate::pddl;

use self::error::{LearnError, LearnResult};
use self::operation::{peak_memory_kib, Operation, OperationKind, Stopwatch};

/// Outcome of [`OaruAlgorithm::action_recognition`].
#[derive(Debug, Clone)]
pub struct Recognition {
    /// The explaining action, grounded onto the observed objects.
    pub action: Action,
    /// Whether the library gained information.
    pub updated: bool,
    /// Name of the library entry explaining the transition.
    pub schema: String,
    /// The library entry `schema` replaced, when the transition was merged.
    pub replaced: Option<String>,
    /// Filter level the recognition finished at.
    pub filter_level: usize,
}

/// How one demonstration changed the library.
#[derive(Debug, Clone)]
struct Step {
    schema: String,
    replaced: Option<String>,
}

impl From<&Recognition> for Step {
    fn from(recognition: &Recognition) -> Self {
        Self {
            schema: recognition.schema.clone(),
            replaced: recognition.replaced.clone(),
        }
    }
}

/// The incremental learner.
#[derive(Debug)]
pub struct OaruAlgorithm {
    config: LearnerConfig,
    names: NameAllocator,
    library: BTreeMap<String, ClusterResult>,
    arena: BTreeMap<String, ClusterResult>,
    observations: Vec<Transition>,
    /// One entry per observation, in order.
    steps: Vec<Step>,
    negative_examples: Vec<Transition>,
    history: Vec<Operation>,
    next_operation: u64,
    /// Cluster outcomes keyed by the unordered pair of operand names.
    memo: HashMap<(String, String), ClusterOutcome>,
}

impl Default for OaruAlgorithm {
    fn default() -> Self {
        Self::new(LearnerConfig::default())
    }
}

fn memo_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl OaruAlgorithm {
    pub fn new(config: LearnerConfig) -> Self {
        Self {
            config,
            names: NameAllocator::new(),
            library: BTreeMap::new(),
            arena: BTreeMap::new(),
            observations: Vec::new(),
            steps: Vec::new(),
            negative_examples: Vec::new(),
            history: Vec::new(),
            next_operation: 0,
            memo: HashMap::new(),
        }
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn library(&self) -> impl Iterator<Item = &ClusterResult> {
        self.library.values()
    }

    pub fn library_len(&self) -> usize {
        self.library.len()
    }

    pub fn get(&self, name: &str) -> Option<&ClusterResult> {
        self.library.get(name)
    }

    /// Any result ever produced, including evicted ones.
    pub fn provenance(&self, name: &str) -> Option<&ClusterResult> {
        self.arena.get(name)
    }

    /// Names of the leaf actions a library entry was merged from.
    pub fn leaves_of(&self, name: &str) -> Vec<String> {
        let mut leaves = Vec::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            match self.arena.get(&current).and_then(ClusterResult::parents) {
                Some((left, right)) => {
                    stack.push(right.to_string());
                    stack.push(left.to_string());
                }
                None => leaves.push(current),
            }
        }
        leaves
    }

    pub fn observations(&self) -> &[Transition] {
        &self.observations
    }

    pub fn negative_examples(&self) -> &[Transition] {
        &self.negative_examples
    }

    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    /// The operation log as pretty-printed JSON.
    pub fn history_json(&self) -> LearnResult<String> {
        serde_json::to_string_pretty(&self.history).map_err(|e| LearnError::Export {
            message: e.to_string(),
        })
    }

    /// The library entry able to produce `pre -> post`, if any.
    pub fn explains(&self, pre: &Context, post: &Context) -> Option<&str> {
        self.library
            .values()
            .find(|entry| entry.action.can_produce_transition(pre, post))
            .map(ClusterResult::name)
    }

    /// `(head, arity)` of every predicate used by a library action.
    pub fn predicate_signatures(&self) -> BTreeSet<(String, usize)> {
        self.library
            .values()
            .flat_map(|entry| entry.action.atoms())
            .map(|l| (l.head().to_string(), l.atom.arity()))
            .collect()
    }

    /// The library as a PDDL domain.
    pub fn to_pddl(&self, domain_name: &str) -> String {
        pddl::library_to_pddl(domain_name, self.library.values().map(|e| &e.action))
    }

    // -----------------------------------------------------------------------
    // Demonstrations
    // -----------------------------------------------------------------------

    /// Explain the transition `pre -> post`, generalizing the library when a
    /// library action can absorb it.
    pub fn action_recognition(&mut self, pre: &Context, post: &Context) -> LearnResult<Recognition> {
        let stopwatch = Stopwatch::start();
        let before = self.library_names();

        let recognition = self.recognize(pre, post)?;
        self.observations.push(Transition::new(pre.clone(), post.clone()));
        self.steps.push(Step::from(&recognition));

        let (added, removed) = self.library_diff(&before);
        self.record(
            OperationKind::NewDemonstration,
            added,
            removed,
            Some((recognition.updated, recognition.schema.clone())),
            recognition.filter_level,
            &stopwatch,
        );
        Ok(recognition)
    }

    /// Recognition with filter escalation: on timeout, retry at the next
    /// filter level; past the last level, retry without a timeout.
    fn recognize(&mut self, pre: &Context, post: &Context) -> LearnResult<Recognition> {
        let mut level = 0;
        let mut timeout = self.config.timeout();
        loop {
            let filter = self.config.filter(level);
            if let Some(mut recognition) = self.recognize_with(pre, post, filter, timeout)? {
                recognition.filter_level = level;
                return Ok(recognition);
            }
            if level + 1 < self.config.filters.len() {
                level += 1;
                tracing::warn!(
                    level,
                    filter = %self.config.filter(level),
                    "solver timed out, escalating atom filter"
                );
            } else {
                tracing::warn!(level, "solver timed out at the last filter level, disabling timeout");
                timeout = None;
            }
        }
    }

    /// One recognition attempt. `Ok(None)` means a solver call timed out.
    fn recognize_with(
        &mut self,
        pre: &Context,
        post: &Context,
        filter: AtomFilter,
        timeout: Option<Duration>,
    ) -> LearnResult<Option<Recognition>> {
        let observed = Action::from_transition(self.names.fresh_action_name(), pre, post);
        let tga = filter.apply(&observed);
        if let Some(example) = self.reproduced_negative(&tga) {
            return Err(LearnError::ContradictoryExample { example });
        }

        let options = self.config.cluster_options(timeout);
        let candidates: Vec<String> = self.library.keys().cloned().collect();
        let mut best: Option<(String, ClusterResult, f64)> = None;
        for name in candidates {
            let Some(lib) = self.library.get(&name).map(|e| e.action.clone()) else {
                continue;
            };
            let mut merged = match self.cluster_cached(&lib, &tga, &options)? {
                ClusterOutcome::Merged(result) => result,
                ClusterOutcome::NoMerge(_) => continue,
                ClusterOutcome::TimedOut if timeout.is_some() => return Ok(None),
                ClusterOutcome::TimedOut => {
                    tracing::warn!(left = %name, right = tga.name(), "solver gave up without a timeout");
                    continue;
                }
            };
            if self.config.double_filtering {
                merged.action = filter.apply(&merged.action);
            }
            if let Some(example) = self.reproduced_negative(&merged.action) {
                tracing::debug!(left = %name, example, "merge forbidden by negative example");
                continue;
            }
            let score = if self.config.normalize_distance {
                merged.normalized_distance()
            } else {
                merged.distance()
            };
            if best.as_ref().is_none_or(|(_, _, s)| score < *s) {
                best = Some((name, merged, score));
            }
        }

        let recognition = match best {
            None => {
                let schema = tga.name().to_string();
                tracing::info!(action = %schema, "new library action");
                self.insert_entry(ClusterResult::leaf(tga.clone()));
                Recognition {
                    action: tga,
                    updated: true,
                    schema,
                    replaced: None,
                    filter_level: 0,
                }
            }
            Some((parent, merged, score)) => {
                let updated = self
                    .library
                    .get(&parent)
                    .is_none_or(|old| old.action.digest() != merged.action.digest());
                let grounded = merged.ground_right();
                let schema = merged.name().to_string();
                tracing::info!(replaced = %parent, by = %schema, distance = score, updated, "library action generalized");
                self.arena.insert(tga.name().to_string(), ClusterResult::leaf(tga));
                self.evict(&parent);
                self.insert_entry(merged);
                Recognition {
                    action: grounded,
                    updated,
                    schema,
                    replaced: Some(parent),
                    filter_level: 0,
                }
            }
        };
        self.prune_memo();
        Ok(Some(recognition))
    }

    // -----------------------------------------------------------------------
    // Negative examples
    // -----------------------------------------------------------------------

    /// Forbid the transition `pre -> post` and make the library consistent
    /// with it. Both states must be fully observable.
    ///
    /// On error the library and the negative examples are left as they were.
    pub fn add_negative_example(&mut self, pre: &Context, post: &Context) -> LearnResult<()> {
        if pre.is_uncertain() || post.is_uncertain() {
            return Err(LearnError::UncertainNegativeExample);
        }
        let stopwatch = Stopwatch::start();
        let before = self.library_names();
        let snapshot = (self.library.clone(), self.steps.clone());

        self.negative_examples.push(Transition::new(pre.clone(), post.clone()));
        let index = self.negative_examples.len() - 1;
        tracing::info!(example = index, strategy = ?self.config.reconcile, "negative example registered");

        let reconciled = match self.config.reconcile {
            ReconcileStrategy::Replay => self.replay(),
            ReconcileStrategy::Refactor => self.refactor(index),
        }
        .and_then(|()| self.check_consistency());
        if let Err(err) = reconciled {
            self.negative_examples.pop();
            (self.library, self.steps) = snapshot;
            self.memo.clear();
            return Err(err);
        }

        let (added, removed) = self.library_diff(&before);
        self.record(OperationKind::NewNegativeExample, added, removed, None, 0, &stopwatch);
        Ok(())
    }

    /// Rebuild the library from scratch by recognizing every demonstration
    /// again.
    fn replay(&mut self) -> LearnResult<()> {
        self.library.clear();
        self.memo.clear();
        self.steps.clear();
        self.replay_from(0)
    }

    /// Rewind the library to just before the first demonstration whose
    /// schema or observed leaf reproduces negative example `index`, then
    /// replay from there.
    fn refactor(&mut self, index: usize) -> LearnResult<()> {
        let negative = &self.negative_examples[index];
        let reproduces = |name: &str| {
            self.arena
                .get(name)
                .is_none_or(|entry| entry.action.can_produce_transition(&negative.pre, &negative.post))
        };
        let first = self.steps.iter().position(|step| {
            reproduces(&step.schema)
                || self
                    .arena
                    .get(&step.schema)
                    .and_then(ClusterResult::parents)
                    .is_some_and(|(_, leaf)| reproduces(leaf))
        });
        let Some(first) = first else {
            tracing::debug!(example = index, "no library action reproduces the negative example");
            return Ok(());
        };

        let undone: Vec<Step> = self.steps.drain(first..).collect();
        for step in undone.iter().rev() {
            self.evict(&step.schema);
            if let Some(parent) = &step.replaced {
                let restored = self
                    .arena
                    .get(parent)
                    .cloned()
                    .ok_or_else(|| LearnError::MissingProvenance { name: parent.clone() })?;
                self.library.insert(parent.clone(), restored);
            }
        }
        tracing::info!(from = first, rewound = undone.len(), "library rewound");
        self.replay_from(first)
    }

    /// Recognize observations `from..` again on top of the current library.
    fn replay_from(&mut self, from: usize) -> LearnResult<()> {
        let observations = self.observations[from..].to_vec();
        for transition in &observations {
            let recognition = self.recognize(&transition.pre, &transition.post)?;
            self.steps.push(Step::from(&recognition));
        }
        tracing::debug!(from, replayed = observations.len(), library = self.library.len(), "library replayed");
        Ok(())
    }

    fn check_consistency(&self) -> LearnResult<()> {
        for entry in self.library.values() {
            if let Some(example) = self.reproduced_negative(&entry.action) {
                return Err(LearnError::InconsistentLibrary {
                    action: entry.name().to_string(),
                    example,
                });
            }
        }
        Ok(())
    }

    /// Index of the first negative example `action` can reproduce.
    fn reproduced_negative(&self, action: &Action) -> Option<usize> {
        self.negative_examples
            .iter()
            .position(|n| action.can_produce_transition(&n.pre, &n.post))
    }

    // -----------------------------------------------------------------------
    // Undo
    // -----------------------------------------------------------------------

    /// Revert the last demonstration. Negative examples cannot be undone.
    pub fn undo_last(&mut self) -> LearnResult<Operation> {
        let Some(last) = self.history.last() else {
            return Err(LearnError::NothingToUndo);
        };
        if last.kind == OperationKind::NewNegativeExample {
            return Err(LearnError::IrreversibleOperation { id: last.id });
        }
        let mut restored = Vec::with_capacity(last.removed.len());
        for name in &last.removed {
            let entry = self
                .arena
                .get(name)
                .cloned()
                .ok_or_else(|| LearnError::MissingProvenance { name: name.clone() })?;
            restored.push(entry);
        }
        let Some(op) = self.history.pop() else {
            return Err(LearnError::NothingToUndo);
        };
        for name in &op.added {
            self.evict(name);
        }
        for entry in restored {
            self.library.insert(entry.name().to_string(), entry);
        }
        self.observations.pop();
        self.steps.pop();
        tracing::info!(operation = op.id, "demonstration undone");
        Ok(op)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn cluster_cached(
        &mut self,
        left: &Action,
        right: &Action,
        options: &ClusterOptions,
    ) -> LearnResult<ClusterOutcome> {
        if !self.config.memoize {
            return Ok(cluster(left, right, options, &self.names)?);
        }
        let key = memo_key(left.name(), right.name());
        if let Some(hit) = self.memo.get(&key) {
            return Ok(match hit.clone() {
                ClusterOutcome::Merged(result)
                    if result.parents().is_some_and(|(l, _)| l != left.name()) =>
                {
                    ClusterOutcome::Merged(result.mirrored())
                }
                other => other,
            });
        }
        let outcome = cluster(left, right, options, &self.names)?;
        if !outcome.is_timeout() {
            self.memo.insert(key, outcome.clone());
        }
        Ok(outcome)
    }

    /// Drop cached outcomes involving actions no longer in the library.
    fn prune_memo(&mut self) {
        let library = &self.library;
        self.memo
            .retain(|(a, b), _| library.contains_key(a) && library.contains_key(b));
    }

    fn insert_entry(&mut self, entry: ClusterResult) {
        let name = entry.name().to_string();
        self.arena.insert(name.clone(), entry.clone());
        self.library.insert(name, entry);
    }

    fn evict(&mut self, name: &str) -> Option<ClusterResult> {
        let evicted = self.library.remove(name);
        if evicted.is_some() {
            self.memo.retain(|(a, b), _| a != name && b != name);
            tracing::debug!(action = name, "library action evicted");
        }
        evicted
    }

    fn library_names(&self) -> BTreeSet<String> {
        self.library.keys().cloned().collect()
    }

    fn library_diff(&self, before: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
        let after = self.library_names();
        (
            after.difference(before).cloned().collect(),
            before.difference(&after).cloned().collect(),
        )
    }

    fn record(
        &mut self,
        kind: OperationKind,
        added: Vec<String>,
        removed: Vec<String>,
        demonstration: Option<(bool, String)>,
        filter_level: usize,
        stopwatch: &Stopwatch,
    ) {
        let (wall, cpu) = stopwatch.elapsed();
        let (updated, schema) = match demonstration {
            Some((updated, schema)) => (Some(updated), Some(schema)),
            None => (None, None),
        };
        let op = Operation {
            id: self.next_operation,
            kind,
            added,
            removed,
            updated,
            schema,
            filter_level,
            wall_time_ms: wall.as_secs_f64() * 1000.0,
            cpu_time_ms: cpu.as_secs_f64() * 1000.0,
            peak_memory_kib: peak_memory_kib(),
        };
        self.next_operation += 1;
        self.history.push(op);
    }
}
