//! Atom filters: shrinking actions before they reach the encoder.
//!
//! A filter maps an action to a smaller action with the same name. Effects are
//! never removed, so a filtered action still explains the transition it came
//! from. The filters form a closed set selected by configuration; the learner
//! walks them as an escalation ladder when the solver times out.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::model::{LabeledAtom, Object, Section};

// ---------------------------------------------------------------------------
// Object graph
// ---------------------------------------------------------------------------

/// Objects of an action, adjacent when they co-occur in some atom.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    graph: UnGraph<Option<Object>, u32>,
    nodes: BTreeMap<Object, NodeIndex>,
    /// Virtual node linked with weight 0 to every object touched by an effect.
    root: NodeIndex,
}

impl ObjectGraph {
    pub fn new(action: &Action) -> Self {
        let mut graph = UnGraph::new_undirected();
        let root = graph.add_node(None);
        let mut nodes = BTreeMap::new();
        for obj in action.referenced_objects(&[]) {
            let idx = graph.add_node(Some(obj.clone()));
            nodes.insert(obj, idx);
        }
        for latom in action.atoms() {
            let args = latom.args();
            for (i, a) in args.iter().enumerate() {
                for b in &args[i + 1..] {
                    let (ia, ib) = (nodes[a], nodes[b]);
                    if ia != ib && graph.find_edge(ia, ib).is_none() {
                        graph.add_edge(ia, ib, 1);
                    }
                }
            }
        }
        for obj in action.referenced_objects(&[Section::Add, Section::Del]) {
            graph.add_edge(root, nodes[&obj], 0);
        }
        Self { graph, nodes, root }
    }

    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn are_adjacent(&self, a: &Object, b: &Object) -> bool {
        match (self.nodes.get(a), self.nodes.get(b)) {
            (Some(&ia), Some(&ib)) => self.graph.find_edge(ia, ib).is_some(),
            _ => false,
        }
    }

    /// Hop distance of every object from the nearest object touched by an
    /// effect. Objects in other connected components are absent.
    pub fn effect_distances(&self) -> BTreeMap<Object, u32> {
        let reached: HashMap<NodeIndex, u32> = dijkstra(&self.graph, self.root, None, |e| *e.weight());
        self.nodes
            .iter()
            .filter_map(|(obj, idx)| reached.get(idx).map(|d| (obj.clone(), *d)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// The available atom filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtomFilter {
    /// Identity.
    #[default]
    KeepAll,
    /// Keep atoms all of whose objects lie within `max_distance` hops of an
    /// object touched by an effect.
    ObjectGraph { max_distance: u32 },
    /// Keep atoms whose objects are all touched by an effect.
    AffectedObjects,
    /// Keep only the effects.
    KeepNone,
}

impl AtomFilter {
    pub fn apply(&self, action: &Action) -> Action {
        match self {
            AtomFilter::KeepAll => action.clone(),
            AtomFilter::ObjectGraph { max_distance } => {
                let distances = ObjectGraph::new(action).effect_distances();
                retain(action, |latom| {
                    latom
                        .args()
                        .iter()
                        .map(|o| distances.get(o).copied().unwrap_or(u32::MAX))
                        .max()
                        .unwrap_or(0)
                        <= *max_distance
                })
            }
            AtomFilter::AffectedObjects => {
                let affected = action.referenced_objects(&[Section::Add, Section::Del]);
                retain(action, |latom| latom.args().iter().all(|o| affected.contains(o)))
            }
            AtomFilter::KeepNone => retain(action, |_| false),
        }
    }
}

/// Keep the effects plus every atom accepted by `keep`.
fn retain(action: &Action, keep: impl Fn(&LabeledAtom) -> bool) -> Action {
    let atoms = action
        .atoms()
        .iter()
        .filter(|l| l.section.is_effect() || keep(l))
        .cloned()
        .collect();
    action.with_atoms(atoms)
}

impl fmt::Display for AtomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomFilter::KeepAll => write!(f, "keep-all"),
            AtomFilter::ObjectGraph { max_distance } => write!(f, "object-graph({max_distance})"),
            AtomFilter::AffectedObjects => write!(f, "affected-objects"),
            AtomFilter::KeepNone => write!(f, "keep-none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Atom, Context};

    fn obj(name: &str) -> Object {
        Object::untyped(name)
    }

    fn p(head: &str, args: &[&str]) -> Atom {
        Atom::new(head, args.iter().map(|a| obj(a)).collect())
    }

    /// Robot r moves a -> b on a line a - b - c - d, with a far-away box.
    fn action() -> Action {
        let pre = Context::from_atoms([
            p("at", &["r", "a"]),
            p("adjacent", &["a", "b"]),
            p("adjacent", &["b", "c"]),
            p("adjacent", &["c", "d"]),
            p("box", &["x"]),
            p("daylight", &[]),
        ]);
        let mut post = pre.clone();
        post.atoms.remove(&p("at", &["r", "a"]));
        post.atoms.insert(p("at", &["r", "b"]));
        Action::from_transition("move", &pre, &post)
    }

    fn pre_heads(action: &Action) -> Vec<String> {
        action
            .sorted_atoms(Section::Pre)
            .iter()
            .map(|l| l.atom.to_string())
            .collect()
    }

    #[test]
    fn object_graph_distances() {
        let graph = ObjectGraph::new(&action());
        assert_eq!(graph.object_count(), 6);
        assert!(graph.are_adjacent(&obj("b"), &obj("c")));
        assert!(!graph.are_adjacent(&obj("a"), &obj("c")));
        let d = graph.effect_distances();
        assert_eq!(d[&obj("r")], 0);
        assert_eq!(d[&obj("b")], 0);
        assert_eq!(d[&obj("c")], 1);
        assert_eq!(d[&obj("d")], 2);
        assert!(!d.contains_key(&obj("x")));
    }

    #[test]
    fn keep_all_is_identity() {
        let a = action();
        assert_eq!(AtomFilter::KeepAll.apply(&a), a);
    }

    #[test]
    fn object_graph_filter_drops_distant_atoms() {
        let filtered = AtomFilter::ObjectGraph { max_distance: 1 }.apply(&action());
        assert_eq!(
            pre_heads(&filtered),
            vec!["adjacent(a,b)", "adjacent(b,c)", "at(r,a)", "daylight()"]
        );
        assert_eq!(filtered.atoms_in(Section::Add).count(), 1);
        assert_eq!(filtered.atoms_in(Section::Del).count(), 1);
    }

    #[test]
    fn affected_objects_filter() {
        let filtered = AtomFilter::AffectedObjects.apply(&action());
        assert_eq!(pre_heads(&filtered), vec!["adjacent(a,b)", "at(r,a)", "daylight()"]);
    }

    #[test]
    fn keep_none_keeps_effects_only() {
        let filtered = AtomFilter::KeepNone.apply(&action());
        assert_eq!(filtered.atoms_in(Section::Pre).count(), 0);
        assert_eq!(filtered.atoms().len(), 2);
        assert_eq!(filtered.name(), "move");
    }

    #[test]
    fn filters_deserialize_from_tagged_tables() {
        let f: AtomFilter = toml::from_str("kind = \"object_graph\"\nmax_distance = 2").unwrap();
        assert_eq!(f, AtomFilter::ObjectGraph { max_distance: 2 });
        let f: AtomFilter = serde_json::from_str(r#"{"kind":"keep_none"}"#).unwrap();
        assert_eq!(f, AtomFilter::KeepNone);
    }
}
