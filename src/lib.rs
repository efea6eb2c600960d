// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # oaru
//!
//! Online learning of STRIPS action schemas from observed state transitions,
//! with MaxSAT-based action clustering.
//!
//! ## Architecture
//!
//! - **Data model** (`model`): typed objects, atoms, labeled atoms, world states
//! - **Grounding** (`unify`, `action`): unification, lazy goal matching, action application
//! - **Declared domains** (`domain`, `pddl`): validated STRIPS domains and PDDL emission
//! - **MaxSAT** (`solver`): adapter trait with a native branch-and-bound backend
//!   and an optional Z3 backend (`z3` feature)
//! - **Cluster encoder** (`cluster`): merging two actions into one schema
//! - **Atom filters** (`filter`): shrinking encoder inputs, escalated on timeouts
//! - **Learner** (`learner`): incremental library maintenance, negative examples, undo
//!
//! ## Library usage
//!
//! ```no_run
//! use oaru::learner::OaruAlgorithm;
//! use oaru::model::{Atom, Context, Object};
//!
//! let at = |r: &str, l: &str| Atom::new("at", vec![Object::untyped(r), Object::untyped(l)]);
//! let pre = Context::from_atoms([at("robot", "kitchen")]);
//! let post = Context::from_atoms([at("robot", "hall")]);
//!
//! let mut oaru = OaruAlgorithm::default();
//! let recognition = oaru.action_recognition(&pre, &post).unwrap();
//! assert!(recognition.updated);
//! println!("{}", oaru.to_pddl("learned"));
//! ```

pub mod action;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod learner;
pub mod model;
pub mod pddl;
pub mod solver;
pub mod unify;

pub use action::Action;
pub use cluster::{cluster, ClusterOptions, ClusterOutcome, ClusterResult};
pub use config::LearnerConfig;
pub use error::{OaruError, OaruResult};
pub use learner::OaruAlgorithm;
