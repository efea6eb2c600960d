//! Learner configuration, loadable from TOML.
//!
//! ```toml
//! timeout_ms = 2000
//! amo_encoding = "pseudo_boolean"
//! reconcile = "refactor"
//!
//! [[filters]]
//! kind = "keep_all"
//!
//! [[filters]]
//! kind = "object_graph"
//! max_distance = 1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterOptions;
use crate::error::{ConfigError, ConfigResult};
use crate::filter::AtomFilter;
use crate::solver::{AmoEncoding, SolverBackend};

/// How the library is made consistent again after a negative example.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStrategy {
    /// Clear the library and re-recognize every demonstration.
    #[default]
    Replay,
    /// Rewind to the first demonstration whose schema reproduces the new
    /// example and re-recognize from there.
    Refactor,
}

fn default_filters() -> Vec<AtomFilter> {
    vec![AtomFilter::KeepAll]
}

fn default_true() -> bool {
    true
}

/// Settings of an [`OaruAlgorithm`](crate::learner::OaruAlgorithm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Per-solve timeout in milliseconds; none means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub amo_encoding: AmoEncoding,
    pub backend: SolverBackend,
    /// Also filter merge products with the current filter.
    pub double_filtering: bool,
    pub reconcile: ReconcileStrategy,
    /// Cache pairwise cluster outcomes.
    #[serde(default = "default_true")]
    pub memoize: bool,
    /// Rank merge candidates by normalized distance.
    pub normalize_distance: bool,
    /// Escalation ladder; level 0 is tried first. Must stay the last field:
    /// it is emitted as an array of tables.
    #[serde(default = "default_filters")]
    pub filters: Vec<AtomFilter>,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            amo_encoding: AmoEncoding::default(),
            backend: SolverBackend::default(),
            double_filtering: false,
            reconcile: ReconcileStrategy::default(),
            memoize: true,
            normalize_distance: false,
            filters: default_filters(),
        }
    }
}

impl LearnerConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.filters.is_empty() {
            return Err(ConfigError::Parse {
                message: "`filters` must contain at least one filter".into(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The filter of an escalation level, clamped to the last one.
    pub fn filter(&self, level: usize) -> AtomFilter {
        self.filters
            .get(level)
            .or(self.filters.last())
            .copied()
            .unwrap_or_default()
    }

    pub fn cluster_options(&self, timeout: Option<Duration>) -> ClusterOptions {
        ClusterOptions {
            timeout,
            amo_encoding: self.amo_encoding,
            backend: self.backend,
            broadphase: true,
        }
    }
}
