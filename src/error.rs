//! Rich diagnostic error types for the oaru learner.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it.
//!
//! Note that "no merge possible" and "solver timed out" are *not* errors: they are
//! ordinary outcomes of the cluster encoder (see [`crate::cluster::ClusterOutcome`]).

use miette::Diagnostic;
use thiserror::Error;

use crate::learner::error::LearnError;

/// Top-level error type for the oaru crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum OaruError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),
}

// ---------------------------------------------------------------------------
// Model errors
// ---------------------------------------------------------------------------

/// Malformed-model errors. These are programmer errors raised at construction
/// time, never ordinary runtime conditions.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ModelError {
    #[error("parameter {parameter} of action '{action}' is not a variable")]
    #[diagnostic(
        code(oaru::model::not_a_variable),
        help("Action parameters must be variables, i.e. their names start with '?'.")
    )]
    NotAVariable { action: String, parameter: String },

    #[error("free variable {variable} of action '{action}' is not in its parameter list")]
    #[diagnostic(
        code(oaru::model::free_variable),
        help(
            "Every variable occurring in an atom of the action must be declared as a \
             parameter. Either add it to the parameters or build the action with \
             `Action::new`, which deduces the parameters from the atoms."
        )
    )]
    FreeVariable { action: String, variable: String },

    #[error("type '{name}' already declared")]
    #[diagnostic(
        code(oaru::model::duplicate_type),
        help("Type names must be unique within a domain (and cannot be 'object').")
    )]
    DuplicateType { name: String },

    #[error("parent type '{parent}' of '{name}' is not declared")]
    #[diagnostic(
        code(oaru::model::undeclared_parent),
        help("Declare the parent type before any of its subtypes.")
    )]
    UndeclaredParentType { name: String, parent: String },

    #[error("predicate '{head}' already declared")]
    #[diagnostic(
        code(oaru::model::duplicate_predicate),
        help("Predicate heads must be unique within a domain.")
    )]
    DuplicatePredicate { head: String },

    #[error("unknown type '{name}' in the declaration of '{declaration}'")]
    #[diagnostic(
        code(oaru::model::unknown_type),
        help("Declare the type in the domain before using it in a predicate.")
    )]
    UnknownType { name: String, declaration: String },

    #[error("action '{name}' already declared")]
    #[diagnostic(
        code(oaru::model::duplicate_action),
        help("Action names must be unique within a domain.")
    )]
    DuplicateAction { name: String },

    #[error("no declared predicate generates {atom}")]
    #[diagnostic(
        code(oaru::model::unknown_signature),
        help("Every atom of a declared action must match the signature of a declared predicate.")
    )]
    UnknownPredicateSignature { atom: String },

    #[error("predicate '{head}' expects {expected} arguments, got {actual}")]
    #[diagnostic(code(oaru::model::arity_mismatch))]
    ArityMismatch {
        head: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {argument} does not fit type '{expected}' of predicate '{head}'")]
    #[diagnostic(
        code(oaru::model::type_mismatch),
        help("The type of each argument must be a subtype of the declared argument type.")
    )]
    TypeMismatch {
        head: String,
        argument: String,
        expected: String,
    },

    #[error("action '{action}' is not ground: {atom} contains a variable")]
    #[diagnostic(
        code(oaru::model::not_ground),
        help("Ground the action first (e.g. with `Action::instantiate`) before applying it.")
    )]
    NotGround { action: String, atom: String },

    #[error("action '{action}' contains the uncertain atom {atom}")]
    #[diagnostic(
        code(oaru::model::uncertain_atom),
        help("Only fully certain actions can be applied. Use `Action::certain_fragment`.")
    )]
    UncertainAtom { action: String, atom: String },
}

// ---------------------------------------------------------------------------
// Solver errors
// ---------------------------------------------------------------------------

/// Failures of a MaxSAT backend. Timeouts and unsatisfiability are reported as
/// [`crate::solver::SolveOutcome`] values, not as errors.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum SolverError {
    #[error("literal refers to undeclared variable {var}")]
    #[diagnostic(
        code(oaru::solver::undeclared_variable),
        help("Declare every variable with `new_var()` before using it in a constraint.")
    )]
    UndeclaredVariable { var: u32 },

    #[error("solver backend '{backend}' is not available in this build")]
    #[diagnostic(
        code(oaru::solver::unavailable),
        help("Rebuild with `--features z3` or select the `native` backend.")
    )]
    BackendUnavailable { backend: String },

    #[error("solver backend error: {message}")]
    #[diagnostic(code(oaru::solver::backend))]
    Backend { message: String },
}

// ---------------------------------------------------------------------------
// Encoder errors
// ---------------------------------------------------------------------------

/// Errors raised while encoding or decoding a cluster problem.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum EncodeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    #[diagnostic(
        code(oaru::config::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid learner config: {message}")]
    #[diagnostic(
        code(oaru::config::parse),
        help("The config is TOML; see `LearnerConfig` for the accepted keys.")
    )]
    Parse { message: String },
}

/// Convenience result type for the top level of the crate.
pub type OaruResult<T> = std::result::Result<T, OaruError>;

/// Result type for data-model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type for solver operations.
pub type SolverResult<T> = std::result::Result<T, SolverError>;

/// Result type for the cluster encoder.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_wraps_into_top_level() {
        let err: OaruError = ModelError::DuplicateType {
            name: "location".into(),
        }
        .into();
        assert!(matches!(err, OaruError::Model(_)));
        assert_eq!(err.to_string(), "type 'location' already declared");
    }

    #[test]
    fn solver_error_wraps_into_encode_error() {
        let err: EncodeError = SolverError::Backend {
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.to_string(), "solver backend error: boom");
    }

    #[test]
    fn diagnostic_codes_are_present() {
        let err = ModelError::FreeVariable {
            action: "move".into(),
            variable: "?x".into(),
        };
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("oaru::model::free_variable"));
    }
}
