//! Learner-specific error types with rich miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use crate::error::{EncodeError, ModelError};

/// Errors raised by [`OaruAlgorithm`](super::OaruAlgorithm).
#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error("library action '{action}' still reproduces negative example #{example}")]
    #[diagnostic(
        code(oaru::learn::inconsistent_library),
        help(
            "Reconciliation left an action that explains a forbidden transition. \
             This indicates a defect in the merge encoding; rerun with the `replay` \
             reconciliation strategy and report the transition."
        )
    )]
    InconsistentLibrary { action: String, example: usize },

    #[error("observed transition is itself forbidden by negative example #{example}")]
    #[diagnostic(
        code(oaru::learn::contradictory_example),
        help(
            "A demonstration (after filtering) reproduces a registered negative example. \
             Either the demonstration or the negative example is wrong, or the atom \
             filter removed the preconditions that tell them apart."
        )
    )]
    ContradictoryExample { example: usize },

    #[error("negative examples must be fully observable")]
    #[diagnostic(
        code(oaru::learn::uncertain_negative_example),
        help("Remove the uncertain atoms from both states before registering the example.")
    )]
    UncertainNegativeExample,

    #[error("operation #{id} cannot be undone")]
    #[diagnostic(
        code(oaru::learn::irreversible),
        help("Negative examples are permanent; only demonstrations can be undone.")
    )]
    IrreversibleOperation { id: u64 },

    #[error("no operation to undo")]
    #[diagnostic(code(oaru::learn::empty_history))]
    NothingToUndo,

    #[error("provenance entry '{name}' is missing")]
    #[diagnostic(
        code(oaru::learn::missing_provenance),
        help("Every library entry is recorded in the provenance arena; this is a bug.")
    )]
    MissingProvenance { name: String },

    #[error("failed to export history: {message}")]
    #[diagnostic(code(oaru::learn::export))]
    Export { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),
}

/// Result type for learner operations.
pub type LearnResult<T> = std::result::Result<T, LearnError>;
