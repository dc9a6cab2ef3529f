use crate::rules::FieldId;
use crate::signature::SignatureStage;
use crate::status::ManifestStatus;

/// A single validation finding. Issues are aggregated over one pass and
/// returned together; each carries a stable field path for form binding.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    #[error("{} cannot be modified once sealed by a signature", .field.label())]
    SealedField { field: FieldId },
    #[error("{} is required at this stage{}", .field.label(), .field.hint())]
    RequiredField { field: FieldId },
    #[error("{message}")]
    StructuralInvariant {
        path: &'static str,
        message: String,
        fatal: bool,
    },
    #[error("{}: {reason}", .field.label())]
    ExternalVerification { field: FieldId, reason: String },
}

impl Issue {
    /// Stable path of the offending field, for client-side form binding.
    pub fn path(&self) -> &'static str {
        match self {
            Issue::SealedField { field } => field.path(),
            Issue::RequiredField { field } => field.path(),
            Issue::StructuralInvariant { path, .. } => path,
            Issue::ExternalVerification { field, .. } => field.path(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Issue::StructuralInvariant { fatal: true, .. })
    }
}

/// Blocking errors. Unlike [`Issue`]s these fail fast and are never
/// aggregated.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("signature stage {stage:?} does not apply to a manifest in status {status:?}")]
    InvalidTransition {
        status: ManifestStatus,
        stage: SignatureStage,
    },
    #[error("stage {stage:?} carries a signature already")]
    AlreadySigned { stage: SignatureStage },
    #[error("revision conflict: {0}")]
    RevisionConflict(String),
    #[error("caller is not a concerned party on this manifest")]
    Unauthorized,
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("manifest {0} was modified concurrently, reload and retry")]
    ConcurrentUpdate(String),
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<Issue>),
}
