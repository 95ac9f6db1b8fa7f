use serde::{Deserialize, Serialize};

/// Every way a task submission can fail.
///
/// The enum travels between nodes as `{"kind": ..., "message": ...}` so that a
/// failure produced on a remote node reaches the original caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MlError {
    /// A circuit breaker is open or the task registry is full.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// No cluster node could be selected to run the task.
    #[error("dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// The inference/training engine returned an error.
    #[error("engine failure: {0}")]
    EngineFailure(String),

    /// The remote node was unreachable or answered with garbage.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Model or task store I/O failed.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MlError {
    /// Whether this error bumps the failure stats of the task that hit it.
    ///
    /// Not-found and invalid-argument errors are caller mistakes and stay out
    /// of the failure counters; permission denials do count. Transport errors
    /// are accounted for by the node that actually ran the task.
    pub fn counts_as_failure(&self) -> bool {
        match self {
            MlError::NotFound(_) | MlError::InvalidArgument(_) | MlError::TransportFailure(_) => {
                false
            }
            MlError::ResourceExhausted(_)
            | MlError::DispatchFailure(_)
            | MlError::PermissionDenied(_)
            | MlError::EngineFailure(_)
            | MlError::Storage(_)
            | MlError::Internal(_) => true,
        }
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            MlError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            MlError::DispatchFailure(_) => "DISPATCH_FAILURE",
            MlError::NotFound(_) => "NOT_FOUND",
            MlError::PermissionDenied(_) => "PERMISSION_DENIED",
            MlError::InvalidArgument(_) => "INVALID_ARGUMENT",
            MlError::EngineFailure(_) => "ENGINE_FAILURE",
            MlError::TransportFailure(_) => "TRANSPORT_FAILURE",
            MlError::Storage(_) => "STORAGE",
            MlError::Internal(_) => "INTERNAL",
        }
    }
}

pub type MlResult<T> = Result<T, MlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_kind_and_message() {
        let err = MlError::NotFound("No model found, please check the modelId.".to_string());
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["kind"], "NOT_FOUND");
        assert_eq!(json["message"], "No model found, please check the modelId.");
        assert_eq!(json["kind"], err.kind());

        let back: MlError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn failure_accounting_is_asymmetric() {
        assert!(!MlError::NotFound("m".into()).counts_as_failure());
        assert!(!MlError::InvalidArgument("m".into()).counts_as_failure());
        assert!(MlError::PermissionDenied("m".into()).counts_as_failure());
        assert!(MlError::EngineFailure("m".into()).counts_as_failure());
    }
}
