use thiserror::Error;

/// Failure classes of a single probe check.
///
/// None of these ever leave the checker: each one is folded into a down
/// [`CheckResult`](super::types::CheckResult) so the rest of the cycle keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("malformed request spec: {0}")]
    MalformedSpec(String),
    #[error("probe timed out after {0}s")]
    ExecutionTimeout(u64),
    #[error("probe execution failed: {0}")]
    ExecutionFailure(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("condition evaluation failed: {0}")]
    EvaluationError(String),
}
