//! Engine error types

use crate::class::ClassId;
use crate::value::ContextToken;
use thiserror::Error;

/// Errors returned by the engine API.
///
/// Script-level failures are always reported as [`EngineError::Thrown`]: the
/// exception itself is pending on the context and can be retrieved with
/// [`EngineContext::take_exception`](crate::EngineContext::take_exception).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A script exception is pending on the context
    #[error("exception pending")]
    Thrown,

    /// The context has been freed
    #[error("context {0} has been freed")]
    ContextFreed(ContextToken),

    /// Class is not registered with this runtime
    #[error("class {0} is not registered")]
    UnknownClass(ClassId),
}

/// Result type for engine operations.
pub type JsResult<T> = Result<T, EngineError>;
