//! Error types for the bridge
//!
//! Every failure at the native boundary has a variant here. When a failure
//! happens inside a trampoline it is thrown into the script as an exception
//! whose message is the variant's `Display` text, so these messages are
//! part of the observable surface.

use std::fmt;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of host callback resolved by a trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Function,
    Constructor,
    Method,
    Getter,
    Setter,
}

impl CallbackKind {
    /// Lower-case name used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            CallbackKind::Function => "function",
            CallbackKind::Constructor => "constructor",
            CallbackKind::Method => "method",
            CallbackKind::Getter => "getter",
            CallbackKind::Setter => "setter",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            CallbackKind::Function => "Function",
            CallbackKind::Constructor => "Constructor",
            CallbackKind::Method => "Method",
            CallbackKind::Getter => "Getter",
            CallbackKind::Setter => "Setter",
        }
    }

    fn not_found(&self) -> String {
        match self {
            CallbackKind::Function => "Function not found".to_string(),
            kind => format!("{} function not found", kind.title()),
        }
    }

    fn invalid_type(&self) -> String {
        match self {
            CallbackKind::Function => "Invalid function type".to_string(),
            kind => format!("Invalid {} function type", kind.name()),
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a class member lives on instances or on the constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberScope {
    Instance,
    Static,
}

impl fmt::Display for MemberScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberScope::Instance => f.write_str("instance"),
            MemberScope::Static => f.write_str("static"),
        }
    }
}

/// Bridge errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    // ===== Build-time validation =====
    /// Class built without a name
    #[error("class name cannot be empty")]
    EmptyClassName,

    /// Class built without a constructor
    #[error("constructor function is required")]
    MissingConstructor,

    /// Two members of the same scope share a name
    #[error("duplicate {scope} member '{name}'")]
    DuplicateMember { scope: MemberScope, name: String },

    /// Accessor with neither getter nor setter
    #[error("accessor '{0}' needs a getter or a setter")]
    EmptyAccessor(String),

    // ===== Registry misses =====
    /// Native context token has no live host wrapper
    #[error("Context not found")]
    ContextNotFound,

    /// Native runtime token has no live host wrapper
    #[error("Runtime not found")]
    RuntimeNotFound,

    /// Handle ID does not resolve to a callback
    #[error("{}", .kind.not_found())]
    CallbackNotFound { kind: CallbackKind },

    /// Constructor value is not registered in the class registry
    #[error("Class ID not found")]
    ClassIdNotFound,

    /// Handle ID space exhausted
    #[error("handle store exhausted: no IDs left below {max}")]
    HandleOverflow { max: i32 },

    // ===== Type confusion =====
    /// Handle resolved to an entry of the wrong kind
    #[error("{}", .kind.invalid_type())]
    InvalidCallbackType { kind: CallbackKind },

    /// Value expected to be an object
    #[error("value is not an object")]
    NotAnObject,

    /// Object is not an instance of a bound class
    #[error("object is not a class instance")]
    NotAnInstance,

    /// Instance has no host object attached
    #[error("instance has no bound host object")]
    NoInstanceData,

    /// Bound host object has a different type than requested
    #[error("bound object is not a {expected}")]
    ObjectTypeMismatch { expected: &'static str },

    /// Value conversion failed
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    // ===== Execution =====
    /// Script exception surfaced to the host
    #[error("{name}: {message}")]
    Exception { name: String, message: String },

    /// Failure reported by host callback code
    #[error("{0}")]
    Host(String),

    /// Operation on a context that has been closed
    #[error("context has been closed")]
    ContextClosed,
}

impl Error {
    /// Error reported by host code.
    pub fn host(message: impl Into<String>) -> Self {
        Error::Host(message.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Name of the script error constructor this error is thrown as.
    pub fn script_error_name(&self) -> &str {
        match self {
            Error::Exception { name, .. } => name,
            Error::TypeMismatch { .. }
            | Error::NotAnObject
            | Error::NotAnInstance
            | Error::NoInstanceData
            | Error::ObjectTypeMismatch { .. } => "TypeError",
            Error::ContextNotFound
            | Error::RuntimeNotFound
            | Error::CallbackNotFound { .. }
            | Error::InvalidCallbackType { .. }
            | Error::ClassIdNotFound
            | Error::HandleOverflow { .. }
            | Error::ContextClosed => "InternalError",
            _ => "Error",
        }
    }

    /// Message carried into the script exception.
    pub fn script_message(&self) -> String {
        match self {
            Error::Exception { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Host(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Host(s.to_string())
    }
}
