use thiserror::Error;

/// Invariant violations raised by the scripting core.
///
/// Recoverable script-level failures (unknown variables, bad paths, missing
/// coercion methods) never surface here; they degrade to `Undefined` or a
/// no-op and are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("local variable names must not be empty")]
    EmptyLocalName,
    #[error("no call frame is active")]
    NoActiveFrame,
    #[error("font `{0}` is already registered")]
    DuplicateFont(String),
    #[error("invalid value `{value}` for attribute `{attribute}`")]
    InvalidAttribute { attribute: String, value: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
