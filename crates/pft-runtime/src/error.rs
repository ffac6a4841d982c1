//! Runtime error types.

use pft_engine::{ClassFileError, VerifyError};

/// Errors raised while defining classes or running their code.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Class bytes could not be decoded
    #[error("Class format error: {0}")]
    ClassFormat(#[from] ClassFileError),

    /// Class failed structural verification
    #[error("Verify error: {0}")]
    Verify(#[from] VerifyError),

    /// Name passed to the loader differs from the class's own name
    #[error("Wrong name: defined as {expected}, class declares {found}")]
    NameMismatch {
        /// Name handed to the loader
        expected: String,
        /// Name inside the class file
        found: String,
    },

    /// A class with this name is already installed
    #[error("Duplicate class definition: {0}")]
    DuplicateClass(String),

    /// Referenced class is not installed
    #[error("No class definition found: {0}")]
    NoClassDefFound(String),

    /// Method lookup failed
    #[error("No such method: {0}")]
    NoSuchMethod(String),

    /// Field lookup failed
    #[error("No such field: {0}")]
    NoSuchField(String),

    /// Member not accessible from the calling class
    #[error("Illegal access: {0}")]
    IllegalAccess(String),

    /// Selected implementation has no body
    #[error("Abstract method: {0}")]
    AbstractMethod(String),

    /// Cast or assignment to an incompatible type
    #[error("Class cast: {from} cannot be cast to {to}")]
    ClassCast {
        /// Runtime type of the value
        from: String,
        /// Requested type
        to: String,
    },

    /// Class hierarchy changed incompatibly, or a member was used through the wrong owner
    #[error("Incompatible class change: {0}")]
    IncompatibleClassChange(String),

    /// Bootstrap method the interpreter cannot link
    #[error("Unsupported bootstrap method: {0}")]
    UnsupportedBootstrap(String),

    /// Null receiver or operand
    #[error("Null pointer: {0}")]
    NullPointer(String),

    /// Integer division by zero
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Call depth exceeded the configured limit
    #[error("Stack overflow (depth {0})")]
    StackOverflow(usize),

    /// Operand stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Instruction outside the supported subset
    #[error("Unsupported opcode {0}")]
    UnsupportedOpcode(String),

    /// Operand of the wrong kind
    #[error("Type error: {0}")]
    TypeError(String),
}

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;
