//! Error taxonomy for the marshalling layer.
//!
//! Validation kinds are raised locally before any native call is made for the offending
//! operand. `ModelLoadFailed`, `InputCountMismatch` and `RunFailed` carry the engine's
//! diagnostic text verbatim.

use thiserror::Error;

use crate::engine::EngineStatus;

#[derive(Debug, Error)]
pub enum Error {
    /// Host value is not shaped like a tensor.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Dimension is negative, fractional, out of range, or the product overflows.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Element type cannot cross the host boundary.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// Declared or expected tag disagrees with the host array kind.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Buffer length disagrees with element count times element width.
    #[error("shape/size mismatch: expected {expected} bytes, got {actual}")]
    ShapeSizeMismatch { expected: usize, actual: usize },

    #[error("model already loaded; cannot load a model more than once")]
    AlreadyLoaded,

    #[error("session not initialized")]
    NotInitialized,

    #[error("failed to load model: {0}")]
    ModelLoadFailed(String),

    #[error("input count mismatch: {0}")]
    InputCountMismatch(String),

    #[error("run failed: {0}")]
    RunFailed(String),

    /// Engine failure outside load/run (environment, options, allocator).
    #[error("engine error: {0}")]
    Engine(#[from] EngineStatus),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Flat discriminant of [`Error`], seen through any number of context layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidShape,
    UnsupportedType,
    TypeMismatch,
    ShapeSizeMismatch,
    AlreadyLoaded,
    NotInitialized,
    ModelLoadFailed,
    InputCountMismatch,
    RunFailed,
    Engine,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::InvalidShape(_) => ErrorKind::InvalidShape,
            Error::UnsupportedType(_) => ErrorKind::UnsupportedType,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::ShapeSizeMismatch { .. } => ErrorKind::ShapeSizeMismatch,
            Error::AlreadyLoaded => ErrorKind::AlreadyLoaded,
            Error::NotInitialized => ErrorKind::NotInitialized,
            Error::ModelLoadFailed(_) => ErrorKind::ModelLoadFailed,
            Error::InputCountMismatch(_) => ErrorKind::InputCountMismatch,
            Error::RunFailed(_) => ErrorKind::RunFailed,
            Error::Engine(_) => ErrorKind::Engine,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Innermost error below all context layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Attaches context to the error side of a [`Result`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
