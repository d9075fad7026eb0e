use crate::Value;
use coil_bytecode::{AnalysisError, ReadError, Type};
use std::{error, fmt};
use thiserror::Error;

/// The different error types that can be produced by the Coil runtime
#[derive(Error, Clone)]
#[allow(missing_docs)]
pub enum ErrorKind {
    #[error("{0}")]
    StringError(String),
    #[error("failed to read unit: {0}")]
    MalformedUnit(#[from] ReadError),
    #[error("verification of '{method}' failed {source}")]
    Verification {
        method: String,
        source: AnalysisError,
    },
    /// A value thrown by executed code
    #[error("thrown: {0}")]
    Thrown(Value),
    #[error("null reference")]
    NullReference,
    #[error("index {index} is out of bounds for an array of length {length}")]
    IndexOutOfBounds { index: i32, length: usize },
    #[error("negative array size ({0})")]
    NegativeArraySize(i32),
    #[error("a {found} can't be cast to {expected}")]
    ClassCast { expected: Type, found: Type },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
    #[error("'{method}' expected {expected}, but found {found}")]
    ArgumentMismatch {
        method: String,
        expected: String,
        found: String,
    },
    #[error("the call depth limit ({0}) was exceeded")]
    CallDepthLimit(usize),
    #[error("the instruction limit ({0}) was exceeded")]
    InstructionLimit(u64),
    #[error("unsupported instruction '{0}'")]
    UnsupportedInstruction(&'static str),
    #[error("there's no method state to pop")]
    EmptyStateStack,
    #[error("suspend was called from a method that hasn't been instrumented")]
    UninstrumentedSuspend,
    #[error("the coroutine has already finished")]
    CoroutineFinished,
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An error produced by the Coil runtime
#[derive(Clone, Debug)]
pub struct Error {
    error: ErrorKind,
    trace: Vec<ErrorFrame>,
}

impl Error {
    /// Initializes an error with the given error kind
    pub(crate) fn new(error: ErrorKind) -> Self {
        Self {
            error,
            trace: Vec::new(),
        }
    }

    /// The kind of error
    pub fn kind(&self) -> &ErrorKind {
        &self.error
    }

    /// The methods that were being executed when the error occurred, innermost first
    pub fn trace(&self) -> &[ErrorFrame] {
        &self.trace
    }

    /// Extends the error's trace with the given method and instruction position
    pub(crate) fn extend_trace(&mut self, method: String, position: usize) {
        self.trace.push(ErrorFrame { method, position });
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        for ErrorFrame { method, position } in self.trace.iter() {
            write!(f, "\n--- at '{method}', instruction {position}")?;
        }

        Ok(())
    }
}

impl error::Error for Error {}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Self::new(ErrorKind::StringError(error))
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Self::new(ErrorKind::StringError(error.into()))
    }
}

impl From<ErrorKind> for Error {
    fn from(error: ErrorKind) -> Self {
        Self::new(error)
    }
}

impl From<ReadError> for Error {
    fn from(error: ReadError) -> Self {
        Self::new(error.into())
    }
}

/// A method and instruction position in a call stack where an error occurred
#[derive(Clone, Debug)]
pub struct ErrorFrame {
    /// The signature of the method, including its owner
    pub method: String,
    /// The position of the instruction that was being executed
    pub position: usize,
}

/// The Result type used by the Coil runtime
pub type Result<T> = std::result::Result<T, Error>;

/// Creates a [crate::Error] from a message (with format-like behaviour), wrapped in `Err`
#[macro_export]
macro_rules! runtime_error {
    ($error:literal) => {
        Err($crate::Error::from(format!($error)))
    };
    ($error:expr) => {
        Err($crate::Error::from($error))
    };
    ($error:literal, $($y:expr),+ $(,)?) => {
        Err($crate::Error::from(format!($error, $($y),+)))
    };
}
