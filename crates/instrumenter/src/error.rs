use coil_bytecode::{AnalysisError, ReadError};
use thiserror::Error;

/// The errors that can be produced while instrumenting a unit
///
/// Any error aborts instrumentation of the whole unit, no partially instrumented output is
/// produced.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    /// The input couldn't be parsed as a unit
    #[error("malformed input: {0}")]
    MalformedInput(#[from] ReadError),
    /// An eligible method contains an instruction that can't be carried across a suspension
    #[error("unsupported instruction '{instruction}' at position {position} in '{method}'")]
    UnsupportedConstruct {
        /// The method's signature
        method: String,
        /// The name of the offending instruction
        instruction: &'static str,
        /// The instruction's position in the method body
        position: usize,
    },
    /// A method failed frame analysis
    #[error("analysis of '{method}'{} failed {source}", stage(.transformed))]
    Analysis {
        /// The method's signature
        method: String,
        /// True if the failure occurred when verifying the instrumented method
        transformed: bool,
        /// The analysis error
        source: AnalysisError,
    },
    /// The instrumented method would exceed the format's limits
    #[error("'{method}' would need {needed} {limit}, the maximum is {}", u16::MAX)]
    LimitExceeded {
        /// The method's signature
        method: String,
        /// The exceeded limit, e.g. 'local slots'
        limit: &'static str,
        /// The required amount
        needed: usize,
    },
}

fn stage(transformed: &bool) -> &'static str {
    if *transformed {
        " after instrumentation"
    } else {
        ""
    }
}

/// The Result type used by the instrumenter
pub type Result<T> = std::result::Result<T, Error>;
