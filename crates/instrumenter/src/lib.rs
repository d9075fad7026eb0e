//! Rewrites Coil methods so that they can suspend mid-body and later resume
//!
//! Methods that take the continuation capability as their first parameter are turned into
//! re-entrant state machines. Suspending unwinds the call chain, saving the operand stack and
//! locals of each instrumented frame on the capability. Resuming replays the chain from the
//! outermost method, restoring each frame in turn until execution continues after the
//! suspension point.

#![warn(missing_docs)]

mod codegen;
mod error;
mod instrumenter;
mod locator;
mod metadata;
mod transformer;
mod variable_table;

pub use crate::{
    error::{Error, Result},
    instrumenter::{Instrumenter, InstrumenterSettings},
    locator::{ContinuationPoint, PointKind, check_supported, locate},
    transformer::MethodTransformer,
    variable_table::{EXTRA_SLOTS, VariableTable},
};
