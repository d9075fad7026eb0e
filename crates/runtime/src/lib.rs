//! A reference interpreter for Coil units
//!
//! The runtime verifies units as they're loaded, provides the continuation capability and boxing
//! library that instrumented code relies on, and can drive instrumented methods as coroutines.

#![warn(missing_docs)]

mod continuation;
mod coroutine;
mod error;
mod library;
mod value;
mod vm;

pub use crate::{
    continuation::{Continuation, MethodState, mode_name},
    coroutine::{Coroutine, CoroutineState, Resumed},
    error::{Error, ErrorFrame, ErrorKind, Result},
    value::{Array, Object, ObjectRef, Value},
    vm::{NativeFunction, Vm, VmSettings},
};
