//! Testing utilities for Coil crates

#![warn(missing_docs)]

pub mod asm;
mod builders;
mod unit_dump;

pub use builders::{MethodBuilder, UnitBuilder};
pub use unit_dump::{method_frames, unit_dump};
