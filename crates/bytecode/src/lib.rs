//! Contains Coil's model of compiled units, its binary codec, and the frame analyzer

#![warn(missing_docs)]

mod analyzer;
pub mod continuation;
mod frame;
mod instruction;
mod instruction_list;
mod op;
mod reader;
mod types;
mod unit;
mod writer;

pub use crate::{
    analyzer::{
        AnalysisError, AnalysisErrorKind, Analyzer, Frames, check_stack_map, compute_max_stack,
        compute_stack_map,
    },
    frame::{FrameStack, FrameValue, SlotCategory, VerifiedFrame},
    instruction::{
        BinaryOp, Condition, Constant, Instruction, InvokeKind, Label, MethodRef,
    },
    instruction_list::{Edit, InstructionList, LabelError},
    op::Op,
    reader::{ReadError, UnitReader},
    types::{DescriptorError, MethodDescriptor, NumericKind, OBJECT_TYPE, STRING_TYPE, Type, ValueKind},
    unit::{AccessFlags, CompiledUnit, Method, StackMapEntry, UnitFlags},
    writer::{FORMAT_VERSION, MAGIC, UnitWriter},
};
