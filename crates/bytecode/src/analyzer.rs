use crate::{
    BinaryOp, Constant, FrameStack, FrameValue, Instruction, InstructionList, InvokeKind, Label,
    LabelError, Method, NumericKind, STRING_TYPE, StackMapEntry, Type, ValueKind, VerifiedFrame,
    frame::MergeError,
};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::trace;

/// The result of analyzing a method: one frame per instruction, `None` for unreachable code
pub type Frames = Vec<Option<VerifiedFrame>>;

/// The different ways that a method body can fail analysis
#[derive(Error, Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum AnalysisErrorKind {
    #[error("the method's parameters need {needed} local slots, but only {max_locals} are declared")]
    TooManyParameters { needed: usize, max_locals: u16 },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("the stack would exceed its declared maximum of {max_stack} slots")]
    StackOverflow { max_stack: u16 },
    #[error("incompatible stack heights at a join point (expected {expected}, found {found})")]
    IncompatibleStackHeights { expected: usize, found: usize },
    #[error("incompatible stack values at a join point (expected {expected}, found {found})")]
    IncompatibleStackValues {
        expected: FrameValue,
        found: FrameValue,
    },
    #[error("expected {expected}, found {found}")]
    UnexpectedType { expected: String, found: FrameValue },
    #[error("local {index} is out of range (max_locals is {max_locals})")]
    InvalidLocal { index: u32, max_locals: u16 },
    #[error("'{op}' isn't defined for {kind} values")]
    InvalidOperation { op: BinaryOp, kind: NumericKind },
    #[error("{0} is not a reference type")]
    ExpectedReferenceType(Type),
    #[error("the return doesn't match the method's return type {0}")]
    ReturnMismatch(String),
    #[error("execution can fall off the end of the method")]
    FallOffEnd,
    #[error("unsupported instruction '{0}'")]
    UnsupportedInstruction(&'static str),
    #[error("the stack map entry for {0} doesn't match the analyzed frame")]
    StackMapMismatch(Label),
    #[error(transparent)]
    Label(#[from] LabelError),
}

/// An error produced by the [Analyzer], with the position of the offending instruction
#[derive(Error, Clone, Debug, PartialEq)]
#[error("at instruction {position}: {kind}")]
pub struct AnalysisError {
    /// The position in the instruction list where the error was found
    pub position: usize,
    /// The kind of error
    pub kind: AnalysisErrorKind,
}

type Result<T> = std::result::Result<T, AnalysisError>;

/// Computes the types of the operand stack and local slots at every instruction in a method
///
/// The analyzer is an abstract interpreter: starting from the method's entry frame it follows
/// every control flow edge, merging frames where paths join, until a fixed point is reached.
/// Any type error found along the way fails the analysis.
///
/// The same rules are applied by the runtime's loader when verifying methods.
pub struct Analyzer<'a> {
    owner: &'a str,
    method: &'a Method,
    label_positions: FxHashMap<Label, usize>,
    frames: Frames,
    worklist: Vec<usize>,
    queued: Vec<bool>,
    // The position of the instruction currently being analyzed
    position: usize,
}

impl<'a> Analyzer<'a> {
    /// Analyzes a method declared in the unit named `owner`
    pub fn analyze(owner: &'a str, method: &'a Method) -> Result<Frames> {
        let instruction_count = method.instructions.len();

        let label_positions = method
            .instructions
            .label_positions()
            .map_err(|error| AnalysisError {
                position: 0,
                kind: error.into(),
            })?;

        let mut analyzer = Self {
            owner,
            method,
            label_positions,
            frames: vec![None; instruction_count],
            worklist: Vec::new(),
            queued: vec![false; instruction_count],
            position: 0,
        };

        let entry = analyzer.entry_frame()?;
        if instruction_count == 0 {
            return analyzer.error(AnalysisErrorKind::FallOffEnd);
        }
        analyzer.flow_into(0, &entry)?;

        while let Some(position) = analyzer.worklist.pop() {
            analyzer.queued[position] = false;
            analyzer.position = position;
            analyzer.step()?;
        }

        trace!(
            method = %method.signature(),
            reachable = analyzer.frames.iter().filter(|f| f.is_some()).count(),
            "analyzed"
        );

        Ok(analyzer.frames)
    }

    fn entry_frame(&self) -> Result<VerifiedFrame> {
        let max_locals = self.method.max_locals;
        let mut locals = Vec::with_capacity(max_locals as usize);

        if !self.method.access.is_static() {
            locals.push(FrameValue::Reference(Type::object(self.owner)));
        }

        for param in self.method.descriptor.params.iter() {
            let value = FrameValue::from_type(param);
            let wide = value.is_wide();
            locals.push(value);
            if wide {
                locals.push(FrameValue::Top);
            }
        }

        if locals.len() > max_locals as usize {
            return self.error(AnalysisErrorKind::TooManyParameters {
                needed: locals.len(),
                max_locals,
            });
        }

        locals.resize(max_locals as usize, FrameValue::Top);

        Ok(VerifiedFrame {
            locals,
            stack: FrameStack::new(),
        })
    }

    fn step(&mut self) -> Result<()> {
        use Instruction::*;

        let position = self.position;
        let Some(mut frame) = self.frames[position].clone() else {
            return Ok(());
        };
        let method = self.method;
        let instruction = &method.instructions[position];

        match instruction {
            Label(_) | Nop => {}
            Const(constant) => {
                let value = match constant {
                    Constant::Null => FrameValue::Null,
                    Constant::Int(_) => FrameValue::Int,
                    Constant::Long(_) => FrameValue::Long,
                    Constant::Float(_) => FrameValue::Float,
                    Constant::Double(_) => FrameValue::Double,
                    Constant::String(_) => FrameValue::Reference(Type::object(STRING_TYPE)),
                };
                self.push(&mut frame, value)?;
            }
            Load { kind, index } => {
                let value = self.local(&frame, *kind, *index)?;
                self.push(&mut frame, value)?;
            }
            Store { kind, index } => {
                let value = self.pop_kind(&mut frame, *kind)?;
                self.store(&mut frame, *index, value)?;
            }
            Increment { index, .. } => {
                self.local(&frame, ValueKind::Int, *index)?;
            }
            Pop => {
                self.pop_category_1(&mut frame)?;
            }
            Pop2 => {
                if !self.peek(&frame)?.is_wide() {
                    self.pop_category_1(&mut frame)?;
                    self.pop_category_1(&mut frame)?;
                } else {
                    self.pop(&mut frame)?;
                }
            }
            Dup => {
                let value = self.pop_category_1(&mut frame)?;
                self.push(&mut frame, value.clone())?;
                self.push(&mut frame, value)?;
            }
            DupX1 => {
                let v1 = self.pop_category_1(&mut frame)?;
                let v2 = self.pop_category_1(&mut frame)?;
                self.push_all(&mut frame, [v1.clone(), v2, v1])?;
            }
            DupX2 => {
                let v1 = self.pop_category_1(&mut frame)?;
                if self.peek(&frame)?.is_wide() {
                    let v2 = self.pop(&mut frame)?;
                    self.push_all(&mut frame, [v1.clone(), v2, v1])?;
                } else {
                    let v2 = self.pop_category_1(&mut frame)?;
                    let v3 = self.pop_category_1(&mut frame)?;
                    self.push_all(&mut frame, [v1.clone(), v3, v2, v1])?;
                }
            }
            Dup2 => {
                if self.peek(&frame)?.is_wide() {
                    let v1 = self.pop(&mut frame)?;
                    self.push_all(&mut frame, [v1.clone(), v1])?;
                } else {
                    let v1 = self.pop_category_1(&mut frame)?;
                    let v2 = self.pop_category_1(&mut frame)?;
                    self.push_all(&mut frame, [v2.clone(), v1.clone(), v2, v1])?;
                }
            }
            Swap => {
                let v1 = self.pop_category_1(&mut frame)?;
                let v2 = self.pop_category_1(&mut frame)?;
                self.push_all(&mut frame, [v1, v2])?;
            }
            Binary { op, kind } => {
                if op.is_integral_only() && matches!(kind, NumericKind::Float | NumericKind::Double)
                {
                    return self.error(AnalysisErrorKind::InvalidOperation {
                        op: *op,
                        kind: *kind,
                    });
                }
                if op.is_shift() {
                    self.pop_kind(&mut frame, ValueKind::Int)?;
                } else {
                    self.pop_kind(&mut frame, (*kind).into())?;
                }
                let value = self.pop_kind(&mut frame, (*kind).into())?;
                self.push(&mut frame, value)?;
            }
            Negate(kind) => {
                let value = self.pop_kind(&mut frame, (*kind).into())?;
                self.push(&mut frame, value)?;
            }
            Convert { from, to } => {
                self.pop_kind(&mut frame, (*from).into())?;
                self.push(&mut frame, numeric_value(*to))?;
            }
            Compare { kind, .. } => {
                self.pop_kind(&mut frame, (*kind).into())?;
                self.pop_kind(&mut frame, (*kind).into())?;
                self.push(&mut frame, FrameValue::Int)?;
            }
            If { .. } => {
                self.pop_kind(&mut frame, ValueKind::Int)?;
            }
            IfCompare { .. } => {
                self.pop_kind(&mut frame, ValueKind::Int)?;
                self.pop_kind(&mut frame, ValueKind::Int)?;
            }
            IfReferenceEqual { .. } => {
                self.pop_kind(&mut frame, ValueKind::Reference)?;
                self.pop_kind(&mut frame, ValueKind::Reference)?;
            }
            IfNull { .. } => {
                self.pop_kind(&mut frame, ValueKind::Reference)?;
            }
            Goto(_) => {}
            Jsr(_) | Ret(_) => {
                return self.error(AnalysisErrorKind::UnsupportedInstruction(
                    instruction.name(),
                ));
            }
            TableSwitch { .. } | LookupSwitch { .. } => {
                self.pop_kind(&mut frame, ValueKind::Int)?;
            }
            Invoke { kind, method } => {
                for param in method.descriptor.params.iter().rev() {
                    self.pop_type(&mut frame, param)?;
                }
                if *kind == InvokeKind::Virtual {
                    self.pop_type(&mut frame, &Type::object(method.owner.as_str()))?;
                }
                if let Some(returns) = &method.descriptor.returns {
                    self.push(&mut frame, FrameValue::from_type(returns))?;
                }
            }
            NewArray(element) => {
                self.pop_kind(&mut frame, ValueKind::Int)?;
                self.push(&mut frame, FrameValue::Reference(Type::array(element.clone())))?;
            }
            ArrayLength => {
                self.pop_array(&mut frame, None)?;
                self.push(&mut frame, FrameValue::Int)?;
            }
            ArrayLoad(kind) => {
                self.pop_kind(&mut frame, ValueKind::Int)?;
                let element = self.pop_array(&mut frame, Some(*kind))?;
                let value = match element {
                    Some(element) => FrameValue::from_type(&element),
                    None => match kind {
                        ValueKind::Reference => FrameValue::Null,
                        _ => kind_value(*kind),
                    },
                };
                self.push(&mut frame, value)?;
            }
            ArrayStore(kind) => {
                self.pop_kind(&mut frame, *kind)?;
                self.pop_kind(&mut frame, ValueKind::Int)?;
                self.pop_array(&mut frame, Some(*kind))?;
            }
            CheckCast(t) => {
                if !t.is_reference() {
                    return self.error(AnalysisErrorKind::ExpectedReferenceType(t.clone()));
                }
                self.pop_kind(&mut frame, ValueKind::Reference)?;
                self.push(&mut frame, FrameValue::Reference(t.clone()))?;
            }
            InstanceOf(t) => {
                if !t.is_reference() {
                    return self.error(AnalysisErrorKind::ExpectedReferenceType(t.clone()));
                }
                self.pop_kind(&mut frame, ValueKind::Reference)?;
                self.push(&mut frame, FrameValue::Int)?;
            }
            Throw | MonitorEnter | MonitorExit => {
                self.pop_kind(&mut frame, ValueKind::Reference)?;
            }
            Return(kind) => self.check_return(&mut frame, *kind)?,
        }

        for target in instruction.jump_targets() {
            let target_position = self.label_positions[&target];
            self.flow_into(target_position, &frame)?;
        }

        if instruction.falls_through() {
            let next = position + 1;
            if next == self.frames.len() {
                return self.error(AnalysisErrorKind::FallOffEnd);
            }
            self.flow_into(next, &frame)?;
        }

        Ok(())
    }

    fn flow_into(&mut self, target: usize, frame: &VerifiedFrame) -> Result<()> {
        let position = self.position;
        let changed = match &mut self.frames[target] {
            Some(existing) => existing.merge_from(frame).map_err(|error| {
                let kind = match error {
                    MergeError::StackHeight { expected, found } => {
                        AnalysisErrorKind::IncompatibleStackHeights { expected, found }
                    }
                    MergeError::StackValue { expected, found } => {
                        AnalysisErrorKind::IncompatibleStackValues { expected, found }
                    }
                };
                AnalysisError { position, kind }
            })?,
            None => {
                self.frames[target] = Some(frame.clone());
                true
            }
        };

        if changed && !self.queued[target] {
            self.queued[target] = true;
            self.worklist.push(target);
        }

        Ok(())
    }

    fn check_return(&self, frame: &mut VerifiedFrame, kind: Option<ValueKind>) -> Result<()> {
        match (&self.method.descriptor.returns, kind) {
            (None, None) => Ok(()),
            (Some(returns), Some(kind)) if returns.value_kind() == kind => {
                self.pop_type(frame, returns).map(|_| ())
            }
            (returns, _) => self.error(AnalysisErrorKind::ReturnMismatch(match returns {
                Some(returns) => returns.to_string(),
                None => "V".into(),
            })),
        }
    }

    fn local(&self, frame: &VerifiedFrame, kind: ValueKind, index: u16) -> Result<FrameValue> {
        self.check_local_index(index, kind.is_wide())?;

        let value = &frame.locals[index as usize];
        if value_has_kind(value, kind) {
            Ok(value.clone())
        } else {
            self.error(AnalysisErrorKind::UnexpectedType {
                expected: format!("{kind} in local {index}"),
                found: value.clone(),
            })
        }
    }

    fn store(&self, frame: &mut VerifiedFrame, index: u16, value: FrameValue) -> Result<()> {
        let wide = value.is_wide();
        self.check_local_index(index, wide)?;

        let index = index as usize;
        if index > 0 && frame.locals[index - 1].is_wide() {
            frame.locals[index - 1] = FrameValue::Top;
        }
        if wide {
            frame.locals[index + 1] = FrameValue::Top;
        }
        frame.locals[index] = value;

        Ok(())
    }

    fn check_local_index(&self, index: u16, wide: bool) -> Result<()> {
        let last = index as u32 + wide as u32;
        if last < self.method.max_locals as u32 {
            Ok(())
        } else {
            self.error(AnalysisErrorKind::InvalidLocal {
                index: last,
                max_locals: self.method.max_locals,
            })
        }
    }

    fn push(&self, frame: &mut VerifiedFrame, value: FrameValue) -> Result<()> {
        frame.stack.push(value);
        if frame.stack_slots() > self.method.max_stack as usize {
            self.error(AnalysisErrorKind::StackOverflow {
                max_stack: self.method.max_stack,
            })
        } else {
            Ok(())
        }
    }

    fn push_all<const N: usize>(
        &self,
        frame: &mut VerifiedFrame,
        values: [FrameValue; N],
    ) -> Result<()> {
        for value in values {
            self.push(frame, value)?;
        }
        Ok(())
    }

    fn peek<'f>(&self, frame: &'f VerifiedFrame) -> Result<&'f FrameValue> {
        match frame.stack.last() {
            Some(value) => Ok(value),
            None => self.error(AnalysisErrorKind::StackUnderflow),
        }
    }

    fn pop(&self, frame: &mut VerifiedFrame) -> Result<FrameValue> {
        match frame.stack.pop() {
            Some(value) => Ok(value),
            None => self.error(AnalysisErrorKind::StackUnderflow),
        }
    }

    fn pop_category_1(&self, frame: &mut VerifiedFrame) -> Result<FrameValue> {
        let value = self.pop(frame)?;
        if value.is_wide() {
            self.error(AnalysisErrorKind::UnexpectedType {
                expected: "a single slot value".into(),
                found: value,
            })
        } else {
            Ok(value)
        }
    }

    fn pop_kind(&self, frame: &mut VerifiedFrame, kind: ValueKind) -> Result<FrameValue> {
        let value = self.pop(frame)?;
        if value_has_kind(&value, kind) {
            Ok(value)
        } else {
            self.error(AnalysisErrorKind::UnexpectedType {
                expected: kind.to_string(),
                found: value,
            })
        }
    }

    fn pop_type(&self, frame: &mut VerifiedFrame, expected: &Type) -> Result<FrameValue> {
        let value = self.pop(frame)?;
        if FrameValue::from_type(expected).is_assignable_from(&value) {
            Ok(value)
        } else {
            self.error(AnalysisErrorKind::UnexpectedType {
                expected: expected.to_string(),
                found: value,
            })
        }
    }

    // Pops an array reference, returning its element type if known
    //
    // A null array is accepted and has no known element type.
    fn pop_array(&self, frame: &mut VerifiedFrame, kind: Option<ValueKind>) -> Result<Option<Type>> {
        let value = self.pop(frame)?;
        match &value {
            FrameValue::Null => return Ok(None),
            FrameValue::Reference(Type::Array(element)) => {
                if kind.is_none_or(|kind| element.value_kind() == kind) {
                    return Ok(Some(element.as_ref().clone()));
                }
            }
            _ => {}
        }

        self.error(AnalysisErrorKind::UnexpectedType {
            expected: match kind {
                Some(kind) => format!("{kind} array"),
                None => "array".into(),
            },
            found: value,
        })
    }

    fn error<T>(&self, kind: AnalysisErrorKind) -> Result<T> {
        Err(self.make_error(kind))
    }

    fn make_error(&self, kind: AnalysisErrorKind) -> AnalysisError {
        AnalysisError {
            position: self.position,
            kind,
        }
    }
}

fn value_has_kind(value: &FrameValue, kind: ValueKind) -> bool {
    match kind {
        ValueKind::Reference => value.is_reference(),
        _ => value.kind() == Some(kind),
    }
}

fn kind_value(kind: ValueKind) -> FrameValue {
    match kind {
        ValueKind::Int => FrameValue::Int,
        ValueKind::Long => FrameValue::Long,
        ValueKind::Float => FrameValue::Float,
        ValueKind::Double => FrameValue::Double,
        ValueKind::Reference => FrameValue::object(),
    }
}

fn numeric_value(kind: NumericKind) -> FrameValue {
    kind_value(kind.into())
}

/// The maximum number of operand stack slots used by any reachable instruction
pub fn compute_max_stack(frames: &[Option<VerifiedFrame>]) -> usize {
    frames
        .iter()
        .flatten()
        .map(VerifiedFrame::stack_slots)
        .max()
        .unwrap_or(0)
}

/// Builds stack map entries for every reachable label that is the target of a jump
pub fn compute_stack_map(
    instructions: &InstructionList,
    frames: &[Option<VerifiedFrame>],
) -> Vec<StackMapEntry> {
    let targets: FxHashSet<Label> = instructions
        .iter()
        .flat_map(Instruction::jump_targets)
        .collect();

    instructions
        .iter()
        .zip(frames.iter())
        .filter_map(|(instruction, frame)| match (instruction, frame) {
            (Instruction::Label(label), Some(frame)) if targets.contains(label) => {
                Some(StackMapEntry {
                    label: *label,
                    locals: frame.locals.clone(),
                    stack: frame.stack.to_vec(),
                })
            }
            _ => None,
        })
        .collect()
}

/// Checks that a method's stack map entries are consistent with its analyzed frames
///
/// Each recorded value must be assignable from the analyzed value at the entry's label.
/// Entries for unreachable labels aren't checked.
pub fn check_stack_map(method: &Method, frames: &[Option<VerifiedFrame>]) -> Result<()> {
    for entry in method.stack_map.iter() {
        let Some(position) = method
            .instructions
            .iter()
            .position(|instruction| *instruction == Instruction::Label(entry.label))
        else {
            return Err(AnalysisError {
                position: 0,
                kind: LabelError::Undefined(entry.label).into(),
            });
        };

        let Some(frame) = &frames[position] else {
            continue;
        };

        let consistent = entry.stack.len() == frame.stack.len()
            && entry.locals.len() <= frame.locals.len()
            && entry
                .stack
                .iter()
                .zip(frame.stack.iter())
                .chain(entry.locals.iter().zip(frame.locals.iter()))
                .all(|(recorded, analyzed)| recorded.is_assignable_from(analyzed));

        if !consistent {
            return Err(AnalysisError {
                position,
                kind: AnalysisErrorKind::StackMapMismatch(entry.label),
            });
        }
    }

    Ok(())
}
