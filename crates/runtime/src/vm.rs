use crate::{
    Array, ErrorKind, Object, Result, Value, error::Error, library, runtime_error,
};
use coil_bytecode::{
    Analyzer, AnalysisError, BinaryOp, CompiledUnit, Constant, Instruction, InvokeKind, Label,
    Method, MethodDescriptor, MethodRef, NumericKind, Type, UnitReader, check_stack_map,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::{cmp::Ordering, fmt, rc::Rc};
use tracing::{debug, trace};

/// A function provided by the host that can be invoked by executed code
///
/// Virtual natives receive their receiver as the first argument.
pub type NativeFunction = Rc<dyn Fn(&[Value]) -> Result<Option<Value>>>;

type ValueStack = SmallVec<[Value; 8]>;

enum ControlFlow {
    Continue,
    Jump(Label),
    Return(Option<Value>),
}

/// The configurable settings that should be used by the Coil runtime
#[derive(Clone, Debug)]
pub struct VmSettings {
    /// The maximum depth of nested method calls
    ///
    /// If the limit is reached then a [CallDepthLimit](ErrorKind::CallDepthLimit) error will be
    /// returned.
    ///
    /// Default: `256`
    pub max_call_depth: usize,

    /// An optional limit on the number of instructions that a single call is allowed to execute
    ///
    /// If the limit is reached without execution ending,
    /// then an [InstructionLimit](ErrorKind::InstructionLimit) error will be returned.
    ///
    /// Default: `None`
    pub instruction_limit: Option<u64>,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            instruction_limit: None,
        }
    }
}

// A unit that has passed verification, along with the label positions of each method
struct LoadedUnit {
    unit: CompiledUnit,
    label_positions: Vec<FxHashMap<Label, usize>>,
}

// The operand stack and locals of a method that's being executed
struct Frame {
    stack: ValueStack,
    locals: Vec<Value>,
}

/// The Coil runtime's virtual machine
///
/// Units are verified when they're loaded, using the same frame analysis that the instrumenter
/// relies on, so executed code is known to be type-correct.
pub struct Vm {
    settings: VmSettings,
    units: FxHashMap<String, Rc<LoadedUnit>>,
    natives: FxHashMap<MethodRef, NativeFunction>,
    call_depth: usize,
    executed_instructions: u64,
}

impl Default for Vm {
    fn default() -> Self {
        Self::with_settings(VmSettings::default())
    }
}

impl Vm {
    /// Makes a VM with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a VM with the given settings
    pub fn with_settings(settings: VmSettings) -> Self {
        let mut natives = FxHashMap::default();
        library::register(&mut natives);

        Self {
            settings,
            units: FxHashMap::default(),
            natives,
            call_depth: 0,
            executed_instructions: 0,
        }
    }

    /// Reads, verifies and loads a serialized unit, returning the unit's name
    pub fn load(&mut self, bytes: &[u8]) -> Result<String> {
        let unit = UnitReader::read(bytes)?;
        let name = unit.name.clone();
        self.load_unit(unit)?;
        Ok(name)
    }

    /// Verifies and loads a unit
    ///
    /// A previously loaded unit with the same name is replaced.
    pub fn load_unit(&mut self, unit: CompiledUnit) -> Result<()> {
        let mut label_positions = Vec::with_capacity(unit.methods.len());

        for method in unit.methods.iter() {
            let verification_error = |source: AnalysisError| {
                Error::from(ErrorKind::Verification {
                    method: format!("{}.{}", unit.name, method.signature()),
                    source,
                })
            };

            if !method.access.has_no_body() {
                let frames = Analyzer::analyze(&unit.name, method).map_err(verification_error)?;
                check_stack_map(method, &frames).map_err(verification_error)?;
            }

            let positions = method.instructions.label_positions().map_err(|error| {
                verification_error(AnalysisError {
                    position: 0,
                    kind: error.into(),
                })
            })?;
            label_positions.push(positions);
        }

        debug!(unit = %unit.name, methods = unit.methods.len(), "loaded unit");

        self.units.insert(
            unit.name.clone(),
            Rc::new(LoadedUnit {
                unit,
                label_positions,
            }),
        );

        Ok(())
    }

    /// Returns a loaded unit
    pub fn unit(&self, name: &str) -> Option<&CompiledUnit> {
        self.units.get(name).map(|loaded| &loaded.unit)
    }

    /// Registers a native function, replacing any existing native for the same method
    ///
    /// Natives take precedence over methods declared in loaded units.
    pub fn register_native(
        &mut self,
        method: MethodRef,
        f: impl Fn(&[Value]) -> Result<Option<Value>> + 'static,
    ) {
        self.natives.insert(method, Rc::new(f));
    }

    /// Calls a method declared in a loaded unit
    ///
    /// For instance methods the receiver should be provided as the first argument.
    pub fn call(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let descriptor: MethodDescriptor = match descriptor.parse() {
            Ok(descriptor) => descriptor,
            Err(error) => return runtime_error!("invalid descriptor '{descriptor}': {error}"),
        };
        let method = MethodRef::new(owner, name, descriptor);

        let (unit, index) = self.find_method(&method)?;
        let declared = &unit.unit.methods[index];
        let kind = if declared.access.is_static() {
            InvokeKind::Static
        } else {
            InvokeKind::Virtual
        };

        check_args(&method, kind, args)?;

        if self.call_depth == 0 {
            self.executed_instructions = 0;
        }

        self.invoke(kind, &method, args.to_vec())
    }

    fn find_method(&self, method: &MethodRef) -> Result<(Rc<LoadedUnit>, usize)> {
        self.units
            .get(&method.owner)
            .and_then(|loaded| {
                loaded
                    .unit
                    .methods
                    .iter()
                    .position(|m| m.name == method.name && m.descriptor == method.descriptor)
                    .map(|index| (loaded.clone(), index))
            })
            .ok_or_else(|| ErrorKind::UnknownMethod(method.to_string()).into())
    }

    fn invoke(
        &mut self,
        kind: InvokeKind,
        method: &MethodRef,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        if kind == InvokeKind::Virtual && args.first().is_none_or(Value::is_null) {
            return Err(ErrorKind::NullReference.into());
        }

        if let Some(native) = self.natives.get(method).cloned() {
            return native(&args);
        }

        let (unit, index) = self.find_method(method)?;
        let declared = &unit.unit.methods[index];

        if declared.access.has_no_body() {
            return Err(ErrorKind::UnknownMethod(method.to_string()).into());
        }
        if declared.access.is_static() != (kind == InvokeKind::Static) {
            return runtime_error!("'{method}' can't be invoked as {kind:?}");
        }

        if self.call_depth >= self.settings.max_call_depth {
            return Err(ErrorKind::CallDepthLimit(self.settings.max_call_depth).into());
        }

        trace!(%method, depth = self.call_depth, "calling");

        self.call_depth += 1;
        let result = self.execute(&unit, index, args);
        self.call_depth -= 1;

        result
    }

    fn execute(&mut self, unit: &LoadedUnit, index: usize, args: Vec<Value>) -> Result<Option<Value>> {
        let method = &unit.unit.methods[index];
        let labels = &unit.label_positions[index];

        let mut frame = Frame {
            stack: ValueStack::new(),
            locals: Vec::with_capacity(method.max_locals as usize),
        };

        for arg in args {
            let wide = arg.is_wide();
            frame.locals.push(arg);
            if wide {
                frame.locals.push(Value::Null);
            }
        }
        frame
            .locals
            .resize(frame.locals.len().max(method.max_locals as usize), Value::Null);

        let mut ip = 0;
        loop {
            let Some(instruction) = method.instructions.get(ip) else {
                return runtime_error!("execution fell off the end of the method");
            };

            let flow = match self.execute_instruction(&mut frame, instruction) {
                Ok(flow) => flow,
                Err(mut error) => {
                    error.extend_trace(method_name(&unit.unit, method), ip);
                    return Err(error);
                }
            };

            match flow {
                ControlFlow::Continue => ip += 1,
                ControlFlow::Jump(label) => match labels.get(&label) {
                    Some(position) => ip = *position,
                    None => return runtime_error!("undefined label {label}"),
                },
                ControlFlow::Return(value) => return Ok(value),
            }
        }
    }

    fn execute_instruction(
        &mut self,
        frame: &mut Frame,
        instruction: &Instruction,
    ) -> Result<ControlFlow> {
        use Instruction::*;

        if let Some(limit) = self.settings.instruction_limit {
            self.executed_instructions += 1;
            if self.executed_instructions > limit {
                return Err(ErrorKind::InstructionLimit(limit).into());
            }
        }

        match instruction {
            Label(_) | Nop => {}
            Const(constant) => {
                let value = match constant {
                    Constant::Null => Value::Null,
                    Constant::Int(n) => Value::Int(*n),
                    Constant::Long(n) => Value::Long(*n),
                    Constant::Float(n) => Value::Float(*n),
                    Constant::Double(n) => Value::Double(*n),
                    Constant::String(s) => Value::string(s.as_str()),
                };
                frame.push(value);
            }
            Load { index, .. } => {
                let value = frame.local(*index)?.clone();
                frame.push(value);
            }
            Store { index, .. } => {
                let value = frame.pop()?;
                *frame.local_mut(*index)? = value;
            }
            Increment { index, delta } => {
                let local = frame.local_mut(*index)?;
                match local {
                    Value::Int(n) => *n = n.wrapping_add(*delta as i32),
                    other => return runtime_error!("expected an int local, found {other}"),
                }
            }
            Pop => {
                frame.pop()?;
            }
            Pop2 => {
                if !frame.pop()?.is_wide() {
                    frame.pop()?;
                }
            }
            Dup => {
                let value = frame.peek()?.clone();
                frame.push(value);
            }
            DupX1 => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                frame.push_all([v1.clone(), v2, v1]);
            }
            DupX2 => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                if v2.is_wide() {
                    frame.push_all([v1.clone(), v2, v1]);
                } else {
                    let v3 = frame.pop()?;
                    frame.push_all([v1.clone(), v3, v2, v1]);
                }
            }
            Dup2 => {
                let v1 = frame.pop()?;
                if v1.is_wide() {
                    frame.push_all([v1.clone(), v1]);
                } else {
                    let v2 = frame.pop()?;
                    frame.push_all([v2.clone(), v1.clone(), v2, v1]);
                }
            }
            Swap => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                frame.push_all([v1, v2]);
            }
            Binary { op, kind } => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                frame.push(run_binary_op(*op, *kind, lhs, rhs)?);
            }
            Negate(_) => {
                let value = match frame.pop()? {
                    Value::Int(n) => Value::Int(n.wrapping_neg()),
                    Value::Long(n) => Value::Long(n.wrapping_neg()),
                    Value::Float(n) => Value::Float(-n),
                    Value::Double(n) => Value::Double(-n),
                    other => return runtime_error!("unable to negate {other}"),
                };
                frame.push(value);
            }
            Convert { to, .. } => {
                let value = frame.pop()?;
                frame.push(convert(value, *to)?);
            }
            Compare {
                nan_is_greater, ..
            } => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                let ordering = match (&lhs, &rhs) {
                    (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                    (Value::Long(a), Value::Long(b)) => a.partial_cmp(b),
                    (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                    (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
                    _ => return runtime_error!("unable to compare {lhs} and {rhs}"),
                };
                let result = match ordering {
                    Some(Ordering::Less) => -1,
                    Some(Ordering::Equal) => 0,
                    Some(Ordering::Greater) => 1,
                    None if *nan_is_greater => 1,
                    None => -1,
                };
                frame.push(Value::Int(result));
            }
            If { condition, target } => {
                let value = frame.pop_int()?;
                if condition.test(value, 0) {
                    return Ok(ControlFlow::Jump(*target));
                }
            }
            IfCompare { condition, target } => {
                let rhs = frame.pop_int()?;
                let lhs = frame.pop_int()?;
                if condition.test(lhs, rhs) {
                    return Ok(ControlFlow::Jump(*target));
                }
            }
            IfReferenceEqual { equal, target } => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                let same = match (&lhs, &rhs) {
                    (Value::Null, Value::Null) => true,
                    (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
                    _ => false,
                };
                if same == *equal {
                    return Ok(ControlFlow::Jump(*target));
                }
            }
            IfNull { null, target } => {
                if frame.pop()?.is_null() == *null {
                    return Ok(ControlFlow::Jump(*target));
                }
            }
            Goto(target) => return Ok(ControlFlow::Jump(*target)),
            Jsr(_) | Ret(_) => {
                return Err(ErrorKind::UnsupportedInstruction(instruction.name()).into());
            }
            TableSwitch {
                low,
                default,
                targets,
            } => {
                let value = frame.pop_int()?;
                let target = usize::try_from(value as i64 - *low as i64)
                    .ok()
                    .and_then(|index| targets.get(index))
                    .unwrap_or(default);
                return Ok(ControlFlow::Jump(*target));
            }
            LookupSwitch { default, cases } => {
                let value = frame.pop_int()?;
                let target = cases
                    .iter()
                    .find(|(case, _)| *case == value)
                    .map_or(default, |(_, target)| target);
                return Ok(ControlFlow::Jump(*target));
            }
            Invoke { kind, method } => {
                let arg_count =
                    method.descriptor.params.len() + (*kind == InvokeKind::Virtual) as usize;
                let Some(first_arg) = frame.stack.len().checked_sub(arg_count) else {
                    return runtime_error!("stack underflow");
                };
                let args = frame.stack.drain(first_arg..).collect();
                if let Some(result) = self.invoke(*kind, method, args)? {
                    frame.push(result);
                }
            }
            NewArray(element) => {
                let length = frame.pop_int()?;
                let Ok(length) = usize::try_from(length) else {
                    return Err(ErrorKind::NegativeArraySize(length).into());
                };
                frame.push(Object::Array(Array::with_length(element.clone(), length)).into());
            }
            ArrayLength => {
                let array = frame.pop()?;
                let length = with_array(&array, |array| Ok(array.len()))?;
                frame.push(Value::Int(length as i32));
            }
            ArrayLoad(_) => {
                let index = frame.pop_int()?;
                let array = frame.pop()?;
                let value = with_array(&array, |array| {
                    array.get(array_index(array, index)?).ok_or_else(|| {
                        ErrorKind::IndexOutOfBounds {
                            index,
                            length: array.len(),
                        }
                        .into()
                    })
                })?;
                frame.push(value);
            }
            ArrayStore(_) => {
                let value = frame.pop()?;
                let index = frame.pop_int()?;
                let array = frame.pop()?;
                with_array(&array, |array| {
                    if !value.is_instance_of(array.element()) {
                        return Err(ErrorKind::ClassCast {
                            expected: array.element().clone(),
                            found: runtime_type(&value),
                        }
                        .into());
                    }
                    array.set(array_index(array, index)?, value);
                    Ok(())
                })?;
            }
            CheckCast(expected) => {
                let value = frame.pop()?;
                if !value.is_instance_of(expected) {
                    return Err(ErrorKind::ClassCast {
                        expected: expected.clone(),
                        found: runtime_type(&value),
                    }
                    .into());
                }
                frame.push(value);
            }
            InstanceOf(expected) => {
                let value = frame.pop()?;
                let result = !value.is_null() && value.is_instance_of(expected);
                frame.push(result.into());
            }
            Throw => {
                let value = frame.pop()?;
                if value.is_null() {
                    return Err(ErrorKind::NullReference.into());
                }
                debug!(%value, "value thrown");
                return Err(ErrorKind::Thrown(value).into());
            }
            // Execution is single threaded, so monitors only need their null checks
            MonitorEnter | MonitorExit => {
                if frame.pop()?.is_null() {
                    return Err(ErrorKind::NullReference.into());
                }
            }
            Return(kind) => {
                let value = match kind {
                    Some(_) => Some(frame.pop()?),
                    None => None,
                };
                return Ok(ControlFlow::Return(value));
            }
        }

        Ok(ControlFlow::Continue)
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut units: Vec<_> = self.units.keys().collect();
        units.sort();
        write!(f, "Vm {{ units: {units:?} }}")
    }
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn push_all<const N: usize>(&mut self, values: [Value; N]) {
        self.stack.extend(values);
    }

    fn peek(&self) -> Result<&Value> {
        match self.stack.last() {
            Some(value) => Ok(value),
            None => runtime_error!("stack underflow"),
        }
    }

    fn pop(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => runtime_error!("stack underflow"),
        }
    }

    fn pop_int(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Int(n) => Ok(n),
            other => runtime_error!("expected an int, found {other}"),
        }
    }

    fn local(&self, index: u16) -> Result<&Value> {
        match self.locals.get(index as usize) {
            Some(value) => Ok(value),
            None => runtime_error!("invalid local {index}"),
        }
    }

    fn local_mut(&mut self, index: u16) -> Result<&mut Value> {
        match self.locals.get_mut(index as usize) {
            Some(value) => Ok(value),
            None => runtime_error!("invalid local {index}"),
        }
    }
}

fn method_name(unit: &CompiledUnit, method: &Method) -> String {
    format!("{}.{}", unit.name, method.signature())
}

fn runtime_type(value: &Value) -> Type {
    match value {
        Value::Object(object) => object.runtime_type(),
        Value::Null => Type::object(coil_bytecode::OBJECT_TYPE),
        Value::Int(_) => Type::Int,
        Value::Long(_) => Type::Long,
        Value::Float(_) => Type::Float,
        Value::Double(_) => Type::Double,
    }
}

fn check_args(method: &MethodRef, kind: InvokeKind, args: &[Value]) -> Result<()> {
    let receiver = (kind == InvokeKind::Virtual).then(|| Type::object(method.owner.as_str()));
    let expected: Vec<Type> = receiver
        .into_iter()
        .chain(method.descriptor.params.iter().cloned())
        .collect();

    let matches = expected.len() == args.len()
        && expected
            .iter()
            .zip(args.iter())
            .all(|(expected, arg)| arg.is_instance_of(expected));

    if matches {
        Ok(())
    } else {
        let types = |types: Vec<String>| format!("({})", types.join(", "));
        Err(ErrorKind::ArgumentMismatch {
            method: method.to_string(),
            expected: types(expected.iter().map(Type::to_string).collect()),
            found: types(args.iter().map(|arg| runtime_type(arg).to_string()).collect()),
        }
        .into())
    }
}

fn with_array<T>(value: &Value, f: impl FnOnce(&Array) -> Result<T>) -> Result<T> {
    match value {
        Value::Null => Err(ErrorKind::NullReference.into()),
        Value::Object(object) => match object.as_ref() {
            Object::Array(array) => f(array),
            other => runtime_error!("expected an array, found {}", other.runtime_type()),
        },
        other => runtime_error!("expected an array, found {other}"),
    }
}

fn array_index(array: &Array, index: i32) -> Result<usize> {
    match usize::try_from(index) {
        Ok(i) if i < array.len() => Ok(i),
        _ => Err(ErrorKind::IndexOutOfBounds {
            index,
            length: array.len(),
        }
        .into()),
    }
}

fn run_binary_op(op: BinaryOp, kind: NumericKind, lhs: Value, rhs: Value) -> Result<Value> {
    use BinaryOp::*;

    let result = match (kind, lhs, rhs) {
        (NumericKind::Int, Value::Int(a), Value::Int(b)) => Value::Int(match op {
            Add => a.wrapping_add(b),
            Subtract => a.wrapping_sub(b),
            Multiply => a.wrapping_mul(b),
            Divide | Remainder if b == 0 => return Err(ErrorKind::DivisionByZero.into()),
            Divide => a.wrapping_div(b),
            Remainder => a.wrapping_rem(b),
            ShiftLeft => a.wrapping_shl(b as u32),
            ShiftRight => a.wrapping_shr(b as u32),
            ShiftRightUnsigned => (a as u32).wrapping_shr(b as u32) as i32,
            And => a & b,
            Or => a | b,
            Xor => a ^ b,
        }),
        (NumericKind::Long, Value::Long(a), Value::Int(b)) if op.is_shift() => {
            Value::Long(match op {
                ShiftLeft => a.wrapping_shl(b as u32),
                ShiftRight => a.wrapping_shr(b as u32),
                _ => (a as u64).wrapping_shr(b as u32) as i64,
            })
        }
        (NumericKind::Long, Value::Long(a), Value::Long(b)) if !op.is_shift() => {
            Value::Long(match op {
                Add => a.wrapping_add(b),
                Subtract => a.wrapping_sub(b),
                Multiply => a.wrapping_mul(b),
                Divide | Remainder if b == 0 => return Err(ErrorKind::DivisionByZero.into()),
                Divide => a.wrapping_div(b),
                Remainder => a.wrapping_rem(b),
                And => a & b,
                Or => a | b,
                _ => a ^ b,
            })
        }
        (NumericKind::Float, Value::Float(a), Value::Float(b)) if !op.is_integral_only() => {
            Value::Float(match op {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                _ => a % b,
            })
        }
        (NumericKind::Double, Value::Double(a), Value::Double(b)) if !op.is_integral_only() => {
            Value::Double(match op {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                _ => a % b,
            })
        }
        (kind, lhs, rhs) => {
            return runtime_error!("unable to perform '{op}' on {kind} values with {lhs} and {rhs}");
        }
    };

    Ok(result)
}

fn convert(value: Value, to: NumericKind) -> Result<Value> {
    macro_rules! cast {
        ($n:expr) => {
            match to {
                NumericKind::Int => Value::Int($n as i32),
                NumericKind::Long => Value::Long($n as i64),
                NumericKind::Float => Value::Float($n as f32),
                NumericKind::Double => Value::Double($n as f64),
            }
        };
    }

    let result = match value {
        Value::Int(n) => cast!(n),
        Value::Long(n) => cast!(n),
        Value::Float(n) => cast!(n),
        Value::Double(n) => cast!(n),
        other => return runtime_error!("unable to convert {other} to {to}"),
    };

    Ok(result)
}
