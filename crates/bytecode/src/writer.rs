use crate::{
    CompiledUnit, Constant, FrameValue, Instruction, InvokeKind, Label, Method, Op,
    StackMapEntry, ValueKind,
};

/// The bytes that start every serialized unit
pub const MAGIC: &[u8; 4] = b"COIL";
/// The version of the container format produced by the [UnitWriter]
pub const FORMAT_VERSION: u8 = 1;

/// Serializes a [CompiledUnit] into the binary container format
///
/// See [UnitReader](crate::UnitReader) for the reverse direction.
#[derive(Default)]
pub struct UnitWriter {
    bytes: Vec<u8>,
}

impl UnitWriter {
    /// Serializes the unit
    pub fn write(unit: &CompiledUnit) -> Vec<u8> {
        let mut writer = Self::default();
        writer.write_unit(unit);
        writer.bytes
    }

    fn write_unit(&mut self, unit: &CompiledUnit) {
        self.bytes.extend_from_slice(MAGIC);
        self.push_u8(FORMAT_VERSION);
        self.push_u8(unit.flags.0);
        self.push_string(&unit.name);

        self.push_len(unit.methods.len());
        for method in unit.methods.iter() {
            self.write_method(method);
        }
    }

    fn write_method(&mut self, method: &Method) {
        self.bytes.extend_from_slice(&method.access.0.to_le_bytes());
        self.push_string(&method.name);
        self.push_string(&method.descriptor.to_string());
        self.push_var_u32(method.max_stack.into());
        self.push_var_u32(method.max_locals.into());

        self.push_len(method.instructions.len());
        for instruction in method.instructions.iter() {
            self.write_instruction(instruction);
        }

        self.push_len(method.stack_map.len());
        for entry in method.stack_map.iter() {
            self.write_stack_map_entry(entry);
        }
    }

    fn write_instruction(&mut self, instruction: &Instruction) {
        use Instruction::*;

        match instruction {
            Label(label) => {
                self.push_op(Op::Label);
                self.push_label(*label);
            }
            Nop => self.push_op(Op::Nop),
            Const(constant) => match constant {
                Constant::Null => self.push_op(Op::ConstNull),
                Constant::Int(n) => {
                    self.push_op(Op::ConstInt);
                    self.bytes.extend_from_slice(&n.to_le_bytes());
                }
                Constant::Long(n) => {
                    self.push_op(Op::ConstLong);
                    self.bytes.extend_from_slice(&n.to_le_bytes());
                }
                Constant::Float(n) => {
                    self.push_op(Op::ConstFloat);
                    self.bytes.extend_from_slice(&n.to_bits().to_le_bytes());
                }
                Constant::Double(n) => {
                    self.push_op(Op::ConstDouble);
                    self.bytes.extend_from_slice(&n.to_bits().to_le_bytes());
                }
                Constant::String(s) => {
                    self.push_op(Op::ConstString);
                    self.push_string(s);
                }
            },
            Load { kind, index } => {
                self.push_op(Op::Load);
                self.push_kind(*kind);
                self.push_var_u32((*index).into());
            }
            Store { kind, index } => {
                self.push_op(Op::Store);
                self.push_kind(*kind);
                self.push_var_u32((*index).into());
            }
            Increment { index, delta } => {
                self.push_op(Op::Increment);
                self.push_var_u32((*index).into());
                self.bytes.extend_from_slice(&delta.to_le_bytes());
            }
            Pop => self.push_op(Op::Pop),
            Pop2 => self.push_op(Op::Pop2),
            Dup => self.push_op(Op::Dup),
            DupX1 => self.push_op(Op::DupX1),
            DupX2 => self.push_op(Op::DupX2),
            Dup2 => self.push_op(Op::Dup2),
            Swap => self.push_op(Op::Swap),
            Binary { op, kind } => {
                self.push_op(Op::Binary);
                self.push_u8(op.as_u8());
                self.push_kind((*kind).into());
            }
            Negate(kind) => {
                self.push_op(Op::Negate);
                self.push_kind((*kind).into());
            }
            Convert { from, to } => {
                self.push_op(Op::Convert);
                self.push_kind((*from).into());
                self.push_kind((*to).into());
            }
            Compare {
                kind,
                nan_is_greater,
            } => {
                self.push_op(Op::Compare);
                self.push_kind((*kind).into());
                self.push_u8(*nan_is_greater as u8);
            }
            If { condition, target } => {
                self.push_op(Op::If);
                self.push_u8(condition.as_u8());
                self.push_label(*target);
            }
            IfCompare { condition, target } => {
                self.push_op(Op::IfCompare);
                self.push_u8(condition.as_u8());
                self.push_label(*target);
            }
            IfReferenceEqual { equal, target } => {
                self.push_op(Op::IfReferenceEqual);
                self.push_u8(*equal as u8);
                self.push_label(*target);
            }
            IfNull { null, target } => {
                self.push_op(Op::IfNull);
                self.push_u8(*null as u8);
                self.push_label(*target);
            }
            Goto(target) => {
                self.push_op(Op::Goto);
                self.push_label(*target);
            }
            Jsr(target) => {
                self.push_op(Op::Jsr);
                self.push_label(*target);
            }
            Ret(index) => {
                self.push_op(Op::Ret);
                self.push_var_u32((*index).into());
            }
            TableSwitch {
                low,
                default,
                targets,
            } => {
                self.push_op(Op::TableSwitch);
                self.bytes.extend_from_slice(&low.to_le_bytes());
                self.push_label(*default);
                self.push_len(targets.len());
                for target in targets.iter() {
                    self.push_label(*target);
                }
            }
            LookupSwitch { default, cases } => {
                self.push_op(Op::LookupSwitch);
                self.push_label(*default);
                self.push_len(cases.len());
                for (key, target) in cases.iter() {
                    self.bytes.extend_from_slice(&key.to_le_bytes());
                    self.push_label(*target);
                }
            }
            Invoke { kind, method } => {
                self.push_op(match kind {
                    InvokeKind::Static => Op::InvokeStatic,
                    InvokeKind::Virtual => Op::InvokeVirtual,
                });
                self.push_string(&method.owner);
                self.push_string(&method.name);
                self.push_string(&method.descriptor.to_string());
            }
            NewArray(element) => {
                self.push_op(Op::NewArray);
                self.push_string(&element.to_string());
            }
            ArrayLength => self.push_op(Op::ArrayLength),
            ArrayLoad(kind) => {
                self.push_op(Op::ArrayLoad);
                self.push_kind(*kind);
            }
            ArrayStore(kind) => {
                self.push_op(Op::ArrayStore);
                self.push_kind(*kind);
            }
            CheckCast(t) => {
                self.push_op(Op::CheckCast);
                self.push_string(&t.to_string());
            }
            InstanceOf(t) => {
                self.push_op(Op::InstanceOf);
                self.push_string(&t.to_string());
            }
            Throw => self.push_op(Op::Throw),
            MonitorEnter => self.push_op(Op::MonitorEnter),
            MonitorExit => self.push_op(Op::MonitorExit),
            Return(Some(kind)) => {
                self.push_op(Op::Return);
                self.push_kind(*kind);
            }
            Return(None) => self.push_op(Op::ReturnVoid),
        }
    }

    fn write_stack_map_entry(&mut self, entry: &StackMapEntry) {
        self.push_label(entry.label);
        self.push_len(entry.locals.len());
        for value in entry.locals.iter() {
            self.push_frame_value(value);
        }
        self.push_len(entry.stack.len());
        for value in entry.stack.iter() {
            self.push_frame_value(value);
        }
    }

    fn push_frame_value(&mut self, value: &FrameValue) {
        match value {
            FrameValue::Top => self.push_u8(FRAME_TOP),
            FrameValue::Int => self.push_u8(FRAME_INT),
            FrameValue::Float => self.push_u8(FRAME_FLOAT),
            FrameValue::Long => self.push_u8(FRAME_LONG),
            FrameValue::Double => self.push_u8(FRAME_DOUBLE),
            FrameValue::Null => self.push_u8(FRAME_NULL),
            FrameValue::Reference(t) => {
                self.push_u8(FRAME_REFERENCE);
                self.push_string(&t.to_string());
            }
        }
    }

    fn push_op(&mut self, op: Op) {
        self.bytes.push(op as u8);
    }

    fn push_u8(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    fn push_kind(&mut self, kind: ValueKind) {
        self.bytes.push(kind.as_u8());
    }

    fn push_label(&mut self, label: Label) {
        self.push_var_u32(label.0);
    }

    fn push_len(&mut self, len: usize) {
        self.push_var_u32(len as u32);
    }

    fn push_string(&mut self, s: &str) {
        self.push_len(s.len());
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn push_var_u32(&mut self, mut n: u32) {
        loop {
            let mut byte = (n & 0x7f) as u8;

            n >>= 7;

            if n != 0 {
                byte |= 0x80;
            }

            self.bytes.push(byte);

            if n == 0 {
                break;
            }
        }
    }
}

pub(crate) const FRAME_TOP: u8 = 0;
pub(crate) const FRAME_INT: u8 = 1;
pub(crate) const FRAME_FLOAT: u8 = 2;
pub(crate) const FRAME_LONG: u8 = 3;
pub(crate) const FRAME_DOUBLE: u8 = 4;
pub(crate) const FRAME_NULL: u8 = 5;
pub(crate) const FRAME_REFERENCE: u8 = 6;
