use crate::{
    AccessFlags, BinaryOp, CompiledUnit, Condition, Constant, DescriptorError, FrameValue,
    Instruction, InstructionList, InvokeKind, Label, LabelError, Method, MethodRef, NumericKind,
    Op, StackMapEntry, Type, UnitFlags, ValueKind,
    writer::{
        FORMAT_VERSION, FRAME_DOUBLE, FRAME_FLOAT, FRAME_INT, FRAME_LONG, FRAME_NULL,
        FRAME_REFERENCE, FRAME_TOP, MAGIC,
    },
};
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Errors that can occur while reading a serialized unit
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ReadError {
    #[error("missing 'COIL' header")]
    InvalidMagic,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("unexpected end of input at byte {position}")]
    UnexpectedEnd { position: usize },
    #[error("unknown op {op:#04x} at byte {position}")]
    UnknownOp { op: u8, position: usize },
    #[error("invalid {operand} operand {value} at byte {position}")]
    InvalidOperand {
        operand: &'static str,
        value: u32,
        position: usize,
    },
    #[error("value at byte {position} is too large")]
    ValueTooLarge { position: usize },
    #[error("invalid UTF-8 in string at byte {position}")]
    InvalidUtf8 { position: usize },
    #[error("invalid descriptor at byte {position}: {source}")]
    InvalidDescriptor {
        position: usize,
        source: DescriptorError,
    },
    #[error("in method '{method}': {source}")]
    Label { method: String, source: LabelError },
    #[error("in method '{method}': stack map entry for {label} which isn't placed")]
    UnknownStackMapLabel { method: String, label: Label },
    #[error("unexpected trailing bytes at byte {position}")]
    TrailingBytes { position: usize },
}

type Result<T> = std::result::Result<T, ReadError>;

/// Parses the binary container format into a [CompiledUnit]
///
/// Structural problems are reported as [ReadError]s, the reader never panics on bad input.
/// Type correctness of method bodies isn't checked here, see [Analyzer](crate::Analyzer).
pub struct UnitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> UnitReader<'a> {
    /// Parses a complete unit, failing if any bytes are left over
    pub fn read(bytes: &'a [u8]) -> Result<CompiledUnit> {
        let mut reader = Self { bytes, position: 0 };
        let unit = reader.read_unit()?;

        if reader.position != bytes.len() {
            return Err(ReadError::TrailingBytes {
                position: reader.position,
            });
        }

        Ok(unit)
    }

    fn read_unit(&mut self) -> Result<CompiledUnit> {
        if self.bytes.get(..MAGIC.len()) != Some(MAGIC.as_slice()) {
            return Err(ReadError::InvalidMagic);
        }
        self.position = MAGIC.len();

        let version = self.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(ReadError::UnsupportedVersion(version));
        }

        let flags = UnitFlags(self.read_u8()?);
        let name = self.read_string()?;

        let method_count = self.read_var_u32()?;
        let mut methods = Vec::new();
        for _ in 0..method_count {
            methods.push(self.read_method()?);
        }

        Ok(CompiledUnit {
            name,
            flags,
            methods,
        })
    }

    fn read_method(&mut self) -> Result<Method> {
        let access = AccessFlags(u16::from_le_bytes(self.read_array()?));
        let name = self.read_string()?;
        let descriptor_position = self.position;
        let descriptor = self
            .read_string()?
            .parse()
            .map_err(|source| ReadError::InvalidDescriptor {
                position: descriptor_position,
                source,
            })?;
        let max_stack = self.read_u16()?;
        let max_locals = self.read_u16()?;

        let instruction_count = self.read_var_u32()?;
        let mut instructions = Vec::new();
        for _ in 0..instruction_count {
            instructions.push(self.read_instruction()?);
        }
        let instructions = InstructionList::from_instructions(instructions);

        let signature = format!("{name}{descriptor}");
        let label_positions =
            instructions
                .label_positions()
                .map_err(|source| ReadError::Label {
                    method: signature.clone(),
                    source,
                })?;

        let entry_count = self.read_var_u32()?;
        let mut stack_map = Vec::new();
        let mut seen = FxHashSet::default();
        for _ in 0..entry_count {
            let entry = self.read_stack_map_entry()?;
            if !label_positions.contains_key(&entry.label) {
                return Err(ReadError::UnknownStackMapLabel {
                    method: signature,
                    label: entry.label,
                });
            }
            if !seen.insert(entry.label) {
                return Err(ReadError::Label {
                    method: signature,
                    source: LabelError::Duplicate(entry.label),
                });
            }
            stack_map.push(entry);
        }

        Ok(Method {
            name,
            descriptor,
            access,
            max_stack,
            max_locals,
            instructions,
            stack_map,
        })
    }

    fn read_instruction(&mut self) -> Result<Instruction> {
        use Instruction::*;

        let op_position = self.position;
        let op_byte = self.read_u8()?;
        let op = Op::try_from(op_byte).map_err(|op| ReadError::UnknownOp {
            op,
            position: op_position,
        })?;

        let result = match op {
            Op::Label => Label(self.read_label()?),
            Op::Nop => Nop,
            Op::ConstNull => Const(Constant::Null),
            Op::ConstInt => Const(Constant::Int(i32::from_le_bytes(self.read_array()?))),
            Op::ConstLong => Const(Constant::Long(i64::from_le_bytes(self.read_array()?))),
            Op::ConstFloat => Const(Constant::Float(f32::from_bits(u32::from_le_bytes(
                self.read_array()?,
            )))),
            Op::ConstDouble => Const(Constant::Double(f64::from_bits(u64::from_le_bytes(
                self.read_array()?,
            )))),
            Op::ConstString => Const(Constant::String(self.read_string()?)),
            Op::Load => Load {
                kind: self.read_kind()?,
                index: self.read_u16()?,
            },
            Op::Store => Store {
                kind: self.read_kind()?,
                index: self.read_u16()?,
            },
            Op::Increment => Increment {
                index: self.read_u16()?,
                delta: i16::from_le_bytes(self.read_array()?),
            },
            Op::Pop => Pop,
            Op::Pop2 => Pop2,
            Op::Dup => Dup,
            Op::DupX1 => DupX1,
            Op::DupX2 => DupX2,
            Op::Dup2 => Dup2,
            Op::Swap => Swap,
            Op::Binary => {
                let op_position = self.position;
                let op_byte = self.read_u8()?;
                let Some(op) = BinaryOp::from_u8(op_byte) else {
                    return Err(ReadError::InvalidOperand {
                        operand: "binary op",
                        value: op_byte.into(),
                        position: op_position,
                    });
                };
                Binary {
                    op,
                    kind: self.read_numeric_kind()?,
                }
            }
            Op::Negate => Negate(self.read_numeric_kind()?),
            Op::Convert => Convert {
                from: self.read_numeric_kind()?,
                to: self.read_numeric_kind()?,
            },
            Op::Compare => Compare {
                kind: self.read_numeric_kind()?,
                nan_is_greater: self.read_bool()?,
            },
            Op::If => If {
                condition: self.read_condition()?,
                target: self.read_label()?,
            },
            Op::IfCompare => IfCompare {
                condition: self.read_condition()?,
                target: self.read_label()?,
            },
            Op::IfReferenceEqual => IfReferenceEqual {
                equal: self.read_bool()?,
                target: self.read_label()?,
            },
            Op::IfNull => IfNull {
                null: self.read_bool()?,
                target: self.read_label()?,
            },
            Op::Goto => Goto(self.read_label()?),
            Op::Jsr => Jsr(self.read_label()?),
            Op::Ret => Ret(self.read_u16()?),
            Op::TableSwitch => {
                let low = i32::from_le_bytes(self.read_array()?);
                let default = self.read_label()?;
                let count = self.read_var_u32()?;
                let mut targets = Vec::new();
                for _ in 0..count {
                    targets.push(self.read_label()?);
                }
                TableSwitch {
                    low,
                    default,
                    targets,
                }
            }
            Op::LookupSwitch => {
                let default = self.read_label()?;
                let count = self.read_var_u32()?;
                let mut cases = Vec::new();
                for _ in 0..count {
                    let key = i32::from_le_bytes(self.read_array()?);
                    cases.push((key, self.read_label()?));
                }
                LookupSwitch { default, cases }
            }
            Op::InvokeStatic | Op::InvokeVirtual => {
                let owner = self.read_string()?;
                let name = self.read_string()?;
                let descriptor_position = self.position;
                let descriptor = self.read_string()?.parse().map_err(|source| {
                    ReadError::InvalidDescriptor {
                        position: descriptor_position,
                        source,
                    }
                })?;
                let kind = if op == Op::InvokeStatic {
                    InvokeKind::Static
                } else {
                    InvokeKind::Virtual
                };
                Invoke {
                    kind,
                    method: MethodRef::new(owner, name, descriptor),
                }
            }
            Op::NewArray => NewArray(self.read_type()?),
            Op::ArrayLength => ArrayLength,
            Op::ArrayLoad => ArrayLoad(self.read_kind()?),
            Op::ArrayStore => ArrayStore(self.read_kind()?),
            Op::CheckCast => CheckCast(self.read_type()?),
            Op::InstanceOf => InstanceOf(self.read_type()?),
            Op::Throw => Throw,
            Op::MonitorEnter => MonitorEnter,
            Op::MonitorExit => MonitorExit,
            Op::Return => Return(Some(self.read_kind()?)),
            Op::ReturnVoid => Return(None),
        };

        Ok(result)
    }

    fn read_stack_map_entry(&mut self) -> Result<StackMapEntry> {
        let label = self.read_label()?;

        let local_count = self.read_var_u32()?;
        let mut locals = Vec::new();
        for _ in 0..local_count {
            locals.push(self.read_frame_value()?);
        }

        let stack_count = self.read_var_u32()?;
        let mut stack = Vec::new();
        for _ in 0..stack_count {
            stack.push(self.read_frame_value()?);
        }

        Ok(StackMapEntry {
            label,
            locals,
            stack,
        })
    }

    fn read_frame_value(&mut self) -> Result<FrameValue> {
        let position = self.position;
        let result = match self.read_u8()? {
            FRAME_TOP => FrameValue::Top,
            FRAME_INT => FrameValue::Int,
            FRAME_FLOAT => FrameValue::Float,
            FRAME_LONG => FrameValue::Long,
            FRAME_DOUBLE => FrameValue::Double,
            FRAME_NULL => FrameValue::Null,
            FRAME_REFERENCE => {
                let t = self.read_type()?;
                if !t.is_reference() {
                    return Err(ReadError::InvalidOperand {
                        operand: "frame reference",
                        value: FRAME_REFERENCE.into(),
                        position,
                    });
                }
                FrameValue::Reference(t)
            }
            unexpected => {
                return Err(ReadError::InvalidOperand {
                    operand: "frame value",
                    value: unexpected.into(),
                    position,
                });
            }
        };
        Ok(result)
    }

    fn read_type(&mut self) -> Result<Type> {
        let position = self.position;
        self.read_string()?
            .parse()
            .map_err(|source| ReadError::InvalidDescriptor { position, source })
    }

    fn read_kind(&mut self) -> Result<ValueKind> {
        let position = self.position;
        let byte = self.read_u8()?;
        ValueKind::from_u8(byte).ok_or(ReadError::InvalidOperand {
            operand: "value kind",
            value: byte.into(),
            position,
        })
    }

    fn read_numeric_kind(&mut self) -> Result<NumericKind> {
        let position = self.position;
        let byte = self.read_u8()?;
        NumericKind::from_u8(byte).ok_or(ReadError::InvalidOperand {
            operand: "numeric kind",
            value: byte.into(),
            position,
        })
    }

    fn read_condition(&mut self) -> Result<Condition> {
        let position = self.position;
        let byte = self.read_u8()?;
        Condition::from_u8(byte).ok_or(ReadError::InvalidOperand {
            operand: "condition",
            value: byte.into(),
            position,
        })
    }

    fn read_bool(&mut self) -> Result<bool> {
        let position = self.position;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ReadError::InvalidOperand {
                operand: "flag",
                value: other.into(),
                position,
            }),
        }
    }

    fn read_label(&mut self) -> Result<Label> {
        self.read_var_u32().map(Label)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_var_u32()? as usize;
        let start = self.position;
        let Some(bytes) = self.bytes.get(start..start + len) else {
            return Err(ReadError::UnexpectedEnd {
                position: self.bytes.len(),
            });
        };
        self.position += len;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReadError::InvalidUtf8 { position: start })
    }

    fn read_u8(&mut self) -> Result<u8> {
        match self.bytes.get(self.position) {
            Some(byte) => {
                self.position += 1;
                Ok(*byte)
            }
            None => Err(ReadError::UnexpectedEnd {
                position: self.position,
            }),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let Some(bytes) = self.bytes.get(self.position..self.position + N) else {
            return Err(ReadError::UnexpectedEnd {
                position: self.bytes.len(),
            });
        };
        let mut result = [0; N];
        result.copy_from_slice(bytes);
        self.position += N;
        Ok(result)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let position = self.position;
        let n = self.read_var_u32()?;
        u16::try_from(n).map_err(|_| ReadError::ValueTooLarge { position })
    }

    fn read_var_u32(&mut self) -> Result<u32> {
        let start = self.position;
        let mut result = 0u32;
        let mut shift_amount = 0;
        loop {
            let byte = self.read_u8()?;
            if shift_amount > 28 || (shift_amount == 28 && byte & 0x70 != 0) {
                return Err(ReadError::ValueTooLarge { position: start });
            }
            result |= (byte as u32 & 0x7f) << shift_amount;
            if byte & 0x80 == 0 {
                break;
            } else {
                shift_amount += 7;
            }
        }
        Ok(result)
    }
}
