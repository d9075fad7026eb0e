use crate::{MethodDescriptor, NumericKind, Type, ValueKind};
use derive_name::VariantName;
use std::fmt;

/// A stable handle to a position in a method's instruction list
///
/// Labels are placed in the list with [Instruction::Label], and referred to by jumps.
/// Insertions and removals elsewhere in the list never invalidate a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A constant that can be pushed with [Instruction::Const]
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}L"),
            Self::Float(n) => write!(f, "{n:?}F"),
            Self::Double(n) => write!(f, "{n:?}D"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// The comparisons used by conditional jumps
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Condition {
    Equal,
    NotEqual,
    Less,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
}

impl Condition {
    /// Applies the comparison to a pair of ints
    pub fn test(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::Less => lhs < rhs,
            Self::GreaterOrEqual => lhs >= rhs,
            Self::Greater => lhs > rhs,
            Self::LessOrEqual => lhs <= rhs,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(byte: u8) -> Option<Self> {
        use Condition::*;
        [Equal, NotEqual, Less, GreaterOrEqual, Greater, LessOrEqual]
            .get(byte as usize)
            .copied()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::GreaterOrEqual => ">=",
            Self::Greater => ">",
            Self::LessOrEqual => "<=",
        })
    }
}

/// Binary arithmetic and bitwise operations
///
/// The bitwise and shift operations are only valid for ints and longs.
/// Shifts take an int shift distance for both kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// True for the operations that are only defined for ints and longs
    pub fn is_integral_only(self) -> bool {
        matches!(
            self,
            Self::ShiftLeft
                | Self::ShiftRight
                | Self::ShiftRightUnsigned
                | Self::And
                | Self::Or
                | Self::Xor
        )
    }

    /// True for the shift operations
    pub fn is_shift(self) -> bool {
        matches!(
            self,
            Self::ShiftLeft | Self::ShiftRight | Self::ShiftRightUnsigned
        )
    }

    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(byte: u8) -> Option<Self> {
        use BinaryOp::*;
        [
            Add,
            Subtract,
            Multiply,
            Divide,
            Remainder,
            ShiftLeft,
            ShiftRight,
            ShiftRightUnsigned,
            And,
            Or,
            Xor,
        ]
        .get(byte as usize)
        .copied()
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Remainder => "rem",
            Self::ShiftLeft => "shl",
            Self::ShiftRight => "shr",
            Self::ShiftRightUnsigned => "ushr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        })
    }
}

/// How an invoked method receives its arguments
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// No receiver, only the descriptor's parameters are popped
    Static,
    /// A receiver of the owner's type is popped after the parameters
    Virtual,
}

/// A reference to a method, as used by [Instruction::Invoke]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// The name of the unit that declares the method
    pub owner: String,
    /// The method's name
    pub name: String,
    /// The method's descriptor
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    /// Initializes a method reference
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: MethodDescriptor,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor,
        }
    }

    /// Initializes a method reference from a descriptor string
    ///
    /// Intended for well-known signatures, panics if the descriptor is invalid.
    pub fn parse(owner: &str, name: &str, descriptor: &str) -> Self {
        match descriptor.parse() {
            Ok(descriptor) => Self::new(owner, name, descriptor),
            Err(error) => panic!("invalid descriptor for {owner}.{name}: {error}"),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// A single operation in a method body
///
/// The set of instructions is closed. Passes that need to know about control flow or invocations
/// should use the queries provided here ([Self::invoked_method], [Self::jump_targets],
/// [Self::falls_through]) so that they stay exhaustive.
#[derive(Clone, Debug, PartialEq, VariantName)]
#[allow(missing_docs)]
pub enum Instruction {
    /// Marks a position in the list, doesn't perform any operation
    Label(Label),
    Nop,
    Const(Constant),
    Load {
        kind: ValueKind,
        index: u16,
    },
    Store {
        kind: ValueKind,
        index: u16,
    },
    /// Adds a constant to an int local
    Increment {
        index: u16,
        delta: i16,
    },
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Swap,
    Binary {
        op: BinaryOp,
        kind: NumericKind,
    },
    Negate(NumericKind),
    Convert {
        from: NumericKind,
        to: NumericKind,
    },
    /// Compares two values of the same kind, producing -1, 0, or 1
    ///
    /// For floats and doubles, `nan_is_greater` decides the result when either value is NaN.
    Compare {
        kind: NumericKind,
        nan_is_greater: bool,
    },
    /// Compares an int against zero
    If {
        condition: Condition,
        target: Label,
    },
    /// Compares two ints
    IfCompare {
        condition: Condition,
        target: Label,
    },
    IfReferenceEqual {
        equal: bool,
        target: Label,
    },
    IfNull {
        null: bool,
        target: Label,
    },
    Goto(Label),
    /// Jump to subroutine, pushing a return address
    Jsr(Label),
    /// Return from subroutine using the address stored in a local
    Ret(u16),
    TableSwitch {
        low: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        cases: Vec<(i32, Label)>,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
    },
    NewArray(Type),
    ArrayLength,
    ArrayLoad(ValueKind),
    ArrayStore(ValueKind),
    CheckCast(Type),
    InstanceOf(Type),
    Throw,
    MonitorEnter,
    MonitorExit,
    /// Returns from the method, `None` for void methods
    Return(Option<ValueKind>),
}

impl Instruction {
    /// Returns the invoked method if this is an invocation
    pub fn invoked_method(&self) -> Option<(InvokeKind, &MethodRef)> {
        match self {
            Self::Invoke { kind, method } => Some((*kind, method)),
            _ => None,
        }
    }

    /// Returns true if this is an invocation of the given method
    pub fn invokes(&self, kind: InvokeKind, method: &MethodRef) -> bool {
        matches!(self.invoked_method(), Some((k, m)) if k == kind && m == method)
    }

    /// The labels that this instruction may jump to
    pub fn jump_targets(&self) -> Vec<Label> {
        match self {
            Self::If { target, .. }
            | Self::IfCompare { target, .. }
            | Self::IfReferenceEqual { target, .. }
            | Self::IfNull { target, .. }
            | Self::Goto(target)
            | Self::Jsr(target) => vec![*target],
            Self::TableSwitch {
                default, targets, ..
            } => {
                let mut result = Vec::with_capacity(targets.len() + 1);
                result.push(*default);
                result.extend(targets.iter().copied());
                result
            }
            Self::LookupSwitch { default, cases } => {
                let mut result = Vec::with_capacity(cases.len() + 1);
                result.push(*default);
                result.extend(cases.iter().map(|(_, target)| *target));
                result
            }
            _ => Vec::new(),
        }
    }

    /// Returns false if execution can't continue with the following instruction
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Self::Goto(_)
                | Self::Ret(_)
                | Self::TableSwitch { .. }
                | Self::LookupSwitch { .. }
                | Self::Throw
                | Self::Return(_)
        )
    }

    /// The instruction's name, used in error messages
    pub fn name(&self) -> &'static str {
        self.variant_name()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            Label(label) => write!(f, "{label}:"),
            Nop | Pop | Pop2 | Dup | DupX1 | DupX2 | Dup2 | Swap | ArrayLength | Throw
            | MonitorEnter | MonitorExit => write!(f, "    {}", self.name()),
            Const(constant) => write!(f, "    Const           {constant}"),
            Load { kind, index } => write!(f, "    Load            {kind:<7} local: {index}"),
            Store { kind, index } => write!(f, "    Store           {kind:<7} local: {index}"),
            Increment { index, delta } => {
                write!(f, "    Increment       local: {index:<7} delta: {delta}")
            }
            Binary { op, kind } => write!(f, "    Binary          {kind:<7} op: {op}"),
            Negate(kind) => write!(f, "    Negate          {kind}"),
            Convert { from, to } => write!(f, "    Convert         {from} -> {to}"),
            Compare {
                kind,
                nan_is_greater,
            } => write!(
                f,
                "    Compare         {kind:<7} nan: {}",
                if *nan_is_greater { "greater" } else { "less" }
            ),
            If { condition, target } => write!(f, "    If              {condition} 0 -> {target}"),
            IfCompare { condition, target } => {
                write!(f, "    IfCompare       {condition} -> {target}")
            }
            IfReferenceEqual { equal, target } => write!(
                f,
                "    IfReference     {} -> {target}",
                if *equal { "==" } else { "!=" }
            ),
            IfNull { null, target } => write!(
                f,
                "    IfNull          {} -> {target}",
                if *null { "null" } else { "nonnull" }
            ),
            Goto(target) => write!(f, "    Goto            {target}"),
            Jsr(target) => write!(f, "    Jsr             {target}"),
            Ret(index) => write!(f, "    Ret             local: {index}"),
            TableSwitch {
                low,
                default,
                targets,
            } => {
                write!(f, "    TableSwitch     low: {low:<7} default: {default}")?;
                for (i, target) in targets.iter().enumerate() {
                    write!(f, "\n        {} -> {target}", *low as i64 + i as i64)?;
                }
                Ok(())
            }
            LookupSwitch { default, cases } => {
                write!(f, "    LookupSwitch    default: {default}")?;
                for (key, target) in cases.iter() {
                    write!(f, "\n        {key} -> {target}")?;
                }
                Ok(())
            }
            Invoke { kind, method } => {
                let kind = match kind {
                    InvokeKind::Static => "static",
                    InvokeKind::Virtual => "virtual",
                };
                write!(f, "    Invoke          {kind:<7} {method}")
            }
            NewArray(element) => write!(f, "    NewArray        {element}"),
            ArrayLoad(kind) => write!(f, "    ArrayLoad       {kind}"),
            ArrayStore(kind) => write!(f, "    ArrayStore      {kind}"),
            CheckCast(t) => write!(f, "    CheckCast       {t}"),
            InstanceOf(t) => write!(f, "    InstanceOf      {t}"),
            Return(Some(kind)) => write!(f, "    Return          {kind}"),
            Return(None) => write!(f, "    Return"),
        }
    }
}
