use crate::{OBJECT_TYPE, Type, ValueKind};
use smallvec::SmallVec;
use std::fmt;

/// The type of a value in a [VerifiedFrame]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameValue {
    /// An uninitialized or unusable slot, e.g. the second half of a wide local
    Top,
    /// An int, boolean included
    Int,
    /// A float
    Float,
    /// A long, occupying two local slots
    Long,
    /// A double, occupying two local slots
    Double,
    /// The null reference, assignable to any reference type
    Null,
    /// A reference to an object or array of the given type
    Reference(Type),
}

/// The broad categories of frame values
///
/// The save and restore code only needs to know how much space a value takes and whether it
/// carries anything at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SlotCategory {
    Primitive32,
    Primitive64,
    Reference,
    Uninitialized,
}

impl FrameValue {
    /// The frame value for a value of the given type
    pub fn from_type(value_type: &Type) -> Self {
        match value_type {
            Type::Boolean | Type::Int => Self::Int,
            Type::Long => Self::Long,
            Type::Float => Self::Float,
            Type::Double => Self::Double,
            Type::Object(_) | Type::Array(_) => Self::Reference(value_type.clone()),
        }
    }

    /// A reference to the root object type
    pub fn object() -> Self {
        Self::Reference(Type::object(OBJECT_TYPE))
    }

    /// Returns the value's category
    pub fn category(&self) -> SlotCategory {
        match self {
            Self::Top => SlotCategory::Uninitialized,
            Self::Int | Self::Float => SlotCategory::Primitive32,
            Self::Long | Self::Double => SlotCategory::Primitive64,
            Self::Null | Self::Reference(_) => SlotCategory::Reference,
        }
    }

    /// The kind of loads and stores that operate on this value, `None` for [Self::Top]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Top => None,
            Self::Int => Some(ValueKind::Int),
            Self::Float => Some(ValueKind::Float),
            Self::Long => Some(ValueKind::Long),
            Self::Double => Some(ValueKind::Double),
            Self::Null | Self::Reference(_) => Some(ValueKind::Reference),
        }
    }

    /// True for null and references
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Null | Self::Reference(_))
    }

    /// True for values that take two slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// The number of slots taken by the value
    pub fn size(&self) -> usize {
        if self.is_wide() { 2 } else { 1 }
    }

    /// Returns true if a value of type `from` can be used where `self` is expected
    pub fn is_assignable_from(&self, from: &FrameValue) -> bool {
        match (self, from) {
            (Self::Top, _) => true,
            (Self::Reference(_), Self::Null) => true,
            (Self::Reference(to), Self::Reference(from)) => is_reference_assignable(to, from),
            (to, from) => to == from,
        }
    }

    /// Merges two values arriving at the same position from different paths
    ///
    /// Returns [Self::Top] when the values are incompatible.
    pub fn merge(&self, other: &FrameValue) -> FrameValue {
        if self == other {
            return self.clone();
        }

        match (self, other) {
            (Self::Null, Self::Reference(_)) => other.clone(),
            (Self::Reference(_), Self::Null) => self.clone(),
            (Self::Reference(a), Self::Reference(b)) => Self::Reference(merge_references(a, b)),
            _ => Self::Top,
        }
    }
}

fn is_reference_assignable(to: &Type, from: &Type) -> bool {
    match (to, from) {
        (Type::Object(name), _) if name == OBJECT_TYPE => true,
        (Type::Object(to), Type::Object(from)) => to == from,
        (Type::Array(to), Type::Array(from)) => {
            if to.is_reference() && from.is_reference() {
                is_reference_assignable(to, from)
            } else {
                to == from
            }
        }
        _ => false,
    }
}

fn merge_references(a: &Type, b: &Type) -> Type {
    if is_reference_assignable(a, b) {
        a.clone()
    } else if is_reference_assignable(b, a) {
        b.clone()
    } else {
        match (a, b) {
            (Type::Array(a), Type::Array(b)) if a.is_reference() && b.is_reference() => {
                Type::array(merge_references(a, b))
            }
            _ => Type::object(OBJECT_TYPE),
        }
    }
}

impl fmt::Display for FrameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("."),
            Self::Int => f.write_str("I"),
            Self::Float => f.write_str("F"),
            Self::Long => f.write_str("J"),
            Self::Double => f.write_str("D"),
            Self::Null => f.write_str("null"),
            Self::Reference(t) => write!(f, "{t}"),
        }
    }
}

/// The operand stack of a [VerifiedFrame], bottom first
pub type FrameStack = SmallVec<[FrameValue; 8]>;

/// The types of the local slots and operand stack values at a single instruction
///
/// Wide values occupy two local slots, the second recorded as [FrameValue::Top],
/// but only a single entry on the operand stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifiedFrame {
    /// The local slots, by index
    pub locals: Vec<FrameValue>,
    /// The operand stack, from bottom to top
    pub stack: FrameStack,
}

impl VerifiedFrame {
    /// The size of the operand stack in slots
    pub fn stack_slots(&self) -> usize {
        self.stack.iter().map(FrameValue::size).sum()
    }

    /// Merges an incoming frame into this one
    ///
    /// Returns `Ok(true)` if this frame changed, or an error describing why the frames can't be
    /// merged.
    pub(crate) fn merge_from(&mut self, incoming: &VerifiedFrame) -> Result<bool, MergeError> {
        if self.stack.len() != incoming.stack.len() {
            return Err(MergeError::StackHeight {
                expected: self.stack.len(),
                found: incoming.stack.len(),
            });
        }

        let mut changed = false;

        for (existing, incoming) in self.stack.iter_mut().zip(incoming.stack.iter()) {
            let merged = existing.merge(incoming);
            if merged == FrameValue::Top {
                return Err(MergeError::StackValue {
                    expected: existing.clone(),
                    found: incoming.clone(),
                });
            }
            if merged != *existing {
                *existing = merged;
                changed = true;
            }
        }

        for (existing, incoming) in self.locals.iter_mut().zip(incoming.locals.iter()) {
            let merged = existing.merge(incoming);
            if merged != *existing {
                *existing = merged;
                changed = true;
            }
        }

        Ok(changed)
    }
}

impl fmt::Display for VerifiedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("locals: [")?;
        for (i, local) in self.locals.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{local}")?;
        }
        f.write_str("] stack: [")?;
        for (i, value) in self.stack.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}

#[derive(Clone, Debug)]
pub(crate) enum MergeError {
    StackHeight { expected: usize, found: usize },
    StackValue { expected: FrameValue, found: FrameValue },
}
