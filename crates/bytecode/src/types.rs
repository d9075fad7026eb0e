use std::{fmt, str::FromStr};
use thiserror::Error;

/// The name of the root reference type, every reference is assignable to it
pub const OBJECT_TYPE: &str = "lang/Object";
/// The type of string constants
pub const STRING_TYPE: &str = "lang/String";

/// Errors that can occur while parsing a type or method descriptor
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DescriptorError {
    #[error("empty descriptor")]
    Empty,
    #[error("unexpected character '{found}' at position {position} in '{descriptor}'")]
    UnexpectedCharacter {
        descriptor: String,
        found: char,
        position: usize,
    },
    #[error("unterminated object type in '{0}'")]
    UnterminatedObjectType(String),
    #[error("void is only allowed as a method's return type ('{0}')")]
    UnexpectedVoid(String),
    #[error("trailing characters in '{0}'")]
    TrailingCharacters(String),
}

/// A value type as it appears in descriptors
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// `Z`, an int on the operand stack
    Boolean,
    /// `I`
    Int,
    /// `J`, occupies two local slots
    Long,
    /// `F`
    Float,
    /// `D`, occupies two local slots
    Double,
    /// `Lname;`
    Object(String),
    /// `[element`
    Array(Box<Type>),
}

impl Type {
    /// Makes an object type with the given name
    pub fn object(name: impl Into<String>) -> Self {
        Self::Object(name.into())
    }

    /// Makes an array type with the given element type
    pub fn array(element: Type) -> Self {
        Self::Array(Box::new(element))
    }

    /// The number of local slots occupied by a value of this type
    pub fn slot_size(&self) -> u16 {
        match self {
            Self::Long | Self::Double => 2,
            _ => 1,
        }
    }

    /// True for object and array types
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// The kind of value used to represent this type on the operand stack
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Boolean | Self::Int => ValueKind::Int,
            Self::Long => ValueKind::Long,
            Self::Float => ValueKind::Float,
            Self::Double => ValueKind::Double,
            Self::Object(_) | Self::Array(_) => ValueKind::Reference,
        }
    }

    fn parse_at(descriptor: &str, position: &mut usize) -> Result<Self, DescriptorError> {
        let bytes = descriptor.as_bytes();
        let Some(&byte) = bytes.get(*position) else {
            return Err(DescriptorError::Empty);
        };
        *position += 1;

        let result = match byte {
            b'Z' => Self::Boolean,
            b'I' => Self::Int,
            b'J' => Self::Long,
            b'F' => Self::Float,
            b'D' => Self::Double,
            b'L' => {
                let start = *position;
                let Some(length) = descriptor[start..].find(';') else {
                    return Err(DescriptorError::UnterminatedObjectType(
                        descriptor.to_string(),
                    ));
                };
                *position = start + length + 1;
                Self::Object(descriptor[start..start + length].to_string())
            }
            b'[' => Self::array(Self::parse_at(descriptor, position)?),
            b'V' => return Err(DescriptorError::UnexpectedVoid(descriptor.to_string())),
            _ => {
                return Err(DescriptorError::UnexpectedCharacter {
                    descriptor: descriptor.to_string(),
                    found: descriptor[*position - 1..].chars().next().unwrap_or('?'),
                    position: *position - 1,
                });
            }
        };

        Ok(result)
    }
}

impl FromStr for Type {
    type Err = DescriptorError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let mut position = 0;
        let result = Self::parse_at(descriptor, &mut position)?;
        if position == descriptor.len() {
            Ok(result)
        } else {
            Err(DescriptorError::TrailingCharacters(descriptor.to_string()))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("Z"),
            Self::Int => f.write_str("I"),
            Self::Long => f.write_str("J"),
            Self::Float => f.write_str("F"),
            Self::Double => f.write_str("D"),
            Self::Object(name) => write!(f, "L{name};"),
            Self::Array(element) => write!(f, "[{element}"),
        }
    }
}

/// The kinds of values that live on the operand stack and in local slots
///
/// Used by loads, stores, returns and array accesses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// True for the kinds that take two local slots
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Int => 0,
            Self::Long => 1,
            Self::Float => 2,
            Self::Double => 3,
            Self::Reference => 4,
        }
    }

    pub(crate) fn from_u8(byte: u8) -> Option<Self> {
        let result = match byte {
            0 => Self::Int,
            1 => Self::Long,
            2 => Self::Float,
            3 => Self::Double,
            4 => Self::Reference,
            _ => return None,
        };
        Some(result)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Reference => "ref",
        })
    }
}

/// The numeric subset of [ValueKind], used by arithmetic instructions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumericKind {
    pub(crate) fn from_u8(byte: u8) -> Option<Self> {
        ValueKind::from_u8(byte).and_then(|kind| match kind {
            ValueKind::Int => Some(Self::Int),
            ValueKind::Long => Some(Self::Long),
            ValueKind::Float => Some(Self::Float),
            ValueKind::Double => Some(Self::Double),
            ValueKind::Reference => None,
        })
    }
}

impl From<NumericKind> for ValueKind {
    fn from(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Int => Self::Int,
            NumericKind::Long => Self::Long,
            NumericKind::Float => Self::Float,
            NumericKind::Double => Self::Double,
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ValueKind::from(*self).fmt(f)
    }
}

/// A method's parameter and return types
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// The method's formal parameters, not including the receiver of instance methods
    pub params: Vec<Type>,
    /// The return type, `None` for void methods
    pub returns: Option<Type>,
}

impl MethodDescriptor {
    /// Initializes a descriptor
    pub fn new(params: Vec<Type>, returns: Option<Type>) -> Self {
        Self { params, returns }
    }

    /// Returns true if the first formal parameter has the given type
    pub fn starts_with(&self, param: &Type) -> bool {
        self.params.first() == Some(param)
    }

    /// The number of local slots taken by the parameters
    pub fn param_slots(&self) -> u32 {
        self.params.iter().map(|param| param.slot_size() as u32).sum()
    }
}

impl FromStr for MethodDescriptor {
    type Err = DescriptorError;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let bytes = descriptor.as_bytes();
        if bytes.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if bytes[0] != b'(' {
            return Err(DescriptorError::UnexpectedCharacter {
                descriptor: descriptor.to_string(),
                found: descriptor.chars().next().unwrap_or('?'),
                position: 0,
            });
        }

        let mut position = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(position) {
                Some(b')') => {
                    position += 1;
                    break;
                }
                Some(_) => params.push(Type::parse_at(descriptor, &mut position)?),
                None => return Err(DescriptorError::Empty),
            }
        }

        let returns = match bytes.get(position) {
            Some(b'V') => {
                position += 1;
                None
            }
            Some(_) => Some(Type::parse_at(descriptor, &mut position)?),
            None => return Err(DescriptorError::Empty),
        };

        if position != descriptor.len() {
            return Err(DescriptorError::TrailingCharacters(descriptor.to_string()));
        }

        Ok(Self { params, returns })
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in self.params.iter() {
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        match &self.returns {
            Some(returns) => write!(f, "{returns}"),
            None => f.write_str("V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("()V", &[], None)]
    #[test_case("(I)J", &[Type::Int], Some(Type::Long))]
    #[test_case(
        "(Lcoil/Continuation;[[D)Llang/Object;",
        &[Type::object("coil/Continuation"), Type::array(Type::array(Type::Double))],
        Some(Type::object(OBJECT_TYPE))
    )]
    fn parse_method_descriptor(descriptor: &str, params: &[Type], returns: Option<Type>) {
        let parsed: MethodDescriptor = descriptor.parse().unwrap();
        assert_eq!(parsed.params, params);
        assert_eq!(parsed.returns, returns);
        assert_eq!(parsed.to_string(), descriptor);
    }

    #[test_case("")]
    #[test_case("I")]
    #[test_case("(V)V")]
    #[test_case("(Lfoo)V")]
    #[test_case("()VV")]
    #[test_case("(Q)V")]
    #[test_case("(I")]
    fn invalid_method_descriptor(descriptor: &str) {
        assert!(descriptor.parse::<MethodDescriptor>().is_err());
    }

    #[test]
    fn param_slots_count_wide_values_twice() {
        let descriptor: MethodDescriptor = "(IJDLx;)V".parse().unwrap();
        assert_eq!(descriptor.param_slots(), 6);
    }
}
