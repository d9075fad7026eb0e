use crate::{Continuation, MethodState};
use coil_bytecode::{OBJECT_TYPE, STRING_TYPE, Type, ValueKind, continuation};
use std::{cell::RefCell, fmt, rc::Rc};

/// A reference to a heap object
pub type ObjectRef = Rc<Object>;

/// A value on the operand stack or in a local slot
///
/// Long and double values are held in a single value, the second local slot that they occupy is
/// left as `Null`.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// The null reference
    #[default]
    Null,
    /// An int (or boolean)
    Int(i32),
    /// A long
    Long(i64),
    /// A float
    Float(f32),
    /// A double
    Double(f64),
    /// A reference to a heap object
    Object(ObjectRef),
}

impl Value {
    /// Makes a new string value
    pub fn string(s: impl Into<String>) -> Self {
        Self::Object(Rc::new(Object::String(s.into())))
    }

    /// Makes a new array value containing the given values
    pub fn array(element: Type, values: Vec<Value>) -> Self {
        Self::Object(Rc::new(Object::Array(Array::new(element, values))))
    }

    /// Makes a new instance of a unit's type
    pub fn instance(type_name: impl Into<String>) -> Self {
        Self::Object(Rc::new(Object::Instance(type_name.into())))
    }

    /// The value's kind, with null and objects being references
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Long(_) => ValueKind::Long,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Null | Self::Object(_) => ValueKind::Reference,
        }
    }

    /// True for long and double values
    pub fn is_wide(&self) -> bool {
        self.kind().is_wide()
    }

    /// True if the value is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the referenced object, or `None` for null and primitive values
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the contents of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self.as_object().map(|object| object.as_ref()) {
            Some(Object::String(s)) => Some(s),
            _ => None,
        }
    }

    /// True if the value can be used where a value of the given type is expected
    ///
    /// Null is accepted for any reference type.
    pub fn is_instance_of(&self, expected: &Type) -> bool {
        match self {
            Self::Null => expected.is_reference(),
            Self::Object(object) => expected.is_reference() && object.is_instance_of(expected),
            _ => self.kind() == expected.value_kind(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;

        match (self, other) {
            (Null, Null) => true,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Object(a), Object(b)) => match (a.as_ref(), b.as_ref()) {
                (self::Object::String(a), self::Object::String(b)) => a == b,
                (self::Object::Boxed(a), self::Object::Boxed(b)) => a == b,
                (self::Object::Continuation(a), self::Object::Continuation(b)) => Rc::ptr_eq(a, b),
                _ => Rc::ptr_eq(a, b),
            },
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Double(n) => write!(f, "{n}"),
            Self::Object(object) => write!(f, "{object}"),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Int(b as i32)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Self::Float(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(Rc::new(object))
    }
}

/// The objects that can be found on the runtime's heap
#[derive(Debug)]
pub enum Object {
    /// A `lang/String`
    String(String),
    /// An array
    Array(Array),
    /// A boxed primitive, e.g. a `lang/Integer`
    Boxed(Value),
    /// The continuation capability
    Continuation(Rc<Continuation>),
    /// A saved method frame
    MethodState(MethodState),
    /// An instance of a type declared by a unit
    ///
    /// Units don't have fields, instances only carry their type.
    Instance(String),
}

impl Object {
    /// The object's runtime type
    pub fn runtime_type(&self) -> Type {
        match self {
            Self::String(_) => Type::object(STRING_TYPE),
            Self::Array(array) => Type::array(array.element.clone()),
            Self::Boxed(value) => {
                Type::object(continuation::box_type(value.kind()).unwrap_or(OBJECT_TYPE))
            }
            Self::Continuation(_) => continuation::continuation_type(),
            Self::MethodState(_) => continuation::method_state_type(),
            Self::Instance(type_name) => Type::object(type_name.as_str()),
        }
    }

    /// True if the object can be used where a value of the given type is expected
    pub fn is_instance_of(&self, expected: &Type) -> bool {
        is_assignable(expected, &self.runtime_type())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Array(array) => {
                write!(f, "{}[{}]", array.element, array.values.borrow().len())
            }
            Self::Boxed(value) => write!(f, "{value}"),
            Self::Continuation(c) => write!(f, "continuation (mode {})", c.mode()),
            Self::MethodState(state) => {
                write!(f, "method state (point {})", state.continuation_point())
            }
            Self::Instance(type_name) => write!(f, "{type_name} instance"),
        }
    }
}

fn is_assignable(to: &Type, from: &Type) -> bool {
    match (to, from) {
        (Type::Object(name), _) if name == OBJECT_TYPE => true,
        (Type::Array(to), Type::Array(from)) if to.is_reference() && from.is_reference() => {
            is_assignable(to, from)
        }
        _ => to == from,
    }
}

/// A fixed-length array of values
#[derive(Debug)]
pub struct Array {
    element: Type,
    values: RefCell<Vec<Value>>,
}

impl Array {
    /// Makes an array with the given element type and contents
    pub fn new(element: Type, values: Vec<Value>) -> Self {
        Self {
            element,
            values: RefCell::new(values),
        }
    }

    /// Makes an array of the given length filled with the element type's default value
    pub fn with_length(element: Type, length: usize) -> Self {
        let default = match element.value_kind() {
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Reference => Value::Null,
        };
        Self::new(element, vec![default; length])
    }

    /// The array's element type
    pub fn element(&self) -> &Type {
        &self.element
    }

    /// The array's length
    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    /// True if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the element at the given index
    pub fn get(&self, index: usize) -> Option<Value> {
        self.values.borrow().get(index).cloned()
    }

    /// Replaces the element at the given index, returning false if the index is out of bounds
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.values.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of the array's contents
    pub fn to_vec(&self) -> Vec<Value> {
        self.values.borrow().clone()
    }
}
