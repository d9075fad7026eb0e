//! Well-known names for the continuation runtime API
//!
//! Instrumented methods call into the capability object and the boxing library through these
//! signatures, and the runtime provides implementations for them.

use crate::{MethodDescriptor, MethodRef, OBJECT_TYPE, Type, ValueKind};

/// The capability marker type, eligible methods take it as their first parameter
pub const CONTINUATION_TYPE: &str = "coil/Continuation";
/// The type of the per-frame saved state
pub const METHOD_STATE_TYPE: &str = "coil/MethodState";

/// The mode in which instrumented code runs normally
pub const MODE_NORMAL: i32 = 0;
/// The mode in which instrumented frames save their state and return
pub const MODE_SAVING: i32 = 1;
/// The mode in which instrumented frames restore their state and jump to a continuation point
pub const MODE_LOADING: i32 = 2;

/// The capability type as it appears in descriptors
pub fn continuation_type() -> Type {
    Type::object(CONTINUATION_TYPE)
}

/// The saved state type as it appears in descriptors
pub fn method_state_type() -> Type {
    Type::object(METHOD_STATE_TYPE)
}

/// The snapshot array type, `[Llang/Object;`
pub fn object_array_type() -> Type {
    Type::array(Type::object(OBJECT_TYPE))
}

/// Returns true if a method with the given descriptor may suspend
pub fn is_eligible(descriptor: &MethodDescriptor) -> bool {
    descriptor.starts_with(&continuation_type())
}

/// The suspend primitive, `Virtual coil/Continuation.suspend()V`
pub fn suspend() -> MethodRef {
    MethodRef::parse(CONTINUATION_TYPE, "suspend", "()V")
}

/// `Virtual coil/Continuation.getMode()I`
pub fn get_mode() -> MethodRef {
    MethodRef::parse(CONTINUATION_TYPE, "getMode", "()I")
}

/// `Virtual coil/Continuation.setMode(I)V`
pub fn set_mode() -> MethodRef {
    MethodRef::parse(CONTINUATION_TYPE, "setMode", "(I)V")
}

/// `Virtual coil/Continuation.pushMethodState(Lcoil/MethodState;)V`
pub fn push_method_state() -> MethodRef {
    MethodRef::parse(
        CONTINUATION_TYPE,
        "pushMethodState",
        "(Lcoil/MethodState;)V",
    )
}

/// `Virtual coil/Continuation.popMethodState()Lcoil/MethodState;`
pub fn pop_method_state() -> MethodRef {
    MethodRef::parse(CONTINUATION_TYPE, "popMethodState", "()Lcoil/MethodState;")
}

/// `Static coil/MethodState.create(I[Llang/Object;[Llang/Object;)Lcoil/MethodState;`
pub fn create_method_state() -> MethodRef {
    MethodRef::parse(
        METHOD_STATE_TYPE,
        "create",
        "(I[Llang/Object;[Llang/Object;)Lcoil/MethodState;",
    )
}

/// `Virtual coil/MethodState.getContinuationPoint()I`
pub fn get_continuation_point() -> MethodRef {
    MethodRef::parse(METHOD_STATE_TYPE, "getContinuationPoint", "()I")
}

/// `Virtual coil/MethodState.getStack()[Llang/Object;`
pub fn get_stack() -> MethodRef {
    MethodRef::parse(METHOD_STATE_TYPE, "getStack", "()[Llang/Object;")
}

/// `Virtual coil/MethodState.getLocals()[Llang/Object;`
pub fn get_locals() -> MethodRef {
    MethodRef::parse(METHOD_STATE_TYPE, "getLocals", "()[Llang/Object;")
}

/// The box type used to store a primitive of the given kind in a snapshot array
///
/// Returns `None` for references, which are stored as they are.
pub fn box_type(kind: ValueKind) -> Option<&'static str> {
    match kind {
        ValueKind::Int => Some("lang/Integer"),
        ValueKind::Long => Some("lang/Long"),
        ValueKind::Float => Some("lang/Float"),
        ValueKind::Double => Some("lang/Double"),
        ValueKind::Reference => None,
    }
}

fn primitive_descriptor(kind: ValueKind) -> Option<&'static str> {
    match kind {
        ValueKind::Int => Some("I"),
        ValueKind::Long => Some("J"),
        ValueKind::Float => Some("F"),
        ValueKind::Double => Some("D"),
        ValueKind::Reference => None,
    }
}

/// The static `valueOf` method that boxes a primitive, e.g. `lang/Integer.valueOf(I)Llang/Integer;`
pub fn box_method(kind: ValueKind) -> Option<MethodRef> {
    let owner = box_type(kind)?;
    let primitive = primitive_descriptor(kind)?;
    Some(MethodRef::parse(
        owner,
        "valueOf",
        &format!("({primitive})L{owner};"),
    ))
}

/// The virtual method that unboxes a primitive, e.g. `lang/Integer.intValue()I`
pub fn unbox_method(kind: ValueKind) -> Option<MethodRef> {
    let owner = box_type(kind)?;
    let primitive = primitive_descriptor(kind)?;
    let name = match kind {
        ValueKind::Int => "intValue",
        ValueKind::Long => "longValue",
        ValueKind::Float => "floatValue",
        ValueKind::Double => "doubleValue",
        ValueKind::Reference => return None,
    };
    Some(MethodRef::parse(owner, name, &format!("(){primitive}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_checks_the_first_parameter() {
        assert!(is_eligible(&"(Lcoil/Continuation;I)V".parse().unwrap()));
        assert!(!is_eligible(&"(ILcoil/Continuation;)V".parse().unwrap()));
        assert!(!is_eligible(&"()V".parse().unwrap()));
    }

    #[test]
    fn boxing_signatures() {
        assert_eq!(
            box_method(ValueKind::Double).unwrap().to_string(),
            "lang/Double.valueOf(D)Llang/Double;"
        );
        assert_eq!(
            unbox_method(ValueKind::Long).unwrap().to_string(),
            "lang/Long.longValue()J"
        );
        assert!(box_method(ValueKind::Reference).is_none());
    }
}
