//! The native methods that are available to every unit
//!
//! The library provides the continuation capability's API, method states, and boxing.

use crate::{Continuation, ErrorKind, MethodState, NativeFunction, Object, Result, Value};
use coil_bytecode::{MethodRef, ValueKind, continuation};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Registers the library's natives
pub(crate) fn register(natives: &mut FxHashMap<MethodRef, NativeFunction>) {
    let mut add = |method: MethodRef, f: fn(&[Value]) -> Result<Option<Value>>| {
        natives.insert(method, Rc::new(f));
    };

    add(continuation::suspend(), |_| {
        Err(ErrorKind::UninstrumentedSuspend.into())
    });
    add(continuation::get_mode(), |args| {
        Ok(Some(Value::Int(capability(args)?.mode())))
    });
    add(continuation::set_mode(), |args| {
        capability(args)?.set_mode(int_arg(args, 1)?);
        Ok(None)
    });
    add(continuation::push_method_state(), |args| {
        let state = match args.get(1) {
            Some(Value::Object(state)) if matches!(state.as_ref(), Object::MethodState(_)) => {
                state.clone()
            }
            _ => return Err(ErrorKind::NullReference.into()),
        };
        capability(args)?.push_method_state(state);
        Ok(None)
    });
    add(continuation::pop_method_state(), |args| {
        let state = capability(args)?.pop_method_state()?;
        Ok(Some(Value::Object(state)))
    });

    add(continuation::create_method_state(), |args| {
        let [point, stack, locals] = args else {
            return Err(ErrorKind::StringError("expected three arguments".into()).into());
        };
        let Value::Int(point) = point else {
            return Err(ErrorKind::StringError("expected an int point id".into()).into());
        };
        let state = MethodState::new(*point, stack.clone(), locals.clone());
        Ok(Some(Object::MethodState(state).into()))
    });
    add(continuation::get_continuation_point(), |args| {
        Ok(Some(Value::Int(method_state(args)?.continuation_point())))
    });
    add(continuation::get_stack(), |args| {
        Ok(Some(method_state(args)?.stack().clone()))
    });
    add(continuation::get_locals(), |args| {
        Ok(Some(method_state(args)?.locals().clone()))
    });

    for kind in [
        ValueKind::Int,
        ValueKind::Long,
        ValueKind::Float,
        ValueKind::Double,
    ] {
        if let (Some(box_method), Some(unbox_method)) = (
            continuation::box_method(kind),
            continuation::unbox_method(kind),
        ) {
            add(box_method, |args| match args.first() {
                Some(value) => Ok(Some(Object::Boxed(value.clone()).into())),
                None => Err(ErrorKind::StringError("missing value to box".into()).into()),
            });
            add(unbox_method, |args| match receiver(args)? {
                Object::Boxed(value) => Ok(Some(value.clone())),
                other => Err(ErrorKind::StringError(format!(
                    "expected a boxed value, found {}",
                    other.runtime_type()
                ))
                .into()),
            });
        }
    }
}

fn receiver(args: &[Value]) -> Result<&Object> {
    match args.first() {
        Some(Value::Object(object)) => Ok(object.as_ref()),
        _ => Err(ErrorKind::NullReference.into()),
    }
}

fn capability(args: &[Value]) -> Result<&Continuation> {
    match receiver(args)? {
        Object::Continuation(continuation) => Ok(continuation.as_ref()),
        other => Err(ErrorKind::ClassCast {
            expected: continuation::continuation_type(),
            found: other.runtime_type(),
        }
        .into()),
    }
}

fn method_state(args: &[Value]) -> Result<&MethodState> {
    match receiver(args)? {
        Object::MethodState(state) => Ok(state),
        other => Err(ErrorKind::ClassCast {
            expected: continuation::method_state_type(),
            found: other.runtime_type(),
        }
        .into()),
    }
}

fn int_arg(args: &[Value], index: usize) -> Result<i32> {
    match args.get(index) {
        Some(Value::Int(n)) => Ok(*n),
        _ => Err(ErrorKind::StringError(format!("expected an int argument at {index}")).into()),
    }
}
