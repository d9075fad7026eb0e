//! Generates the save and restore code for continuation points
//!
//! Saved values are stored in `lang/Object` arrays: primitives are boxed, references are stored
//! as they are, and slots that hold nothing are skipped. Restoring reverses the process using the
//! types recorded in the point's frame.

use crate::VariableTable;
use coil_bytecode::{
    Constant, FrameValue, Instruction, InvokeKind, MethodRef, OBJECT_TYPE, Type, ValueKind,
    continuation,
};

fn invoke_static(method: MethodRef) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Static,
        method,
    }
}

fn invoke_virtual(method: MethodRef) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Virtual,
        method,
    }
}

fn load_ref(index: u16) -> Instruction {
    Instruction::Load {
        kind: ValueKind::Reference,
        index,
    }
}

fn store_ref(index: u16) -> Instruction {
    Instruction::Store {
        kind: ValueKind::Reference,
        index,
    }
}

fn int(n: i32) -> Instruction {
    Instruction::Const(Constant::Int(n))
}

// Makes a new snapshot array of the given length and stores it in a local
fn new_array(len: usize, index: u16, output: &mut Vec<Instruction>) {
    output.extend([
        int(len as i32),
        Instruction::NewArray(Type::object(OBJECT_TYPE)),
        store_ref(index),
    ]);
}

// Boxes the primitive on top of the stack, references are left as they are
fn box_value(kind: ValueKind, output: &mut Vec<Instruction>) {
    if let Some(method) = continuation::box_method(kind) {
        output.push(invoke_static(method));
    }
}

// Pushes the element of `array` at `index` onto the stack, converted to the frame value's type
fn load_element(array: u16, index: usize, value: &FrameValue, output: &mut Vec<Instruction>) {
    if *value == FrameValue::Null {
        output.push(Instruction::Const(Constant::Null));
        return;
    }

    output.extend([
        load_ref(array),
        int(index as i32),
        Instruction::ArrayLoad(ValueKind::Reference),
    ]);

    match value {
        FrameValue::Reference(t) => output.push(Instruction::CheckCast(t.clone())),
        _ => {
            let Some(kind) = value.kind() else {
                return;
            };
            if let (Some(box_type), Some(unbox)) =
                (continuation::box_type(kind), continuation::unbox_method(kind))
            {
                output.push(Instruction::CheckCast(Type::object(box_type)));
                output.push(invoke_virtual(unbox));
            }
        }
    }
}

/// Saves the given operand stack values into a new stack snapshot array
///
/// The values are popped from the top down, each written at its bottom-up index.
/// When `reload` is true the values are pushed back onto the stack afterwards, leaving it as it was.
pub fn save_operand_stack(
    table: &VariableTable,
    stack: &[FrameValue],
    reload: bool,
    output: &mut Vec<Instruction>,
) {
    new_array(stack.len(), table.stack_array, output);

    for (index, value) in stack.iter().enumerate().rev() {
        match value.kind() {
            Some(kind) => box_value(kind, output),
            None => {
                output.push(Instruction::Pop);
                continue;
            }
        }
        output.extend([
            store_ref(table.temp),
            load_ref(table.stack_array),
            int(index as i32),
            load_ref(table.temp),
            Instruction::ArrayStore(ValueKind::Reference),
        ]);
    }

    if reload {
        load_operand_stack(table, stack, output);
    }
}

/// Pushes the values in the stack snapshot array back onto the operand stack
pub fn load_operand_stack(table: &VariableTable, stack: &[FrameValue], output: &mut Vec<Instruction>) {
    for (index, value) in stack.iter().enumerate() {
        load_element(table.stack_array, index, value, output);
    }
}

/// Saves the live locals into a new locals snapshot array, indexed by slot
///
/// Empty slots are skipped, as are null slots which are restored as null without being stored.
pub fn save_locals(table: &VariableTable, locals: &[FrameValue], output: &mut Vec<Instruction>) {
    new_array(locals.len(), table.locals_array, output);

    for (index, value) in locals.iter().enumerate() {
        if matches!(value, FrameValue::Top | FrameValue::Null) {
            continue;
        }
        let Some(kind) = value.kind() else {
            continue;
        };

        output.extend([
            load_ref(table.locals_array),
            int(index as i32),
            Instruction::Load {
                kind,
                index: index as u16,
            },
        ]);
        box_value(kind, output);
        output.push(Instruction::ArrayStore(ValueKind::Reference));
    }
}

/// Restores the live locals from the locals snapshot array
pub fn load_locals(table: &VariableTable, locals: &[FrameValue], output: &mut Vec<Instruction>) {
    for (index, value) in locals.iter().enumerate() {
        let Some(kind) = value.kind() else {
            continue;
        };
        load_element(table.locals_array, index, value, output);
        output.push(Instruction::Store {
            kind,
            index: index as u16,
        });
    }
}

/// Creates a method state from the snapshot arrays and pushes it onto the capability
pub fn push_method_state(table: &VariableTable, id: i32, output: &mut Vec<Instruction>) {
    output.extend([
        load_ref(table.continuation),
        int(id),
        load_ref(table.stack_array),
        load_ref(table.locals_array),
        invoke_static(continuation::create_method_state()),
        invoke_virtual(continuation::push_method_state()),
    ]);
}

/// Pops the top method state from the capability and unpacks its snapshot arrays
///
/// The state is left in the scratch slot.
pub fn pop_method_state(table: &VariableTable, output: &mut Vec<Instruction>) {
    output.extend([
        load_ref(table.continuation),
        invoke_virtual(continuation::pop_method_state()),
        store_ref(table.temp),
        load_ref(table.temp),
        invoke_virtual(continuation::get_stack()),
        store_ref(table.stack_array),
        load_ref(table.temp),
        invoke_virtual(continuation::get_locals()),
        store_ref(table.locals_array),
    ]);
}

/// Pushes the capability's current mode
pub fn get_mode(table: &VariableTable, output: &mut Vec<Instruction>) {
    output.extend([
        load_ref(table.continuation),
        invoke_virtual(continuation::get_mode()),
    ]);
}

/// Sets the capability's mode
pub fn set_mode(table: &VariableTable, mode: i32, output: &mut Vec<Instruction>) {
    output.extend([
        load_ref(table.continuation),
        int(mode),
        invoke_virtual(continuation::set_mode()),
    ]);
}

/// Returns the zero value of the method's return type
pub fn return_dummy(returns: &Option<Type>, output: &mut Vec<Instruction>) {
    let Some(returns) = returns else {
        output.push(Instruction::Return(None));
        return;
    };

    let kind = returns.value_kind();
    let zero = match kind {
        ValueKind::Int => Constant::Int(0),
        ValueKind::Long => Constant::Long(0),
        ValueKind::Float => Constant::Float(0.0),
        ValueKind::Double => Constant::Double(0.0),
        ValueKind::Reference => Constant::Null,
    };
    output.extend([Instruction::Const(zero), Instruction::Return(Some(kind))]);
}

/// Throws a string describing an unrecoverable fault
pub fn throw_fault(message: &str, output: &mut Vec<Instruction>) {
    output.extend([
        Instruction::Const(Constant::String(message.into())),
        Instruction::Throw,
    ]);
}
