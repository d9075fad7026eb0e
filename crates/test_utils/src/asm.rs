//! Shorthand constructors for the instructions that tests use most often

use coil_bytecode::{
    BinaryOp, Condition, Constant, Instruction, InvokeKind, Label, MethodRef, NumericKind,
    ValueKind, continuation,
};

/// Places label `n`
pub fn label(n: u32) -> Instruction {
    Instruction::Label(Label(n))
}

/// Pushes an int
pub fn int(n: i32) -> Instruction {
    Instruction::Const(Constant::Int(n))
}

/// Pushes a long
pub fn long(n: i64) -> Instruction {
    Instruction::Const(Constant::Long(n))
}

/// Pushes a float
pub fn float(n: f32) -> Instruction {
    Instruction::Const(Constant::Float(n))
}

/// Pushes a double
pub fn double(n: f64) -> Instruction {
    Instruction::Const(Constant::Double(n))
}

/// Pushes a string
pub fn string(s: &str) -> Instruction {
    Instruction::Const(Constant::String(s.into()))
}

/// Pushes null
pub fn null() -> Instruction {
    Instruction::Const(Constant::Null)
}

/// Loads a local of the given kind
pub fn load(kind: ValueKind, index: u16) -> Instruction {
    Instruction::Load { kind, index }
}

/// Stores into a local of the given kind
pub fn store(kind: ValueKind, index: u16) -> Instruction {
    Instruction::Store { kind, index }
}

/// Loads an int local
pub fn iload(index: u16) -> Instruction {
    load(ValueKind::Int, index)
}

/// Stores an int local
pub fn istore(index: u16) -> Instruction {
    store(ValueKind::Int, index)
}

/// Loads a reference local
pub fn aload(index: u16) -> Instruction {
    load(ValueKind::Reference, index)
}

/// Stores a reference local
pub fn astore(index: u16) -> Instruction {
    store(ValueKind::Reference, index)
}

/// Adds two ints
pub fn iadd() -> Instruction {
    Instruction::Binary {
        op: BinaryOp::Add,
        kind: NumericKind::Int,
    }
}

/// Compares two ints and jumps to label `n` if the condition holds
pub fn if_icmp(condition: Condition, n: u32) -> Instruction {
    Instruction::IfCompare {
        condition,
        target: Label(n),
    }
}

/// Jumps to label `n`
pub fn goto(n: u32) -> Instruction {
    Instruction::Goto(Label(n))
}

/// Invokes a static method, e.g. `invoke_static("app/Main", "run", "(I)V")`
pub fn invoke_static(owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Static,
        method: MethodRef::parse(owner, name, descriptor),
    }
}

/// Invokes a virtual method
pub fn invoke_virtual(owner: &str, name: &str, descriptor: &str) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Virtual,
        method: MethodRef::parse(owner, name, descriptor),
    }
}

/// Invokes the suspend primitive on the capability at the top of the stack
pub fn suspend() -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Virtual,
        method: continuation::suspend(),
    }
}

/// Returns a value of the given kind
pub fn ret(kind: ValueKind) -> Instruction {
    Instruction::Return(Some(kind))
}

/// Returns from a void method
pub fn ret_void() -> Instruction {
    Instruction::Return(None)
}
