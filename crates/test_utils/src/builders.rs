use coil_bytecode::{
    AccessFlags, Analyzer, CompiledUnit, Instruction, InstructionList, Method, MethodDescriptor,
    compute_max_stack, compute_stack_map,
};

/// Builds a [CompiledUnit] for tests
pub struct UnitBuilder {
    unit: CompiledUnit,
}

impl UnitBuilder {
    /// Starts a unit with the given name
    pub fn new(name: &str) -> Self {
        Self {
            unit: CompiledUnit::new(name),
        }
    }

    /// Adds a method, finishing it with this unit as its owner
    #[must_use]
    pub fn method(mut self, method: MethodBuilder) -> Self {
        let method = method.build(&self.unit.name);
        self.unit.methods.push(method);
        self
    }

    /// Returns the finished unit
    pub fn build(self) -> CompiledUnit {
        self.unit
    }
}

/// Builds a [Method] for tests
///
/// Methods are public and static unless specified otherwise.
/// When the maximum stack size or local count aren't provided, they're computed from the body,
/// and the stack map is filled in when the body passes analysis.
pub struct MethodBuilder {
    name: String,
    descriptor: MethodDescriptor,
    access: AccessFlags,
    max_stack: Option<u16>,
    max_locals: Option<u16>,
    body: Vec<Instruction>,
}

impl MethodBuilder {
    /// Starts a method with the given name and descriptor
    ///
    /// Panics if the descriptor is invalid.
    pub fn new(name: &str, descriptor: &str) -> Self {
        let descriptor = match descriptor.parse() {
            Ok(descriptor) => descriptor,
            Err(error) => panic!("invalid descriptor '{descriptor}': {error}"),
        };

        Self {
            name: name.into(),
            descriptor,
            access: AccessFlags::PUBLIC | AccessFlags::STATIC,
            max_stack: None,
            max_locals: None,
            body: Vec::new(),
        }
    }

    /// Makes the method an instance method
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.access = AccessFlags(self.access.0 & !AccessFlags::STATIC.0);
        self
    }

    /// Replaces the method's access flags
    #[must_use]
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Sets the maximum stack size
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = Some(max_stack);
        self
    }

    /// Sets the number of local slots
    #[must_use]
    pub fn max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = Some(max_locals);
        self
    }

    /// Sets the method's body
    #[must_use]
    pub fn body(mut self, body: Vec<Instruction>) -> Self {
        self.body = body;
        self
    }

    /// Finishes the method, using `owner` as the receiver type for instance methods
    pub fn build(self, owner: &str) -> Method {
        let max_locals = self
            .max_locals
            .unwrap_or_else(|| self.required_locals());

        let mut method = Method::new(self.name, self.descriptor, self.access);
        method.max_locals = max_locals;
        method.max_stack = self.max_stack.unwrap_or(u16::MAX);
        method.instructions = InstructionList::from_instructions(self.body);

        if method.access.has_no_body() {
            method.max_stack = self.max_stack.unwrap_or(0);
            return method;
        }

        if let Ok(frames) = Analyzer::analyze(owner, &method) {
            if self.max_stack.is_none() {
                method.max_stack = compute_max_stack(&frames) as u16;
            }
            method.stack_map = compute_stack_map(&method.instructions, &frames);
        }

        method
    }

    fn required_locals(&self) -> u16 {
        let receiver = if self.access.is_static() { 0 } else { 1 };
        let params = receiver + self.descriptor.param_slots();

        let used = self
            .body
            .iter()
            .filter_map(|instruction| match instruction {
                Instruction::Load { kind, index } | Instruction::Store { kind, index } => {
                    Some(*index as u32 + if kind.is_wide() { 2 } else { 1 })
                }
                Instruction::Increment { index, .. } | Instruction::Ret(index) => {
                    Some(*index as u32 + 1)
                }
                _ => None,
            })
            .max()
            .unwrap_or(0);

        params.max(used) as u16
    }
}
