use crate::{FrameValue, InstructionList, Label, MethodDescriptor};
use std::{
    fmt::{self, Write},
    ops::{BitOr, BitOrAssign},
};

macro_rules! flags {
    ($(#[$meta:meta])* $name:ident: $repr:ty { $($(#[$flag_meta:meta])* $flag:ident = $value:expr,)+ }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            $($(#[$flag_meta])* pub const $flag: Self = Self($value);)+

            /// Returns true if all of the given flags are set
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

flags! {
    /// A method's access flags
    AccessFlags: u16 {
        /// No flags set
        NONE = 0,
        /// Callable from other units
        PUBLIC = 0x0001,
        /// Only callable from within the declaring unit
        PRIVATE = 0x0002,
        /// The method has no receiver
        STATIC = 0x0008,
        /// Implemented by the host, the method has no body
        NATIVE = 0x0100,
        /// The method has no body
        ABSTRACT = 0x0400,
        /// Generated by a tool rather than written by hand
        SYNTHETIC = 0x1000,
        /// Rewritten by the instrumenter, the method already dispatches on the continuation mode
        INSTRUMENTED = 0x4000,
    }
}

flags! {
    /// Flags that apply to a whole [CompiledUnit]
    UnitFlags: u8 {
        /// No flags set
        NONE = 0,
        /// The unit's eligible methods have been instrumented
        INSTRUMENTED = 0x01,
    }
}

impl AccessFlags {
    /// True if the method has no receiver
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// True if the method is native or abstract
    pub fn has_no_body(self) -> bool {
        self.contains(Self::NATIVE) || self.contains(Self::ABSTRACT)
    }

    /// True if the method has been rewritten by the instrumenter
    pub fn is_instrumented(self) -> bool {
        self.contains(Self::INSTRUMENTED)
    }
}

/// A verifier-assist record of the frame at a jump target
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackMapEntry {
    /// The label that the frame applies to
    pub label: Label,
    /// The types of the local slots at the label
    pub locals: Vec<FrameValue>,
    /// The types of the operand stack values at the label, bottom first
    pub stack: Vec<FrameValue>,
}

/// A method in a [CompiledUnit]
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    /// The method's name
    pub name: String,
    /// The method's parameter and return types
    pub descriptor: MethodDescriptor,
    /// The method's access flags
    pub access: AccessFlags,
    /// The maximum size of the operand stack in slots
    pub max_stack: u16,
    /// The number of local slots
    pub max_locals: u16,
    /// The method's body
    pub instructions: InstructionList,
    /// Frames recorded at jump targets
    pub stack_map: Vec<StackMapEntry>,
}

impl Method {
    /// Initializes a method with an empty body
    pub fn new(name: impl Into<String>, descriptor: MethodDescriptor, access: AccessFlags) -> Self {
        Self {
            name: name.into(),
            descriptor,
            access,
            max_stack: 0,
            max_locals: 0,
            instructions: InstructionList::new(),
            stack_map: Vec::new(),
        }
    }

    /// The method's name followed by its descriptor, e.g. `run(I)V`
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// A named type definition containing an ordered collection of methods
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledUnit {
    /// The unit's name, e.g. `app/Worker`
    pub name: String,
    /// Flags that apply to the unit
    pub flags: UnitFlags,
    /// The unit's methods
    pub methods: Vec<Method>,
}

impl CompiledUnit {
    /// Initializes an empty unit
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Finds a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| method.name == name && &method.descriptor == descriptor)
    }

    /// Returns a [String] displaying the unit's methods and their instructions
    pub fn instructions_as_string(&self) -> String {
        let mut result = String::new();

        writeln!(result, "unit {}", self.name).ok();
        if self.flags.contains(UnitFlags::INSTRUMENTED) {
            writeln!(result, "  (instrumented)").ok();
        }

        for method in self.methods.iter() {
            writeln!(
                result,
                "\nmethod {} access: {:#06x} max_stack: {} max_locals: {}",
                method.signature(),
                method.access.0,
                method.max_stack,
                method.max_locals
            )
            .ok();

            for (position, instruction) in method.instructions.iter().enumerate() {
                writeln!(result, "{position}\t{instruction}").ok();
            }

            for entry in method.stack_map.iter() {
                write!(result, "  frame {}: locals: [", entry.label).ok();
                write_values(&mut result, &entry.locals);
                result.push_str("] stack: [");
                write_values(&mut result, &entry.stack);
                result.push_str("]\n");
            }
        }

        result
    }
}

fn write_values(output: &mut String, values: &[FrameValue]) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        write!(output, "{value}").ok();
    }
}

impl fmt::Display for CompiledUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.instructions_as_string())
    }
}
