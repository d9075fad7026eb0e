macro_rules! ops {
    ($($(#[$meta:meta])* $name:ident = $value:literal,)+) => {
        /// The op codes used in the binary encoding of a method body
        ///
        /// Each instruction is encoded as an op byte followed by its operands.
        /// The [UnitWriter](crate::UnitWriter) produces them, and the
        /// [UnitReader](crate::UnitReader) turns them back into [Instruction](crate::Instruction)s.
        ///
        /// In the comments for each op, the operand bytes are specified inside square brackets.
        /// Operand prefixes:
        ///     @ - A variable-sized unsigned integer.
        ///         - The 7 least significant bits are included in the integer.
        ///         - The 8th bit in a byte is a continuation flag.
        ///     # - A fixed-size little-endian value.
        ///     $ - A string: a @length followed by that many bytes of UTF-8.
        ///     k - A value kind byte (int, long, float, double, reference).
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        #[repr(u8)]
        pub enum Op {
            $($(#[$meta])* $name = $value,)+
        }

        impl TryFrom<u8> for Op {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, Self::Error> {
                match byte {
                    $($value => Ok(Self::$name),)+
                    unknown => Err(unknown),
                }
            }
        }
    };
}

ops! {
    /// Places a label
    ///
    /// `[@label]`
    Label = 0,

    /// `[]`
    Nop = 1,

    /// Pushes null
    ///
    /// `[]`
    ConstNull = 2,

    /// `[#i32]`
    ConstInt = 3,

    /// `[#i64]`
    ConstLong = 4,

    /// `[#f32 bits]`
    ConstFloat = 5,

    /// `[#f64 bits]`
    ConstDouble = 6,

    /// `[$string]`
    ConstString = 7,

    /// Pushes the value in a local slot
    ///
    /// `[k, @local]`
    Load = 8,

    /// Pops a value into a local slot
    ///
    /// `[k, @local]`
    Store = 9,

    /// `[@local, #i16 delta]`
    Increment = 10,

    /// `[]`
    Pop = 11,

    /// `[]`
    Pop2 = 12,

    /// `[]`
    Dup = 13,

    /// `[]`
    DupX1 = 14,

    /// `[]`
    DupX2 = 15,

    /// `[]`
    Dup2 = 16,

    /// `[]`
    Swap = 17,

    /// `[binary op, k]`
    Binary = 18,

    /// `[k]`
    Negate = 19,

    /// `[k from, k to]`
    Convert = 20,

    /// `[k, nan is greater (0 or 1)]`
    Compare = 21,

    /// `[condition, @label]`
    If = 22,

    /// `[condition, @label]`
    IfCompare = 23,

    /// `[equal (0 or 1), @label]`
    IfReferenceEqual = 24,

    /// `[null (0 or 1), @label]`
    IfNull = 25,

    /// `[@label]`
    Goto = 26,

    /// `[@label]`
    Jsr = 27,

    /// `[@local]`
    Ret = 28,

    /// `[#i32 low, @default label, @target count, @target labels...]`
    TableSwitch = 29,

    /// `[@default label, @case count, (#i32 key, @label)...]`
    LookupSwitch = 30,

    /// `[$owner, $name, $descriptor]`
    InvokeStatic = 31,

    /// `[$owner, $name, $descriptor]`
    InvokeVirtual = 32,

    /// `[$element type descriptor]`
    NewArray = 33,

    /// `[]`
    ArrayLength = 34,

    /// `[k]`
    ArrayLoad = 35,

    /// `[k]`
    ArrayStore = 36,

    /// `[$type descriptor]`
    CheckCast = 37,

    /// `[$type descriptor]`
    InstanceOf = 38,

    /// `[]`
    Throw = 39,

    /// `[]`
    MonitorEnter = 40,

    /// `[]`
    MonitorExit = 41,

    /// `[k]`
    Return = 42,

    /// `[]`
    ReturnVoid = 43,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_bytes_round_trip() {
        for byte in 0..=Op::ReturnVoid as u8 {
            let op = Op::try_from(byte).expect("op codes should be contiguous");
            assert_eq!(op as u8, byte);
        }
        assert_eq!(Op::try_from(Op::ReturnVoid as u8 + 1), Err(Op::ReturnVoid as u8 + 1));
    }
}
