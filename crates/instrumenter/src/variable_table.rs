use coil_bytecode::AccessFlags;

/// The local slots used by instrumentation code
///
/// The slots are allocated directly after the method's original locals so that they never
/// overlap with a slot used by the original body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableTable {
    /// The slot that holds the capability parameter on entry
    pub continuation_param: u16,
    /// A cached reference to the capability object
    pub continuation: u16,
    /// The operand stack snapshot array
    pub stack_array: u16,
    /// The local slot snapshot array
    pub locals_array: u16,
    /// A scratch reference slot
    pub temp: u16,
    /// The method's local count before instrumentation
    pub original_max_locals: u16,
}

/// The number of slots added by a [VariableTable]
pub const EXTRA_SLOTS: u32 = 4;

impl VariableTable {
    /// Allocates the instrumentation slots for a method
    ///
    /// The caller is responsible for checking that `max_locals + EXTRA_SLOTS` fits in the format,
    /// slot indices that would overflow saturate at `u16::MAX`.
    pub fn new(access: AccessFlags, max_locals: u16) -> Self {
        let slot = |offset: u16| max_locals.saturating_add(offset);

        Self {
            continuation_param: if access.is_static() { 0 } else { 1 },
            continuation: slot(0),
            stack_array: slot(1),
            locals_array: slot(2),
            temp: slot(3),
            original_max_locals: max_locals,
        }
    }

    /// The number of local slots needed by the instrumented method
    pub fn max_locals(&self) -> u32 {
        self.original_max_locals as u32 + EXTRA_SLOTS
    }
}
