use crate::{ErrorKind, Object, ObjectRef, Result, Value};
use coil_bytecode::continuation::{MODE_LOADING, MODE_NORMAL, MODE_SAVING};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};
use tracing::trace;

/// The continuation capability that's passed to instrumented methods
///
/// The capability holds the current mode and a stack of saved method states.
/// When a chain of instrumented methods suspends, each method in the chain pushes its state,
/// innermost first. Resuming replays the chain from the outermost method, with each method popping
/// its own state.
#[derive(Debug, Default)]
pub struct Continuation {
    mode: Cell<i32>,
    states: RefCell<Vec<ObjectRef>>,
}

impl Continuation {
    /// Makes a new capability in NORMAL mode, wrapped in a [Value]
    pub fn new_value() -> Value {
        Rc::new(Self::default()).to_value()
    }

    /// Wraps a shared capability in a [Value]
    pub fn to_value(self: &Rc<Self>) -> Value {
        Object::Continuation(self.clone()).into()
    }

    /// The current mode
    pub fn mode(&self) -> i32 {
        self.mode.get()
    }

    /// Sets the current mode
    pub fn set_mode(&self, mode: i32) {
        trace!(mode = mode_name(mode), "setting continuation mode");
        self.mode.set(mode);
    }

    /// True if a suspension is being unwound
    pub fn is_saving(&self) -> bool {
        self.mode() == MODE_SAVING
    }

    /// Pushes a saved method state
    pub fn push_method_state(&self, state: ObjectRef) {
        self.states.borrow_mut().push(state);
    }

    /// Pops the most recently pushed method state
    ///
    /// Once the last state has been popped the capability returns to NORMAL mode, so that the
    /// innermost method continues running normally from its suspension point.
    pub fn pop_method_state(&self) -> Result<ObjectRef> {
        let mut states = self.states.borrow_mut();
        let Some(state) = states.pop() else {
            return Err(ErrorKind::EmptyStateStack.into());
        };

        if states.is_empty() {
            self.mode.set(MODE_NORMAL);
        }

        Ok(state)
    }

    /// The number of saved method states
    pub fn state_count(&self) -> usize {
        self.states.borrow().len()
    }

    /// Returns the saved method states, innermost first
    pub fn states(&self) -> Vec<ObjectRef> {
        self.states.borrow().clone()
    }

    /// Discards any saved states and returns to NORMAL mode
    pub fn reset(&self) {
        self.states.borrow_mut().clear();
        self.mode.set(MODE_NORMAL);
    }
}

/// A snapshot of a suspended method's frame
#[derive(Debug)]
pub struct MethodState {
    continuation_point: i32,
    stack: Value,
    locals: Value,
}

impl MethodState {
    /// Makes a method state from a point id and the saved stack and locals arrays
    pub fn new(continuation_point: i32, stack: Value, locals: Value) -> Self {
        Self {
            continuation_point,
            stack,
            locals,
        }
    }

    /// The id of the continuation point where the method was suspended
    pub fn continuation_point(&self) -> i32 {
        self.continuation_point
    }

    /// The saved operand stack, bottom to top
    pub fn stack(&self) -> &Value {
        &self.stack
    }

    /// The saved locals, indexed by slot
    pub fn locals(&self) -> &Value {
        &self.locals
    }

    /// The saved operand stack's values
    pub fn stack_values(&self) -> Vec<Value> {
        array_values(&self.stack)
    }

    /// The saved locals' values
    pub fn local_values(&self) -> Vec<Value> {
        array_values(&self.locals)
    }
}

fn array_values(value: &Value) -> Vec<Value> {
    match value.as_object().map(Rc::as_ref) {
        Some(Object::Array(array)) => array.to_vec(),
        _ => Vec::new(),
    }
}

/// Returns the name of a mode, used in logging
pub fn mode_name(mode: i32) -> &'static str {
    match mode {
        MODE_NORMAL => "normal",
        MODE_SAVING => "saving",
        MODE_LOADING => "loading",
        _ => "unknown",
    }
}
