use crate::{Continuation, ErrorKind, Result, Value, Vm};
use coil_bytecode::{MethodDescriptor, continuation::MODE_LOADING};
use std::rc::Rc;
use tracing::debug;

/// The outcome of resuming a [Coroutine]
#[derive(Clone, Debug, PartialEq)]
pub enum Resumed {
    /// The entry method suspended, the coroutine can be resumed again
    Suspended,
    /// The entry method returned, with its return value
    Finished(Option<Value>),
}

/// The states that a [Coroutine] can be in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoroutineState {
    /// The coroutine hasn't been started
    Ready,
    /// The coroutine suspended and is waiting to be resumed
    Suspended,
    /// The coroutine returned or failed
    Finished,
}

/// Drives an instrumented entry method, resuming it each time it suspends
///
/// The first call to [Coroutine::resume] runs the entry method with a fresh continuation
/// capability. Each subsequent call replays the suspended call chain in LOADING mode, continuing
/// from the point where it suspended.
pub struct Coroutine {
    owner: String,
    name: String,
    descriptor: String,
    args: Vec<Value>,
    continuation: Rc<Continuation>,
    state: CoroutineState,
}

impl Coroutine {
    /// Makes a coroutine for a static entry method
    ///
    /// The continuation capability is passed as the first argument, followed by `args`.
    pub fn new(owner: &str, name: &str, descriptor: &str, args: Vec<Value>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            args,
            continuation: Rc::default(),
            state: CoroutineState::Ready,
        }
    }

    /// Makes a coroutine for an instance entry method, called with the given receiver
    pub fn with_receiver(
        receiver: Value,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
    ) -> Self {
        let mut result = Self::new(owner, name, descriptor, args);
        result.args.insert(0, receiver);
        result
    }

    /// Runs the coroutine until it suspends or finishes
    pub fn resume(&mut self, vm: &mut Vm) -> Result<Resumed> {
        match self.state {
            CoroutineState::Finished => return Err(ErrorKind::CoroutineFinished.into()),
            CoroutineState::Suspended => {
                debug!(
                    entry = %self.name,
                    states = self.continuation.state_count(),
                    "resuming"
                );
                self.continuation.set_mode(MODE_LOADING);
            }
            CoroutineState::Ready => {}
        }

        let args = self.call_args(vm);
        let result = vm.call(&self.owner, &self.name, &self.descriptor, &args);

        let value = match result {
            Ok(value) => value,
            Err(error) => {
                self.state = CoroutineState::Finished;
                return Err(error);
            }
        };

        if self.continuation.is_saving() {
            debug!(
                entry = %self.name,
                states = self.continuation.state_count(),
                "suspended"
            );
            self.state = CoroutineState::Suspended;
            Ok(Resumed::Suspended)
        } else {
            self.state = CoroutineState::Finished;
            Ok(Resumed::Finished(value))
        }
    }

    /// The coroutine's current state
    pub fn state(&self) -> CoroutineState {
        self.state
    }

    /// The capability that's passed to the entry method
    pub fn continuation(&self) -> &Continuation {
        &self.continuation
    }

    // The capability follows the receiver for instance methods
    fn call_args(&self, vm: &Vm) -> Vec<Value> {
        let descriptor = self.descriptor.parse::<MethodDescriptor>().ok();
        let is_instance = vm
            .unit(&self.owner)
            .and_then(|unit| {
                unit.methods.iter().find(|method| {
                    method.name == self.name && Some(&method.descriptor) == descriptor.as_ref()
                })
            })
            .is_some_and(|method| !method.access.is_static());

        let mut args = self.args.clone();
        let position = if is_instance && !args.is_empty() { 1 } else { 0 };
        args.insert(position, self.continuation.to_value());
        args
    }
}
