//! Function call dispatch for the VM.

use std::rc::Rc;

use crate::error::RuntimeError;

use super::chunk::Chunk;
use super::env::{Bindings, CapturedEnv};
use super::value::{Function, NativeFunction, Value};
use super::vm::{CallFrame, Exit, Vm};

impl Vm {
    /// Resolve a callee given by name: the host function table first, then
    /// ordinary variable lookup.
    pub fn resolve_callee(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(native) = self.functions.get(name) {
            return Ok(native.clone());
        }
        self.lookup_variable(name)
            .ok_or_else(|| RuntimeError::undefined_function(name))
    }

    /// Call a value from the dispatch loop. A user function gets a new frame
    /// and the loop continues in its body; a native runs to completion and
    /// its result is pushed.
    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<(), RuntimeError> {
        match callee {
            Value::Function(function) => self.call_closure(function, args),
            Value::NativeFunction(native) => {
                let result = self.call_native(&native, args)?;
                self.push(result);
                Ok(())
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, function: Rc<Function>, args: Vec<Value>) -> Result<(), RuntimeError> {
        // Check arity before binding anything.
        if args.len() != function.arity() {
            return Err(RuntimeError::wrong_arity(
                function.display_name(),
                function.arity(),
                args.len(),
            ));
        }

        let mut locals = Bindings::with_capacity(args.len());
        for (param, arg) in function.params.iter().zip(args) {
            locals.insert(param.clone(), arg);
        }

        self.push_frame(
            function.chunk.clone(),
            function.start,
            Rc::new(locals),
            function.env.clone(),
            Some(function),
        )
    }

    fn call_native(&mut self, native: &NativeFunction, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if args.len() != native.arity {
            return Err(RuntimeError::wrong_arity(
                native.name.clone(),
                native.arity,
                args.len(),
            ));
        }
        (native.func)(self, args)
    }

    /// Push a frame and transfer control to `start` in `chunk`.
    pub(super) fn push_frame(
        &mut self,
        chunk: Rc<Chunk>,
        start: usize,
        locals: Rc<Bindings>,
        captured: Rc<CapturedEnv>,
        function: Option<Rc<Function>>,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded(self.config.max_call_depth));
        }

        let return_chunk = std::mem::replace(&mut self.chunk, chunk);
        self.frames.push(CallFrame {
            return_ip: self.ip,
            return_chunk,
            locals,
            captured,
            stack_base: self.stack.len(),
            iter_base: self.iter_stack.len(),
            function,
        });
        self.ip = start;
        Ok(())
    }

    /// Call a function value from host code and run it to completion.
    ///
    /// This is the re-entrant path used by natives that take callbacks. The
    /// instruction pointer is saved and restored around the nested run, so
    /// the outer dispatch loop resumes where it left off. A halt inside the
    /// callback comes back as [`RuntimeError::Halted`]; propagate it.
    /// Re-entry nesting is bounded by `VmConfig::max_native_depth`.
    pub fn call_function(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => {
                let function = function.clone();
                self.run_nested(move |vm| vm.call_closure(function, args))
            }
            Value::NativeFunction(native) => self.call_native(native, args),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    /// Evaluate a code region ending in `RETURN` under the given bindings.
    pub(super) fn eval_region(
        &mut self,
        chunk: &Rc<Chunk>,
        start: usize,
        locals: Rc<Bindings>,
        scope: &Rc<CapturedEnv>,
        function: Option<Rc<Function>>,
    ) -> Result<Value, RuntimeError> {
        self.run_nested(|vm| vm.push_frame(chunk.clone(), start, locals, scope.clone(), function))
    }

    fn run_nested(
        &mut self,
        enter: impl FnOnce(&mut Self) -> Result<(), RuntimeError>,
    ) -> Result<Value, RuntimeError> {
        if self.native_depth >= self.config.max_native_depth {
            return Err(RuntimeError::NativeDepthExceeded(self.config.max_native_depth));
        }
        let saved_ip = self.ip;
        let saved_chunk = self.chunk.clone();
        let depth = self.frames.len();
        let stack_len = self.stack.len();
        let iter_len = self.iter_stack.len();

        self.native_depth += 1;
        let outcome = match enter(self) {
            Ok(()) => self.run_until(Some(depth)),
            Err(err) => Err(err),
        };
        self.native_depth -= 1;

        self.ip = saved_ip;
        self.chunk = saved_chunk;

        let err = match outcome {
            Ok(Exit::Returned(value)) => return Ok(value),
            Ok(Exit::Halted) => RuntimeError::Halted,
            Ok(Exit::Finished) => RuntimeError::new("Nested call ran past the end of its code"),
            Err(err) => err,
        };
        self.frames.truncate(depth);
        self.stack.truncate(stack_len);
        self.iter_stack.truncate(iter_len);
        Err(err)
    }
}
