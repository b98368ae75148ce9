//! The bytecode virtual machine: a stack-based execution engine.

use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::BinaryOp;
use crate::error::RuntimeError;

use super::chunk::{Chunk, CompiledModule};
use super::config::VmConfig;
use super::disassembler::describe_op;
use super::env::{bind, Bindings, CapturedEnv};
use super::natives;
use super::opcode::Op;
use super::value::{Function, NativeFunction, Value};

/// A call frame on the VM call stack.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Where the caller resumes.
    pub return_ip: usize,
    /// Chunk the caller was executing.
    pub return_chunk: Rc<Chunk>,
    /// Parameters and local assignments.
    pub locals: Rc<Bindings>,
    /// Snapshot taken when the callee was created.
    pub captured: Rc<CapturedEnv>,
    /// Stack length at entry; everything above belongs to this frame.
    pub stack_base: usize,
    /// Iterator stack length at entry.
    pub iter_base: usize,
    /// The function being run, if the frame belongs to one.
    pub function: Option<Rc<Function>>,
}

/// Iterator state for for-in loops.
#[derive(Debug, Clone)]
pub struct IterState {
    pub items: Vec<Value>,
    pub index: usize,
}

/// Where `Print` output goes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Output {
    #[default]
    Stdout,
    /// Keep each printed line.
    Capture(Vec<String>),
}

/// How a dispatch loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    /// The frame the loop was started for returned.
    Returned(Value),
    /// A halt instruction ran.
    Halted,
    /// The instruction stream was exhausted.
    Finished,
}

/// The bytecode VM.
pub struct Vm {
    /// Value stack.
    pub stack: Vec<Value>,
    /// Call frame stack. Empty at top level.
    pub frames: Vec<CallFrame>,
    /// Global variables.
    pub globals: Rc<Bindings>,
    /// Host functions, consulted first when a call names its callee.
    pub functions: AHashMap<String, Value>,
    /// Iterator state stack (for for-in loops).
    pub iter_stack: Vec<IterState>,
    /// Destination for print statements.
    pub output: Output,
    pub config: VmConfig,
    /// Chunk being executed.
    pub(super) chunk: Rc<Chunk>,
    /// Next instruction.
    pub(super) ip: usize,
    /// Dispatch loops currently nested inside host code.
    pub(super) native_depth: usize,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// An engine with the given configuration and the built-in natives.
    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            globals: Rc::default(),
            functions: AHashMap::new(),
            iter_stack: Vec::new(),
            output: Output::Stdout,
            config,
            chunk: Rc::default(),
            ip: 0,
            native_depth: 0,
        };
        natives::install(&mut vm);
        vm
    }

    /// Add a host function to the global function table.
    pub fn register_native(&mut self, native: NativeFunction) {
        self.functions
            .insert(native.name.clone(), Value::NativeFunction(native));
    }

    /// Start recording printed lines instead of writing to stdout.
    pub fn capture_output(&mut self) {
        self.output = Output::Capture(Vec::new());
    }

    /// Drain the recorded lines.
    pub fn take_output(&mut self) -> Vec<String> {
        match &mut self.output {
            Output::Capture(lines) => std::mem::take(lines),
            Output::Stdout => Vec::new(),
        }
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        bind(&mut self.globals, name, value);
    }

    /// Execute a compiled module from its first instruction.
    ///
    /// Globals persist across runs; stacks do not. A halt anywhere in the
    /// program, including inside a native callback, ends the run with `Ok`.
    pub fn execute(&mut self, module: &CompiledModule) -> Result<(), RuntimeError> {
        self.reset();
        self.chunk = module.chunk.clone();
        self.ip = 0;
        match self.run_until(None) {
            Ok(_) => Ok(()),
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    /// Reset VM state between runs (preserves globals and natives).
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.iter_stack.clear();
        self.native_depth = 0;
    }

    /// Run the dispatch loop until the instruction stream ends, a halt runs,
    /// or (when `depth` is set) the frame count drops back to `depth`.
    pub(super) fn run_until(&mut self, depth: Option<usize>) -> Result<Exit, RuntimeError> {
        loop {
            let offset = self.ip;
            let op = match self.chunk.code.get(offset) {
                Some(op) => *op,
                None => return Ok(Exit::Finished),
            };
            self.ip += 1;

            if self.config.trace {
                eprintln!("[TRACE] {:04} {}", offset, describe_op(&op, &self.chunk));
            }

            match self.dispatch(op, depth) {
                Ok(None) => {}
                Ok(Some(exit)) => return Ok(exit),
                Err(RuntimeError::Halted) if depth.is_none() => {
                    self.halt();
                    return Ok(Exit::Halted);
                }
                Err(err) => {
                    let instruction = describe_op(&op, &self.chunk);
                    return Err(err.at(offset, instruction, self.chunk.span_at(offset)));
                }
            }
        }
    }

    fn halt(&mut self) {
        self.reset();
        if self.config.announce_halt {
            self.write_line("Program finished.".to_string());
        }
    }

    fn dispatch(&mut self, op: Op, depth: Option<usize>) -> Result<Option<Exit>, RuntimeError> {
        match op {
            Op::LoadConst(idx) => {
                let value = match self.chunk.constants.get(idx as usize) {
                    Some(constant) => Value::from(constant),
                    None => return Err(RuntimeError::new(format!("Bad constant index {}", idx))),
                };
                self.push(value);
            }
            Op::Pop => {
                self.pop()?;
            }

            Op::LoadVar(idx) => match self.lookup_variable(self.chunk.name(idx)) {
                Some(value) => self.push(value),
                None => {
                    return Err(RuntimeError::undefined_variable(self.chunk.name(idx)));
                }
            },
            Op::StoreVar(idx) => {
                let value = self.pop()?;
                let name = self.chunk.name(idx);
                match self.frames.last_mut() {
                    Some(frame) => bind(&mut frame.locals, name, value),
                    None => bind(&mut self.globals, name, value),
                }
            }

            Op::Binary(operator) => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = self.binary_op(operator, a, b)?;
                self.push(result);
            }
            Op::Negate => {
                let val = self.pop()?;
                let result = match val {
                    Value::Int(n) => n.checked_neg().map(Value::Int).ok_or_else(|| {
                        RuntimeError::type_error(format!("Integer overflow in -({})", n))
                    })?,
                    Value::Float(x) => Value::Float(-x),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "Cannot negate {}",
                            other.type_name()
                        )))
                    }
                };
                self.push(result);
            }

            // --- Control flow ---
            Op::Jump(target) => {
                self.ip = target;
            }
            Op::JumpIfFalse(target) => {
                let cond = self.pop()?;
                if !cond.is_truthy() {
                    self.ip = target;
                }
            }
            Op::Halt => return Err(RuntimeError::Halted),

            // --- Functions ---
            Op::FuncDef(idx) => {
                let proto = match self.chunk.functions.get(idx as usize) {
                    Some(proto) => proto.clone(),
                    None => return Err(RuntimeError::new(format!("Bad function index {}", idx))),
                };
                let function = Function {
                    name: proto.name,
                    params: proto.params,
                    chunk: self.chunk.clone(),
                    start: proto.start,
                    env: self.capture_scope(),
                };
                self.push(Value::Function(Rc::new(function)));
            }
            Op::Call { name, argc } => {
                let args = self.pop_n(argc as usize)?;
                let callee = match name {
                    Some(idx) => {
                        let chunk = self.chunk.clone();
                        self.resolve_callee(chunk.name(idx))?
                    }
                    None => self.pop()?,
                };
                self.call_value(callee, args)?;
            }
            Op::Return => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| RuntimeError::new("'return' outside of a function"))?;
                let result = if self.stack.len() > frame.stack_base {
                    self.pop()?
                } else {
                    Value::Absent
                };
                self.stack.truncate(frame.stack_base);
                self.iter_stack.truncate(frame.iter_base);
                self.ip = frame.return_ip;
                self.chunk = frame.return_chunk;

                if depth == Some(self.frames.len()) {
                    return Ok(Some(Exit::Returned(result)));
                }
                self.push(result);
            }

            // --- Collections ---
            Op::BuildList(n) => {
                let items = self.pop_n(n as usize)?;
                self.push(Value::list(items));
            }
            Op::BuildSet(n) => {
                let items = self.pop_n(n as usize)?;
                let set = Value::set_from(items)?;
                self.push(set);
            }
            Op::BuildTuple(n) => {
                let items = self.pop_n(n as usize)?;
                self.push(Value::tuple(items));
            }
            Op::BuildMapping(n) => {
                let flat = self.pop_n(2 * n as usize)?;
                let mut pairs = Vec::with_capacity(n as usize);
                let mut flat = flat.into_iter();
                while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
                    pairs.push((key, value));
                }
                let mapping = Value::mapping_from(pairs)?;
                self.push(mapping);
            }
            Op::Comprehension(idx) => {
                let result = self.run_comprehension(idx)?;
                self.push(result);
            }

            // --- Iterators ---
            Op::GetIter => {
                let iterable = self.pop()?;
                let items = iterable.iter_values()?;
                self.iter_stack.push(IterState { items, index: 0 });
            }
            Op::ForIter(exit) => {
                let state = self
                    .iter_stack
                    .last_mut()
                    .ok_or_else(|| RuntimeError::new("No active iterator"))?;
                match state.items.get(state.index).cloned() {
                    Some(value) => {
                        state.index += 1;
                        self.push(value);
                    }
                    None => {
                        self.iter_stack.pop();
                        self.ip = exit;
                    }
                }
            }

            // --- I/O ---
            Op::Print => {
                let value = self.pop()?;
                self.write_line(value.to_string());
            }
        }
        Ok(None)
    }

    // --- Stack helpers ---

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::new("Stack underflow"))
    }

    /// Pop `n` values, oldest first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let floor = self.frames.last().map_or(0, |frame| frame.stack_base);
        if self.stack.len() < floor + n {
            return Err(RuntimeError::new("Stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub(super) fn write_line(&mut self, line: String) {
        match &mut self.output {
            Output::Stdout => println!("{}", line),
            Output::Capture(lines) => lines.push(line),
        }
    }

    // --- Variables ---

    /// Resolve a name: frame locals, then the frame's captured snapshot,
    /// then globals. A function can always see itself by name.
    pub fn lookup_variable(&self, name: &str) -> Option<Value> {
        let frame = self.frames.last();
        if let Some(frame) = frame {
            if let Some(value) = frame.locals.get(name) {
                return Some(value.clone());
            }
            if let Some(value) = frame.captured.lookup(name) {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Some(value.clone());
        }
        frame
            .and_then(|frame| frame.function.as_ref())
            .filter(|function| function.name.as_deref() == Some(name))
            .map(|function| Value::Function(function.clone()))
    }

    /// Snapshot of everything visible from the current frame.
    pub(super) fn capture_scope(&self) -> Rc<CapturedEnv> {
        let env = match self.frames.last() {
            Some(frame) => CapturedEnv::new(
                frame.locals.clone(),
                Some(frame.captured.clone()),
                self.globals.clone(),
            ),
            None => CapturedEnv::new(Rc::default(), None, self.globals.clone()),
        };
        Rc::new(env)
    }

    // --- Operators ---

    fn binary_op(&self, operator: BinaryOp, a: Value, b: Value) -> Result<Value, RuntimeError> {
        match operator {
            BinaryOp::Add => self.op_add(a, b),
            BinaryOp::Subtract => arithmetic(operator, &a, &b, i64::checked_sub, |x, y| x - y),
            BinaryOp::Multiply => arithmetic(operator, &a, &b, i64::checked_mul, |x, y| x * y),
            BinaryOp::Divide => self.op_divide(&a, &b),
            BinaryOp::Modulo => self.op_modulo(&a, &b),
            BinaryOp::Equal => Ok(Value::Bool(a == b)),
            BinaryOp::NotEqual => Ok(Value::Bool(a != b)),
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                self.op_compare(operator, &a, &b).map(Value::Bool)
            }
        }
    }

    fn op_add(&self, a: Value, b: Value) -> Result<Value, RuntimeError> {
        match (&a, &b) {
            (Value::Text(x), Value::Text(y)) => {
                let mut joined = String::with_capacity(x.len() + y.len());
                joined.push_str(x);
                joined.push_str(y);
                Ok(Value::Text(joined))
            }
            (Value::List(x), Value::List(y)) => {
                let mut items = x.borrow().clone();
                items.extend(y.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            _ => arithmetic(BinaryOp::Add, &a, &b, i64::checked_add, |x, y| x + y),
        }
    }

    fn op_divide(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        let (x, y) = numeric_pair(a, b).ok_or_else(|| unsupported(BinaryOp::Divide, a, b))?;
        if y == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        Ok(Value::Float(x / y))
    }

    fn op_modulo(&self, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        match (a, b) {
            (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
            (Value::Int(x), Value::Int(y)) => {
                let r = x.wrapping_rem(*y);
                let floored = if r != 0 && ((r < 0) != (*y < 0)) { r + y } else { r };
                Ok(Value::Int(floored))
            }
            _ => {
                let (x, y) =
                    numeric_pair(a, b).ok_or_else(|| unsupported(BinaryOp::Modulo, a, b))?;
                if y == 0.0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                let r = x % y;
                let floored = if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r };
                Ok(Value::Float(floored))
            }
        }
    }

    fn op_compare(&self, operator: BinaryOp, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        use std::cmp::Ordering;

        let ordering: Option<Ordering> = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
            (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
            _ => {
                let (x, y) = numeric_pair(a, b).ok_or_else(|| unsupported(operator, a, b))?;
                x.partial_cmp(&y)
            }
        };
        // NaN compares false against everything.
        Ok(match ordering {
            None => false,
            Some(ord) => match operator {
                BinaryOp::Less => ord == Ordering::Less,
                BinaryOp::LessEqual => ord != Ordering::Greater,
                BinaryOp::Greater => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            },
        })
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_pair(a: &Value, b: &Value) -> Option<(f64, f64)> {
    let x = match a {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => return None,
    };
    let y = match b {
        Value::Int(n) => *n as f64,
        Value::Float(y) => *y,
        _ => return None,
    };
    Some((x, y))
}

fn unsupported(operator: BinaryOp, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "Unsupported operand types for {}: {} and {}",
        operator,
        a.type_name(),
        b.type_name()
    ))
}

/// Int op int stays integral (overflow faults); any float promotes.
fn arithmetic(
    operator: BinaryOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        return int_op(*x, *y).map(Value::Int).ok_or_else(|| {
            RuntimeError::type_error(format!("Integer overflow in {} {} {}", x, operator, y))
        });
    }
    let (x, y) = numeric_pair(a, b).ok_or_else(|| unsupported(operator, a, b))?;
    Ok(Value::Float(float_op(x, y)))
}
