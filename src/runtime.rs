//! The bytecode machine.
//!
//! A [`Vm`] owns everything a running program touches: the heap, the globals, the operand
//! and frame stacks, its ports and its configuration. Several machines can coexist in one
//! process without sharing anything.

pub mod error;
pub mod frame;
pub mod operation;
pub mod port;
pub mod procedure;

use std::{fmt::Write as _, io::Write};

use crate::{
    compiler::{
        self,
        chunk::{InvalidOpCode, OpCode},
        disassemble::{disassemble_chunk, disassemble_instruction},
    },
    world::{
        fuel::Fuel,
        gc::{CollectReport, GcConfig, Roots},
        object::Object,
        table::{Key, Table},
        value::{DisplayValue, ObjRef, Value},
        Heap,
    },
};
use error::{InterpretError, RuntimeError, RuntimeErrorKind, TraceFrame};
use frame::CallFrame;
use operation::Operator;
use port::{InputPort, OutputPort};

/// Name of the global procedure `while` replays as its condition.
pub const WHILE_CONDITION: &str = "while_condition";

// pinned[0] is the reserved `while_condition` name, it survives resets
const RESERVED_PINS: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    /// operand stack slots
    pub stack_max: usize,
    /// call frames
    pub frames_max: usize,
    /// nested procedure replays
    pub replay_depth_max: usize,
    /// `^` reads at most one byte less than this
    pub scan_buffer: usize,
    /// instruction budget for every `interpret` call, unlimited when `None`
    pub fuel: Option<i32>,
    pub trace_execution: bool,
    pub print_code: bool,
    pub log_gc: bool,
    pub gc: GcConfig,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_max: 16384,
            frames_max: 64,
            replay_depth_max: 512,
            scan_buffer: 1024,
            fuel: None,
            trace_execution: false,
            print_code: false,
            log_gc: false,
            gc: GcConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    open_upvalues: Option<ObjRef>,
    /// objects kept alive while nothing else reaches them
    pinned: Vec<ObjRef>,
    while_condition: ObjRef,
    replay_depth: usize,
    fuel: Option<Fuel>,
    config: VmConfig,
    input: InputPort,
    output: OutputPort,
    error: OutputPort,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Vm {
    /// A machine reading stdin and writing to stdout and stderr.
    pub fn new(config: VmConfig) -> Self {
        let mut heap = Heap::new(config.gc.clone());
        let while_condition = heap.intern(WHILE_CONDITION);
        Self {
            heap,
            stack: vec![],
            frames: vec![],
            globals: Table::new(),
            open_upvalues: None,
            pinned: vec![while_condition],
            while_condition,
            replay_depth: 0,
            fuel: config.fuel.map(Fuel::with),
            config,
            input: InputPort::stdin(),
            output: OutputPort::stdout(),
            error: OutputPort::stderr(),
        }
    }

    pub fn with_input(mut self, input: InputPort) -> Self {
        self.input = input;
        self
    }

    /// Where `.` writes.
    pub fn with_output(mut self, output: OutputPort) -> Self {
        self.output = output;
        self
    }

    /// Where errors and diagnostics go.
    pub fn with_error(mut self, error: OutputPort) -> Self {
        self.error = error;
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn globals(&self) -> &Table {
        &self.globals
    }

    pub fn fuel(&self) -> Option<&Fuel> {
        self.fuel.as_ref()
    }

    pub fn display(&self, value: Value) -> DisplayValue<'_> {
        self.heap.display(value)
    }

    /// Current value of a global, `None` when unbound.
    pub fn global(&self, name: &str) -> Option<Value> {
        let name = self.heap.find_interned(name)?;
        self.globals.get(self.heap.key(name)?)
    }

    pub fn frame_closures(&self) -> Vec<ObjRef> {
        self.frames.iter().map(|frame| frame.closure).collect()
    }

    /// Every GC root of this machine. `closures` comes from [`Vm::frame_closures`].
    pub fn roots<'a>(&'a self, closures: &'a [ObjRef]) -> Roots<'a> {
        Roots {
            stack: &self.stack,
            closures,
            open_upvalues: self.open_upvalues,
            globals: Some(&self.globals),
            pinned: &self.pinned,
        }
    }

    pub fn collect_garbage(&mut self) -> CollectReport {
        if self.config.log_gc {
            _ = writeln!(self.error, "-- gc begin");
        }
        let closures = self.frame_closures();
        // the heap is moved out so the roots can borrow the rest of the machine
        let mut heap = std::mem::take(&mut self.heap);
        let report = heap.collect(&self.roots(&closures));
        self.heap = heap;
        if self.config.log_gc {
            _ = writeln!(
                self.error,
                "-- gc end: freed {} objects, {} -> {} bytes, next at {}",
                report.objects_freed, report.bytes_before, report.bytes_after, report.next_gc
            );
        }
        report
    }

    fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    /// Allocates an object, collecting first if the threshold was crossed.
    ///
    /// Everything `object` refers to must be rooted.
    pub(crate) fn allocate(&mut self, object: Object) -> ObjRef {
        self.maybe_collect();
        self.heap.insert(object)
    }

    pub(crate) fn intern(&mut self, text: &str) -> ObjRef {
        if let Some(existing) = self.heap.find_interned(text) {
            return existing;
        }
        self.maybe_collect();
        self.heap.intern(text)
    }

    pub(crate) fn pin(&mut self, obj: ObjRef) {
        self.pinned.push(obj);
    }

    pub(crate) fn unpin_to(&mut self, len: usize) {
        self.pinned.truncate(len.max(RESERVED_PINS));
    }

    pub(crate) fn pinned_len(&self) -> usize {
        self.pinned.len()
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeErrorKind> {
        if self.stack.len() >= self.config.stack_max {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    pub(crate) fn peek(&self, distance: usize) -> Result<Value, RuntimeErrorKind> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| self.stack[index])
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }

    pub(crate) fn name_key(&self, name: ObjRef) -> Result<Key, RuntimeErrorKind> {
        self.heap.key(name).ok_or(RuntimeErrorKind::ExpectedName)
    }

    /// Burns one unit of fuel, if there is a budget.
    pub(crate) fn tick(&mut self) -> Result<(), RuntimeErrorKind> {
        if let Some(fuel) = self.fuel.as_mut() {
            if !fuel.should_continue() {
                return Err(RuntimeErrorKind::OutOfFuel);
            }
            fuel.consume(1);
        }
        Ok(())
    }

    /// Compiles and runs `source`.
    ///
    /// Compile errors are reported all at once and nothing runs. A runtime error stops
    /// execution, is reported with a backtrace, and leaves the machine empty. Values a
    /// successful run leaves on the operand stack stay there for the next call.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        if let (Some(fuel), Some(limit)) = (self.fuel.as_mut(), self.config.fuel) {
            fuel.refill(limit, limit);
        }

        let function = match compiler::compile(self, source) {
            Ok(function) => function,
            Err(errors) => {
                for error in errors.iter() {
                    _ = writeln!(self.error, "{error}");
                }
                return Err(errors.into());
            }
        };
        if self.config.print_code {
            if let Some(function) = self.heap.function(function) {
                let listing = disassemble_chunk(&self.heap, &function.chunk, "script");
                _ = write!(self.error, "{listing}");
            }
        }

        self.pin(function);
        let closure = self.new_closure(function);
        self.pinned.pop();
        let result = closure
            .and_then(|closure| self.call(closure, 0))
            .and_then(|()| self.run());
        match result {
            Ok(()) => Ok(()),
            Err(kind) => Err(self.runtime_error(kind).into()),
        }
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeErrorKind> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(RuntimeErrorKind::EndOfChunk)?;
        let byte = self
            .heap
            .function(frame.function)
            .and_then(|function| function.chunk.code.get(frame.ip).copied())
            .ok_or(RuntimeErrorKind::EndOfChunk)?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_constant(&mut self) -> Result<Value, RuntimeErrorKind> {
        let index = usize::from(self.read_byte()?);
        self.frames
            .last()
            .and_then(|frame| self.heap.function(frame.function))
            .and_then(|function| function.chunk.constants.get(index).copied())
            .ok_or(RuntimeErrorKind::EndOfChunk)
    }

    fn read_name(&mut self) -> Result<ObjRef, RuntimeErrorKind> {
        self.read_constant()?
            .as_object()
            .filter(|name| self.heap.string(*name).is_some())
            .ok_or(RuntimeErrorKind::ExpectedName)
    }

    fn push_operation(&mut self, spelling: ObjRef) -> Result<(), RuntimeErrorKind> {
        let spelling = self.heap.string(spelling).map_or("", |s| s.as_str());
        let op = Operator::from_spelling(spelling)
            .ok_or_else(|| RuntimeErrorKind::UnknownOperator(spelling.to_owned()))?;
        let operation = self.allocate(Object::Operation(op));
        self.push(Value::Object(operation))
    }

    fn run(&mut self) -> Result<(), RuntimeErrorKind> {
        loop {
            self.tick()?;
            if self.config.trace_execution {
                self.trace_instruction();
            }
            let op = OpCode::try_from(self.read_byte()?)
                .map_err(|InvalidOpCode(byte)| RuntimeErrorKind::UnknownOpcode(byte))?;
            match op {
                OpCode::Constant => {
                    let value = self.read_constant()?;
                    self.push(value)?;
                }
                OpCode::Print => self.execute(Operator::Print)?,
                OpCode::Scan => self.execute(Operator::Scan)?,
                OpCode::Add => self.execute(Operator::Add)?,
                OpCode::Subtract => self.execute(Operator::Subtract)?,
                OpCode::Multiply => self.execute(Operator::Multiply)?,
                OpCode::Divide => self.execute(Operator::Divide)?,
                OpCode::Mod => self.execute(Operator::Modulo)?,
                OpCode::Equal => self.execute(Operator::Equal)?,
                OpCode::Greater => self.execute(Operator::Greater)?,
                OpCode::Less => self.execute(Operator::Less)?,
                OpCode::GreaterEqual => self.execute(Operator::GreaterEqual)?,
                OpCode::LessEqual => self.execute(Operator::LessEqual)?,
                OpCode::Not => self.execute(Operator::Not)?,
                OpCode::If => self.execute(Operator::If)?,
                OpCode::SetVariable => self.execute(Operator::Assign)?,
                OpCode::Apply => self.execute(Operator::Apply)?,
                OpCode::While => self.run_while()?,
                OpCode::PushOperation => {
                    let spelling = self.read_name()?;
                    self.push_operation(spelling)?;
                }
                OpCode::Variable => {
                    let name = self.read_name()?;
                    let variable = self.new_variable(name)?;
                    self.push(variable)?;
                }
                OpCode::DefineFunction => {
                    let name = self.read_name()?;
                    self.define_procedure(name)?;
                }
                OpCode::Return => {
                    let frame = self.frames.pop().ok_or(RuntimeErrorKind::StackUnderflow)?;
                    self.close_upvalues(frame.base);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                }
            }
        }
    }

    fn trace_instruction(&mut self) {
        let mut trace = String::from("          ");
        for value in &self.stack {
            _ = write!(trace, "[ {} ]", self.heap.display(*value));
        }
        trace.push('\n');
        if let Some(frame) = self.frames.last() {
            if let Some(function) = self.heap.function(frame.function) {
                disassemble_instruction(&self.heap, &function.chunk, frame.ip, &mut trace);
            }
        }
        _ = write!(self.error, "{trace}");
    }

    fn backtrace(&self) -> Vec<TraceFrame> {
        self.frames
            .iter()
            .rev()
            .filter_map(|frame| {
                let function = self.heap.function(frame.function)?;
                let line = function
                    .chunk
                    .lines
                    .get(frame.ip.saturating_sub(1))
                    .copied()
                    .unwrap_or_default();
                let name = function
                    .name
                    .and_then(|name| self.heap.string(name))
                    .map(|name| name.as_str().to_owned());
                Some(TraceFrame {
                    line,
                    function: name,
                })
            })
            .collect()
    }

    fn runtime_error(&mut self, kind: RuntimeErrorKind) -> RuntimeError {
        let error = RuntimeError {
            kind,
            backtrace: self.backtrace(),
        };
        _ = write!(self.error, "{error}");
        _ = self.error.flush();
        self.reset();
        error
    }

    /// Drops all execution state. Globals and the heap are kept.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
        self.pinned.truncate(RESERVED_PINS);
        self.replay_depth = 0;
    }
}
