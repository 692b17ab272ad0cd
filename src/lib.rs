pub mod compiler;
pub mod lexer;
pub mod runtime;
pub mod world;

pub use compiler::{compile, CompileError, CompileErrorKind, CompileErrors};
pub use runtime::{
    error::{InterpretError, RuntimeError, RuntimeErrorKind},
    operation::Operator,
    port::{InputPort, OutputPort},
    Vm, VmConfig,
};
pub use world::{
    fuel::Fuel,
    gc::{GcConfig, GcStats},
    value::{self, Value},
    Heap,
};

/// Runs `source` on a fresh machine wired to stdio.
pub fn interpret(source: &str) -> Result<(), InterpretError> {
    Vm::default().interpret(source)
}
