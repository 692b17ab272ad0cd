use core::fmt;

use crate::compiler::CompileErrors;

/// Why execution stopped.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("Operands must be either two strings or two numbers.")]
    AddOperands,
    #[error("Operands must be numbers.")]
    NumberOperands,
    #[error("Operands must both be numbers.")]
    ModuloOperands,
    #[error("Modulo divisor must be positive.")]
    ModuloDivisor,
    #[error("Can only assign to variables.")]
    AssignTarget,
    #[error("Can not run a non procedure.")]
    NotAProcedure,
    #[error("Body of while must be a variable.")]
    WhileBody,
    #[error("'while_condition' and the while body must be procedures.")]
    WhileProcedures,
    #[error("Missing ':' before procedure definition.")]
    MissingSentinel,
    #[error("Unknown operator '{0}'.")]
    UnknownOperator(String),
    #[error("Unknown opcode {0}.")]
    UnknownOpcode(u8),
    #[error("Expected a name constant.")]
    ExpectedName,
    #[error("Ran past the end of the chunk.")]
    EndOfChunk,
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Reached end of input.")]
    EndOfInput,
    #[error("Out of fuel.")]
    OutOfFuel,
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RuntimeErrorKind {
    fn from(error: std::io::Error) -> Self {
        RuntimeErrorKind::Io(error.to_string())
    }
}

/// One line of a backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: usize,
    /// `None` for the top level script
    pub function: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            None => write!(f, "[line {}] in script", self.line),
            Some(name) => write!(f, "[line {}] in {name}()", self.line),
        }
    }
}

/// A runtime error and the frames that were active, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub backtrace: Vec<TraceFrame>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind)?;
        for frame in &self.backtrace {
            writeln!(f, "{frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InterpretError {
    #[error("compile error\n{0}")]
    Compile(#[from] CompileErrors),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{RuntimeError, RuntimeErrorKind, TraceFrame};

    #[test]
    fn backtrace_format() {
        let error = RuntimeError {
            kind: RuntimeErrorKind::NumberOperands,
            backtrace: vec![
                TraceFrame {
                    line: 3,
                    function: Some("inner".into()),
                },
                TraceFrame {
                    line: 1,
                    function: None,
                },
            ],
        };
        check!(
            error.to_string()
                == "Operands must be numbers.\n[line 3] in inner()\n[line 1] in script\n"
        );
    }
}
