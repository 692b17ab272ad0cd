use crate::world::value::Value;

/// Largest number of constants a single chunk can address (operands are one byte).
pub const MAX_CONSTANTS: usize = u8::MAX as usize + 1;

/// Instruction set of the VM.
///
/// Every opcode is one byte. The four constant opcodes are followed by a one byte index
/// into the chunk's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Constant,
    Print,
    Scan,
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Equal,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Not,
    While,
    If,
    PushOperation,
    Variable,
    SetVariable,
    DefineFunction,
    Apply,
    Return,
}

impl OpCode {
    const ALL: [OpCode; 22] = [
        OpCode::Constant,
        OpCode::Print,
        OpCode::Scan,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Mod,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::GreaterEqual,
        OpCode::LessEqual,
        OpCode::Not,
        OpCode::While,
        OpCode::If,
        OpCode::PushOperation,
        OpCode::Variable,
        OpCode::SetVariable,
        OpCode::DefineFunction,
        OpCode::Apply,
        OpCode::Return,
    ];

    /// Whether a constant index byte follows this opcode.
    pub fn has_constant(self) -> bool {
        matches!(
            self,
            OpCode::Constant | OpCode::PushOperation | OpCode::Variable | OpCode::DefineFunction
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Print => "OP_PRINT",
            OpCode::Scan => "OP_SCAN",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Mod => "OP_MOD",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::GreaterEqual => "OP_GREATER_EQUAL",
            OpCode::LessEqual => "OP_LESS_EQUAL",
            OpCode::Not => "OP_NOT",
            OpCode::While => "OP_WHILE",
            OpCode::If => "OP_IF",
            OpCode::PushOperation => "OP_PUSH_OPERATION",
            OpCode::Variable => "OP_VARIABLE",
            OpCode::SetVariable => "OP_SET_VARIABLE",
            OpCode::DefineFunction => "OP_DEFINE_FUNCTION",
            OpCode::Apply => "OP_APPLY",
            OpCode::Return => "OP_RETURN",
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown opcode {0}")]
pub struct InvalidOpCode(pub u8);

impl TryFrom<u8> for OpCode {
    type Error = InvalidOpCode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(byte))
            .copied()
            .ok_or(InvalidOpCode(byte))
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

/// A compiled function body: code bytes, the source line of every byte, and the
/// constant pool.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub lines: Vec<usize>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, byte: impl Into<u8>, line: usize) {
        self.code.push(byte.into());
        self.lines.push(line);
    }

    /// Adds a constant and returns its index. The index may not fit an operand byte,
    /// callers check it against [`MAX_CONSTANTS`].
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Heap bytes owned by this chunk, charged to the function that holds it.
    pub(crate) fn footprint(&self) -> usize {
        self.code.capacity()
            + self.lines.capacity() * std::mem::size_of::<usize>()
            + self.constants.capacity() * std::mem::size_of::<Value>()
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{InvalidOpCode, OpCode};

    #[test]
    fn opcode_bytes_are_dense() {
        for (byte, op) in OpCode::ALL.iter().enumerate() {
            check!(u8::from(*op) as usize == byte);
            check!(OpCode::try_from(byte as u8) == Ok(*op));
        }
        check!(OpCode::try_from(OpCode::ALL.len() as u8) == Err(InvalidOpCode(22)));
    }
}
