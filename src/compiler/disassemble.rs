//! Human readable listings of chunks, for `--print-code` and `--trace`.
use std::fmt::Write;

use super::chunk::{Chunk, InvalidOpCode, OpCode};
use crate::world::Heap;

/// Renders the whole chunk under a `== name ==` header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut listing = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(heap, chunk, offset, &mut listing);
    }
    listing
}

/// Appends one line for the instruction at `offset` and returns the offset of the next.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    _ = write!(out, "{offset:04} ");
    let line = chunk.lines.get(offset).copied().unwrap_or_default();
    if offset > 0 && chunk.lines.get(offset - 1) == Some(&line) {
        out.push_str("   | ");
    } else {
        _ = write!(out, "{line:4} ");
    }

    let Some(byte) = chunk.code.get(offset).copied() else {
        _ = writeln!(out, "<end of chunk>");
        return offset + 1;
    };
    match OpCode::try_from(byte) {
        Err(InvalidOpCode(byte)) => {
            _ = writeln!(out, "Unknown opcode {byte}");
            offset + 1
        }
        Ok(op) if op.has_constant() => {
            let index = chunk.code.get(offset + 1).copied();
            let constant = index.and_then(|index| chunk.constants.get(usize::from(index)));
            match (index, constant) {
                (Some(index), Some(constant)) => {
                    _ = writeln!(out, "{:<16} {index:4} '{}'", op.name(), heap.display(*constant));
                }
                _ => {
                    _ = writeln!(out, "{:<16} <bad operand>", op.name());
                }
            }
            offset + 2
        }
        Ok(op) => {
            _ = writeln!(out, "{}", op.name());
            offset + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::disassemble_chunk;
    use crate::{
        compiler::{
            chunk::{Chunk, OpCode},
            compile,
        },
        runtime::Vm,
    };

    #[test]
    fn listing_of_a_small_script() {
        let mut vm = Vm::default();
        let_assert!(Ok(function) = compile(&mut vm, "5 x =\nx ."));
        let_assert!(Some(function) = vm.heap().function(function));
        let listing = disassemble_chunk(vm.heap(), &function.chunk, "script");
        check!(
            listing
                == "== script ==\n\
                    0000    1 OP_CONSTANT         0 '5'\n\
                    0002    | OP_VARIABLE         1 'x'\n\
                    0004    | OP_SET_VARIABLE\n\
                    0005    2 OP_VARIABLE         2 'x'\n\
                    0007    | OP_PRINT\n\
                    0008    | OP_RETURN\n"
        );
    }

    #[test]
    fn truncated_operands_are_flagged() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Constant, 1);
        chunk.write(200u8, 1);
        let listing = disassemble_chunk(Vm::default().heap(), &chunk, "broken");
        check!(listing.contains("OP_CONSTANT      <bad operand>"));
    }
}
