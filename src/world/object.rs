//! Heap object kinds
use std::mem::size_of;

use crate::{compiler::chunk::Chunk, runtime::operation::Operator};

use super::value::{ObjRef, Value};

/// 32-bit FNV-1a, the hash every interned string carries.
pub fn hash_str(text: &str) -> u32 {
    let mut hash = 2166136261u32;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Immutable, interned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PilaString {
    text: Box<str>,
    hash: u32,
}

impl PilaString {
    pub fn new(text: &str) -> Self {
        Self {
            text: Box::from(text),
            hash: hash_str(text),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

#[derive(Debug, Clone, Default)]
pub struct Function {
    pub arity: usize,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// `None` for the top level script
    pub name: Option<ObjRef>,
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Box<[Option<ObjRef>]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpvalueState {
    /// still lives in this operand stack slot
    Open(usize),
    Closed(Value),
}

#[derive(Debug, Clone, Copy)]
pub struct Upvalue {
    pub state: UpvalueState,
    /// next open upvalue, in descending slot order
    pub next: Option<ObjRef>,
}

/// A name and the value it had when the identifier was evaluated.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub name: ObjRef,
    pub value: Value,
}

/// A user defined procedure: the values that sat on the operand stack above the
/// sentinel when it was defined.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: ObjRef,
    /// stored in pop order, the last element is the first one to replay
    pub body: Vec<Value>,
}

impl Procedure {
    /// Body values in the order they are replayed (source order).
    pub fn replay_order(&self) -> impl Iterator<Item = Value> + '_ {
        self.body.iter().rev().copied()
    }
}

#[derive(Debug, Clone)]
pub enum Object {
    String(PilaString),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Variable(Variable),
    Procedure(Procedure),
    Operation(Operator),
}

impl Object {
    /// Bytes owned outside of the object's own slot.
    pub(crate) fn footprint(&self) -> usize {
        match self {
            Object::String(s) => s.text.len(),
            Object::Function(function) => function.chunk.footprint(),
            Object::Closure(closure) => closure.upvalues.len() * size_of::<Option<ObjRef>>(),
            Object::Procedure(procedure) => procedure.body.capacity() * size_of::<Value>(),
            Object::Upvalue(_) | Object::Variable(_) | Object::Operation(_) => 0,
        }
    }

    /// Calls `visit` with every object this one keeps alive.
    pub(crate) fn references(&self, mut visit: impl FnMut(ObjRef)) {
        let mut visit_value = |value: Value| {
            if let Value::Object(obj) = value {
                visit(obj)
            }
        };
        match self {
            Object::String(_) | Object::Operation(_) => {}
            Object::Function(function) => {
                if let Some(name) = function.name {
                    visit_value(Value::Object(name));
                }
                function.chunk.constants.iter().copied().for_each(visit_value);
            }
            Object::Closure(closure) => {
                visit_value(Value::Object(closure.function));
                closure
                    .upvalues
                    .iter()
                    .flatten()
                    .for_each(|upvalue| visit_value(Value::Object(*upvalue)));
            }
            // an open upvalue points into the stack, which is a root already
            Object::Upvalue(upvalue) => {
                if let UpvalueState::Closed(value) = upvalue.state {
                    visit_value(value);
                }
            }
            Object::Variable(variable) => {
                visit_value(Value::Object(variable.name));
                visit_value(variable.value);
            }
            Object::Procedure(procedure) => {
                visit_value(Value::Object(procedure.name));
                procedure.body.iter().copied().for_each(visit_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{hash_str, Object, Procedure, Value};
    use crate::world::value::ObjRef;

    #[test]
    fn fnv1a_reference_values() {
        check!(hash_str("") == 2166136261);
        check!(hash_str("a") == 0xe40c292c);
    }

    #[test]
    fn procedure_references_its_name_and_body_objects() {
        let procedure = Object::Procedure(Procedure {
            name: ObjRef(0),
            body: vec![Value::Number(1.0), Value::Object(ObjRef(4)), Value::Nil],
        });
        let mut seen = vec![];
        procedure.references(|obj| seen.push(obj));
        check!(seen == vec![ObjRef(0), ObjRef(4)]);
    }

    #[test]
    fn replay_order_reverses_pop_order() {
        let procedure = Procedure {
            name: ObjRef(0),
            body: vec![Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)],
        };
        let replayed: Vec<_> = procedure.replay_order().collect();
        check!(replayed == vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
    }
}
