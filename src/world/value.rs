//! Representation of runtime values
use core::fmt;

use super::{object::Object, Heap};

/// Reference to an object living in a [`Heap`] slot.
///
/// Just an index, so it is cheap to copy. A reference is only meaningful while the
/// object it names is reachable from a GC root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(pub(crate) u32);

impl ObjRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// The four runtime kinds. Everything bigger than a scalar lives on the heap.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Object(ObjRef),
}

impl Value {
    /// `nil`, `false` and `0` are falsey, everything else is truthy.
    pub fn is_falsey(self) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(b) => !b,
            Value::Number(n) => n == 0.0,
            Value::Object(_) => false,
        }
    }

    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_object(self) -> Option<ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

/// Formats a value the way the print operation shows it. Created by [`Heap::display`].
pub struct DisplayValue<'h> {
    pub(super) heap: &'h Heap,
    pub(super) value: Value,
}

impl<'h> DisplayValue<'h> {
    fn nested(&self, value: Value) -> DisplayValue<'h> {
        DisplayValue {
            heap: self.heap,
            value,
        }
    }

    fn name(&self, name: Option<ObjRef>) -> &'h str {
        name.and_then(|name| self.heap.string(name))
            .map(|s| s.as_str())
            .unwrap_or("?")
    }
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let obj = match self.value {
            Value::Nil => return write!(f, "nil"),
            Value::Bool(b) => return write!(f, "{b}"),
            Value::Number(n) => return write!(f, "{n}"),
            Value::Object(obj) => obj,
        };
        match self.heap.get(obj) {
            // only possible if someone held on to an unrooted reference
            None => write!(f, "<freed>"),
            Some(Object::String(s)) => write!(f, "{}", s.as_str()),
            Some(Object::Function(function)) => match function.name {
                None => write!(f, "<script>"),
                name => write!(f, "<fn {}>", self.name(name)),
            },
            Some(Object::Closure(closure)) => match self.heap.function(closure.function) {
                Some(function) if function.name.is_some() => {
                    write!(f, "<fn {}>", self.name(function.name))
                }
                _ => write!(f, "<script>"),
            },
            Some(Object::Upvalue(_)) => write!(f, "upvalue"),
            Some(Object::Variable(variable)) => {
                write!(
                    f,
                    "{}={{{}}}",
                    self.name(Some(variable.name)),
                    self.nested(variable.value)
                )
            }
            Some(Object::Procedure(procedure)) => {
                write!(f, "<{}> [", self.name(Some(procedure.name)))?;
                for (i, value) in procedure.body.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.nested(*value))?;
                }
                write!(f, "]")
            }
            Some(Object::Operation(op)) => write!(f, "{}", op.spelling()),
        }
    }
}
