//! Call frames and upvalues.
//!
//! The compiler only ever produces the top level script, so no pila program captures an
//! upvalue today. The machinery still keeps the open list sorted and deduplicated so
//! that nested functions can be added without touching the collector.

use super::{error::RuntimeErrorKind, Vm};
use crate::world::{
    object::{Closure, Object, Upvalue, UpvalueState},
    value::{ObjRef, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub closure: ObjRef,
    /// the function of `closure`, cached
    pub function: ObjRef,
    pub ip: usize,
    /// first operand slot that belongs to this frame
    pub base: usize,
}

impl Vm {
    /// Wraps a function in a closure with room for its upvalues.
    ///
    /// `function` must be rooted by the caller.
    pub(crate) fn new_closure(&mut self, function: ObjRef) -> Result<ObjRef, RuntimeErrorKind> {
        let upvalue_count = self
            .heap
            .function(function)
            .map(|function| function.upvalue_count)
            .ok_or(RuntimeErrorKind::NotAProcedure)?;
        Ok(self.allocate(Object::Closure(Closure {
            function,
            upvalues: vec![None; upvalue_count].into_boxed_slice(),
        })))
    }

    /// Pushes a frame running `closure`, with its arguments on top of the stack.
    pub(crate) fn call(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), RuntimeErrorKind> {
        let function = self
            .heap
            .closure(closure)
            .map(|closure| closure.function)
            .ok_or(RuntimeErrorKind::NotAProcedure)?;
        if self.frames.len() >= self.config.frames_max {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        let base = self
            .stack
            .len()
            .checked_sub(arg_count)
            .ok_or(RuntimeErrorKind::StackUnderflow)?;
        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            base,
        });
        Ok(())
    }

    /// Returns the open upvalue for `slot`, creating it if there is none yet.
    pub fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut previous = None;
        let mut current = self.open_upvalues;
        while let Some(obj) = current {
            let Some(upvalue) = self.heap.upvalue(obj) else {
                break;
            };
            match upvalue.state {
                UpvalueState::Open(open) if open > slot => {
                    previous = current;
                    current = upvalue.next;
                }
                UpvalueState::Open(open) if open == slot => return obj,
                _ => break,
            }
        }

        let created = self.allocate(Object::Upvalue(Upvalue {
            state: UpvalueState::Open(slot),
            next: current,
        }));
        match previous.and_then(|previous| self.heap.upvalue_mut(previous)) {
            Some(previous) => previous.next = Some(created),
            None => self.open_upvalues = Some(created),
        }
        created
    }

    /// Closes every open upvalue pointing at `last` or above.
    pub(crate) fn close_upvalues(&mut self, last: usize) {
        while let Some(obj) = self.open_upvalues {
            let value = match self.heap.upvalue(obj).map(|upvalue| upvalue.state) {
                Some(UpvalueState::Open(slot)) if slot >= last => {
                    self.stack.get(slot).copied().unwrap_or_default()
                }
                _ => break,
            };
            let Some(upvalue) = self.heap.upvalue_mut(obj) else {
                break;
            };
            upvalue.state = UpvalueState::Closed(value);
            self.open_upvalues = upvalue.next;
        }
    }

    /// Current value of an upvalue, open or closed.
    pub fn upvalue_value(&self, obj: ObjRef) -> Option<Value> {
        match self.heap.upvalue(obj)?.state {
            UpvalueState::Open(slot) => self.stack.get(slot).copied(),
            UpvalueState::Closed(value) => Some(value),
        }
    }
}
