//! Procedures: definition from the operand stack, replay, and `while`.

use super::{error::RuntimeErrorKind, Vm};
use crate::world::{
    object::{Object, Procedure, Variable},
    value::{ObjRef, Value},
};

impl Vm {
    /// The value currently bound to `name`, `nil` when unbound.
    pub(crate) fn global_value(&self, name: ObjRef) -> Value {
        self.heap
            .key(name)
            .and_then(|key| self.globals.get(key))
            .unwrap_or_default()
    }

    /// Replaces a variable by the value its name is bound to right now.
    pub(crate) fn materialize(&self, value: Value) -> Value {
        match self.heap.variable(value) {
            Some(variable) => self.global_value(variable.name),
            None => value,
        }
    }

    /// Allocates a variable snapshotting the current binding of `name`.
    pub(crate) fn new_variable(&mut self, name: ObjRef) -> Result<Value, RuntimeErrorKind> {
        let value = self.global_value(name);
        let variable = self.allocate(Object::Variable(Variable { name, value }));
        Ok(Value::Object(variable))
    }

    /// Turns everything above the nearest `nil` sentinel into a procedure bound to `name`.
    pub(crate) fn define_procedure(&mut self, name: ObjRef) -> Result<(), RuntimeErrorKind> {
        let sentinel = self
            .stack
            .iter()
            .rposition(|value| value.is_nil())
            .ok_or(RuntimeErrorKind::MissingSentinel)?;
        let key = self.name_key(name)?;
        let body = self.stack[sentinel + 1..].iter().rev().copied().collect();
        // the body is still on the stack while this allocates
        let procedure = self.allocate(Object::Procedure(Procedure { name, body }));
        self.stack.truncate(sentinel);
        self.globals.set(key, Value::Object(procedure));
        Ok(())
    }

    /// Replays the body of a procedure in source order.
    pub(crate) fn replay(&mut self, procedure: Value) -> Result<(), RuntimeErrorKind> {
        let obj = match self.heap.object(procedure) {
            Some(Object::Procedure(_)) => procedure.as_object(),
            _ => None,
        }
        .ok_or(RuntimeErrorKind::NotAProcedure)?;
        if self.replay_depth >= self.config.replay_depth_max {
            return Err(RuntimeErrorKind::StackOverflow);
        }

        self.replay_depth += 1;
        self.pinned.push(obj);
        let result = self.replay_body(procedure);
        self.pinned.pop();
        self.replay_depth -= 1;
        result
    }

    fn replay_body(&mut self, procedure: Value) -> Result<(), RuntimeErrorKind> {
        // the procedure is pinned, so its body stays alive while this copy is walked
        let body: Vec<Value> = self
            .heap
            .procedure(procedure)
            .ok_or(RuntimeErrorKind::NotAProcedure)?
            .replay_order()
            .collect();
        for item in body {
            self.tick()?;
            match self.heap.object(item) {
                Some(Object::Operation(op)) => {
                    let op = *op;
                    self.execute(op)?;
                }
                Some(Object::Variable(variable)) => {
                    let name = variable.name;
                    let fresh = self.new_variable(name)?;
                    self.push(fresh)?;
                }
                _ => self.push(item)?,
            }
        }
        Ok(())
    }

    /// `while`: replay `while_condition` and the body until the condition is falsey.
    pub(crate) fn run_while(&mut self) -> Result<(), RuntimeErrorKind> {
        let body_name = self
            .heap
            .variable(self.peek(0)?)
            .map(|variable| variable.name)
            .ok_or(RuntimeErrorKind::WhileBody)?;
        let body = self.global_value(body_name);
        let condition = self.global_value(self.while_condition);
        let (Some(body_ref), Some(condition_ref)) = (
            self.heap.procedure(body).and(body.as_object()),
            self.heap.procedure(condition).and(condition.as_object()),
        ) else {
            return Err(RuntimeErrorKind::WhileProcedures);
        };
        _ = self.pop()?;

        // rebinding either name inside the loop must not free them
        self.pinned.extend([body_ref, condition_ref]);
        let result = self.while_loop(condition, body);
        self.pinned.truncate(self.pinned.len().saturating_sub(2));
        result
    }

    fn while_loop(&mut self, condition: Value, body: Value) -> Result<(), RuntimeErrorKind> {
        loop {
            self.replay(condition)?;
            let result = self.pop()?;
            if self.materialize(result).is_falsey() {
                return Ok(());
            }
            self.replay(body)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use crate::{
        runtime::{error::RuntimeErrorKind, Vm},
        world::value::Value,
    };

    #[test]
    fn definition_drains_to_the_sentinel() {
        let mut vm = Vm::default();
        let name = vm.intern("body");
        vm.push(Value::Number(0.0)).unwrap();
        vm.push(Value::Nil).unwrap();
        for n in [1.0, 2.0, 3.0] {
            vm.push(Value::Number(n)).unwrap();
        }
        vm.define_procedure(name).unwrap();
        check!(vm.stack() == [Value::Number(0.0)]);

        let procedure = vm.global_value(name);
        let_assert!(Some(procedure) = vm.heap().procedure(procedure));
        check!(procedure.body == [Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)]);
    }

    #[test]
    fn replay_restores_source_order() {
        let mut vm = Vm::default();
        let name = vm.intern("body");
        vm.push(Value::Nil).unwrap();
        for n in [1.0, 2.0, 3.0] {
            vm.push(Value::Number(n)).unwrap();
        }
        vm.define_procedure(name).unwrap();
        let procedure = vm.global_value(name);
        vm.replay(procedure).unwrap();
        check!(vm.stack() == [Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
    }

    #[test]
    fn definition_without_sentinel() {
        let mut vm = Vm::default();
        let name = vm.intern("body");
        vm.push(Value::Number(1.0)).unwrap();
        check!(vm.define_procedure(name) == Err(RuntimeErrorKind::MissingSentinel));
    }

    #[test]
    fn variables_materialize_to_the_current_binding() {
        let mut vm = Vm::default();
        let name = vm.intern("x");
        let variable = vm.new_variable(name).unwrap();
        check!(vm.materialize(variable) == Value::Nil);

        let key = vm.heap().key(name).unwrap();
        vm.globals.set(key, Value::Number(4.0));
        check!(vm.materialize(variable) == Value::Number(4.0));
        check!(vm.materialize(Value::Bool(true)) == Value::Bool(true));
    }
}
