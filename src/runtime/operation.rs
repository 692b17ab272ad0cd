//! Operators, and what they do to the operand stack.

use std::io::Write;

use arbitrary::Arbitrary;

use super::{
    error::RuntimeErrorKind,
    port::{scan_line, Scanned},
    Vm,
};
use crate::world::{object::Object, value::Value};

/// Everything that can be written as `( op )` and carried around as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Not,
    Truthy,
    Assign,
    Apply,
    Print,
    Scan,
    If,
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
        Operator::Modulo,
        Operator::Equal,
        Operator::NotEqual,
        Operator::Less,
        Operator::Greater,
        Operator::LessEqual,
        Operator::GreaterEqual,
        Operator::Not,
        Operator::Truthy,
        Operator::Assign,
        Operator::Apply,
        Operator::Print,
        Operator::Scan,
        Operator::If,
    ];

    /// How the operator is written in source.
    pub fn spelling(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::Equal => "?=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Not => "!",
            Operator::Truthy => "?",
            Operator::Assign => "=",
            Operator::Apply => ",",
            Operator::Print => ".",
            Operator::Scan => "^",
            Operator::If => "if",
        }
    }

    pub fn from_spelling(spelling: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.spelling() == spelling)
    }
}

/// `a` reduced by `b` for as long as `a >= b`.
///
/// `None` when the reduction would never finish. A `NaN` on either side fails the
/// comparison right away and leaves `a` as it is.
pub fn modulo(a: f64, b: f64) -> Option<f64> {
    // also true for NaN operands
    if !(a >= b) {
        return Some(a);
    }
    // like infinities: the first subtraction yields NaN and ends the reduction
    if (a - b).is_nan() {
        return Some(f64::NAN);
    }
    if b <= 0.0 || a.is_infinite() {
        return None;
    }
    Some(a % b)
}

impl Vm {
    /// Pops two operands, replacing variables by their current value.
    fn pop_operands(&mut self) -> Result<(Value, Value), RuntimeErrorKind> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((self.materialize(a), self.materialize(b)))
    }

    fn pop_numbers(&mut self, error: RuntimeErrorKind) -> Result<(f64, f64), RuntimeErrorKind> {
        match self.pop_operands()? {
            (Value::Number(a), Value::Number(b)) => Ok((a, b)),
            _ => Err(error),
        }
    }

    fn arithmetic(&mut self, f: impl FnOnce(f64, f64) -> Value) -> Result<(), RuntimeErrorKind> {
        let (a, b) = self.pop_numbers(RuntimeErrorKind::NumberOperands)?;
        self.push(f(a, b))
    }

    fn add(&mut self) -> Result<(), RuntimeErrorKind> {
        let (a, b) = self.pop_operands()?;
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => self.push(Value::Number(a + b)),
            (Value::Object(a), Value::Object(b)) => {
                let (Some(a), Some(b)) = (self.heap.string(a), self.heap.string(b)) else {
                    return Err(RuntimeErrorKind::AddOperands);
                };
                let text = format!("{}{}", a.as_str(), b.as_str());
                let joined = self.intern(&text);
                self.push(Value::Object(joined))
            }
            _ => Err(RuntimeErrorKind::AddOperands),
        }
    }

    fn assign(&mut self) -> Result<(), RuntimeErrorKind> {
        let target = self.peek(0)?;
        let name = self
            .heap
            .variable(target)
            .map(|variable| variable.name)
            .ok_or(RuntimeErrorKind::AssignTarget)?;
        _ = self.pop()?;
        let value = self.pop()?;
        let value = self.materialize(value);
        let key = self.name_key(name)?;
        self.globals.set(key, value);
        Ok(())
    }

    fn apply(&mut self) -> Result<(), RuntimeErrorKind> {
        let target = self.peek(0)?;
        let name = self
            .heap
            .variable(target)
            .map(|variable| variable.name)
            .ok_or(RuntimeErrorKind::NotAProcedure)?;
        let key = self.name_key(name)?;
        let procedure = self.globals.get(key).unwrap_or_default();
        if self.heap.procedure(procedure).is_none() {
            self.globals.delete(key);
            return Err(RuntimeErrorKind::NotAProcedure);
        }
        _ = self.pop()?;
        self.replay(procedure)
    }

    fn print(&mut self) -> Result<(), RuntimeErrorKind> {
        let value = self.pop()?;
        let value = self.materialize(value);
        write!(self.output, "{}", self.heap.display(value))?;
        self.output.flush()?;
        Ok(())
    }

    fn scan(&mut self) -> Result<(), RuntimeErrorKind> {
        let limit = self.config.scan_buffer.saturating_sub(1).max(1);
        let line = self
            .input
            .read_line(limit)?
            .ok_or(RuntimeErrorKind::EndOfInput)?;
        match scan_line(&line) {
            Scanned::Number(number) => self.push(Value::Number(number)),
            Scanned::Text(text) => {
                let text = self.intern(&text);
                self.push(Value::Object(text))
            }
        }
    }

    fn branch(&mut self) -> Result<(), RuntimeErrorKind> {
        let condition = self.pop()?;
        let otherwise = self.pop()?;
        let then = self.pop()?;
        let condition = self.materialize(condition);
        let selected = if condition.is_falsey() {
            self.materialize(otherwise)
        } else {
            self.materialize(then)
        };
        self.evaluate(selected)
    }

    /// Runs an operation, replays a procedure, pushes anything else.
    pub(crate) fn evaluate(&mut self, value: Value) -> Result<(), RuntimeErrorKind> {
        match self.heap.object(value) {
            Some(Object::Operation(op)) => {
                let op = *op;
                self.execute(op)
            }
            Some(Object::Procedure(_)) => self.replay(value),
            _ => self.push(value),
        }
    }

    pub(crate) fn execute(&mut self, op: Operator) -> Result<(), RuntimeErrorKind> {
        match op {
            Operator::Add => self.add(),
            Operator::Subtract => self.arithmetic(|a, b| Value::Number(a - b)),
            Operator::Multiply => self.arithmetic(|a, b| Value::Number(a * b)),
            Operator::Divide => self.arithmetic(|a, b| Value::Number(a / b)),
            Operator::Less => self.arithmetic(|a, b| Value::Bool(a < b)),
            Operator::Greater => self.arithmetic(|a, b| Value::Bool(a > b)),
            Operator::LessEqual => self.arithmetic(|a, b| Value::Bool(a <= b)),
            Operator::GreaterEqual => self.arithmetic(|a, b| Value::Bool(a >= b)),
            Operator::Modulo => {
                let (a, b) = self.pop_numbers(RuntimeErrorKind::ModuloOperands)?;
                let result = modulo(a, b).ok_or(RuntimeErrorKind::ModuloDivisor)?;
                self.push(Value::Number(result))
            }
            Operator::Equal | Operator::NotEqual => {
                let (a, b) = self.pop_operands()?;
                let equal = self.heap.values_equal(a, b);
                self.push(Value::Bool(equal == (op == Operator::Equal)))
            }
            Operator::Not | Operator::Truthy => {
                let value = self.pop()?;
                let truthy = !self.materialize(value).is_falsey();
                self.push(Value::Bool(truthy == (op == Operator::Truthy)))
            }
            Operator::Assign => self.assign(),
            Operator::Apply => self.apply(),
            Operator::Print => self.print(),
            Operator::Scan => self.scan(),
            Operator::If => self.branch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use assert2::check;

    use super::{modulo, Operator};

    #[test]
    fn spellings_round_trip() {
        arbtest(|u| {
            let op: Operator = u.arbitrary()?;
            check!(Operator::from_spelling(op.spelling()) == Some(op));
            Ok(())
        });
        check!(Operator::from_spelling("while") == None);
    }

    #[test]
    fn modulo_by_repeated_subtraction() {
        check!(modulo(7.0, 3.0) == Some(1.0));
        check!(modulo(6.0, 3.0) == Some(0.0));
        check!(modulo(2.0, 3.0) == Some(2.0));
        check!(modulo(7.5, 2.0) == Some(1.5));
        // below the divisor, even when negative
        check!(modulo(-4.0, 3.0) == Some(-4.0));
        check!(modulo(-4.0, 0.0) == Some(-4.0));
    }

    #[test]
    fn modulo_with_nan_or_infinities_stops() {
        check!(modulo(f64::NAN, 2.0).is_some_and(f64::is_nan));
        check!(modulo(1.0, f64::NAN) == Some(1.0));
        check!(modulo(f64::INFINITY, f64::INFINITY).is_some_and(f64::is_nan));
        check!(modulo(f64::NEG_INFINITY, f64::NEG_INFINITY).is_some_and(f64::is_nan));
        check!(modulo(2.0, f64::INFINITY) == Some(2.0));
    }

    #[test]
    fn modulo_that_never_finishes() {
        check!(modulo(5.0, 0.0) == None);
        check!(modulo(5.0, -1.0) == None);
        check!(modulo(f64::INFINITY, 2.0) == None);
        check!(modulo(f64::INFINITY, f64::NEG_INFINITY) == None);
    }
}
