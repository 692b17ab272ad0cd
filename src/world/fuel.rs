//! Instruction budget for the machine

#[derive(Debug, Clone)]
pub struct Fuel {
    fuel: i32,
}

impl Fuel {
    pub fn with(fuel: i32) -> Self {
        Self { fuel }
    }

    /// Refills fuel up to a given maximum.
    ///
    /// Called at the start of every `interpret`, so each top level evaluation gets the
    /// same budget while a caller may still hand out more by raising `fuel`.
    pub fn refill(&mut self, fuel: i32, max_fuel: i32) {
        self.fuel = self.fuel.max(0).saturating_add(fuel).min(max_fuel);
    }

    /// Subtract from the current remaining fuel.
    pub fn consume(&mut self, fuel: i32) {
        self.fuel = self.fuel.saturating_sub(fuel);
    }

    pub fn remaining(&self) -> i32 {
        self.fuel
    }

    pub fn should_continue(&self) -> bool {
        self.fuel > 0
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::Fuel;

    #[test]
    fn consume_and_refill() {
        let mut fuel = Fuel::with(2);
        fuel.consume(1);
        check!(fuel.should_continue());
        fuel.consume(1);
        check!(!fuel.should_continue());
        check!(fuel.remaining() == 0);

        fuel.refill(10, 5);
        check!(fuel.remaining() == 5);
        fuel.consume(2);
        fuel.refill(5, 5);
        check!(fuel.remaining() == 5);
    }
}
