//! Stop-the-world mark and sweep.
//!
//! The collector never finds roots by itself. Whoever owns the heap describes them with
//! a [`Roots`] value, see `Vm::roots`. The intern set is a weak root: strings only
//! survive if something else reaches them.

use super::{table::Table, value::ObjRef, Heap, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct GcConfig {
    /// bytes that may be allocated before the first collection
    pub initial_threshold: usize,
    /// the next threshold is the live size times this factor
    pub growth_factor: f64,
    /// collect before every allocation
    pub stress: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 1024 * 1024,
            growth_factor: 2.0,
            stress: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub objects_freed: usize,
    pub bytes_freed: usize,
    pub peak_bytes: usize,
}

/// Everything that keeps objects alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Roots<'a> {
    /// the whole operand stack
    pub stack: &'a [Value],
    /// the closure of every active call frame
    pub closures: &'a [ObjRef],
    /// head of the open upvalue list
    pub open_upvalues: Option<ObjRef>,
    pub globals: Option<&'a Table>,
    /// objects held explicitly while they are not reachable otherwise
    pub pinned: &'a [ObjRef],
}

/// Outcome of a single collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectReport {
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub objects_freed: usize,
    pub next_gc: usize,
}

impl Heap {
    /// Runs a full collection.
    pub fn collect(&mut self, roots: &Roots<'_>) -> CollectReport {
        let bytes_before = self.bytes_allocated;

        self.mark_roots(roots);
        self.trace_references();
        // weak: drop the entries of strings nothing else reached
        let slots = &self.slots;
        self.strings.retain(|key, _| {
            slots
                .get(key.object.index())
                .and_then(|slot| slot.as_ref())
                .is_some_and(|slot| slot.marked)
        });
        let objects_freed = self.sweep();

        let grown = self.bytes_allocated as f64 * self.config.growth_factor;
        // floored at the initial threshold
        self.next_gc = (grown as usize).max(self.config.initial_threshold);

        self.stats.collections += 1;
        self.stats.objects_freed += objects_freed;
        self.stats.bytes_freed += bytes_before - self.bytes_allocated;

        CollectReport {
            bytes_before,
            bytes_after: self.bytes_allocated,
            objects_freed,
            next_gc: self.next_gc,
        }
    }

    fn mark_roots(&mut self, roots: &Roots<'_>) {
        for value in roots.stack {
            self.mark_value(*value);
        }
        for closure in roots.closures {
            self.mark_object(*closure);
        }
        let mut upvalue = roots.open_upvalues;
        while let Some(obj) = upvalue {
            self.mark_object(obj);
            upvalue = self.upvalue(obj).and_then(|upvalue| upvalue.next);
        }
        if let Some(globals) = roots.globals {
            for (key, value) in globals.iter() {
                self.mark_object(key.object);
                self.mark_value(value);
            }
        }
        for pinned in roots.pinned {
            self.mark_object(*pinned);
        }
    }

    fn mark_value(&mut self, value: Value) {
        if let Value::Object(obj) = value {
            self.mark_object(obj);
        }
    }

    fn mark_object(&mut self, obj: ObjRef) {
        if let Some(Some(slot)) = self.slots.get_mut(obj.index()) {
            if !slot.marked {
                slot.marked = true;
                self.gray.push(obj);
            }
        }
    }

    fn trace_references(&mut self) {
        let mut children = vec![];
        while let Some(obj) = self.gray.pop() {
            if let Some(object) = self.get(obj) {
                object.references(|child| children.push(child));
            }
            for child in children.drain(..) {
                self.mark_object(child);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, entry) in self.slots.iter_mut().enumerate() {
            match entry {
                Some(slot) if slot.marked => slot.marked = false,
                Some(slot) => {
                    self.bytes_allocated -= slot.size;
                    *entry = None;
                    self.free.push(index as u32);
                    freed += 1;
                }
                None => {}
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{GcConfig, Roots};
    use crate::{
        compiler::chunk::Chunk,
        world::{
            object::{Closure, Function, Object, Procedure, Upvalue, UpvalueState, Variable},
            table::Table,
            Heap, Value,
        },
    };

    #[test]
    fn unreachable_objects_are_freed() {
        let mut heap = Heap::default();
        let kept = heap.intern("kept");
        let lost = heap.intern("lost");
        let stack = [Value::Object(kept)];

        let report = heap.collect(&Roots {
            stack: &stack,
            ..Default::default()
        });
        check!(report.objects_freed == 1);
        check!(heap.is_live(kept));
        check!(!heap.is_live(lost));
        // the intern set forgot the dead string
        check!(heap.find_interned("lost") == None);
        check!(heap.find_interned("kept") == Some(kept));
        check!(heap.stats().collections == 1);
    }

    #[test]
    fn every_root_class_keeps_its_objects() {
        let mut heap = Heap::default();

        let on_stack = heap.intern("stack");
        let pinned = heap.intern("pinned");

        let mut chunk = Chunk::new();
        let constant = heap.intern("constant");
        chunk.add_constant(Value::Object(constant));
        let function = heap.insert(Object::Function(Function {
            chunk,
            ..Default::default()
        }));
        let closure = heap.insert(Object::Closure(Closure {
            function,
            upvalues: Box::new([]),
        }));

        let captured = heap.intern("captured");
        let closed = heap.insert(Object::Upvalue(Upvalue {
            state: UpvalueState::Closed(Value::Object(captured)),
            next: None,
        }));
        let open = heap.insert(Object::Upvalue(Upvalue {
            state: UpvalueState::Open(0),
            next: Some(closed),
        }));

        let name = heap.intern("name");
        let inner = heap.intern("inner");
        let variable = heap.insert(Object::Variable(Variable {
            name,
            value: Value::Object(inner),
        }));
        let body_name = heap.intern("body");
        let procedure = heap.insert(Object::Procedure(Procedure {
            name: body_name,
            body: vec![Value::Object(variable)],
        }));
        let mut globals = Table::new();
        let global_name = heap.intern("global");
        globals.set(
            heap.key(global_name).expect("interned"),
            Value::Object(procedure),
        );

        let garbage = heap.intern("garbage");
        let stack = [Value::Object(on_stack)];
        let closures = [closure];
        let pins = [pinned];
        heap.collect(&Roots {
            stack: &stack,
            closures: &closures,
            open_upvalues: Some(open),
            globals: Some(&globals),
            pinned: &pins,
        });

        for obj in [
            on_stack, pinned, constant, function, closure, captured, closed, open, name, inner,
            variable, body_name, procedure, global_name,
        ] {
            check!(heap.is_live(obj), "{obj:?} was collected");
        }
        check!(!heap.is_live(garbage));
    }

    #[test]
    fn marks_are_cleared_for_the_next_cycle() {
        let mut heap = Heap::default();
        let text = heap.intern("text");
        let stack = [Value::Object(text)];
        heap.collect(&Roots {
            stack: &stack,
            ..Default::default()
        });
        heap.collect(&Roots::default());
        check!(!heap.is_live(text));
        check!(heap.live_objects() == 0);
        check!(heap.bytes_allocated() == 0);
    }

    #[test]
    fn threshold_follows_live_bytes() {
        let mut heap = Heap::new(GcConfig {
            initial_threshold: 64,
            growth_factor: 3.0,
            stress: false,
        });
        check!(!heap.should_collect());
        let big = heap.intern(&"x".repeat(4096));
        check!(heap.should_collect());

        let stack = [Value::Object(big)];
        let report = heap.collect(&Roots {
            stack: &stack,
            ..Default::default()
        });
        check!(report.next_gc == heap.bytes_allocated() * 3);
        check!(!heap.should_collect());
    }

    #[test]
    fn intern_set_stays_bounded_across_collections() {
        let mut heap = Heap::default();
        for round in 0..20 {
            for n in 0..10_000 {
                heap.intern(&format!("{round}-{n}"));
            }
            heap.collect(&Roots::default());
            check!(heap.interned_strings() == 0);
            // sized for one round of live strings, not for every string ever made
            check!(heap.strings.capacity() <= 32 * 1024, "round {round}");
        }
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut heap = Heap::default();
        let name = heap.intern("v");
        let mut value = Value::Nil;
        for _ in 0..100_000 {
            value = Value::Object(heap.insert(Object::Variable(Variable { name, value })));
        }
        let stack = [value];
        let report = heap.collect(&Roots {
            stack: &stack,
            ..Default::default()
        });
        check!(report.objects_freed == 0);
    }
}
