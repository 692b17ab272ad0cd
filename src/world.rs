//! The heap every pila object lives in.
//!
//! Objects are kept in an arena of slots and addressed by [`ObjRef`]. Freed slots go on a
//! free list and are reused by later allocations. Memory is only ever reclaimed by
//! [`Heap::collect`], see the [`gc`] module.

pub mod fuel;
pub mod gc;
pub mod object;
pub mod table;
pub mod value;

use std::mem::size_of;

use gc::{GcConfig, GcStats};
use object::{Closure, Function, Object, PilaString, Procedure, Upvalue, Variable};
use table::{Key, Table};
use value::{DisplayValue, ObjRef, Value};

#[derive(Debug)]
struct Slot {
    object: Object,
    marked: bool,
    /// bytes charged for this slot when it was allocated
    size: usize,
}

#[derive(Debug)]
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    /// weak set of every live string, by content
    strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    config: GcConfig,
    stats: GcStats,
    gray: Vec<ObjRef>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(GcConfig::default())
    }
}

impl Heap {
    pub fn new(config: GcConfig) -> Self {
        Self {
            slots: vec![],
            free: vec![],
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: config.initial_threshold,
            config,
            stats: GcStats::default(),
            gray: vec![],
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub fn live_objects(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_live(&self, obj: ObjRef) -> bool {
        self.get(obj).is_some()
    }

    /// Number of strings in the intern set.
    pub fn interned_strings(&self) -> usize {
        self.strings.len()
    }

    /// Whether the next allocation should be preceded by a collection.
    pub fn should_collect(&self) -> bool {
        self.config.stress || self.bytes_allocated > self.next_gc
    }

    /// Moves `object` into a free slot.
    ///
    /// Never collects: callers that want the threshold honored call [`Heap::collect`]
    /// first, while the object's references are still rooted.
    pub fn insert(&mut self, object: Object) -> ObjRef {
        let size = size_of::<Slot>() + object.footprint();
        self.bytes_allocated += size;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.bytes_allocated);

        let hash = match &object {
            Object::String(s) => Some(s.hash()),
            _ => None,
        };
        let slot = Slot {
            object,
            marked: false,
            size,
        };
        let obj = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                ObjRef(index)
            }
            None => {
                self.slots.push(Some(slot));
                // the arena never gets anywhere near 2^32 slots before memory runs out
                ObjRef((self.slots.len() - 1) as u32)
            }
        };
        if let Some(hash) = hash {
            self.strings.set(Key { object: obj, hash }, Value::Nil);
        }
        obj
    }

    /// Returns the string with this content, if it has been interned already.
    pub fn find_interned(&self, text: &str) -> Option<ObjRef> {
        let hash = object::hash_str(text);
        self.strings.find_string(hash, |candidate| {
            self.string(candidate).is_some_and(|s| s.as_str() == text)
        })
    }

    /// Returns the unique string object with this content, creating it if needed.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        match self.find_interned(text) {
            Some(obj) => obj,
            None => self.insert(Object::String(PilaString::new(text))),
        }
    }

    pub fn get(&self, obj: ObjRef) -> Option<&Object> {
        self.slots
            .get(obj.index())
            .and_then(|slot| slot.as_ref())
            .map(|slot| &slot.object)
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Object> {
        self.slots
            .get_mut(obj.index())
            .and_then(|slot| slot.as_mut())
            .map(|slot| &mut slot.object)
    }

    /// The object a value refers to, `None` for scalars.
    pub fn object(&self, value: Value) -> Option<&Object> {
        self.get(value.as_object()?)
    }

    pub fn string(&self, obj: ObjRef) -> Option<&PilaString> {
        match self.get(obj) {
            Some(Object::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn function(&self, obj: ObjRef) -> Option<&Function> {
        match self.get(obj) {
            Some(Object::Function(function)) => Some(function),
            _ => None,
        }
    }

    pub fn closure(&self, obj: ObjRef) -> Option<&Closure> {
        match self.get(obj) {
            Some(Object::Closure(closure)) => Some(closure),
            _ => None,
        }
    }

    pub fn upvalue(&self, obj: ObjRef) -> Option<&Upvalue> {
        match self.get(obj) {
            Some(Object::Upvalue(upvalue)) => Some(upvalue),
            _ => None,
        }
    }

    pub fn upvalue_mut(&mut self, obj: ObjRef) -> Option<&mut Upvalue> {
        match self.get_mut(obj) {
            Some(Object::Upvalue(upvalue)) => Some(upvalue),
            _ => None,
        }
    }

    pub fn variable(&self, value: Value) -> Option<&Variable> {
        match self.object(value) {
            Some(Object::Variable(variable)) => Some(variable),
            _ => None,
        }
    }

    pub fn procedure(&self, value: Value) -> Option<&Procedure> {
        match self.object(value) {
            Some(Object::Procedure(procedure)) => Some(procedure),
            _ => None,
        }
    }

    /// Table key for a string object.
    pub fn key(&self, obj: ObjRef) -> Option<Key> {
        self.string(obj).map(|s| Key {
            object: obj,
            hash: s.hash(),
        })
    }

    /// Equality as the `?=` operator sees it.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) if x != y => {
                match (self.get(x), self.get(y)) {
                    (Some(Object::Operation(p)), Some(Object::Operation(q))) => p == q,
                    _ => false,
                }
            }
            _ => a == b,
        }
    }

    pub fn display(&self, value: Value) -> DisplayValue<'_> {
        DisplayValue { heap: self, value }
    }
}
