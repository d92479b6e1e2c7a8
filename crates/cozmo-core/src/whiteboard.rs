//! Typed scratch space shared by the behaviors of one robot.
//!
//! Behaviors post facts here that outlive their own activation, e.g. which
//! objects they failed to interact with, so other behaviors can avoid them.

use std::any::Any;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Typed key. Two keys with the same id must share the same `T`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WbKey<T: 'static> {
    id: u64,
    name: &'static str,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: 'static> Copy for WbKey<T> {}

impl<T: 'static> Clone for WbKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> WbKey<T> {
    pub const fn new(id: u64, name: &'static str) -> Self {
        Self {
            id,
            name,
            _phantom: PhantomData,
        }
    }

    pub fn id(self) -> u64 {
        self.id
    }

    pub fn name(self) -> &'static str {
        self.name
    }
}

#[derive(Default)]
pub struct Whiteboard {
    values: BTreeMap<u64, Box<dyn Any>>,
}

fn type_mismatch(id: u64, name: &str) -> ! {
    panic!("whiteboard entry `{name}` (id={id}) holds a different type than requested")
}

impl Whiteboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains<T: 'static>(&self, key: WbKey<T>) -> bool {
        self.values.contains_key(&key.id)
    }

    pub fn set<T: 'static>(&mut self, key: WbKey<T>, value: T) {
        self.values.insert(key.id, Box::new(value));
    }

    pub fn get<T: 'static>(&self, key: WbKey<T>) -> Option<&T> {
        let value = self.values.get(&key.id)?;
        match value.downcast_ref::<T>() {
            Some(v) => Some(v),
            None => type_mismatch(key.id, key.name),
        }
    }

    pub fn get_mut<T: 'static>(&mut self, key: WbKey<T>) -> Option<&mut T> {
        let value = self.values.get_mut(&key.id)?;
        match value.downcast_mut::<T>() {
            Some(v) => Some(v),
            None => type_mismatch(key.id, key.name),
        }
    }

    pub fn get_or_insert_with<T: 'static>(&mut self, key: WbKey<T>, make: impl FnOnce() -> T) -> &mut T {
        let value = self
            .values
            .entry(key.id)
            .or_insert_with(|| Box::new(make()));
        match value.downcast_mut::<T>() {
            Some(v) => v,
            None => type_mismatch(key.id, key.name),
        }
    }

    pub fn remove<T: 'static>(&mut self, key: WbKey<T>) -> Option<T> {
        let value = self.values.remove(&key.id)?;
        match value.downcast::<T>() {
            Ok(v) => Some(*v),
            Err(_) => type_mismatch(key.id, key.name),
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl std::fmt::Debug for Whiteboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Whiteboard")
            .field("entries", &self.values.len())
            .finish()
    }
}
