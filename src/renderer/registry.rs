use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable, typed index into a [`Registry`]
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Name-keyed storage for meshes, materials and textures.
///
/// Entries are never removed, so a handle handed out stays valid for the
/// registry's whole lifetime.
pub struct Registry<T> {
    names: HashMap<String, Handle<T>>,
    entries: Vec<T>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Stores `value` under `name`. Re-using a name replaces the value in place and keeps its handle.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Handle<T> {
        let name = name.into();
        if let Some(handle) = self.names.get(&name) {
            log::warn!("Replacing registry entry '{}'", name);
            self.entries[handle.index as usize] = value;
            return *handle;
        }

        let handle = Handle::new(self.entries.len());
        self.entries.push(value);
        self.names.insert(name, handle);
        handle
    }

    pub fn lookup(&self, name: &str) -> Option<Handle<T>> {
        self.names.get(name).copied()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.entries.get(handle.index as usize)
    }

    #[cfg(test)]
    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.lookup(name).and_then(|handle| self.get(handle))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_of_missing_names_return_none() {
        let registry: Registry<u32> = Registry::new();
        assert!(registry.lookup("monkey").is_none());
        assert!(registry.get_by_name("monkey").is_none());
    }

    #[test]
    fn handles_resolve_to_inserted_values() {
        let mut registry = Registry::new();
        let a = registry.insert("a", 1);
        let b = registry.insert("b", 2);
        assert_ne!(a, b);
        assert_eq!(registry.get(a), Some(&1));
        assert_eq!(registry.get(b), Some(&2));
        assert_eq!(registry.lookup("b"), Some(b));
    }

    #[test]
    fn reinserting_a_name_keeps_the_handle() {
        let mut registry = Registry::new();
        let first = registry.insert("mesh", 1);
        let second = registry.insert("mesh", 5);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first), Some(&5));
    }
}
