//! Name-keyed arenas for loaded resources.

use std::collections::HashMap;

/// Typed position of an entry inside one registry.
pub trait RegistryIndex: Copy {
    fn from_raw(raw: u32) -> Self;
    fn raw(self) -> u32;
}

/// Index into the mesh registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshIndex(pub(crate) u32);

impl RegistryIndex for MeshIndex {
    fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    fn raw(self) -> u32 {
        self.0
    }
}

/// Index into the material registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialIndex(pub(crate) u32);

impl RegistryIndex for MaterialIndex {
    fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    fn raw(self) -> u32 {
        self.0
    }
}

/// Append-only arena with name lookup.
///
/// Entries are never removed individually; the whole arena is torn down
/// at shutdown. Loading under an existing name appends a new entry and
/// repoints the name at it, so indices held by callers stay valid.
pub struct Registry<I: RegistryIndex, T> {
    entries: Vec<T>,
    names: HashMap<String, I>,
}

impl<I: RegistryIndex, T> Registry<I, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: T) -> I {
        let index = I::from_raw(self.entries.len() as u32);
        self.entries.push(value);
        if self.names.insert(name.to_string(), index).is_some() {
            log::debug!("registry entry '{}' shadowed by a new load", name);
        }
        index
    }

    pub fn get(&self, index: I) -> Option<&T> {
        self.entries.get(index.raw() as usize)
    }

    pub fn index_of(&self, name: &str) -> Option<I> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, value)| (I::from_raw(i as u32), value))
    }
}

impl<I: RegistryIndex, T> Default for Registry<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_by_index_and_name() {
        let mut registry: Registry<MeshIndex, &str> = Registry::new();
        let a = registry.insert("a", "first");
        let b = registry.insert("b", "second");

        assert_eq!(registry.get(a), Some(&"first"));
        assert_eq!(registry.get(b), Some(&"second"));
        assert_eq!(registry.index_of("a"), Some(a));
        assert_eq!(registry.index_of("missing"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn reloading_a_name_keeps_old_indices_valid() {
        let mut registry: Registry<MaterialIndex, u32> = Registry::new();
        let old = registry.insert("mat", 1);
        let new = registry.insert("mat", 2);

        assert_ne!(old, new);
        assert_eq!(registry.get(old), Some(&1));
        assert_eq!(registry.index_of("mat"), Some(new));
    }

    #[test]
    fn iter_walks_entries_in_insertion_order() {
        let mut registry: Registry<MeshIndex, u32> = Registry::new();
        registry.insert("x", 10);
        registry.insert("y", 20);

        let collected: Vec<(u32, u32)> = registry.iter().map(|(i, v)| (i.raw(), *v)).collect();
        assert_eq!(collected, vec![(0, 10), (1, 20)]);
    }
}
