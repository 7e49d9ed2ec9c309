//! # Spatial Section Registry
//!
//! Tracks which sections exist. A section is registered when the world loads it and
//! unregistered when it unloads; both are idempotent.
//!
//! The registry is plain data. The visibility tracker keeps it behind an `MtResource` and is
//! the only writer.

pub mod section_id;
pub mod section_state;

use std::collections::{hash_map, HashMap};

pub use section_id::SectionId;
pub use section_state::SectionState;

/// Map of registered sections to their visibility state.
#[derive(Debug, Default)]
pub struct SectionRegistry {
    states: HashMap<SectionId, SectionState>,
}

impl SectionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `origin`. Returns `false` if it was already registered, in which case its
    /// state is left untouched.
    pub fn register(&mut self, origin: SectionId) -> bool {
        match self.states.entry(origin) {
            hash_map::Entry::Occupied(_) => false,
            hash_map::Entry::Vacant(slot) => {
                slot.insert(SectionState::new(origin));
                true
            }
        }
    }

    /// Unregisters `origin`, returning its last state if it was registered.
    pub fn unregister(&mut self, origin: SectionId) -> Option<SectionState> {
        self.states.remove(&origin)
    }

    /// Whether `origin` is registered.
    pub fn contains(&self, origin: SectionId) -> bool {
        self.states.contains_key(&origin)
    }

    /// The record of `origin`.
    pub fn get(&self, origin: SectionId) -> Option<&SectionState> {
        self.states.get(&origin)
    }

    /// The record of `origin`, for the traversal worker and occlusion feedback.
    pub fn get_mut(&mut self, origin: SectionId) -> Option<&mut SectionState> {
        self.states.get_mut(&origin)
    }

    /// Registered sections.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no section is registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Every record, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &SectionState> {
        self.states.values()
    }

    /// Every record, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SectionState> {
        self.states.values_mut()
    }

    /// Drops every section.
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut registry = SectionRegistry::new();
        let id = SectionId::new(1, 2, 3);
        assert!(registry.register(id));

        registry.get_mut(id).unwrap().mark_traversed(4, 9);
        assert!(!registry.register(id));
        assert_eq!(registry.get(id).unwrap().bfs_order, 4);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = SectionRegistry::new();
        let id = SectionId::new(0, 0, 0);
        registry.register(id);
        assert!(registry.unregister(id).is_some());
        assert!(registry.unregister(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn new_sections_are_fail_open() {
        let state = SectionState::new(SectionId::new(0, 0, 0));
        assert!(state.is_likely_visible());
        assert!(!state.gpu_confirmed_visible());
        assert!(!state.visited_in(0));
    }
}
