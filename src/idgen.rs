//! Id allocation collaborator.
//!
//! The driver interns every declared config and script name through
//! an [`IdProvider`] during the id-generation step; the writers later
//! resolve symbolic operands through the same provider. Providers
//! shared across batches must be internally synchronized.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::binding::ConfigGroup;

pub trait IdProvider: Send + Sync {
    /// Deterministic id allocation: the same `(group, name)` always
    /// yields the same id within one provider.
    fn find_or_create(&self, group: &ConfigGroup, name: &str) -> i32;

    /// Lookup-only; `None` when the name was never interned.
    fn find(&self, group: &ConfigGroup, name: &str) -> Option<i32>;
}

#[derive(Default)]
struct MemoryIds {
    ids: FxHashMap<(ConfigGroup, SmolStr), i32>,
    next: FxHashMap<ConfigGroup, i32>,
}

/// In-memory provider: sequential ids per group, in interning order.
#[derive(Default)]
pub struct MemoryIdProvider {
    inner: Mutex<MemoryIds>,
}

impl MemoryIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdProvider for MemoryIdProvider {
    fn find_or_create(&self, group: &ConfigGroup, name: &str) -> i32 {
        let mut inner = self.inner.lock();
        let key = (group.clone(), SmolStr::new(name));
        if let Some(id) = inner.ids.get(&key) {
            return *id;
        }
        let next = inner.next.entry(group.clone()).or_insert(0);
        let id = *next;
        *next += 1;
        inner.ids.insert(key, id);
        id
    }

    fn find(&self, group: &ConfigGroup, name: &str) -> Option<i32> {
        let inner = self.inner.lock();
        inner.ids.get(&(group.clone(), SmolStr::new(name))).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_allocation() {
        let provider = MemoryIdProvider::new();
        let group = ConfigGroup::new("obj");
        let a = provider.find_or_create(&group, "a");
        let b = provider.find_or_create(&group, "b");
        assert_ne!(a, b);
        assert_eq!(provider.find_or_create(&group, "a"), a);
        assert_eq!(provider.find(&group, "b"), Some(b));
    }

    #[test]
    fn test_groups_are_independent() {
        let provider = MemoryIdProvider::new();
        let objs = ConfigGroup::new("obj");
        let npcs = ConfigGroup::new("npc");
        assert_eq!(provider.find_or_create(&objs, "x"), 0);
        assert_eq!(provider.find_or_create(&npcs, "x"), 0);
    }

    #[test]
    fn test_find_without_create() {
        let provider = MemoryIdProvider::new();
        assert_eq!(provider.find(&ConfigGroup::new("obj"), "missing"), None);
    }
}
