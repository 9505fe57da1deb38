//! Identity Resolver - maps (name, state) to a stable plant identifier.

use std::collections::HashMap;

use crate::model::PlantId;

/// Snapshot of persisted plant identities, read once per file and advanced
/// in memory while that file is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantRegistry {
    by_key: HashMap<(String, String), PlantId>,
    next_id: i64,
}

impl Default for PlantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlantRegistry {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            next_id: 1,
        }
    }

    /// Build from persisted `(id, name, state)` rows. The next identifier is
    /// one past the highest seen.
    pub fn from_rows(rows: impl IntoIterator<Item = (i64, String, String)>) -> Self {
        let mut registry = Self::new();
        for (id, name, state) in rows {
            registry.next_id = registry.next_id.max(id + 1);
            registry.by_key.insert((name, state), PlantId(id));
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Resolve a plant by exact `(name, state)`, allocating the next
    /// sequential identifier when it has not been seen. The flag is true
    /// for a newly allocated identifier.
    pub fn resolve(&mut self, name: &str, state: &str) -> (PlantId, bool) {
        let key = (name.to_string(), state.to_string());
        if let Some(id) = self.by_key.get(&key) {
            return (*id, false);
        }
        let id = PlantId(self.next_id);
        self.next_id += 1;
        self.by_key.insert(key, id);
        (id, true)
    }
}
