use super::{ContextId, WeakContextId};
use crate::evaluate::EvaluateOptions;
use crate::key_path::{KeyPath, PathSegment};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Memoized lookups of a single context
///
/// Entries are keyed by key path, the root context they were evaluated against and whether escapes were
/// removed. The cache is never invalidated; entries of dropped root contexts are pruned on insert.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<KeyPath, Vec<CacheEntry>>>,
}

#[derive(Debug)]
struct CacheEntry {
    root: WeakContextId,
    unescape: bool,
    value: Value,
}

impl ResolutionCache {
    pub fn get(&self, path: &[PathSegment], root: &ContextId, options: &EvaluateOptions) -> Option<Value> {
        let entries = self.entries.lock();
        entries
            .get(path)?
            .iter()
            .find(|entry| entry.unescape == options.unescape && entry.root.is(root))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, path: &[PathSegment], root: &ContextId, options: &EvaluateOptions, value: Value) {
        let mut entries = self.entries.lock();
        let slot = entries.entry(path.to_vec()).or_default();

        slot.retain(|entry| !entry.root.is_dead());
        if slot
            .iter()
            .any(|entry| entry.unescape == options.unescape && entry.root.is(root))
        {
            // a concurrent resolution got there first, both results are equal
            return;
        }

        slot.push(CacheEntry {
            root: root.downgrade(),
            unescape: options.unescape,
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
