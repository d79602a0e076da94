// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-operation table of literal strings that are not in the global
//! dictionary (e.g. produced on the fly by `BIND` or `CONCAT`).

use std::sync::Arc;

/// A literal string produced at runtime, not present in the global
/// vocabulary. Reference-counted so a [`LocalVocab`] merge can dedup by
/// identity without re-scanning string contents.
pub type LocalVocabEntry = Arc<str>;

/// A set of runtime-produced strings owned by an operation's result.
///
/// Supports insertion (returning a stable index), cloning, and merging
/// another vocabulary in (the source's entries become reachable through the
/// target by reference, not by copy). Merging is idempotent: merging the
/// same source twice leaves the target unchanged the second time, and a
/// `None` source is silently skipped.
#[derive(Clone, Default)]
pub struct LocalVocab {
    entries: Vec<LocalVocabEntry>,
    /// Identity tokens (backing-storage addresses) of source vocabularies
    /// already merged in, so a repeat `merge` of the same source is a
    /// no-op. Addresses are only ever compared, never dereferenced.
    merged_sources: Vec<usize>,
}

impl std::fmt::Debug for LocalVocab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVocab")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl LocalVocab {
    /// Creates an empty local vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct strings currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no strings have been inserted or merged in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `value`, returning a stable index that can be wrapped in a
    /// [`crate::value_id::ValueId::make_local_vocab_index`].
    pub fn insert(&mut self, value: impl Into<Arc<str>>) -> u64 {
        let idx = self.entries.len() as u64;
        self.entries.push(value.into());
        idx
    }

    /// Looks up a previously inserted or merged-in entry by its index.
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&str> {
        self.entries.get(index as usize).map(AsRef::as_ref)
    }

    /// Merges `source`'s entries into `self`. A `None` source is a no-op.
    /// Merging the same source twice is also a no-op (idempotent), checked
    /// by the source slice's pointer identity.
    pub fn merge(&mut self, source: Option<&LocalVocab>) {
        let Some(source) = source else {
            return;
        };
        if source.is_empty() {
            return;
        }

        let source_id = source.entries.as_ptr() as usize;
        if self.merged_sources.contains(&source_id) {
            return;
        }

        self.entries.extend(source.entries.iter().cloned());
        self.merged_sources.push(source_id);
        // The freshly extended backing storage invalidates any previously
        // recorded self-identity (not applicable here since we never merge
        // self into self), but does NOT invalidate the identity of the
        // *source* we just merged, which remains valid for future
        // idempotence checks as long as `source` is alive.
    }

    /// Clones `self` into an independent, deep copy.
    ///
    /// `Arc<str>` entries remain reference-counted and are not
    /// re-allocated; the returned vocabulary shares storage with `self` but
    /// can be extended independently.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            merged_sources: self.merged_sources.clone(),
        }
    }

    /// Clears all entries, releasing the held `Arc<str>` strong references.
    /// Used by [`crate::combined_row_writer::CombinedRowWriter`] to avoid
    /// accumulating vocabulary entries that no live output row references
    /// when zero rows have been emitted since the last flush (conservative,
    /// never required for correctness).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.merged_sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn insert_returns_stable_indices() {
        let mut vocab = LocalVocab::new();
        let i0 = vocab.insert("hello");
        let i1 = vocab.insert("world");
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(vocab.get(0), Some("hello"));
        assert_eq!(vocab.get(1), Some("world"));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut source = LocalVocab::new();
        source.insert("a");
        source.insert("b");

        let mut target = LocalVocab::new();
        target.merge(Some(&source));
        assert_eq!(target.len(), 2);

        target.merge(Some(&source));
        assert_eq!(target.len(), 2, "merging the same source twice must be a no-op");
    }

    #[test]
    fn merge_none_is_a_no_op() {
        let mut target = LocalVocab::new();
        target.insert("x");
        target.merge(None);
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn merge_distinct_sources_accumulates() {
        let mut a = LocalVocab::new();
        a.insert("a");
        let mut b = LocalVocab::new();
        b.insert("b");

        let mut target = LocalVocab::new();
        target.merge(Some(&a));
        target.merge(Some(&b));
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn reset_clears_entries() {
        let mut vocab = LocalVocab::new();
        vocab.insert("x");
        vocab.reset();
        assert!(vocab.is_empty());
    }
}
