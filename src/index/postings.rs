//! Trigram posting lists.
//!
//! Each trigram maps to the sorted set of file ids whose content contains it.
//! Lists are shared between snapshots through `Arc` and copied only when a
//! builder touches them, so producing the next snapshot costs a map clone plus
//! the lists that actually change.

use crate::index::types::{FileId, Trigram};
use ahash::AHashMap;
use roaring::RoaringBitmap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TrigramPostings {
    lists: AHashMap<Trigram, Arc<RoaringBitmap>>,
}

impl TrigramPostings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` under every trigram in `trigrams`
    pub fn add_file(&mut self, id: FileId, trigrams: &[Trigram]) {
        for &trigram in trigrams {
            Arc::make_mut(self.lists.entry(trigram).or_default()).insert(id);
        }
    }

    /// Drop `id` from every list in `trigrams`, removing lists that empty out
    pub fn remove_file(&mut self, id: FileId, trigrams: &[Trigram]) {
        for trigram in trigrams {
            let now_empty = match self.lists.get_mut(trigram) {
                Some(list) => {
                    let list = Arc::make_mut(list);
                    list.remove(id);
                    list.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.lists.remove(trigram);
            }
        }
    }

    /// Posting list for a trigram
    pub fn get(&self, trigram: Trigram) -> Option<&RoaringBitmap> {
        self.lists.get(&trigram).map(|list| list.as_ref())
    }

    pub fn contains(&self, trigram: Trigram, id: FileId) -> bool {
        self.get(trigram).is_some_and(|list| list.contains(id))
    }

    /// Number of files whose content contains `trigram`
    pub fn doc_freq(&self, trigram: Trigram) -> u64 {
        self.get(trigram).map(|list| list.len()).unwrap_or(0)
    }

    /// Intersect the lists of all `trigrams`, smallest list first.
    ///
    /// Returns an empty set as soon as one trigram is absent. An empty
    /// `trigrams` slice yields an empty set as well; callers decide what "no
    /// constraint" means.
    pub fn intersect(&self, trigrams: &[Trigram]) -> RoaringBitmap {
        let mut lists: Vec<&RoaringBitmap> = Vec::with_capacity(trigrams.len());
        for &trigram in trigrams {
            match self.get(trigram) {
                Some(list) => lists.push(list),
                None => return RoaringBitmap::new(),
            }
        }

        lists.sort_by_key(|list| list.len());

        let mut iter = lists.into_iter();
        let Some(first) = iter.next() else {
            return RoaringBitmap::new();
        };

        let mut result = first.clone();
        for list in iter {
            result &= list;
            if result.is_empty() {
                break;
            }
        }
        result
    }

    /// Number of distinct trigrams indexed
    pub fn trigram_count(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
