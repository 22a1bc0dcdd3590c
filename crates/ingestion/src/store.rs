//! Reconciliation store: the authoritative set of live records for one feed.
//!
//! Records are kept in a `Vec` so that a superseding record takes the exact
//! slot of the record it retires and the persistence listing has a stable
//! order. Feeds hold tens of records, so linear scans are fine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::record::{FeedRecord, MergeOutcome};

/// Live records for one feed.
#[derive(Debug, Clone)]
pub struct Store<R> {
    records: Vec<R>,
}

impl<R> Default for Store<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<R: FeedRecord> Store<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a freshly parsed record.
    ///
    /// Resolution order:
    /// 1. a live record (other than one with the same identifier) that lists
    ///    the incoming identifier in its `supersedes` wins; the incoming
    ///    record is dropped as stale;
    /// 2. a live record with the same identifier is replaced in place
    ///    (duplicate delivery);
    /// 3. the first live record, in iteration order, whose identifier is in
    ///    the incoming `supersedes` set is replaced in place. Further matches
    ///    stay live;
    /// 4. otherwise the record is appended.
    pub fn merge(&mut self, incoming: R) -> MergeOutcome {
        let id = incoming.identifier();

        if let Some(newer) = self
            .records
            .iter()
            .find(|r| r.identifier() != id && r.supersedes().iter().any(|s| s == id))
        {
            return MergeOutcome::Superseded {
                by: newer.identifier().to_string(),
            };
        }

        if let Some(slot) = self.records.iter_mut().find(|r| r.identifier() == id) {
            let replaced = slot.identifier().to_string();
            *slot = incoming;
            return MergeOutcome::Replaced(replaced);
        }

        let supersedes = incoming.supersedes();
        match self
            .records
            .iter()
            .position(|r| supersedes.iter().any(|s| s == r.identifier()))
        {
            Some(ix) => {
                let old = std::mem::replace(&mut self.records[ix], incoming);
                MergeOutcome::Replaced(old.identifier().to_string())
            }
            None => {
                self.records.push(incoming);
                MergeOutcome::Inserted
            }
        }
    }

    /// Remove every record whose `valid_until` is strictly before `now`.
    ///
    /// Returns the evicted identifiers in listing order.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut evicted = Vec::new();
        self.records.retain(|r| match r.valid_until() {
            Some(until) if until < now => {
                evicted.push(r.identifier().to_string());
                false
            }
            _ => true,
        });
        evicted
    }

    /// Live records in presentation order (highest priority first, ties in
    /// insertion order).
    pub fn snapshot(&self) -> Vec<R> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.priority_cmp(a));
        records
    }

    /// Live records in listing order.
    pub fn all(&self) -> Vec<R> {
        self.records.clone()
    }

    /// Source references in listing order, for the persistence file.
    pub fn references(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.source_reference().to_string())
            .collect()
    }

    pub fn get(&self, identifier: &str) -> Option<&R> {
        self.records.iter().find(|r| r.identifier() == identifier)
    }

    /// Keep only the records matching `keep`; returns the removed
    /// identifiers in listing order.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&R) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.records.retain(|r| {
            let kept = keep(r);
            if !kept {
                removed.push(r.identifier().to_string());
            }
            kept
        });
        removed
    }

    pub(crate) fn get_mut(&mut self, identifier: &str) -> Option<&mut R> {
        self.records.iter_mut().find(|r| r.identifier() == identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Cloneable handle to a feed's store.
///
/// Mutations take the write guard for their whole duration, so readers see
/// the store either before or after a merge or sweep, never in between.
#[derive(Debug)]
pub struct SharedStore<R> {
    inner: Arc<RwLock<Store<R>>>,
}

impl<R> Clone for SharedStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: FeedRecord> Default for SharedStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: FeedRecord> SharedStore<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Store::new())),
        }
    }

    /// Run a mutation under the write guard.
    pub async fn write<T>(&self, f: impl FnOnce(&mut Store<R>) -> T) -> T {
        let mut store = self.inner.write().await;
        f(&mut store)
    }

    /// Run a read under the read guard.
    pub async fn read<T>(&self, f: impl FnOnce(&Store<R>) -> T) -> T {
        let store = self.inner.read().await;
        f(&store)
    }

    pub async fn snapshot(&self) -> Vec<R> {
        self.read(Store::snapshot).await
    }

    pub async fn all(&self) -> Vec<R> {
        self.read(Store::all).await
    }

    pub async fn references(&self) -> Vec<String> {
        self.read(Store::references).await
    }

    pub async fn len(&self) -> usize {
        self.read(Store::len).await
    }
}
