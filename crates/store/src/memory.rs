/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! In-memory reference backend: a `BTreeMap` ordered under
//! `SORTED_MBOX` collation, guarded by a `parking_lot::RwLock`.
//! Transactions use optimistic concurrency: each key read inside a
//! transaction records the store-wide version it saw, and commit
//! fails with `StoreEvent::Conflict` if any of those keys moved on
//! before the transaction applies its writes.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::{collation::MboxKey, ControlFlow, Store, Transaction};

#[derive(Default)]
struct Inner {
    map: BTreeMap<MboxKey, Vec<u8>>,
    versions: HashMap<Vec<u8>, u64>,
    clock: u64,
}

impl Inner {
    fn version_of(&self, key: &[u8]) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn apply(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        self.clock += 1;
        match value {
            Some(v) => {
                self.map.insert(MboxKey(key.clone()), v);
            }
            None => {
                self.map.remove(&MboxKey(key.clone()));
            }
        }
        self.versions.insert(key, self.clock);
    }
}

/// In-memory [`Store`] implementation.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn fetch(&self, key: &[u8]) -> trc::Result<Option<Vec<u8>>> {
        Ok(self.inner.read().map.get(&MboxKey(key.to_vec())).cloned())
    }

    fn store(&self, key: &[u8], value: &[u8]) -> trc::Result<()> {
        self.inner.write().apply(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> trc::Result<()> {
        self.inner.write().apply(key.to_vec(), None);
        Ok(())
    }

    fn foreach(
        &self,
        prefix: &[u8],
        predicate: &mut dyn FnMut(&[u8], &[u8]) -> bool,
        callback: &mut dyn FnMut(&[u8], &[u8]) -> trc::Result<ControlFlow>,
    ) -> trc::Result<()> {
        let inner = self.inner.read();
        for (key, value) in inner.map.range(MboxKey(prefix.to_vec())..) {
            if !key.0.starts_with(prefix) {
                break;
            }
            if !predicate(&key.0, value) {
                continue;
            }
            if matches!(callback(&key.0, value)?, ControlFlow::Stop) {
                break;
            }
        }
        Ok(())
    }

    fn begin(&self) -> trc::Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.inner.clone(),
            read_versions: HashMap::new(),
            writes: HashMap::new(),
        }))
    }

    fn sync(&self) -> trc::Result<()> {
        Ok(())
    }
}

struct MemoryTransaction {
    store: Arc<RwLock<Inner>>,
    read_versions: HashMap<Vec<u8>, u64>,
    writes: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Transaction for MemoryTransaction {
    fn fetch(&mut self, key: &[u8]) -> trc::Result<Option<Vec<u8>>> {
        if let Some(overlaid) = self.writes.get(key) {
            return Ok(overlaid.clone());
        }
        let inner = self.store.read();
        self.read_versions
            .entry(key.to_vec())
            .or_insert_with(|| inner.version_of(key));
        Ok(inner.map.get(&MboxKey(key.to_vec())).cloned())
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> trc::Result<()> {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> trc::Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn commit(self: Box<Self>) -> trc::Result<()> {
        let mut inner = self.store.write();
        for (key, expected) in &self.read_versions {
            if inner.version_of(key) != *expected {
                return Err(trc::Error::new(trc::EventType::Store(trc::StoreEvent::Conflict))
                    .ctx(trc::Key::Reason, String::from_utf8_lossy(key).to_string())
                    .caused_by(trc::location!()));
            }
        }
        for (key, value) in self.writes {
            inner.apply(key, value);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> trc::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_fetch_round_trips() {
        let store = MemoryStore::new();
        store.store(b"user.fred", b"record").unwrap();
        assert_eq!(store.fetch(b"user.fred").unwrap(), Some(b"record".to_vec()));
    }

    #[test]
    fn delete_removes_key() {
        let store = MemoryStore::new();
        store.store(b"user.fred", b"record").unwrap();
        store.delete(b"user.fred").unwrap();
        assert_eq!(store.fetch(b"user.fred").unwrap(), None);
    }

    #[test]
    fn foreach_respects_prefix_and_predicate() {
        let store = MemoryStore::new();
        store.store(b"user.fred", b"1").unwrap();
        store.store(b"user.fred.Drafts", b"2").unwrap();
        store.store(b"user.george", b"3").unwrap();

        let mut seen = Vec::new();
        store
            .foreach(
                b"user.fred",
                &mut |_, _| true,
                &mut |k, _| {
                    seen.push(k.to_vec());
                    Ok(ControlFlow::Continue)
                },
            )
            .unwrap();
        assert_eq!(seen, vec![b"user.fred".to_vec(), b"user.fred.Drafts".to_vec()]);
    }

    #[test]
    fn foreach_stop_halts_iteration() {
        let store = MemoryStore::new();
        store.store(b"a.1", b"").unwrap();
        store.store(b"a.2", b"").unwrap();
        store.store(b"a.3", b"").unwrap();

        let mut count = 0;
        store
            .foreach(
                b"a.",
                &mut |_, _| true,
                &mut |_, _| {
                    count += 1;
                    Ok(ControlFlow::Stop)
                },
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn transaction_sees_its_own_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.store(b"k", b"v").unwrap();
        assert_eq!(tx.fetch(b"k").unwrap(), Some(b"v".to_vec()));
        // Not yet visible outside the transaction.
        assert_eq!(store.fetch(b"k").unwrap(), None);
        tx.commit().unwrap();
        assert_eq!(store.fetch(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        tx.store(b"k", b"v").unwrap();
        tx.rollback().unwrap();
        assert_eq!(store.fetch(b"k").unwrap(), None);
    }
}
