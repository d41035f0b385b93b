/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Ordered key/value backend used by the mailbox registry
//! (`mblist`) and the per-user subscription list.
//!
//! Two independent implementations exist: [`memory::MemoryStore`], a
//! `BTreeMap` guarded by a `parking_lot::RwLock`, used by tests and as
//! a reference model; and [`sqlite::SqliteStore`], backed by a pooled
//! `rusqlite` connection using `BEGIN IMMEDIATE` for the transactional
//! contract. Both order keys with the [`collation`] comparator.

pub mod collation;
pub mod memory;
pub mod sqlite;

use std::time::Duration;

/// Flags passed to [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Create the backing store if it does not already exist.
    pub create: bool,
    /// Use the `SORTED_MBOX` collation (`.` sorts below any other
    /// printable byte) rather than plain byte-lexicographic order.
    pub sorted_mbox: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags {
            create: true,
            sorted_mbox: true,
        }
    }
}

/// Returned from a [`Store::foreach`] callback to stop iteration early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Stop,
}

/// A single logical mutation unit. A transaction sees its own writes;
/// other transactions see a snapshot taken at the transaction's first
/// read. Conflicting commits surface as
/// `trc::EventType::Store(trc::StoreEvent::Conflict)`, which callers
/// retry idempotently (see [`Store::transact`]).
pub trait Transaction {
    fn fetch(&mut self, key: &[u8]) -> trc::Result<Option<Vec<u8>>>;
    fn store(&mut self, key: &[u8], value: &[u8]) -> trc::Result<()>;
    fn delete(&mut self, key: &[u8]) -> trc::Result<()>;
    fn commit(self: Box<Self>) -> trc::Result<()>;
    fn rollback(self: Box<Self>) -> trc::Result<()>;
}

/// An ordered persistent map with transactional put/delete/fetch,
/// prefix iteration, and a configurable key collation.
pub trait Store: Send + Sync {
    fn fetch(&self, key: &[u8]) -> trc::Result<Option<Vec<u8>>>;

    /// Like [`Store::fetch`], but inside an open transaction: reads the
    /// transaction's own uncommitted writes before falling through to
    /// its snapshot.
    fn fetch_locked(&self, key: &[u8], tx: &mut dyn Transaction) -> trc::Result<Option<Vec<u8>>> {
        tx.fetch(key)
    }

    fn store(&self, key: &[u8], value: &[u8]) -> trc::Result<()>;
    fn delete(&self, key: &[u8]) -> trc::Result<()>;

    /// Iterates in collation order over every key with the given byte
    /// prefix. `predicate(k, v)` is a fast filter; `callback(k, v)` is
    /// invoked only when the predicate returned `true`, and may return
    /// [`ControlFlow::Stop`] to terminate iteration early.
    fn foreach(
        &self,
        prefix: &[u8],
        predicate: &mut dyn FnMut(&[u8], &[u8]) -> bool,
        callback: &mut dyn FnMut(&[u8], &[u8]) -> trc::Result<ControlFlow>,
    ) -> trc::Result<()>;

    /// Opens a new transaction. Implementations return an owned handle
    /// (a cloned `Arc` for the in-memory backend, an owned pooled
    /// connection for sqlite) so the trait object carries no lifetime
    /// parameter.
    fn begin(&self) -> trc::Result<Box<dyn Transaction>>;

    /// Flushes to stable storage.
    fn sync(&self) -> trc::Result<()>;

    /// Runs `f` inside a transaction, retrying on
    /// `StoreEvent::Conflict` with a bounded exponential backoff
    /// (1ms, 2ms, 4ms, ... capped at 100ms, five attempts).
    fn transact<R>(&self, mut f: impl FnMut(&mut dyn Transaction) -> trc::Result<R>) -> trc::Result<R> {
        let mut delay = Duration::from_millis(1);
        for attempt in 0..5 {
            let mut tx = self.begin()?;
            match f(tx.as_mut()) {
                Ok(value) => {
                    tx.commit()?;
                    return Ok(value);
                }
                Err(err) if is_conflict(&err) => {
                    tx.rollback()?;
                    if attempt == 4 {
                        return Err(err);
                    }
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(Duration::from_millis(100));
                }
                Err(err) => {
                    tx.rollback()?;
                    return Err(err);
                }
            }
        }
        unreachable!("loop always returns or raises on its final attempt")
    }
}

fn is_conflict(err: &trc::Error) -> bool {
    matches!(err.event, trc::EventType::Store(trc::StoreEvent::Conflict))
}

/// Opens a store rooted at `path`. `path` is a directory for
/// [`memory::MemoryStore`] (ignored, kept for interface symmetry) or a
/// sqlite database file for [`sqlite::SqliteStore`].
pub fn open_sqlite(path: &std::path::Path, flags: OpenFlags) -> trc::Result<sqlite::SqliteStore> {
    sqlite::SqliteStore::open(path, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn transact_retries_on_conflict() {
        let store = MemoryStore::new();
        store.store(b"k", b"v0").unwrap();

        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = store.transact(|tx| {
            let current = tx.fetch(b"k")?.unwrap();
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                // Simulate a concurrent writer racing ahead of us between
                // our read and our commit.
                store.store(b"k", b"v-racer").unwrap();
            }
            tx.store(b"k", &current)?;
            Ok(())
        });
        assert!(result.is_ok());
        assert!(attempts.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }
}
