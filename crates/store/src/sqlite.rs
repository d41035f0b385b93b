/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `sqlite`-backed [`Store`], the on-disk implementation used outside
//! of tests. A single `kv(key BLOB PRIMARY KEY, value BLOB NOT NULL)`
//! table backs every instance; ordering for [`Store::foreach`] uses a
//! custom `SORTED_MBOX` collation registered on every pooled
//! connection. Transactions are `BEGIN IMMEDIATE` ... `COMMIT`, so a
//! writer never has to upgrade a shared lock and racing writers
//! surface `SQLITE_BUSY` promptly, which we fold into `AGAIN`.

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::{collation, ControlFlow, OpenFlags, Store, Transaction};

fn sqlite_err(err: rusqlite::Error) -> trc::Error {
    if let rusqlite::Error::SqliteFailure(ref sqlite_err, _) = err {
        if matches!(
            sqlite_err.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return trc::Error::new(trc::EventType::Store(trc::StoreEvent::Conflict))
                .ctx(trc::Key::Reason, err.to_string())
                .caused_by(trc::location!());
        }
    }
    trc::Error::new(trc::EventType::Store(trc::StoreEvent::IoError))
        .ctx(trc::Key::Reason, err.to_string())
        .caused_by(trc::location!())
}

fn init_connection(conn: &Connection, flags: OpenFlags) -> trc::Result<()> {
    if flags.sorted_mbox {
        conn.create_collation("SORTED_MBOX", |a: &str, b: &str| {
            collation::compare(a.as_bytes(), b.as_bytes())
        })
        .map_err(sqlite_err)?;
    }
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (key BLOB PRIMARY KEY, value BLOB NOT NULL);\
         PRAGMA journal_mode = WAL;\
         PRAGMA busy_timeout = 2000;",
    )
    .map_err(sqlite_err)?;
    Ok(())
}

/// `sqlite`-backed [`Store`].
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    flags: OpenFlags,
}

impl SqliteStore {
    pub fn open(path: &Path, flags: OpenFlags) -> trc::Result<Self> {
        if !flags.create && !path.exists() {
            return Err(trc::Error::new(trc::EventType::Store(trc::StoreEvent::NotFound))
                .ctx(trc::Key::Path, path.display().to_string())
                .caused_by(trc::location!()));
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager).map_err(|e| {
            trc::Error::new(trc::EventType::Store(trc::StoreEvent::IoError))
                .ctx(trc::Key::Reason, e.to_string())
                .caused_by(trc::location!())
        })?;
        let conn = pool.get().map_err(|e| {
            trc::Error::new(trc::EventType::Store(trc::StoreEvent::IoError))
                .ctx(trc::Key::Reason, e.to_string())
                .caused_by(trc::location!())
        })?;
        init_connection(&conn, flags)?;
        Ok(SqliteStore { pool, flags })
    }

    fn conn(&self) -> trc::Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            trc::Error::new(trc::EventType::Store(trc::StoreEvent::IoError))
                .ctx(trc::Key::Reason, e.to_string())
                .caused_by(trc::location!())
        })
    }
}

impl Store for SqliteStore {
    fn fetch(&self, key: &[u8]) -> trc::Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sqlite_err(other)),
            })
    }

    fn store(&self, key: &[u8], value: &[u8]) -> trc::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)\
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )
        .map_err(sqlite_err)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> trc::Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(sqlite_err)?;
        Ok(())
    }

    fn foreach(
        &self,
        prefix: &[u8],
        predicate: &mut dyn FnMut(&[u8], &[u8]) -> bool,
        callback: &mut dyn FnMut(&[u8], &[u8]) -> trc::Result<ControlFlow>,
    ) -> trc::Result<()> {
        let conn = self.conn()?;
        let order_by = if self.flags.sorted_mbox {
            "ORDER BY key COLLATE SORTED_MBOX"
        } else {
            "ORDER BY key"
        };
        let sql = format!("SELECT key, value FROM kv {order_by}");
        let mut stmt = conn.prepare(&sql).map_err(sqlite_err)?;
        let mut rows = stmt.query([]).map_err(sqlite_err)?;

        let mut started = false;
        while let Some(row) = rows.next().map_err(sqlite_err)? {
            let key: Vec<u8> = row.get(0).map_err(sqlite_err)?;
            if !key.starts_with(prefix) {
                if started {
                    break;
                }
                continue;
            }
            started = true;
            let value: Vec<u8> = row.get(1).map_err(sqlite_err)?;
            if !predicate(&key, &value) {
                continue;
            }
            if matches!(callback(&key, &value)?, ControlFlow::Stop) {
                break;
            }
        }
        Ok(())
    }

    fn begin(&self) -> trc::Result<Box<dyn Transaction>> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE").map_err(sqlite_err)?;
        Ok(Box::new(SqliteTransaction { conn: Some(conn) }))
    }

    fn sync(&self) -> trc::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")
            .map_err(sqlite_err)?;
        Ok(())
    }
}

struct SqliteTransaction {
    conn: Option<PooledConnection<SqliteConnectionManager>>,
}

impl SqliteTransaction {
    fn conn(&self) -> &PooledConnection<SqliteConnectionManager> {
        self.conn.as_ref().expect("transaction used after commit/rollback")
    }
}

impl Transaction for SqliteTransaction {
    fn fetch(&mut self, key: &[u8]) -> trc::Result<Option<Vec<u8>>> {
        self.conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sqlite_err(other)),
            })
    }

    fn store(&mut self, key: &[u8], value: &[u8]) -> trc::Result<()> {
        self.conn()
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)\
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )
            .map_err(sqlite_err)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> trc::Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(sqlite_err)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> trc::Result<()> {
        let conn = self.conn.take().expect("transaction used after commit/rollback");
        conn.execute_batch("COMMIT").map_err(sqlite_err)
    }

    fn rollback(mut self: Box<Self>) -> trc::Result<()> {
        let conn = self.conn.take().expect("transaction used after commit/rollback");
        conn.execute_batch("ROLLBACK").map_err(sqlite_err)
    }
}
