//! # redb Store Adapter
//!
//! [`RedbStore`] maps the [`Store`] contract onto redb, a transactional
//! embedded key-value engine:
//!
//! - the write batch is a redb `WriteTransaction`, held until commit or
//!   rollback; redb applies it atomically
//! - a snapshot is a redb `ReadTransaction`, which pins an MVCC read view
//!   for as long as it lives
//! - plain `get` opens a fresh read transaction, so it always observes the
//!   last committed state even while a batch is in flight
//!
//! All records live in a single table; the key namespaces of
//! [`crate::encoding::keyspace`] keep node, value, reserved and metadata
//! records apart. The table is created eagerly at open so that read
//! transactions on a fresh database do not have to special-case a missing
//! table.
//!
//! The store lives in a directory (the engine file is one member of it) so
//! the tree can destroy everything by removing the directory after close.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use parking_lot::{Mutex, RwLock};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};

use super::Store;

const RECORDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

/// Name of the engine file inside the store directory.
const DB_FILE: &str = "store.redb";

pub struct RedbStore {
    dir: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
    batch: Mutex<Option<WriteTransaction>>,
}

impl RedbStore {
    /// Directory this store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn db(&self) -> Result<Arc<Database>> {
        match self.db.read().as_ref() {
            Some(db) => Ok(Arc::clone(db)),
            None => bail!("store is closed"),
        }
    }

    fn read_txn(&self) -> Result<ReadTransaction> {
        let db = self.db()?;
        db.begin_read().wrap_err("begin read transaction")
    }
}

impl Store for RedbStore {
    type Snapshot = ReadTransaction;

    fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .wrap_err_with(|| format!("create store directory {}", path.display()))?;
        let file = path.join(DB_FILE);
        let db = Database::create(&file)
            .wrap_err_with(|| format!("open store at {}", file.display()))?;

        // Materialize the table so read transactions never race its creation.
        let txn = db.begin_write().wrap_err("initialize records table")?;
        txn.open_table(RECORDS)?;
        txn.commit()?;

        Ok(Self {
            dir: path.to_path_buf(),
            db: RwLock::new(Some(Arc::new(db))),
            batch: Mutex::new(None),
        })
    }

    fn close(&self) -> Result<()> {
        if let Some(txn) = self.batch.lock().take() {
            txn.abort().wrap_err("abort batch left open at close")?;
        }
        match self.db.write().take() {
            Some(_db) => Ok(()),
            None => bail!("store already closed"),
        }
    }

    fn begin_batch(&self) -> Result<()> {
        let mut batch = self.batch.lock();
        ensure!(batch.is_none(), "write batch already active");
        let db = self.db()?;
        *batch = Some(db.begin_write().wrap_err("begin write batch")?);
        Ok(())
    }

    fn put_batch(&self, key: &[u8], value: &[u8]) -> Result<()> {
        ensure!(!key.is_empty(), "empty store key");
        let mut batch = self.batch.lock();
        let txn = match batch.as_mut() {
            Some(txn) => txn,
            None => bail!("no active write batch"),
        };
        let mut table = txn.open_table(RECORDS)?;
        table.insert(key, value)?;
        Ok(())
    }

    fn delete_batch(&self, key: &[u8]) -> Result<()> {
        ensure!(!key.is_empty(), "empty store key");
        let mut batch = self.batch.lock();
        let txn = match batch.as_mut() {
            Some(txn) => txn,
            None => bail!("no active write batch"),
        };
        let mut table = txn.open_table(RECORDS)?;
        table.remove(key)?;
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        let txn = match self.batch.lock().take() {
            Some(txn) => txn,
            None => bail!("no active write batch to commit"),
        };
        txn.commit().wrap_err("commit write batch")
    }

    fn rollback_batch(&self) -> Result<()> {
        let txn = match self.batch.lock().take() {
            Some(txn) => txn,
            None => bail!("no active write batch to roll back"),
        };
        txn.abort().wrap_err("roll back write batch")
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.read_txn()?;
        self.get_at(&txn, key)
    }

    fn snapshot(&self) -> Result<Self::Snapshot> {
        self.read_txn()
    }

    fn get_at(&self, snapshot: &Self::Snapshot, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = snapshot.open_table(RECORDS)?;
        let value = table.get(key)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn iterate(
        &self,
        snapshot: &Self::Snapshot,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let table = snapshot.open_table(RECORDS)?;
        for entry in table.iter()? {
            let (key, value) = entry?;
            visit(key.value(), value.value())?;
        }
        Ok(())
    }

    fn is_empty(&self) -> Result<bool> {
        let txn = self.read_txn()?;
        let table = txn.open_table(RECORDS)?;
        let is_empty = table.iter()?.next().is_none();
        Ok(is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, RedbStore) {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn fresh_store_is_empty() {
        let (_dir, store) = open_store();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn batch_commit_is_visible() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        store.put_batch(b"alpha", b"1").unwrap();
        store.put_batch(b"beta", b"2").unwrap();
        store.commit_batch().unwrap();

        assert_eq!(store.get(b"alpha").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"beta").unwrap(), Some(b"2".to_vec()));
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn rollback_discards_everything() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        store.put_batch(b"alpha", b"1").unwrap();
        store.rollback_batch().unwrap();

        assert_eq!(store.get(b"alpha").unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn uncommitted_batch_is_invisible_to_reads() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        store.put_batch(b"alpha", b"1").unwrap();
        assert_eq!(store.get(b"alpha").unwrap(), None);
        store.commit_batch().unwrap();
        assert_eq!(store.get(b"alpha").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn second_begin_without_commit_fails() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        let err = store.begin_batch().unwrap_err();
        assert!(err.to_string().contains("already active"));
        store.rollback_batch().unwrap();
    }

    #[test]
    fn snapshot_pins_a_point_in_time() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        store.put_batch(b"key", b"old").unwrap();
        store.commit_batch().unwrap();

        let snap = store.snapshot().unwrap();

        store.begin_batch().unwrap();
        store.put_batch(b"key", b"new").unwrap();
        store.commit_batch().unwrap();

        assert_eq!(store.get_at(&snap, b"key").unwrap(), Some(b"old".to_vec()));
        assert_eq!(store.get(b"key").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn iterate_yields_key_order() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        for key in [b"delta".as_ref(), b"alpha", b"charlie", b"bravo"] {
            store.put_batch(key, b"x").unwrap();
        }
        store.commit_batch().unwrap();

        let snap = store.snapshot().unwrap();
        let mut keys = Vec::new();
        store
            .iterate(&snap, &mut |key, _value| {
                keys.push(key.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(
            keys,
            vec![
                b"alpha".to_vec(),
                b"bravo".to_vec(),
                b"charlie".to_vec(),
                b"delta".to_vec()
            ]
        );
    }

    #[test]
    fn delete_in_batch_removes_record() {
        let (_dir, store) = open_store();

        store.begin_batch().unwrap();
        store.put_batch(b"gone", b"soon").unwrap();
        store.commit_batch().unwrap();

        store.begin_batch().unwrap();
        store.delete_batch(b"gone").unwrap();
        store.commit_batch().unwrap();

        assert_eq!(store.get(b"gone").unwrap(), None);
    }

    #[test]
    fn close_is_guarded() {
        let (_dir, store) = open_store();
        store.close().unwrap();
        assert!(store.close().is_err());
        assert!(store.get(b"k").is_err());
    }

    #[test]
    fn reopen_preserves_records() {
        let dir = tempdir().unwrap();
        {
            let store = RedbStore::open(dir.path()).unwrap();
            store.begin_batch().unwrap();
            store.put_batch(b"persist", b"yes").unwrap();
            store.commit_batch().unwrap();
            store.close().unwrap();
        }
        let store = RedbStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"persist").unwrap(), Some(b"yes".to_vec()));
    }
}
