//! Secondary key-state index
//!
//! A small embedded database under the chunk root recording the last
//! transfer operation observed per key, with a timestamp. Entries are
//! ADVISORY ONLY: a lost update costs at most a redundant transfer, and the
//! content file, not the index, is the authoritative presence signal.

use crate::key::{Key, Op, KEY_SIZE};
use crate::{BitsError, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// File name of the index database inside the chunk root
pub const INDEX_FILE: &str = "a.chunks";

const KEY_STATES: TableDefinition<&[u8], (u8, u64)> = TableDefinition::new("key_states");

/// Key-state index backed by a single database file
pub struct Index {
    db: Database,
}

impl Index {
    /// Open (or create) the index at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(ix)?;
        // create the table so first readers see it
        let txn = db.begin_write().map_err(ix)?;
        txn.open_table(KEY_STATES).map_err(ix)?;
        txn.commit().map_err(ix)?;
        Ok(Self { db })
    }

    /// Record `op` as the last operation observed on `key`
    pub fn mark(&self, key: &Key, op: Op) -> Result<()> {
        let txn = self.db.begin_write().map_err(ix)?;
        {
            let mut table = txn.open_table(KEY_STATES).map_err(ix)?;
            table
                .insert(key.as_bytes().as_slice(), (op.code(), unix_now()))
                .map_err(ix)?;
        }
        txn.commit().map_err(ix)?;
        Ok(())
    }

    /// Last operation recorded for `key`, with its unix timestamp
    pub fn last_op(&self, key: &Key) -> Result<Option<(Op, u64)>> {
        let txn = self.db.begin_read().map_err(ix)?;
        let table = txn.open_table(KEY_STATES).map_err(ix)?;
        let guard = match table.get(key.as_bytes().as_slice()).map_err(ix)? {
            Some(guard) => guard,
            None => return Ok(None),
        };
        let (code, ts) = guard.value();
        Ok(Op::from_code(code).map(|op| (op, ts)))
    }

    /// All keys whose last recorded operation is `op`, with timestamps
    ///
    /// Entries that fail to decode are skipped; the index is advisory.
    pub fn iterate_since(&self, op: Op) -> Result<Vec<(Key, u64)>> {
        let txn = self.db.begin_read().map_err(ix)?;
        let table = txn.open_table(KEY_STATES).map_err(ix)?;
        let mut found = Vec::new();
        for entry in table.iter().map_err(ix)? {
            let (key_guard, value_guard) = entry.map_err(ix)?;
            let bytes = key_guard.value();
            if bytes.len() != KEY_SIZE {
                continue;
            }
            let mut arr = [0u8; KEY_SIZE];
            arr.copy_from_slice(bytes);
            let (code, ts) = value_guard.value();
            match Op::from_code(code) {
                Some(recorded) if recorded == op => found.push((Key::new(arr), ts)),
                _ => continue,
            }
        }
        Ok(found)
    }
}

fn ix(err: impl Into<redb::Error>) -> BitsError {
    BitsError::Index(err.into().to_string())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_index(dir: &tempfile::TempDir) -> Index {
        Index::open(&dir.path().join(INDEX_FILE)).unwrap()
    }

    #[test]
    fn mark_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);
        let key = Key::zero();

        assert_eq!(index.last_op(&key).unwrap(), None);
        index.mark(&key, Op::Stage).unwrap();
        let (op, ts) = index.last_op(&key).unwrap().unwrap();
        assert_eq!(op, Op::Stage);
        assert!(ts > 0);
    }

    #[test]
    fn mark_overwrites_previous_op() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);
        let key = Key::zero();

        index.mark(&key, Op::Fetch).unwrap();
        index.mark(&key, Op::Push).unwrap();
        assert_eq!(index.last_op(&key).unwrap().unwrap().0, Op::Push);
    }

    #[test]
    fn iterate_since_filters_by_op() {
        let dir = tempfile::tempdir().unwrap();
        let index = open_index(&dir);

        let mut pushed = [0u8; KEY_SIZE];
        pushed[0] = 1;
        let mut staged = [0u8; KEY_SIZE];
        staged[0] = 2;
        index.mark(&Key::new(pushed), Op::Push).unwrap();
        index.mark(&Key::new(staged), Op::Stage).unwrap();

        let found = index.iterate_since(Op::Push).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, Key::new(pushed));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = Key::zero();
        {
            let index = open_index(&dir);
            index.mark(&key, Op::Push).unwrap();
        }
        let index = open_index(&dir);
        assert_eq!(index.last_op(&key).unwrap().unwrap().0, Op::Push);
    }
}
