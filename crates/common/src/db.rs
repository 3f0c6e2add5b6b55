use std::path::Path;

use sled::{Batch, Db};

const HEAD_INDEX: &str = "head-index";
const HEAD_QUEUE_INDEX: &str = "head-queue-index";
const HEAD_BATCH_INDEX: &str = "head-batch-index";
const HEAD_VERIFIED_INDEX: &str = "head-verified-index";
const HEAD_INDEX_TIME: &str = "head-index-time";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] sled::Error),

    #[error("corrupted value under {0}")]
    Corrupted(&'static str),
}

/// Persisted sync pointers, `None` when nothing was applied yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncPointers {
    pub index: Option<u64>,
    pub queue_index: Option<u64>,
    pub batch_index: Option<u64>,
    pub verified_index: Option<u64>,
    pub index_time: Option<i64>,
}

/// Crash-safe store for the sync pointers
#[derive(Clone)]
pub struct IndexStore {
    db: Db,
}

impl IndexStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self { db: sled::open(path)? })
    }

    /// In-memory store removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }

    fn read_u64(&self, key: &'static str) -> Result<Option<u64>, StoreError> {
        let Some(value) = self.db.get(key)? else {
            return Ok(None);
        };
        let bytes: [u8; 8] = value.as_ref().try_into().map_err(|_| StoreError::Corrupted(key))?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    fn write_u64(&self, key: &'static str, value: Option<u64>) -> Result<(), StoreError> {
        match value {
            Some(value) => self.db.insert(key, &value.to_be_bytes()[..])?,
            None => self.db.remove(key)?,
        };
        self.db.flush()?;
        Ok(())
    }

    pub fn latest_index(&self) -> Result<Option<u64>, StoreError> {
        self.read_u64(HEAD_INDEX)
    }

    pub fn set_latest_index(&self, index: Option<u64>) -> Result<(), StoreError> {
        self.write_u64(HEAD_INDEX, index)
    }

    pub fn latest_queue_index(&self) -> Result<Option<u64>, StoreError> {
        self.read_u64(HEAD_QUEUE_INDEX)
    }

    pub fn set_latest_queue_index(&self, index: Option<u64>) -> Result<(), StoreError> {
        self.write_u64(HEAD_QUEUE_INDEX, index)
    }

    pub fn latest_batch_index(&self) -> Result<Option<u64>, StoreError> {
        self.read_u64(HEAD_BATCH_INDEX)
    }

    pub fn set_latest_batch_index(&self, index: Option<u64>) -> Result<(), StoreError> {
        self.write_u64(HEAD_BATCH_INDEX, index)
    }

    pub fn latest_verified_index(&self) -> Result<Option<u64>, StoreError> {
        self.read_u64(HEAD_VERIFIED_INDEX)
    }

    pub fn set_latest_verified_index(&self, index: Option<u64>) -> Result<(), StoreError> {
        self.write_u64(HEAD_VERIFIED_INDEX, index)
    }

    /// Wall clock seconds of the last applied transaction
    pub fn latest_index_time(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.read_u64(HEAD_INDEX_TIME)?.map(|time| time as i64))
    }

    pub fn pointers(&self) -> Result<SyncPointers, StoreError> {
        Ok(SyncPointers {
            index: self.latest_index()?,
            queue_index: self.latest_queue_index()?,
            batch_index: self.latest_batch_index()?,
            verified_index: self.latest_verified_index()?,
            index_time: self.latest_index_time()?,
        })
    }

    /// Writes back pointers read with [`Self::pointers`] in one atomic write
    pub fn restore_pointers(&self, pointers: SyncPointers) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        let entries = [
            (HEAD_INDEX, pointers.index),
            (HEAD_QUEUE_INDEX, pointers.queue_index),
            (HEAD_BATCH_INDEX, pointers.batch_index),
            (HEAD_VERIFIED_INDEX, pointers.verified_index),
            (HEAD_INDEX_TIME, pointers.index_time.map(|time| time as u64)),
        ];
        for (key, value) in entries {
            match value {
                Some(value) => batch.insert(key, &value.to_be_bytes()[..]),
                None => batch.remove(key),
            }
        }

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Records a committed transaction in one atomic write. The queue pointer only moves
    /// forward for forced inclusions
    pub fn commit_index(
        &self,
        index: u64,
        queue_index: Option<u64>,
        time: i64,
    ) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        batch.insert(HEAD_INDEX, &index.to_be_bytes()[..]);
        batch.insert(HEAD_VERIFIED_INDEX, &index.to_be_bytes()[..]);
        batch.insert(HEAD_INDEX_TIME, &time.to_be_bytes()[..]);

        if let Some(queue_index) = queue_index {
            if self.latest_queue_index()?.is_none_or(|latest| queue_index > latest) {
                batch.insert(HEAD_QUEUE_INDEX, &queue_index.to_be_bytes()[..]);
            }
        }

        self.db.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }
}
