//! Allocation store abstraction
//!
//! The store is the cross-process source of truth for which devices are
//! allocated. The registry only needs two operations from it: read the whole
//! snapshot once at startup, and upsert the records it changes.

use crate::device::AllocationState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Durable allocation map: device NQN to allocation state
pub type AllocationSnapshot = BTreeMap<String, AllocationState>;

/// Error type for allocation store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl StoreError {
    /// Whether the store was reachable but returned undecodable data
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent key-value store holding the allocation snapshot.
///
/// Implementations must provide read-after-write consistency: a `load`
/// issued after a successful `save` observes the saved records.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Read every persisted record
    async fn load(&self) -> StoreResult<AllocationSnapshot>;

    /// Atomically upsert the given records. Records not named in `records`
    /// are left untouched.
    async fn save(&self, records: &AllocationSnapshot) -> StoreResult<()>;
}

/// In-process allocation store.
///
/// Satisfies the store contract within one process; contents are lost on
/// restart.
#[derive(Debug, Default)]
pub struct MemoryAllocationStore {
    records: Mutex<AllocationSnapshot>,
}

impl MemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing records
    pub fn with_snapshot(snapshot: AllocationSnapshot) -> Self {
        Self {
            records: Mutex::new(snapshot),
        }
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> AllocationSnapshot {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AllocationStore for MemoryAllocationStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> StoreResult<AllocationSnapshot> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &AllocationSnapshot) -> StoreResult<()> {
        let mut stored = self.records.lock();
        for (nqn, state) in records {
            stored.insert(nqn.clone(), state.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocated(owner: &str) -> AllocationState {
        AllocationState::Allocated {
            owner_volume: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_upserts() {
        let store = MemoryAllocationStore::with_snapshot(AllocationSnapshot::from([
            ("nqn-a".to_string(), allocated("vol1")),
            ("nqn-b".to_string(), AllocationState::Free),
        ]));

        store
            .save(&AllocationSnapshot::from([(
                "nqn-b".to_string(),
                allocated("vol2"),
            )]))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        // untouched by a save that did not name it
        assert_eq!(loaded["nqn-a"], allocated("vol1"));
        assert_eq!(loaded["nqn-b"], allocated("vol2"));
    }

    #[test]
    fn test_decode_errors_are_distinguished() {
        let json_err = serde_json::from_str::<AllocationState>("{").unwrap_err();
        assert!(StoreError::Json(json_err).is_decode());
        assert!(!StoreError::Backend("down".into()).is_decode());
    }
}
