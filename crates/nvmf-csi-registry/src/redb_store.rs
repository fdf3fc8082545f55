//! Persistent allocation store using Redb
//!
//! One table maps each device NQN to its JSON-encoded allocation state so
//! allocations survive controller restarts.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::device::AllocationState;
use crate::store::{AllocationSnapshot, AllocationStore, StoreResult};

/// Allocations: nqn (str) → JSON(AllocationState)
const ALLOCATIONS: TableDefinition<&str, &str> = TableDefinition::new("allocations");

/// Allocation store backed by a local Redb database.
pub struct RedbAllocationStore {
    db: Arc<Database>,
}

impl RedbAllocationStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let wtx = db.begin_write()?;
        wtx.open_table(ALLOCATIONS)?;
        wtx.commit()?;

        debug!("Opened allocation store at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }
}

fn read_all(db: &Database) -> StoreResult<AllocationSnapshot> {
    let rtx = db.begin_read()?;
    let table = rtx.open_table(ALLOCATIONS)?;
    let mut snapshot = AllocationSnapshot::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        let state: AllocationState = serde_json::from_str(value.value())?;
        snapshot.insert(key.value().to_string(), state);
    }
    Ok(snapshot)
}

fn write_all(db: &Database, records: &[(String, String)]) -> StoreResult<()> {
    let wtx = db.begin_write()?;
    {
        let mut table = wtx.open_table(ALLOCATIONS)?;
        for (nqn, json) in records {
            table.insert(nqn.as_str(), json.as_str())?;
        }
    }
    wtx.commit()?;
    Ok(())
}

#[async_trait]
impl AllocationStore for RedbAllocationStore {
    fn name(&self) -> &str {
        "redb"
    }

    async fn load(&self) -> StoreResult<AllocationSnapshot> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || read_all(&db)).await?
    }

    async fn save(&self, records: &AllocationSnapshot) -> StoreResult<()> {
        let encoded = records
            .iter()
            .map(|(nqn, state)| -> StoreResult<(String, String)> {
                Ok((nqn.clone(), serde_json::to_string(state)?))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || write_all(&db, &encoded)).await?
    }
}
