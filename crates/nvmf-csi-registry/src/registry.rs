//! Device registry and allocation engine
//!
//! The registry owns the in-memory device catalog. The catalog is a cache of
//! the allocation store: every allocation change is written to the store
//! before it is applied in memory, so the catalog never reports a device as
//! allocated without a durable record behind it.
//!
//! All catalog mutations (initial load, discovery merge, allocate, release)
//! run under one async mutex, so readers never see a half-applied change.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::device::{AllocationState, Device};
use crate::discovery::FabricDiscoverer;
use crate::error::{RegistryError, RegistryResult, SyncError};
use crate::store::{AllocationSnapshot, AllocationStore, StoreError};

type SyncFuture = Shared<BoxFuture<'static, Result<(), SyncError>>>;

/// Progress of the one-time snapshot load
enum SyncState {
    NotSynced,
    /// A load is in flight; every caller awaits the same future
    Loading(SyncFuture),
    Synced,
}

struct Inner {
    /// Devices keyed by NQN; iteration order is the allocation order
    catalog: AsyncMutex<BTreeMap<String, Device>>,
    sync: Mutex<SyncState>,
    store: Arc<dyn AllocationStore>,
    discoverer: Arc<dyn FabricDiscoverer>,
}

/// Authoritative in-process view of device inventory and allocation.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<Inner>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn AllocationStore>, discoverer: Arc<dyn FabricDiscoverer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog: AsyncMutex::new(BTreeMap::new()),
                sync: Mutex::new(SyncState::NotSynced),
                store,
                discoverer,
            }),
        }
    }

    /// Whether the allocation snapshot has been loaded
    pub fn is_synced(&self) -> bool {
        matches!(*self.inner.sync.lock(), SyncState::Synced)
    }

    /// Load the allocation snapshot once.
    ///
    /// Concurrent callers share a single in-flight load and all observe its
    /// outcome. After a success every later call returns immediately; after
    /// a failure the next call starts a fresh load.
    pub async fn ensure_initial_sync(&self) -> Result<(), SyncError> {
        let load = {
            let mut state = self.inner.sync.lock();
            match &*state {
                SyncState::Synced => return Ok(()),
                SyncState::Loading(load) => load.clone(),
                SyncState::NotSynced => {
                    // Runs as its own task so it completes and releases the
                    // catalog even if every caller stops waiting
                    let task = tokio::spawn(Arc::clone(&self.inner).initial_load());
                    let load = task
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                Err(SyncError::Store(format!("snapshot load task failed: {e}")))
                            })
                        })
                        .boxed()
                        .shared();
                    *state = SyncState::Loading(load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut state = self.inner.sync.lock();
        if let SyncState::Loading(current) = &*state {
            // Only the load we awaited may settle the state
            if current.ptr_eq(&load) {
                *state = if result.is_ok() {
                    SyncState::Synced
                } else {
                    SyncState::NotSynced
                };
            }
        }
        result
    }

    /// Query the fabric and merge the result into the catalog.
    ///
    /// New NQNs are added as free devices. Known NQNs keep their allocation
    /// state; their addressing is only filled in when the catalog learned
    /// about them from the snapshot and has none yet. Returns the number of
    /// newly added devices.
    pub async fn discover_devices(&self, parameters: &HashMap<String, String>) -> RegistryResult<usize> {
        let descriptors = self.inner.discoverer.discover(parameters).await?;

        let mut catalog = self.inner.catalog.lock().await;
        let mut added = 0usize;
        for descriptor in descriptors {
            match catalog.entry(descriptor.nqn.clone()) {
                Entry::Vacant(slot) => {
                    debug!(
                        "Discovered device {} ({}, {} endpoint(s))",
                        descriptor.nqn,
                        descriptor.transport,
                        descriptor.endpoints.len()
                    );
                    slot.insert(Device::discovered(descriptor));
                    added += 1;
                }
                Entry::Occupied(mut slot) => {
                    let device = slot.get_mut();
                    if !device.is_addressable() {
                        debug!("Resolved addressing for restored device {}", device.nqn);
                        device.transport = Some(descriptor.transport);
                        device.endpoints = descriptor.endpoints;
                    }
                }
            }
        }

        debug!(
            "Discovery via {} merged: {} new, {} total",
            self.inner.discoverer.name(),
            added,
            catalog.len()
        );
        Ok(added)
    }

    /// Bind a free device to `volume_id`.
    ///
    /// Picks the first allocatable device in NQN order. If `volume_id`
    /// already owns a device (a retried create), that device is returned
    /// unchanged. The allocation is persisted before it is applied.
    pub async fn allocate_device(&self, volume_id: &str) -> RegistryResult<Device> {
        let mut catalog = self.inner.catalog.lock().await;

        if let Some(existing) = catalog
            .values()
            .find(|d| d.owner_volume() == Some(volume_id))
        {
            info!(
                "Volume {} already owns device {}, reusing it",
                volume_id, existing.nqn
            );
            return Ok(existing.clone());
        }

        let Some(device) = catalog.values_mut().find(|d| d.is_allocatable()) else {
            warn!("No free device available for volume {}", volume_id);
            return Err(RegistryError::NoDeviceAvailable);
        };

        let state = AllocationState::Allocated {
            owner_volume: volume_id.to_string(),
        };
        self.inner.persist(&device.nqn, &state).await?;
        device.state = state;

        info!("Allocated device {} to volume {}", device.nqn, volume_id);
        Ok(device.clone())
    }

    /// Return the device at `nqn` to the free pool.
    ///
    /// Unknown or already-free devices are left alone and reported as
    /// `Ok(false)`. The release is persisted before it is applied.
    pub async fn release_device(&self, nqn: &str) -> RegistryResult<bool> {
        let mut catalog = self.inner.catalog.lock().await;

        let Some(device) = catalog.get_mut(nqn) else {
            debug!("Release of unknown device {}, nothing to do", nqn);
            return Ok(false);
        };
        let Some(owner) = device.owner_volume().map(str::to_string) else {
            debug!("Device {} already free", nqn);
            return Ok(false);
        };

        self.inner.persist(nqn, &AllocationState::Free).await?;
        device.state = AllocationState::Free;

        info!("Released device {} from volume {}", nqn, owner);
        Ok(true)
    }

    /// Look up a device by NQN
    pub async fn get_device_by_nqn(&self, nqn: &str) -> Option<Device> {
        self.inner.catalog.lock().await.get(nqn).cloned()
    }

    /// Copy of the catalog in allocation order
    pub async fn devices(&self) -> Vec<Device> {
        self.inner.catalog.lock().await.values().cloned().collect()
    }
}

impl Inner {
    /// Load the snapshot and settle the sync state with the outcome
    async fn initial_load(self: Arc<Self>) -> Result<(), SyncError> {
        let result = self.load_snapshot().await;
        let mut state = self.sync.lock();
        if matches!(*state, SyncState::Loading(_)) {
            *state = if result.is_ok() {
                SyncState::Synced
            } else {
                SyncState::NotSynced
            };
        }
        result
    }

    /// Read the snapshot and apply it to the catalog.
    ///
    /// The catalog lock is held across the store read so no allocate or
    /// release can slip in between the read and the apply.
    async fn load_snapshot(&self) -> Result<(), SyncError> {
        let mut catalog = self.catalog.lock().await;

        let snapshot = self.store.load().await.map_err(|e| {
            error!("Failed to load allocation snapshot from {}: {}", self.store.name(), e);
            SyncError::from(e)
        })?;
        validate_snapshot(&snapshot)?;

        let mut allocated = 0usize;
        for (nqn, state) in snapshot {
            if state.is_allocated() {
                allocated += 1;
            }
            match catalog.entry(nqn) {
                Entry::Vacant(slot) => {
                    let nqn = slot.key().clone();
                    slot.insert(Device::restored(nqn, state));
                }
                Entry::Occupied(mut slot) => slot.get_mut().state = state,
            }
        }

        info!(
            "Loaded allocation snapshot from {} store: {} device(s), {} allocated",
            self.store.name(),
            catalog.len(),
            allocated
        );
        Ok(())
    }

    async fn persist(&self, nqn: &str, state: &AllocationState) -> Result<(), StoreError> {
        let record = AllocationSnapshot::from([(nqn.to_string(), state.clone())]);
        self.store.save(&record).await.inspect_err(|e| {
            error!(
                "Failed to persist allocation of {} to {}: {}",
                nqn,
                self.store.name(),
                e
            );
        })
    }
}

fn validate_snapshot(snapshot: &AllocationSnapshot) -> Result<(), SyncError> {
    let mut owners = HashSet::new();
    for (nqn, state) in snapshot {
        if nqn.is_empty() {
            return Err(SyncError::Malformed("record with empty NQN".to_string()));
        }
        if let Some(owner) = state.owner_volume() {
            if owner.is_empty() {
                return Err(SyncError::Malformed(format!(
                    "device {nqn} allocated without an owner"
                )));
            }
            if !owners.insert(owner) {
                return Err(SyncError::Malformed(format!(
                    "volume {owner} owns more than one device"
                )));
            }
        }
    }
    Ok(())
}
