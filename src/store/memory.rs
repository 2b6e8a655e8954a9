//! In-memory profile store with fault injection.
//!
//! Used by the demo CLI and tests to stand in for a hosted `profiles`
//! table: latency, an offline switch, and a read gate that parks reads
//! until released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use super::{ProfileStore, StoreFault};
use crate::models::ProfileRecord;

pub struct MemoryProfileStore {
    records: RwLock<HashMap<String, ProfileRecord>>,

    latency: Mutex<Duration>,

    offline: AtomicBool,

    /// `true` while reads are parked
    read_gate: watch::Sender<bool>,

    /// Reads currently parked at the gate
    pending_reads: watch::Sender<usize>,

    fetch_count: AtomicUsize,

    insert_count: AtomicUsize,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        let (read_gate, _) = watch::channel(false);
        let (pending_reads, _) = watch::channel(0);
        Self {
            records: RwLock::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
            offline: AtomicBool::new(false),
            read_gate,
            pending_reads,
            fetch_count: AtomicUsize::new(0),
            insert_count: AtomicUsize::new(0),
        }
    }

    /// Seed or overwrite a record directly.
    pub fn put(&self, record: ProfileRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<ProfileRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Fail every call with a backend error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Park reads until `release_reads` is called.
    pub fn hold_reads(&self) {
        self.read_gate.send_replace(true);
    }

    pub fn release_reads(&self) {
        self.read_gate.send_replace(false);
    }

    /// Wait until at least `count` reads are parked at the gate.
    pub async fn wait_for_pending_reads(&self, count: usize) {
        let mut pending = self.pending_reads.subscribe();
        let _ = pending.wait_for(|parked| *parked >= count).await;
    }

    /// Reads currently parked at the gate.
    pub fn parked_reads(&self) -> usize {
        *self.pending_reads.borrow()
    }

    /// Number of fetches started.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Number of inserts attempted, conflicts included.
    pub fn insert_count(&self) -> usize {
        self.insert_count.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    async fn pass_read_gate(&self) {
        let mut gate = self.read_gate.subscribe();
        if !*gate.borrow() {
            return;
        }

        let _parked = ParkedRead::new(&self.pending_reads);
        let _ = gate.wait_for(|held| !*held).await;
    }

    fn check_online(&self) -> Result<(), StoreFault> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreFault::Backend("profile store unavailable".into()));
        }
        Ok(())
    }
}

/// Counts a read as parked for as long as it is alive, so a read dropped
/// at the gate (e.g. by a caller's timeout) is no longer counted.
struct ParkedRead<'a> {
    pending: &'a watch::Sender<usize>,
}

impl<'a> ParkedRead<'a> {
    fn new(pending: &'a watch::Sender<usize>) -> Self {
        pending.send_modify(|parked| *parked += 1);
        Self { pending }
    }
}

impl Drop for ParkedRead<'_> {
    fn drop(&mut self) {
        self.pending.send_modify(|parked| *parked -= 1);
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch_profile(&self, id: String) -> Result<Option<ProfileRecord>, StoreFault> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.pass_read_gate().await;
        self.check_online()?;

        let record = self.records.read().get(&id).cloned();
        tracing::trace!("[memory-store] fetch {} found={}", id, record.is_some());
        Ok(record)
    }

    async fn insert_profile(&self, record: ProfileRecord) -> Result<(), StoreFault> {
        self.insert_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_online()?;

        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            tracing::trace!("[memory-store] insert {} conflicted", record.id);
            return Err(StoreFault::Conflict);
        }
        tracing::trace!("[memory-store] insert {}", record.id);
        records.insert(record.id.clone(), record);
        Ok(())
    }
}
