//! Per-key execution leases for in-process single-flight.

use crate::error::IngestResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sluice_core::{CanonicalKey, ProcessedRecord};
use tokio::sync::watch;

/// What a leader hands to everyone waiting on the same key.
pub(crate) type Outcome = IngestResult<ProcessedRecord>;

type Slot = watch::Receiver<Option<Outcome>>;

/// Table of keys currently being processed.
#[derive(Debug, Default)]
pub(crate) struct LeaseTable {
    leases: DashMap<CanonicalKey, Slot>,
}

/// The caller's role for one key.
pub(crate) enum Lease<'a> {
    /// Run the pipeline and publish the outcome.
    Leader(LeaseGuard<'a>),
    /// Wait for the leader.
    Follower(Slot),
}

impl LeaseTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Become leader for `key`, or follow the current one.
    pub(crate) fn acquire(&self, key: &CanonicalKey) -> Lease<'_> {
        match self.leases.entry(key.clone()) {
            Entry::Occupied(entry) => Lease::Follower(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx);
                Lease::Leader(LeaseGuard {
                    table: self,
                    key: key.clone(),
                    tx,
                })
            }
        }
    }

    /// Number of keys with a leader running.
    pub(crate) fn active(&self) -> usize {
        self.leases.len()
    }
}

/// Held by the leader. Dropping it releases the key on every exit path.
pub(crate) struct LeaseGuard<'a> {
    table: &'a LeaseTable,
    key: CanonicalKey,
    tx: watch::Sender<Option<Outcome>>,
}

impl LeaseGuard<'_> {
    /// Deliver the outcome to current followers and release the lease.
    pub(crate) fn publish(self, outcome: &Outcome) {
        self.tx.send_replace(Some(outcome.clone()));
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.table.leases.remove(&self.key);
    }
}

/// Wait for the leader's outcome. `None` when the leader vanished without
/// publishing, e.g. its task was cancelled.
pub(crate) async fn follow(mut slot: Slot) -> Option<Outcome> {
    match slot.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    }
}
