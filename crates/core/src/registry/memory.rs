//! In-memory task registry backed by a per-user lock table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use super::store::{RecordOutcome, RegistryError, TaskRegistry};
use super::types::{Batch, BatchState, ItemRef, RegistryStats, UserId};

/// Everything the registry tracks for one user.
#[derive(Debug, Default)]
struct UserSlot {
    /// Batch accepting items.
    open: Option<Batch>,
    /// Batch whose archive is being built.
    finalizing: Option<Batch>,
}

impl UserSlot {
    fn is_vacant(&self) -> bool {
        self.open.is_none() && self.finalizing.is_none()
    }
}

type SlotHandle = Arc<Mutex<UserSlot>>;

/// Registry keeping every batch in process memory.
///
/// The outer map is only locked long enough to find or create a user's slot;
/// all batch mutations happen under that slot's own mutex, so users never
/// contend with each other while operations for one user are serialized.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    slots: RwLock<HashMap<UserId, SlotHandle>>,
}

fn lock_slot(slot: &SlotHandle) -> MutexGuard<'_, UserSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's slot, creating it if needed.
    fn slot(&self, user: UserId) -> SlotHandle {
        if let Some(slot) = self.existing_slot(user) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(user).or_default())
    }

    fn existing_slot(&self, user: UserId) -> Option<SlotHandle> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .cloned()
    }

    /// Drops the user's slot when it holds nothing and nobody else references it.
    fn prune(&self, user: UserId) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let removable = slots
            .get(&user)
            .map(|slot| Arc::strong_count(slot) == 1 && lock_slot(slot).is_vacant())
            .unwrap_or(false);
        if removable {
            slots.remove(&user);
        }
    }

    /// Number of users currently holding a slot.
    pub fn tracked_users(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TaskRegistry for InMemoryRegistry {
    fn start_batch(&self, user: UserId) -> Batch {
        let slot = self.slot(user);
        let mut guard = lock_slot(&slot);

        let batch = Batch::new(user);
        if let Some(previous) = guard.open.replace(batch.clone()) {
            debug!(
                user = %user,
                batch_id = %previous.id,
                discarded_items = previous.len(),
                "Replaced open batch"
            );
        }
        batch
    }

    fn record_item(&self, user: UserId, item: ItemRef) -> RecordOutcome {
        let Some(slot) = self.existing_slot(user) else {
            return RecordOutcome::NoOpenBatch;
        };
        let mut guard = lock_slot(&slot);

        match guard.open.as_mut() {
            None => RecordOutcome::NoOpenBatch,
            Some(batch) if batch.contains(&item) => RecordOutcome::Duplicate,
            Some(batch) => {
                batch.items.push(item);
                RecordOutcome::Recorded {
                    position: batch.items.len(),
                }
            }
        }
    }

    fn cancel_batch(&self, user: UserId) -> bool {
        let Some(slot) = self.existing_slot(user) else {
            return false;
        };
        let existed = lock_slot(&slot).open.take().is_some();
        drop(slot);
        self.prune(user);
        existed
    }

    fn take_for_finalize(&self, user: UserId) -> Result<Batch, RegistryError> {
        let slot = self
            .existing_slot(user)
            .ok_or(RegistryError::NotStarted(user))?;
        let mut guard = lock_slot(&slot);

        match guard.open.as_ref() {
            None => return Err(RegistryError::NotStarted(user)),
            Some(batch) if batch.is_empty() => return Err(RegistryError::Empty(user)),
            Some(_) if guard.finalizing.is_some() => {
                return Err(RegistryError::FinalizeInProgress(user))
            }
            Some(_) => {}
        }

        let mut batch = guard.open.take().ok_or(RegistryError::NotStarted(user))?;
        batch.state = BatchState::Finalizing;
        guard.finalizing = Some(batch.clone());
        Ok(batch)
    }

    fn finish_finalize(&self, user: UserId, batch_id: Uuid) -> Option<Batch> {
        let slot = self.existing_slot(user)?;
        let finished = {
            let mut guard = lock_slot(&slot);
            match guard.finalizing.as_ref() {
                Some(batch) if batch.id == batch_id => guard.finalizing.take(),
                _ => None,
            }
        };
        drop(slot);
        self.prune(user);

        finished.map(|mut batch| {
            batch.state = BatchState::Closed;
            batch
        })
    }

    fn get(&self, user: UserId) -> Option<Batch> {
        let slot = self.existing_slot(user)?;
        let guard = lock_slot(&slot);
        guard.open.clone().or_else(|| guard.finalizing.clone())
    }

    fn stats(&self) -> RegistryStats {
        let slots: Vec<SlotHandle> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        slots.iter().fold(RegistryStats::default(), |mut stats, slot| {
            let guard = lock_slot(slot);
            if let Some(open) = guard.open.as_ref() {
                stats.open_batches += 1;
                stats.open_items += open.len();
            }
            if guard.finalizing.is_some() {
                stats.finalizing_batches += 1;
            }
            stats
        })
    }
}
