//! Process-wide resource lock table.
//!
//! A lock is `(resource, holder, forced)`. Locks are keyed by [`ResourceId`],
//! so they are global across projects and follow a resource through renames
//! and moves. Absence of an entry means unlocked.
//!
//! Each resource gets its own slot (a mutex around `Option<Lock>`). The broker
//! runs check-then-mutate sequences inside [`LockTable::with_slot`], so two
//! callers can never both observe "unlocked" and both proceed.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vellum_types::{ResourceId, UserId, now_millis};

/// A held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub resource: ResourceId,
    pub holder: UserId,
    /// Taken by force over another user's lock.
    pub forced: bool,
    /// Unix millis.
    pub acquired_at: u64,
}

/// Result of a successful acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The resource was unlocked.
    Acquired,
    /// The caller already held the lock.
    AlreadyHeld,
    /// Another user's lock was replaced.
    Stolen { previous: UserId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("resource {resource} is locked by {holder}")]
    AlreadyLocked { resource: ResourceId, holder: UserId },
}

type Slot = Arc<Mutex<Option<Lock>>>;

/// Exclusive view of one resource's lock entry, handed out by
/// [`LockTable::with_slot`].
pub struct LockSlot<'a> {
    resource: ResourceId,
    current: &'a mut Option<Lock>,
}

impl LockSlot<'_> {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn holder(&self) -> Option<UserId> {
        self.current.map(|l| l.holder)
    }

    pub fn lock(&self) -> Option<Lock> {
        *self.current
    }

    /// Take the lock for `user`. Fails if another user holds it, unless
    /// `force` is set.
    pub fn acquire(&mut self, user: UserId, force: bool) -> Result<LockOutcome, LockError> {
        let existing = *self.current;
        match existing {
            Some(l) if l.holder == user => Ok(LockOutcome::AlreadyHeld),
            Some(l) if !force => Err(LockError::AlreadyLocked {
                resource: self.resource,
                holder: l.holder,
            }),
            _ => {
                *self.current = Some(Lock {
                    resource: self.resource,
                    holder: user,
                    forced: existing.is_some(),
                    acquired_at: now_millis(),
                });
                Ok(match existing {
                    Some(l) => LockOutcome::Stolen { previous: l.holder },
                    None => LockOutcome::Acquired,
                })
            }
        }
    }

    /// Drop the lock, returning it if there was one.
    pub fn release(&mut self) -> Option<Lock> {
        self.current.take()
    }
}

/// Map from resource to its current lock.
#[derive(Default)]
pub struct LockTable {
    slots: DashMap<ResourceId, Slot>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the resource's lock entry.
    ///
    /// `f` must not call back into this table: touching another resource's
    /// slot from inside `f` can deadlock against a caller doing the reverse.
    pub fn with_slot<R>(&self, resource: ResourceId, f: impl FnOnce(&mut LockSlot<'_>) -> R) -> R {
        let slot: Slot = Arc::clone(&self.slots.entry(resource).or_default());
        let out = {
            let mut guard = slot.lock();
            let mut view = LockSlot {
                resource,
                current: &mut guard,
            };
            f(&mut view)
        };
        drop(slot);
        self.prune(resource);
        out
    }

    /// Take the lock for `user`; see [`LockSlot::acquire`].
    pub fn acquire(
        &self,
        resource: ResourceId,
        user: UserId,
        force: bool,
    ) -> Result<LockOutcome, LockError> {
        self.with_slot(resource, |slot| slot.acquire(user, force))
    }

    /// Unlock regardless of holder. Idempotent.
    pub fn release(&self, resource: ResourceId) -> Option<Lock> {
        self.with_slot(resource, |slot| slot.release())
    }

    /// Unlock only if `user` is the holder. Returns whether a lock was removed.
    pub fn release_if_held(&self, resource: ResourceId, user: UserId) -> bool {
        self.with_slot(resource, |slot| {
            if slot.holder() == Some(user) {
                slot.release();
                true
            } else {
                false
            }
        })
    }

    pub fn holder_of(&self, resource: ResourceId) -> Option<UserId> {
        self.lock_of(resource).map(|l| l.holder)
    }

    pub fn lock_of(&self, resource: ResourceId) -> Option<Lock> {
        let slot = self.slots.get(&resource).map(|s| Arc::clone(s.value()))?;
        let lock = *slot.lock();
        lock
    }

    /// All current locks held by `user`.
    pub fn held_by(&self, user: UserId) -> Vec<Lock> {
        let slots: Vec<Slot> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();
        slots
            .iter()
            .filter_map(|s| *s.lock())
            .filter(|l| l.holder == user)
            .collect()
    }

    /// Number of locked resources.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();
        slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Drop an empty slot nobody else is holding. The shard write lock taken by
    // `remove_if` keeps new clones out while the count is checked.
    fn prune(&self, resource: ResourceId) {
        self.slots
            .remove_if(&resource, |_, s| Arc::strong_count(s) == 1 && s.lock().is_none());
    }
}
