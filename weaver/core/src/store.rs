//! Fixed bank of throttled slots.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use weaver_spec::{ReadOutcome, ReadStatus, SlotKey, SlotValue, Status, SLOT_COUNT};

use crate::journal::{Journal, JournalError, MemoryJournal, StoreImage};
use crate::slot::Slot;
use crate::timer::Clock;

/// Slot store error surface.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Slot id outside `0..SLOT_COUNT`.
    #[error("invalid slot id {0} (store has {} slots)", SLOT_COUNT)]
    InvalidSlotId(u32),
    /// The journal refused or failed a load or commit.
    #[error("journal failure: {0}")]
    Journal(#[from] JournalError),
}

impl StoreError {
    /// Dispatch-layer status, for errors that have one.
    pub fn status(&self) -> Option<Status> {
        match self {
            StoreError::InvalidSlotId(_) => Some(Status::InvalidSlotId),
            StoreError::Journal(_) => None,
        }
    }
}

/// The slot bank.
///
/// All operations take one lock over the whole bank; slots carry no
/// cross-slot invariants, but `erase_all` and the single-image journal are
/// simpler under a global lock.
pub struct SlotStore {
    slots: Mutex<Vec<Slot>>,
    journal: Box<dyn Journal>,
}

impl SlotStore {
    /// Open a store over `journal`, restoring the committed image if any.
    ///
    /// # Errors
    ///
    /// [`StoreError::Journal`] if the committed image cannot be read, fails
    /// verification, or does not hold exactly [`SLOT_COUNT`] slots.
    pub fn open(journal: impl Journal + 'static, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let slots = match journal.load()? {
            Some(image) if image.slots.len() != SLOT_COUNT => {
                error!(found = image.slots.len(), "restored image has wrong slot count");
                return Err(JournalError::SlotCount {
                    expected: SLOT_COUNT,
                    found: image.slots.len(),
                }
                .into());
            }
            Some(image) => {
                info!(slots = image.slots.len(), "restored slot store");
                image
                    .slots
                    .iter()
                    .map(|record| Slot::from_record(record, clock.clone()))
                    .collect()
            }
            None => {
                info!(slots = SLOT_COUNT, "initialised empty slot store");
                (0..SLOT_COUNT).map(|_| Slot::new(clock.clone())).collect()
            }
        };
        Ok(Self {
            slots: Mutex::new(slots),
            journal: Box::new(journal),
        })
    }

    /// Fresh store whose journal lives in memory.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let slots = (0..SLOT_COUNT).map(|_| Slot::new(clock.clone())).collect();
        Self {
            slots: Mutex::new(slots),
            journal: Box::new(MemoryJournal::new()),
        }
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        SLOT_COUNT
    }

    /// Check `slot_id` and return it as an index.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidSlotId`] when `slot_id >= SLOT_COUNT`.
    pub fn validate_slot_id(&self, slot_id: u32) -> Result<usize, StoreError> {
        usize::try_from(slot_id)
            .ok()
            .filter(|index| *index < SLOT_COUNT)
            .ok_or(StoreError::InvalidSlotId(slot_id))
    }

    /// Replace a slot's key and value and clear its lockout, atomically.
    ///
    /// # Errors
    ///
    /// Invalid id, or a journal failure (the slot is then unchanged).
    pub fn write(&self, slot_id: u32, key: &SlotKey, value: &SlotValue) -> Result<(), StoreError> {
        self.transact(slot_id, |slot| slot.write(key, value))?;
        debug!(slot = slot_id, "slot written");
        Ok(())
    }

    /// Read a slot with `key`.
    ///
    /// Counter and timer changes are committed before the outcome is
    /// returned. If that commit fails the penalty still applies in memory
    /// and no outcome is revealed.
    ///
    /// # Errors
    ///
    /// Invalid id, or a journal failure.
    pub fn read(&self, slot_id: u32, key: &SlotKey) -> Result<ReadOutcome, StoreError> {
        let index = self.validate_slot_id(slot_id)?;
        let mut slots = self.slots.lock();

        let mut staged = slots[index].clone();
        let outcome = staged.read(key);

        if staged.throttle_state_differs(&slots[index]) {
            let mut image = snapshot(&slots);
            image.slots[index] = staged.to_record();
            let committed = self.journal.commit(&image);
            slots[index] = staged;
            if let Err(e) = committed {
                error!(slot = slot_id, error = %e, "failed to commit read penalty");
                return Err(e.into());
            }
        }

        match outcome.status() {
            ReadStatus::Success => debug!(slot = slot_id, "slot read"),
            ReadStatus::WrongKey => debug!(
                slot = slot_id,
                failures = slots[index].failure_count(),
                "wrong key"
            ),
            ReadStatus::BackedOff => warn!(
                slot = slot_id,
                failures = slots[index].failure_count(),
                remaining = outcome.remaining_backoff().unwrap_or(0),
                "slot throttled"
            ),
        }
        Ok(outcome)
    }

    /// Clear a slot's value bytes, leaving key and throttle state alone.
    ///
    /// Not transactional: the in-memory clear stands even if persisting it
    /// fails.
    ///
    /// # Errors
    ///
    /// Invalid id, or a journal failure.
    pub fn erase_value(&self, slot_id: u32) -> Result<(), StoreError> {
        let index = self.validate_slot_id(slot_id)?;
        let mut slots = self.slots.lock();
        slots[index].erase_value();
        self.journal.commit(&snapshot(&slots)).map_err(|e| {
            warn!(slot = slot_id, error = %e, "value cleared in memory only");
            StoreError::from(e)
        })?;
        debug!(slot = slot_id, "slot value erased");
        Ok(())
    }

    /// Reset one slot to its zeroed state, atomically.
    ///
    /// # Errors
    ///
    /// Invalid id, or a journal failure (the slot is then unchanged).
    pub fn erase(&self, slot_id: u32) -> Result<(), StoreError> {
        self.transact(slot_id, Slot::erase)?;
        debug!(slot = slot_id, "slot erased");
        Ok(())
    }

    /// Reset every slot in one atomic commit.
    ///
    /// # Errors
    ///
    /// A journal failure, in which case no slot is changed.
    pub fn erase_all(&self) -> Result<(), StoreError> {
        let mut slots = self.slots.lock();
        let mut staged = slots.clone();
        staged.iter_mut().for_each(Slot::erase);
        self.journal.commit(&snapshot(&staged)).map_err(|e| {
            error!(error = %e, "erase_all aborted");
            StoreError::from(e)
        })?;
        *slots = staged;
        info!(slots = SLOT_COUNT, "all slots erased");
        Ok(())
    }

    /// Consecutive failed reads recorded for a slot.
    ///
    /// # Errors
    ///
    /// Invalid id.
    pub fn failure_count(&self, slot_id: u32) -> Result<u32, StoreError> {
        let index = self.validate_slot_id(slot_id)?;
        Ok(self.slots.lock()[index].failure_count())
    }

    /// Seconds before a slot will compare keys again.
    ///
    /// # Errors
    ///
    /// Invalid id.
    pub fn remaining_backoff(&self, slot_id: u32) -> Result<u32, StoreError> {
        let index = self.validate_slot_id(slot_id)?;
        Ok(self.slots.lock()[index].remaining_backoff())
    }

    fn transact<T>(&self, slot_id: u32, op: impl FnOnce(&mut Slot) -> T) -> Result<T, StoreError> {
        let index = self.validate_slot_id(slot_id)?;
        let mut slots = self.slots.lock();

        let mut staged = slots[index].clone();
        let result = op(&mut staged);

        let mut image = snapshot(&slots);
        image.slots[index] = staged.to_record();
        self.journal.commit(&image).map_err(|e| {
            error!(slot = slot_id, error = %e, "slot transaction aborted");
            StoreError::from(e)
        })?;

        slots[index] = staged;
        Ok(result)
    }
}

fn snapshot(slots: &[Slot]) -> StoreImage {
    StoreImage {
        slots: slots.iter().map(Slot::to_record).collect(),
    }
}

impl fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStore")
            .field("slot_count", &SLOT_COUNT)
            .finish_non_exhaustive()
    }
}
