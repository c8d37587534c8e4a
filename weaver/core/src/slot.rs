//! One key/value record with its failure counter and backoff timer.

use std::sync::Arc;

use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use weaver_spec::{throttle_seconds, ReadOutcome, SlotKey, SlotValue};
use zeroize::Zeroize;

use crate::journal::SlotRecord;
use crate::timer::{Clock, ElapsedTimer};

/// A single throttled secret slot.
#[derive(Debug, Clone)]
pub struct Slot {
    key: SlotKey,
    value: SlotValue,
    occupied: bool,
    failure_count: u32,
    timer: ElapsedTimer,
}

impl Slot {
    /// Empty slot with a stopped timer. No key opens it until one is written.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            key: SlotKey::default(),
            value: SlotValue::default(),
            occupied: false,
            failure_count: 0,
            timer: ElapsedTimer::new(clock),
        }
    }

    /// Rebuild a slot from its persisted record.
    pub fn from_record(record: &SlotRecord, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: SlotKey::new(record.key),
            value: SlotValue::new(record.value),
            occupied: record.occupied,
            failure_count: record.failure_count,
            timer: ElapsedTimer::restore(clock, record.timer),
        }
    }

    /// Snapshot for the journal.
    pub fn to_record(&self) -> SlotRecord {
        SlotRecord {
            key: *self.key.as_bytes(),
            value: *self.value.as_bytes(),
            occupied: self.occupied,
            failure_count: self.failure_count,
            timer: self.timer.state(),
        }
    }

    /// Replace key and value and clear any lockout.
    pub fn write(&mut self, key: &SlotKey, value: &SlotValue) {
        self.key = key.clone();
        self.value = value.clone();
        self.occupied = true;
        self.failure_count = 0;
        self.timer.stop();
    }

    /// Attempt to read the value with `key`.
    ///
    /// While the timer is running the key is not looked at. Otherwise the
    /// full key is compared in constant time, the counter is bumped or
    /// cleared, and the timer is re-armed from the backoff table for the new
    /// count. An empty slot matches no key, but still takes the same path.
    /// The returned payload is the same size on every path.
    pub fn read(&mut self, key: &SlotKey) -> ReadOutcome {
        let remaining = self.timer.remaining();
        if remaining != 0 {
            return ReadOutcome::backed_off(remaining);
        }

        let matched = self.key.ct_eq(key) & Choice::from(u8::from(self.occupied));
        let failed = self.failure_count.saturating_add(1);
        self.failure_count = u32::conditional_select(&failed, &0, matched);

        let throttle = throttle_seconds(self.failure_count);
        if throttle == 0 {
            self.timer.stop();
        } else {
            self.timer.start(throttle);
        }

        ReadOutcome::from_comparison(matched, &self.value, throttle)
    }

    /// Clear the value bytes only.
    pub fn erase_value(&mut self) {
        self.value.zeroize();
    }

    /// Clear key, value, counter and timer, leaving the slot empty.
    pub fn erase(&mut self) {
        self.key.zeroize();
        self.value.zeroize();
        self.occupied = false;
        self.failure_count = 0;
        self.timer.stop();
    }

    /// Consecutive failed reads since the last success, write or erase.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Seconds until the slot accepts another key comparison.
    pub fn remaining_backoff(&self) -> u32 {
        self.timer.remaining()
    }

    /// Whether the persisted part of two slots differs.
    pub(crate) fn throttle_state_differs(&self, other: &Slot) -> bool {
        self.failure_count != other.failure_count || self.timer.state() != other.timer.state()
    }
}
