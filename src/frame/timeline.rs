//! Per-slot fence value tracking.

use crate::backend::{DeletionRecord, FenceHandle, GraphicsBackend};
use crate::error::{RenderError, RenderResult};
use crate::resources::DeferredDeletionQueue;

/// Default bound for fence and acquire waits: one second in nanoseconds.
pub const DEFAULT_TIMEOUT_NS: u64 = 1_000_000_000;

struct TimelineSlot {
    fence: FenceHandle,
    /// Value signaled when the slot's submitted work completes; `None`
    /// while no work is outstanding.
    pending: Option<u64>,
}

/// Monotonic fence values layered over per-slot backend fences.
///
/// Values are global across slots and strictly increasing; the first
/// submission observes value 1. A slot with no pending value is free
/// without touching the device, which is also the startup state (all
/// fences are created signaled).
pub struct FenceTimeline {
    slots: Vec<TimelineSlot>,
    next_value: u64,
}

impl FenceTimeline {
    pub fn new(backend: &mut dyn GraphicsBackend, slot_count: usize) -> RenderResult<Self> {
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(TimelineSlot {
                fence: backend.create_fence(true)?,
                pending: None,
            });
        }
        Ok(Self {
            slots,
            next_value: 1,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn check_slot(&self, slot: usize) {
        assert!(
            slot < self.slots.len(),
            "slot {slot} out of range for {} slots",
            self.slots.len()
        );
    }

    /// Fence handle backing the given slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.slot_count()`.
    pub fn fence(&self, slot: usize) -> FenceHandle {
        self.check_slot(slot);
        self.slots[slot].fence
    }

    /// The value that will be signaled for the slot's outstanding
    /// submission; 0 if the slot has nothing in flight.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.slot_count()`.
    pub fn signal_value_for_slot(&self, slot: usize) -> u64 {
        self.check_slot(slot);
        self.slots[slot].pending.unwrap_or(0)
    }

    /// Block until the slot's outstanding work completes, then reset the
    /// slot's fence so the next submission can signal it again.
    ///
    /// Returns the fence value that was reclaimed, or `None` when the slot
    /// was already free. Timeout surfaces as `DeviceTimeout`; the caller
    /// must treat it as device loss and not retry.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.slot_count()`.
    pub fn wait_until_slot_free(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        slot: usize,
        timeout_ns: u64,
    ) -> RenderResult<Option<u64>> {
        self.check_slot(slot);
        let Some(value) = self.slots[slot].pending else {
            // Nothing in flight: free by definition. Reset keeps the fence
            // unsignaled and ready for the next submission.
            backend.reset_fence(self.slots[slot].fence)?;
            return Ok(None);
        };
        log::trace!("slot {} blocked on fence value {}", slot, value);
        match backend.wait_fence(self.slots[slot].fence, timeout_ns) {
            Ok(()) => {}
            Err(RenderError::DeviceTimeout) => {
                log::error!(
                    "timed out after {} ns waiting for slot {} (fence value {})",
                    timeout_ns,
                    slot,
                    value
                );
                return Err(RenderError::DeviceTimeout);
            }
            Err(err) => return Err(err),
        }
        backend.reset_fence(self.slots[slot].fence)?;
        self.slots[slot].pending = None;
        Ok(Some(value))
    }

    /// Record a submission on the slot and return the fence value the
    /// device will signal for it.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.slot_count()`.
    pub fn mark_submitted(&mut self, slot: usize) -> u64 {
        self.check_slot(slot);
        let value = self.next_value;
        self.next_value += 1;
        self.slots[slot].pending = Some(value);
        value
    }

    /// Wait for every slot with outstanding work. Full-pipeline barrier
    /// used at shutdown and after bulk loads.
    pub fn flush_all(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        timeout_ns: u64,
    ) -> RenderResult<()> {
        for slot in 0..self.slots.len() {
            self.wait_until_slot_free(backend, slot, timeout_ns)?;
        }
        Ok(())
    }

    /// Hand every fence to the deletion queue, in slot order.
    pub fn destroy_into(&self, queue: &mut DeferredDeletionQueue) {
        for slot in &self.slots {
            queue.push(DeletionRecord::fence(slot.fence));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use std::time::{Duration, Instant};

    fn manual_backend() -> NullBackend {
        let backend = NullBackend::new();
        backend.set_auto_signal(false);
        backend
    }

    #[test]
    fn startup_slots_are_free() {
        let mut backend = manual_backend();
        let mut timeline = FenceTimeline::new(&mut backend, 3).unwrap();
        for slot in 0..3 {
            assert_eq!(timeline.signal_value_for_slot(slot), 0);
            let reclaimed = timeline
                .wait_until_slot_free(&mut backend, slot, DEFAULT_TIMEOUT_NS)
                .unwrap();
            assert_eq!(reclaimed, None);
        }
    }

    #[test]
    fn values_are_globally_monotonic() {
        let mut backend = manual_backend();
        let mut timeline = FenceTimeline::new(&mut backend, 2).unwrap();
        assert_eq!(timeline.mark_submitted(0), 1);
        assert_eq!(timeline.mark_submitted(1), 2);
        assert_eq!(timeline.signal_value_for_slot(0), 1);

        backend.signal_fence(timeline.fence(0));
        let reclaimed = timeline
            .wait_until_slot_free(&mut backend, 0, DEFAULT_TIMEOUT_NS)
            .unwrap();
        assert_eq!(reclaimed, Some(1));
        assert_eq!(timeline.mark_submitted(0), 3);
    }

    #[test]
    fn wait_returns_only_after_signal() {
        let mut backend = manual_backend();
        let mut timeline = FenceTimeline::new(&mut backend, 2).unwrap();
        assert_eq!(timeline.mark_submitted(0), 1);

        let fence = timeline.fence(0);
        let mut signaler = backend.clone();
        let start = Instant::now();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            signaler.signal_fence(fence);
        });

        let reclaimed = timeline
            .wait_until_slot_free(&mut backend, 0, DEFAULT_TIMEOUT_NS)
            .unwrap();
        handle.join().unwrap();

        assert_eq!(reclaimed, Some(1));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn unsignaled_wait_times_out_as_fatal() {
        let mut backend = manual_backend();
        let mut timeline = FenceTimeline::new(&mut backend, 2).unwrap();
        timeline.mark_submitted(1);
        let err = timeline
            .wait_until_slot_free(&mut backend, 1, 2_000_000)
            .unwrap_err();
        assert_eq!(err, RenderError::DeviceTimeout);
        assert!(err.is_fatal());
    }

    #[test]
    fn flush_all_reclaims_every_pending_slot() {
        let mut backend = manual_backend();
        let mut timeline = FenceTimeline::new(&mut backend, 2).unwrap();
        timeline.mark_submitted(0);
        timeline.mark_submitted(1);
        backend.signal_fence(timeline.fence(0));
        backend.signal_fence(timeline.fence(1));

        timeline
            .flush_all(&mut backend, DEFAULT_TIMEOUT_NS)
            .unwrap();
        assert_eq!(timeline.signal_value_for_slot(0), 0);
        assert_eq!(timeline.signal_value_for_slot(1), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_slot_panics() {
        let mut backend = manual_backend();
        let timeline = FenceTimeline::new(&mut backend, 2).unwrap();
        timeline.fence(2);
    }

    #[test]
    fn destroy_into_records_every_fence() {
        let mut backend = manual_backend();
        let timeline = FenceTimeline::new(&mut backend, 3).unwrap();
        let mut queue = DeferredDeletionQueue::new();
        timeline.destroy_into(&mut queue);
        assert_eq!(queue.len(), 3);
        queue.flush(&mut backend);
        assert_eq!(backend.destruction_log().len(), 3);
    }
}
