//! Fixed ring of per-frame GPU contexts.

use crate::backend::{
    BufferDescriptor, BufferUsage, DeletionRecord, FenceHandle, GpuBuffer, GraphicsBackend,
    QueueKind, RecorderHandle, SemaphoreHandle,
};
use crate::error::{RenderError, RenderResult};
use crate::resources::DeferredDeletionQueue;

use super::timeline::FenceTimeline;

/// One rotating set of per-frame resources.
///
/// The recorder must not be reset while the slot's fence value is
/// unobserved; [`FrameSlotRing::begin_frame`] enforces that through the
/// fence timeline.
pub struct FrameSlot {
    pub index: usize,
    pub recorder: RecorderHandle,
    /// Signaled by the presentation layer when the acquired image is ready
    /// to be written; waited on by the graphics submission.
    pub image_acquired: SemaphoreHandle,
    /// Signaled by the graphics submission; waited on by present.
    pub render_complete: SemaphoreHandle,
    /// Host-visible buffer receiving this frame's scene uniforms.
    pub uniform_buffer: GpuBuffer,
}

/// What `begin_frame` observed while claiming a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBeginInfo {
    pub slot_index: usize,
    /// Fence value the wait reclaimed; `None` when the slot was already
    /// free (first use of the slot, or a frame that never submitted).
    pub reclaimed_value: Option<u64>,
}

/// Owns exactly N frame slots and hands out the active one.
///
/// N is fixed at construction and must be at least 2 so the CPU can record
/// one frame while the GPU drains another; the default configuration uses
/// 2, bounding CPU/GPU skew at one frame.
pub struct FrameSlotRing {
    slots: Vec<FrameSlot>,
    timeline: FenceTimeline,
}

impl FrameSlotRing {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        slot_count: usize,
        uniform_size: u64,
    ) -> RenderResult<Self> {
        if slot_count < 2 {
            return Err(RenderError::InvalidParameter(format!(
                "frame slot ring needs at least 2 slots, got {}",
                slot_count
            )));
        }
        let timeline = FenceTimeline::new(backend, slot_count)?;
        let mut slots = Vec::with_capacity(slot_count);
        for index in 0..slot_count {
            let recorder = backend.create_command_recorder(QueueKind::Graphics)?;
            let image_acquired = backend.create_semaphore()?;
            let render_complete = backend.create_semaphore()?;
            let uniform_buffer = backend.create_buffer(
                &BufferDescriptor::new(
                    uniform_size,
                    BufferUsage::UNIFORM | BufferUsage::MAP_WRITE,
                )
                .with_label(format!("frame {} uniforms", index)),
            )?;
            slots.push(FrameSlot {
                index,
                recorder,
                image_acquired,
                render_complete,
                uniform_buffer,
            });
        }
        log::debug!("frame slot ring ready with {} slots", slot_count);
        Ok(Self { slots, timeline })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Pure slot lookup: `frame_number % N`.
    pub fn current_slot(&self, frame_number: u64) -> &FrameSlot {
        &self.slots[self.slot_index(frame_number)]
    }

    pub fn slot_index(&self, frame_number: u64) -> usize {
        (frame_number % self.slots.len() as u64) as usize
    }

    /// Claim the frame's slot: wait until its previous use is observed
    /// complete, then reset its command recorder for new recording.
    /// Must be called exactly once per frame, before any recording.
    pub fn begin_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame_number: u64,
        timeout_ns: u64,
    ) -> RenderResult<FrameBeginInfo> {
        let slot_index = self.slot_index(frame_number);
        let reclaimed_value = self
            .timeline
            .wait_until_slot_free(backend, slot_index, timeout_ns)?;
        backend.reset_recorder(self.slots[slot_index].recorder)?;
        log::trace!(
            "frame {} begun on slot {} (reclaimed {:?})",
            frame_number,
            slot_index,
            reclaimed_value
        );
        Ok(FrameBeginInfo {
            slot_index,
            reclaimed_value,
        })
    }

    /// Record the frame's submission on its slot; returns the fence value
    /// the device will signal.
    pub fn mark_submitted(&mut self, frame_number: u64) -> u64 {
        let slot_index = self.slot_index(frame_number);
        self.timeline.mark_submitted(slot_index)
    }

    /// Fence to attach to the frame's graphics submission.
    pub fn slot_fence(&self, frame_number: u64) -> FenceHandle {
        self.timeline.fence(self.slot_index(frame_number))
    }

    pub fn timeline(&self) -> &FenceTimeline {
        &self.timeline
    }

    /// Wait until no slot has outstanding work.
    pub fn flush_all(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        timeout_ns: u64,
    ) -> RenderResult<()> {
        self.timeline.flush_all(backend, timeout_ns)
    }

    /// Hand every owned resource to the deletion queue in creation order:
    /// timeline fences first, then each slot's recorder, semaphores, and
    /// uniform buffer.
    pub fn destroy_into(&self, queue: &mut DeferredDeletionQueue) {
        self.timeline.destroy_into(queue);
        for slot in &self.slots {
            queue.push(DeletionRecord::recorder(slot.recorder));
            queue.push(DeletionRecord::semaphore(slot.image_acquired));
            queue.push(DeletionRecord::semaphore(slot.render_complete));
            queue.push(DeletionRecord::buffer(&slot.uniform_buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::frame::DEFAULT_TIMEOUT_NS;
    use rstest::rstest;

    fn create_ring(backend: &mut NullBackend, slot_count: usize) -> FrameSlotRing {
        FrameSlotRing::new(backend, slot_count, 64).unwrap()
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    fn slot_index_is_periodic(#[case] slot_count: usize) {
        let mut backend = NullBackend::new();
        let ring = create_ring(&mut backend, slot_count);
        for frame in 0u64..24 {
            assert_eq!(
                ring.slot_index(frame),
                (frame as usize) % slot_count,
                "frame {}",
                frame
            );
            assert_eq!(ring.current_slot(frame).index, ring.slot_index(frame));
        }
        // Same slot every N frames.
        assert_eq!(ring.slot_index(0), ring.slot_index(slot_count as u64));
        assert_eq!(ring.slot_index(0), ring.slot_index(2 * slot_count as u64));
    }

    #[test]
    fn fewer_than_two_slots_is_rejected() {
        let mut backend = NullBackend::new();
        assert!(matches!(
            FrameSlotRing::new(&mut backend, 1, 64),
            Err(RenderError::InvalidParameter(_))
        ));
        assert!(matches!(
            FrameSlotRing::new(&mut backend, 0, 64),
            Err(RenderError::InvalidParameter(_))
        ));
    }

    #[test]
    fn begin_frame_resets_the_slot_recorder() {
        let mut backend = NullBackend::new();
        let mut ring = create_ring(&mut backend, 2);
        let recorder = ring.current_slot(0).recorder;
        assert_eq!(backend.recorder_reset_count(recorder), 0);
        ring.begin_frame(&mut backend, 0, DEFAULT_TIMEOUT_NS).unwrap();
        assert_eq!(backend.recorder_reset_count(recorder), 1);
    }

    #[test]
    fn two_slot_ring_reclaims_in_submission_order() {
        let mut backend = NullBackend::new();
        backend.set_auto_signal(false);
        let mut ring = create_ring(&mut backend, 2);

        let mut observed = Vec::new();
        for frame in 0u64..5 {
            // The device completes the slot's previous submission before
            // the ring is allowed to reuse it.
            let pending = ring.timeline().signal_value_for_slot(ring.slot_index(frame));
            if pending != 0 {
                backend.signal_fence(ring.slot_fence(frame));
            }
            let info = ring
                .begin_frame(&mut backend, frame, DEFAULT_TIMEOUT_NS)
                .unwrap();
            ring.mark_submitted(frame);
            observed.push((info.slot_index, info.reclaimed_value));
        }

        assert_eq!(
            observed,
            vec![
                (0, None),
                (1, None),
                (0, Some(1)),
                (1, Some(2)),
                (0, Some(3)),
            ]
        );
    }

    #[test]
    fn destroy_into_covers_every_slot_resource() {
        let mut backend = NullBackend::new();
        let ring = create_ring(&mut backend, 2);
        let mut queue = DeferredDeletionQueue::new();
        ring.destroy_into(&mut queue);
        // 2 fences + 2 * (recorder + 2 semaphores + uniform buffer).
        assert_eq!(queue.len(), 2 + 2 * 4);
        queue.flush(&mut backend);
        assert_eq!(backend.unknown_destroy_count(), 0);
        assert_eq!(backend.live_resource_count(), 0);
    }
}
