//! Deferred destruction of GPU resources.

use crate::backend::{DeletionRecord, GraphicsBackend};

/// Ordered list of deferred deletion records, drained strictly in
/// reverse-of-append order.
///
/// Append order mirrors creation order, so the LIFO flush destroys
/// dependents before the resources they depend on without any dependency
/// tracking. The queue never destroys anything on its own; callers flush at
/// points where the device is known to have finished with the recorded
/// resources (after a fence wait or an idle wait).
#[derive(Debug, Default)]
pub struct DeferredDeletionQueue {
    records: Vec<DeletionRecord>,
}

impl DeferredDeletionQueue {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a record. O(1), never fails.
    pub fn push(&mut self, record: DeletionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Destroy every record in reverse-append order, then clear the queue.
    ///
    /// Safe on an empty queue and idempotent across consecutive calls.
    /// Returns the number of records destroyed.
    pub fn flush(&mut self, backend: &mut dyn GraphicsBackend) -> usize {
        if self.records.is_empty() {
            return 0;
        }
        let count = self.records.len();
        log::debug!("flushing {} deferred deletion records", count);
        for record in self.records.drain(..).rev() {
            backend.destroy(record);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferDescriptor, BufferUsage, FenceHandle, NullBackend, ResourceKind};

    fn create_buffers(backend: &mut NullBackend, count: usize) -> Vec<DeletionRecord> {
        (0..count)
            .map(|_| {
                let buffer = backend
                    .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_DST))
                    .unwrap();
                DeletionRecord::buffer(&buffer)
            })
            .collect()
    }

    #[test]
    fn flush_runs_in_reverse_append_order() {
        let mut backend = NullBackend::new();
        let records = create_buffers(&mut backend, 5);
        let mut queue = DeferredDeletionQueue::new();
        for record in &records {
            queue.push(*record);
        }

        assert_eq!(queue.flush(&mut backend), 5);

        let destroyed: Vec<u64> = backend
            .destruction_log()
            .iter()
            .map(|r| r.handle.raw())
            .collect();
        let mut expected: Vec<u64> = records.iter().map(|r| r.handle.raw()).collect();
        expected.reverse();
        assert_eq!(destroyed, expected);
    }

    #[test]
    fn flush_is_idempotent_and_safe_on_empty() {
        let mut backend = NullBackend::new();
        let mut queue = DeferredDeletionQueue::new();

        // Empty queue: a no-op.
        assert_eq!(queue.flush(&mut backend), 0);

        for record in create_buffers(&mut backend, 3) {
            queue.push(record);
        }
        assert_eq!(queue.flush(&mut backend), 3);
        assert_eq!(queue.flush(&mut backend), 0);

        // Each record destroyed exactly once, nothing destroyed twice.
        assert_eq!(backend.destruction_log().len(), 3);
        assert_eq!(backend.unknown_destroy_count(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn mixed_kinds_respect_creation_order() {
        let mut backend = NullBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::UNIFORM))
            .unwrap();
        let fence = backend.create_fence(true).unwrap();
        let semaphore = backend.create_semaphore().unwrap();

        let mut queue = DeferredDeletionQueue::new();
        queue.push(DeletionRecord::buffer(&buffer));
        queue.push(DeletionRecord::fence(fence));
        queue.push(DeletionRecord::semaphore(semaphore));
        queue.flush(&mut backend);

        let kinds: Vec<ResourceKind> = backend.destruction_log().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Semaphore,
                ResourceKind::Fence,
                ResourceKind::Buffer
            ]
        );
    }

    #[test]
    fn unknown_handles_do_not_panic() {
        let mut backend = NullBackend::new();
        let mut queue = DeferredDeletionQueue::new();
        queue.push(DeletionRecord::fence(FenceHandle(999)));
        queue.flush(&mut backend);
        assert_eq!(backend.unknown_destroy_count(), 1);
    }
}
