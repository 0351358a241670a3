//! Batched staging uploads to device-local buffers.

use crate::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, DeletionRecord, GpuBuffer, GraphicsBackend,
    QueueKind, RecorderHandle,
};
use crate::error::{RenderError, RenderResult};

use super::deletion::DeferredDeletionQueue;

struct StagedUpload {
    staging: GpuBuffer,
    destination: BufferHandle,
    byte_size: u64,
}

/// Collects host-to-device copies and replays them in one transfer-queue
/// submission.
///
/// Each [`upload`](Self::upload) allocates the device-local destination,
/// writes the bytes into a fresh host-visible staging buffer, and records a
/// copy between the two; nothing reaches the device until
/// [`flush_pending_uploads`](Self::flush_pending_uploads). Staging buffers
/// are destroyed as soon as the transfer queue has drained, through a
/// deletion queue private to this uploader.
pub struct StagedUploadBuffer {
    recorder: RecorderHandle,
    pending: Vec<StagedUpload>,
    upload_queue: DeferredDeletionQueue,
    recording: bool,
}

impl StagedUploadBuffer {
    pub fn new(backend: &mut dyn GraphicsBackend) -> RenderResult<Self> {
        let recorder = backend.create_command_recorder(QueueKind::Transfer)?;
        Ok(Self {
            recorder,
            pending: Vec::new(),
            upload_queue: DeferredDeletionQueue::new(),
            recording: false,
        })
    }

    /// Allocate the buffer `descriptor` describes and stage `data` for copy
    /// into it at offset 0.
    ///
    /// The returned buffer is a valid handle immediately; its contents
    /// become defined once [`flush_pending_uploads`](Self::flush_pending_uploads)
    /// returns. A zero-length upload allocates the destination and stages
    /// nothing.
    pub fn upload(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> RenderResult<GpuBuffer> {
        if data.len() as u64 > descriptor.size {
            return Err(RenderError::InvalidParameter(format!(
                "{} upload bytes do not fit a {} byte destination",
                data.len(),
                descriptor.size
            )));
        }
        let destination = backend.create_buffer(descriptor)?;
        if data.is_empty() {
            log::trace!("zero-length upload to {:?}", destination.handle);
            return Ok(destination);
        }
        // A failed staging allocation must not leak the destination.
        let staging = match backend.create_buffer(
            &BufferDescriptor::new(
                data.len() as u64,
                BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
            )
            .with_label(format!("staging {} bytes", data.len())),
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy(DeletionRecord::buffer(&destination));
                return Err(err);
            }
        };
        backend.write_buffer(staging.handle, 0, data)?;
        if !self.recording {
            backend.begin_recording(self.recorder)?;
            self.recording = true;
        }
        backend.record_copy_buffer(
            self.recorder,
            staging.handle,
            destination.handle,
            data.len() as u64,
        )?;
        log::trace!(
            "staged {} bytes for {:?}",
            data.len(),
            destination.handle
        );
        self.pending.push(StagedUpload {
            staging,
            destination: destination.handle,
            byte_size: data.len() as u64,
        });
        Ok(destination)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Submit every staged copy on the transfer queue, wait for the queue
    /// to drain, then free all staging buffers. No-op when nothing is
    /// staged. Returns the number of uploads flushed.
    pub fn flush_pending_uploads(
        &mut self,
        backend: &mut dyn GraphicsBackend,
    ) -> RenderResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        backend.end_recording(self.recorder)?;
        self.recording = false;
        backend.submit(QueueKind::Transfer, self.recorder, &[], &[], None)?;
        backend.queue_wait_idle(QueueKind::Transfer)?;

        let count = self.pending.len();
        let total: u64 = self.pending.iter().map(|u| u.byte_size).sum();
        for upload in self.pending.drain(..) {
            log::trace!(
                "upload to {:?} complete ({} bytes)",
                upload.destination,
                upload.byte_size
            );
            self.upload_queue.push(DeletionRecord::buffer(&upload.staging));
        }
        self.upload_queue.flush(backend);
        backend.reset_recorder(self.recorder)?;
        log::debug!("flushed {} staged uploads ({} bytes)", count, total);
        Ok(count)
    }

    /// Hand all owned resources to the given deletion queue. Staging
    /// buffers still pending are included; callers flush before shutdown,
    /// so in practice only the recorder remains.
    pub fn destroy_into(&self, queue: &mut DeferredDeletionQueue) {
        queue.push(DeletionRecord::recorder(self.recorder));
        for upload in &self.pending {
            queue.push(DeletionRecord::buffer(&upload.staging));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use rstest::rstest;

    fn readable_destination(size: u64) -> BufferDescriptor {
        BufferDescriptor::new(size, BufferUsage::COPY_DST | BufferUsage::MAP_READ)
            .with_label("upload destination")
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4096)]
    fn uploaded_bytes_round_trip(#[case] len: usize) {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();

        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let destination = uploader
            .upload(&mut backend, &readable_destination(len as u64), &data)
            .unwrap();
        uploader.flush_pending_uploads(&mut backend).unwrap();

        let read = backend
            .read_buffer(destination.handle, 0, len as u64)
            .unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn uploads_batch_into_one_transfer_submission() {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();

        let mut destinations = Vec::new();
        for i in 0..3u8 {
            destinations.push(
                uploader
                    .upload(&mut backend, &readable_destination(16), &[i; 16])
                    .unwrap(),
            );
        }
        assert_eq!(uploader.pending_count(), 3);
        assert_eq!(backend.submit_count(QueueKind::Transfer), 0);

        let flushed = uploader.flush_pending_uploads(&mut backend).unwrap();
        assert_eq!(flushed, 3);
        assert_eq!(backend.submit_count(QueueKind::Transfer), 1);
        assert_eq!(backend.copy_count(), 3);
        for (i, destination) in destinations.iter().enumerate() {
            assert_eq!(
                backend.read_buffer(destination.handle, 0, 16).unwrap(),
                vec![i as u8; 16]
            );
        }
    }

    #[test]
    fn staging_buffers_are_freed_after_flush() {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();
        assert_eq!(backend.live_buffer_count(), 0);

        let destination = uploader
            .upload(&mut backend, &readable_destination(8), &[7u8; 8])
            .unwrap();
        assert_eq!(backend.live_buffer_count(), 2);

        uploader.flush_pending_uploads(&mut backend).unwrap();
        assert_eq!(backend.live_buffer_count(), 1);
        assert_eq!(uploader.pending_count(), 0);
        assert_eq!(backend.read_buffer(destination.handle, 0, 8).unwrap(), vec![7u8; 8]);
    }

    #[test]
    fn zero_length_upload_still_produces_the_destination() {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();

        let destination = uploader
            .upload(&mut backend, &readable_destination(0), &[])
            .unwrap();
        assert_eq!(uploader.pending_count(), 0);
        assert_eq!(backend.live_buffer_count(), 1);
        assert!(backend.read_buffer(destination.handle, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn empty_flush_submits_nothing() {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();
        assert_eq!(uploader.flush_pending_uploads(&mut backend).unwrap(), 0);
        assert_eq!(backend.submit_count(QueueKind::Transfer), 0);
    }

    #[test]
    fn oversized_data_is_rejected_before_any_allocation() {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();

        let err = uploader
            .upload(&mut backend, &readable_destination(4), &[0u8; 8])
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
        assert_eq!(backend.live_buffer_count(), 0);
        assert_eq!(uploader.pending_count(), 0);
    }

    #[test]
    fn failed_allocation_leaves_nothing_pending() {
        let mut backend = NullBackend::new();
        let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();

        backend.inject_create_buffer_error(RenderError::OutOfDeviceMemory);
        let err = uploader
            .upload(&mut backend, &readable_destination(8), &[1u8; 8])
            .unwrap_err();
        assert_eq!(err, RenderError::OutOfDeviceMemory);
        assert!(!err.is_fatal());
        assert_eq!(uploader.pending_count(), 0);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
