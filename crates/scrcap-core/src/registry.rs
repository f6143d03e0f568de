//! The handle→payload rendezvous backing `release_buffer`.
//!
//! A backend registers a [`ReleasePayload`] the moment it builds a delivered
//! buffer, *before* invoking the application callback, and gets back the
//! [`ReleaseHandle`] it stamps into the buffer header. `release_buffer`
//! removes the entry and releases it. A handle that is not found — because
//! it was already released, or never registered — is a detectable
//! programmer error rather than undefined behavior (§8, invariant 1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{CaptureError, Result};
use crate::frame::{ReleaseHandle, ReleasePayload};

/// Thread-safe registry of outstanding release payloads.
///
/// Shared (via `Arc`) between a [`crate::session::Session`] and the backend
/// thread(s) that deliver buffers, so a payload registered on a PipeWire I/O
/// thread or a DXGI worker thread can be released later from whatever
/// thread the application calls `release_buffer` on.
#[derive(Debug, Default)]
pub struct PayloadRegistry {
    next_handle: AtomicUsize,
    payloads: Mutex<HashMap<usize, ReleasePayload>>,
}

impl PayloadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: AtomicUsize::new(1),
            payloads: Mutex::new(HashMap::new()),
        }
    }

    /// Register a payload and return the handle the delivered buffer should
    /// carry. Handles start at 1 so that 0 can remain [`ReleaseHandle::NULL`].
    pub fn register(&self, payload: ReleasePayload) -> ReleaseHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.payloads.lock().insert(id, payload);
        ReleaseHandle(id)
    }

    /// Release the payload behind `handle`.
    ///
    /// A null handle is a no-op returning `Ok(())`. A non-null handle that
    /// is not currently registered (already released, or never valid) is
    /// reported as [`CaptureError::InvalidArg`] rather than silently
    /// ignored or double-freed.
    pub fn release(&self, handle: ReleaseHandle) -> Result<()> {
        if handle.is_null() {
            return Ok(());
        }
        let payload = self
            .payloads
            .lock()
            .remove(&handle.0)
            .ok_or_else(|| CaptureError::invalid_arg("release called with an unknown or already-released handle"))?;
        payload.release();
        Ok(())
    }

    /// Number of payloads currently awaiting release. Exposed for leak
    /// assertions in tests and for diagnostics.
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.payloads.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BufferType;

    #[test]
    fn release_with_null_handle_is_a_no_op() {
        let registry = PayloadRegistry::new();
        assert!(registry.release(ReleaseHandle::NULL).is_ok());
    }

    #[test]
    fn register_then_release_clears_outstanding_count() {
        let registry = PayloadRegistry::new();
        let handle = registry.register(ReleasePayload::new(BufferType::Video));
        assert_eq!(registry.outstanding_count(), 1);
        assert!(registry.release(handle).is_ok());
        assert_eq!(registry.outstanding_count(), 0);
    }

    #[test]
    fn double_release_is_a_detectable_error_not_a_crash() {
        let registry = PayloadRegistry::new();
        let handle = registry.register(ReleasePayload::new(BufferType::Video));
        assert!(registry.release(handle).is_ok());
        assert!(registry.release(handle).is_err());
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let registry = PayloadRegistry::new();
        assert!(registry.release(ReleaseHandle(12345)).is_err());
    }
}
