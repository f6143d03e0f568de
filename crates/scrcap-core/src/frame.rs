//! The delivered buffer and its release protocol (§3 "Frame buffer",
//! "Internal release payload", §4.1 "Release semantics").

use std::fmt;

use crate::format::{NegotiatedVideoFormat, RequestedAudioFormat};

/// Whether a delivered buffer carries video or audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Video,
    Audio,
}

/// How the pixel/sample data in a buffer's planes is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Cpu,
    GpuDmaBufFd,
    GpuD3d11Handle,
}

/// One plane of a delivered buffer.
///
/// Carries either a host pointer or a platform handle, never both; `stride`
/// and `offset` are always in bytes, `subresource_index` is only meaningful
/// for GPU D3D11 handles addressing an array/mip slice.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub ptr: PlanePtr,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub offset: usize,
    pub subresource_index: u32,
}

/// The data-bearing handle a plane carries.
#[derive(Debug, Clone, Copy)]
pub enum PlanePtr {
    /// A host-readable pointer, valid only while the buffer has not been
    /// released. `NonNull` is not used here because a `MemPtr` plane may
    /// legitimately be a zero-copy pointer into producer-owned memory whose
    /// lifetime this type does not itself enforce.
    Host(*const u8),
    /// A raw (already-duplicated, application-owned) file descriptor.
    Fd(std::os::raw::c_int),
    /// A raw platform handle value (e.g. an `HANDLE` on Windows), carried as
    /// an address-sized integer so this crate stays platform-independent.
    Handle(usize),
}

/// Header describing the video-specific fields of a delivered buffer.
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    pub format: NegotiatedVideoFormat,
}

/// Header describing the audio-specific fields of a delivered buffer.
#[derive(Debug, Clone, Copy)]
pub struct AudioInfo {
    pub format: RequestedAudioFormat,
    pub frame_count: usize,
}

/// A resource a backend attaches to a delivered buffer that must be
/// released exactly once.
///
/// This is the "two distinct resource kinds... not a union of raw pointers"
/// from the design notes: each backend defines its own payload type (owned
/// DMABUF fd duplicate, staging texture + context, shared texture
/// reference, ...) and releases it through this trait, rather than this
/// crate trying to enumerate every backend's resource shape itself.
pub trait FramePayload: fmt::Debug + Send {
    /// Release whatever native resource this payload owns. Called exactly
    /// once, by [`ReleasePayload::release`].
    fn release(self: Box<Self>);
}

/// The internal release payload delivered alongside every buffer (§3).
///
/// Invariant: every delivered buffer owns exactly one of these; every
/// non-`None` resource inside it is released exactly once when the
/// application calls `release_buffer`.
#[derive(Debug)]
pub struct ReleasePayload {
    pub handle_type: BufferType,
    /// The single native resource backing the whole buffer (e.g. a GPU
    /// texture reference), if any.
    pub native_resource: Option<Box<dyn FramePayload>>,
    /// Per-plane native resources, parallel to the buffer's planes, for
    /// backends that release each plane independently.
    pub plane_resources: Vec<Option<Box<dyn FramePayload>>>,
}

impl ReleasePayload {
    #[must_use]
    pub fn new(handle_type: BufferType) -> Self {
        Self {
            handle_type,
            native_resource: None,
            plane_resources: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_native_resource(mut self, resource: Box<dyn FramePayload>) -> Self {
        self.native_resource = Some(resource);
        self
    }

    #[must_use]
    pub fn with_plane_resources(mut self, resources: Vec<Option<Box<dyn FramePayload>>>) -> Self {
        self.plane_resources = resources;
        self
    }

    /// Release every resource this payload holds. Consumes `self` so a
    /// second release is a compile-time impossibility for owners that go
    /// through this method directly; the handle-based double-release guard
    /// used by the session lives in [`crate::session`].
    pub fn release(self) {
        if let Some(resource) = self.native_resource {
            resource.release();
        }
        for plane in self.plane_resources.into_iter().flatten() {
            plane.release();
        }
    }
}

/// A delivered frame buffer (§3 "Frame buffer").
///
/// Ownership passes to the application when this is handed to the
/// callback; the application must call [`crate::session::Session::release_buffer`]
/// with `handle` exactly once to hand it back.
#[derive(Debug)]
pub struct FrameBuffer {
    pub buffer_type: BufferType,
    pub content_type: ContentType,
    pub timestamp_us: u64,
    pub video_info: Option<VideoInfo>,
    pub audio_info: Option<AudioInfo>,
    pub planes: Vec<Plane>,
    pub total_size: usize,
    /// Opaque handle used only to look up and release this buffer's
    /// [`ReleasePayload`]; see [`crate::session::Session`].
    pub internal_handle: ReleaseHandle,
    /// Echoed back from whatever the application passed to `configure`.
    pub user_data: usize,
}

/// Opaque handle identifying a buffer's release payload.
///
/// A null handle (`ReleaseHandle::NULL`) is always a valid no-op argument to
/// `release_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReleaseHandle(pub(crate) usize);

impl ReleaseHandle {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CountingPayload(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl FramePayload for CountingPayload {
        fn release(self: Box<Self>) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn release_payload_releases_native_and_plane_resources_exactly_once() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let payload = ReleasePayload::new(BufferType::Video)
            .with_native_resource(Box::new(CountingPayload(counter.clone())))
            .with_plane_resources(vec![
                Some(Box::new(CountingPayload(counter.clone())) as Box<dyn FramePayload>),
                None,
                Some(Box::new(CountingPayload(counter.clone()))),
            ]);
        payload.release();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn null_handle_is_distinguishable() {
        assert!(ReleaseHandle::NULL.is_null());
        assert!(!ReleaseHandle(42).is_null());
    }
}
