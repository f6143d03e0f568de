//! # scrcap-core
//!
//! The shared delivery contract every `scrcap` capture backend satisfies:
//! the data model for capture targets and formats, the delivered-buffer and
//! release-payload types, the session lifecycle state machine, and the
//! traits a concrete backend (portal+PipeWire on Linux, DXGI or WGC on
//! Windows) implements.
//!
//! This crate does not talk to any platform API itself — see
//! [`scrcap-portal`](https://docs.rs/scrcap-portal),
//! [`scrcap-pipewire`](https://docs.rs/scrcap-pipewire),
//! [`scrcap-dxgi`](https://docs.rs/scrcap-dxgi), and
//! [`scrcap-wgc`](https://docs.rs/scrcap-wgc) for those.
//!
//! # Release protocol
//!
//! Every delivered [`frame::FrameBuffer`] carries a [`frame::ReleaseHandle`].
//! The application must call [`session::Session::release_buffer`] with that
//! handle exactly once; the handle is the sole rendezvous for cleanup, so a
//! backend that cannot reach the application (a fatal error mid-stream) does
//! not need to track outstanding buffers itself — the [`registry::PayloadRegistry`]
//! does.

pub mod backend;
pub mod device;
pub mod error;
pub mod format;
pub mod frame;
pub mod registry;
pub mod session;
pub mod target;

pub use backend::{CaptureBackend, FrameCallback};
pub use device::{DeviceDescriptor, DeviceEnumerator, LoopbackAudioSource, PortalPlaceholderEnumerator};
pub use error::{CaptureError, Result, ERROR_CODE_SUCCESS};
pub use format::{
    default_formats, FrameRate, NegotiatedVideoFormat, OutputPreference, PixelFormat, PlaneLayout,
    RequestedAudioFormat, RequestedVideoFormat, SampleFormat, DRM_FORMAT_MOD_INVALID, DRM_FORMAT_MOD_LINEAR,
};
pub use frame::{
    AudioInfo, BufferType, ContentType, FrameBuffer, FramePayload, Plane, PlanePtr, ReleaseHandle,
    ReleasePayload, VideoInfo,
};
pub use registry::PayloadRegistry;
pub use session::{Session, SessionLifecycle};
pub use target::{CaptureTarget, DxgiDisplayId, PortalSourceMask, WgcDeviceId, PORTAL_DISPLAY_PLACEHOLDER, PORTAL_WINDOW_PLACEHOLDER};
