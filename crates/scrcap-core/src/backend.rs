//! The trait every concrete capture backend (portal+PipeWire, DXGI, WGC)
//! implements, and the callback type the application supplies to
//! `start_capture`.

use std::sync::Arc;

use crate::error::{CaptureError, Result};
use crate::format::{NegotiatedVideoFormat, RequestedAudioFormat, RequestedVideoFormat};
use crate::frame::FrameBuffer;
use crate::registry::PayloadRegistry;
use crate::target::CaptureTarget;

/// The application-supplied frame callback.
///
/// Invoked by a backend-owned thread, never the thread that called
/// `start_capture` (§4.1 "Callback contract"). The application must not
/// re-enter the engine's API (configure/start/stop) from within the
/// callback; re-entrant calls are undefined territory the backends do not
/// guard against, per design note "Callback threading".
pub type FrameCallback = Arc<dyn Fn(FrameBuffer) + Send + Sync>;

/// A concrete screen-capture backend: the Linux portal+PipeWire pipeline,
/// the Windows DXGI duplication engine, or the Windows WGC session engine.
///
/// Implementors own all backend-private state (§3 "Session state" calls
/// this "backend-private state"); [`crate::session::Session`] only drives
/// the shared lifecycle (configured → running → configured) around it.
pub trait CaptureBackend {
    /// Store the request and pre-negotiate where the backend can do so
    /// cheaply (Windows backends can query producer dimensions
    /// immediately; the Linux backend cannot until the portal dialog
    /// completes).
    fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()>;

    /// Transition to running. May complete synchronously (Windows) or kick
    /// off asynchronous work whose completion drives the stream (Linux
    /// portal dialog). `registry` is where the backend registers every
    /// buffer's [`crate::frame::ReleasePayload`] before invoking `callback`.
    fn start(&mut self, registry: Arc<PayloadRegistry>, callback: FrameCallback) -> Result<()>;

    /// Transition back to configured: stop any worker, disconnect streams,
    /// close the portal session if held. Idempotent once the backend is
    /// already stopped.
    fn stop(&mut self) -> Result<()>;

    /// True iff at least one underlying producer stream is in the
    /// streaming state (§8 invariant 2).
    fn is_running(&self) -> bool;

    /// The format currently negotiated, or the last requested format if
    /// streaming has not yet produced a negotiation.
    fn negotiated_video_format(&self) -> NegotiatedVideoFormat;

    /// The most recent error observed on a backend-owned thread since the
    /// last successful `start`, if any (§4.2/§7: an application polls this
    /// after noticing `is_running()` has gone false on its own). Backends
    /// with no asynchronous failure source of their own return `None`.
    fn last_error(&self) -> Option<CaptureError>;
}

/// Lets [`crate::session::Session`] hold a type-erased backend
/// (`Session<Box<dyn CaptureBackend>>`), which the root facade needs since
/// the concrete backend compiled in depends on the target platform.
impl CaptureBackend for Box<dyn CaptureBackend> {
    fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()> {
        (**self).configure(target, video, audio)
    }

    fn start(&mut self, registry: Arc<PayloadRegistry>, callback: FrameCallback) -> Result<()> {
        (**self).start(registry, callback)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn negotiated_video_format(&self) -> NegotiatedVideoFormat {
        (**self).negotiated_video_format()
    }

    fn last_error(&self) -> Option<CaptureError> {
        (**self).last_error()
    }
}
