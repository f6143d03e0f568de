//! The session lifecycle state machine shared by every backend (§3
//! "Session state"): created uninitialized → configured → running →
//! configured → destroyed.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::{CaptureBackend, FrameCallback};
use crate::error::{CaptureError, Result};
use crate::format::{NegotiatedVideoFormat, RequestedAudioFormat, RequestedVideoFormat};
use crate::frame::ReleaseHandle;
use crate::registry::PayloadRegistry;
use crate::target::CaptureTarget;

/// Where a session sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Created,
    Configured,
    Running,
}

/// A capture session wrapping one concrete backend.
///
/// Generic over the backend so the engine facade can monomorphize per
/// platform instead of paying for a trait object when only one backend is
/// compiled in; the facade itself still type-erases behind
/// [`crate::backend::CaptureBackend`] when more than one backend is
/// available (see the root crate).
pub struct Session<B: CaptureBackend> {
    backend: B,
    lifecycle: SessionLifecycle,
    target: Option<CaptureTarget>,
    requested_video: RequestedVideoFormat,
    requested_audio: Option<RequestedAudioFormat>,
    registry: Arc<PayloadRegistry>,
    last_error: Option<CaptureError>,
}

impl<B: CaptureBackend> Session<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            lifecycle: SessionLifecycle::Created,
            target: None,
            requested_video: RequestedVideoFormat::default(),
            requested_audio: None,
            registry: Arc::new(PayloadRegistry::new()),
            last_error: None,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> SessionLifecycle {
        self.lifecycle
    }

    /// The most recent error, merging one the backend observed
    /// asynchronously (fresher, since it may postdate the last `configure`/
    /// `start_capture` call this session made) with the one recorded by
    /// this session's own last failed call.
    #[must_use]
    pub fn last_error(&self) -> Option<CaptureError> {
        self.backend.last_error().or_else(|| self.last_error.clone())
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PayloadRegistry> {
        &self.registry
    }

    /// Configure the session with an explicit target and formats.
    #[instrument(skip(self, video, audio), fields(target = ?target))]
    pub fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()> {
        if self.lifecycle == SessionLifecycle::Running {
            return Err(CaptureError::AlreadyRunning);
        }
        let result = self.backend.configure(target.clone(), video, audio);
        match &result {
            Ok(()) => {
                self.target = Some(target);
                self.requested_video = video;
                self.requested_audio = audio;
                self.lifecycle = SessionLifecycle::Configured;
                info!("session configured");
            }
            Err(err) => {
                warn!(error = %err, "configure failed");
                self.last_error = Some(err.clone());
            }
        }
        result
    }

    /// Transition to running. Forbidden unless the session has been
    /// configured and is not already running.
    #[instrument(skip(self, callback))]
    pub fn start_capture(&mut self, callback: FrameCallback) -> Result<()> {
        match self.lifecycle {
            SessionLifecycle::Created => return Err(CaptureError::NotInitialized),
            SessionLifecycle::Running => return Err(CaptureError::AlreadyRunning),
            SessionLifecycle::Configured => {}
        }
        let result = self.backend.start(self.registry.clone(), callback);
        match &result {
            Ok(()) => {
                self.lifecycle = SessionLifecycle::Running;
                info!("capture started");
            }
            Err(err) => {
                warn!(error = %err, "start_capture failed");
                self.last_error = Some(err.clone());
            }
        }
        result
    }

    /// Transition back to configured. Idempotent: calling this when the
    /// session is not running returns success (§8 round-trip property).
    #[instrument(skip(self))]
    pub fn stop_capture(&mut self) -> Result<()> {
        if self.lifecycle != SessionLifecycle::Running {
            return Ok(());
        }
        self.backend.stop()?;
        self.lifecycle = SessionLifecycle::Configured;
        info!("capture stopped");
        Ok(())
    }

    /// Release the resources attached to a delivered buffer. A null handle
    /// is a no-op (§4.1 "Release semantics").
    pub fn release_buffer(&self, handle: ReleaseHandle) -> Result<()> {
        self.registry.release(handle)
    }

    /// True iff the backend reports at least one streaming producer (§8
    /// invariant 2) — intentionally not just "lifecycle == Running", since
    /// the backend may have quietly stopped delivering after a fatal error
    /// without the application having called `stop_capture` yet.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle == SessionLifecycle::Running && self.backend.is_running()
    }

    #[must_use]
    pub fn get_configured_video_formats(&self) -> NegotiatedVideoFormat {
        self.backend.negotiated_video_format()
    }

    #[must_use]
    pub fn requested_video_format(&self) -> RequestedVideoFormat {
        self.requested_video
    }

    #[must_use]
    pub fn requested_audio_format(&self) -> Option<RequestedAudioFormat> {
        self.requested_audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeBackend {
        configured: bool,
        running: bool,
        fail_configure: bool,
        negotiated: NegotiatedVideoFormat,
    }

    impl CaptureBackend for FakeBackend {
        fn configure(
            &mut self,
            _target: CaptureTarget,
            _video: RequestedVideoFormat,
            _audio: Option<RequestedAudioFormat>,
        ) -> Result<()> {
            if self.fail_configure {
                return Err(CaptureError::invalid_arg("boom"));
            }
            self.configured = true;
            Ok(())
        }

        fn start(&mut self, _registry: Arc<PayloadRegistry>, _callback: FrameCallback) -> Result<()> {
            self.running = true;
            self.negotiated.pixel_format = PixelFormat::Bgra32;
            self.negotiated.width = 1920;
            self.negotiated.height = 1080;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }

        fn negotiated_video_format(&self) -> NegotiatedVideoFormat {
            self.negotiated
        }

        fn last_error(&self) -> Option<CaptureError> {
            None
        }
    }

    fn target() -> CaptureTarget {
        CaptureTarget::Display("portal_display".into())
    }

    #[test]
    fn full_lifecycle_transitions() {
        let mut session = Session::new(FakeBackend::default());
        assert_eq!(session.lifecycle(), SessionLifecycle::Created);

        assert!(session
            .start_capture(Arc::new(|_| {}))
            .is_err());

        session
            .configure(target(), RequestedVideoFormat::default(), None)
            .unwrap();
        assert_eq!(session.lifecycle(), SessionLifecycle::Configured);

        let called = Arc::new(AtomicBool::new(false));
        let called2 = called.clone();
        session
            .start_capture(Arc::new(move |_| {
                called2.store(true, Ordering::SeqCst);
            }))
            .unwrap();
        assert!(session.is_running());

        let fmt = session.get_configured_video_formats();
        assert_eq!(fmt.width, 1920);
        assert_eq!(fmt.height, 1080);

        assert!(session.start_capture(Arc::new(|_| {})).is_err());

        session.stop_capture().unwrap();
        assert!(!session.is_running());
        assert_eq!(session.lifecycle(), SessionLifecycle::Configured);

        // stop when not running is a no-op success (round-trip property).
        session.stop_capture().unwrap();
    }

    #[test]
    fn configure_failure_does_not_change_lifecycle() {
        let mut session = Session::new(FakeBackend {
            fail_configure: true,
            ..Default::default()
        });
        assert!(session
            .configure(target(), RequestedVideoFormat::default(), None)
            .is_err());
        assert_eq!(session.lifecycle(), SessionLifecycle::Created);
        assert!(matches!(session.last_error(), Some(CaptureError::InvalidArg(_))));
    }

    #[test]
    fn configure_while_running_is_rejected() {
        let mut session = Session::new(FakeBackend::default());
        session
            .configure(target(), RequestedVideoFormat::default(), None)
            .unwrap();
        session.start_capture(Arc::new(|_| {})).unwrap();
        assert!(matches!(
            session.configure(target(), RequestedVideoFormat::default(), None),
            Err(CaptureError::AlreadyRunning)
        ));
    }

    #[test]
    fn release_buffer_null_handle_is_ok() {
        let session = Session::new(FakeBackend::default());
        assert!(session.release_buffer(ReleaseHandle::NULL).is_ok());
    }
}
