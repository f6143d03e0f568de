//! # scrcap
//!
//! A uniform, callback-driven screen-capture engine (§4.1 "Delivery
//! Contract"): a capture session is parameterized by a target (a monitor, a
//! window, or a sub-region), a requested video format, and an optional
//! audio-enable flag, and delivers timestamped [`FrameBuffer`]s to an
//! application callback until [`Engine::stop_capture`] or the application
//! drops the engine.
//!
//! The platform backend compiled in depends on the target OS and the
//! enabled features:
//!
//! - Linux: the `portal`+`pipewire` backend ([`scrcap_portal`] +
//!   [`scrcap_pipewire`]), selected whenever both features are enabled.
//! - Windows: the `dxgi` and `wgc` backends, chosen per-target by the
//!   device-id grammar a configured target carries (§6 "Device
//!   identifiers") — `Adapter<u>_Output<u>` selects DXGI, `HMONITOR:0x..`
//!   and `HWND:0x..` select WGC.
//!
//! ```no_run
//! use scrcap::Engine;
//!
//! let mut engine = Engine::for_display("portal_display").unwrap();
//! engine
//!     .start_capture(std::sync::Arc::new(|frame| {
//!         engine_ready_to_release(frame.internal_handle);
//!     }))
//!     .unwrap();
//! # fn engine_ready_to_release(_: scrcap_core::ReleaseHandle) {}
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use scrcap_core::*;

use scrcap_core::{
    default_formats, CaptureTarget, DeviceDescriptor, DeviceEnumerator, FrameCallback, NegotiatedVideoFormat,
    RequestedAudioFormat, RequestedVideoFormat, Result, Session,
};

#[cfg(all(target_os = "linux", feature = "portal", feature = "pipewire"))]
mod linux;
#[cfg(all(target_os = "linux", feature = "portal", feature = "pipewire"))]
use linux::{platform_enumerator, PlatformBackend};

#[cfg(all(target_os = "windows", any(feature = "dxgi", feature = "wgc")))]
mod windows;
#[cfg(all(target_os = "windows", any(feature = "dxgi", feature = "wgc")))]
use windows::{platform_enumerator, PlatformBackend};

/// The engine facade (§4.1): wraps one [`Session`] over the platform
/// backend compiled in, plus the device enumerator for this platform.
pub struct Engine {
    session: Session<PlatformBackend>,
    enumerator: Box<dyn DeviceEnumerator>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: Session::new(PlatformBackend::default()),
            enumerator: Box::new(platform_enumerator()),
        }
    }

    /// Convenience constructor: build an engine and configure it to
    /// capture `display_id` with the platform's default formats in one
    /// call (§2 supplemental "Engine facade convenience constructors").
    pub fn for_display(display_id: impl Into<String>) -> Result<Self> {
        let mut engine = Self::new();
        let display_id = display_id.into();
        let (video, audio) = engine.get_default_formats(&display_id);
        engine.configure_display(display_id, video, Some(audio))?;
        Ok(engine)
    }

    /// Convenience constructor mirroring [`Engine::for_display`] for window
    /// targets.
    pub fn for_window(window_id: impl Into<String>) -> Result<Self> {
        let mut engine = Self::new();
        let window_id = window_id.into();
        let (video, audio) = engine.get_default_formats(&window_id);
        engine.configure_window(window_id, video, Some(audio))?;
        Ok(engine)
    }

    /// §4.1 `enumerate_displays()`.
    pub fn enumerate_displays(&self) -> Result<Vec<DeviceDescriptor>> {
        self.enumerator.enumerate_displays()
    }

    /// §4.1 `enumerate_windows()`.
    pub fn enumerate_windows(&self) -> Result<Vec<DeviceDescriptor>> {
        self.enumerator.enumerate_windows()
    }

    /// §4.1 `get_default_formats(target_id)`. `target_id` is accepted so a
    /// backend that already knows producer dimensions (Windows) can return
    /// them; this facade applies the documented §6 defaults uniformly and
    /// leaves width/height at "native" (0) since dimensions are not known
    /// before a real producer is queried.
    #[must_use]
    pub fn get_default_formats(&self, _target_id: &str) -> (RequestedVideoFormat, RequestedAudioFormat) {
        default_formats(false)
    }

    /// §4.1 `get_configured_video_formats(session)`.
    #[must_use]
    pub fn get_configured_video_formats(&self) -> NegotiatedVideoFormat {
        self.session.get_configured_video_formats()
    }

    /// §4.1 `configure_display(session, target_id, format, audio_enabled)`.
    pub fn configure_display(
        &mut self,
        target_id: impl Into<String>,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()> {
        self.session
            .configure(CaptureTarget::Display(target_id.into()), video, audio)
    }

    /// §4.1 `configure_display/window/region`, window variant.
    pub fn configure_window(
        &mut self,
        target_id: impl Into<String>,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()> {
        self.session
            .configure(CaptureTarget::Window(target_id.into()), video, audio)
    }

    /// §4.1 `configure_display/window/region`, region variant. Region
    /// capture is always a post-crop over a full-source frame (§1
    /// Non-goals: "no region capture by hardware"); `target_id` names the
    /// underlying display or window the region crops from.
    #[allow(clippy::too_many_arguments)]
    pub fn configure_region(
        &mut self,
        target_id: impl Into<String>,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()> {
        self.session.configure(
            CaptureTarget::Region {
                id: target_id.into(),
                x,
                y,
                width,
                height,
            },
            video,
            audio,
        )
    }

    /// §4.1 `start_capture(session, callback, user_data)`. `user_data` is
    /// the application-owned pointer echoed back on [`FrameBuffer`]; since
    /// this facade is a safe Rust API, applications close over their state
    /// in `callback` instead of passing a raw pointer.
    pub fn start_capture(&mut self, callback: FrameCallback) -> Result<()> {
        self.session.start_capture(callback)
    }

    /// §4.1 `stop_capture(session)`. Idempotent.
    pub fn stop_capture(&mut self) -> Result<()> {
        self.session.stop_capture()
    }

    /// §4.1 `release_buffer(session, internal_handle)`.
    pub fn release_buffer(&self, handle: ReleaseHandle) -> Result<()> {
        self.session.release_buffer(handle)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// §4.2/§7: the most recent error, for an application to poll after
    /// noticing `is_running()` has gone false on its own — e.g. the user
    /// cancelling the portal dialog, or a producer stream failing (§8
    /// Testable Property Scenario 5).
    #[must_use]
    pub fn last_error(&self) -> Option<CaptureError> {
        self.session.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_starts_uninitialized_and_rejects_start_before_configure() {
        let mut engine = Engine::new();
        assert!(!engine.is_running());
        assert!(engine.start_capture(std::sync::Arc::new(|_| {})).is_err());
    }

    #[test]
    fn release_buffer_with_null_handle_is_a_no_op() {
        let engine = Engine::new();
        assert!(engine.release_buffer(ReleaseHandle::NULL).is_ok());
    }

    #[test]
    fn last_error_is_none_before_any_failed_call() {
        let engine = Engine::new();
        assert!(engine.last_error().is_none());
    }

    #[test]
    fn get_default_formats_matches_the_documented_defaults() {
        let engine = Engine::new();
        let (video, audio) = engine.get_default_formats("portal_display");
        assert_eq!(video.pixel_format, scrcap_core::PixelFormat::Bgra32);
        assert_eq!(video.frame_rate.as_fps(), 30.0);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 48_000);
    }
}
