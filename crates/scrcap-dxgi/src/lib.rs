//! # scrcap-dxgi
//!
//! The Windows DXGI Desktop Duplication backend (§4.4): captures a whole
//! display via `IDXGIOutputDuplication`, delivering either a zero-copy
//! shareable D3D11 texture handle or a mapped CPU staging-texture pointer,
//! depending on the application's requested [`scrcap_core::OutputPreference`].
//!
//! Region and window targets are out of scope for this backend — use
//! [`scrcap-wgc`](https://docs.rs/scrcap-wgc) for windows, and crop a
//! region client-side from a display capture.

#![cfg(any(windows, doc))]

mod backend;
mod device;
mod duplication;
mod error;

pub use backend::DxgiCaptureBackend;
pub use error::{DxgiError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use scrcap_core::{CaptureBackend, CaptureTarget, RequestedVideoFormat};
    use std::sync::Arc;

    // DXGI duplication requires a real GPU/desktop session; these are
    // integration tests that do not run in CI.

    #[test]
    #[ignore]
    fn configure_then_start_then_stop_a_display_capture() {
        let mut backend = DxgiCaptureBackend::default();
        let target = CaptureTarget::Display("Adapter0_Output0".to_string());
        backend
            .configure(target, RequestedVideoFormat::default(), None)
            .unwrap();
        let registry = Arc::new(scrcap_core::PayloadRegistry::new());
        let callback: scrcap_core::FrameCallback = Arc::new(|_frame| {});
        backend.start(registry, callback).unwrap();
        assert!(backend.is_running());
        backend.stop().unwrap();
        assert!(!backend.is_running());
    }

    #[test]
    fn region_targets_are_rejected() {
        let mut backend = DxgiCaptureBackend::default();
        let target = CaptureTarget::Region {
            id: "Adapter0_Output0".into(),
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        };
        let err = backend
            .configure(target, RequestedVideoFormat::default(), None)
            .unwrap_err();
        assert!(matches!(err, scrcap_core::CaptureError::NotSupported(_)));
    }
}
