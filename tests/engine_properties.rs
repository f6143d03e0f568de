//! End-to-end scenarios and round-trip properties (§8 "Testable
//! Properties"). Scenarios that need a real portal dialog, a real PipeWire
//! node, or real DXGI/WGC hardware are `#[ignore]`d; they compile on every
//! platform but only run where that hardware/session exists.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scrcap::{Engine, ReleaseHandle};

#[test]
fn release_with_a_null_handle_is_a_no_op_returning_success() {
    let engine = Engine::new();
    assert!(engine.release_buffer(ReleaseHandle::NULL).is_ok());
}

#[test]
fn stop_when_not_running_returns_success() {
    let mut engine = Engine::new();
    assert!(engine.stop_capture().is_ok());
    assert!(engine.stop_capture().is_ok());
}

#[test]
fn start_before_configure_is_rejected() {
    let mut engine = Engine::new();
    let err = engine.start_capture(Arc::new(|_| {})).unwrap_err();
    assert!(matches!(err, scrcap::CaptureError::NotInitialized));
}

#[test]
#[cfg(target_os = "linux")]
#[ignore]
fn scenario_1_linux_display_capture_cpu_bgrx32_at_30fps() {
    let mut engine = Engine::for_display("portal_display").unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let count2 = count.clone();
    engine
        .start_capture(Arc::new(move |frame| {
            count2.fetch_add(1, Ordering::SeqCst);
            assert_eq!(frame.planes.len(), 1);
            let plane = &frame.planes[0];
            assert!(plane.stride >= plane.width * 4);
            // Deliberately not released: this scenario only checks the
            // delivered buffer's shape, and the process exits right after.
        }))
        .unwrap();
    std::thread::sleep(std::time::Duration::from_secs(2));
    engine.stop_capture().unwrap();
    assert!(count.load(Ordering::SeqCst) > 0);
}

/// §8 Testable Property Scenario 5: after the portal session is cancelled
/// or closed externally, `is_running()` goes false on its own and
/// `last_error()` reports why, without the application ever calling
/// `stop_capture`.
#[test]
#[cfg(target_os = "linux")]
#[ignore]
fn scenario_5_linux_portal_cancellation_is_observable_via_last_error() {
    let mut engine = Engine::for_display("portal_display").unwrap();
    engine.start_capture(Arc::new(|_frame| {})).unwrap();
    // A human cancels the portal dialog here, or the compositor closes the
    // session out from under us.
    std::thread::sleep(std::time::Duration::from_secs(10));
    assert!(!engine.is_running());
    assert!(engine.last_error().is_some());
}

#[test]
#[cfg(target_os = "windows")]
#[ignore]
fn scenario_4_windows_dxgi_adapter0_output0_gpu() {
    let mut engine = Engine::new();
    let (mut video, audio) = engine.get_default_formats("Adapter0_Output0");
    video.output_preference = scrcap::OutputPreference::Gpu;
    video.frame_rate = scrcap::FrameRate::new(60, 1);
    engine
        .configure_display("Adapter0_Output0", video, None)
        .unwrap();
    let _ = audio;
    let delivered = Arc::new(AtomicUsize::new(0));
    let delivered2 = delivered.clone();
    engine
        .start_capture(Arc::new(move |frame| {
            assert_eq!(frame.content_type, scrcap::ContentType::GpuD3d11Handle);
            delivered2.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(500));
    engine.stop_capture().unwrap();
    assert!(delivered.load(Ordering::SeqCst) > 0);
}

#[test]
#[cfg(target_os = "windows")]
#[ignore]
fn scenario_3_windows_wgc_window_capture_with_audio() {
    let mut engine = Engine::new();
    let (video, audio) = engine.get_default_formats("HWND:0x1234");
    engine
        .configure_window("HWND:0x1234", video, Some(audio))
        .unwrap();
    engine.start_capture(Arc::new(|_frame| {})).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(500));
    engine.stop_capture().unwrap();
}
