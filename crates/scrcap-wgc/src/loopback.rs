//! Loopback-audio coupling (§4.5 "Audio coupling"): sequences an external
//! [`scrcap_core::LoopbackAudioSource`] around the WGC video session.

use scrcap_core::{CaptureTarget, LoopbackAudioSource, Result};

use crate::enumerate::window_owner_pid;
use scrcap_core::WgcDeviceId;

/// Derive the loopback target-device id for a configured target (§6
/// "Audio-loopback targets"): a window target loops back the audio of its
/// owning process; a monitor target loops back the system-default output.
pub(crate) fn loopback_target_device_id(target: &CaptureTarget, device_id: WgcDeviceId) -> Option<String> {
    match (target, device_id) {
        (CaptureTarget::Window(_), WgcDeviceId::Window(raw)) => {
            let hwnd = windows::Win32::Foundation::HWND(raw);
            let pid = window_owner_pid(hwnd);
            Some(format!("PID:{pid}"))
        }
        _ => None,
    }
}

/// Start `source` before the video session per §4.5 "audio started before
/// the WGC session".
pub(crate) fn start_loopback(source: &mut dyn LoopbackAudioSource, target_device_id: Option<&str>) -> Result<()> {
    source.start(target_device_id)
}

/// Stop `source`; callers invoke this both on a failed video-session start
/// and as the final step of an orderly stop (§4.5 "on normal stop, video
/// resources are torn down first, then audio").
pub(crate) fn stop_loopback(source: &mut dyn LoopbackAudioSource) -> Result<()> {
    source.stop()
}
