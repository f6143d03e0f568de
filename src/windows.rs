//! Windows platform wiring: two backends exist (DXGI and WGC), selected
//! per-target by the device-id grammar the configured target carries (§6
//! "Device identifiers"): `Adapter<u>_Output<u>` is a DXGI id, `HMONITOR:0x..`
//! and `HWND:0x..` are WGC ids.

use std::sync::Arc;

use scrcap_core::{
    CaptureBackend, CaptureTarget, DeviceDescriptor, DeviceEnumerator, DxgiDisplayId, FrameCallback,
    NegotiatedVideoFormat, PayloadRegistry, RequestedAudioFormat, RequestedVideoFormat, Result,
};

/// The platform backend type alias the root facade's `Session` is
/// generic over on Windows: one enum covering both concrete backends.
pub(crate) type PlatformBackend = WindowsBackend;

pub(crate) enum WindowsBackend {
    #[cfg(feature = "dxgi")]
    Dxgi(scrcap_dxgi::DxgiCaptureBackend),
    #[cfg(feature = "wgc")]
    Wgc(scrcap_wgc::WgcCaptureBackend),
}

impl Default for WindowsBackend {
    fn default() -> Self {
        #[cfg(feature = "dxgi")]
        {
            Self::Dxgi(scrcap_dxgi::DxgiCaptureBackend::default())
        }
        #[cfg(all(not(feature = "dxgi"), feature = "wgc"))]
        {
            Self::Wgc(scrcap_wgc::WgcCaptureBackend::default())
        }
    }
}

impl WindowsBackend {
    /// Pick the backend that owns `target`'s id grammar, replacing
    /// whatever backend was selected for a previous target.
    fn select_for(target: &CaptureTarget) -> Self {
        match target {
            #[cfg(feature = "wgc")]
            CaptureTarget::Window(_) => Self::Wgc(scrcap_wgc::WgcCaptureBackend::default()),
            _ => {
                #[cfg(feature = "dxgi")]
                if DxgiDisplayId::parse(target.id()).is_ok() {
                    return Self::Dxgi(scrcap_dxgi::DxgiCaptureBackend::default());
                }
                #[cfg(feature = "wgc")]
                {
                    Self::Wgc(scrcap_wgc::WgcCaptureBackend::default())
                }
                #[cfg(not(feature = "wgc"))]
                {
                    Self::Dxgi(scrcap_dxgi::DxgiCaptureBackend::default())
                }
            }
        }
    }
}

impl CaptureBackend for WindowsBackend {
    fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> Result<()> {
        *self = Self::select_for(&target);
        match self {
            #[cfg(feature = "dxgi")]
            Self::Dxgi(b) => b.configure(target, video, audio),
            #[cfg(feature = "wgc")]
            Self::Wgc(b) => b.configure(target, video, audio),
        }
    }

    fn start(&mut self, registry: Arc<PayloadRegistry>, callback: FrameCallback) -> Result<()> {
        match self {
            #[cfg(feature = "dxgi")]
            Self::Dxgi(b) => b.start(registry, callback),
            #[cfg(feature = "wgc")]
            Self::Wgc(b) => b.start(registry, callback),
        }
    }

    fn stop(&mut self) -> Result<()> {
        match self {
            #[cfg(feature = "dxgi")]
            Self::Dxgi(b) => b.stop(),
            #[cfg(feature = "wgc")]
            Self::Wgc(b) => b.stop(),
        }
    }

    fn is_running(&self) -> bool {
        match self {
            #[cfg(feature = "dxgi")]
            Self::Dxgi(b) => b.is_running(),
            #[cfg(feature = "wgc")]
            Self::Wgc(b) => b.is_running(),
        }
    }

    fn negotiated_video_format(&self) -> NegotiatedVideoFormat {
        match self {
            #[cfg(feature = "dxgi")]
            Self::Dxgi(b) => b.negotiated_video_format(),
            #[cfg(feature = "wgc")]
            Self::Wgc(b) => b.negotiated_video_format(),
        }
    }
}

/// Real device enumeration on Windows (§2 supplemental: "Device descriptor
/// enumeration returns are real, not stub, on Windows"), backed by WGC's
/// monitor/window walk.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WindowsDeviceEnumerator;

#[cfg(feature = "wgc")]
impl DeviceEnumerator for WindowsDeviceEnumerator {
    fn enumerate_displays(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(scrcap_wgc::enumerate_monitors()
            .into_iter()
            .enumerate()
            .map(|(i, hmonitor)| {
                DeviceDescriptor::new(format!("HMONITOR:{:#x}", hmonitor.0), format!("Display {i}"), i == 0)
            })
            .collect())
    }

    fn enumerate_windows(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(scrcap_wgc::enumerate_windows()
            .into_iter()
            .map(|hwnd| DeviceDescriptor::new(format!("HWND:{:#x}", hwnd.0), "window", false))
            .collect())
    }
}

#[cfg(not(feature = "wgc"))]
impl DeviceEnumerator for WindowsDeviceEnumerator {
    fn enumerate_displays(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(Vec::new())
    }

    fn enumerate_windows(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(Vec::new())
    }
}

pub(crate) fn platform_enumerator() -> impl DeviceEnumerator {
    WindowsDeviceEnumerator
}
