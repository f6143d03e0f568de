//! Linux platform wiring: the portal+PipeWire backend is the only backend
//! on this platform, so selection is static.

pub(crate) type PlatformBackend = scrcap_pipewire::PipeWireCaptureBackend;

pub(crate) fn platform_enumerator() -> impl scrcap_core::DeviceEnumerator {
    scrcap_core::PortalPlaceholderEnumerator
}
