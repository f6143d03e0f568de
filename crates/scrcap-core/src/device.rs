//! Device enumeration: an interface the core calls but need not implement
//! (§1 "out of scope: external collaborators"). Each backend supplies its
//! own enumerator; the Linux one is a cheap placeholder, the Windows ones do
//! real enumeration.

use crate::error::Result;

/// One enumerable capture target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

impl DeviceDescriptor {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, is_default: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_default,
        }
    }
}

/// Device enumeration, kept behind a trait so the engine facade can call it
/// without a concrete backend needing to implement real OS enumeration
/// (Linux capture targets are chosen by the portal dialog itself).
pub trait DeviceEnumerator: Send + Sync {
    fn enumerate_displays(&self) -> Result<Vec<DeviceDescriptor>>;
    fn enumerate_windows(&self) -> Result<Vec<DeviceDescriptor>>;
}

/// The Linux placeholder enumerator: portal target selection happens inside
/// the portal dialog itself, so enumeration just returns the two well-known
/// placeholder ids (§6 "Device identifiers").
#[derive(Debug, Default, Clone, Copy)]
pub struct PortalPlaceholderEnumerator;

impl DeviceEnumerator for PortalPlaceholderEnumerator {
    fn enumerate_displays(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(vec![DeviceDescriptor::new(
            crate::target::PORTAL_DISPLAY_PLACEHOLDER,
            "Let the user pick a display",
            true,
        )])
    }

    fn enumerate_windows(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(vec![DeviceDescriptor::new(
            crate::target::PORTAL_WINDOW_PLACEHOLDER,
            "Let the user pick a window",
            true,
        )])
    }
}

/// The external loopback-audio collaborator (§1, §4.5 "Audio coupling").
///
/// This crate only defines the contract WGC's audio coupling drives; the
/// concrete loopback capture implementation is an external collaborator the
/// core consumes but does not ship.
pub trait LoopbackAudioSource: Send {
    /// Begin capturing loopback audio for `target_device_id` (`None` means
    /// the system default output).
    fn start(&mut self, target_device_id: Option<&str>) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_enumerator_returns_well_known_ids() {
        let e = PortalPlaceholderEnumerator;
        let displays = e.enumerate_displays().unwrap();
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].id, crate::target::PORTAL_DISPLAY_PLACEHOLDER);
        let windows = e.enumerate_windows().unwrap();
        assert_eq!(windows[0].id, crate::target::PORTAL_WINDOW_PLACEHOLDER);
    }
}
