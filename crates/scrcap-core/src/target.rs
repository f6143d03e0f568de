//! Capture targets and the device-identifier grammars backends parse them
//! from (§6 of the design: `Adapter<u>_Output<u>`, `HMONITOR:0x..`,
//! `HWND:0x..`, and the Linux portal placeholders).

use crate::error::{CaptureError, Result};

/// What a session captures: a whole display, a single window, or a
/// sub-region of either.
///
/// A session is configured with exactly one target. Opaque identifiers are
/// platform strings — a monitor handle, a window handle, or (on Linux,
/// before the portal dialog runs) a placeholder the portal resolves itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    Display(String),
    Window(String),
    Region {
        id: String,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
}

impl CaptureTarget {
    /// The opaque identifier this target carries, ignoring any region crop.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Display(id) | Self::Window(id) | Self::Region { id, .. } => id,
        }
    }

    /// Source-type bit used by the portal's `SelectSources` call (§4.2
    /// "Source types mask"): Display maps to monitor-only, Window to
    /// window-only, Region to both (it crops over whichever was selected).
    #[must_use]
    pub fn portal_source_mask(&self) -> PortalSourceMask {
        match self {
            Self::Display(_) => PortalSourceMask::MONITOR,
            Self::Window(_) => PortalSourceMask::WINDOW,
            Self::Region { .. } => PortalSourceMask::MONITOR | PortalSourceMask::WINDOW,
        }
    }
}

/// Bitmask mirroring the portal's `SourceType` enum flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalSourceMask(u32);

impl PortalSourceMask {
    pub const MONITOR: Self = Self(1 << 0);
    pub const WINDOW: Self = Self(1 << 1);

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for PortalSourceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Well-known Linux portal placeholders meaning "let the user pick".
pub const PORTAL_DISPLAY_PLACEHOLDER: &str = "portal_display";
pub const PORTAL_WINDOW_PLACEHOLDER: &str = "portal_window";

/// A Windows DXGI display id, `Adapter<u>_Output<u>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DxgiDisplayId {
    pub adapter_index: u32,
    pub output_index: u32,
}

impl DxgiDisplayId {
    /// Parse `"Adapter<u>_Output<u>"`.
    pub fn parse(id: &str) -> Result<Self> {
        let rest = id
            .strip_prefix("Adapter")
            .ok_or_else(|| CaptureError::invalid_arg(format!("not a DXGI display id: {id}")))?;
        let (adapter_str, rest) = rest
            .split_once("_Output")
            .ok_or_else(|| CaptureError::invalid_arg(format!("not a DXGI display id: {id}")))?;
        let adapter_index: u32 = adapter_str
            .parse()
            .map_err(|_| CaptureError::invalid_arg(format!("bad adapter index in {id}")))?;
        let output_index: u32 = rest
            .parse()
            .map_err(|_| CaptureError::invalid_arg(format!("bad output index in {id}")))?;
        Ok(Self {
            adapter_index,
            output_index,
        })
    }
}

impl std::fmt::Display for DxgiDisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Adapter{}_Output{}", self.adapter_index, self.output_index)
    }
}

/// A parsed WGC device identifier: either `HMONITOR:0x..` or `HWND:0x..`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgcDeviceId {
    Monitor(isize),
    Window(isize),
}

impl WgcDeviceId {
    pub fn parse(id: &str) -> Result<Self> {
        if let Some(hex) = id.strip_prefix("HMONITOR:0x") {
            let value = isize::from_str_radix(hex, 16)
                .map_err(|_| CaptureError::invalid_arg(format!("bad HMONITOR id: {id}")))?;
            return Ok(Self::Monitor(value));
        }
        if let Some(hex) = id.strip_prefix("HWND:0x") {
            let value = isize::from_str_radix(hex, 16)
                .map_err(|_| CaptureError::invalid_arg(format!("bad HWND id: {id}")))?;
            return Ok(Self::Window(value));
        }
        Err(CaptureError::invalid_arg(format!(
            "not a WGC device id: {id}"
        )))
    }
}

impl std::fmt::Display for WgcDeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monitor(h) => write!(f, "HMONITOR:{h:#x}"),
            Self::Window(h) => write!(f, "HWND:{h:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_and_mask() {
        let d = CaptureTarget::Display("portal_display".into());
        assert_eq!(d.id(), "portal_display");
        assert_eq!(d.portal_source_mask().bits(), PortalSourceMask::MONITOR.bits());

        let w = CaptureTarget::Window("HWND:0x1234".into());
        assert_eq!(w.portal_source_mask().bits(), PortalSourceMask::WINDOW.bits());

        let r = CaptureTarget::Region {
            id: "Adapter0_Output0".into(),
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        };
        assert_eq!(
            r.portal_source_mask().bits(),
            (PortalSourceMask::MONITOR | PortalSourceMask::WINDOW).bits()
        );
    }

    #[test]
    fn dxgi_display_id_round_trips() {
        let id = DxgiDisplayId::parse("Adapter1_Output2").unwrap();
        assert_eq!(id.adapter_index, 1);
        assert_eq!(id.output_index, 2);
        assert_eq!(id.to_string(), "Adapter1_Output2");
    }

    #[test]
    fn dxgi_display_id_rejects_garbage() {
        assert!(DxgiDisplayId::parse("bogus").is_err());
        assert!(DxgiDisplayId::parse("Adapter1").is_err());
        assert!(DxgiDisplayId::parse("Adapterx_Output0").is_err());
    }

    #[test]
    fn wgc_device_id_round_trips() {
        let m = WgcDeviceId::parse("HMONITOR:0x1a2b").unwrap();
        assert_eq!(m, WgcDeviceId::Monitor(0x1a2b));
        let w = WgcDeviceId::parse("HWND:0xff").unwrap();
        assert_eq!(w, WgcDeviceId::Window(0xff));
        assert!(WgcDeviceId::parse("PID:123").is_err());
    }
}
