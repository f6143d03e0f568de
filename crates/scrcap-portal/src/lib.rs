//! # scrcap-portal
//!
//! The Linux XDG Desktop Portal session state machine (§4.2): drives the
//! asynchronous create-session / select-sources / start dialog over the
//! user session bus and hands the resulting PipeWire producer node id(s) and
//! an open PipeWire remote file descriptor to [`scrcap-pipewire`](https://docs.rs/scrcap-pipewire).
//!
//! This crate talks to the portal directly over `zbus`; it does not depend
//! on a higher-level portal wrapper crate (see `DESIGN.md` for why).

pub mod config;
pub mod error;
pub mod session;
mod state;

mod dbus;

pub use config::{CursorMode, PortalConfig, PortalConfigBuilder};
pub use error::{PortalError, Result};
pub use session::{PortalSessionMachine, PortalStreams};
pub use state::PortalState;

#[cfg(test)]
mod tests {
    use super::*;
    use scrcap_core::CaptureTarget;

    // Portal tests require a running session bus with a portal
    // implementation (xdg-desktop-portal + a backend); these are
    // integration tests that do not run in CI.

    #[tokio::test]
    #[ignore]
    async fn connects_and_creates_a_session() {
        let machine = PortalSessionMachine::new(PortalConfig::default()).await;
        assert!(machine.is_ok());
    }

    #[tokio::test]
    #[ignore]
    async fn full_display_capture_dialog() {
        let mut machine = PortalSessionMachine::new(PortalConfig::default())
            .await
            .unwrap();
        let target = CaptureTarget::Display(scrcap_core::PORTAL_DISPLAY_PLACEHOLDER.to_string());
        let streams = machine.start_capture_session(&target, false).await.unwrap();
        assert!(streams.video_node_id > 0);
        machine.close().await.unwrap();
    }
}
