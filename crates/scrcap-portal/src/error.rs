//! Portal-specific errors, convertible into [`scrcap_core::CaptureError`].

use scrcap_core::CaptureError;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("D-Bus connection failed: {0}")]
    DbusConnection(#[from] zbus::Error),

    #[error("portal session creation failed: {0}")]
    SessionCreation(String),

    #[error("portal select-sources failed: {0}")]
    SelectSourcesFailed(String),

    #[error("portal returned no usable video stream")]
    NoVideoStream,

    #[error("user cancelled the portal dialog")]
    UserCancelled,

    #[error("portal session was closed")]
    PortalClosed,

    #[error("invalid portal configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PortalError>;

impl PortalError {
    pub(crate) fn session_creation(msg: impl Into<String>) -> Self {
        Self::SessionCreation(msg.into())
    }

    pub(crate) fn select_sources(msg: impl Into<String>) -> Self {
        Self::SelectSourcesFailed(msg.into())
    }
}

impl From<PortalError> for CaptureError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::UserCancelled => CaptureError::UserCancelled,
            PortalError::PortalClosed => CaptureError::PortalClosed,
            PortalError::InvalidConfig(msg) => CaptureError::InvalidArg(msg),
            other => CaptureError::PortalFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_capture_error_taxonomy() {
        assert!(matches!(
            CaptureError::from(PortalError::UserCancelled),
            CaptureError::UserCancelled
        ));
        assert!(matches!(
            CaptureError::from(PortalError::PortalClosed),
            CaptureError::PortalClosed
        ));
        assert!(matches!(
            CaptureError::from(PortalError::NoVideoStream),
            CaptureError::PortalFailed(_)
        ));
    }
}
