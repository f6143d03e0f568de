//! Error taxonomy shared by every capture backend.
//!
//! Each variant maps to a stable numeric code so that a foreign-function
//! binding layer (outside this crate) can surface failures without knowing
//! about Rust error types.

/// Errors a capture backend or the engine facade can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("session is not initialized")]
    NotInitialized,

    #[error("session is already running")]
    AlreadyRunning,

    #[error("out of memory")]
    OutOfMemory,

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("system call failed: {0}")]
    SystemCallFailed(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("stream failed: {0}")]
    StreamFailed(String),

    #[error("portal operation failed: {0}")]
    PortalFailed(String),

    #[error("portal session closed")]
    PortalClosed,

    #[error("user cancelled the portal dialog")]
    UserCancelled,
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Stable numeric error code consumed by the application / FFI layer.
///
/// `Success` is not a [`CaptureError`] variant — a successful call simply
/// returns `Ok(())`. The code for it is exposed here so the FFI layer has a
/// single source of truth for the full code table named in the error
/// taxonomy.
pub const ERROR_CODE_SUCCESS: i32 = 0;

impl CaptureError {
    /// The stable numeric code for this error, matching the taxonomy order.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            Self::InvalidArg(_) => 1,
            Self::NotInitialized => 2,
            Self::AlreadyRunning => 3,
            Self::OutOfMemory => 4,
            Self::NotSupported(_) => 5,
            Self::SystemCallFailed(_) => 6,
            Self::DeviceNotFound(_) => 7,
            Self::StreamFailed(_) => 8,
            Self::PortalFailed(_) => 9,
            Self::PortalClosed => 10,
            Self::UserCancelled => 11,
        }
    }

    pub(crate) fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArg(msg.into())
    }

    pub(crate) fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub(crate) fn device_not_found(msg: impl Into<String>) -> Self {
        Self::DeviceNotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_and_distinct() {
        let errors = [
            CaptureError::InvalidArg("x".into()),
            CaptureError::NotInitialized,
            CaptureError::AlreadyRunning,
            CaptureError::OutOfMemory,
            CaptureError::NotSupported("x".into()),
            CaptureError::SystemCallFailed("x".into()),
            CaptureError::DeviceNotFound("x".into()),
            CaptureError::StreamFailed("x".into()),
            CaptureError::PortalFailed("x".into()),
            CaptureError::PortalClosed,
            CaptureError::UserCancelled,
        ];
        let mut codes: Vec<i32> = errors.iter().map(CaptureError::error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|&c| c != ERROR_CODE_SUCCESS));
    }

    #[test]
    fn helper_constructors_build_expected_variants() {
        assert!(matches!(
            CaptureError::invalid_arg("bad width"),
            CaptureError::InvalidArg(ref m) if m == "bad width"
        ));
        assert!(matches!(
            CaptureError::not_supported("region capture"),
            CaptureError::NotSupported(ref m) if m == "region capture"
        ));
        assert!(matches!(
            CaptureError::device_not_found("Adapter9_Output0"),
            CaptureError::DeviceNotFound(ref m) if m == "Adapter9_Output0"
        ));
    }
}
