//! WGC backend error type (§7).

use scrcap_core::CaptureError;

pub type Result<T> = std::result::Result<T, WgcError>;

#[derive(Debug, thiserror::Error)]
pub enum WgcError {
    #[error("failed to create capture item: {0}")]
    ItemCreationFailed(String),

    #[error("monitor or window not found: {0}")]
    TargetNotFound(String),

    #[error("frame pool or session creation failed: {0}")]
    SessionFailed(String),

    #[error("windows API call failed: {0}")]
    WinApi(String),
}

impl From<WgcError> for CaptureError {
    fn from(err: WgcError) -> Self {
        match err {
            WgcError::TargetNotFound(msg) => CaptureError::DeviceNotFound(msg),
            other => CaptureError::StreamFailed(other.to_string()),
        }
    }
}
