//! DXGI-specific errors, convertible into [`scrcap_core::CaptureError`].

use scrcap_core::CaptureError;

#[derive(Debug, thiserror::Error)]
pub enum DxgiError {
    #[error("failed to create D3D11 device: {0}")]
    DeviceCreationFailed(String),

    #[error("output {0} not found")]
    OutputNotFound(String),

    #[error("DuplicateOutput failed: {0}")]
    DuplicationFailed(String),

    #[error("region capture is not supported by the DXGI backend")]
    RegionNotSupported,

    #[error("access to the desktop duplication was lost and recovery failed: {0}")]
    AccessLostRecoveryFailed(String),

    #[error("a Win32/DXGI call failed: {0}")]
    WinApi(String),
}

pub type Result<T> = std::result::Result<T, DxgiError>;

impl From<DxgiError> for CaptureError {
    fn from(err: DxgiError) -> Self {
        match err {
            DxgiError::RegionNotSupported => CaptureError::NotSupported(err.to_string()),
            DxgiError::OutputNotFound(id) => CaptureError::DeviceNotFound(id),
            other => CaptureError::StreamFailed(other.to_string()),
        }
    }
}
