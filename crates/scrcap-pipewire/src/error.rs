//! PipeWire-specific errors, convertible into [`scrcap_core::CaptureError`].

use scrcap_core::CaptureError;

#[derive(Debug, thiserror::Error)]
pub enum PipeWireError {
    #[error("failed to connect to PipeWire: {0}")]
    ConnectionFailed(String),

    #[error("invalid configuration: {0:?}")]
    InvalidConfig(Vec<String>),

    #[error("stream creation failed: {0}")]
    StreamCreationFailed(String),

    #[error("stream is in an invalid state for this operation")]
    InvalidState,

    #[error("format negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("I/O thread communication failed: {0}")]
    ThreadCommunication(String),

    #[error("a system call failed: {0}")]
    SystemCall(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipeWireError>;

impl PipeWireError {
    pub(crate) fn thread_communication(msg: impl Into<String>) -> Self {
        Self::ThreadCommunication(msg.into())
    }

    pub(crate) fn system_call(msg: impl Into<String>) -> Self {
        Self::SystemCall(msg.into())
    }
}

impl PipeWireError {
    /// Convert by reference, so a caller holding one behind a lock (e.g.
    /// [`crate::thread::IoThreadHandle::last_error`]) doesn't need to move
    /// or clone it out first.
    pub(crate) fn to_capture_error(&self) -> CaptureError {
        match self {
            PipeWireError::InvalidConfig(msgs) => CaptureError::InvalidArg(msgs.join("; ")),
            PipeWireError::InvalidState => CaptureError::NotInitialized,
            other => CaptureError::StreamFailed(other.to_string()),
        }
    }
}

impl From<PipeWireError> for CaptureError {
    fn from(err: PipeWireError) -> Self {
        err.to_capture_error()
    }
}
