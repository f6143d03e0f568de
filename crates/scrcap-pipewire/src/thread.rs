//! The dedicated PipeWire I/O thread (§4.3 "Producer model").
//!
//! PipeWire's `MainLoop`/`Context`/`Core`/`Stream` types are not `Send`, so
//! they must be created and driven from a single OS thread for their entire
//! lifetime. This module owns that thread and the wake-up pipe the control
//! plane uses to interrupt its main loop ('q' to quit cleanly, 'e' to signal
//! an error condition observed from outside the loop).

use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{PipeWireError, Result};

/// Byte written to the wake pipe to ask the I/O thread's main loop to quit.
pub const WAKE_QUIT: u8 = b'q';
/// Byte written to the wake pipe to flag an externally-observed error.
pub const WAKE_ERROR: u8 = b'e';

/// The write end of the wake-up pipe, shared with whoever wants to
/// interrupt the I/O thread's main loop from outside it.
#[derive(Clone)]
pub struct WakePipeWriter {
    write_fd: Arc<OwnedFd>,
}

impl WakePipeWriter {
    fn write_byte(&self, byte: u8) -> Result<()> {
        nix::unistd::write(self.write_fd.as_fd(), &[byte])
            .map_err(|e| PipeWireError::system_call(format!("write to wake pipe failed: {e}")))?;
        Ok(())
    }

    /// Ask the I/O thread to quit its main loop (§5 "Cancellation").
    pub fn request_quit(&self) -> Result<()> {
        self.write_byte(WAKE_QUIT)
    }

    /// Flag an externally-observed error condition (§4.3 "Failure/recovery").
    pub fn signal_error(&self) -> Result<()> {
        self.write_byte(WAKE_ERROR)
    }
}

/// Creates the wake pipe pair. Returns the writer handle (safe to clone and
/// hand to any thread) and the raw read-end fd the I/O thread attaches to
/// its main loop.
pub fn create_wake_pipe() -> Result<(WakePipeWriter, OwnedFd)> {
    let (read_fd, write_fd) =
        nix::unistd::pipe().map_err(|e| PipeWireError::system_call(format!("pipe() failed: {e}")))?;
    Ok((
        WakePipeWriter {
            write_fd: Arc::new(write_fd),
        },
        read_fd,
    ))
}

/// Handle to a running I/O thread: join it, and ask it to quit via its wake
/// pipe.
pub struct IoThreadHandle {
    join_handle: Option<JoinHandle<()>>,
    wake: WakePipeWriter,
    /// The last error observed on the I/O thread, if the loop exited due to
    /// one.
    pub last_error: Arc<Mutex<Option<PipeWireError>>>,
}

impl IoThreadHandle {
    pub(crate) fn spawn(
        name: &'static str,
        wake: WakePipeWriter,
        last_error: Arc<Mutex<Option<PipeWireError>>>,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<Self> {
        let join_handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| PipeWireError::ThreadCommunication(format!("failed to spawn {name}: {e}")))?;
        Ok(Self {
            join_handle: Some(join_handle),
            wake,
            last_error,
        })
    }

    #[must_use]
    pub fn wake(&self) -> WakePipeWriter {
        self.wake.clone()
    }

    /// Ask the thread to quit and join it. Idempotent: a second call is a
    /// no-op once the thread has already been joined.
    pub fn stop_and_join(&mut self) {
        if let Err(e) = self.wake.request_quit() {
            warn!(error = %e, "failed to signal I/O thread to quit");
        }
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                error!("PipeWire I/O thread panicked");
            }
        } else {
            debug!("I/O thread already joined");
        }
    }
}

impl Drop for IoThreadHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
