//! [`PipeWireCaptureBackend`]: the Linux [`scrcap_core::CaptureBackend`]
//! wiring the portal session machine (§4.2) to the PipeWire pipeline
//! (§4.3), per the concurrency model in §5: "one PipeWire I/O thread...
//! plus one auxiliary thread running a platform main loop used to service
//! D-Bus asynchronous callbacks."

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use scrcap_core::{
    CaptureBackend, CaptureError, CaptureTarget, FrameCallback, NegotiatedVideoFormat,
    PayloadRegistry, RequestedAudioFormat, RequestedVideoFormat, Result as CoreResult,
};
use scrcap_portal::{PortalConfig, PortalSessionMachine, PortalStreams};

use crate::audio::{create_audio_stream, AudioStreamShared};
use crate::error::PipeWireError;
use crate::stream::{create_video_stream, VideoStreamShared};
use crate::thread::{create_wake_pipe, IoThreadHandle};

/// A request sent to the D-Bus auxiliary thread over its command channel.
enum DbusCommand {
    Start {
        portal_config: PortalConfig,
        target: CaptureTarget,
        audio_requested: bool,
        on_closed: Box<dyn FnOnce() + Send>,
        reply: tokio::sync::oneshot::Sender<CoreResult<PortalStreams>>,
    },
    Stop {
        reply: tokio::sync::oneshot::Sender<()>,
    },
    Shutdown,
}

/// The D-Bus auxiliary thread (§5: "one auxiliary thread running a platform
/// main loop used to service D-Bus asynchronous callbacks").
///
/// Owns a single-threaded tokio runtime that is driven continuously for the
/// thread's entire lifetime by `block_on`-ing a command-processing loop, not
/// just for the duration of one request: this is what lets a task spawned
/// mid-session (watching for the portal's `Session.Closed` signal) keep
/// being polled after the request that spawned it has returned its reply.
struct DbusThread {
    command_tx: tokio::sync::mpsc::UnboundedSender<DbusCommand>,
    join_handle: Option<JoinHandle<()>>,
}

impl DbusThread {
    fn new() -> CoreResult<Self> {
        let (command_tx, mut command_rx) = tokio::sync::mpsc::unbounded_channel::<DbusCommand>();
        let join_handle = std::thread::Builder::new()
            .name("scrcap-pipewire-dbus".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "failed to start portal runtime");
                        return;
                    }
                };
                runtime.block_on(async move {
                    let mut machine: Option<PortalSessionMachine> = None;
                    while let Some(command) = command_rx.recv().await {
                        match command {
                            DbusCommand::Start {
                                portal_config,
                                target,
                                audio_requested,
                                on_closed,
                                reply,
                            } => {
                                let result =
                                    start_portal_session(&mut machine, portal_config, &target, audio_requested, on_closed)
                                        .await;
                                let _ = reply.send(result);
                            }
                            DbusCommand::Stop { reply } => {
                                if let Some(m) = machine.as_mut() {
                                    if let Err(e) = m.close().await {
                                        warn!(error = %e, "failed to close portal session on stop");
                                    }
                                }
                                let _ = reply.send(());
                            }
                            DbusCommand::Shutdown => break,
                        }
                    }
                });
            })
            .map_err(|e| CaptureError::SystemCallFailed(format!("failed to spawn D-Bus thread: {e}")))?;
        Ok(Self {
            command_tx,
            join_handle: Some(join_handle),
        })
    }

    /// Drive the portal session machine through `start_capture_session` and
    /// arm `on_closed` against the resulting session's `Closed` signal, all
    /// on the D-Bus thread; blocks the calling thread for the reply.
    fn start_session(
        &self,
        portal_config: PortalConfig,
        target: CaptureTarget,
        audio_requested: bool,
        on_closed: Box<dyn FnOnce() + Send>,
    ) -> CoreResult<PortalStreams> {
        let (reply, reply_rx) = tokio::sync::oneshot::channel();
        self.command_tx
            .send(DbusCommand::Start {
                portal_config,
                target,
                audio_requested,
                on_closed,
                reply,
            })
            .map_err(|_| CaptureError::SystemCallFailed("D-Bus thread is not running".into()))?;
        reply_rx
            .blocking_recv()
            .map_err(|_| CaptureError::SystemCallFailed("D-Bus thread dropped the reply channel".into()))?
    }

    /// Close the held portal session, if any; blocks the calling thread
    /// until the close completes (or the thread is gone).
    fn stop_session(&self) {
        let (reply, reply_rx) = tokio::sync::oneshot::channel();
        if self.command_tx.send(DbusCommand::Stop { reply }).is_ok() {
            let _ = reply_rx.blocking_recv();
        }
    }

    fn shutdown(&mut self) {
        let _ = self.command_tx.send(DbusCommand::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                error!("PipeWire D-Bus thread panicked");
            }
        }
    }
}

impl Drop for DbusThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run one `start_capture_session`, lazily creating the session machine the
/// first time, then call [`PortalSessionMachine::watch_closed`] so external
/// closure of the session (§4.2 "Session `Closed` signal → `None` +
/// `PortalClosed`") is detected instead of silently going unnoticed.
async fn start_portal_session(
    machine_slot: &mut Option<PortalSessionMachine>,
    portal_config: PortalConfig,
    target: &CaptureTarget,
    audio_requested: bool,
    on_closed: Box<dyn FnOnce() + Send>,
) -> CoreResult<PortalStreams> {
    if machine_slot.is_none() {
        *machine_slot = Some(
            PortalSessionMachine::new(portal_config)
                .await
                .map_err(|e| CaptureError::PortalFailed(e.to_string()))?,
        );
    }
    let machine = machine_slot.as_mut().expect("populated above");
    let streams = machine
        .start_capture_session(target, audio_requested)
        .await
        .map_err(CaptureError::from)?;
    if let Err(e) = machine.watch_closed(on_closed) {
        warn!(error = %e, "failed to watch portal session for external closure");
    }
    Ok(streams)
}

pub struct PipeWireCaptureBackend {
    target: Option<CaptureTarget>,
    requested_video: RequestedVideoFormat,
    requested_audio: Option<RequestedAudioFormat>,
    pipewire_config: crate::config::PipeWireConfig,
    portal_config: PortalConfig,

    dbus_thread: Option<DbusThread>,
    io_thread: Option<IoThreadHandle>,
    video_shared: Option<Arc<VideoStreamShared>>,
    audio_shared: Option<Arc<AudioStreamShared>>,
    running: Arc<AtomicBool>,
    /// Set by the `watch_closed` callback when the portal closes the
    /// session out from under us (§4.2/§7), merged into `last_error()`
    /// alongside whatever the I/O thread itself observed.
    portal_error: Arc<Mutex<Option<CaptureError>>>,
}

impl Default for PipeWireCaptureBackend {
    fn default() -> Self {
        Self::new(PortalConfig::default(), crate::config::PipeWireConfig::default())
    }
}

impl PipeWireCaptureBackend {
    #[must_use]
    pub fn new(portal_config: PortalConfig, pipewire_config: crate::config::PipeWireConfig) -> Self {
        Self {
            target: None,
            requested_video: RequestedVideoFormat::default(),
            requested_audio: None,
            pipewire_config,
            portal_config,
            dbus_thread: None,
            io_thread: None,
            video_shared: None,
            audio_shared: None,
            running: Arc::new(AtomicBool::new(false)),
            portal_error: Arc::new(Mutex::new(None)),
        }
    }
}

impl CaptureBackend for PipeWireCaptureBackend {
    fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> CoreResult<()> {
        self.pipewire_config
            .validate()
            .map_err(|e| CaptureError::InvalidArg(e.to_string()))?;
        self.target = Some(target);
        self.requested_video = video;
        self.requested_audio = audio;
        Ok(())
    }

    fn start(&mut self, registry: Arc<PayloadRegistry>, callback: FrameCallback) -> CoreResult<()> {
        let target = self
            .target
            .clone()
            .ok_or(CaptureError::NotInitialized)?;

        if self.dbus_thread.is_none() {
            self.dbus_thread = Some(DbusThread::new()?);
        }
        let dbus = self.dbus_thread.as_ref().expect("just initialized");

        *self.portal_error.lock() = None;
        let (wake_writer, wake_read_fd) = create_wake_pipe()?;

        let portal_error = self.portal_error.clone();
        let running_for_closed = self.running.clone();
        let wake_for_closed = wake_writer.clone();
        let on_closed: Box<dyn FnOnce() + Send> = Box::new(move || {
            warn!("portal session closed externally, stopping capture");
            *portal_error.lock() = Some(CaptureError::PortalClosed);
            running_for_closed.store(false, Ordering::SeqCst);
            if let Err(e) = wake_for_closed.signal_error() {
                warn!(error = %e, "failed to signal wake pipe after portal session closed");
            }
        });

        let streams = dbus.start_session(
            self.portal_config.clone(),
            target,
            self.requested_audio.is_some(),
            on_closed,
        )?;

        info!(
            video_node_id = streams.video_node_id,
            audio_node_id = ?streams.audio_node_id,
            "starting PipeWire I/O thread"
        );

        let last_error = Arc::new(Mutex::new(None));
        let running = self.running.clone();
        let video_shared = Arc::new(VideoStreamShared {
            negotiated: Mutex::new(NegotiatedVideoFormat::default()),
            buffers: Mutex::new(crate::stream::BufferTable::default()),
            is_dmabuf: AtomicBool::new(false),
            video_active: AtomicBool::new(false),
            registry: registry.clone(),
            callback: callback.clone(),
            output_preference: self.requested_video.output_preference,
            last_error: last_error.clone(),
        });
        self.video_shared = Some(video_shared.clone());

        let audio_shared = self.requested_audio.map(|format| {
            Arc::new(AudioStreamShared {
                format,
                active: AtomicBool::new(false),
                registry: registry.clone(),
                callback: callback.clone(),
            })
        });
        self.audio_shared = audio_shared.clone();

        let pipewire_fd = streams.pipewire_fd;
        let video_node_id = streams.video_node_id;
        let audio_node_id = streams.audio_node_id;
        let requested_video = self.requested_video;
        let requested_audio = self.requested_audio;
        let wake_for_thread = wake_writer.clone();
        let wake_read = wake_read_fd;

        let last_error_for_thread = last_error.clone();
        let io_thread = IoThreadHandle::spawn(
            "scrcap-pipewire-io",
            wake_writer,
            last_error,
            move || {
                run_io_thread(
                    pipewire_fd,
                    wake_read,
                    video_node_id,
                    audio_node_id,
                    requested_video,
                    requested_audio,
                    video_shared,
                    audio_shared,
                    running,
                    wake_for_thread,
                    last_error_for_thread,
                );
            },
        )?;
        self.io_thread = Some(io_thread);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> CoreResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut handle) = self.io_thread.take() {
            handle.stop_and_join();
        }
        if let Some(dbus) = &self.dbus_thread {
            dbus.stop_session();
        }
        self.video_shared = None;
        self.audio_shared = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .video_shared
                .as_ref()
                .is_some_and(|s| s.video_active.load(Ordering::SeqCst))
    }

    fn negotiated_video_format(&self) -> NegotiatedVideoFormat {
        self.video_shared
            .as_ref()
            .map(|s| *s.negotiated.lock())
            .unwrap_or_default()
    }

    fn last_error(&self) -> Option<CaptureError> {
        if let Some(err) = self.portal_error.lock().clone() {
            return Some(err);
        }
        self.io_thread
            .as_ref()
            .and_then(|handle| handle.last_error.lock().as_ref().map(PipeWireError::to_capture_error))
    }
}

/// Body of the dedicated PipeWire I/O thread (§4.3 "Producer model").
///
/// Owns the `MainLoop`/`Context`/`Core`/`Stream`s for their entire lifetime;
/// none of these types cross this thread's boundary.
#[allow(clippy::too_many_arguments)]
fn run_io_thread(
    pipewire_fd: OwnedFd,
    wake_read_fd: OwnedFd,
    video_node_id: u32,
    audio_node_id: Option<u32>,
    requested_video: RequestedVideoFormat,
    requested_audio: Option<RequestedAudioFormat>,
    video_shared: Arc<VideoStreamShared>,
    audio_shared: Option<Arc<AudioStreamShared>>,
    running: Arc<AtomicBool>,
    wake: crate::thread::WakePipeWriter,
    last_error: Arc<Mutex<Option<PipeWireError>>>,
) {
    let mainloop = match pipewire::main_loop::MainLoop::new(None) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "failed to create PipeWire main loop");
            *last_error.lock() = Some(PipeWireError::ConnectionFailed(e.to_string()));
            running.store(false, Ordering::SeqCst);
            return;
        }
    };
    let context = match pipewire::context::Context::new(&mainloop) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to create PipeWire context");
            *last_error.lock() = Some(PipeWireError::ConnectionFailed(e.to_string()));
            running.store(false, Ordering::SeqCst);
            return;
        }
    };
    let core = match context.connect_fd(pipewire_fd.as_raw_fd(), None) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to connect PipeWire core over portal fd");
            *last_error.lock() = Some(PipeWireError::ConnectionFailed(e.to_string()));
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    let (_video_stream, _video_listener) = match create_video_stream(
        &core,
        video_node_id,
        requested_video,
        video_shared,
        wake.clone(),
    ) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "failed to create video stream");
            *last_error.lock() = Some(e);
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    let audio_pair = match (audio_node_id, requested_audio, audio_shared) {
        (Some(node_id), Some(format), Some(shared)) => {
            match create_audio_stream(&core, node_id, format, shared) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!(error = %e, "failed to create audio stream, continuing video-only");
                    None
                }
            }
        }
        _ => None,
    };

    let _io_source = mainloop.loop_().add_io(wake_read_fd, pipewire::spa::support::system::IoFlags::IN, {
        let mainloop = mainloop.clone();
        move |_flags| {
            mainloop.quit();
        }
    });

    mainloop.run();
    drop(audio_pair);
    running.store(false, Ordering::SeqCst);
}
