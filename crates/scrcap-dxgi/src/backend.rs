//! [`DxgiCaptureBackend`]: the Windows DXGI desktop-duplication
//! [`scrcap_core::CaptureBackend`] (§4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::info;
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11DeviceContext};
use windows::Win32::Graphics::Dxgi::IDXGIOutputDuplication;

use scrcap_core::{
    CaptureBackend, CaptureError, CaptureTarget, DxgiDisplayId, FrameCallback, NegotiatedVideoFormat,
    PayloadRegistry, RequestedAudioFormat, RequestedVideoFormat, Result as CoreResult,
};

use crate::device::{create_device, desktop_size, resolve_output};
use crate::duplication::{run_worker, StopSignal};
use crate::error::DxgiError;

/// Holds the COM interfaces a running duplication session owns. Not `Send`
/// by COM's rules in general, but this backend only ever touches them from
/// the single worker thread that created them.
struct RunningSession {
    worker: Option<JoinHandle<()>>,
    stop: StopSignal,
}

pub struct DxgiCaptureBackend {
    target: Option<CaptureTarget>,
    requested_video: RequestedVideoFormat,
    negotiated: Arc<Mutex<NegotiatedVideoFormat>>,
    running_flag: Arc<AtomicBool>,
    session: Option<RunningSession>,
    target_fps: f64,
}

impl Default for DxgiCaptureBackend {
    fn default() -> Self {
        Self {
            target: None,
            requested_video: RequestedVideoFormat::default(),
            negotiated: Arc::new(Mutex::new(NegotiatedVideoFormat::default())),
            running_flag: Arc::new(AtomicBool::new(false)),
            session: None,
            target_fps: 30.0,
        }
    }
}

impl CaptureBackend for DxgiCaptureBackend {
    fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        _audio: Option<RequestedAudioFormat>,
    ) -> CoreResult<()> {
        // Region capture is not supported by this backend (§4.4 "Frame
        // rate": "Region capture is not supported; region configure
        // returns not-supported.").
        if matches!(target, CaptureTarget::Region { .. }) {
            return Err(DxgiError::RegionNotSupported.into());
        }
        if matches!(target, CaptureTarget::Window(_)) {
            return Err(CaptureError::NotSupported(
                "the DXGI backend only captures whole displays; use the WGC backend for windows".into(),
            ));
        }
        self.target_fps = video.with_defaults_applied().frame_rate.as_fps();
        self.target = Some(target);
        self.requested_video = video;
        Ok(())
    }

    fn start(&mut self, registry: Arc<PayloadRegistry>, callback: FrameCallback) -> CoreResult<()> {
        let target = self.target.clone().ok_or(CaptureError::NotInitialized)?;
        if self.running_flag.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let display_id = DxgiDisplayId::parse(target.id())?;
        let (adapter, output1, desc) = resolve_output(display_id)?;
        let (width, height) = desktop_size(&desc);
        if width == 0 || height == 0 {
            return Err(CaptureError::DeviceNotFound(format!(
                "{display_id} has a zero-size desktop rect"
            )));
        }

        let (device, context): (ID3D11Device, ID3D11DeviceContext) = create_device(Some(&adapter))?;
        let duplication: IDXGIOutputDuplication = unsafe { output1.DuplicateOutput(&device) }
            .map_err(|e| crate::error::DxgiError::DuplicationFailed(e.to_string()))?;

        info!(%display_id, width, height, "starting DXGI duplication worker");

        let prefer_gpu = matches!(self.requested_video.output_preference, scrcap_core::OutputPreference::Gpu);
        let stop = StopSignal::default();
        let running_flag = self.running_flag.clone();
        let negotiated = self.negotiated.clone();
        let target_fps = self.target_fps;
        let stop_for_thread = stop.clone();

        running_flag.store(true, Ordering::SeqCst);
        let worker = std::thread::Builder::new()
            .name("scrcap-dxgi-worker".into())
            .spawn(move || {
                run_worker(
                    device,
                    context,
                    duplication,
                    display_id,
                    width,
                    height,
                    prefer_gpu,
                    target_fps,
                    registry,
                    callback,
                    negotiated,
                    stop_for_thread,
                );
                running_flag.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::SystemCallFailed(format!("failed to spawn DXGI worker: {e}")))?;

        self.session = Some(RunningSession {
            worker: Some(worker),
            stop,
        });
        Ok(())
    }

    fn stop(&mut self) -> CoreResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session.stop.signal();
        if let Some(handle) = session.worker.take() {
            let _ = handle.join();
        }
        self.running_flag.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running_flag.load(Ordering::SeqCst)
    }

    fn negotiated_video_format(&self) -> NegotiatedVideoFormat {
        *self.negotiated.lock()
    }

    fn last_error(&self) -> Option<CaptureError> {
        // The duplication worker's only failure mode is access-loss
        // recovery exhausting itself, which already drives `running_flag`
        // to false; it has no asynchronous error source of its own to
        // report beyond that.
        None
    }
}
