//! [`WgcCaptureBackend`]: the Windows.Graphics.Capture
//! [`scrcap_core::CaptureBackend`] (§4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession};
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11DeviceContext};
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDevice;

use scrcap_core::{
    CaptureBackend, CaptureError, CaptureTarget, FrameCallback, LoopbackAudioSource,
    NegotiatedVideoFormat, OutputPreference, PayloadRegistry, PixelFormat, RequestedAudioFormat,
    RequestedVideoFormat, Result as CoreResult, WgcDeviceId,
};

use crate::device::{create_capture_item, create_devices, ensure_apartment_initialized};
use crate::loopback::{loopback_target_device_id, start_loopback, stop_loopback};
use crate::session::{start_session, SessionShared};

/// Keeps the WinRT objects a running session owns alive; dropping this
/// stops frame delivery and releases the pool/session.
struct RunningSession {
    #[allow(dead_code)]
    session: GraphicsCaptureSession,
    #[allow(dead_code)]
    pool: Direct3D11CaptureFramePool,
    shared: Arc<Mutex<SessionShared>>,
}

pub struct WgcCaptureBackend {
    target: Option<CaptureTarget>,
    requested_video: RequestedVideoFormat,
    requested_audio: Option<RequestedAudioFormat>,
    negotiated: Arc<Mutex<NegotiatedVideoFormat>>,
    running_flag: Arc<AtomicBool>,
    session: Option<RunningSession>,
    loopback: Option<Box<dyn LoopbackAudioSource>>,
}

impl Default for WgcCaptureBackend {
    fn default() -> Self {
        Self {
            target: None,
            requested_video: RequestedVideoFormat::default(),
            requested_audio: None,
            negotiated: Arc::new(Mutex::new(NegotiatedVideoFormat::default())),
            running_flag: Arc::new(AtomicBool::new(false)),
            session: None,
            loopback: None,
        }
    }
}

impl WgcCaptureBackend {
    /// Install the external loopback-audio collaborator this backend
    /// drives when audio is requested (§4.5 "Audio coupling"). The
    /// loopback implementation itself is out of scope for this crate.
    pub fn set_loopback_source(&mut self, source: Box<dyn LoopbackAudioSource>) {
        self.loopback = Some(source);
    }
}

impl CaptureBackend for WgcCaptureBackend {
    fn configure(
        &mut self,
        target: CaptureTarget,
        video: RequestedVideoFormat,
        audio: Option<RequestedAudioFormat>,
    ) -> CoreResult<()> {
        if matches!(target, CaptureTarget::Region { .. }) {
            return Err(CaptureError::NotSupported(
                "the WGC backend captures whole monitors or windows; crop a region client-side".into(),
            ));
        }
        // Validate the id eagerly so configure-time errors surface before start.
        WgcDeviceId::parse(target.id())?;
        self.target = Some(target);
        self.requested_video = video;
        self.requested_audio = audio;
        Ok(())
    }

    fn start(&mut self, registry: Arc<PayloadRegistry>, callback: FrameCallback) -> CoreResult<()> {
        let target = self.target.clone().ok_or(CaptureError::NotInitialized)?;
        if self.running_flag.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let device_id = WgcDeviceId::parse(target.id())?;
        let audio_requested = self.requested_audio.is_some();
        let loopback_target = loopback_target_device_id(&target, device_id);

        if audio_requested {
            match self.loopback.as_deref_mut() {
                Some(source) => start_loopback(source, loopback_target.as_deref())?,
                None => warn!("audio requested but no loopback source is installed; continuing video-only"),
            }
        }

        match self.start_video(device_id, registry, callback) {
            Ok(session) => {
                self.session = Some(session);
                self.running_flag.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                // §4.5: "if the session fails to start, audio is stopped".
                if audio_requested {
                    if let Some(source) = self.loopback.as_deref_mut() {
                        let _ = stop_loopback(source);
                    }
                }
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> CoreResult<()> {
        self.running_flag.store(false, Ordering::SeqCst);
        if let Some(session) = self.session.take() {
            session.shared.lock().is_streaming = false;
            drop(session);
        }
        // §4.5 "on normal stop, video resources are torn down first, then audio".
        if self.requested_audio.is_some() {
            if let Some(source) = self.loopback.as_deref_mut() {
                stop_loopback(source)?;
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running_flag.load(Ordering::SeqCst)
    }

    fn negotiated_video_format(&self) -> NegotiatedVideoFormat {
        *self.negotiated.lock()
    }

    fn last_error(&self) -> Option<CaptureError> {
        // The capture session's frame-arrived handler has no asynchronous
        // failure path of its own to report; closure is observed via
        // `is_running()` going false.
        None
    }
}

impl WgcCaptureBackend {
    fn start_video(
        &mut self,
        device_id: WgcDeviceId,
        registry: Arc<PayloadRegistry>,
        callback: FrameCallback,
    ) -> CoreResult<RunningSession> {
        ensure_apartment_initialized();

        let (device, context, winrt_device): (ID3D11Device, ID3D11DeviceContext, IDirect3DDevice) =
            create_devices().map_err(CaptureError::from)?;
        let (item, size): (GraphicsCaptureItem, windows::Graphics::SizeInt32) =
            create_capture_item(device_id).map_err(CaptureError::from)?;

        let width = size.Width.max(0) as u32;
        let height = size.Height.max(0) as u32;
        if width == 0 || height == 0 {
            return Err(CaptureError::DeviceNotFound(format!("{device_id} reported a zero-size item")));
        }

        let target_fps = self.requested_video.with_defaults_applied().frame_rate.as_fps();
        *self.negotiated.lock() = NegotiatedVideoFormat {
            pixel_format: PixelFormat::Bgra32,
            width,
            height,
            frame_rate: scrcap_core::FrameRate::new(target_fps.round() as u32, 1),
            drm_modifier: None,
        };

        let shared = Arc::new(Mutex::new(SessionShared {
            device,
            context,
            is_streaming: true,
            prefer_gpu: matches!(self.requested_video.output_preference, OutputPreference::Gpu),
            width,
            height,
            registry,
            callback,
            negotiated: self.negotiated.clone(),
        }));

        let (session, pool) =
            start_session(&winrt_device, &item, size, shared.clone()).map_err(CaptureError::from)?;

        info!(%device_id, width, height, "WGC capture session started");
        Ok(RunningSession { session, pool, shared })
    }
}
