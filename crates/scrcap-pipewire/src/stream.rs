//! The video stream: creation, format negotiation, and buffer bookkeeping
//! (§4.3 "Video stream setup", "Format negotiation", "Buffer bookkeeping").

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pipewire::spa::param::video::VideoFormat as SpaVideoFormat;
use pipewire::spa::param::video::VideoInfoRaw;
use pipewire::spa::param::ParamType;
use pipewire::spa::pod::Pod;
use pipewire::spa::utils::Direction;
use pipewire::stream::{Stream, StreamFlags, StreamListener, StreamState};
use tracing::{debug, info, warn};

use scrcap_core::{
    FrameCallback, FrameRate, NegotiatedVideoFormat, OutputPreference, PayloadRegistry,
    PixelFormat, RequestedVideoFormat,
};

use crate::config::MAX_BUFFERS;
use crate::error::{PipeWireError, Result};
use crate::process::process_video_buffer;
use crate::thread::WakePipeWriter;

/// Where the video stream records the error that put it into
/// [`VideoStreamState::Error`], shared with the I/O thread's handle so an
/// application polling `Engine::last_error()` can see it (§4.2/§7).
pub(crate) type SharedLastError = Arc<Mutex<Option<PipeWireError>>>;

/// Mirrors §4.3's stream-state vocabulary; `Error` is added so the I/O
/// thread can record why the producer side stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStreamState {
    Unconnected,
    Connecting,
    Paused,
    Streaming,
    Error,
}

/// One tracked `pw_buffer` slot (§4.3 "Buffer bookkeeping"), keyed by the
/// buffer pointer's address (stable for the buffer's lifetime between
/// `add_buffer` and `remove_buffer`).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BufferMeta {
    pub fd: Option<RawFd>,
}

/// Bookkeeping table bounded at [`MAX_BUFFERS`] entries.
#[derive(Debug, Default)]
pub(crate) struct BufferTable {
    slots: HashMap<usize, BufferMeta>,
}

impl BufferTable {
    pub fn add_buffer(&mut self, key: usize, meta: BufferMeta) {
        if self.slots.len() >= MAX_BUFFERS as usize && !self.slots.contains_key(&key) {
            warn!("buffer bookkeeping table full at {MAX_BUFFERS} entries, ignoring add_buffer");
            return;
        }
        self.slots.insert(key, meta);
    }

    pub fn remove_buffer(&mut self, key: usize) {
        self.slots.remove(&key);
    }

    pub fn get(&self, key: usize) -> Option<BufferMeta> {
        self.slots.get(&key).copied()
    }
}

/// State shared between the `process` callback and whoever queries the
/// negotiated format from outside the I/O thread.
pub struct VideoStreamShared {
    pub negotiated: Mutex<NegotiatedVideoFormat>,
    pub(crate) buffers: Mutex<BufferTable>,
    pub is_dmabuf: AtomicBool,
    pub video_active: AtomicBool,
    pub registry: Arc<PayloadRegistry>,
    pub callback: FrameCallback,
    pub output_preference: OutputPreference,
    pub(crate) last_error: SharedLastError,
}

fn spa_video_format_to_pixel_format(format: SpaVideoFormat) -> PixelFormat {
    match format {
        SpaVideoFormat::BGRA => PixelFormat::Bgra32,
        SpaVideoFormat::RGBA => PixelFormat::Rgba32,
        SpaVideoFormat::ARGB => PixelFormat::Argb32,
        SpaVideoFormat::ABGR => PixelFormat::Abgr32,
        SpaVideoFormat::BGRx => PixelFormat::Bgrx32,
        SpaVideoFormat::RGB => PixelFormat::Rgb24,
        SpaVideoFormat::BGR => PixelFormat::Bgr24,
        SpaVideoFormat::I420 => PixelFormat::I420,
        SpaVideoFormat::NV12 => PixelFormat::Nv12,
        SpaVideoFormat::NV21 => PixelFormat::Nv21,
        SpaVideoFormat::YUY2 => PixelFormat::Yuy2,
        SpaVideoFormat::UYVY => PixelFormat::Uyvy,
        SpaVideoFormat::MJPG => PixelFormat::Mjpeg,
        _ => PixelFormat::Unknown,
    }
}

/// Parse the `param_changed` EnumFormat pod into a [`NegotiatedVideoFormat`]
/// (§4.3 "Format negotiation").
///
/// Returns `None` when the pod is not raw-video or carries zero dimensions,
/// in which case the caller resets the negotiated format to `Unknown`.
fn parse_video_format_pod(pod: &Pod) -> Option<NegotiatedVideoFormat> {
    let mut info = VideoInfoRaw::new();
    info.parse(pod).ok()?;
    let size = info.size();
    if size.width == 0 || size.height == 0 {
        return None;
    }
    let rate = info.framerate();
    Some(NegotiatedVideoFormat {
        pixel_format: spa_video_format_to_pixel_format(info.format()),
        width: size.width,
        height: size.height,
        frame_rate: FrameRate::new(rate.num, rate.denom),
        drm_modifier: info.modifier(),
    })
}

/// Build and connect the video stream (§4.3 "Video stream setup").
///
/// Must be called on the PipeWire I/O thread; `Stream` and its listener are
/// not `Send`.
pub(crate) fn create_video_stream(
    core: &pipewire::core::Core,
    node_id: u32,
    requested: RequestedVideoFormat,
    shared: Arc<VideoStreamShared>,
    wake: WakePipeWriter,
) -> Result<(Stream, StreamListener<Arc<VideoStreamShared>>)> {
    let properties = pipewire::properties::properties! {
        *pipewire::keys::MEDIA_TYPE => "Video",
        *pipewire::keys::MEDIA_CATEGORY => "Capture",
        *pipewire::keys::MEDIA_ROLE => "Screen",
    };

    let stream = Stream::new(core, "scrcap-video", properties)
        .map_err(|e| PipeWireError::StreamCreationFailed(e.to_string()))?;

    let state_shared = shared.clone();
    let process_shared = shared.clone();

    let listener = stream
        .add_local_listener_with_user_data(shared)
        .state_changed(move |_stream, _data, old, new| {
            debug!(?old, ?new, "video stream state changed");
            match new {
                StreamState::Error(msg) => {
                    warn!(msg, "video stream entered Error state");
                    state_shared.video_active.store(false, Ordering::SeqCst);
                    *state_shared.last_error.lock() = Some(PipeWireError::StreamCreationFailed(msg.to_string()));
                    if let Err(e) = wake.signal_error() {
                        warn!(error = %e, "failed to signal wake pipe after stream error");
                    }
                }
                StreamState::Unconnected => {
                    state_shared.video_active.store(false, Ordering::SeqCst);
                }
                StreamState::Streaming => {
                    state_shared.video_active.store(true, Ordering::SeqCst);
                }
                StreamState::Paused | StreamState::Connecting => {}
            }
        })
        .param_changed(move |_stream, data, id, pod| {
            if id != ParamType::Format.as_raw() {
                return;
            }
            let Some(pod) = pod else { return };
            match parse_video_format_pod(pod) {
                Some(format) => {
                    info!(?format, "negotiated video format");
                    *data.negotiated.lock() = format;
                }
                None => {
                    warn!("param_changed carried a non-raw-video or zero-sized format");
                    *data.negotiated.lock() = NegotiatedVideoFormat::default();
                }
            }
        })
        .add_buffer(move |_stream, data, buffer| {
            let key = buffer as usize;
            let fd = first_plane_fd(buffer);
            data.buffers.lock().add_buffer(key, BufferMeta { fd });
            if fd.is_some() {
                data.is_dmabuf.store(true, Ordering::Relaxed);
            }
        })
        .remove_buffer(move |_stream, data, buffer| {
            data.buffers.lock().remove_buffer(buffer as usize);
        })
        .process(move |stream, _data| {
            process_video_buffer(stream, &process_shared);
        })
        .register()
        .map_err(|e| PipeWireError::StreamCreationFailed(e.to_string()))?;

    let mut params = crate::format::build_video_params(requested)?;
    stream
        .connect(
            Direction::Input,
            Some(node_id),
            StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS | StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| PipeWireError::StreamCreationFailed(e.to_string()))?;

    Ok((stream, listener))
}

/// Extract the raw fd backing data plane 0, if this buffer's chunk type is
/// DmaBuf or MemFd (§4.3 "Buffer bookkeeping").
fn first_plane_fd(buffer: *mut pipewire::sys::pw_buffer) -> Option<RawFd> {
    // SAFETY: `buffer` is a valid, non-null `pw_buffer*` for the duration
    // of the `add_buffer`/`remove_buffer` callback that calls this helper;
    // PipeWire guarantees `buffer` and its `n_datas` data entries stay
    // alive until the matching `remove_buffer` call.
    unsafe {
        let spa_buffer = (*buffer).buffer;
        if spa_buffer.is_null() || (*spa_buffer).n_datas == 0 {
            return None;
        }
        let first = &*(*spa_buffer).datas;
        match first.type_ {
            t if t == libspa_sys::SPA_DATA_DmaBuf || t == libspa_sys::SPA_DATA_MemFd => {
                Some(first.fd as RawFd)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_table_add_then_remove() {
        let mut table = BufferTable::default();
        table.add_buffer(0x1000, BufferMeta { fd: Some(7) });
        assert_eq!(table.get(0x1000).unwrap().fd, Some(7));
        table.remove_buffer(0x1000);
        assert!(table.get(0x1000).is_none());
    }

    #[test]
    fn buffer_table_caps_at_max_buffers() {
        let mut table = BufferTable::default();
        for i in 0..(MAX_BUFFERS as usize + 4) {
            table.add_buffer(i, BufferMeta { fd: None });
        }
        assert_eq!(table.slots.len(), MAX_BUFFERS as usize);
    }
}
