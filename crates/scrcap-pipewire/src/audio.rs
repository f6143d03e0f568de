//! The optional audio stream (§4.3 "Audio stream").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use pipewire::spa::utils::Direction;
use pipewire::stream::{Stream, StreamFlags, StreamListener, StreamState};
use tracing::debug;

use scrcap_core::{AudioInfo, BufferType, ContentType, FrameBuffer, FrameCallback, PayloadRegistry, Plane, PlanePtr, RequestedAudioFormat};

use crate::error::{PipeWireError, Result};
use crate::process::{build_audio_info, extract_timestamp};

pub struct AudioStreamShared {
    pub format: RequestedAudioFormat,
    pub active: AtomicBool,
    pub registry: Arc<PayloadRegistry>,
    pub callback: FrameCallback,
}

/// Create and connect the audio stream bound to `node_id` (§4.3: "role
/// 'Audio'/'Capture'/'ScreenAudio' and similar connect flags").
pub(crate) fn create_audio_stream(
    core: &pipewire::core::Core,
    node_id: u32,
    requested: RequestedAudioFormat,
    shared: Arc<AudioStreamShared>,
) -> Result<(Stream, StreamListener<Arc<AudioStreamShared>>)> {
    let properties = pipewire::properties::properties! {
        *pipewire::keys::MEDIA_TYPE => "Audio",
        *pipewire::keys::MEDIA_CATEGORY => "Capture",
        *pipewire::keys::MEDIA_ROLE => "ScreenAudio",
    };

    let stream =
        Stream::new(core, "scrcap-audio", properties).map_err(|e| PipeWireError::StreamCreationFailed(e.to_string()))?;

    let state_shared = shared.clone();
    let process_shared = shared.clone();

    let listener = stream
        .add_local_listener_with_user_data(shared)
        .state_changed(move |_stream, _data, old, new| {
            debug!(?old, ?new, "audio stream state changed");
            match new {
                StreamState::Streaming => state_shared.active.store(true, Ordering::SeqCst),
                StreamState::Unconnected | StreamState::Error(_) => {
                    state_shared.active.store(false, Ordering::SeqCst);
                }
                StreamState::Paused | StreamState::Connecting => {}
            }
        })
        .process(move |stream, _data| {
            process_audio_buffer(stream, &process_shared);
        })
        .register()
        .map_err(|e| PipeWireError::StreamCreationFailed(e.to_string()))?;

    let mut params = crate::format::build_audio_params(requested)?;
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

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Audio frames are always CPU-only (§4.3 "On dequeue, audio frames are
/// CPU-only").
fn process_audio_buffer(stream: &pipewire::stream::StreamRef, shared: &AudioStreamShared) {
    let Some(mut buffer) = stream.dequeue_buffer() else {
        return;
    };
    let timestamp_us = extract_timestamp(&buffer).unwrap_or_else(now_micros);
    let datas = buffer.datas_mut();
    let Some(first) = datas.first() else { return };
    let Some(slice) = first.data() else { return };
    if slice.is_empty() {
        return;
    }

    let info: AudioInfo = build_audio_info(slice.len(), shared.format);
    let plane = Plane {
        ptr: PlanePtr::Host(slice.as_ptr()),
        width: 0,
        height: 0,
        stride: 0,
        offset: 0,
        subresource_index: 0,
    };

    let payload = scrcap_core::ReleasePayload::new(BufferType::Audio);
    let handle = shared.registry.register(payload);

    let frame = FrameBuffer {
        buffer_type: BufferType::Audio,
        content_type: ContentType::Cpu,
        timestamp_us,
        video_info: None,
        audio_info: Some(info),
        planes: vec![plane],
        total_size: slice.len(),
        internal_handle: handle,
        user_data: 0,
    };

    (shared.callback)(frame);
}
