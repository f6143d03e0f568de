//! Building the pod parameters proposed to a PipeWire stream at `connect`
//! time (§4.3 "Video stream setup": "a Buffers param... and an EnumFormat
//! param...").

use pipewire::spa::param::video::VideoFormat as SpaVideoFormat;
use pipewire::spa::pod::serialize::PodSerializer;
use pipewire::spa::pod::{self, Pod};
use pipewire::spa::sys;
use pipewire::spa::utils::{Choice, ChoiceValue, Fraction, Rectangle};

use scrcap_core::{OutputPreference, PixelFormat, RequestedAudioFormat, RequestedVideoFormat, SampleFormat};

use crate::config::MAX_BUFFERS;
use crate::error::{PipeWireError, Result};

fn pixel_format_to_spa(format: PixelFormat) -> SpaVideoFormat {
    match format {
        PixelFormat::Bgra32 => SpaVideoFormat::BGRA,
        PixelFormat::Rgba32 => SpaVideoFormat::RGBA,
        PixelFormat::Argb32 => SpaVideoFormat::ARGB,
        PixelFormat::Abgr32 => SpaVideoFormat::ABGR,
        PixelFormat::Bgrx32 => SpaVideoFormat::BGRx,
        PixelFormat::Rgb24 => SpaVideoFormat::RGB,
        PixelFormat::Bgr24 => SpaVideoFormat::BGR,
        PixelFormat::I420 => SpaVideoFormat::I420,
        PixelFormat::Nv12 => SpaVideoFormat::NV12,
        PixelFormat::Nv21 => SpaVideoFormat::NV21,
        PixelFormat::Yuy2 => SpaVideoFormat::YUY2,
        PixelFormat::Uyvy => SpaVideoFormat::UYVY,
        PixelFormat::Mjpeg => SpaVideoFormat::MJPG,
        PixelFormat::Unknown => SpaVideoFormat::BGRA,
    }
}

fn serialize_pod(object: pod::Object) -> Result<Box<Pod>> {
    let bytes = PodSerializer::serialize(std::io::Cursor::new(Vec::new()), &pod::Value::Object(object))
        .map_err(|e| PipeWireError::NegotiationFailed(format!("pod serialization failed: {e:?}")))?
        .0
        .into_inner();
    Ok(Pod::from_bytes(&bytes)
        .ok_or_else(|| PipeWireError::NegotiationFailed("built an invalid pod".into()))?
        .to_owned())
}

/// Build the Buffers + EnumFormat params proposed at `Stream::connect`
/// (§4.3): a Buffers param (1..MAX blocks, data-type choice enabling
/// DmaBuf/MemFd/MemPtr) and an EnumFormat param (raw video, requested
/// pixel format and frame rate; a modifier choice of "any" when the client
/// prefers GPU output).
pub(crate) fn build_video_params(requested: RequestedVideoFormat) -> Result<Vec<Box<Pod>>> {
    let format = requested.with_defaults_applied();

    let data_type_mask = (1 << libspa_sys::SPA_DATA_DmaBuf)
        | (1 << libspa_sys::SPA_DATA_MemFd)
        | (1 << libspa_sys::SPA_DATA_MemPtr);

    let buffers = pod::object!(
        sys::SPA_TYPE_OBJECT_ParamBuffers,
        sys::SPA_PARAM_Buffers,
        pod::property!(sys::SPA_PARAM_BUFFERS_buffers, Int, Choice::Range(1, 1, MAX_BUFFERS as i32)),
        pod::property!(sys::SPA_PARAM_BUFFERS_dataType, Int, data_type_mask as i32),
    );

    let mut format_props = vec![
        pod::property!(sys::SPA_FORMAT_mediaType, Id, sys::SPA_MEDIA_TYPE_video),
        pod::property!(sys::SPA_FORMAT_mediaSubtype, Id, sys::SPA_MEDIA_SUBTYPE_raw),
        pod::property!(
            sys::SPA_FORMAT_VIDEO_format,
            Id,
            pixel_format_to_spa(format.pixel_format)
        ),
        pod::property!(
            sys::SPA_FORMAT_VIDEO_size,
            Rectangle,
            Rectangle { width: format.width, height: format.height }
        ),
        pod::property!(
            sys::SPA_FORMAT_VIDEO_framerate,
            Fraction,
            Fraction { num: format.frame_rate.numerator, denom: format.frame_rate.denominator }
        ),
    ];
    if matches!(format.output_preference, OutputPreference::Gpu) {
        // §4.3 "a modifier choice of 'any'": an Enum choice whose first
        // value is the default PipeWire falls back to and whose remaining
        // values are the other modifiers we accept, so the producer is
        // free to hand back any tiled/compressed layout instead of being
        // forced down to a linear-only negotiation.
        format_props.push(pod::property!(
            sys::SPA_FORMAT_VIDEO_modifier,
            Choice,
            ChoiceValue::Long(Choice::from(vec![
                scrcap_core::DRM_FORMAT_MOD_INVALID as i64,
                scrcap_core::DRM_FORMAT_MOD_INVALID as i64,
                scrcap_core::DRM_FORMAT_MOD_LINEAR as i64,
            ]))
        ));
    }
    let enum_format = pod::Object {
        type_: sys::SPA_TYPE_OBJECT_Format,
        id: sys::SPA_PARAM_EnumFormat,
        properties: format_props,
    };

    Ok(vec![serialize_pod(buffers)?, serialize_pod(enum_format)?])
}

/// Build the format param proposed for the audio stream (§4.3 "Audio
/// stream"): requested `{format, channels, rate}`, F32-LE default.
pub(crate) fn build_audio_params(requested: RequestedAudioFormat) -> Result<Vec<Box<Pod>>> {
    let spa_format = match requested.sample_format {
        SampleFormat::U8 => sys::SPA_AUDIO_FORMAT_U8,
        SampleFormat::S16 => sys::SPA_AUDIO_FORMAT_S16_LE,
        SampleFormat::S32 => sys::SPA_AUDIO_FORMAT_S32_LE,
        SampleFormat::F32 => sys::SPA_AUDIO_FORMAT_F32_LE,
    };
    let object = pod::object!(
        sys::SPA_TYPE_OBJECT_Format,
        sys::SPA_PARAM_EnumFormat,
        pod::property!(sys::SPA_FORMAT_mediaType, Id, sys::SPA_MEDIA_TYPE_audio),
        pod::property!(sys::SPA_FORMAT_mediaSubtype, Id, sys::SPA_MEDIA_SUBTYPE_raw),
        pod::property!(sys::SPA_FORMAT_AUDIO_format, Id, spa_format),
        pod::property!(sys::SPA_FORMAT_AUDIO_rate, Int, requested.sample_rate as i32),
        pod::property!(sys::SPA_FORMAT_AUDIO_channels, Int, i32::from(requested.channels)),
    );
    Ok(vec![serialize_pod(object)?])
}
