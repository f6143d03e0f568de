//! The frame-processing algorithm run from the stream's `process` callback
//! (§4.3 "Frame-processing algorithm (per dequeued buffer)").

use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use pipewire::stream::{Stream, StreamRef};
use tracing::warn;

use scrcap_core::{
    AudioInfo, BufferType, ContentType, FrameBuffer, Plane, PlanePtr, ReleasePayload, SampleFormat,
    VideoInfo,
};

use crate::payload::{duplicate_fd_cloexec, LinuxFramePayload};
use crate::stream::VideoStreamShared;

/// DRM_FORMAT_MOD_LINEAR, re-exported here for readability at call sites
/// that compare against it directly (the canonical constant lives in
/// `scrcap_core::format`).
const DRM_FORMAT_MOD_LINEAR: u64 = scrcap_core::DRM_FORMAT_MOD_LINEAR;

/// Current wall time in microseconds, used as the timestamp fallback of
/// last resort (§4.3 step 2).
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Step 1-7 of §4.3's algorithm for one dequeued video buffer.
pub(crate) fn process_video_buffer(stream: &StreamRef, shared: &VideoStreamShared) {
    let Some(mut buffer) = stream.dequeue_buffer() else {
        return;
    };

    let datas = buffer.datas_mut();
    if datas.is_empty() {
        // Step 1: no data planes, re-queue and continue.
        return;
    }

    let negotiated = *shared.negotiated.lock();
    let timestamp_us = extract_timestamp(&buffer).unwrap_or_else(now_micros);

    let first = &datas[0];
    let chunk = first.chunk();
    if chunk.size() == 0 {
        return;
    }

    let outcome = match first.type_() {
        pipewire::spa::buffer::DataType::DmaBuf => {
            build_dmabuf_frame(first.as_raw().fd as RawFd, negotiated, shared.output_preference)
        }
        pipewire::spa::buffer::DataType::MemFd => {
            build_memfd_frame(first.as_raw().fd as RawFd, chunk.size() as usize, negotiated)
        }
        pipewire::spa::buffer::DataType::MemPtr => first
            .data()
            .map(|slice| build_memptr_frame(slice, negotiated)),
        _ => None,
    };

    let Some((content_type, planes, payload)) = outcome else {
        // Step 3 "Other": skip frame. Step 6 also lands here when an
        // allocation step above failed and returned None.
        return;
    };

    let total_size = planes.iter().map(|p| p.stride as usize * p.height as usize).sum();
    let release_payload = ReleasePayload::new(BufferType::Video).with_native_resource(payload);
    let handle = shared.registry.register(release_payload);

    let frame = FrameBuffer {
        buffer_type: BufferType::Video,
        content_type,
        timestamp_us,
        video_info: Some(VideoInfo { format: negotiated }),
        audio_info: None,
        planes,
        total_size,
        internal_handle: handle,
        user_data: 0,
    };

    // Step 5: invoke the callback; ownership of `frame` (and the resources
    // backing `handle`) has passed to the application.
    (shared.callback)(frame);

    // Step 7: re-queue happens when `buffer` drops (pipewire-rs queues a
    // dequeued buffer back to the stream on `Drop` of the guard).
}

pub(crate) fn extract_timestamp(buffer: &pipewire::buffer::Buffer) -> Option<u64> {
    buffer
        .meta_header()
        .filter(|h| h.pts >= 0)
        .map(|h| h.pts as u64)
        .or_else(|| {
            let time = buffer.as_raw().time;
            if time > 0 {
                Some(time as u64)
            } else {
                None
            }
        })
}

type FrameParts = (ContentType, Vec<Plane>, Box<dyn scrcap_core::FramePayload>);

/// DmaBuf data plane (§4.3 step 3, both GPU- and CPU-preferring branches).
fn build_dmabuf_frame(
    fd: RawFd,
    negotiated: scrcap_core::NegotiatedVideoFormat,
    preference: scrcap_core::OutputPreference,
) -> Option<FrameParts> {
    match preference {
        scrcap_core::OutputPreference::Gpu => {
            let dup_fd = duplicate_fd_cloexec(fd).ok()?;
            let planes = fill_planes(negotiated, PlanePtr::Fd(dup_fd.as_raw_fd()));
            Some((
                ContentType::GpuDmaBufFd,
                planes,
                Box::new(LinuxFramePayload::Gpu { dup_fd }),
            ))
        }
        scrcap_core::OutputPreference::Cpu => {
            if negotiated.drm_modifier != Some(DRM_FORMAT_MOD_LINEAR) {
                warn!("DmaBuf plane is not linearly tiled, skipping frame for CPU delivery");
                return None;
            }
            let data = mmap_copy_dmabuf(fd, negotiated)?;
            let planes = fill_planes(negotiated, PlanePtr::Host(data.as_ptr()));
            Some((
                ContentType::Cpu,
                planes,
                Box::new(LinuxFramePayload::Cpu { data }),
            ))
        }
    }
}

/// `mmap` the DMABUF read-only, sync-start, copy, sync-end, `munmap`
/// (§4.3 step 3, DmaBuf+CPU branch).
fn mmap_copy_dmabuf(fd: RawFd, negotiated: scrcap_core::NegotiatedVideoFormat) -> Option<Vec<u8>> {
    let size = total_bytes(negotiated);
    if size == 0 {
        return None;
    }
    // SAFETY: `fd` is a valid DMABUF descriptor for the duration of this
    // call (owned by the currently-dequeued `pw_buffer`); the mapping is
    // unmapped before returning, on every path.
    unsafe {
        let map = nix::sys::mman::mmap(
            None,
            std::num::NonZeroUsize::new(size)?,
            nix::sys::mman::ProtFlags::PROT_READ,
            nix::sys::mman::MapFlags::MAP_SHARED,
            fd,
            0,
        )
        .ok()?;
        let _ = dmabuf_sync(fd, true);
        let mut data = vec![0u8; size];
        std::ptr::copy_nonoverlapping(map.as_ptr().cast::<u8>(), data.as_mut_ptr(), size);
        let _ = dmabuf_sync(fd, false);
        let _ = nix::sys::mman::munmap(map, size);
        Some(data)
    }
}

/// Issue DMA_BUF_IOCTL_SYNC; ENOTTY ("not supported") is treated as success
/// so the copy proceeds anyway (§4.3 step 3).
fn dmabuf_sync(fd: RawFd, start: bool) -> nix::Result<()> {
    const DMA_BUF_SYNC_READ: u64 = 1 << 0;
    const DMA_BUF_SYNC_START: u64 = 0;
    const DMA_BUF_SYNC_END: u64 = 1 << 2;

    #[repr(C)]
    struct DmaBufSync {
        flags: u64,
    }

    let flags = DMA_BUF_SYNC_READ | if start { DMA_BUF_SYNC_START } else { DMA_BUF_SYNC_END };
    let sync = DmaBufSync { flags };
    // SAFETY: `fd` is a valid DMABUF descriptor; `sync` is a correctly
    // shaped `dma_buf_sync` argument for this fixed ioctl number.
    let result = unsafe { libc::ioctl(fd, dma_buf_sync_ioctl_nr(), std::ptr::addr_of!(sync)) };
    if result < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOTTY) {
            return Ok(());
        }
        return Err(nix::Error::from_i32(err.raw_os_error().unwrap_or(libc::EIO)));
    }
    Ok(())
}

const fn dma_buf_sync_ioctl_nr() -> libc::c_ulong {
    // DMA_BUF_IOCTL_SYNC, computed the same way `linux/dma-buf.h` does via
    // `_IOW(DMA_BUF_BASE, 0, struct dma_buf_sync)`.
    0x40086200
}

/// MemFd data plane: `mmap`, copy to host, `munmap` (§4.3 step 3, MemFd
/// branch).
fn build_memfd_frame(
    fd: RawFd,
    size: usize,
    negotiated: scrcap_core::NegotiatedVideoFormat,
) -> Option<FrameParts> {
    if size == 0 {
        return None;
    }
    // SAFETY: `fd` is a valid memfd-backed descriptor owned by the
    // currently-dequeued `pw_buffer`; unmapped before returning.
    let data = unsafe {
        let map = nix::sys::mman::mmap(
            None,
            std::num::NonZeroUsize::new(size)?,
            nix::sys::mman::ProtFlags::PROT_READ,
            nix::sys::mman::MapFlags::MAP_SHARED,
            fd,
            0,
        )
        .ok()?;
        let mut data = vec![0u8; size];
        std::ptr::copy_nonoverlapping(map.as_ptr().cast::<u8>(), data.as_mut_ptr(), size);
        let _ = nix::sys::mman::munmap(map, size);
        data
    };
    let planes = fill_planes(negotiated, PlanePtr::Host(data.as_ptr()));
    Some((ContentType::Cpu, planes, Box::new(LinuxFramePayload::Cpu { data })))
}

/// MemPtr data plane: zero-copy pointer into PipeWire-owned memory; release
/// is a no-op for the data itself (§4.3 step 3, MemPtr branch).
fn build_memptr_frame(
    slice: &[u8],
    negotiated: scrcap_core::NegotiatedVideoFormat,
) -> Option<FrameParts> {
    let planes = fill_planes(negotiated, PlanePtr::Host(slice.as_ptr()));
    Some((ContentType::Cpu, planes, Box::new(MemPtrPayload)))
}

/// No-op payload for zero-copy `MemPtr` frames: the pointed-to memory is
/// owned by PipeWire, not by this frame.
#[derive(Debug)]
struct MemPtrPayload;

impl scrcap_core::FramePayload for MemPtrPayload {
    fn release(self: Box<Self>) {}
}

fn total_bytes(negotiated: scrcap_core::NegotiatedVideoFormat) -> usize {
    negotiated
        .pixel_format
        .plane_layout(negotiated.width, negotiated.height)
        .into_iter()
        .map(|p| p.stride as usize * p.height as usize)
        .sum()
}

/// Fill every plane's geometry from the pixel-format lookup table, with
/// `base` as the single backing pointer/fd/handle for all planes at their
/// respective byte offsets (§4.3 "Plane Derivation").
fn fill_planes(negotiated: scrcap_core::NegotiatedVideoFormat, base: PlanePtr) -> Vec<Plane> {
    negotiated
        .pixel_format
        .plane_layout(negotiated.width, negotiated.height)
        .into_iter()
        .map(|layout| Plane {
            ptr: offset_plane_ptr(base, layout.offset),
            width: layout.width,
            height: layout.height,
            stride: layout.stride,
            offset: layout.offset,
            subresource_index: 0,
        })
        .collect()
}

fn offset_plane_ptr(base: PlanePtr, offset: usize) -> PlanePtr {
    match base {
        PlanePtr::Host(ptr) => PlanePtr::Host(ptr.wrapping_add(offset)),
        other => other,
    }
}

/// §4.3 "Audio stream" dequeue: CPU-only, frame count = data_size / (channels * sample_size).
pub(crate) fn build_audio_info(
    data_size: usize,
    format: scrcap_core::RequestedAudioFormat,
) -> AudioInfo {
    let sample_size = match format.sample_format {
        SampleFormat::U8 => 1,
        SampleFormat::S16 => 2,
        SampleFormat::S32 | SampleFormat::F32 => 4,
    };
    let frame_size = sample_size * usize::from(format.channels).max(1);
    AudioInfo {
        format,
        frame_count: if frame_size == 0 { 0 } else { data_size / frame_size },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrcap_core::{FrameRate, NegotiatedVideoFormat, PixelFormat};

    #[test]
    fn fill_planes_i420_offsets_are_contiguous() {
        let negotiated = NegotiatedVideoFormat {
            pixel_format: PixelFormat::I420,
            width: 64,
            height: 32,
            frame_rate: FrameRate::default(),
            drm_modifier: None,
        };
        let planes = fill_planes(negotiated, PlanePtr::Host(std::ptr::null()));
        assert_eq!(planes.len(), 3);
        assert!(planes[1].offset > planes[0].offset);
        assert!(planes[2].offset > planes[1].offset);
    }

    #[test]
    fn audio_frame_count_divides_by_channel_and_sample_size() {
        let format = scrcap_core::RequestedAudioFormat {
            sample_format: SampleFormat::F32,
            channels: 2,
            sample_rate: 48_000,
        };
        let info = build_audio_info(48_000 * 4 * 2, format);
        assert_eq!(info.frame_count, 48_000);
    }

    #[test]
    fn audio_frame_count_zero_channels_does_not_divide_by_zero() {
        let format = scrcap_core::RequestedAudioFormat {
            sample_format: SampleFormat::S16,
            channels: 0,
            sample_rate: 48_000,
        };
        let info = build_audio_info(1000, format);
        assert_eq!(info.frame_count, 500);
    }
}
