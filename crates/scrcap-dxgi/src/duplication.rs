//! The duplication worker thread and per-frame delivery (§4.4 "Worker
//! thread", steps 1-7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D, D3D11_BIND_FLAG,
    D3D11_BIND_SHADER_RESOURCE, D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_RESOURCE_MISC_FLAG,
    D3D11_RESOURCE_MISC_SHARED, D3D11_RESOURCE_MISC_SHARED_NTHANDLE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_DEFAULT, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{IDXGIOutputDuplication, IDXGIResource1, DXGI_OUTDUPL_FRAME_INFO};
use windows::Win32::System::Performance::QueryPerformanceFrequency;
use windows::core::Interface;

use scrcap_core::{
    BufferType, ContentType, FrameBuffer, FrameCallback, FramePayload, NegotiatedVideoFormat,
    PayloadRegistry, Plane, PlanePtr, ReleasePayload, VideoInfo,
};

use crate::device;
use crate::error::{DxgiError, Result};

/// Polling interval while `AcquireNextFrame` keeps timing out or the frame
/// carries no update (§4.4 steps 3 and 4).
const IDLE_SLEEP: Duration = Duration::from_millis(1);
const ACQUIRE_TIMEOUT_MS: u32 = 500;

/// `LastPresentTime` is a raw `QueryPerformanceCounter` tick count, not
/// microseconds; convert using the counter's frequency (ticks/second),
/// queried once since it is constant for the life of the system.
fn qpc_ticks_to_micros(ticks: i64, frequency: i64) -> u64 {
    if frequency <= 0 {
        return 0;
    }
    ((ticks as i128 * 1_000_000) / frequency as i128) as u64
}

/// Owns the shareable/staging GPU resources a delivered frame references
/// (§4.4 step 6): a GPU path holds the shared texture alive; a CPU path
/// holds the per-frame staging texture and its context so it can `Unmap`
/// on release.
#[derive(Debug)]
pub(crate) enum DxgiFramePayload {
    Gpu {
        #[allow(dead_code)]
        texture: ID3D11Texture2D,
    },
    Cpu {
        texture: ID3D11Texture2D,
        context: ID3D11DeviceContext,
    },
}

impl FramePayload for DxgiFramePayload {
    fn release(self: Box<Self>) {
        if let Self::Cpu { texture, context } = *self {
            // SAFETY: `texture` was `Map`-ed exactly once by the producer
            // of this payload and not unmapped since; `context` is the same
            // context that performed the `Map`.
            unsafe {
                context.Unmap(&texture, 0);
            }
        }
    }
}

/// Manual-reset stop signal the control thread flips to end the worker
/// loop (§4.4 "A manual-reset stop event signals termination").
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_signaled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn create_shareable_copy(device: &ID3D11Device, width: u32, height: u32) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: (D3D11_RESOURCE_MISC_SHARED.0 | D3D11_RESOURCE_MISC_SHARED_NTHANDLE.0) as u32,
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
        .map_err(|e| DxgiError::WinApi(format!("CreateTexture2D (shareable): {e}")))?;
    texture.ok_or_else(|| DxgiError::WinApi("CreateTexture2D returned null".into()))
}

fn create_staging_texture(device: &ID3D11Device, width: u32, height: u32) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: D3D11_BIND_FLAG(0).0 as u32,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: D3D11_RESOURCE_MISC_FLAG(0).0 as u32,
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
        .map_err(|e| DxgiError::WinApi(format!("CreateTexture2D (staging): {e}")))?;
    texture.ok_or_else(|| DxgiError::WinApi("CreateTexture2D returned null".into()))
}

/// Build the delivered buffer for one acquired texture, via the GPU path if
/// preferred, falling back to CPU on any failure (§4.4 step 6).
fn build_frame(
    device: &ID3D11Device,
    context: &ID3D11DeviceContext,
    acquired: &ID3D11Texture2D,
    width: u32,
    height: u32,
    prefer_gpu: bool,
) -> Result<(ContentType, Vec<Plane>, Box<dyn FramePayload>)> {
    if prefer_gpu {
        if let Ok(result) = try_gpu_path(device, context, acquired, width, height) {
            return Ok(result);
        }
        warn!("GPU shareable-handle path failed, falling back to CPU path");
    }
    cpu_path(device, context, acquired, width, height)
}

fn try_gpu_path(
    device: &ID3D11Device,
    context: &ID3D11DeviceContext,
    acquired: &ID3D11Texture2D,
    width: u32,
    height: u32,
) -> Result<(ContentType, Vec<Plane>, Box<dyn FramePayload>)> {
    let shareable = create_shareable_copy(device, width, height)?;
    unsafe {
        context.CopyResource(&shareable, acquired);
    }
    let resource1: IDXGIResource1 = shareable
        .cast()
        .map_err(|e| DxgiError::WinApi(format!("IDXGIResource1 cast: {e}")))?;
    let handle: HANDLE = unsafe {
        resource1.CreateSharedHandle(
            None,
            windows::Win32::Storage::FileSystem::FILE_GENERIC_READ.0,
            None,
        )
    }
    .map_err(|e| DxgiError::WinApi(format!("CreateSharedHandle: {e}")))?;

    let stride = width * 4;
    let plane = Plane {
        ptr: PlanePtr::Handle(handle.0 as usize),
        width,
        height,
        stride,
        offset: 0,
        subresource_index: 0,
    };
    Ok((
        ContentType::GpuD3d11Handle,
        vec![plane],
        Box::new(DxgiFramePayload::Gpu { texture: shareable }),
    ))
}

fn cpu_path(
    device: &ID3D11Device,
    context: &ID3D11DeviceContext,
    acquired: &ID3D11Texture2D,
    width: u32,
    height: u32,
) -> Result<(ContentType, Vec<Plane>, Box<dyn FramePayload>)> {
    let staging = create_staging_texture(device, width, height)?;
    unsafe {
        context.CopyResource(&staging, acquired);
    }
    let mapped = unsafe { context.Map(&staging, 0, D3D11_MAP_READ, 0) }
        .map_err(|e| DxgiError::WinApi(format!("Map: {e}")))?;

    let stride = mapped.RowPitch;
    let plane = Plane {
        ptr: PlanePtr::Host(mapped.pData.cast::<u8>()),
        width,
        height,
        stride,
        offset: 0,
        subresource_index: 0,
    };
    Ok((
        ContentType::Cpu,
        vec![plane],
        Box::new(DxgiFramePayload::Cpu {
            texture: staging,
            context: context.clone(),
        }),
    ))
}

/// Run the per-frame worker loop (§4.4 "Worker thread") until `stop` is
/// signaled or an unrecoverable access-loss occurs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_worker(
    mut device: ID3D11Device,
    mut context: ID3D11DeviceContext,
    mut duplication: IDXGIOutputDuplication,
    display_id: scrcap_core::DxgiDisplayId,
    width: u32,
    height: u32,
    prefer_gpu: bool,
    target_fps: f64,
    registry: Arc<PayloadRegistry>,
    callback: FrameCallback,
    negotiated: Arc<parking_lot::Mutex<NegotiatedVideoFormat>>,
    stop: StopSignal,
) {
    let frame_interval = Duration::from_millis((1000.0 / target_fps.max(1.0)) as u64).max(Duration::from_millis(1));

    let mut qpc_frequency: i64 = 0;
    if unsafe { QueryPerformanceFrequency(&mut qpc_frequency) }.is_err() {
        warn!("QueryPerformanceFrequency failed, frame timestamps will read as 0");
    }

    loop {
        if stop.is_signaled() {
            break;
        }

        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut desktop_resource: Option<windows::Win32::Graphics::Dxgi::IDXGIResource> = None;
        let acquire = unsafe { duplication.AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut frame_info, &mut desktop_resource) };

        let resource = match acquire {
            Ok(()) => match desktop_resource {
                Some(r) => r,
                None => {
                    std::thread::sleep(IDLE_SLEEP);
                    continue;
                }
            },
            Err(e) if e.code() == windows::Win32::Graphics::Dxgi::DXGI_ERROR_WAIT_TIMEOUT => {
                std::thread::sleep(IDLE_SLEEP);
                continue;
            }
            Err(e) if e.code() == windows::Win32::Graphics::Dxgi::DXGI_ERROR_ACCESS_LOST => {
                warn!("DXGI access lost, attempting recovery");
                match device::resolve_output(display_id).and_then(|(_, output1, _)| {
                    unsafe { output1.DuplicateOutput(&device) }
                        .map_err(|e| DxgiError::DuplicationFailed(e.to_string()))
                }) {
                    Ok(new_dup) => {
                        duplication = new_dup;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "access-lost recovery failed, stopping worker");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "AcquireNextFrame failed");
                std::thread::sleep(frame_interval);
                continue;
            }
        };

        if frame_info.LastPresentTime == 0 {
            let _ = unsafe { duplication.ReleaseFrame() };
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        let texture: ID3D11Texture2D = match resource.cast() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "acquired resource was not a 2D texture");
                let _ = unsafe { duplication.ReleaseFrame() };
                continue;
            }
        };

        match build_frame(&device, &context, &texture, width, height, prefer_gpu) {
            Ok((content_type, planes, payload)) => {
                *negotiated.lock() = NegotiatedVideoFormat {
                    pixel_format: scrcap_core::PixelFormat::Bgra32,
                    width,
                    height,
                    frame_rate: scrcap_core::FrameRate::new(target_fps.round() as u32, 1),
                    drm_modifier: None,
                };
                let total_size = planes.iter().map(|p| p.stride as usize * p.height as usize).sum();
                let release_payload = ReleasePayload::new(BufferType::Video).with_native_resource(payload);
                let handle = registry.register(release_payload);
                let frame = FrameBuffer {
                    buffer_type: BufferType::Video,
                    content_type,
                    timestamp_us: qpc_ticks_to_micros(frame_info.LastPresentTime, qpc_frequency),
                    video_info: Some(VideoInfo {
                        format: *negotiated.lock(),
                    }),
                    audio_info: None,
                    planes,
                    total_size,
                    internal_handle: handle,
                    user_data: 0,
                };
                callback(frame);
            }
            Err(e) => {
                warn!(error = %e, "failed to build delivered frame, dropping");
            }
        }

        let _ = unsafe { duplication.ReleaseFrame() };
        std::thread::sleep(frame_interval);
    }

    debug!("DXGI worker thread exiting");
}
