//! Frame pool, capture session, and the `FrameArrived` delivery algorithm
//! (§4.5 "Streaming", steps 1-5).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;
use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{
    Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_BIND_FLAG,
    D3D11_BIND_SHADER_RESOURCE, D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_RESOURCE_MISC_FLAG,
    D3D11_RESOURCE_MISC_SHARED, D3D11_RESOURCE_MISC_SHARED_NTHANDLE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_DEFAULT, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::IDXGIResource1;
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDevice;

use scrcap_core::{
    BufferType, ContentType, FrameBuffer, FrameCallback, FramePayload, NegotiatedVideoFormat,
    PayloadRegistry, PixelFormat, Plane, PlanePtr, ReleasePayload, VideoInfo,
};

use crate::error::{Result, WgcError};

const BUFFER_COUNT: i32 = 2;

#[derive(Debug)]
enum WgcFramePayload {
    Gpu {
        #[allow(dead_code)]
        texture: ID3D11Texture2D,
    },
    Cpu {
        texture: ID3D11Texture2D,
        context: ID3D11DeviceContext,
    },
}

impl FramePayload for WgcFramePayload {
    fn release(self: Box<Self>) {
        if let Self::Cpu { texture, context } = *self {
            // SAFETY: `texture` was `Map`-ed exactly once by `cpu_path` and
            // not unmapped since; `context` is the device context that
            // performed that `Map`.
            unsafe {
                context.Unmap(&texture, 0);
            }
        }
    }
}

/// State the `FrameArrived` handler reads and mutates under the session
/// mutex (§5 "The session mutex (Windows) protects is-streaming, the
/// application callback pointer, and GPU device ownership during teardown").
pub(crate) struct SessionShared {
    pub device: ID3D11Device,
    pub context: ID3D11DeviceContext,
    pub is_streaming: bool,
    pub prefer_gpu: bool,
    pub width: u32,
    pub height: u32,
    pub registry: Arc<PayloadRegistry>,
    pub callback: FrameCallback,
    pub negotiated: Arc<Mutex<NegotiatedVideoFormat>>,
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
        .map_err(|e| WgcError::WinApi(format!("CreateTexture2D (shareable): {e}")))?;
    texture.ok_or_else(|| WgcError::WinApi("CreateTexture2D returned null".into()))
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
        .map_err(|e| WgcError::WinApi(format!("CreateTexture2D (staging): {e}")))?;
    texture.ok_or_else(|| WgcError::WinApi("CreateTexture2D returned null".into()))
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
        .map_err(|e| WgcError::WinApi(format!("IDXGIResource1 cast: {e}")))?;
    let handle = unsafe {
        resource1.CreateSharedHandle(
            None,
            windows::Win32::Storage::FileSystem::FILE_GENERIC_READ.0,
            None,
        )
    }
    .map_err(|e| WgcError::WinApi(format!("CreateSharedHandle: {e}")))?;

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
        Box::new(WgcFramePayload::Gpu { texture: shareable }),
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
        .map_err(|e| WgcError::WinApi(format!("Map: {e}")))?;

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
        Box::new(WgcFramePayload::Cpu {
            texture: staging,
            context: context.clone(),
        }),
    ))
}

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

/// Build and start the free-threaded frame pool and capture session
/// (§4.5 "Streaming").
pub(crate) fn start_session(
    winrt_device: &IDirect3DDevice,
    item: &GraphicsCaptureItem,
    item_size: windows::Graphics::SizeInt32,
    shared: Arc<Mutex<SessionShared>>,
) -> Result<(GraphicsCaptureSession, Direct3D11CaptureFramePool)> {
    let pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
        winrt_device,
        DirectXPixelFormat::B8G8R8A8UIntNormalized,
        BUFFER_COUNT,
        item_size,
    )
    .map_err(|e| WgcError::SessionFailed(format!("CreateFreeThreaded: {e}")))?;

    let session = pool
        .CreateCaptureSession(item)
        .map_err(|e| WgcError::SessionFailed(format!("CreateCaptureSession: {e}")))?;
    let _ = session.SetIsBorderRequired(false);

    let handler_shared = shared.clone();
    pool.FrameArrived(&TypedEventHandler::new(
        move |pool_ref: &Option<Direct3D11CaptureFramePool>, _| -> windows::core::Result<()> {
            let Some(pool_ref) = pool_ref else {
                return Ok(());
            };
            on_frame_arrived(pool_ref, &handler_shared);
            Ok(())
        },
    ))
    .map_err(|e| WgcError::SessionFailed(format!("FrameArrived: {e}")))?;

    session
        .StartCapture()
        .map_err(|e| WgcError::SessionFailed(format!("StartCapture: {e}")))?;

    Ok((session, pool))
}

/// The per-arrival algorithm (§4.5 "Streaming", steps 1-5).
fn on_frame_arrived(pool: &Direct3D11CaptureFramePool, shared: &Arc<Mutex<SessionShared>>) {
    let frame = match pool.TryGetNextFrame() {
        Ok(frame) => frame,
        Err(_) => return,
    };

    {
        let state = shared.lock();
        if !state.is_streaming {
            drop(state);
            return;
        }
    }

    let result = (|| -> Result<()> {
        let surface = frame
            .Surface()
            .map_err(|e| WgcError::WinApi(format!("Frame::Surface: {e}")))?;
        let texture: ID3D11Texture2D = surface
            .cast()
            .map_err(|e| WgcError::WinApi(format!("surface cast: {e}")))?;
        let system_relative_time = frame
            .SystemRelativeTime()
            .map_err(|e| WgcError::WinApi(format!("SystemRelativeTime: {e}")))?;
        // 100-ns units -> microseconds (§4.5 step 3).
        let timestamp_us = (system_relative_time.Duration / 10).max(0) as u64;

        let mut state = shared.lock();
        if !state.is_streaming {
            return Ok(());
        }

        let (content_type, planes, payload) = build_frame(
            &state.device,
            &state.context,
            &texture,
            state.width,
            state.height,
            state.prefer_gpu,
        )?;

        let negotiated = {
            let mut negotiated = state.negotiated.lock();
            negotiated.pixel_format = PixelFormat::Bgra32;
            negotiated.width = state.width;
            negotiated.height = state.height;
            negotiated.drm_modifier = None;
            *negotiated
        };
        let total_size: usize = planes.iter().map(|p| p.stride as usize * p.height as usize).sum();
        let release_payload = ReleasePayload::new(BufferType::Video).with_native_resource(payload);
        let handle = state.registry.register(release_payload);
        let buffer = FrameBuffer {
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
        (state.callback)(buffer);
        Ok(())
    })();

    if let Err(e) = result {
        warn!(error = %e, "failed to deliver WGC frame, dropping");
    }

    let _ = frame.Close();
}
