//! Runtime apartment, D3D11/WinRT device setup, and capture-item creation
//! (§4.5 "Setup" and "Configuration").

use std::sync::atomic::{AtomicUsize, Ordering};

use windows::core::Interface;
use windows::Graphics::Capture::GraphicsCaptureItem;
use windows::Graphics::SizeInt32;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::Graphics::Gdi::HMONITOR;
use windows::Win32::System::WinRT::Direct3D11::{
    CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDevice,
};
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::System::WinRT::{RoInitialize, RO_INIT_MULTITHREADED};

use scrcap_core::WgcDeviceId;

use crate::error::{Result, WgcError};

/// Tracks how many live sessions have initialized the apartment on this
/// process, so the first caller initializes and nobody tears it down early
/// (§4.5 "an init-count is maintained so multiple sessions share one
/// apartment").
static APARTMENT_INIT_COUNT: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn ensure_apartment_initialized() {
    if APARTMENT_INIT_COUNT.fetch_add(1, Ordering::SeqCst) == 0 {
        // SAFETY: called at most once per process via the fetch_add guard
        // above (subsequent calls are no-ops); RoInitialize is documented
        // as safe to call redundantly on the same thread regardless.
        unsafe {
            let _ = RoInitialize(RO_INIT_MULTITHREADED);
        }
    }
}

/// Create the D3D11 device plus its WinRT `IDirect3DDevice` wrapper used to
/// build frame pools (§4.5 "A GPU device is created as in 4.4 plus a
/// runtime-facing device wrapper").
pub(crate) fn create_devices() -> Result<(ID3D11Device, ID3D11DeviceContext, IDirect3DDevice)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .map_err(|e| WgcError::WinApi(format!("D3D11CreateDevice: {e}")))?;

    let device = device.ok_or_else(|| WgcError::WinApi("D3D11CreateDevice returned null device".into()))?;
    let context = context.ok_or_else(|| WgcError::WinApi("D3D11CreateDevice returned null context".into()))?;

    let dxgi_device: IDXGIDevice = device
        .cast()
        .map_err(|e| WgcError::WinApi(format!("IDXGIDevice cast: {e}")))?;
    let winrt_device = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device) }
        .map_err(|e| WgcError::WinApi(format!("CreateDirect3D11DeviceFromDXGIDevice: {e}")))?;

    Ok((device, context, winrt_device))
}

/// Build the capture item for a parsed device id and report its initial
/// size, which becomes the frame pool's buffer size (§4.5 "Configuration").
pub(crate) fn create_capture_item(id: WgcDeviceId) -> Result<(GraphicsCaptureItem, SizeInt32)> {
    let interop: IGraphicsCaptureItemInterop =
        windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
            .map_err(|e| WgcError::ItemCreationFailed(format!("IGraphicsCaptureItemInterop factory: {e}")))?;

    let item: GraphicsCaptureItem = match id {
        WgcDeviceId::Monitor(raw) => unsafe { interop.CreateForMonitor(HMONITOR(raw)) }
            .map_err(|e| WgcError::ItemCreationFailed(format!("CreateForMonitor: {e}")))?,
        WgcDeviceId::Window(raw) => unsafe { interop.CreateForWindow(HWND(raw)) }
            .map_err(|e| WgcError::ItemCreationFailed(format!("CreateForWindow: {e}")))?,
    };

    let size = item
        .Size()
        .map_err(|e| WgcError::ItemCreationFailed(format!("GraphicsCaptureItem::Size: {e}")))?;
    Ok((item, size))
}
