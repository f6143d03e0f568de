//! D3D11 device creation and output enumeration (§4.4 "Setup").

use tracing::warn;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_WARP, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_FLAG,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter, IDXGIFactory1, IDXGIOutput1, DXGI_OUTPUT_DESC,
};
use windows::core::Interface;

use scrcap_core::DxgiDisplayId;

use crate::error::{DxgiError, Result};

/// Create a hardware D3D11 device, falling back to WARP (§4.4 "create a
/// hardware GPU device... WARP fallback").
pub(crate) fn create_device(adapter: Option<&IDXGIAdapter>) -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let mut feature_level = D3D_FEATURE_LEVEL_10_0;
    // §4.4 "Setup": a hardware GPU device, feature levels 11.0 down to 10.0.
    let feature_levels = [D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_0];

    let driver_type = if adapter.is_some() {
        windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_UNKNOWN
    } else {
        D3D_DRIVER_TYPE_HARDWARE
    };

    let hr = unsafe {
        D3D11CreateDevice(
            adapter,
            driver_type,
            None,
            D3D11_CREATE_DEVICE_FLAG(0),
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            Some(&mut feature_level),
            Some(&mut context),
        )
    };

    if hr.is_err() {
        warn!("hardware D3D11 device creation failed, falling back to WARP");
        let mut warp_device: Option<ID3D11Device> = None;
        let mut warp_context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_WARP,
                None,
                D3D11_CREATE_DEVICE_FLAG(0),
                Some(&feature_levels),
                D3D11_SDK_VERSION,
                Some(&mut warp_device),
                Some(&mut feature_level),
                Some(&mut warp_context),
            )
        }
        .map_err(|e| DxgiError::DeviceCreationFailed(format!("WARP fallback failed: {e}")))?;
        return Ok((
            warp_device.ok_or_else(|| DxgiError::DeviceCreationFailed("WARP device was null".into()))?,
            warp_context.ok_or_else(|| DxgiError::DeviceCreationFailed("WARP context was null".into()))?,
        ));
    }

    Ok((
        device.ok_or_else(|| DxgiError::DeviceCreationFailed("device was null".into()))?,
        context.ok_or_else(|| DxgiError::DeviceCreationFailed("context was null".into()))?,
    ))
}

/// Resolve `id` to its owning adapter, `IDXGIOutput1`, and output
/// descriptor (§4.4 "query the output's duplication interface").
pub(crate) fn resolve_output(id: DxgiDisplayId) -> Result<(IDXGIAdapter, IDXGIOutput1, DXGI_OUTPUT_DESC)> {
    let factory: IDXGIFactory1 =
        unsafe { CreateDXGIFactory1() }.map_err(|e| DxgiError::WinApi(format!("CreateDXGIFactory1: {e}")))?;

    let adapter: IDXGIAdapter = unsafe { factory.EnumAdapters(id.adapter_index) }
        .map_err(|_| DxgiError::OutputNotFound(id.to_string()))?;
    let output = unsafe { adapter.EnumOutputs(id.output_index) }
        .map_err(|_| DxgiError::OutputNotFound(id.to_string()))?;
    let output1: IDXGIOutput1 = output
        .cast()
        .map_err(|e| DxgiError::WinApi(format!("IDXGIOutput -> IDXGIOutput1: {e}")))?;
    let desc = unsafe { output1.GetDesc() }.map_err(|e| DxgiError::WinApi(format!("GetDesc: {e}")))?;

    Ok((adapter, output1, desc))
}

/// Desktop dimensions from an output descriptor's `DesktopCoordinates`.
pub(crate) fn desktop_size(desc: &DXGI_OUTPUT_DESC) -> (u32, u32) {
    let rect = desc.DesktopCoordinates;
    (
        (rect.right - rect.left).unsigned_abs(),
        (rect.bottom - rect.top).unsigned_abs(),
    )
}
