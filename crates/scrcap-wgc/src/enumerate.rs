//! Monitor and top-level window enumeration (§4.5 "Enumeration").

use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM, RECT};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::Graphics::Gdi::{EnumDisplayMonitors, HDC, HMONITOR};
use windows::Win32::System::Threading::GetCurrentProcessId;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowLongW, GetWindowTextLengthW, GetWindowThreadProcessId, IsWindowVisible,
    GWL_EXSTYLE, GWL_STYLE, WS_CHILD, WS_EX_TOOLWINDOW,
};

/// Enumerate connected monitors in the order the platform reports them.
pub fn enumerate_monitors() -> Vec<HMONITOR> {
    let mut monitors: Vec<HMONITOR> = Vec::new();

    unsafe extern "system" fn callback(hmonitor: HMONITOR, _hdc: HDC, _rect: *mut RECT, data: LPARAM) -> BOOL {
        // SAFETY: `data` was set below to a pointer to a live `Vec<HMONITOR>`
        // that outlives this call; `EnumDisplayMonitors` does not retain it.
        let list = unsafe { &mut *(data.0 as *mut Vec<HMONITOR>) };
        list.push(hmonitor);
        BOOL(1)
    }

    // SAFETY: `callback` only dereferences `data` as the `Vec<HMONITOR>` we
    // constructed it from, and does not outlive this call.
    unsafe {
        let _ = EnumDisplayMonitors(HDC::default(), None, Some(callback), LPARAM(std::ptr::addr_of_mut!(monitors) as isize));
    }
    monitors
}

/// Enumerate top-level windows, filtered per §4.5: excludes invisible,
/// child, tool-window-styled, cloaked (via the DWM attribute), own-process,
/// and untitled windows.
pub fn enumerate_windows() -> Vec<HWND> {
    let mut windows: Vec<HWND> = Vec::new();
    let own_pid = unsafe { GetCurrentProcessId() };

    unsafe extern "system" fn callback(hwnd: HWND, data: LPARAM) -> BOOL {
        // SAFETY: `data` carries a pointer to a `(Vec<HWND>, u32)` set up by
        // the caller below and not retained past this call.
        let (list, own_pid) = unsafe { &mut *(data.0 as *mut (Vec<HWND>, u32)) };
        if window_is_capturable(hwnd, *own_pid) {
            list.push(hwnd);
        }
        BOOL(1)
    }

    let mut state = (Vec::new(), own_pid);
    // SAFETY: `callback` only dereferences `data` as the `(Vec<HWND>, u32)`
    // we constructed it from, and does not outlive this call.
    unsafe {
        let _ = EnumWindows(Some(callback), LPARAM(std::ptr::addr_of_mut!(state) as isize));
    }
    windows.append(&mut state.0);
    windows
}

fn window_is_capturable(hwnd: HWND, own_pid: u32) -> bool {
    if !unsafe { IsWindowVisible(hwnd) }.as_bool() {
        return false;
    }

    let style = unsafe { GetWindowLongW(hwnd, GWL_STYLE) } as u32;
    if style & WS_CHILD.0 != 0 {
        return false;
    }

    let ex_style = unsafe { GetWindowLongW(hwnd, GWL_EXSTYLE) } as u32;
    if ex_style & WS_EX_TOOLWINDOW.0 != 0 {
        return false;
    }

    let mut cloaked: u32 = 0;
    let cloaked_ok = unsafe {
        DwmGetWindowAttribute(
            hwnd,
            DWMWA_CLOAKED,
            std::ptr::addr_of_mut!(cloaked).cast(),
            std::mem::size_of::<u32>() as u32,
        )
    };
    if cloaked_ok.is_ok() && cloaked != 0 {
        return false;
    }

    let mut pid: u32 = 0;
    unsafe { GetWindowThreadProcessId(hwnd, Some(std::ptr::addr_of_mut!(pid))) };
    if pid == own_pid {
        return false;
    }

    if unsafe { GetWindowTextLengthW(hwnd) } == 0 {
        return false;
    }

    true
}

/// Resolve the owning process id of a window, used to derive the
/// `PID:<pid>` loopback target for a WGC window capture (§6 "Audio-loopback
/// targets").
pub fn window_owner_pid(hwnd: HWND) -> u32 {
    let mut pid: u32 = 0;
    unsafe { GetWindowThreadProcessId(hwnd, Some(std::ptr::addr_of_mut!(pid))) };
    pid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore]
    fn enumerate_monitors_finds_at_least_one() {
        assert!(!enumerate_monitors().is_empty());
    }
}
