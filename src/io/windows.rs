//! Win32 backend: overlapped I/O on FireShock device interfaces
//!
//! Each request gets its own event and `OVERLAPPED` block, so both read
//! workers, the output writer and control requests can be in flight on the
//! same handle at once. The calling thread waits for its own completion only.

use super::{
    DeviceIo, DeviceOpener, DeviceSource, IoError, ERROR_IO_PENDING, ERROR_OPERATION_ABORTED,
};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use windows::core::{GUID, PCWSTR};
use windows::Win32::Devices::DeviceAndDriverInstallation::*;
use windows::Win32::Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE,
    OPEN_EXISTING,
};
use windows::Win32::System::Threading::CreateEventW;
use windows::Win32::System::IO::{CancelIoEx, DeviceIoControl, GetOverlappedResult, OVERLAPPED};

fn win32_code(err: &windows::core::Error) -> u32 {
    (err.code().0 as u32) & 0xFFFF
}

/// Manual reset event closed when dropped, on every exit path
struct CompletionEvent(HANDLE);

impl CompletionEvent {
    fn new() -> Result<Self, IoError> {
        let event = unsafe { CreateEventW(None, true, false, PCWSTR::null()) }
            .map_err(|e| IoError::Os(win32_code(&e)))?;
        Ok(Self(event))
    }
}

impl Drop for CompletionEvent {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// An open FireShock device interface
pub struct Win32Device {
    // Raw HANDLE value; HANDLE itself is not Send
    handle: usize,
    path: String,
    closed: AtomicBool,
}

impl Win32Device {
    pub fn open(path: &str) -> Result<Self, IoError> {
        let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                None,
            )
        }
        .map_err(|e| IoError::Os(win32_code(&e)))?;

        debug!("Opened {} for overlapped I/O", path);
        Ok(Self {
            handle: handle.0 as usize,
            path: path.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    fn raw(&self) -> HANDLE {
        HANDLE(self.handle as *mut _)
    }

    fn map_error(&self, err: &windows::core::Error) -> IoError {
        let code = win32_code(err);
        if code == ERROR_OPERATION_ABORTED {
            IoError::Aborted
        } else if self.closed.load(Ordering::Acquire) {
            IoError::Closed
        } else {
            IoError::Os(code)
        }
    }

    /// Submits one request and blocks until it completes
    fn overlapped<F>(&self, submit: F) -> Result<usize, IoError>
    where
        F: FnOnce(*mut OVERLAPPED) -> windows::core::Result<()>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(IoError::Closed);
        }

        let event = CompletionEvent::new()?;
        let mut overlapped = OVERLAPPED {
            hEvent: event.0,
            ..Default::default()
        };

        match submit(&mut overlapped as *mut OVERLAPPED) {
            Ok(()) => {}
            Err(e) if win32_code(&e) == ERROR_IO_PENDING => {}
            Err(e) => return Err(self.map_error(&e)),
        }

        // close() may have run between the check above and the submit
        if self.closed.load(Ordering::Acquire) {
            unsafe {
                let _ = CancelIoEx(self.raw(), Some(&overlapped as *const OVERLAPPED));
            }
        }

        let mut transferred: u32 = 0;
        unsafe { GetOverlappedResult(self.raw(), &overlapped, &mut transferred, true) }
            .map_err(|e| self.map_error(&e))?;

        Ok(transferred as usize)
    }
}

impl DeviceIo for Win32Device {
    fn issue_read(&self, buffer: &mut [u8]) -> Result<usize, IoError> {
        let handle = self.raw();
        self.overlapped(|ov| unsafe { ReadFile(handle, Some(buffer), None, Some(ov)) })
    }

    fn issue_write(&self, report: &[u8]) -> Result<usize, IoError> {
        let handle = self.raw();
        self.overlapped(|ov| unsafe { WriteFile(handle, Some(report), None, Some(ov)) })
    }

    fn issue_control(
        &self,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, IoError> {
        let handle = self.raw();
        let in_ptr = if input.is_empty() {
            None
        } else {
            Some(input.as_ptr() as *const _)
        };
        let out_len = output.len() as u32;
        let out_ptr = if output.is_empty() {
            None
        } else {
            Some(output.as_mut_ptr() as *mut _)
        };

        self.overlapped(|ov| unsafe {
            DeviceIoControl(
                handle,
                code,
                in_ptr,
                input.len() as u32,
                out_ptr,
                out_len,
                None,
                Some(ov),
            )
        })
    }

    /// Cancels every pending request. The handle value itself stays valid
    /// until the last owner drops the device, so a late request can never
    /// land on a reused handle.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("Cancelling pending I/O on {}", self.path);
        unsafe {
            // Completes pending reads with ERROR_OPERATION_ABORTED
            let _ = CancelIoEx(self.raw(), None);
        }
    }
}

impl Drop for Win32Device {
    fn drop(&mut self) {
        self.close();
        debug!("Closing handle of {}", self.path);
        unsafe {
            if let Err(e) = CloseHandle(self.raw()) {
                warn!("CloseHandle failed for {}: {}", self.path, e);
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Opener;

impl DeviceOpener for Win32Opener {
    fn open(&self, path: &str) -> Result<Arc<dyn DeviceIo>, IoError> {
        Ok(Arc::new(Win32Device::open(path)?))
    }
}

/// Enumerates present device interfaces through SetupDi
#[derive(Debug, Default, Clone, Copy)]
pub struct SetupDiSource;

impl DeviceSource for SetupDiSource {
    fn list_device_paths(&self, device_class: &Uuid) -> Result<Vec<String>, IoError> {
        let guid = GUID::from_u128(device_class.as_u128());

        let dev_info = unsafe {
            SetupDiGetClassDevsW(
                Some(&guid),
                PCWSTR::null(),
                None,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
        }
        .map_err(|e| IoError::Os(win32_code(&e)))?;

        let paths = unsafe { interface_paths(dev_info, &guid) };
        unsafe {
            let _ = SetupDiDestroyDeviceInfoList(dev_info);
        }
        Ok(paths)
    }
}

unsafe fn interface_paths(dev_info: HDEVINFO, guid: &GUID) -> Vec<String> {
    let mut paths = Vec::new();

    for index in 0.. {
        let mut iface = SP_DEVICE_INTERFACE_DATA {
            cbSize: mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
            ..Default::default()
        };
        if unsafe { SetupDiEnumDeviceInterfaces(dev_info, None, guid, index, &mut iface) }.is_err()
        {
            break;
        }

        // First call only reports the required size
        let mut required: u32 = 0;
        let _ = unsafe {
            SetupDiGetDeviceInterfaceDetailW(dev_info, &iface, None, 0, Some(&mut required), None)
        };
        if required == 0 {
            continue;
        }

        // u32 backing keeps the detail struct aligned
        let mut buf = vec![0u32; (required as usize).div_ceil(4)];
        let detail = unsafe { &mut *(buf.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W) };
        detail.cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;

        if unsafe {
            SetupDiGetDeviceInterfaceDetailW(dev_info, &iface, Some(detail), required, None, None)
        }
        .is_ok()
        {
            paths.push(unsafe { extract_path(detail) });
        }
    }

    paths
}

/// Reads the NUL terminated UTF-16 path out of a filled detail struct
unsafe fn extract_path(detail: &SP_DEVICE_INTERFACE_DETAIL_DATA_W) -> String {
    let ptr = &detail.DevicePath as *const u16;
    let mut len = 0;
    unsafe {
        while *ptr.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
    }
}
