use std::sync::Arc;

use crate::error;
use crate::types::{Handle, LfHandle, LfResult};

/// Attach every device exposed by the local USB bridge and return an
/// opaque device-list handle plus its length.
///
/// The list is heap-allocated and owned by the caller; release it with
/// `lf_release`. Returns `NoDevicesFound` when the bridge exposes
/// nothing.
///
/// # Safety
/// `devices` and `length` must be valid writable pointers.
#[no_mangle]
pub unsafe extern "C" fn lf_attach_usb(devices: *mut LfHandle, length: *mut u32) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        if devices.is_null() {
            return error::set_null_pointer("devices cannot be null");
        }
        if length.is_null() {
            return error::set_null_pointer("length cannot be null");
        }

        let attached = match mculink_host::attach_usb() {
            Ok(attached) => attached,
            Err(err) => return error::map_host_error(&err),
        };
        if attached.is_empty() {
            error::set_error_message("no devices on the usb bridge");
            return LfResult::NoDevicesFound;
        }

        let count = attached.len() as u32;
        // SAFETY: Both pointers were checked for null above.
        unsafe {
            *devices = Handle::Devices(attached).into_raw();
            *length = count;
        }
        LfResult::Success
    })
}

/// Retrieve the device at `index` from a device list and select it.
///
/// The returned handle must itself be released with `lf_release`; it
/// stays usable for as long as the runtime holds the device open, even
/// after the list is released.
///
/// # Safety
/// `devices` must be a handle from `lf_attach_usb`; `device` must be a
/// valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn lf_select(
    devices: LfHandle,
    index: u32,
    device: *mut LfHandle,
) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        if device.is_null() {
            return error::set_null_pointer("device cannot be null");
        }

        // SAFETY: Caller guarantees handle validity.
        unsafe {
            crate::with_handle(devices, LfResult::NullPointer, |handle| {
                let Handle::Devices(list) = handle else {
                    return error::set_illegal_handle("devices is not a device list");
                };
                let Some(selected) = list.get(index as usize) else {
                    error::set_error_message(format!(
                        "index {index} out of bounds for {} devices",
                        list.len()
                    ));
                    return LfResult::IndexOutOfBounds;
                };

                mculink_host::select(selected);
                *device = Handle::Device(Arc::clone(selected)).into_raw();
                LfResult::Success
            })
        }
    })
}

/// Release any handle returned by this library.
///
/// # Safety
/// `handle` must be null or a handle previously returned by this
/// library, and must not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn lf_release(handle: LfHandle) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        if handle.is_null() {
            return error::set_null_pointer("handle cannot be null");
        }

        // SAFETY: Caller guarantees this handle came from into_raw.
        unsafe {
            drop(Box::from_raw(handle as *mut Handle));
        }
        LfResult::Success
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_usb_with_no_bridge_reports_no_devices() {
        let dir = std::env::temp_dir().join(format!("mculink-ffi-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::env::set_var("MCULINK_BRIDGE_DIR", &dir);

        let mut devices: LfHandle = std::ptr::null_mut();
        let mut length = 0u32;
        // SAFETY: Both out-pointers are valid locals.
        let result = unsafe { lf_attach_usb(&mut devices, &mut length) };
        assert_eq!(result, LfResult::NoDevicesFound);
        assert!(devices.is_null());

        std::env::remove_var("MCULINK_BRIDGE_DIR");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn null_out_pointers_rejected() {
        // SAFETY: null is explicitly exercised.
        unsafe {
            assert_eq!(
                lf_attach_usb(std::ptr::null_mut(), std::ptr::null_mut()),
                LfResult::NullPointer
            );
            let mut device: LfHandle = std::ptr::null_mut();
            assert_eq!(
                lf_select(std::ptr::null_mut(), 0, &mut device),
                LfResult::NullPointer
            );
            assert_eq!(lf_release(std::ptr::null_mut()), LfResult::NullPointer);
        }
    }

    #[test]
    fn select_rejects_non_list_handles() {
        let mut argv: LfHandle = std::ptr::null_mut();
        // SAFETY: argv is a valid local; handle is released below.
        unsafe {
            assert_eq!(crate::lf_create_args(&mut argv), LfResult::Success);

            let mut device: LfHandle = std::ptr::null_mut();
            assert_eq!(lf_select(argv, 0, &mut device), LfResult::IllegalHandle);
            assert_eq!(lf_release(argv), LfResult::Success);
        }
    }
}
