//! mculink-ffi: C-ABI exports for the mculink host runtime.
//!
//! The surface mirrors the host engine one-to-one: attach devices,
//! build argument lists, invoke, push, pull, release. Every call
//! returns an [`LfResult`]; the device-side fault behind an
//! `InvocationError` is available through `lf_error_get`, which reads
//! and clears the thread-local fault slot.

mod args;
mod device;
mod error;
mod invoke;
mod types;

use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;

pub use args::{lf_append_arg, lf_create_args};
pub use device::{lf_attach_usb, lf_release, lf_select};
pub use invoke::{lf_invoke, lf_pull, lf_push};
pub use types::{LfFunction, LfHandle, LfResult, LfType, LfValue};

use crate::types::Handle;

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error::set_panic_error();
            on_panic
        }
    }
}

/// Validate a handle and borrow its contents.
///
/// # Safety
/// `handle` must be null or a pointer previously returned by this
/// library and not yet released.
pub(crate) unsafe fn with_handle<T>(
    handle: LfHandle,
    on_error: T,
    f: impl FnOnce(&mut Handle) -> T,
) -> T {
    if handle.is_null() {
        let _ = error::set_null_pointer("handle cannot be null");
        return on_error;
    }

    let handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &mut *(handle as *mut Handle) }
    };
    f(handle)
}

/// Validate a C string argument as UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn required_str_arg<'a>(ptr: *const c_char, name: &str) -> Option<&'a str> {
    if ptr.is_null() {
        let _ = error::set_null_pointer(format!("{name} cannot be null"));
        return None;
    }

    // SAFETY: Caller guarantees a NUL-terminated string.
    let raw = unsafe { std::ffi::CStr::from_ptr(ptr) };
    match raw.to_str() {
        Ok(value) => Some(value),
        Err(_) => {
            error::set_error_message(format!("{name} is not valid UTF-8"));
            None
        }
    }
}

/// Read and clear the thread-local fault slot.
///
/// After a failed `lf_invoke`, this returns the wire error code the
/// device reported. The slot is latching: it survives later successful
/// calls until read here.
#[no_mangle]
pub extern "C" fn lf_error_get() -> u32 {
    ffi_boundary(0, || mculink_wire::fault::get().code())
}

/// A human-readable description of the most recent error on this
/// thread. The pointer is valid until the next failing call.
#[no_mangle]
pub extern "C" fn lf_error_message() -> *const c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}
