use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use mculink_host::HostError;

use crate::types::LfResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> =
        RefCell::new(CString::new("").expect("empty CString should be valid"));
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new("").expect("empty CString should be valid");
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized)
            .unwrap_or_else(|_| CString::new("internal error").expect("literal is valid"));
    });
}

pub(crate) fn set_null_pointer(message: impl Into<String>) -> LfResult {
    set_error_message(message);
    LfResult::NullPointer
}

pub(crate) fn set_illegal_handle(message: impl Into<String>) -> LfResult {
    set_error_message(message);
    LfResult::IllegalHandle
}

pub(crate) fn set_panic_error() {
    set_error_message("panic across FFI boundary");
}

pub(crate) fn map_host_error(err: &HostError) -> LfResult {
    set_error_message(err.to_string());
    match err {
        HostError::NoDevice => LfResult::NoDevicesFound,
        HostError::Unbound(_) | HostError::NotLoaded(_) => LfResult::PackageNotLoaded,
        HostError::Name(_) => LfResult::InvalidString,
        HostError::Identity(_)
        | HostError::Device(_)
        | HostError::Wire(_)
        | HostError::Transport(_) => LfResult::InvocationError,
    }
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}
