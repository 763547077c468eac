use std::os::raw::c_char;

use mculink_host::Device;
use mculink_wire::{ArgList, WireType};

use crate::error;
use crate::types::{Handle, LfFunction, LfHandle, LfResult, LfType, LfValue};

fn with_device<T: Copy>(handle: LfHandle, on_error: T, f: impl FnOnce(&Device) -> T) -> T {
    // SAFETY: Caller contracts of the exported functions guarantee the
    // handle came from this library.
    unsafe {
        crate::with_handle(handle, on_error, |handle| match handle {
            Handle::Device(device) => f(device),
            _ => {
                let _ = error::set_illegal_handle("handle is not a device");
                on_error
            }
        })
    }
}

/// Borrow a `(pointer, length)` byte region.
///
/// # Safety
/// If `len > 0`, `data` must be readable for `len` bytes.
unsafe fn bytes_arg<'a>(data: *const u8, len: u32, name: &str) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if data.is_null() {
        let _ = error::set_null_pointer(format!("{name} cannot be null"));
        return None;
    }
    // SAFETY: Caller guarantees the pointer/length pairing.
    Some(unsafe { std::slice::from_raw_parts(data, len as usize) })
}

/// Execute a remote function on a device.
///
/// The module is addressed by name and resolved through the device's
/// dynamic loader; `function` indexes into the module's table. The
/// argument list is not consumed and may be reused. On success the
/// normalized 64-bit return lands in `return_value`; on
/// `InvocationError` the device's wire fault is readable through
/// `lf_error_get`.
///
/// # Safety
/// `device` must be a device handle, `module` a NUL-terminated UTF-8
/// string, `argv` null (no arguments) or an argument-list handle, and
/// `return_value` a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn lf_invoke(
    device: LfHandle,
    module: *const c_char,
    function: LfFunction,
    argv: LfHandle,
    return_type: LfType,
    return_value: *mut LfValue,
) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        // SAFETY: Caller guarantees the string contract.
        let Some(module) = (unsafe { crate::required_str_arg(module, "module") }) else {
            return LfResult::InvalidString;
        };
        let Some(ret) = WireType::from_tag(return_type) else {
            error::set_error_message(format!("unknown return type tag {return_type:#x}"));
            return LfResult::IllegalType;
        };
        if return_value.is_null() {
            return error::set_null_pointer("return_value cannot be null");
        }

        let args = if argv.is_null() {
            ArgList::new()
        } else {
            // SAFETY: Caller guarantees handle validity.
            let cloned = unsafe {
                crate::with_handle(argv, None, |handle| match handle {
                    Handle::Args(args) => Some(args.clone()),
                    _ => None,
                })
            };
            match cloned {
                Some(args) => args,
                None => return error::set_illegal_handle("argv is not an argument list"),
            }
        };

        with_device(device, LfResult::NullPointer, |device| {
            match device.invoke_by_name(module, function, ret, args) {
                Ok(value) => {
                    // SAFETY: Checked for null above.
                    unsafe {
                        *return_value = value;
                    }
                    LfResult::Success
                }
                Err(err) => error::map_host_error(&err),
            }
        })
    })
}

/// Push a byte buffer through a module function on a device.
///
/// # Safety
/// `device` must be a device handle, `module` a NUL-terminated UTF-8
/// string, and `source` readable for `length` bytes when `length > 0`.
#[no_mangle]
pub unsafe extern "C" fn lf_push(
    device: LfHandle,
    module: *const c_char,
    function: LfFunction,
    source: *const u8,
    length: u32,
) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        // SAFETY: Caller guarantees the string contract.
        let Some(module) = (unsafe { crate::required_str_arg(module, "module") }) else {
            return LfResult::InvalidString;
        };
        // SAFETY: Caller guarantees the pointer/length pairing.
        let Some(data) = (unsafe { bytes_arg(source, length, "source") }) else {
            return LfResult::NullPointer;
        };

        with_device(device, LfResult::NullPointer, |device| {
            let index = match device.module_index(mculink_wire::crc::identifier(module)) {
                Ok(index) => index | mculink_wire::USER_INVOCATION_BIT,
                Err(err) => return error::map_host_error(&err),
            };
            match device.push(index, function, data, ArgList::new()) {
                Ok(_) => LfResult::Success,
                Err(err) => error::map_host_error(&err),
            }
        })
    })
}

/// Pull a byte buffer through a module function on a device.
///
/// # Safety
/// `device` must be a device handle, `module` a NUL-terminated UTF-8
/// string, and `destination` writable for `length` bytes when
/// `length > 0`.
#[no_mangle]
pub unsafe extern "C" fn lf_pull(
    device: LfHandle,
    module: *const c_char,
    function: LfFunction,
    destination: *mut u8,
    length: u32,
) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        // SAFETY: Caller guarantees the string contract.
        let Some(module) = (unsafe { crate::required_str_arg(module, "module") }) else {
            return LfResult::InvalidString;
        };
        if length > 0 && destination.is_null() {
            return error::set_null_pointer("destination cannot be null");
        }
        let buf: &mut [u8] = if length == 0 {
            &mut []
        } else {
            // SAFETY: Caller guarantees the pointer/length pairing.
            unsafe { std::slice::from_raw_parts_mut(destination, length as usize) }
        };

        with_device(device, LfResult::NullPointer, |device| {
            let index = match device.module_index(mculink_wire::crc::identifier(module)) {
                Ok(index) => index | mculink_wire::USER_INVOCATION_BIT,
                Err(err) => return error::map_host_error(&err),
            };
            match device.pull(index, function, buf, ArgList::new()) {
                Ok(_) => LfResult::Success,
                Err(err) => error::map_host_error(&err),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    use mculink_device::{DeviceRuntime, Function, Module as DeviceModule};
    use mculink_transport::StreamEndpoint;
    use mculink_wire::{Configuration, Fault, WireType, ATTRIBUTE_32_BIT};

    use super::*;
    use crate::{lf_append_arg, lf_create_args, lf_error_get, lf_release};

    /// A loopback device on a socket pair, handed to the FFI as a
    /// device handle.
    fn loopback() -> (LfHandle, std::thread::JoinHandle<()>) {
        let (host_io, device_io) = UnixStream::pair().unwrap();

        let thread = std::thread::spawn(move || {
            let configuration =
                Configuration::new("argon", 0x0100, ATTRIBUTE_32_BIT).unwrap();
            let mut runtime = DeviceRuntime::new(configuration);

            let double = Function::new(
                |args: &[u64]| args.first().copied().unwrap_or(0) * 2,
                vec![WireType::U32],
                WireType::U32,
            );
            let negative = Function::new(|_: &[u64]| 0xFFFF, vec![], WireType::I16);
            let failing = Function::new(
                |_: &[u64]| {
                    mculink_wire::fault::raise(Fault::Test);
                    0
                },
                vec![],
                WireType::Void,
            );
            runtime
                .register(DeviceModule::new("math", vec![double, negative, failing]).unwrap())
                .unwrap();

            let memory = runtime.memory();
            let fill = Function::new(
                move |args: &[u64]| {
                    let (address, length) = (args[0] as u32, args[1] as u32);
                    let data: Vec<u8> = (0..length as u8).collect();
                    memory.lock().unwrap().write(address, &data).unwrap();
                    0
                },
                vec![WireType::Ptr, WireType::U32],
                WireType::Void,
            );
            let sink = Function::new(|args: &[u64]| args[0], vec![WireType::Ptr, WireType::U32], WireType::Ptr);
            runtime
                .register(DeviceModule::new("buffer", vec![fill, sink]).unwrap())
                .unwrap();

            let mut endpoint = StreamEndpoint::new(device_io);
            runtime.serve(&mut endpoint).unwrap();
        });

        let device =
            mculink_host::attach_endpoint("argon", Box::new(StreamEndpoint::new(host_io)))
                .unwrap();
        mculink_host::detach(&device);
        (crate::types::Handle::Device(Arc::clone(&device)).into_raw(), thread)
    }

    fn release_and_join(device: LfHandle, thread: std::thread::JoinHandle<()>) {
        // SAFETY: device came from loopback().
        unsafe {
            assert_eq!(lf_release(device), LfResult::Success);
        }
        thread.join().unwrap();
    }

    #[test]
    fn invoke_with_arguments_returns_the_value() {
        let (device, thread) = loopback();

        let mut argv: LfHandle = std::ptr::null_mut();
        // SAFETY: Valid locals and handles throughout.
        unsafe {
            assert_eq!(lf_create_args(&mut argv), LfResult::Success);
            assert_eq!(lf_append_arg(argv, 21, WireType::U32.tag()), LfResult::Success);

            let mut value: LfValue = 0;
            let result = lf_invoke(
                device,
                c"math".as_ptr(),
                0,
                argv,
                WireType::U32.tag(),
                &mut value,
            );
            assert_eq!(result, LfResult::Success);
            assert_eq!(value, 42);

            assert_eq!(lf_release(argv), LfResult::Success);
        }
        release_and_join(device, thread);
    }

    #[test]
    fn invoke_normalizes_signed_returns() {
        let (device, thread) = loopback();

        let mut value: LfValue = 0;
        // SAFETY: Valid locals and handles throughout.
        let result = unsafe {
            lf_invoke(
                device,
                c"math".as_ptr(),
                1,
                std::ptr::null_mut(),
                WireType::I16.tag(),
                &mut value,
            )
        };
        assert_eq!(result, LfResult::Success);
        assert_eq!(value, u64::MAX);
        release_and_join(device, thread);
    }

    #[test]
    fn device_fault_maps_to_invocation_error() {
        let (device, thread) = loopback();
        assert_eq!(lf_error_get(), 0);

        let mut value: LfValue = 0;
        // SAFETY: Valid locals and handles throughout.
        let result = unsafe {
            lf_invoke(
                device,
                c"math".as_ptr(),
                2,
                std::ptr::null_mut(),
                WireType::Void.tag(),
                &mut value,
            )
        };
        assert_eq!(result, LfResult::InvocationError);
        assert_eq!(lf_error_get(), Fault::Test.code());
        assert_eq!(lf_error_get(), 0);
        release_and_join(device, thread);
    }

    #[test]
    fn unknown_module_is_package_not_loaded() {
        let (device, thread) = loopback();

        let mut value: LfValue = 0;
        // SAFETY: Valid locals and handles throughout.
        let result = unsafe {
            lf_invoke(
                device,
                c"missing".as_ptr(),
                0,
                std::ptr::null_mut(),
                WireType::Void.tag(),
                &mut value,
            )
        };
        assert_eq!(result, LfResult::PackageNotLoaded);
        release_and_join(device, thread);
    }

    #[test]
    fn push_and_pull_move_byte_buffers() {
        let (device, thread) = loopback();

        // SAFETY: Valid locals and handles throughout.
        unsafe {
            let source = [0xDEu8, 0xAD, 0xBE, 0xEF];
            assert_eq!(
                lf_push(device, c"buffer".as_ptr(), 1, source.as_ptr(), 4),
                LfResult::Success
            );

            let mut sink = [0u8; 8];
            assert_eq!(
                lf_pull(device, c"buffer".as_ptr(), 0, sink.as_mut_ptr(), 8),
                LfResult::Success
            );
            assert_eq!(sink, [0, 1, 2, 3, 4, 5, 6, 7]);
        }
        release_and_join(device, thread);
    }

    #[test]
    fn invalid_utf8_module_name_rejected() {
        let (device, thread) = loopback();

        let bad = [0xFFu8, 0xFE, 0x00];
        let mut value: LfValue = 0;
        // SAFETY: The byte string is NUL-terminated.
        let result = unsafe {
            lf_invoke(
                device,
                bad.as_ptr() as *const c_char,
                0,
                std::ptr::null_mut(),
                WireType::Void.tag(),
                &mut value,
            )
        };
        assert_eq!(result, LfResult::InvalidString);
        release_and_join(device, thread);
    }

    #[test]
    fn illegal_return_tag_rejected() {
        let (device, thread) = loopback();

        let mut value: LfValue = 0;
        // SAFETY: Valid locals and handles throughout.
        let result = unsafe {
            lf_invoke(device, c"math".as_ptr(), 0, std::ptr::null_mut(), 5, &mut value)
        };
        assert_eq!(result, LfResult::IllegalType);
        release_and_join(device, thread);
    }
}
