use mculink_wire::{ArgList, WireError, WireType};

use crate::error;
use crate::types::{Handle, LfHandle, LfResult, LfType, LfValue};

/// Create an empty argument list for `lf_invoke`.
///
/// The list grows as arguments are appended and must be released with
/// `lf_release`.
///
/// # Safety
/// `argv` must be a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn lf_create_args(argv: *mut LfHandle) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        if argv.is_null() {
            return error::set_null_pointer("argv cannot be null");
        }

        // SAFETY: Checked for null above.
        unsafe {
            *argv = Handle::Args(ArgList::new()).into_raw();
        }
        LfResult::Success
    })
}

/// Append a `(value, type)` pair to an argument list.
///
/// Values narrower than 8 bytes are zero-extended into the 64-bit
/// holding cell; the wire narrows them again. Tags outside the type
/// enumeration leave the list untouched and return `IllegalType`; a
/// full list returns `IndexOutOfBounds`.
///
/// # Safety
/// `argv` must be a handle returned by `lf_create_args`.
#[no_mangle]
pub unsafe extern "C" fn lf_append_arg(argv: LfHandle, value: LfValue, kind: LfType) -> LfResult {
    crate::ffi_boundary(LfResult::NullPointer, || {
        error::clear_error_state();

        let Some(ty) = WireType::from_tag(kind) else {
            error::set_error_message(format!("unknown type tag {kind:#x}"));
            return LfResult::IllegalType;
        };

        // SAFETY: Caller guarantees handle validity.
        unsafe {
            crate::with_handle(argv, LfResult::NullPointer, |handle| match handle {
                Handle::Args(args) => match args.append(value, ty) {
                    Ok(()) => LfResult::Success,
                    Err(err @ WireError::IllegalType(_)) => {
                        error::set_error_message(err.to_string());
                        LfResult::IllegalType
                    }
                    Err(err) => {
                        error::set_error_message(err.to_string());
                        LfResult::IndexOutOfBounds
                    }
                },
                _ => error::set_illegal_handle("argv is not an argument list"),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use mculink_wire::MAX_ARGC;

    use super::*;
    use crate::lf_release;

    fn create() -> LfHandle {
        let mut argv: LfHandle = std::ptr::null_mut();
        // SAFETY: argv is a valid local.
        let result = unsafe { lf_create_args(&mut argv) };
        assert_eq!(result, LfResult::Success);
        assert!(!argv.is_null());
        argv
    }

    #[test]
    fn create_append_release() {
        let argv = create();

        // SAFETY: argv was created above.
        unsafe {
            assert_eq!(lf_append_arg(argv, 10, 0), LfResult::Success); // u8
            assert_eq!(lf_append_arg(argv, 1000, 1), LfResult::Success); // u16
            assert_eq!(lf_append_arg(argv, 9, 15), LfResult::Success); // i64
            assert_eq!(lf_release(argv), LfResult::Success);
        }
    }

    #[test]
    fn illegal_tag_rejected() {
        let argv = create();
        // SAFETY: argv was created above.
        unsafe {
            assert_eq!(lf_append_arg(argv, 1, 5), LfResult::IllegalType);
            assert_eq!(lf_append_arg(argv, 1, 2), LfResult::IllegalType); // void
            assert_eq!(lf_release(argv), LfResult::Success);
        }
    }

    #[test]
    fn arity_bound_enforced() {
        let argv = create();
        // SAFETY: argv was created above.
        unsafe {
            for i in 0..MAX_ARGC {
                assert_eq!(lf_append_arg(argv, i as u64, 0), LfResult::Success);
            }
            assert_eq!(lf_append_arg(argv, 0, 0), LfResult::IndexOutOfBounds);
            assert_eq!(lf_release(argv), LfResult::Success);
        }
    }

    #[test]
    fn null_arguments_rejected() {
        // SAFETY: null is explicitly exercised.
        unsafe {
            assert_eq!(lf_create_args(std::ptr::null_mut()), LfResult::NullPointer);
            assert_eq!(lf_append_arg(std::ptr::null_mut(), 0, 0), LfResult::NullPointer);
        }
    }
}
