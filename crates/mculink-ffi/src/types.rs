use std::ffi::c_void;
use std::sync::Arc;

use mculink_host::Device;
use mculink_wire::ArgList;

/// Result of every C-ABI call.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfResult {
    Success = 0,
    NullPointer = 1,
    InvalidString = 2,
    PackageNotLoaded = 3,
    NoDevicesFound = 4,
    IndexOutOfBounds = 5,
    IllegalType = 6,
    InvocationError = 7,
    IllegalHandle = 8,
}

/// Opaque handle passed across the ABI. Allocated by this library,
/// released with `lf_release`.
pub type LfHandle = *mut c_void;

/// 64-bit holding cell for argument and return values.
pub type LfValue = u64;

/// 4-bit wire type tag, carried in a byte.
pub type LfType = u8;

/// Function index within a module.
pub type LfFunction = u8;

/// Everything a handle can point at. The tag lets `lf_release` free any
/// handle kind and lets each accessor reject the wrong kind with
/// `IllegalHandle` instead of corrupting memory.
pub(crate) enum Handle {
    Devices(Vec<Arc<Device>>),
    Device(Arc<Device>),
    Args(ArgList),
}

impl Handle {
    pub(crate) fn into_raw(self) -> LfHandle {
        Box::into_raw(Box::new(self)) as LfHandle
    }
}
