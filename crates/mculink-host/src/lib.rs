//! Host-side invocation engine for the mculink message runtime.
//!
//! A [`Device`] wraps one endpoint plus the configuration record read at
//! attach time. Invocations build a typed call packet, transfer it, and
//! block until the device's result comes back; bulk operations move raw
//! bytes in the documented order around the same request/reply pair.
//!
//! Module shims ([`Module`]) name a device-side module and resolve its
//! index at bind time through the device's dynamic loader.

pub mod device;
pub mod error;
mod invoke;
pub mod module;

pub use device::{
    attach_endpoint, attach_tcp, attach_unix, attach_usb, attach_usb_in, detach, select, selected,
    Device,
};
pub use error::{HostError, Result};
pub use module::Module;
