//! Device-side runtime for the mculink message runtime.
//!
//! A device owns a registry of named modules, each an ordered table of
//! native function entry points. The perform engine accepts one packet
//! at a time from an endpoint, validates it, dispatches by class,
//! through the call trampoline for invocations, through the memory
//! arena for bulk transfers, and replies with a result.

pub mod error;
pub mod image;
pub mod memory;
pub mod perform;
pub mod registry;
pub mod trampoline;

pub use error::{DeviceError, Result};
pub use image::{ImageHeader, IMAGE_HEADER_SIZE};
pub use memory::{DeviceMemory, MEMORY_BASE};
pub use perform::DeviceRuntime;
pub use registry::{Entry, Function, Module, Registry};
pub use trampoline::{call, SENTINEL};
