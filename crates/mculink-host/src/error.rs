use mculink_transport::TransportError;
use mculink_wire::{fault, Fault, WireError};

/// Errors raised by host-side operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// No device is attached or selected.
    #[error("no device attached")]
    NoDevice,

    /// The device at the endpoint is not the one asked for.
    #[error("device '{0}' replied with a mismatched identifier")]
    Identity(String),

    /// The module shim has not been bound to a device module.
    #[error("module '{0}' has not been bound to a device module")]
    Unbound(String),

    /// The device's loader knows no module with this identifier.
    #[error("no module with identifier {0:#06x} is loaded on the device")]
    NotLoaded(u16),

    /// A device or module name exceeds the 15-byte wire limit.
    #[error("name '{0}' is longer than 15 bytes")]
    Name(String),

    /// The device completed the transaction but reported a fault.
    #[error("device reported a fault: {0}")]
    Device(Fault),

    /// A packet or record failed to encode or decode.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The channel to the device failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl HostError {
    /// The fault code this error corresponds to.
    pub fn fault(&self) -> Fault {
        match self {
            HostError::NoDevice | HostError::Identity(_) => Fault::NoDevice,
            HostError::Unbound(_) | HostError::NotLoaded(_) => Fault::Module,
            HostError::Name(_) => Fault::Name,
            HostError::Device(fault) => *fault,
            HostError::Wire(err) => err.fault(),
            HostError::Transport(_) => Fault::Endpoint,
        }
    }
}

/// Latch the error's fault into the thread-local slot on the way out.
/// Every fallible public operation funnels its error through here.
pub(crate) fn latch(err: HostError) -> HostError {
    fault::raise(err.fault());
    err
}

pub type Result<T> = std::result::Result<T, HostError>;
