use mculink_transport::TransportError;
use mculink_wire::{Fault, WireError};

/// Errors raised by the device-side runtime.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The channel to the host failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A packet or record failed to encode or decode.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// A module name exceeds the 15-byte wire limit.
    #[error("module name '{0}' is longer than 15 bytes")]
    Name(String),

    /// No module is registered at the index.
    #[error("no module at index {0:#04x}")]
    NoModule(u8),

    /// The module has no function at the index.
    #[error("no function {function} in module {module:#04x}")]
    NoFunction { module: u8, function: u8 },

    /// The module table is full (indices must fit below the user bit).
    #[error("module table is full")]
    RegistryFull,

    /// The memory arena cannot satisfy an allocation.
    #[error("device memory exhausted ({requested} bytes requested)")]
    OutOfMemory { requested: u32 },

    /// An address range falls outside the memory arena.
    #[error("address {address:#010x}+{length} outside device memory")]
    BadAddress { address: u32, length: u32 },

    /// A bulk packet is missing its implicit pointer argument.
    #[error("bulk transfer call carries no pointer argument")]
    MissingPointer,
}

impl DeviceError {
    /// The fault code this error maps to in a reply.
    pub fn fault(&self) -> Fault {
        match self {
            DeviceError::Transport(_) => Fault::Endpoint,
            DeviceError::Wire(err) => err.fault(),
            DeviceError::Name(_) => Fault::Name,
            DeviceError::NoModule(_) | DeviceError::NoFunction { .. } => Fault::Null,
            DeviceError::RegistryFull => Fault::Overflow,
            DeviceError::OutOfMemory { .. } => Fault::Malloc,
            DeviceError::BadAddress { .. } | DeviceError::MissingPointer => Fault::Null,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
