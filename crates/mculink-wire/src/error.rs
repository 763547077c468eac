use crate::fault::Fault;

/// Errors raised while building or parsing wire data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The packet magic does not match [`crate::packet::MAGIC`].
    #[error("packet magic mismatch (expected 0xFE1A)")]
    Magic,

    /// The transmitted checksum does not match the computed CRC-16.
    #[error("packet checksum mismatch (expected {expected:#06x}, computed {computed:#06x})")]
    Checksum { expected: u16, computed: u16 },

    /// The header length field is outside the valid range.
    #[error("packet length {length} outside {min}..={max}")]
    Length { length: usize, min: usize, max: usize },

    /// The packet class byte is not one of the enumerated classes.
    #[error("unknown packet class {0:#04x}")]
    Class(u8),

    /// A type tag outside the closed set of wire types.
    #[error("illegal wire type tag {0:#03x}")]
    IllegalType(u8),

    /// The argument list already holds [`crate::MAX_ARGC`] entries.
    #[error("argument list full ({max} arguments)")]
    ArgumentOverflow { max: usize },

    /// The encoded body does not fit the fixed packet buffer.
    #[error("packet body does not fit the {capacity}-byte packet")]
    BodyOverflow { capacity: usize },

    /// The buffer ended before the structure it should contain.
    #[error("truncated wire data")]
    Truncated,

    /// A name exceeds the 15-byte wire limit.
    #[error("name '{0}' is longer than 15 bytes")]
    Name(String),
}

impl WireError {
    /// The fault code this error maps to on the wire.
    pub fn fault(&self) -> Fault {
        match self {
            WireError::Magic | WireError::Checksum { .. } => Fault::Checksum,
            WireError::Length { .. }
            | WireError::ArgumentOverflow { .. }
            | WireError::BodyOverflow { .. }
            | WireError::Truncated => Fault::Overflow,
            WireError::Class(_) => Fault::Subclass,
            WireError::IllegalType(_) => Fault::Type,
            WireError::Name(_) => Fault::Name,
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
