//! Wire model for the mculink message runtime.
//!
//! Everything that crosses the channel between a host and a device lives
//! here: the ten scalar wire types, the typed argument list, the fixed
//! 64-byte packet codec with its CRC-16 integrity check, the result and
//! configuration records, and the fault codes shared by both ends of the
//! link.
//!
//! All multi-byte integers on the wire are little-endian.

pub mod args;
pub mod crc;
pub mod error;
pub mod fault;
pub mod packet;
pub mod types;

pub use args::{Arg, ArgList, MAX_ARGC};
pub use crc::{crc16, identifier, Crc16};
pub use error::{Result, WireError};
pub use fault::Fault;
pub use packet::{
    encode_configuration, encode_invocation, encode_push_pull, parse, Body, CallResult,
    Configuration, InvocationBody, Packet, PacketClass, PushPullBody, RawPacket,
    ATTRIBUTE_32_BIT, ATTRIBUTE_BIG_ENDIAN, CONFIGURATION_SIZE, HEADER_SIZE, LOADER_LOOKUP,
    LOADER_MODULE, MAGIC, MODULE_NOT_LOADED, PACKET_SIZE, RESULT_SIZE, USER_INVOCATION_BIT,
};
pub use types::{PointerWidth, WireType};
