//! The fixed-size packet codec.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! ┌───────────┬────────────┬───────────┬─────────┬──────────┬────────────────┐
//! │ magic     │ checksum   │ length    │ class   │ reserved │ body           │
//! │ (2B)      │ (2B)       │ (2B)      │ (1B)    │ (1B)     │ (class-shaped) │
//! │ 0xFE1A    │ CRC-16     │ used len  │         │ 0        │                │
//! └───────────┴────────────┴───────────┴─────────┴──────────┴────────────────┘
//! ```
//!
//! The checksum is the CRC-16 of the used packet bytes with the checksum
//! field zeroed. The whole 64-byte buffer travels on the channel
//! regardless of `length`; parsing only trusts the used prefix.

use bytes::Bytes;

use crate::args::{ArgList, MAX_ARGC};
use crate::crc::{crc16, Crc16};
use crate::error::{Result, WireError};
use crate::fault::Fault;
use crate::types::{PointerWidth, WireType};

/// Packet magic.
pub const MAGIC: u16 = 0xFE1A;

/// Fixed packet buffer capacity. One buffer, one transaction.
pub const PACKET_SIZE: usize = 64;

/// Wire size of the packet header.
pub const HEADER_SIZE: usize = 8;

/// Wire size of a [`CallResult`].
pub const RESULT_SIZE: usize = 12;

/// Wire size of a [`Configuration`] record.
pub const CONFIGURATION_SIZE: usize = 21;

/// Bit of the module index that marks a user invocation: the target
/// lives in a dynamically loaded module.
pub const USER_INVOCATION_BIT: u8 = 0x80;

/// Module index of the device's dynamic loader.
pub const LOADER_MODULE: u8 = 0;

/// Loader function: `index(identifier: u16) -> u16`.
pub const LOADER_LOOKUP: u8 = 0;

/// Loader reply when no module matches the identifier.
pub const MODULE_NOT_LOADED: u16 = 0xFFFF;

/// Fixed offset of an invocation body.
const CALL_OFFSET: usize = HEADER_SIZE;
/// Fixed offset of the sub-invocation inside a push/pull body.
const PUSH_PULL_CALL_OFFSET: usize = HEADER_SIZE + 4;
/// Bytes of an invocation body before its parameter region.
const CALL_FIXED: usize = 12;

/// Packet class: selects the body shape and the device-side handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketClass {
    /// Header only; the device replies with its configuration record.
    Configuration = 0,
    /// Call into a built-in module.
    Invocation = 1,
    /// Call into a dynamically loaded module.
    UserInvocation = 2,
    /// Stage an executable image into device RAM; raw bytes follow.
    RamLoad = 3,
    /// Copy raw bytes into fresh device memory; raw bytes follow.
    Send = 4,
    /// Bulk transfer toward the device, then a function call.
    Push = 5,
    /// Copy raw bytes out of device memory; raw bytes follow back.
    Receive = 6,
    /// Function call, then a bulk transfer toward the host.
    Pull = 7,
    /// Reserved.
    Event = 8,
}

impl PacketClass {
    pub fn from_code(code: u8) -> Option<PacketClass> {
        match code {
            0 => Some(PacketClass::Configuration),
            1 => Some(PacketClass::Invocation),
            2 => Some(PacketClass::UserInvocation),
            3 => Some(PacketClass::RamLoad),
            4 => Some(PacketClass::Send),
            5 => Some(PacketClass::Push),
            6 => Some(PacketClass::Receive),
            7 => Some(PacketClass::Pull),
            8 => Some(PacketClass::Event),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// An encoded packet, always transferred whole.
#[derive(Clone)]
pub struct RawPacket([u8; PACKET_SIZE]);

impl RawPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Mutable access to the buffer, for tests and transports that patch
    /// packets in place.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// The used length recorded in the header.
    pub fn header_length(&self) -> usize {
        u16::from_le_bytes([self.0[4], self.0[5]]).into()
    }
}

impl std::fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawPacket(len={})", self.header_length())
    }
}

/// A parsed and integrity-checked packet.
#[derive(Debug, Clone)]
pub struct Packet {
    pub class: PacketClass,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub enum Body {
    Configuration,
    Invocation(InvocationBody),
    PushPull(PushPullBody),
    Event,
}

/// The call description carried by invocation and push/pull packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationBody {
    pub module: u8,
    pub function: u8,
    pub ret: WireType,
    pub argc: u8,
    /// Packed 4-bit type tags, low nibble is argument zero.
    pub types: u64,
    /// Concatenated narrowed little-endian argument values.
    pub parameters: Bytes,
}

/// Body of the bulk-transfer classes: the byte count on the channel plus
/// the call to run on the device side of the transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPullBody {
    pub length: u32,
    pub call: InvocationBody,
}

/// The fixed-size reply that ends every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallResult {
    pub value: u64,
    pub error: u32,
}

impl CallResult {
    pub fn new(value: u64, fault: Fault) -> Self {
        Self { value, error: fault.code() }
    }

    /// True iff the call completed without a runtime fault. `value` is
    /// meaningful only in that case, but is always transmitted.
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }

    pub fn fault(&self) -> Fault {
        Fault::from_code(self.error)
    }

    pub fn encode(&self) -> [u8; RESULT_SIZE] {
        let mut buf = [0u8; RESULT_SIZE];
        buf[..8].copy_from_slice(&self.value.to_le_bytes());
        buf[8..].copy_from_slice(&self.error.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<CallResult> {
        if bytes.len() < RESULT_SIZE {
            return Err(WireError::Truncated);
        }
        Ok(CallResult {
            value: u64::from_le_bytes(bytes[..8].try_into().unwrap()),
            error: u32::from_le_bytes(bytes[8..RESULT_SIZE].try_into().unwrap()),
        })
    }
}

/// Device attribute bit: 32-bit pointers (clear means 16-bit).
pub const ATTRIBUTE_32_BIT: u8 = 1 << 0;
/// Device attribute bit: big-endian device (clear means little-endian).
pub const ATTRIBUTE_BIG_ENDIAN: u8 = 1 << 1;

/// The record a device returns for a configuration-class packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub name: String,
    /// CRC-16 of the bare device name.
    pub identifier: u16,
    pub version: u16,
    pub attributes: u8,
}

impl Configuration {
    /// Bounded name: 15 bytes plus the NUL terminator on the wire.
    pub const NAME_CAPACITY: usize = 15;

    pub fn new(name: &str, version: u16, attributes: u8) -> Result<Configuration> {
        if name.len() > Self::NAME_CAPACITY {
            return Err(WireError::Name(name.to_string()));
        }
        Ok(Configuration {
            name: name.to_string(),
            identifier: crc16(name.as_bytes()),
            version,
            attributes,
        })
    }

    pub fn pointer_width(&self) -> PointerWidth {
        if self.attributes & ATTRIBUTE_32_BIT != 0 {
            PointerWidth::U32
        } else {
            PointerWidth::U16
        }
    }

    pub fn encode(&self) -> [u8; CONFIGURATION_SIZE] {
        let mut buf = [0u8; CONFIGURATION_SIZE];
        buf[..self.name.len()].copy_from_slice(self.name.as_bytes());
        buf[16..18].copy_from_slice(&self.identifier.to_le_bytes());
        buf[18..20].copy_from_slice(&self.version.to_le_bytes());
        buf[20] = self.attributes;
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Configuration> {
        if bytes.len() < CONFIGURATION_SIZE {
            return Err(WireError::Truncated);
        }
        let name_field = &bytes[..16];
        let end = name_field.iter().position(|&b| b == 0).unwrap_or(Self::NAME_CAPACITY);
        let name = std::str::from_utf8(&name_field[..end])
            .map_err(|_| WireError::Name(String::from_utf8_lossy(&name_field[..end]).into_owned()))?
            .to_string();
        Ok(Configuration {
            name,
            identifier: u16::from_le_bytes(bytes[16..18].try_into().unwrap()),
            version: u16::from_le_bytes(bytes[18..20].try_into().unwrap()),
            attributes: bytes[20],
        })
    }
}

/// Build a configuration-class packet (header only).
pub fn encode_configuration() -> RawPacket {
    let mut buf = [0u8; PACKET_SIZE];
    write_header(&mut buf, HEADER_SIZE, PacketClass::Configuration);
    seal(&mut buf, HEADER_SIZE);
    RawPacket(buf)
}

/// Build an invocation packet. The class is standard unless `module` has
/// the user-invocation bit set. The argument list is consumed.
pub fn encode_invocation(
    module: u8,
    function: u8,
    ret: WireType,
    args: ArgList,
    pointer: PointerWidth,
) -> Result<RawPacket> {
    let class = if module & USER_INVOCATION_BIT != 0 {
        PacketClass::UserInvocation
    } else {
        PacketClass::Invocation
    };

    let mut buf = [0u8; PACKET_SIZE];
    let length = write_call(&mut buf, CALL_OFFSET, module, function, ret, &args, pointer)?;
    write_header(&mut buf, length, class);
    seal(&mut buf, length);
    Ok(RawPacket(buf))
}

/// Build a bulk-transfer packet: `transfer` bytes on the channel plus
/// the call to run on the device side. The argument list is consumed;
/// for push/pull classes its first two entries are the implicit
/// `(Ptr, U32 length)` pair.
pub fn encode_push_pull(
    class: PacketClass,
    module: u8,
    function: u8,
    ret: WireType,
    transfer: u32,
    args: ArgList,
    pointer: PointerWidth,
) -> Result<RawPacket> {
    debug_assert!(matches!(
        class,
        PacketClass::RamLoad
            | PacketClass::Send
            | PacketClass::Push
            | PacketClass::Receive
            | PacketClass::Pull
    ));

    let mut buf = [0u8; PACKET_SIZE];
    buf[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&transfer.to_le_bytes());
    let length = write_call(
        &mut buf,
        PUSH_PULL_CALL_OFFSET,
        module,
        function,
        ret,
        &args,
        pointer,
    )?;
    write_header(&mut buf, length, class);
    seal(&mut buf, length);
    Ok(RawPacket(buf))
}

/// Parse and validate a received packet.
///
/// Checks, in order: magic, length bounds, CRC-16 over the used bytes
/// with the checksum field zeroed, class, then body-specific bounds.
pub fn parse(bytes: &[u8]) -> Result<Packet> {
    if bytes.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }

    let magic = u16::from_le_bytes(bytes[..2].try_into().unwrap());
    if magic != MAGIC {
        return Err(WireError::Magic);
    }

    let length = usize::from(u16::from_le_bytes(bytes[4..6].try_into().unwrap()));
    let capacity = bytes.len().min(PACKET_SIZE);
    if length < HEADER_SIZE || length > capacity {
        return Err(WireError::Length { length, min: HEADER_SIZE, max: capacity });
    }

    let expected = u16::from_le_bytes(bytes[2..4].try_into().unwrap());
    let mut crc = Crc16::new();
    crc.update(&bytes[..2]);
    crc.update(&[0, 0]);
    crc.update(&bytes[4..length]);
    let computed = crc.finish();
    if expected != computed {
        return Err(WireError::Checksum { expected, computed });
    }

    let class = PacketClass::from_code(bytes[6]).ok_or(WireError::Class(bytes[6]))?;

    let body = match class {
        PacketClass::Configuration => Body::Configuration,
        PacketClass::Invocation | PacketClass::UserInvocation => {
            Body::Invocation(parse_call(bytes, CALL_OFFSET, length)?)
        }
        PacketClass::RamLoad
        | PacketClass::Send
        | PacketClass::Push
        | PacketClass::Receive
        | PacketClass::Pull => {
            if length < PUSH_PULL_CALL_OFFSET {
                return Err(WireError::Truncated);
            }
            let transfer = u32::from_le_bytes(bytes[HEADER_SIZE..HEADER_SIZE + 4].try_into().unwrap());
            Body::PushPull(PushPullBody {
                length: transfer,
                call: parse_call(bytes, PUSH_PULL_CALL_OFFSET, length)?,
            })
        }
        PacketClass::Event => Body::Event,
    };

    Ok(Packet { class, body })
}

fn write_header(buf: &mut [u8; PACKET_SIZE], length: usize, class: PacketClass) {
    buf[..2].copy_from_slice(&MAGIC.to_le_bytes());
    // Checksum field stays zero until seal().
    buf[4..6].copy_from_slice(&(length as u16).to_le_bytes());
    buf[6] = class.code();
}

/// Compute the CRC over the used bytes (checksum field is still zero)
/// and patch it into the header. Always the last step of encoding.
fn seal(buf: &mut [u8; PACKET_SIZE], length: usize) {
    let checksum = crc16(&buf[..length]);
    buf[2..4].copy_from_slice(&checksum.to_le_bytes());
}

fn write_call(
    buf: &mut [u8; PACKET_SIZE],
    at: usize,
    module: u8,
    function: u8,
    ret: WireType,
    args: &ArgList,
    pointer: PointerWidth,
) -> Result<usize> {
    buf[at] = module;
    buf[at + 1] = function;
    buf[at + 2] = ret.tag();
    buf[at + 3] = args.len() as u8;
    buf[at + 4..at + CALL_FIXED].copy_from_slice(&args.types_word().to_le_bytes());

    let mut parameters = Vec::new();
    for arg in args {
        arg.ty.pack(arg.value, pointer, &mut parameters);
    }

    let length = at + CALL_FIXED + parameters.len();
    if length > PACKET_SIZE {
        return Err(WireError::BodyOverflow { capacity: PACKET_SIZE });
    }
    buf[at + CALL_FIXED..length].copy_from_slice(&parameters);
    Ok(length)
}

fn parse_call(bytes: &[u8], at: usize, length: usize) -> Result<InvocationBody> {
    if length < at + CALL_FIXED {
        return Err(WireError::Truncated);
    }

    let ret_tag = bytes[at + 2];
    let ret = WireType::from_tag(ret_tag).ok_or(WireError::IllegalType(ret_tag))?;
    let argc = bytes[at + 3];
    if usize::from(argc) > MAX_ARGC {
        return Err(WireError::ArgumentOverflow { max: MAX_ARGC });
    }

    Ok(InvocationBody {
        module: bytes[at],
        function: bytes[at + 1],
        ret,
        argc,
        types: u64::from_le_bytes(bytes[at + 4..at + CALL_FIXED].try_into().unwrap()),
        parameters: Bytes::copy_from_slice(&bytes[at + CALL_FIXED..length]),
    })
}
