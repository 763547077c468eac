use crate::error::{Result, WireError};

/// Pointer width of the device, taken from its attribute byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    /// 16-bit device addresses.
    U16,
    /// 32-bit device addresses.
    U32,
}

impl PointerWidth {
    /// Wire width of a pointer-sized value in bytes.
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::U16 => 2,
            PointerWidth::U32 => 4,
        }
    }
}

/// A scalar wire type, encoded as a 4-bit tag.
///
/// The low 3 bits select the width class, bit 3 marks a signed type.
/// Every bit pattern outside this set is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    U8 = 0,
    U16 = 1,
    /// No value. Only legal as a return type.
    Void = 2,
    U32 = 3,
    /// Native unsigned integer, sized by the device's pointer width.
    Uint = 4,
    /// Opaque address in device space, sized by the device's pointer width.
    Ptr = 6,
    U64 = 7,
    I8 = 8,
    I16 = 9,
    I32 = 11,
    I64 = 15,
}

/// Bit of the tag that marks a signed type.
const SIGN_BIT: u8 = 0x8;

impl WireType {
    /// Decode a 4-bit tag, rejecting every pattern outside the closed set.
    pub fn from_tag(tag: u8) -> Option<WireType> {
        match tag {
            0 => Some(WireType::U8),
            1 => Some(WireType::U16),
            2 => Some(WireType::Void),
            3 => Some(WireType::U32),
            4 => Some(WireType::Uint),
            6 => Some(WireType::Ptr),
            7 => Some(WireType::U64),
            8 => Some(WireType::I8),
            9 => Some(WireType::I16),
            11 => Some(WireType::I32),
            15 => Some(WireType::I64),
            _ => None,
        }
    }

    /// The 4-bit wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether values of this type sign-extend.
    pub fn is_signed(self) -> bool {
        self.tag() & SIGN_BIT != 0
    }

    /// Wire width in bytes. `Uint` and `Ptr` are sized by the device.
    pub fn width(self, pointer: PointerWidth) -> usize {
        match self {
            WireType::Void => 0,
            WireType::U8 | WireType::I8 => 1,
            WireType::U16 | WireType::I16 => 2,
            WireType::U32 | WireType::I32 => 4,
            WireType::U64 | WireType::I64 => 8,
            WireType::Uint | WireType::Ptr => pointer.bytes(),
        }
    }

    /// Narrow `value` to this type's wire width and append it to `dst`,
    /// little-endian.
    pub fn pack(self, value: u64, pointer: PointerWidth, dst: &mut Vec<u8>) {
        let width = self.width(pointer);
        dst.extend_from_slice(&value.to_le_bytes()[..width]);
    }

    /// Read one value of this type from the front of `src`.
    ///
    /// Unsigned types zero-extend to 64 bits, signed types sign-extend.
    /// Fails with [`WireError::Truncated`] if `src` is shorter than the
    /// type's wire width.
    pub fn unpack(self, src: &[u8], pointer: PointerWidth) -> Result<u64> {
        let width = self.width(pointer);
        if src.len() < width {
            return Err(WireError::Truncated);
        }

        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&src[..width]);
        let value = u64::from_le_bytes(raw);

        if self.is_signed() {
            Ok(sign_extend(value, width))
        } else {
            Ok(value)
        }
    }
}

/// Sign-extend the low `width` bytes of `value` to 64 bits.
pub(crate) fn sign_extend(value: u64, width: usize) -> u64 {
    debug_assert!((1..=8).contains(&width));
    let shift = 64 - width as u32 * 8;
    (((value << shift) as i64) >> shift) as u64
}
