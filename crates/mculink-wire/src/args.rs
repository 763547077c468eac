use crate::error::{Result, WireError};
use crate::types::WireType;

/// Maximum arity of an invocation. Sixteen 4-bit tags fill the 64-bit
/// type word exactly.
pub const MAX_ARGC: usize = 16;

/// One typed argument. Values narrower than 64 bits are held
/// zero-extended and re-narrowed when the packet is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arg {
    pub ty: WireType,
    pub value: u64,
}

impl From<u8> for Arg {
    fn from(value: u8) -> Arg {
        Arg { ty: WireType::U8, value: value.into() }
    }
}

impl From<u16> for Arg {
    fn from(value: u16) -> Arg {
        Arg { ty: WireType::U16, value: value.into() }
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Arg {
        Arg { ty: WireType::U32, value: value.into() }
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Arg {
        Arg { ty: WireType::U64, value }
    }
}

impl From<i8> for Arg {
    fn from(value: i8) -> Arg {
        Arg { ty: WireType::I8, value: value as u8 as u64 }
    }
}

impl From<i16> for Arg {
    fn from(value: i16) -> Arg {
        Arg { ty: WireType::I16, value: value as u16 as u64 }
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Arg {
        Arg { ty: WireType::I32, value: value as u32 as u64 }
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Arg {
        Arg { ty: WireType::I64, value: value as u64 }
    }
}

/// An ordered, growable argument list with a strict maximum arity.
///
/// Append order is wire order is native-call parameter order. The list
/// is consumed exactly once, by packet construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgList {
    args: Vec<Arg>,
}

impl ArgList {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Append a `(value, type)` pair.
    ///
    /// Rejects `Void` (only legal as a return type) with
    /// [`WireError::IllegalType`] and a full list with
    /// [`WireError::ArgumentOverflow`]; neither mutates the list.
    pub fn append(&mut self, value: u64, ty: WireType) -> Result<()> {
        if ty == WireType::Void {
            return Err(WireError::IllegalType(ty.tag()));
        }
        if self.args.len() == MAX_ARGC {
            return Err(WireError::ArgumentOverflow { max: MAX_ARGC });
        }
        self.args.push(Arg { ty, value });
        Ok(())
    }

    /// Append anything convertible into an [`Arg`].
    pub fn append_arg(&mut self, arg: impl Into<Arg>) -> Result<()> {
        let arg = arg.into();
        self.append(arg.value, arg.ty)
    }

    /// Fluent variant of [`ArgList::append_arg`] for building literals.
    pub fn with(mut self, arg: impl Into<Arg>) -> Result<Self> {
        self.append_arg(arg)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arg> {
        self.args.iter()
    }

    /// The packed 64-bit type word: 4 bits per argument, low nibble is
    /// argument zero.
    pub fn types_word(&self) -> u64 {
        self.args
            .iter()
            .enumerate()
            .fold(0u64, |word, (i, arg)| {
                word | (u64::from(arg.ty.tag() & 0xF) << (i * 4))
            })
    }
}

impl<'a> IntoIterator for &'a ArgList {
    type Item = &'a Arg;
    type IntoIter = std::slice::Iter<'a, Arg>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}
