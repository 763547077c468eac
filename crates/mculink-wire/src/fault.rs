//! Fault codes shared by the host and the device, and the thread-local
//! latching fault slot.
//!
//! The numeric values are part of the wire contract: they travel in the
//! `error` field of every [`crate::packet::CallResult`].

use std::cell::Cell;

/// A runtime fault. `Ok` means no fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(u32)]
pub enum Fault {
    #[error("no error")]
    Ok = 0,
    #[error("memory allocation failed")]
    Malloc = 1,
    #[error("null or out-of-range reference")]
    Null = 2,
    #[error("value or count out of bounds")]
    Overflow = 3,
    #[error("no device")]
    NoDevice = 4,
    #[error("endpoint failure")]
    Endpoint = 5,
    #[error("message runtime failure")]
    Runtime = 6,
    #[error("checksum mismatch")]
    Checksum = 7,
    #[error("invalid packet class")]
    Subclass = 8,
    #[error("illegal type")]
    Type = 9,
    #[error("unknown module")]
    Module = 10,
    #[error("invalid name")]
    Name = 11,
    #[error("test failure")]
    Test = 12,
}

impl Fault {
    /// The wire representation of this fault.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decode a wire error code. Codes outside the enumeration collapse
    /// to `Runtime` so a newer peer cannot wedge an older one.
    pub fn from_code(code: u32) -> Fault {
        match code {
            0 => Fault::Ok,
            1 => Fault::Malloc,
            2 => Fault::Null,
            3 => Fault::Overflow,
            4 => Fault::NoDevice,
            5 => Fault::Endpoint,
            6 => Fault::Runtime,
            7 => Fault::Checksum,
            8 => Fault::Subclass,
            9 => Fault::Type,
            10 => Fault::Module,
            11 => Fault::Name,
            12 => Fault::Test,
            _ => Fault::Runtime,
        }
    }
}

thread_local! {
    static SLOT: Cell<Fault> = const { Cell::new(Fault::Ok) };
}

/// Latch a fault into the thread-local slot.
///
/// The slot keeps its value across later successful operations; only
/// [`get`] or [`clear`] resets it.
pub fn raise(fault: Fault) {
    SLOT.with(|slot| slot.set(fault));
}

/// Read and clear the thread-local fault slot.
pub fn get() -> Fault {
    SLOT.with(|slot| slot.replace(Fault::Ok))
}

/// Clear the thread-local fault slot without reading it.
pub fn clear() {
    SLOT.with(|slot| slot.set(Fault::Ok));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_latches_until_read() {
        clear();
        raise(Fault::Checksum);
        // A later success does not clear the slot by itself.
        assert_eq!(get(), Fault::Checksum);
        assert_eq!(get(), Fault::Ok);
    }

    #[test]
    fn later_raise_overwrites() {
        clear();
        raise(Fault::Null);
        raise(Fault::Module);
        assert_eq!(get(), Fault::Module);
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(Fault::Ok.code(), 0);
        assert_eq!(Fault::Checksum.code(), 7);
        assert_eq!(Fault::Subclass.code(), 8);
        assert_eq!(Fault::Type.code(), 9);
        assert_eq!(Fault::Test.code(), 12);
    }

    #[test]
    fn unknown_codes_collapse_to_runtime() {
        assert_eq!(Fault::from_code(400), Fault::Runtime);
        for code in 0..=12 {
            assert_eq!(Fault::from_code(code).code(), code);
        }
    }
}
