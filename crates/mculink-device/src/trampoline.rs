//! The typed call trampoline.
//!
//! Marshals a packed argument blob into a native call frame, performs
//! the indirect call, and normalizes the raw return register into a
//! `u64` according to the declared return type.
//!
//! Per call: unpack → call → normalize → reply. The perform engine
//! processes one packet at a time, so the trampoline is never re-entered
//! on a channel.

use mculink_wire::{fault, Fault, PointerWidth, WireType, MAX_ARGC};

/// Returned in place of a value when the trampoline itself fails; the
/// real outcome is the fault latched in the thread-local slot.
pub const SENTINEL: u64 = u64::MAX;

/// Perform a native call from wire-encoded arguments.
///
/// Walks `types` four bits at a time, reading each argument from `argv`
/// at its wire width (`Ptr`/`Uint` use the device's pointer width);
/// signed arguments sign-extend into the 64-bit frame. The entry point
/// is then invoked with the frame, and its raw return is normalized per
/// `ret`.
///
/// Failure modes latch a fault and return [`SENTINEL`]: an unknown or
/// `Void` tag mid-unpack latches `Type`, an argument region shorter
/// than the types demand latches `Overflow`.
pub fn call(
    entry: &dyn Fn(&[u64]) -> u64,
    ret: WireType,
    argc: u8,
    types: u64,
    argv: &[u8],
    pointer: PointerWidth,
) -> u64 {
    let argc = usize::from(argc).min(MAX_ARGC);
    let mut frame = [0u64; MAX_ARGC];
    let mut offset = 0usize;

    for (i, slot) in frame.iter_mut().enumerate().take(argc) {
        let tag = ((types >> (i * 4)) & 0xF) as u8;
        let ty = match WireType::from_tag(tag) {
            Some(ty) if ty != WireType::Void => ty,
            _ => {
                fault::raise(Fault::Type);
                return SENTINEL;
            }
        };

        let width = ty.width(pointer);
        match ty.unpack(&argv[offset.min(argv.len())..], pointer) {
            Ok(value) => *slot = value,
            Err(_) => {
                fault::raise(Fault::Overflow);
                return SENTINEL;
            }
        }
        offset += width;
    }

    let raw = entry(&frame[..argc]);
    normalize(raw, ret, pointer)
}

/// Normalize a raw return register pair into a `u64`.
///
/// Unsigned returns zero-extend from their wire width, signed returns
/// sign-extend, `Void` is zero.
pub fn normalize(raw: u64, ret: WireType, pointer: PointerWidth) -> u64 {
    let width = ret.width(pointer);
    match width {
        0 => 0,
        8 => raw,
        _ if ret.is_signed() => {
            let shift = 64 - width as u32 * 8;
            (((raw << shift) as i64) >> shift) as u64
        }
        _ => raw & (u64::MAX >> (64 - width as u32 * 8)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mculink_wire::ArgList;

    fn packed(args: &ArgList, pointer: PointerWidth) -> (u64, Vec<u8>) {
        let mut bytes = Vec::new();
        for arg in args {
            arg.ty.pack(arg.value, pointer, &mut bytes);
        }
        (args.types_word(), bytes)
    }

    #[test]
    fn arguments_arrive_in_call_order() {
        let mut args = ArgList::new();
        args.append(10, WireType::U8).unwrap();
        args.append(2000, WireType::U16).unwrap();
        args.append(0xDEAD_BEEF, WireType::U32).unwrap();
        let (types, argv) = packed(&args, PointerWidth::U32);

        let value = call(
            &|frame: &[u64]| {
                assert_eq!(frame, &[10, 2000, 0xDEAD_BEEF]);
                frame[0] + frame[1]
            },
            WireType::U32,
            3,
            types,
            &argv,
            PointerWidth::U32,
        );
        assert_eq!(value, 2010);
    }

    #[test]
    fn signed_arguments_sign_extend_into_the_frame() {
        let mut args = ArgList::new();
        args.append_arg(-5i16).unwrap();
        let (types, argv) = packed(&args, PointerWidth::U32);

        call(
            &|frame: &[u64]| {
                assert_eq!(frame[0] as i64, -5);
                0
            },
            WireType::Void,
            1,
            types,
            &argv,
            PointerWidth::U32,
        );
    }

    #[test]
    fn signed_return_sign_extends() {
        // A function returning i16 whose raw register reads 0xFFFF.
        let value = call(
            &|_: &[u64]| 0xFFFF,
            WireType::I16,
            0,
            0,
            &[],
            PointerWidth::U32,
        );
        assert_eq!(value, 0xFFFF_FFFF_FFFF_FFFF);
    }

    #[test]
    fn unsigned_return_zero_extends() {
        let value = call(
            &|_: &[u64]| 0xAAAA_BBBB_CCCC_DDDD,
            WireType::U16,
            0,
            0,
            &[],
            PointerWidth::U32,
        );
        assert_eq!(value, 0xDDDD);
    }

    #[test]
    fn void_return_is_zero() {
        let value = call(
            &|_: &[u64]| 0x1234_5678,
            WireType::Void,
            0,
            0,
            &[],
            PointerWidth::U32,
        );
        assert_eq!(value, 0);
    }

    #[test]
    fn pointer_return_masks_to_device_width() {
        let value = call(
            &|_: &[u64]| 0xFFFF_FFFF_2000_0004,
            WireType::Ptr,
            0,
            0,
            &[],
            PointerWidth::U32,
        );
        assert_eq!(value, 0x2000_0004);
    }

    #[test]
    fn unknown_tag_mid_unpack_latches_type_fault() {
        mculink_wire::fault::clear();
        // Second nibble is 5, an invalid tag.
        let value = call(
            &|_: &[u64]| 0,
            WireType::Void,
            2,
            0x50,
            &[0xAA, 0xBB],
            PointerWidth::U32,
        );
        assert_eq!(value, SENTINEL);
        assert_eq!(mculink_wire::fault::get(), Fault::Type);
    }

    #[test]
    fn void_argument_tag_latches_type_fault() {
        mculink_wire::fault::clear();
        let value = call(
            &|_: &[u64]| 0,
            WireType::Void,
            1,
            WireType::Void.tag() as u64,
            &[],
            PointerWidth::U32,
        );
        assert_eq!(value, SENTINEL);
        assert_eq!(mculink_wire::fault::get(), Fault::Type);
    }

    #[test]
    fn truncated_argument_region_latches_overflow() {
        mculink_wire::fault::clear();
        // One u32 argument but only two bytes of parameters.
        let value = call(
            &|_: &[u64]| 0,
            WireType::Void,
            1,
            WireType::U32.tag() as u64,
            &[0x01, 0x02],
            PointerWidth::U32,
        );
        assert_eq!(value, SENTINEL);
        assert_eq!(mculink_wire::fault::get(), Fault::Overflow);
    }

    #[test]
    fn pointer_arguments_use_device_width() {
        let mut args = ArgList::new();
        args.append(0x1234, WireType::Ptr).unwrap();
        args.append(7, WireType::U8).unwrap();
        let (types, argv) = packed(&args, PointerWidth::U16);
        assert_eq!(argv.len(), 3);

        call(
            &|frame: &[u64]| {
                assert_eq!(frame, &[0x1234, 7]);
                0
            },
            WireType::Void,
            2,
            types,
            &argv,
            PointerWidth::U16,
        );
    }
}
