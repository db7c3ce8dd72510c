//! Bit access on the packed integer of a struct.
//!
//! The integer is held as its little-endian byte image: bit `i` is bit
//! `i % 8` of byte `i / 8`. Big-endian buffers are the same image reversed,
//! so a layout of any size maps onto bytes without a wide integer type.
//!
//! Callers check bounds once against the layout; the functions here index
//! the image directly.

use crate::layout::Endianness;

/// `n` low bits set (n <= 64).
pub fn low_mask(n: usize) -> u64 {
    if n >= 64 { u64::MAX } else { (1u64 << n) - 1 }
}

/// Reads `n` bits (max 64) starting at `bit_pos` as an unsigned value.
pub fn read_bits_at(image: &[u8], bit_pos: usize, n: usize) -> u64 {
    debug_assert!(n <= 64);

    let mut value = 0u64;
    let mut done = 0;

    while done < n {
        let pos = bit_pos + done;
        let shift = pos % 8;
        let take = (8 - shift).min(n - done);
        let chunk = u64::from(image[pos / 8] >> shift) & low_mask(take);
        value |= chunk << done;
        done += take;
    }

    value
}

/// Writes the low `n` bits of `value` at `bit_pos`, replacing what was there.
pub fn write_bits_at(image: &mut [u8], bit_pos: usize, n: usize, value: u64) {
    debug_assert!(n <= 64);

    let mut done = 0;

    while done < n {
        let pos = bit_pos + done;
        let shift = pos % 8;
        let take = (8 - shift).min(n - done);
        let chunk = ((value >> done) & low_mask(take)) as u8;
        let keep = !((low_mask(take) as u8) << shift);
        image[pos / 8] = (image[pos / 8] & keep) | (chunk << shift);
        done += take;
    }
}

/// Converts serialized bytes into the little-endian image.
pub fn to_image(data: &[u8], endianness: Endianness) -> Vec<u8> {
    let mut image = data.to_vec();
    if endianness == Endianness::Big {
        image.reverse();
    }
    image
}

/// Converts the little-endian image into serialized bytes.
pub fn from_image(mut image: Vec<u8>, endianness: Endianness) -> Vec<u8> {
    if endianness == Endianness::Big {
        image.reverse();
    }
    image
}
