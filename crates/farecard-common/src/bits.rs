//! Big-endian bit access over byte buffers
//!
//! Bit 0 is the most significant bit of byte 0. Callers are responsible for
//! bounds checks; every function here indexes the buffer directly.

/// Total number of bits in a buffer
#[inline]
pub fn bit_len(buf: &[u8]) -> usize {
    buf.len() * 8
}

/// Read a single bit
#[inline]
pub fn get_bit(buf: &[u8], offset: usize) -> bool {
    (buf[offset / 8] >> (7 - offset % 8)) & 1 == 1
}

/// Write a single bit
#[inline]
pub fn set_bit(buf: &mut [u8], offset: usize, value: bool) {
    let mask = 1u8 << (7 - offset % 8);
    if value {
        buf[offset / 8] |= mask;
    } else {
        buf[offset / 8] &= !mask;
    }
}

/// Read `width` (at most 64) bits starting at `offset` as an unsigned integer
pub fn get_bits(buf: &[u8], offset: usize, width: usize) -> u64 {
    debug_assert!(width <= 64);
    (offset..offset + width).fold(0u64, |acc, bit| (acc << 1) | u64::from(get_bit(buf, bit)))
}

/// Read `width` (at most 64) bits as a two's-complement signed integer
pub fn get_bits_signed(buf: &[u8], offset: usize, width: usize) -> i64 {
    let raw = get_bits(buf, offset, width);
    sign_extend(raw, width)
}

/// Sign-extend the low `width` bits of `raw`
pub fn sign_extend(raw: u64, width: usize) -> i64 {
    if width == 0 {
        return 0;
    }
    if width >= 64 {
        return raw as i64;
    }
    let shift = 64 - width;
    ((raw << shift) as i64) >> shift
}

/// Write the low `width` (at most 64) bits of `value` starting at `offset`
pub fn set_bits(buf: &mut [u8], offset: usize, width: usize, value: u64) {
    debug_assert!(width <= 64);
    for i in 0..width {
        let bit = (value >> (width - 1 - i)) & 1 == 1;
        set_bit(buf, offset + i, bit);
    }
}

/// Copy `width` bits into a right-aligned byte blob of `ceil(width / 8)` bytes
pub fn get_blob(buf: &[u8], offset: usize, width: usize) -> Vec<u8> {
    let len = width.div_ceil(8);
    let pad = len * 8 - width;
    let mut out = vec![0u8; len];
    for i in 0..width {
        if get_bit(buf, offset + i) {
            set_bit(&mut out, pad + i, true);
        }
    }
    out
}

/// Write a right-aligned blob of `width` bits starting at `offset`
pub fn set_blob(buf: &mut [u8], offset: usize, width: usize, blob: &[u8]) {
    let pad = blob.len() * 8 - width;
    for i in 0..width {
        set_bit(buf, offset + i, get_bit(blob, pad + i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bits_unaligned() {
        // 1010_1100 0011_0101
        let data = [0xAC, 0x35];
        assert_eq!(get_bits(&data, 0, 4), 0xA);
        assert_eq!(get_bits(&data, 4, 8), 0xC3);
        assert_eq!(get_bits(&data, 3, 3), 0b011);
        assert_eq!(get_bits(&data, 0, 16), 0xAC35);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b1111, 4), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0x80, 8), -128);
        assert_eq!(get_bits_signed(&[0xFF, 0xFE], 0, 16), -2);
    }

    #[test]
    fn test_set_bits_preserves_neighbours() {
        let mut data = [0xFF, 0xFF];
        set_bits(&mut data, 4, 8, 0x00);
        assert_eq!(data, [0xF0, 0x0F]);
    }

    #[test]
    fn test_blob_right_aligned() {
        // 12 bits starting at bit 4 of AB CD EF
        let data = [0xAB, 0xCD, 0xEF];
        let blob = get_blob(&data, 4, 12);
        assert_eq!(blob, vec![0x0B, 0xCD]);

        let mut out = [0u8; 3];
        set_blob(&mut out, 4, 12, &blob);
        assert_eq!(out, [0x0B, 0xCD, 0x00]);
    }
}
