use std::ops::Range;

/// word width of a simulated address.
pub const ADDRESS_BITS: u32 = u64::BITS;

/// mask with the lower `width` bits set. `width` may be the full word.
#[inline]
pub const fn mask_lower(width: u32) -> u64 {
    if width >= ADDRESS_BITS {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// mask covering bits `r.start..r.end` (end exclusive).
#[inline]
pub const fn bit_range(r: Range<u32>) -> u64 {
    if r.start >= r.end {
        return 0;
    }
    mask_lower(r.end - r.start) << r.start
}

/// extracts bits `r.start..r.end` and shifts them down to bit 0.
#[inline]
pub const fn extract(word: u64, r: Range<u32>) -> u64 {
    if r.start >= ADDRESS_BITS {
        return 0;
    }
    let start = r.start;
    (word & bit_range(r)) >> start
}

/// `word >> amount`, yielding 0 once every bit has been shifted out.
#[inline]
pub const fn shr_or_zero(word: u64, amount: u32) -> u64 {
    match word.checked_shr(amount) {
        Some(v) => v,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_lower() {
        assert_eq!(0, mask_lower(0));
        assert_eq!(0b1111, mask_lower(4));
        assert_eq!(u64::MAX, mask_lower(64));
    }
    #[test]
    fn test_bit_range() {
        assert_eq!(0b1, bit_range(0..1));
        assert_eq!(0b110000, bit_range(4..6));
        assert_eq!(0, bit_range(3..3));
        assert_eq!(u64::MAX << 60, bit_range(60..64));
    }
    #[test]
    fn test_extract() {
        let w = 0xDEAD_BEEF_u64;
        assert_eq!(0xF, extract(w, 0..4));
        assert_eq!(0xBEEF, extract(w, 0..16));
        assert_eq!(0xDEAD, extract(w, 16..32));
        assert_eq!(0, extract(w, 64..64));
    }
    #[test]
    fn test_shr_or_zero() {
        assert_eq!(1, shr_or_zero(0x10, 4));
        assert_eq!(0, shr_or_zero(u64::MAX, 64));
    }
}
