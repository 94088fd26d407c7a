use std::fmt;

use crate::{
    bin::{extract, shr_or_zero},
    config::CacheConfig,
};

/// 64-bit simulated memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(u64);

impl Addr {
    pub const fn new(v: u64) -> Self {
        Self(v)
    }
    pub const fn inner(self) -> u64 {
        self.0
    }
}

impl From<u64> for Addr {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::LowerHex for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// fields of an address once split by the cache geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddr {
    pub tag: u64,
    pub set_index: usize,
    /// byte within the block. never affects hit or miss.
    pub block_offset: u64,
}

/// splits addresses into `tag | set index | block offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDecoder {
    set_bits: u32,
    block_bits: u32,
}

impl AddressDecoder {
    /// `set_bits + block_bits` must not exceed 64; `CacheConfig` guarantees that.
    pub const fn new(set_bits: u32, block_bits: u32) -> Self {
        Self {
            set_bits,
            block_bits,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.set_bits(), config.block_bits())
    }

    pub fn decode(&self, addr: Addr) -> DecodedAddr {
        let a = addr.inner();
        let b = self.block_bits;
        let s = self.set_bits;
        DecodedAddr {
            tag: shr_or_zero(a, s + b),
            set_index: extract(a, b..b + s) as usize,
            block_offset: extract(a, 0..b),
        }
    }

    /// rebuilds the first address of the block identified by `tag` in `set_index`.
    pub fn block_base(&self, tag: u64, set_index: usize) -> Addr {
        let b = self.block_bits;
        let s = self.set_bits;
        let tag_part = tag.checked_shl(s + b).unwrap_or(0);
        let set_part = (set_index as u64).checked_shl(b).unwrap_or(0);
        Addr::new(tag_part | set_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fields() {
        // s = 4, b = 4: tag above bit 8
        let d = AddressDecoder::new(4, 4);
        let r = d.decode(Addr::new(0x12345));
        assert_eq!(0x5, r.block_offset);
        assert_eq!(0x4, r.set_index);
        assert_eq!(0x123, r.tag);
    }
    #[test]
    fn test_decode_full_width() {
        let d = AddressDecoder::new(32, 32);
        let r = d.decode(Addr::new(u64::MAX));
        assert_eq!(0, r.tag);
        assert_eq!(u32::MAX as usize, r.set_index);
        assert_eq!(u32::MAX as u64, r.block_offset);
    }
    #[test]
    fn test_decode_same_block() {
        let d = AddressDecoder::new(2, 3);
        let a = d.decode(Addr::new(0x40));
        let b = d.decode(Addr::new(0x47));
        assert_eq!((a.tag, a.set_index), (b.tag, b.set_index));
        assert_ne!(a.block_offset, b.block_offset);
    }
    #[test]
    fn test_block_base() {
        let d = AddressDecoder::new(4, 4);
        let r = d.decode(Addr::new(0x12345));
        assert_eq!(Addr::new(0x12340), d.block_base(r.tag, r.set_index));
    }
}
