use std::{fmt, io::Read};

use serde::Deserialize;
use thiserror::Error;

use crate::bin::ADDRESS_BITS;

/// upper bound on `2^s * E`, the number of lines allocated up front.
pub const MAX_LINES: u64 = 1 << 22;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("`{name}` must be positive")]
    NonPositive { name: &'static str },
    #[error("{set_bits} set bits + {block_bits} block bits exceed the 64-bit address")]
    AddressWidthExceeded { set_bits: u32, block_bits: u32 },
    #[error("2^{set_bits} sets x {associativity} lines exceed the limit of {} lines", MAX_LINES)]
    TooManyLines { set_bits: u32, associativity: usize },
    #[error("`{name}` is missing")]
    Missing { name: &'static str },
    #[error("failed to read cache config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// geometry of the simulated cache. immutable once validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    set_bits: u32,
    associativity: usize,
    block_bits: u32,
}

impl CacheConfig {
    pub fn new(set_bits: u32, associativity: usize, block_bits: u32) -> Result<Self, ConfigError> {
        if set_bits == 0 {
            return Err(ConfigError::NonPositive { name: "s" });
        }
        if associativity == 0 {
            return Err(ConfigError::NonPositive { name: "E" });
        }
        if block_bits == 0 {
            return Err(ConfigError::NonPositive { name: "b" });
        }
        if set_bits as u64 + block_bits as u64 > ADDRESS_BITS as u64 {
            return Err(ConfigError::AddressWidthExceeded {
                set_bits,
                block_bits,
            });
        }
        // s < 64 here, so the shift cannot lose bits of a u128
        if (associativity as u128) << set_bits > MAX_LINES as u128 {
            return Err(ConfigError::TooManyLines {
                set_bits,
                associativity,
            });
        }
        Ok(Self {
            set_bits,
            associativity,
            block_bits,
        })
    }

    /// reads `{"s": .., "E": .., "b": ..}`. fields may be left out and filled by
    /// [`PartialConfig::or`] before validation.
    pub fn deser(file: impl Read) -> Result<PartialConfig, ConfigError> {
        Ok(serde_json::from_reader(file)?)
    }

    pub fn set_bits(&self) -> u32 {
        self.set_bits
    }
    pub fn associativity(&self) -> usize {
        self.associativity
    }
    pub fn block_bits(&self) -> u32 {
        self.block_bits
    }
    pub fn num_sets(&self) -> usize {
        1 << self.set_bits
    }
    pub fn block_size(&self) -> u64 {
        1u64.checked_shl(self.block_bits).unwrap_or(0)
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={} E={} b={} ({} sets x {} lines, {}-byte blocks)",
            self.set_bits,
            self.associativity,
            self.block_bits,
            self.num_sets(),
            self.associativity,
            self.block_size()
        )
    }
}

/// configuration collected from several sources, not yet validated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PartialConfig {
    #[serde(rename = "s")]
    pub set_bits: Option<u32>,
    #[serde(rename = "E")]
    pub associativity: Option<usize>,
    #[serde(rename = "b")]
    pub block_bits: Option<u32>,
}

impl PartialConfig {
    /// fields of `self` take precedence over `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            set_bits: self.set_bits.or(fallback.set_bits),
            associativity: self.associativity.or(fallback.associativity),
            block_bits: self.block_bits.or(fallback.block_bits),
        }
    }

    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        let set_bits = self.set_bits.ok_or(ConfigError::Missing { name: "s" })?;
        let associativity = self
            .associativity
            .ok_or(ConfigError::Missing { name: "E" })?;
        let block_bits = self.block_bits.ok_or(ConfigError::Missing { name: "b" })?;
        CacheConfig::new(set_bits, associativity, block_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let c = CacheConfig::new(4, 2, 4).unwrap();
        assert_eq!(16, c.num_sets());
        assert_eq!(2, c.associativity());
        assert_eq!(16, c.block_size());
    }
    #[test]
    fn test_non_positive() {
        assert!(matches!(
            CacheConfig::new(0, 1, 1),
            Err(ConfigError::NonPositive { name: "s" })
        ));
        assert!(matches!(
            CacheConfig::new(1, 0, 1),
            Err(ConfigError::NonPositive { name: "E" })
        ));
        assert!(matches!(
            CacheConfig::new(1, 1, 0),
            Err(ConfigError::NonPositive { name: "b" })
        ));
    }
    #[test]
    fn test_address_width() {
        assert!(matches!(
            CacheConfig::new(40, 1, 25),
            Err(ConfigError::AddressWidthExceeded { .. })
        ));
        assert!(CacheConfig::new(8, 1, 56).is_ok());
    }
    #[test]
    fn test_line_limit() {
        assert!(CacheConfig::new(22, 1, 4).is_ok());
        assert!(CacheConfig::new(20, 4, 4).is_ok());
        assert!(matches!(
            CacheConfig::new(20, 5, 4),
            Err(ConfigError::TooManyLines { .. })
        ));
        assert!(matches!(
            CacheConfig::new(30, 1, 4),
            Err(ConfigError::TooManyLines { set_bits: 30, .. })
        ));
        assert!(matches!(
            CacheConfig::new(1, usize::MAX, 1),
            Err(ConfigError::TooManyLines { .. })
        ));
    }
    #[test]
    fn test_config_file_merge() {
        let file = CacheConfig::deser(r#"{"s": 5, "E": 1, "b": 5}"#.as_bytes()).unwrap();
        let cli = PartialConfig {
            associativity: Some(4),
            ..Default::default()
        };
        let c = cli.or(file).build().unwrap();
        assert_eq!((5, 4, 5), (c.set_bits(), c.associativity(), c.block_bits()));
    }
    #[test]
    fn test_missing_field() {
        let file = CacheConfig::deser(r#"{"s": 5}"#.as_bytes()).unwrap();
        assert!(matches!(
            file.build(),
            Err(ConfigError::Missing { name: "E" })
        ));
        assert!(CacheConfig::deser("{".as_bytes()).is_err());
    }
}
