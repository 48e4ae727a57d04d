use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced when parsing a `0x`-prefixed fixed-size hex value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseHexError {
    InvalidHex(hex::FromHexError),
    InvalidLength { expected: usize, found: usize },
}

impl fmt::Display for ParseHexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseHexError::InvalidHex(e) => write!(f, "invalid hex: {e}"),
            ParseHexError::InvalidLength { expected, found } => {
                write!(f, "expected {expected} bytes, found {found}")
            }
        }
    }
}

impl std::error::Error for ParseHexError {}

/// Decodes a hex string with an optional `0x` prefix into exactly `N` bytes.
pub fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(ParseHexError::InvalidHex)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| ParseHexError::InvalidLength {
        expected: N,
        found: bytes.len(),
    })
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl FromStr for $name {
            type Err = ParseHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map($name)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 32-byte hash (block hashes, trie roots, Merkle nodes).
    Hash32,
    32
);

fixed_bytes!(
    /// 20-byte account or contract address.
    Address,
    20
);

/// One side of a bridge, identified by the address of its bridge contract.
///
/// Doubles as the on-disk namespace for that chain's header log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub Address);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0)
    }
}

impl FromStr for ChainId {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ChainId)
    }
}

impl From<Address> for ChainId {
    fn from(address: Address) -> Self {
        ChainId(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_display_round_trips_through_from_str() {
        let addr: Address = "0x00000000000000000000000000000000000000ab".parse().unwrap();
        assert_eq!(addr.0[19], 0xab);
        assert_eq!(
            addr.to_string(),
            "0x00000000000000000000000000000000000000ab"
        );
    }

    #[test]
    fn prefix_is_optional_but_length_is_not() {
        assert!("ff".repeat(32).parse::<Hash32>().is_ok());
        assert_eq!(
            "0xffff".parse::<Hash32>(),
            Err(ParseHexError::InvalidLength {
                expected: 32,
                found: 2
            })
        );
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(ParseHexError::InvalidHex(_))
        ));
    }
}
