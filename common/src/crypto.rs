use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use hex::FromHexError;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const ADDRESS_SIZE: usize = 20;
pub const TX_HASH_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum FromHexStrError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("invalid length: expected {expected} hex characters, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error(transparent)]
    Hex(#[from] FromHexError),
}

// Parse a "0x"-prefixed fixed-size hex string
fn parse_fixed_hex<const N: usize>(value: &str) -> Result<[u8; N], FromHexStrError> {
    let raw = value
        .strip_prefix("0x")
        .ok_or(FromHexStrError::MissingPrefix)?;
    if raw.len() != N * 2 {
        return Err(FromHexStrError::InvalidLength {
            expected: N * 2,
            got: raw.len(),
        });
    }
    let mut bytes = [0u8; N];
    hex::decode_to_slice(raw, &mut bytes)?;
    Ok(bytes)
}

/// Account address on the ledger, rendered as 0x + 40 lowercase hex characters
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; ADDRESS_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = FromHexStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Addresses are case-insensitive on the wire, stored lowercase
        parse_fixed_hex(&s.to_lowercase()).map(Self)
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

/// Handle of a submitted transaction, rendered as 0x + 64 hex characters
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; TX_HASH_SIZE]);

impl TxHash {
    pub const fn new(bytes: [u8; TX_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; TX_HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; TX_HASH_SIZE] {
        &self.0
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl FromStr for TxHash {
    type Err = FromHexStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex(&s.to_lowercase()).map(Self)
    }
}

impl From<[u8; TX_HASH_SIZE]> for TxHash {
    fn from(bytes: [u8; TX_HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() -> Result<(), FromHexStrError> {
        let address: Address = "0xc7dcddD4aC3C2a7df961d5eC8c93046E01f58026".parse()?;
        // Stored lowercase regardless of input casing
        assert_eq!(
            address.to_string(),
            "0xc7dcddd4ac3c2a7df961d5ec8c93046e01f58026"
        );
        assert_eq!(address.to_string().parse::<Address>()?, address);
        Ok(())
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(matches!(
            "c7dcddd4ac3c2a7df961d5ec8c93046e01f58026".parse::<Address>(),
            Err(FromHexStrError::MissingPrefix)
        ));
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(FromHexStrError::InvalidLength { .. })
        ));
        assert!("0xzzdcddd4ac3c2a7df961d5ec8c93046e01f58026"
            .parse::<Address>()
            .is_err());
    }

    #[test]
    fn tx_hash_serde_as_string() -> Result<(), Box<dyn std::error::Error>> {
        let hash = TxHash::new([0xab; TX_HASH_SIZE]);
        let json = serde_json::to_string(&hash)?;
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(TX_HASH_SIZE)));
        let decoded: TxHash = serde_json::from_str(&json)?;
        assert_eq!(decoded, hash);
        Ok(())
    }
}
