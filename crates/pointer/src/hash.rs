use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

/// BLAKE3 digest of materialized content.
///
/// Rendered as 64 lowercase hex characters everywhere it leaves memory: info
/// files, cache tier slot names, and log fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; blake3::OUT_LEN]);

impl ContentHash {
    pub const fn from_bytes(bytes: [u8; blake3::OUT_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash an in-memory buffer. Used for single-file content and in tests.
    pub fn of(data: &[u8]) -> Self {
        Self::from(blake3::hash(data))
    }

    pub fn as_bytes(&self) -> &[u8; blake3::OUT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Two-character fan-out prefix used for on-disk sharding.
    pub fn shard(&self) -> String {
        format!("{:02x}", self.0[0])
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&blake3::Hash::from_bytes(self.0), f)
    }
}

impl Debug for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

impl FromStr for ContentHash {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Uppercase hex is rejected so that the textual form stays canonical.
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            exn::bail!(ErrorKind::InvalidHash(s.to_string()));
        }
        let hash = blake3::Hash::from_hex(s).or_raise(|| ErrorKind::InvalidHash(s.to_string()))?;
        Ok(Self::from(hash))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: crate::error::Error| serde::de::Error::custom(&*e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_hex_round_trip() {
        let hash = ContentHash::of(b"hello world");
        let hex = hash.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, blake3::hash(b"hello world").to_hex().as_str());
        assert_eq!(hex.parse::<ContentHash>().unwrap(), hash);
    }

    #[test]
    fn test_shard_is_first_byte() {
        let hash = ContentHash::from_bytes([0xab; 32]);
        assert_eq!(hash.shard(), "ab");
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("zz00000000000000000000000000000000000000000000000000000000000000")]
    #[case("AB00000000000000000000000000000000000000000000000000000000000000")]
    #[case("00000000000000000000000000000000000000000000000000000000000000000")]
    fn test_invalid_hex(#[case] input: &str) {
        let err = input.parse::<ContentHash>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidHash(_)));
    }

    #[test]
    fn test_serde_as_string() {
        let hash = ContentHash::of(b"data");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        assert_eq!(serde_json::from_str::<ContentHash>(&json).unwrap(), hash);
    }
}
