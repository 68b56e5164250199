use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use hex::FromHex;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The length in bytes of a v1 info hash.
pub const INFO_HASH_LEN: usize = 20;

/// The characters which are kept as-is when an info hash is used within a tracker query.
pub(crate) const URL_ENCODE_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'~')
    .remove(b'.');

/// The error returned when an info hash could not be parsed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InfoHashError {
    #[error("invalid info hash length {0}")]
    InvalidLength(usize),
    #[error("invalid info hash hex value \"{0}\"")]
    InvalidHex(String),
}

/// The 20-byte identifier of a swarm which is announced to trackers and the DHT network.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; INFO_HASH_LEN]);

impl InfoHash {
    /// Returns the raw bytes of the info hash.
    pub fn as_bytes(&self) -> &[u8; INFO_HASH_LEN] {
        &self.0
    }

    /// Try to create an info hash from the given byte slice.
    /// The slice must be exactly 20 bytes long.
    pub fn try_from_bytes<T>(bytes: T) -> Result<Self, InfoHashError>
    where
        T: AsRef<[u8]>,
    {
        let bytes = bytes.as_ref();
        if bytes.len() != INFO_HASH_LEN {
            return Err(InfoHashError::InvalidLength(bytes.len()));
        }

        let mut hash = [0u8; INFO_HASH_LEN];
        hash.copy_from_slice(bytes);
        Ok(Self(hash))
    }

    /// Returns the percent-encoded representation of the raw info hash bytes,
    /// as expected by HTTP trackers in the `info_hash` query parameter.
    pub fn url_encoded(&self) -> String {
        percent_encoding::percent_encode(&self.0, URL_ENCODE_RESERVED).to_string()
    }
}

impl From<[u8; INFO_HASH_LEN]> for InfoHash {
    fn from(value: [u8; INFO_HASH_LEN]) -> Self {
        Self(value)
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    /// Parse the info hash from its (case-insensitive) hex representation.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <[u8; INFO_HASH_LEN]>::from_hex(value)
            .map(Self)
            .map_err(|_| InfoHashError::InvalidHex(value.to_string()))
    }
}

impl Debug for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InfoHash").field(&self.to_string()).finish()
    }
}

impl Display for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl Serialize for InfoHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct InfoHashVisitor;
        impl<'de> Visitor<'de> for InfoHashVisitor {
            type Value = InfoHash;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "expected 20 info hash bytes or a hex string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                InfoHash::from_str(v).map_err(|e| serde::de::Error::custom(e.to_string()))
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                InfoHash::try_from_bytes(v).map_err(|e| serde::de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_any(InfoHashVisitor {})
    }
}
