use log::warn;
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt::Formatter;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;

pub(crate) const COMPACT_IPV4_ADDR_LEN: usize = 6;
pub(crate) const COMPACT_IPV6_ADDR_LEN: usize = 18;

#[derive(Debug, Error, PartialEq)]
pub enum CompactError {
    #[error("invalid compact address byte slice length {0}")]
    InvalidLength(usize),
}

pub type CompactResult<T> = Result<T, CompactError>;

/// The peer list of an announce response.
/// Trackers either send the peers as compact IPv4 addresses (6 bytes each),
/// or as a list of dictionaries containing the `ip` and `port` of each peer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompactPeers(Vec<SocketAddr>);

impl CompactPeers {
    /// Returns true if the peer list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of peers within the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the peer addresses.
    pub fn addrs(&self) -> &[SocketAddr] {
        self.0.as_slice()
    }
}

impl From<CompactPeers> for Vec<SocketAddr> {
    fn from(value: CompactPeers) -> Self {
        value.0
    }
}

impl TryFrom<&[u8]> for CompactPeers {
    type Error = CompactError;

    fn try_from(bytes: &[u8]) -> CompactResult<Self> {
        parse_compact_addrs(bytes, COMPACT_IPV4_ADDR_LEN).map(Self)
    }
}

impl<'de> Deserialize<'de> for CompactPeers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CompactPeersVisitor;
        impl<'de> Visitor<'de> for CompactPeersVisitor {
            type Value = CompactPeers;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "expected a byte array of compact ipv4 addresses or a list of peers")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                CompactPeers::try_from(v).map_err(|e| serde::de::Error::custom(e.to_string()))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut addrs = Vec::new();

                while let Some(peer) = seq.next_element::<DictionaryPeer>()? {
                    match peer.ip.parse::<IpAddr>() {
                        Ok(ip) => addrs.push(SocketAddr::new(ip, peer.port)),
                        Err(e) => warn!("Failed to parse peer address \"{}\", {}", peer.ip, e),
                    }
                }

                Ok(CompactPeers(addrs))
            }
        }

        deserializer.deserialize_any(CompactPeersVisitor {})
    }
}

/// The compact IPv6 peer list of an announce response (`peers6`), 18 bytes per peer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompactIpv6Peers(Vec<SocketAddr>);

impl CompactIpv6Peers {
    /// Returns true if the peer list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the peer addresses.
    pub fn addrs(&self) -> &[SocketAddr] {
        self.0.as_slice()
    }
}

impl From<CompactIpv6Peers> for Vec<SocketAddr> {
    fn from(value: CompactIpv6Peers) -> Self {
        value.0
    }
}

impl TryFrom<&[u8]> for CompactIpv6Peers {
    type Error = CompactError;

    fn try_from(bytes: &[u8]) -> CompactResult<Self> {
        parse_compact_addrs(bytes, COMPACT_IPV6_ADDR_LEN).map(Self)
    }
}

impl<'de> Deserialize<'de> for CompactIpv6Peers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CompactIpv6PeersVisitor;
        impl<'de> Visitor<'de> for CompactIpv6PeersVisitor {
            type Value = CompactIpv6Peers;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "expected a byte array of compact ipv6 addresses")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                CompactIpv6Peers::try_from(v).map_err(|e| serde::de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_any(CompactIpv6PeersVisitor {})
    }
}

/// The dictionary model of a peer within the announce response.
#[derive(Debug, Deserialize)]
struct DictionaryPeer {
    ip: String,
    port: u16,
}

fn parse_compact_addrs(bytes: &[u8], addr_len: usize) -> CompactResult<Vec<SocketAddr>> {
    if bytes.len() % addr_len != 0 {
        return Err(CompactError::InvalidLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(addr_len)
        .map(|chunk| {
            let (ip_bytes, port_bytes) = chunk.split_at(addr_len - 2);
            let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
            let ip = match ip_bytes.len() {
                4 => IpAddr::V4(Ipv4Addr::new(
                    ip_bytes[0],
                    ip_bytes[1],
                    ip_bytes[2],
                    ip_bytes[3],
                )),
                _ => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(ip_bytes);
                    IpAddr::V6(Ipv6Addr::from(octets))
                }
            };

            SocketAddr::new(ip, port)
        })
        .collect())
}
