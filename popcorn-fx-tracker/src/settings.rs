use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use derive_more::Display;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

const DEFAULT_PEER_PORT: fn() -> u16 = || 6881;
const DEFAULT_HTTP_TIMEOUT_SECS: fn() -> u64 = || 60;
const DEFAULT_SCRAPE_DELAY_SECS: fn() -> u64 = || 10;
const DEFAULT_ANNOUNCE_IPV6: fn() -> bool = || true;
const DEFAULT_ANNOUNCE_OVER_SAME_FAMILY: fn() -> bool = || false;
const DEFAULT_NUMWANT: fn() -> u32 = || 200;
const DEFAULT_COMPACT: fn() -> bool = || true;
const DEFAULT_WAKE_INTERVAL_SECS: fn() -> u64 = || 10;
const DEFAULT_BLOCK_IPV4: fn() -> bool = || false;
const DEFAULT_BLOCK_IPV6: fn() -> bool = || false;
const DEFAULT_PREFER_IPV6: fn() -> bool = || false;
const DEFAULT_DHT: fn() -> DhtSettings = DhtSettings::default;
const DEFAULT_DHT_BIND_ADDRESS: fn() -> SocketAddr = || SocketAddr::from(([0, 0, 0, 0], 6881));
const DEFAULT_DHT_PORT: fn() -> u16 = || 6881;
const DEFAULT_DHT_RECEIVE_REQUESTS: fn() -> bool = || true;

/// The settings of the tracker announce core.
#[derive(Debug, Display, Clone, Serialize, Deserialize, PartialEq)]
#[display(
    "peer port: {}, http timeout: {}s, announce ipv6: {}, dht: {}",
    peer_port,
    http_timeout_secs,
    announce_ipv6,
    dht
)]
pub struct TrackerSettings {
    /// The port on which the client accepts incoming peer connections, sent to the trackers.
    #[serde(default = "DEFAULT_PEER_PORT")]
    pub peer_port: u16,
    /// The timeout in seconds of a single tracker request leg.
    #[serde(default = "DEFAULT_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,
    /// The delay in seconds before a scrape which was requested while busy is retried.
    #[serde(default = "DEFAULT_SCRAPE_DELAY_SECS")]
    pub scrape_delay_secs: u64,
    /// Announce over both IPv4 and IPv6 when both families are usable.
    #[serde(default = "DEFAULT_ANNOUNCE_IPV6")]
    pub announce_ipv6: bool,
    /// Only announce over a single address family, even when both are usable.
    #[serde(default = "DEFAULT_ANNOUNCE_OVER_SAME_FAMILY")]
    pub announce_over_same_family: bool,
    /// The number of peers requested from the tracker.
    #[serde(default = "DEFAULT_NUMWANT")]
    pub numwant: u32,
    /// Request the compact peer list model.
    #[serde(default = "DEFAULT_COMPACT")]
    pub compact: bool,
    /// The max interval in seconds between two wake-ups of the tracker thread.
    #[serde(default = "DEFAULT_WAKE_INTERVAL_SECS")]
    pub wake_interval_secs: u64,
    #[serde(default = "DEFAULT_BLOCK_IPV4")]
    pub block_ipv4: bool,
    #[serde(default = "DEFAULT_BLOCK_IPV6")]
    pub block_ipv6: bool,
    #[serde(default = "DEFAULT_PREFER_IPV6")]
    pub prefer_ipv6: bool,
    /// The DHT settings.
    #[serde(default = "DEFAULT_DHT")]
    pub dht: DhtSettings,
}

impl TrackerSettings {
    /// Create new settings from the given JSON string.
    /// If the `value` is invalid, the defaults will be returned.
    pub fn from_str(value: &str) -> Self {
        trace!("Parsing tracker settings \"{}\"", value);
        match serde_json::from_str(value) {
            Ok(e) => {
                debug!("Tracker settings parsed, {:?}", &e);
                e
            }
            Err(err) => {
                warn!(
                    "Failed to deserialize tracker settings, {}, using defaults instead",
                    err
                );
                Self::default()
            }
        }
    }

    /// Create new settings from the given JSON file.
    /// If the file doesn't exist or is invalid, the defaults will be returned.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut data = String::new();

        match File::open(path).and_then(|mut file| file.read_to_string(&mut data)) {
            Ok(_) => Self::from_str(data.as_str()),
            Err(err) => {
                warn!(
                    "Failed to read tracker settings file {:?}, {}, using defaults instead",
                    path, err
                );
                Self::default()
            }
        }
    }

    /// Returns the timeout of a single tracker request leg.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Returns the delay of a coalesced scrape retry.
    pub fn scrape_delay(&self) -> Duration {
        Duration::from_secs(self.scrape_delay_secs)
    }

    /// Returns the max interval between two wake-ups of the tracker thread.
    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_secs)
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            peer_port: DEFAULT_PEER_PORT(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS(),
            scrape_delay_secs: DEFAULT_SCRAPE_DELAY_SECS(),
            announce_ipv6: DEFAULT_ANNOUNCE_IPV6(),
            announce_over_same_family: DEFAULT_ANNOUNCE_OVER_SAME_FAMILY(),
            numwant: DEFAULT_NUMWANT(),
            compact: DEFAULT_COMPACT(),
            wake_interval_secs: DEFAULT_WAKE_INTERVAL_SECS(),
            block_ipv4: DEFAULT_BLOCK_IPV4(),
            block_ipv6: DEFAULT_BLOCK_IPV6(),
            prefer_ipv6: DEFAULT_PREFER_IPV6(),
            dht: DEFAULT_DHT(),
        }
    }
}

/// The settings of the DHT node.
#[derive(Debug, Display, Clone, Serialize, Deserialize, PartialEq)]
#[display("bind address: {}, port: {}", bind_address, port)]
pub struct DhtSettings {
    /// The address the DHT router binds to.
    #[serde(default = "DEFAULT_DHT_BIND_ADDRESS")]
    pub bind_address: SocketAddr,
    /// The UDP port of the DHT node.
    #[serde(default = "DEFAULT_DHT_PORT")]
    pub port: u16,
    /// Answer incoming DHT requests of other nodes.
    #[serde(default = "DEFAULT_DHT_RECEIVE_REQUESTS")]
    pub receive_requests: bool,
}

impl Default for DhtSettings {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_DHT_BIND_ADDRESS(),
            port: DEFAULT_DHT_PORT(),
            receive_requests: DEFAULT_DHT_RECEIVE_REQUESTS(),
        }
    }
}
