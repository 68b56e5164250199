use crate::dht::Result;
use crate::tracker::TrackerHandle;
use crate::InfoHash;
use derive_more::Display;
use serde_bencode::value::Value;
use std::fmt::Debug;
use std::net::SocketAddr;

/// The counters snapshot of a DHT router.
#[derive(Debug, Display, Default, Clone, PartialEq)]
#[display(
    "nodes: {}, peers: {}, torrents: {}, queries received: {}, queries sent: {}",
    nodes,
    peers,
    torrents,
    queries_received,
    queries_sent
)]
pub struct DhtStatistics {
    pub cycle: u32,
    pub queries_received: u64,
    pub queries_sent: u64,
    pub replies_received: u64,
    pub errors_received: u64,
    pub errors_caught: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// The number of nodes within the routing table.
    pub nodes: u32,
    pub buckets: u32,
    /// The number of peers which are being tracked by this node.
    pub peers: u32,
    pub peers_max: u32,
    /// The number of torrents which are being tracked by this node.
    pub torrents: u32,
}

/// The DHT routing node which is owned by the [crate::dht::DhtController].
///
/// The routing table internals, such as the buckets and token issuance, are hidden behind this interface.
pub trait DhtRouter: Debug + Send {
    /// Start listening on the given UDP port and bootstrap the routing table.
    fn start(&mut self, port: u16) -> Result<()>;

    /// Stop listening for requests.
    fn stop(&mut self);

    /// Contact the node at the given address.
    fn contact(&mut self, addr: SocketAddr);

    /// Resolve the given host and contact the node.
    fn add_contact(&mut self, host: &str, port: u16);

    /// Store the routing table within the given cache container.
    fn store_cache(&self, container: &mut Value);

    fn statistics(&self) -> DhtStatistics;

    fn reset_statistics(&mut self);

    /// Announce the info hash to the DHT network for the given tracker.
    fn announce(&mut self, info_hash: &InfoHash, tracker: TrackerHandle);

    /// Cancel the announce of the tracker.
    /// When no info hash is given, all announces of the tracker are cancelled.
    fn cancel_announce(&mut self, info_hash: Option<InfoHash>, tracker: TrackerHandle);
}

/// Creates the DHT router from a cached routing table.
pub trait DhtRouterFactory: Debug + Send + Sync {
    /// Create a new router bound to the given address.
    ///
    /// The cache is the routing table which has been stored by [DhtRouter::store_cache],
    /// or an empty dictionary when no cache is available.
    fn create(&self, cache: &Value, bind_address: SocketAddr) -> Result<Box<dyn DhtRouter>>;
}
