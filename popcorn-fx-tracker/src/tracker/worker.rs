use crate::net::IpFamily;
use crate::thread::ThreadContext;
use crate::tracker::TrackerError;
use crate::InfoHash;
use derive_more::Display;
use fx_handle::Handle;
use serde::Deserialize;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The tracker identifier handle
pub type TrackerHandle = Handle;

/// The length in bytes of a peer id.
pub const PEER_ID_LEN: usize = 20;

/// The wire protocol of a tracker worker.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum TrackerType {
    #[display("http")]
    Http,
}

/// The announce event which is sent to the tracker.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum AnnounceEvent {
    /// A regular announce at the tracker interval, the event parameter is omitted.
    #[display("none")]
    None,
    #[display("started")]
    Started,
    #[display("stopped")]
    Stopped,
    #[display("completed")]
    Completed,
}

impl AnnounceEvent {
    /// Returns the numeric code of the event.
    pub fn code(&self) -> u32 {
        match self {
            AnnounceEvent::None => 0,
            AnnounceEvent::Completed => 1,
            AnnounceEvent::Started => 2,
            AnnounceEvent::Stopped => 3,
        }
    }

    /// Returns the value of the `event` query parameter, if any.
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            AnnounceEvent::None => None,
            AnnounceEvent::Started => Some("started"),
            AnnounceEvent::Stopped => Some("stopped"),
            AnnounceEvent::Completed => Some("completed"),
        }
    }
}

/// The transfer statistics of the swarm which are reported to the trackers.
#[derive(Debug, Default)]
pub struct TransferStats {
    uploaded: AtomicU64,
    downloaded: AtomicU64,
    left: AtomicU64,
}

impl TransferStats {
    pub fn new(uploaded: u64, downloaded: u64, left: u64) -> Self {
        Self {
            uploaded: AtomicU64::new(uploaded),
            downloaded: AtomicU64::new(downloaded),
            left: AtomicU64::new(left),
        }
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn left(&self) -> u64 {
        self.left.load(Ordering::Relaxed)
    }

    /// Update the statistics of the swarm.
    pub fn update(&self, uploaded: u64, downloaded: u64, left: u64) {
        self.uploaded.store(uploaded, Ordering::Relaxed);
        self.downloaded.store(downloaded, Ordering::Relaxed);
        self.left.store(left, Ordering::Relaxed);
    }
}

/// The static information of a tracker for a single swarm.
#[derive(Debug, Display, Clone)]
#[display("{} ({})", url, info_hash)]
pub struct TrackerInfo {
    /// The announce url of the tracker
    pub url: Url,
    pub info_hash: InfoHash,
    pub peer_id: [u8; PEER_ID_LEN],
    /// The random key which identifies this client across ip changes.
    pub key: u32,
    pub stats: Arc<TransferStats>,
}

/// The processed announce response of a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceResult {
    /// The interval in which the tracker should be announced again.
    pub interval: Duration,
    pub min_interval: Option<Duration>,
    /// The number of peers which have completed the torrent.
    pub seeders: Option<u64>,
    /// The number of peers which have not yet completed the torrent.
    pub leechers: Option<u64>,
    pub peers: Vec<SocketAddr>,
    /// The address family of the request leg which received the response.
    pub family: IpFamily,
}

/// The scrape metrics of a specific swarm.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct ScrapeFileMetrics {
    /// The number of active peers that have completed downloading.
    #[serde(default)]
    pub complete: u64,
    /// The number of active peers that have not completed downloading.
    #[serde(default)]
    pub incomplete: u64,
    /// The number of peers that have ever completed downloading.
    #[serde(default)]
    pub downloaded: u64,
}

/// The listener of a tracker worker which is informed about the outcome of each request.
/// The outcome is only informational, the tracker worker never retries an announce on its own.
pub trait TrackerListener: Debug + Send + Sync {
    /// Invoked when the tracker announce succeeded.
    fn on_success(&self, handle: TrackerHandle, result: AnnounceResult);

    /// Invoked when the tracker announce failed.
    fn on_failure(&self, handle: TrackerHandle, error: TrackerError);

    fn on_scrape_success(&self, handle: TrackerHandle, metrics: ScrapeFileMetrics);

    fn on_scrape_failure(&self, handle: TrackerHandle, error: TrackerError);
}

/// The request which is currently in-flight of a worker.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum RequestKind {
    #[display("announce {}", _0)]
    Announce(AnnounceEvent),
    #[display("scrape")]
    Scrape,
}

/// The state of a tracker worker.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum TrackerState {
    #[display("idle")]
    Idle,
    #[display("requesting {}", _0)]
    Requesting(RequestKind),
}

/// A worker which executes announce and scrape requests for a single tracker.
///
/// A worker only executes one logical request at a time and is confined to the tracker thread,
/// which is proven by the [ThreadContext] argument.
pub trait TrackerWorker: Debug + std::fmt::Display {
    /// Returns true when the worker has a request in-flight.
    fn is_busy(&self) -> bool;

    /// Announce the given event to the tracker.
    /// An in-flight request is cancelled before the new announce is started.
    fn send_event(&mut self, ctx: &ThreadContext, event: AnnounceEvent);

    /// Scrape the tracker.
    /// A scrape requested while the worker is busy will be retried once the worker becomes idle.
    fn send_scrape(&mut self, ctx: &ThreadContext);

    /// Cancel any in-flight request and pending scrape.
    /// No completion of the cancelled requests will be processed after this call.
    fn close(&mut self, ctx: &ThreadContext);

    /// Returns the wire protocol of the worker.
    fn tracker_type(&self) -> TrackerType;
}
