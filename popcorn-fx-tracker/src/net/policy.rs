use crate::TrackerSettings;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// The address family policy source of the connection manager.
/// The policy might change at any moment, so it should be queried again on each attempt.
pub trait ConnectionPolicy: Debug + Send + Sync {
    /// Returns true when IPv4 connections are blocked.
    fn is_block_ipv4(&self) -> bool;

    /// Returns true when IPv6 connections are blocked.
    fn is_block_ipv6(&self) -> bool;

    /// Returns true when IPv6 connections are preferred over IPv4.
    fn is_prefer_ipv6(&self) -> bool;
}

/// The default connection policy which can be updated from any thread.
#[derive(Debug, Default)]
pub struct NetworkPolicy {
    block_ipv4: AtomicBool,
    block_ipv6: AtomicBool,
    prefer_ipv6: AtomicBool,
}

impl NetworkPolicy {
    pub fn new(block_ipv4: bool, block_ipv6: bool, prefer_ipv6: bool) -> Self {
        Self {
            block_ipv4: AtomicBool::new(block_ipv4),
            block_ipv6: AtomicBool::new(block_ipv6),
            prefer_ipv6: AtomicBool::new(prefer_ipv6),
        }
    }

    /// Create the initial network policy from the given settings.
    pub fn from_settings(settings: &TrackerSettings) -> Self {
        Self::new(
            settings.block_ipv4,
            settings.block_ipv6,
            settings.prefer_ipv6,
        )
    }

    pub fn set_block_ipv4(&self, value: bool) {
        self.block_ipv4.store(value, Ordering::Relaxed);
    }

    pub fn set_block_ipv6(&self, value: bool) {
        self.block_ipv6.store(value, Ordering::Relaxed);
    }

    pub fn set_prefer_ipv6(&self, value: bool) {
        self.prefer_ipv6.store(value, Ordering::Relaxed);
    }
}

impl ConnectionPolicy for NetworkPolicy {
    fn is_block_ipv4(&self) -> bool {
        self.block_ipv4.load(Ordering::Relaxed)
    }

    fn is_block_ipv6(&self) -> bool {
        self.block_ipv6.load(Ordering::Relaxed)
    }

    fn is_prefer_ipv6(&self) -> bool {
        self.prefer_ipv6.load(Ordering::Relaxed)
    }
}
