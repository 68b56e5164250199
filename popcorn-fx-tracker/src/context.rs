use crate::net::{ConnectionPolicy, HttpGet, NetworkPolicy, ReqwestHttpGet};
use crate::{tracker, TrackerSettings};
use std::sync::Arc;

/// The shared collaborators of the tracker workers.
/// The context is owned by the tracker thread and passed into each worker on creation.
#[derive(Debug, Clone)]
pub struct TrackerContext {
    settings: Arc<TrackerSettings>,
    policy: Arc<dyn ConnectionPolicy>,
    http: Arc<dyn HttpGet>,
}

impl TrackerContext {
    pub fn new(
        settings: TrackerSettings,
        policy: Arc<dyn ConnectionPolicy>,
        http: Arc<dyn HttpGet>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            policy,
            http,
        }
    }

    /// Create a new context with the default collaborators for the given settings.
    /// This is a [NetworkPolicy] initialized from the settings and the [ReqwestHttpGet] client.
    pub fn from_settings(settings: TrackerSettings) -> tracker::Result<Self> {
        let policy = Arc::new(NetworkPolicy::from_settings(&settings));
        let http = Arc::new(ReqwestHttpGet::new()?);

        Ok(Self::new(settings, policy, http))
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Returns the connection policy which decides the usable address families.
    pub fn policy(&self) -> &Arc<dyn ConnectionPolicy> {
        &self.policy
    }

    pub fn http(&self) -> &Arc<dyn HttpGet> {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = TrackerSettings {
            block_ipv6: true,
            ..TrackerSettings::default()
        };

        let result = TrackerContext::from_settings(settings.clone()).unwrap();

        assert_eq!(&settings, result.settings());
        assert_eq!(true, result.policy().is_block_ipv6());
    }
}
