use crate::dht::{DhtError, DhtRouter, DhtRouterFactory, DhtStatistics, Result};
use crate::thread::ThreadContext;
use crate::tracker::TrackerHandle;
use crate::{DhtSettings, InfoHash};
use derive_more::Display;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use serde_bencode::value::Value;
use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// The lifecycle state of the DHT, owning the router once initialized.
#[derive(Debug, Display)]
enum DhtState {
    #[display("uninitialized")]
    Uninitialized,
    #[display("initialized")]
    Initialized(Box<dyn DhtRouter>),
    #[display("active")]
    Active(Box<dyn DhtRouter>),
}

impl DhtState {
    fn router(&self) -> Option<&dyn DhtRouter> {
        match self {
            DhtState::Uninitialized => None,
            DhtState::Initialized(router) | DhtState::Active(router) => Some(router.as_ref()),
        }
    }

    fn router_mut(&mut self) -> Option<&mut Box<dyn DhtRouter>> {
        match self {
            DhtState::Uninitialized => None,
            DhtState::Initialized(router) | DhtState::Active(router) => Some(router),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: DhtState,
    port: u16,
    receive_requests: bool,
}

/// The thread-safe facade of the DHT router.
///
/// Every operation accesses the router under a single lock, which makes the controller usable from any thread.
/// The announce operations are confined to the tracker thread,
/// which is proven by the [ThreadContext] argument.
pub struct DhtController {
    factory: Arc<dyn DhtRouterFactory>,
    shared: Mutex<Shared>,
}

impl DhtController {
    pub fn new(factory: Arc<dyn DhtRouterFactory>) -> Self {
        Self {
            factory,
            shared: Mutex::new(Shared {
                state: DhtState::Uninitialized,
                port: 0,
                receive_requests: true,
            }),
        }
    }

    /// Create a new controller with the receive requests flag of the given settings.
    pub fn from_settings(factory: Arc<dyn DhtRouterFactory>, settings: &DhtSettings) -> Self {
        let controller = Self::new(factory);
        controller.set_receive_requests(settings.receive_requests);
        controller
    }

    /// Initialize the DHT router from the given cache.
    ///
    /// A failure to create the router is not returned to the caller,
    /// the controller stays uninitialized instead.
    ///
    /// # Returns
    ///
    /// It returns an error when the controller has already been initialized.
    pub fn initialize(&self, cache: &Value, bind_address: SocketAddr) -> Result<()> {
        info!("DHT controller is initializing (bind address {})", bind_address);
        let mut shared = self.shared.lock();

        if !matches!(shared.state, DhtState::Uninitialized) {
            let err = DhtError::AlreadyInitialized;
            error!("DHT controller failed to initialize, {}", err);
            return Err(err);
        }

        match self.factory.create(cache, bind_address) {
            Ok(router) => {
                debug!("DHT controller created router {:?}", router);
                shared.state = DhtState::Initialized(router);
            }
            Err(e) => warn!("DHT controller initialization failed, {}", e),
        }

        Ok(())
    }

    /// Start the DHT router on the given UDP port.
    ///
    /// # Returns
    ///
    /// It returns `true` when the router has been started, or `false` when the router failed to start.
    /// An error is returned when the controller is already active or not initialized.
    pub fn start(&self, port: u16) -> Result<bool> {
        info!("DHT controller is starting (port {})", port);
        let mut shared = self.shared.lock();

        let mut router = match std::mem::replace(&mut shared.state, DhtState::Uninitialized) {
            DhtState::Initialized(router) => router,
            DhtState::Active(router) => {
                shared.state = DhtState::Active(router);
                warn!("DHT controller is already active, cannot start again");
                return Err(DhtError::AlreadyActive);
            }
            DhtState::Uninitialized => {
                let err = DhtError::NotInitialized;
                error!("DHT controller failed to start, {}", err);
                return Err(err);
            }
        };

        shared.port = port;
        match router.start(port) {
            Ok(_) => {
                shared.state = DhtState::Active(router);
                debug!("DHT controller started on port {}", port);
                Ok(true)
            }
            Err(e) => {
                shared.state = DhtState::Initialized(router);
                warn!("DHT controller start failed, {}", e);
                Ok(false)
            }
        }
    }

    /// Stop the DHT router if it's active, else this is a no-op.
    pub fn stop(&self) {
        let mut shared = self.shared.lock();

        shared.state = match std::mem::replace(&mut shared.state, DhtState::Uninitialized) {
            DhtState::Active(mut router) => {
                info!("DHT controller is stopping");
                router.stop();
                DhtState::Initialized(router)
            }
            state => state,
        };
    }

    /// Stop the DHT from the tracker thread.
    pub fn shutdown(&self, ctx: &ThreadContext) {
        debug_assert!(
            ctx.is_current_thread(),
            "expected shutdown to be called on the tracker thread"
        );
        self.stop();
    }

    /// Returns true when the router has been created.
    pub fn is_valid(&self) -> bool {
        !matches!(self.shared.lock().state, DhtState::Uninitialized)
    }

    /// Returns true when the router has been started.
    pub fn is_active(&self) -> bool {
        matches!(self.shared.lock().state, DhtState::Active(_))
    }

    /// Returns the UDP port of the last start attempt.
    pub fn port(&self) -> u16 {
        self.shared.lock().port
    }

    pub fn is_receiving_requests(&self) -> bool {
        self.shared.lock().receive_requests
    }

    pub fn set_receive_requests(&self, state: bool) {
        self.shared.lock().receive_requests = state;
    }

    /// Add a bootstrap node.
    /// This is a no-op when the controller is not initialized.
    pub fn add_node(&self, addr: IpAddr, port: u16) {
        let mut shared = self.shared.lock();

        if let Some(router) = shared.state.router_mut() {
            router.contact(SocketAddr::new(addr, port));
        }
    }

    /// Add a bootstrap node by its hostname.
    /// This is a no-op when the controller is not initialized.
    pub fn add_node_host(&self, host: &str, port: u16) {
        let mut shared = self.shared.lock();

        if let Some(router) = shared.state.router_mut() {
            router.add_contact(host, port);
        }
    }

    /// Store the routing table of the router in the given container.
    pub fn store_cache(&self, container: Value) -> Result<Value> {
        let shared = self.shared.lock();
        let router = Self::require_router(&shared, "store cache")?;

        let mut container = container;
        router.store_cache(&mut container);
        Ok(container)
    }

    pub fn statistics(&self) -> Result<DhtStatistics> {
        let shared = self.shared.lock();
        let router = Self::require_router(&shared, "get statistics")?;

        Ok(router.statistics())
    }

    pub fn reset_statistics(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        Self::require_router(&shared, "reset statistics")?;

        if let Some(router) = shared.state.router_mut() {
            router.reset_statistics();
        }
        Ok(())
    }

    /// Announce the info hash of the tracker to the DHT network.
    pub fn announce(
        &self,
        ctx: &ThreadContext,
        info_hash: &InfoHash,
        tracker: TrackerHandle,
    ) -> Result<()> {
        debug_assert!(
            ctx.is_current_thread(),
            "expected announce to be called on the tracker thread"
        );
        let mut shared = self.shared.lock();
        Self::require_router(&shared, "announce")?;

        trace!("DHT controller is announcing {} for {}", info_hash, tracker);
        if let Some(router) = shared.state.router_mut() {
            router.announce(info_hash, tracker);
        }
        Ok(())
    }

    /// Cancel the announce of the tracker.
    /// When no info hash is given, all announces of the tracker are cancelled.
    pub fn cancel_announce(
        &self,
        ctx: &ThreadContext,
        info_hash: Option<&InfoHash>,
        tracker: TrackerHandle,
    ) -> Result<()> {
        debug_assert!(
            ctx.is_current_thread(),
            "expected cancel announce to be called on the tracker thread"
        );
        let mut shared = self.shared.lock();
        Self::require_router(&shared, "cancel announce")?;

        if let Some(router) = shared.state.router_mut() {
            router.cancel_announce(info_hash.copied(), tracker);
        }
        Ok(())
    }

    /// Set the upload throttle of the DHT traffic.
    pub fn set_upload_throttle(&self, bytes_per_second: u32) {
        // TODO: forward the throttle to the router once the throttle supports concurrent access
        debug!(
            "DHT controller upload throttle {} is not supported",
            bytes_per_second
        );
    }

    /// Set the download throttle of the DHT traffic.
    pub fn set_download_throttle(&self, bytes_per_second: u32) {
        // TODO: forward the throttle to the router once the throttle supports concurrent access
        debug!(
            "DHT controller download throttle {} is not supported",
            bytes_per_second
        );
    }

    fn require_router<'a>(shared: &'a Shared, operation: &str) -> Result<&'a dyn DhtRouter> {
        shared.state.router().ok_or_else(|| {
            let err = DhtError::NotInitialized;
            error!("DHT controller failed to {}, {}", operation, err);
            err
        })
    }
}

impl Debug for DhtController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtController")
            .field("factory", &self.factory)
            .field("shared", &self.shared)
            .finish()
    }
}

impl Drop for DhtController {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                !matches!(self.shared.get_mut().state, DhtState::Active(_)),
                "expected the DHT controller to be stopped before being dropped"
            );
        }
    }
}
