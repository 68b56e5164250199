use crate::net::{AddressFamilyPolicy, HttpRequest, HttpResponse, HttpResult, IpFamily, IpPreference, RequestTag};
use crate::thread::{SchedulerEntry, ThreadContext};
use crate::tracker::{
    AnnounceEvent, AnnounceResult, RequestKind, Result, ScrapeFileMetrics, TrackerError,
    TrackerHandle, TrackerInfo, TrackerListener, TrackerState, TrackerType, TrackerWorker,
};
use crate::{CompactIpv6Peers, CompactPeers, InfoHash, TrackerContext, URL_ENCODE_RESERVED};
use derive_more::Display;
use log::{debug, trace, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const ANNOUNCE_PATH_PREFIX: &str = "announce";
const SCRAPE_PATH_PREFIX: &str = "scrape";

/// The bencoded announce response of a http tracker.
#[derive(Debug, Default, Deserialize)]
struct AnnounceResponse {
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    #[serde(rename = "warning message", default)]
    warning_message: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(rename = "min interval", default)]
    min_interval: Option<u64>,
    #[serde(rename = "tracker id", default)]
    tracker_id: Option<String>,
    #[serde(default)]
    complete: Option<u64>,
    #[serde(default)]
    incomplete: Option<u64>,
    #[serde(default)]
    peers: CompactPeers,
    #[serde(default)]
    peers6: CompactIpv6Peers,
}

/// The bencoded scrape response of a http tracker.
#[derive(Debug, Default, Deserialize)]
struct ScrapeResponse {
    #[serde(rename = "failure reason", default)]
    failure_reason: Option<String>,
    #[serde(default)]
    files: HashMap<InfoHash, ScrapeFileMetrics>,
}

/// A single GET request of the in-flight logical request.
#[derive(Debug)]
struct RequestLeg {
    family: IpFamily,
    cancellation_token: CancellationToken,
}

/// The HTTP/HTTPS tracker worker.
///
/// An announce is executed over both address families at the same time when dual-stack announcing is enabled.
/// The first completed leg, whether it succeeded or failed, is processed and the other leg is cancelled.
#[derive(Debug, Display)]
#[display("[{}] {}", handle, info)]
pub struct TrackerHttp {
    handle: TrackerHandle,
    info: TrackerInfo,
    context: TrackerContext,
    listener: Arc<dyn TrackerListener>,
    state: TrackerState,
    /// The id of the current logical request, completions of other requests are discarded
    request_id: u64,
    legs: Vec<RequestLeg>,
    /// The tracker id which has been received from the tracker
    tracker_id: Option<String>,
    requested_scrape: bool,
    delay_scrape: Option<SchedulerEntry>,
}

impl TrackerHttp {
    pub fn new(
        info: TrackerInfo,
        context: TrackerContext,
        listener: Arc<dyn TrackerListener>,
    ) -> Self {
        Self::with_handle(TrackerHandle::new(), info, context, listener)
    }

    /// Create a new http tracker worker with the given handle.
    pub fn with_handle(
        handle: TrackerHandle,
        info: TrackerInfo,
        context: TrackerContext,
        listener: Arc<dyn TrackerListener>,
    ) -> Self {
        Self {
            handle,
            info,
            context,
            listener,
            state: TrackerState::Idle,
            request_id: 0,
            legs: Vec::with_capacity(2),
            tracker_id: None,
            requested_scrape: false,
            delay_scrape: None,
        }
    }

    /// Returns the unique handle of the tracker worker.
    pub fn handle(&self) -> TrackerHandle {
        self.handle
    }

    pub fn info(&self) -> &TrackerInfo {
        &self.info
    }

    /// Returns the current state of the worker.
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Returns the tracker id which is sent along with each announce, if known.
    pub fn tracker_id(&self) -> Option<&str> {
        self.tracker_id.as_deref()
    }

    /// Returns true when a scrape has been requested while the worker was busy.
    pub fn is_scrape_requested(&self) -> bool {
        self.requested_scrape
    }

    /// Returns the families of the in-flight request legs.
    pub fn active_legs(&self) -> Vec<IpFamily> {
        self.legs.iter().map(|e| e.family).collect()
    }

    /// Process the completion of one of the request legs.
    ///
    /// Only the first completion of the in-flight request is processed,
    /// completions of cancelled or already handled requests are discarded.
    pub fn receive_done(&mut self, ctx: &ThreadContext, response: HttpResponse) {
        let kind = match self.state {
            TrackerState::Requesting(kind) if response.tag.request_id == self.request_id => kind,
            _ => {
                trace!(
                    "Http tracker {} is discarding completion of {}",
                    self,
                    response.tag
                );
                return;
            }
        };

        debug!(
            "Http tracker {} received completion of {} for {}",
            self, response.tag, kind
        );
        self.finish_request();

        match kind {
            RequestKind::Announce(_) => self.process_announce(response.result, response.tag.family),
            RequestKind::Scrape => {
                self.requested_scrape = false;
                self.process_scrape_result(response.result);
            }
        }

        self.schedule_requested_scrape(ctx);
    }

    /// Retry the scrape which has been requested while the worker was busy.
    pub(crate) fn delayed_send_scrape(&mut self, ctx: &ThreadContext) {
        self.delay_scrape = None;

        if !self.requested_scrape || self.is_busy() {
            return;
        }

        trace!("Http tracker {} is executing the delayed scrape", self);
        self.send_scrape(ctx);
    }

    fn create_announce_url(&self, event: AnnounceEvent) -> Result<Url> {
        let settings = self.context.settings();
        let stats = &self.info.stats;
        let mut url = self.info.url.clone();

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("port", settings.peer_port.to_string().as_str())
                .append_pair("uploaded", stats.uploaded().to_string().as_str())
                .append_pair("downloaded", stats.downloaded().to_string().as_str())
                .append_pair("left", stats.left().to_string().as_str())
                .append_pair("compact", if settings.compact { "1" } else { "0" })
                .append_pair("numwant", settings.numwant.to_string().as_str())
                .append_pair("key", format!("{:08x}", self.info.key).as_str());

            if let Some(event) = event.query_value() {
                query.append_pair("event", event);
            }
            if let Some(tracker_id) = self.tracker_id.as_ref() {
                query.append_pair("trackerid", tracker_id);
            }
        }

        let peer_id =
            percent_encoding::percent_encode(&self.info.peer_id, URL_ENCODE_RESERVED).to_string();
        let url = format!(
            "{}&info_hash={}&peer_id={}",
            url,
            self.info.info_hash.url_encoded(),
            peer_id
        );

        Ok(Url::parse(url.as_str())?)
    }

    fn create_scrape_url(&self) -> Result<Url> {
        let mut url = self.info.url.clone();
        let segment = url
            .path_segments()
            .and_then(|mut e| e.next_back())
            .filter(|e| e.starts_with(ANNOUNCE_PATH_PREFIX))
            .map(|e| format!("{}{}", SCRAPE_PATH_PREFIX, &e[ANNOUNCE_PATH_PREFIX.len()..]))
            .ok_or_else(|| TrackerError::ScrapeUnsupported(self.info.url.to_string()))?;

        url.path_segments_mut()
            .map_err(|_| TrackerError::ScrapeUnsupported(self.info.url.to_string()))?
            .pop()
            .push(segment.as_str());

        let separator = if url.query().is_some() { '&' } else { '?' };
        let url = format!(
            "{}{}info_hash={}",
            url,
            separator,
            self.info.info_hash.url_encoded()
        );

        Ok(Url::parse(url.as_str())?)
    }

    /// Resolve the address families over which the request legs are executed.
    fn resolve_families(&self) -> Result<Vec<IpFamily>> {
        let settings = self.context.settings();
        let policy = AddressFamilyPolicy::from_policy(self.context.policy().as_ref());
        let mut preference = policy.normal_preference();

        if preference == IpPreference::None {
            preference = policy.fallback_preference();
            debug!(
                "Http tracker {} normal ip preference unavailable, using fallback {} ({})",
                self, preference, policy
            );
        }

        let dual_stack = settings.announce_ipv6 && !settings.announce_over_same_family;
        match preference {
            IpPreference::None => Err(TrackerError::NoAddressFamily),
            IpPreference::UseV4 => Ok(vec![IpFamily::V4]),
            IpPreference::UseV6 => Ok(vec![IpFamily::V6]),
            IpPreference::PreferV4 if dual_stack => Ok(vec![IpFamily::V4, IpFamily::V6]),
            IpPreference::PreferV4 => Ok(vec![IpFamily::V4]),
            IpPreference::PreferV6 if dual_stack => Ok(vec![IpFamily::V6, IpFamily::V4]),
            IpPreference::PreferV6 => Ok(vec![IpFamily::V6]),
            IpPreference::Either if dual_stack => Ok(vec![IpFamily::V4, IpFamily::V6]),
            IpPreference::Either => Ok(vec![IpFamily::Unspecified]),
        }
    }

    fn start_request(
        &mut self,
        ctx: &ThreadContext,
        kind: RequestKind,
        url: Url,
        families: Vec<IpFamily>,
    ) {
        let timeout = self.context.settings().http_timeout();

        self.request_id += 1;
        self.state = TrackerState::Requesting(kind);

        for family in families {
            let tag = RequestTag {
                tracker: self.handle,
                request_id: self.request_id,
                family,
            };

            trace!("Http tracker {} is sending request {} to {}", self, tag, url);
            let cancellation_token = self.context.http().get(
                tag,
                HttpRequest {
                    url: url.clone(),
                    family,
                    timeout,
                },
                ctx.http_sender(),
            );
            self.legs.push(RequestLeg {
                family,
                cancellation_token,
            });
        }
    }

    /// Transition back to idle and cancel all remaining request legs.
    fn finish_request(&mut self) {
        self.state = TrackerState::Idle;
        for leg in self.legs.drain(..) {
            leg.cancellation_token.cancel();
        }
    }

    fn close_directly(&mut self) {
        if self.is_busy() {
            debug!("Http tracker {} is cancelling {}", self, self.state);
        }

        self.finish_request();
    }

    fn schedule_requested_scrape(&mut self, ctx: &ThreadContext) {
        if !self.requested_scrape {
            return;
        }
        if self
            .delay_scrape
            .as_ref()
            .map(|e| ctx.is_scheduled(e))
            .unwrap_or(false)
        {
            return;
        }

        let handle = self.handle;
        let delay = self.context.settings().scrape_delay();

        debug!(
            "Http tracker {} is scheduling the requested scrape in {}s",
            self,
            delay.as_secs()
        );
        self.delay_scrape = Some(ctx.schedule(delay, move |manager, ctx| {
            if let Some(tracker) = manager.http_tracker_mut(&handle) {
                tracker.delayed_send_scrape(ctx);
            }
        }));
    }

    fn process_announce(&mut self, result: HttpResult, family: IpFamily) {
        let body = match result {
            Ok(e) => e,
            Err(e) => return self.receive_failed(e.into()),
        };

        // check the response status code from the http tracker
        // if it's unsuccessful, we don't try to parse the response body
        if !body.is_success() {
            trace!(
                "Http tracker {} response: {}",
                self,
                String::from_utf8_lossy(body.body.as_ref())
            );
            return self.receive_failed(TrackerError::Status(body.status));
        }

        trace!(
            "Http tracker {} received {} bytes, {}",
            self,
            body.body.len(),
            String::from_utf8_lossy(body.body.as_ref())
        );
        match serde_bencode::from_bytes::<AnnounceResponse>(body.body.as_ref()) {
            Ok(mut response) => match response.failure_reason.take() {
                Some(reason) => self.process_failure(reason),
                None => self.process_success(response, family),
            },
            Err(e) => self.receive_failed(e.into()),
        }
    }

    fn receive_failed(&mut self, error: TrackerError) {
        warn!("Http tracker {} request failed, {}", self, error);
        self.listener.on_failure(self.handle, error);
    }

    fn process_failure(&mut self, reason: String) {
        debug!("Http tracker {} returned failure \"{}\"", self, reason);
        self.listener
            .on_failure(self.handle, TrackerError::AnnounceFailure(reason));
    }

    fn process_success(&mut self, response: AnnounceResponse, family: IpFamily) {
        if let Some(message) = response.warning_message.as_ref() {
            warn!("Http tracker {} returned warning \"{}\"", self, message);
        }
        if let Some(tracker_id) = response.tracker_id {
            self.update_tracker_id(tracker_id);
        }

        let mut peers: Vec<SocketAddr> = response.peers.into();
        peers.extend(Vec::<SocketAddr>::from(response.peers6));

        let result = AnnounceResult {
            interval: Duration::from_secs(response.interval.unwrap_or(0)),
            min_interval: response.min_interval.map(Duration::from_secs),
            seeders: response.complete,
            leechers: response.incomplete,
            peers,
            family,
        };
        debug!(
            "Http tracker {} announce succeeded with {} peers",
            self,
            result.peers.len()
        );
        self.listener.on_success(self.handle, result);
    }

    fn update_tracker_id(&mut self, tracker_id: String) {
        if tracker_id.is_empty() || self.tracker_id.as_deref() == Some(tracker_id.as_str()) {
            return;
        }

        trace!("Http tracker {} updated tracker id to {}", self, tracker_id);
        self.tracker_id = Some(tracker_id);
    }

    fn process_scrape_result(&mut self, result: HttpResult) {
        let result = result
            .map_err(TrackerError::from)
            .and_then(|body| {
                if !body.is_success() {
                    return Err(TrackerError::Status(body.status));
                }

                Ok(serde_bencode::from_bytes::<ScrapeResponse>(body.body.as_ref())?)
            })
            .and_then(|response| self.process_scrape(response));

        match result {
            Ok(metrics) => {
                debug!("Http tracker {} scrape succeeded, {:?}", self, metrics);
                self.listener.on_scrape_success(self.handle, metrics);
            }
            Err(e) => {
                warn!("Http tracker {} scrape failed, {}", self, e);
                self.listener.on_scrape_failure(self.handle, e);
            }
        }
    }

    fn process_scrape(&self, mut response: ScrapeResponse) -> Result<ScrapeFileMetrics> {
        if let Some(reason) = response.failure_reason {
            return Err(TrackerError::AnnounceFailure(reason));
        }

        response
            .files
            .remove(&self.info.info_hash)
            .ok_or(TrackerError::InfoHashNotFound(self.info.info_hash))
    }
}

impl TrackerWorker for TrackerHttp {
    fn is_busy(&self) -> bool {
        matches!(self.state, TrackerState::Requesting(_))
    }

    fn send_event(&mut self, ctx: &ThreadContext, event: AnnounceEvent) {
        self.close_directly();

        let result = self
            .resolve_families()
            .and_then(|families| Ok((families, self.create_announce_url(event)?)));
        let (families, url) = match result {
            Ok(e) => e,
            Err(e) => {
                self.receive_failed(e);
                self.schedule_requested_scrape(ctx);
                return;
            }
        };

        debug!("Http tracker {} is announcing {} over {:?}", self, event, families);
        self.start_request(ctx, RequestKind::Announce(event), url, families);
    }

    fn send_scrape(&mut self, ctx: &ThreadContext) {
        if self.is_busy() {
            debug!("Http tracker {} is busy, delaying scrape", self);
            self.requested_scrape = true;
            return;
        }

        self.requested_scrape = false;
        if let Some(entry) = self.delay_scrape.take() {
            ctx.cancel(&entry);
        }

        let url = self.create_scrape_url();
        let families = self.resolve_families();
        match url.and_then(|url| families.map(|families| (url, families))) {
            Ok((url, mut families)) => {
                families.truncate(1);
                self.start_request(ctx, RequestKind::Scrape, url, families);
            }
            Err(e) => {
                warn!("Http tracker {} is unable to scrape, {}", self, e);
                self.listener.on_scrape_failure(self.handle, e);
            }
        }
    }

    fn close(&mut self, ctx: &ThreadContext) {
        self.close_directly();
        self.requested_scrape = false;

        if let Some(entry) = self.delay_scrape.take() {
            ctx.cancel(&entry);
        }
    }

    fn tracker_type(&self) -> TrackerType {
        TrackerType::Http
    }
}

impl Drop for TrackerHttp {
    fn drop(&mut self) {
        self.close_directly();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_logger;
    use crate::net::{HttpBody, HttpError, HttpGet, HttpResponseSender, NetworkPolicy};
    use crate::tracker::TransferStats;
    use crate::TrackerSettings;
    use bytes::Bytes;
    use mockall::mock;
    use rand::RngExt;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::unbounded_channel;

    mock! {
        #[derive(Debug)]
        pub HttpClient {}

        impl HttpGet for HttpClient {
            fn get(&self, tag: RequestTag, request: HttpRequest, sender: HttpResponseSender) -> CancellationToken;
        }
    }

    mock! {
        #[derive(Debug)]
        pub Listener {}

        impl TrackerListener for Listener {
            fn on_success(&self, handle: TrackerHandle, result: AnnounceResult);
            fn on_failure(&self, handle: TrackerHandle, error: TrackerError);
            fn on_scrape_success(&self, handle: TrackerHandle, metrics: ScrapeFileMetrics);
            fn on_scrape_failure(&self, handle: TrackerHandle, error: TrackerError);
        }
    }

    #[derive(Debug, Default)]
    struct CountingListener {
        success: AtomicUsize,
        failure: AtomicUsize,
    }

    impl TrackerListener for CountingListener {
        fn on_success(&self, _: TrackerHandle, _: AnnounceResult) {
            self.success.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _: TrackerHandle, _: TrackerError) {
            self.failure.fetch_add(1, Ordering::SeqCst);
        }

        fn on_scrape_success(&self, _: TrackerHandle, _: ScrapeFileMetrics) {}

        fn on_scrape_failure(&self, _: TrackerHandle, _: TrackerError) {}
    }

    /// Create a http client mock which records the requests.
    fn recording_client(
        requests: Arc<Mutex<Vec<(RequestTag, HttpRequest, CancellationToken)>>>,
    ) -> MockHttpClient {
        let mut client = MockHttpClient::new();
        client.expect_get().returning(move |tag, request, _| {
            let token = CancellationToken::new();
            requests
                .lock()
                .unwrap()
                .push((tag, request, token.clone()));
            token
        });
        client
    }

    fn create_context(
        settings: TrackerSettings,
        policy: NetworkPolicy,
        client: MockHttpClient,
    ) -> TrackerContext {
        TrackerContext::new(settings, Arc::new(policy), Arc::new(client))
    }

    fn create_info(url: &str) -> TrackerInfo {
        TrackerInfo {
            url: Url::parse(url).unwrap(),
            info_hash: InfoHash::from_str("2E8E44068B254814EA1A7D4969A9AF1D78E0F51F").unwrap(),
            peer_id: *b"-FX0001-abcdefghijkl",
            key: 0xAB12,
            stats: Arc::new(TransferStats::new(0, 0, 1024)),
        }
    }

    fn create_thread_context() -> ThreadContext {
        let (tx, _rx) = unbounded_channel();
        ThreadContext::new(tx)
    }

    fn announce_body() -> Bytes {
        let mut body = b"d8:completei5e10:incompletei3e8:intervali1800e5:peers6:".to_vec();
        body.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);
        body.extend_from_slice(b"10:tracker id3:abce");
        Bytes::from(body)
    }

    fn response(tag: RequestTag, status: u16, body: Bytes) -> HttpResponse {
        HttpResponse {
            tag,
            result: Ok(HttpBody { status, body }),
        }
    }

    #[test]
    fn test_send_event_dual_stack() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(MockListener::new()),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);

        let requests = requests.lock().unwrap();
        assert_eq!(true, tracker.is_busy());
        assert_eq!(vec![IpFamily::V4, IpFamily::V6], tracker.active_legs());
        assert_eq!(2, requests.len());
        assert_eq!(requests[0].0.request_id, requests[1].0.request_id);
        let query = requests[0].1.url.query().unwrap();
        assert!(
            query.contains("info_hash=.%8ED%06%8B%25H%14%EA%1A%7DIi%A9%AF%1Dx%E0%F5%1F"),
            "expected the info hash to be present in {}",
            query
        );
        assert!(query.contains("event=started"), "expected the event in {}", query);
        assert!(query.contains("port=6881"), "expected the port in {}", query);
    }

    #[test]
    fn test_send_event_none_omits_event() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let settings = TrackerSettings {
            announce_ipv6: false,
            ..TrackerSettings::default()
        };
        let context = create_context(
            settings,
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce?passkey=lorem"),
            context,
            Arc::new(MockListener::new()),
        );

        tracker.send_event(&ctx, AnnounceEvent::None);

        let requests = requests.lock().unwrap();
        assert_eq!(vec![IpFamily::Unspecified], tracker.active_legs());
        let query = requests[0].1.url.query().unwrap();
        assert!(query.starts_with("passkey=lorem&"), "expected the passkey in {}", query);
        assert!(!query.contains("event="), "expected no event in {}", query);
    }

    #[test]
    fn test_send_event_leg_selection() {
        init_logger!();
        let cases = [
            (NetworkPolicy::new(false, false, true), vec![IpFamily::V6]),
            (NetworkPolicy::new(true, false, true), vec![IpFamily::V6]),
            (NetworkPolicy::new(false, true, false), vec![IpFamily::V4]),
        ];

        for (policy, expected_result) in cases {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let context = create_context(
                TrackerSettings::default(),
                policy,
                recording_client(requests.clone()),
            );
            let ctx = create_thread_context();
            let mut tracker = TrackerHttp::new(
                create_info("http://localhost:6969/announce"),
                context,
                Arc::new(MockListener::new()),
            );

            tracker.send_event(&ctx, AnnounceEvent::Started);

            assert_eq!(expected_result, tracker.active_legs());
        }
    }

    #[test]
    fn test_send_event_no_address_family() {
        init_logger!();
        let mut client = MockHttpClient::new();
        client.expect_get().times(0);
        let mut listener = MockListener::new();
        listener
            .expect_on_failure()
            .withf(|_, error| *error == TrackerError::NoAddressFamily)
            .times(1)
            .return_const(());
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::new(true, true, false),
            client,
        );
        let ctx = create_thread_context();
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(listener),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);

        assert_eq!(false, tracker.is_busy());
    }

    #[test]
    fn test_receive_done_success() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut listener = MockListener::new();
        listener
            .expect_on_success()
            .withf(|_, result| {
                result.interval == Duration::from_secs(1800)
                    && result.seeders == Some(5)
                    && result.leechers == Some(3)
                    && result.peers == vec![SocketAddr::from(([127, 0, 0, 1], 6881))]
                    && result.family == IpFamily::V6
            })
            .times(1)
            .return_const(());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(listener),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        let (tag_v4, tag_v6, token_v4) = {
            let requests = requests.lock().unwrap();
            (requests[0].0, requests[1].0, requests[0].2.clone())
        };
        tracker.receive_done(&ctx, response(tag_v6, 200, announce_body()));
        tracker.receive_done(&ctx, response(tag_v4, 200, announce_body()));

        assert_eq!(false, tracker.is_busy());
        assert_eq!(true, token_v4.is_cancelled(), "expected the sibling leg to be cancelled");
        assert_eq!(Some("abc"), tracker.tracker_id());

        tracker.send_event(&ctx, AnnounceEvent::None);
        let requests = requests.lock().unwrap();
        let query = requests[2].1.url.query().unwrap();
        assert!(query.contains("trackerid=abc"), "expected the tracker id in {}", query);
    }

    #[test]
    fn test_receive_done_failure_reason() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut listener = MockListener::new();
        listener
            .expect_on_failure()
            .withf(|_, error| match error {
                TrackerError::AnnounceFailure(reason) => reason == "unregistered torrent",
                _ => false,
            })
            .times(1)
            .return_const(());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(listener),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        let tag = requests.lock().unwrap()[0].0;
        tracker.receive_done(
            &ctx,
            response(
                tag,
                200,
                Bytes::from_static(b"d14:failure reason20:unregistered torrente"),
            ),
        );

        assert_eq!(false, tracker.is_busy());
    }

    #[test]
    fn test_receive_done_invalid_status() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut listener = MockListener::new();
        listener
            .expect_on_failure()
            .withf(|_, error| *error == TrackerError::Status(0))
            .times(1)
            .return_const(());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(listener),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        let tag = requests.lock().unwrap()[1].0;
        tracker.receive_done(&ctx, response(tag, 503, Bytes::new()));
    }

    #[test]
    fn test_receive_done_randomized_order() {
        init_logger!();
        let mut rng = rand::rng();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let listener = Arc::new(CountingListener::default());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            listener.clone(),
        );

        for trial in 0..1000 {
            tracker.send_event(&ctx, AnnounceEvent::None);
            let mut tags: Vec<RequestTag> = requests
                .lock()
                .unwrap()
                .drain(..)
                .map(|(tag, _, _)| tag)
                .collect();
            assert_eq!(2, tags.len());
            if rng.random_bool(0.5) {
                tags.reverse();
            }

            for tag in tags {
                let response = if rng.random_bool(0.5) {
                    response(tag, 200, announce_body())
                } else {
                    HttpResponse {
                        tag,
                        result: Err(HttpError::Timeout),
                    }
                };
                tracker.receive_done(&ctx, response);
            }

            let handled =
                listener.success.load(Ordering::SeqCst) + listener.failure.load(Ordering::SeqCst);
            assert_eq!(
                trial + 1,
                handled,
                "expected exactly one outcome per announce"
            );
            assert_eq!(false, tracker.is_busy());
        }
    }

    #[test]
    fn test_close() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut listener = MockListener::new();
        listener.expect_on_success().times(0);
        listener.expect_on_failure().times(0);
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(listener),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        tracker.close(&ctx);
        tracker.close(&ctx);

        let requests = requests.lock().unwrap();
        assert_eq!(false, tracker.is_busy());
        assert!(
            requests.iter().all(|(_, _, token)| token.is_cancelled()),
            "expected all legs to be cancelled"
        );
        tracker.receive_done(&ctx, response(requests[0].0, 200, announce_body()));
    }

    #[test]
    fn test_send_scrape() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut listener = MockListener::new();
        listener
            .expect_on_scrape_success()
            .withf(|_, metrics| {
                *metrics
                    == ScrapeFileMetrics {
                        complete: 10,
                        incomplete: 2,
                        downloaded: 50,
                    }
            })
            .times(1)
            .return_const(());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce.php?passkey=lorem"),
            context,
            Arc::new(listener),
        );

        tracker.send_scrape(&ctx);
        let (tag, url) = {
            let requests = requests.lock().unwrap();
            assert_eq!(1, requests.len());
            (requests[0].0, requests[0].1.url.clone())
        };
        assert_eq!("/scrape.php", url.path());
        assert_eq!(
            Some("passkey=lorem&info_hash=.%8ED%06%8B%25H%14%EA%1A%7DIi%A9%AF%1Dx%E0%F5%1F"),
            url.query()
        );

        let mut body = b"d5:filesd20:".to_vec();
        body.extend_from_slice(tracker.info().info_hash.as_bytes());
        body.extend_from_slice(b"d8:completei10e10:downloadedi50e10:incompletei2eeee");
        tracker.receive_done(&ctx, response(tag, 200, Bytes::from(body)));

        assert_eq!(false, tracker.is_busy());
    }

    #[test]
    fn test_send_scrape_unsupported() {
        init_logger!();
        let mut listener = MockListener::new();
        listener
            .expect_on_scrape_failure()
            .withf(|_, error| *error == TrackerError::ScrapeUnsupported(String::new()))
            .times(1)
            .return_const(());
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            MockHttpClient::new(),
        );
        let ctx = create_thread_context();
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/tracker"),
            context,
            Arc::new(listener),
        );

        tracker.send_scrape(&ctx);

        assert_eq!(false, tracker.is_busy());
    }

    #[test]
    fn test_send_scrape_while_busy() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let listener = Arc::new(CountingListener::default());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            listener.clone(),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        tracker.send_scrape(&ctx);
        tracker.send_scrape(&ctx);
        assert_eq!(true, tracker.is_scrape_requested());
        assert_eq!(2, requests.lock().unwrap().len(), "expected no additional request");

        let tag = requests.lock().unwrap()[0].0;
        tracker.receive_done(&ctx, response(tag, 200, announce_body()));
        let entry = tracker.delay_scrape.expect("expected a delayed scrape");
        assert_eq!(true, ctx.is_scheduled(&entry));
        assert_eq!(1, ctx.scheduled_len());

        tracker.delayed_send_scrape(&ctx);

        let requests = requests.lock().unwrap();
        assert_eq!(3, requests.len());
        assert_eq!("/scrape", requests[2].1.url.path());
        assert_eq!(false, tracker.is_scrape_requested());
        assert_eq!(1, listener.success.load(Ordering::SeqCst));
    }

    #[test]
    fn test_send_event_failure_keeps_requested_scrape() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let policy = Arc::new(NetworkPolicy::default());
        let context = TrackerContext::new(
            TrackerSettings::default(),
            policy.clone(),
            Arc::new(recording_client(requests.clone())),
        );
        let ctx = create_thread_context();
        let listener = Arc::new(CountingListener::default());
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            listener.clone(),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        tracker.send_scrape(&ctx);
        policy.set_block_ipv4(true);
        policy.set_block_ipv6(true);
        tracker.send_event(&ctx, AnnounceEvent::None);

        assert_eq!(false, tracker.is_busy());
        assert_eq!(1, listener.failure.load(Ordering::SeqCst));
        assert_eq!(true, tracker.is_scrape_requested());
        let entry = tracker.delay_scrape.expect("expected a delayed scrape");
        assert_eq!(true, ctx.is_scheduled(&entry));
        assert_eq!(1, ctx.scheduled_len());
    }

    #[test]
    fn test_close_cancels_delayed_scrape() {
        init_logger!();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let context = create_context(
            TrackerSettings::default(),
            NetworkPolicy::default(),
            recording_client(requests.clone()),
        );
        let ctx = create_thread_context();
        let mut tracker = TrackerHttp::new(
            create_info("http://localhost:6969/announce"),
            context,
            Arc::new(CountingListener::default()),
        );

        tracker.send_event(&ctx, AnnounceEvent::Started);
        tracker.send_scrape(&ctx);
        let tag = requests.lock().unwrap()[0].0;
        tracker.receive_done(&ctx, response(tag, 200, announce_body()));
        assert_eq!(1, ctx.scheduled_len());

        tracker.close(&ctx);

        assert_eq!(0, ctx.scheduled_len());
        assert_eq!(false, tracker.is_scrape_requested());
    }
}
