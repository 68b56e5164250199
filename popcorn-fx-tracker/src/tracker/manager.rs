use crate::dht::DhtController;
use crate::net::HttpResponse;
use crate::thread::ThreadContext;
use crate::tracker::{
    AnnounceEvent, Result, TrackerError, TrackerHandle, TrackerHttp, TrackerInfo,
    TrackerListener, TrackerWorker,
};
use crate::TrackerContext;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// The registry of the tracker workers, owned by the tracker thread.
#[derive(Debug)]
pub struct TrackerManager {
    context: TrackerContext,
    dht: Arc<DhtController>,
    trackers: HashMap<TrackerHandle, TrackerHttp>,
}

impl TrackerManager {
    pub fn new(context: TrackerContext, dht: Arc<DhtController>) -> Self {
        Self {
            context,
            dht,
            trackers: HashMap::new(),
        }
    }

    pub fn context(&self) -> &TrackerContext {
        &self.context
    }

    /// Returns the DHT controller of the tracker thread.
    pub fn dht(&self) -> &Arc<DhtController> {
        &self.dht
    }

    /// Create a new http tracker worker for the given tracker info.
    pub fn add_tracker(
        &mut self,
        info: TrackerInfo,
        listener: Arc<dyn TrackerListener>,
    ) -> TrackerHandle {
        let tracker = TrackerHttp::new(info, self.context.clone(), listener);
        let handle = tracker.handle();

        debug!("Tracker manager added tracker {}", tracker);
        self.trackers.insert(handle, tracker);
        handle
    }

    /// Create a new http tracker worker with a handle which has been generated by another thread.
    pub fn add_tracker_with_handle(
        &mut self,
        handle: TrackerHandle,
        info: TrackerInfo,
        listener: Arc<dyn TrackerListener>,
    ) -> Result<()> {
        let tracker = TrackerHttp::with_handle(handle, info, self.context.clone(), listener);
        self.insert_tracker(tracker).map(|_| ())
    }

    /// Add an existing http tracker worker.
    pub fn insert_tracker(&mut self, tracker: TrackerHttp) -> Result<TrackerHandle> {
        let handle = tracker.handle();
        if self.trackers.contains_key(&handle) {
            return Err(TrackerError::DuplicateHandle(handle));
        }

        debug!("Tracker manager added tracker {}", tracker);
        self.trackers.insert(handle, tracker);
        Ok(handle)
    }

    /// Close and remove the tracker worker.
    pub fn remove_tracker(&mut self, ctx: &ThreadContext, handle: &TrackerHandle) -> Result<()> {
        let mut tracker = self
            .trackers
            .remove(handle)
            .ok_or(TrackerError::InvalidHandle(*handle))?;

        tracker.close(ctx);
        debug!("Tracker manager removed tracker {}", tracker);
        Ok(())
    }

    pub fn http_tracker(&self, handle: &TrackerHandle) -> Option<&TrackerHttp> {
        self.trackers.get(handle)
    }

    pub fn http_tracker_mut(&mut self, handle: &TrackerHandle) -> Option<&mut TrackerHttp> {
        self.trackers.get_mut(handle)
    }

    /// Returns the tracker worker for the given handle.
    pub fn worker_mut(&mut self, handle: &TrackerHandle) -> Option<&mut dyn TrackerWorker> {
        self.trackers
            .get_mut(handle)
            .map(|e| e as &mut dyn TrackerWorker)
    }

    pub fn send_event(
        &mut self,
        ctx: &ThreadContext,
        handle: &TrackerHandle,
        event: AnnounceEvent,
    ) -> Result<()> {
        let worker = self
            .worker_mut(handle)
            .ok_or(TrackerError::InvalidHandle(*handle))?;

        worker.send_event(ctx, event);
        Ok(())
    }

    pub fn send_scrape(&mut self, ctx: &ThreadContext, handle: &TrackerHandle) -> Result<()> {
        let worker = self
            .worker_mut(handle)
            .ok_or(TrackerError::InvalidHandle(*handle))?;

        worker.send_scrape(ctx);
        Ok(())
    }

    /// Close the in-flight request of the tracker worker.
    pub fn close_tracker(&mut self, ctx: &ThreadContext, handle: &TrackerHandle) -> Result<()> {
        let worker = self
            .worker_mut(handle)
            .ok_or(TrackerError::InvalidHandle(*handle))?;

        worker.close(ctx);
        Ok(())
    }

    /// Deliver the http completion to the tracker worker which issued the request.
    pub fn receive_http(&mut self, ctx: &ThreadContext, response: HttpResponse) {
        match self.trackers.get_mut(&response.tag.tracker) {
            Some(tracker) => tracker.receive_done(ctx, response),
            None => trace!(
                "Tracker manager is discarding completion of removed tracker {}",
                response.tag
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Close all tracker workers and stop the DHT.
    pub fn shutdown(&mut self, ctx: &ThreadContext) {
        debug!("Tracker manager is shutting down {} trackers", self.trackers.len());
        for tracker in self.trackers.values_mut() {
            tracker.close(ctx);
        }

        self.dht.shutdown(ctx);
    }
}

impl Drop for TrackerManager {
    fn drop(&mut self) {
        if self.dht.is_active() {
            warn!("Tracker manager dropped while the DHT is still active");
            self.dht.stop();
        }
    }
}
