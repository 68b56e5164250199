use crate::dht::{DhtController, DhtRouterFactory};
use crate::net::HttpResponse;
use crate::thread::{Result, ThreadContext, ThreadError};
use crate::tracker::{
    AnnounceEvent, TrackerHandle, TrackerInfo, TrackerListener, TrackerManager,
};
use crate::TrackerContext;
use derive_more::Display;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::select;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const THREAD_NAME: &str = "tracker";

/// A callback which is posted from another thread to the tracker thread.
pub type PostedCallback = Box<dyn FnOnce(&mut TrackerManager, &ThreadContext) + Send>;

/// The outcome of a single tick of the tracker thread.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum LoopControl {
    #[display("continue")]
    Continue,
    /// The thread should stop its event loop.
    #[display("shutdown")]
    Shutdown,
}

/// The lifecycle state of the tracker thread.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum ThreadState {
    #[display("created")]
    Created,
    #[display("initialized")]
    Initialized,
    #[display("active")]
    Active,
    #[display("stopped")]
    Stopped,
}

/// The commands which are sent to the tracker thread.
pub enum ThreadCommand {
    /// Invoke the callback on the tracker thread.
    Call(PostedCallback),
    /// Wake up the event loop.
    Wake,
}

impl Debug for ThreadCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadCommand::Call(_) => write!(f, "Call"),
            ThreadCommand::Wake => write!(f, "Wake"),
        }
    }
}

/// The event which woke up the event loop.
enum LoopEvent {
    Command(Option<ThreadCommand>),
    Http(Option<HttpResponse>),
    Timeout,
}

/// The event loop of the tracker thread.
/// It owns the tracker manager and is only accessed from the tracker thread.
struct TrackerLoop {
    ctx: ThreadContext,
    manager: Option<TrackerManager>,
    command_receiver: UnboundedReceiver<ThreadCommand>,
    http_receiver: UnboundedReceiver<HttpResponse>,
    do_shutdown: Arc<AtomicBool>,
    did_shutdown: bool,
    state: Arc<Mutex<ThreadState>>,
    wake_interval: Duration,
}

impl TrackerLoop {
    fn new(
        context: TrackerContext,
        dht: Arc<DhtController>,
        command_receiver: UnboundedReceiver<ThreadCommand>,
        do_shutdown: Arc<AtomicBool>,
        state: Arc<Mutex<ThreadState>>,
    ) -> Self {
        let (http_sender, http_receiver) = unbounded_channel();
        let wake_interval = context.settings().wake_interval();

        Self {
            ctx: ThreadContext::new(http_sender),
            manager: Some(TrackerManager::new(context, dht)),
            command_receiver,
            http_receiver,
            do_shutdown,
            did_shutdown: false,
            state,
            wake_interval,
        }
    }

    fn init_thread(&mut self) {
        *self.state.lock() = ThreadState::Initialized;
        debug!("Tracker thread has been initialized");
    }

    async fn run(&mut self) {
        *self.state.lock() = ThreadState::Active;

        loop {
            match self.call_events() {
                Ok(LoopControl::Continue) => {}
                Ok(LoopControl::Shutdown) => break,
                Err(e) => {
                    error!("Tracker thread event loop failed, {}", e);
                    break;
                }
            }

            let timeout = self.next_timeout();
            let event = select! {
                command = self.command_receiver.recv() => LoopEvent::Command(command),
                response = self.http_receiver.recv() => LoopEvent::Http(response),
                _ = tokio::time::sleep(timeout) => LoopEvent::Timeout,
            };

            match event {
                LoopEvent::Command(Some(command)) => self.handle_command(command),
                LoopEvent::Command(None) => {
                    debug!("Tracker thread handles have been dropped, shutting down");
                    self.do_shutdown.store(true, Ordering::SeqCst);
                }
                LoopEvent::Http(Some(response)) => self.handle_http(response),
                LoopEvent::Http(None) => {}
                LoopEvent::Timeout => trace!("Tracker thread woke up after {:?}", timeout),
            }
        }
    }

    /// Execute a single tick of the event loop.
    ///
    /// When a shutdown has been requested, it returns [LoopControl::Shutdown] once.
    /// Any following tick results in [ThreadError::AlreadyShutdown].
    fn call_events(&mut self) -> Result<LoopControl> {
        if self.do_shutdown.load(Ordering::SeqCst) {
            if self.did_shutdown {
                let err = ThreadError::AlreadyShutdown;
                error!("Tracker thread failed to process events, {}", err);
                return Err(err);
            }

            self.did_shutdown = true;
            return Ok(LoopControl::Shutdown);
        }

        self.process_callbacks();
        Ok(LoopControl::Continue)
    }

    fn process_callbacks(&mut self) {
        while let Ok(command) = self.command_receiver.try_recv() {
            self.handle_command(command);
        }
        while let Ok(response) = self.http_receiver.try_recv() {
            self.handle_http(response);
        }

        if let Some(manager) = self.manager.as_mut() {
            self.ctx.call_due(manager, Instant::now());
        }
    }

    fn next_timeout(&self) -> Duration {
        self.ctx.next_timeout(self.wake_interval)
    }

    fn handle_command(&mut self, command: ThreadCommand) {
        match command {
            ThreadCommand::Call(callback) => {
                if let Some(manager) = self.manager.as_mut() {
                    callback(manager, &self.ctx);
                }
            }
            ThreadCommand::Wake => trace!("Tracker thread received wake up"),
        }
    }

    fn handle_http(&mut self, response: HttpResponse) {
        if let Some(manager) = self.manager.as_mut() {
            manager.receive_http(&self.ctx, response);
        }
    }

    fn cleanup_thread(&mut self) {
        if let Some(mut manager) = self.manager.take() {
            manager.shutdown(&self.ctx);
        }

        *self.state.lock() = ThreadState::Stopped;
        debug!("Tracker thread has been cleaned up");
    }
}

/// The handle of the tracker thread which can be used from any thread.
#[derive(Debug, Clone)]
pub struct TrackerThreadHandle {
    command_sender: UnboundedSender<ThreadCommand>,
    do_shutdown: Arc<AtomicBool>,
    state: Arc<Mutex<ThreadState>>,
    dht: Arc<DhtController>,
}

impl TrackerThreadHandle {
    /// Invoke the callback on the tracker thread.
    pub fn post<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&mut TrackerManager, &ThreadContext) + Send + 'static,
    {
        self.command_sender
            .send(ThreadCommand::Call(Box::new(callback)))
            .map_err(|_| ThreadError::Closed)
    }

    /// Add a new http tracker worker to the tracker thread.
    pub fn add_tracker(
        &self,
        info: TrackerInfo,
        listener: Arc<dyn TrackerListener>,
    ) -> Result<TrackerHandle> {
        let handle = TrackerHandle::new();

        self.post(move |manager, _| {
            if let Err(e) = manager.add_tracker_with_handle(handle, info, listener) {
                warn!("Tracker thread failed to add tracker, {}", e);
            }
        })?;
        Ok(handle)
    }

    pub fn remove_tracker(&self, handle: TrackerHandle) -> Result<()> {
        self.post(move |manager, ctx| {
            if let Err(e) = manager.remove_tracker(ctx, &handle) {
                warn!("Tracker thread failed to remove tracker, {}", e);
            }
        })
    }

    pub fn send_event(&self, handle: TrackerHandle, event: AnnounceEvent) -> Result<()> {
        self.post(move |manager, ctx| {
            if let Err(e) = manager.send_event(ctx, &handle, event) {
                warn!("Tracker thread failed to send event {}, {}", event, e);
            }
        })
    }

    pub fn send_scrape(&self, handle: TrackerHandle) -> Result<()> {
        self.post(move |manager, ctx| {
            if let Err(e) = manager.send_scrape(ctx, &handle) {
                warn!("Tracker thread failed to send scrape, {}", e);
            }
        })
    }

    pub fn close_tracker(&self, handle: TrackerHandle) -> Result<()> {
        self.post(move |manager, ctx| {
            if let Err(e) = manager.close_tracker(ctx, &handle) {
                warn!("Tracker thread failed to close tracker, {}", e);
            }
        })
    }

    /// Returns the DHT controller which is hosted by the tracker thread.
    pub fn dht(&self) -> &Arc<DhtController> {
        &self.dht
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Request the tracker thread to stop its event loop.
    pub fn request_shutdown(&self) {
        debug!("Tracker thread shutdown has been requested");
        self.do_shutdown.store(true, Ordering::SeqCst);
        let _ = self.command_sender.send(ThreadCommand::Wake);
    }
}

/// The dedicated thread which owns the tracker workers and the DHT controller.
#[derive(Debug)]
pub struct TrackerThread {
    handle: TrackerThreadHandle,
    join_handle: Option<JoinHandle<()>>,
}

impl TrackerThread {
    /// Spawn a new tracker thread.
    pub fn spawn(
        context: TrackerContext,
        dht_factory: Arc<dyn DhtRouterFactory>,
    ) -> Result<Self> {
        let dht = Arc::new(DhtController::from_settings(
            dht_factory,
            &context.settings().dht,
        ));
        let (command_sender, command_receiver) = unbounded_channel();
        let do_shutdown = Arc::new(AtomicBool::new(false));
        let state = Arc::new(Mutex::new(ThreadState::Created));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ThreadError::Runtime(e.to_string()))?;

        let thread_dht = dht.clone();
        let thread_shutdown = do_shutdown.clone();
        let thread_state = state.clone();
        let join_handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let mut event_loop = TrackerLoop::new(
                    context,
                    thread_dht,
                    command_receiver,
                    thread_shutdown,
                    thread_state,
                );

                event_loop.init_thread();
                runtime.block_on(event_loop.run());
                event_loop.cleanup_thread();
            })
            .map_err(|e| ThreadError::Spawn(e.to_string()))?;

        info!("Tracker thread has been spawned");
        Ok(Self {
            handle: TrackerThreadHandle {
                command_sender,
                do_shutdown,
                state,
                dht,
            },
            join_handle: Some(join_handle),
        })
    }

    /// Returns a handle to the tracker thread.
    pub fn handle(&self) -> TrackerThreadHandle {
        self.handle.clone()
    }

    /// Wait for the tracker thread to finish.
    /// The thread only finishes after [TrackerThreadHandle::request_shutdown] has been called.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(join_handle) => join_handle
                .join()
                .map_err(|_| ThreadError::Runtime("tracker thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for TrackerThread {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            self.handle.request_shutdown();
            if let Err(e) = self.join_inner() {
                warn!("Failed to join the tracker thread, {}", e);
            }
        }
    }
}
