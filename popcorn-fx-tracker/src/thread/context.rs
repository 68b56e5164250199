use crate::net::HttpResponseSender;
use crate::thread::{Scheduler, SchedulerEntry};
use crate::tracker::TrackerManager;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// The capability of running on the tracker thread.
///
/// The context can't be sent to other threads, so holding a reference proves
/// that the caller is executing on the thread which owns the tracker workers.
#[derive(Debug)]
pub struct ThreadContext {
    thread_id: ThreadId,
    scheduler: RefCell<Scheduler>,
    http_sender: HttpResponseSender,
    _not_send: PhantomData<Rc<()>>,
}

impl ThreadContext {
    pub(crate) fn new(http_sender: HttpResponseSender) -> Self {
        Self {
            thread_id: std::thread::current().id(),
            scheduler: RefCell::new(Scheduler::new()),
            http_sender,
            _not_send: PhantomData,
        }
    }

    /// Returns the id of the owning thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns true when the caller is executing on the owning thread.
    pub fn is_current_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Returns the sender on which http completions are delivered to this thread.
    pub fn http_sender(&self) -> HttpResponseSender {
        self.http_sender.clone()
    }

    /// Schedule the callback to be invoked on this thread after the given delay.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> SchedulerEntry
    where
        F: FnOnce(&mut TrackerManager, &ThreadContext) + 'static,
    {
        self.scheduler
            .borrow_mut()
            .schedule(Instant::now() + delay, Box::new(callback))
    }

    /// Cancel the scheduled callback.
    /// It returns true when the callback was still scheduled.
    pub fn cancel(&self, entry: &SchedulerEntry) -> bool {
        self.scheduler.borrow_mut().cancel(entry)
    }

    pub fn is_scheduled(&self, entry: &SchedulerEntry) -> bool {
        self.scheduler.borrow().is_scheduled(entry)
    }

    /// Returns the number of pending callbacks.
    pub fn scheduled_len(&self) -> usize {
        self.scheduler.borrow().len()
    }

    /// Returns the duration until the next scheduled callback is due,
    /// or the given default when nothing sooner is scheduled.
    pub fn next_timeout(&self, default: Duration) -> Duration {
        self.scheduler
            .borrow()
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .map(|timeout| timeout.min(default))
            .unwrap_or(default)
    }

    /// Invoke all callbacks which are due at the given moment.
    /// It returns the number of invoked callbacks.
    pub(crate) fn call_due(&self, manager: &mut TrackerManager, now: Instant) -> usize {
        let due = self.scheduler.borrow_mut().take_due(now);
        let len = due.len();

        for callback in due {
            callback(manager, self);
        }

        len
    }
}
