use crate::thread::ThreadContext;
use crate::tracker::TrackerManager;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::time::Instant;

/// A callback which is invoked on the tracker thread.
pub type ScheduledCallback = Box<dyn FnOnce(&mut TrackerManager, &ThreadContext)>;

/// The cancellable handle of a scheduled callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SchedulerEntry {
    id: u64,
    deadline: Instant,
}

impl SchedulerEntry {
    /// Returns the moment on which the callback is due.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// The timer queue of one-shot callbacks, ordered by their deadline.
/// Callbacks with the same deadline are invoked in the order in which they were scheduled.
#[derive(Default)]
pub struct Scheduler {
    next_id: u64,
    entries: BTreeMap<(Instant, u64), ScheduledCallback>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the callback to be invoked no earlier than the given deadline.
    pub fn schedule(&mut self, deadline: Instant, callback: ScheduledCallback) -> SchedulerEntry {
        self.next_id += 1;
        let entry = SchedulerEntry {
            id: self.next_id,
            deadline,
        };

        self.entries.insert((deadline, entry.id), callback);
        entry
    }

    /// Cancel the given entry.
    /// It returns true when the entry was still scheduled.
    pub fn cancel(&mut self, entry: &SchedulerEntry) -> bool {
        self.entries.remove(&(entry.deadline, entry.id)).is_some()
    }

    /// Returns true when the entry has not been invoked or cancelled yet.
    pub fn is_scheduled(&self, entry: &SchedulerEntry) -> bool {
        self.entries.contains_key(&(entry.deadline, entry.id))
    }

    /// Returns the deadline of the first scheduled callback.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return all callbacks which are due at the given moment.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledCallback> {
        let mut due = Vec::new();

        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }

            due.push(entry.remove());
        }

        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("next_id", &self.next_id)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::{DhtController, DhtRouter, DhtRouterFactory};
    use crate::{TrackerContext, TrackerSettings};
    use mockall::mock;
    use serde_bencode::value::Value;
    use std::cell::RefCell;
    use std::net::SocketAddr;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;

    mock! {
        #[derive(Debug)]
        pub RouterFactory {}

        impl DhtRouterFactory for RouterFactory {
            fn create(&self, cache: &Value, bind_address: SocketAddr) -> crate::dht::Result<Box<dyn DhtRouter>>;
        }
    }

    fn create_manager() -> TrackerManager {
        let context = TrackerContext::from_settings(TrackerSettings::default()).unwrap();
        TrackerManager::new(
            context,
            Arc::new(DhtController::new(Arc::new(MockRouterFactory::new()))),
        )
    }

    fn recording_callback(calls: &Rc<RefCell<Vec<u32>>>, value: u32) -> ScheduledCallback {
        let calls = calls.clone();
        Box::new(move |_, _| calls.borrow_mut().push(value))
    }

    #[test]
    fn test_take_due() {
        let now = Instant::now();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        scheduler.schedule(now + Duration::from_secs(5), recording_callback(&calls, 3));
        scheduler.schedule(now, recording_callback(&calls, 1));
        scheduler.schedule(now, recording_callback(&calls, 2));

        let result = scheduler.take_due(now);

        assert_eq!(2, result.len());
        assert_eq!(1, scheduler.len());
        assert_eq!(Some(now + Duration::from_secs(5)), scheduler.next_deadline());

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ThreadContext::new(tx);
        let mut manager = create_manager();
        for callback in result {
            callback(&mut manager, &ctx);
        }
        assert_eq!(vec![1, 2], *calls.borrow());
    }

    #[test]
    fn test_cancel() {
        let now = Instant::now();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let entry = scheduler.schedule(now, recording_callback(&calls, 1));
        assert_eq!(true, scheduler.is_scheduled(&entry));

        assert_eq!(true, scheduler.cancel(&entry));
        assert_eq!(false, scheduler.cancel(&entry));
        assert_eq!(false, scheduler.is_scheduled(&entry));
        assert_eq!(0, scheduler.take_due(now + Duration::from_secs(1)).len());
        assert_eq!(true, calls.borrow().is_empty());
    }
}
