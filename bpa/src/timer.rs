/*!
Timers that post an event to a stage queue when they fire.

Cancellation can race a timer that is already firing, so every timer event
carries enough state for its handler to recognise a stale fire.
*/

use super::*;
use event::BundleEvent;
use std::collections::BTreeMap;

pub type TimerId = u64;

pub trait Timers: Send + Sync {
    /// Posts `event` to `queue` after `delay`.
    fn schedule_in(
        &self,
        delay: std::time::Duration,
        queue: &EventQueue,
        event: BundleEvent,
    ) -> TimerId;

    /// Returns false if the timer had already fired or was unknown.
    fn cancel(&self, id: TimerId) -> bool;
}

#[derive(Default)]
struct State {
    next_id: TimerId,
    due: BTreeMap<(std::time::Instant, TimerId), (EventQueue, BundleEvent)>,
    by_id: hashbrown::HashMap<TimerId, std::time::Instant>,
    shutdown: bool,
}

struct Shared {
    state: std::sync::Mutex<State>,
    cond: std::sync::Condvar,
}

/// A timer wheel driven by one background thread.
pub struct ThreadTimers {
    shared: Arc<Shared>,
    thread: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ThreadTimers {
    pub fn new() -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: std::sync::Mutex::new(State::default()),
            cond: std::sync::Condvar::new(),
        });
        let thread = std::thread::Builder::new().name("timers".into()).spawn({
            let shared = shared.clone();
            move || run(&shared)
        })?;
        Ok(Self {
            shared,
            thread: std::sync::Mutex::new(Some(thread)),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().trace_expect("Timer lock poisoned")
    }

    /// Stops the timer thread, dropping any timers still pending.
    pub fn shutdown(&self) {
        self.state().shutdown = true;
        self.shared.cond.notify_all();
        let thread = self
            .thread
            .lock()
            .trace_expect("Timer thread lock poisoned")
            .take();
        if thread.is_some_and(|t| t.join().is_err()) {
            error!("Timer thread panicked");
        }
    }
}

impl Drop for ThreadTimers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Timers for ThreadTimers {
    fn schedule_in(
        &self,
        delay: std::time::Duration,
        queue: &EventQueue,
        event: BundleEvent,
    ) -> TimerId {
        let when = std::time::Instant::now() + delay;
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        trace!("Timer {id} for {} in {delay:?}", event.name());
        state.due.insert((when, id), (queue.clone(), event));
        state.by_id.insert(id, when);
        drop(state);

        self.shared.cond.notify_all();
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state();
        match state.by_id.remove(&id) {
            Some(when) => state.due.remove(&(when, id)).is_some(),
            None => false,
        }
    }
}

fn run(shared: &Shared) {
    let mut state = shared.state.lock().trace_expect("Timer lock poisoned");
    loop {
        if state.shutdown {
            break;
        }

        let now = std::time::Instant::now();
        match state.due.first_key_value().map(|(k, _)| *k) {
            Some((when, id)) if when <= now => {
                if let Some((queue, event)) = state.due.remove(&(when, id)) {
                    state.by_id.remove(&id);
                    drop(state);
                    queue.post(event);
                    state = shared.state.lock().trace_expect("Timer lock poisoned");
                }
            }
            Some((when, _)) => {
                state = shared
                    .cond
                    .wait_timeout(state, when - now)
                    .trace_expect("Timer lock poisoned")
                    .0;
            }
            None => {
                state = shared.cond.wait(state).trace_expect("Timer lock poisoned");
            }
        }
    }
}

/// Timers that only fire when a test says so.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct ManualTimers {
    timers: std::sync::Mutex<Vec<(TimerId, std::time::Duration, EventQueue, BundleEvent)>>,
    next_id: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl ManualTimers {
    pub fn len(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Removes every pending timer without firing it.
    pub fn take_all(&self) -> Vec<BundleEvent> {
        self.timers
            .lock()
            .unwrap()
            .drain(..)
            .map(|(_, _, _, event)| event)
            .collect()
    }

    /// Fires the pending timers whose event matches `pred`.
    pub fn fire_where(&self, pred: impl Fn(&BundleEvent) -> bool) -> usize {
        let timers = {
            let mut timers = self.timers.lock().unwrap();
            let (fire, keep) = std::mem::take(&mut *timers)
                .into_iter()
                .partition::<Vec<_>, _>(|t| pred(&t.3));
            *timers = keep;
            fire
        };
        let count = timers.len();
        for (_, _, queue, event) in timers {
            queue.post(event);
        }
        count
    }
}

#[cfg(test)]
impl Timers for ManualTimers {
    fn schedule_in(
        &self,
        delay: std::time::Duration,
        queue: &EventQueue,
        event: BundleEvent,
    ) -> TimerId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        self.timers
            .lock()
            .unwrap()
            .push((id, delay, queue.clone(), event));
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut timers = self.timers.lock().unwrap();
        let before = timers.len();
        timers.retain(|t| t.0 != id);
        timers.len() != before
    }
}
