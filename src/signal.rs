use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// What woke the consumer out of [`CrossThreadSignal::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// At least one notify arrived since the last wait returned.
    Notified,
    /// The signal was closed; no further notifies will arrive.
    Closed,
}

/// Coalescing wake primitive between the OS callback thread and the consumer.
///
/// Any number of `notify` calls while the consumer is awake collapse into a
/// single pending wake, so the wake count never equals the event count; the
/// queue, not this signal, is the source of truth and the consumer must drain
/// it fully on every wake. After `close`, `notify` is a no-op by contract
/// since in-flight OS callbacks may still fire.
pub struct CrossThreadSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    closed: bool,
}

impl CrossThreadSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Wake the consumer if it is waiting; coalesce with any pending wake.
    pub fn notify(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.pending = true;
        self.condvar.notify_one();
    }

    /// Block until a notify or close arrives.
    ///
    /// A pending wake is consumed before a close is observed, so work
    /// signalled before the close still gets a normal wake.
    pub fn wait(&self) -> Wake {
        let mut state = self.state.lock();
        loop {
            if state.pending {
                state.pending = false;
                return Wake::Notified;
            }
            if state.closed {
                return Wake::Closed;
            }
            self.condvar.wait(&mut state);
        }
    }

    /// Release the signal. Waiters unblock with [`Wake::Closed`] once any
    /// pending wake has been consumed; later notifies are ignored.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            debug!("cross-thread signal closed");
            state.closed = true;
            self.condvar.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for CrossThreadSignal {
    fn default() -> Self {
        Self::new()
    }
}
