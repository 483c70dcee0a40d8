use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Raw control code values as the OS control manager sends them.
pub const CONTROL_PROBE: u32 = 0x00;
pub const CONTROL_STOP: u32 = 0x01;
pub const CONTROL_PAUSE: u32 = 0x02;
pub const CONTROL_CONTINUE: u32 = 0x03;
pub const CONTROL_SHUTDOWN: u32 = 0x05;
pub const CONTROL_DEVICE_EVENT: u32 = 0x0B;
pub const CONTROL_POWER_EVENT: u32 = 0x0D;

/// Control requests the OS control manager can deliver to a service.
///
/// `Probe` is the synthetic bootstrap event the run loop emits once it has
/// reported the service running, so the consumer can observe "service is now
/// running" without a separate channel. Codes outside the named set round-trip
/// through `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCode {
    Probe,
    Stop,
    Pause,
    Continue,
    Shutdown,
    DeviceEvent,
    PowerEvent,
    Custom(u32),
}

impl ControlCode {
    /// Map a raw OS control code into the closed enumeration.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            CONTROL_PROBE => ControlCode::Probe,
            CONTROL_STOP => ControlCode::Stop,
            CONTROL_PAUSE => ControlCode::Pause,
            CONTROL_CONTINUE => ControlCode::Continue,
            CONTROL_SHUTDOWN => ControlCode::Shutdown,
            CONTROL_DEVICE_EVENT => ControlCode::DeviceEvent,
            CONTROL_POWER_EVENT => ControlCode::PowerEvent,
            other => ControlCode::Custom(other),
        }
    }

    /// The raw value reported by the OS for this code.
    pub fn as_raw(self) -> u32 {
        match self {
            ControlCode::Probe => CONTROL_PROBE,
            ControlCode::Stop => CONTROL_STOP,
            ControlCode::Pause => CONTROL_PAUSE,
            ControlCode::Continue => CONTROL_CONTINUE,
            ControlCode::Shutdown => CONTROL_SHUTDOWN,
            ControlCode::DeviceEvent => CONTROL_DEVICE_EVENT,
            ControlCode::PowerEvent => CONTROL_POWER_EVENT,
            ControlCode::Custom(raw) => raw,
        }
    }

    /// Whether this code requests service termination.
    pub fn is_stop(self) -> bool {
        matches!(self, ControlCode::Stop | ControlCode::Shutdown)
    }

    /// Get the code as a string for filtering and logging.
    pub fn name(&self) -> &'static str {
        match self {
            ControlCode::Probe => "probe",
            ControlCode::Stop => "stop",
            ControlCode::Pause => "pause",
            ControlCode::Continue => "continue",
            ControlCode::Shutdown => "shutdown",
            ControlCode::DeviceEvent => "device_event",
            ControlCode::PowerEvent => "power_event",
            ControlCode::Custom(_) => "custom",
        }
    }
}

/// Opaque reference to a payload blob held by the [`PayloadTable`].
///
/// The consumer may pass it back to the accessor during its event callback;
/// the referenced bytes are released once that callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadHandle(u64);

impl PayloadHandle {
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// A control event queued between the OS callback thread and the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlEvent {
    /// The control request the OS delivered.
    pub code: ControlCode,
    /// Event sub-type forwarded verbatim from the OS (device/power detail).
    pub event_type: u32,
    /// Handle to the opaque event payload, if the OS supplied one.
    pub payload: Option<PayloadHandle>,
    /// When the callback thread received the event.
    pub received_at: SystemTime,
}

impl ControlEvent {
    pub fn new(code: ControlCode, event_type: u32, payload: Option<PayloadHandle>) -> Self {
        Self {
            code,
            event_type,
            payload,
            received_at: SystemTime::now(),
        }
    }

    /// The bootstrap event emitted when the run loop becomes ready.
    pub fn probe() -> Self {
        Self::new(ControlCode::Probe, 0, None)
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self.payload {
            Some(handle) => format!(
                "{} (type {}, payload #{})",
                self.code.name(),
                self.event_type,
                handle.as_raw()
            ),
            None => format!("{} (type {})", self.code.name(), self.event_type),
        }
    }
}

/// Single-owner table of event payload blobs.
///
/// The OS callback thread inserts a payload when it enqueues an event; the
/// table owns the bytes until the dispatcher releases the handle after the
/// consumer's callback for that event returns. There is exactly one releaser,
/// so a payload can be neither freed twice nor read after release.
pub struct PayloadTable {
    entries: Mutex<HashMap<u64, Arc<[u8]>>>,
    next_handle: AtomicU64,
}

impl PayloadTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Take ownership of a payload blob and hand back its handle.
    pub fn insert(&self, payload: Vec<u8>) -> PayloadHandle {
        let handle = PayloadHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().insert(handle.0, Arc::from(payload));
        handle
    }

    /// Run `f` over the payload bytes, if the handle is still live.
    pub fn with<R>(&self, handle: PayloadHandle, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let payload = self.entries.lock().get(&handle.0).cloned();
        payload.map(|bytes| f(&bytes))
    }

    /// Release the payload. Returns false if the handle was not live.
    pub fn release(&self, handle: PayloadHandle) -> bool {
        self.entries.lock().remove(&handle.0).is_some()
    }

    /// Number of live payloads.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PayloadTable {
    fn default() -> Self {
        Self::new()
    }
}
