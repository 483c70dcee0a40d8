use crate::error::{BridgeError, Result};
use crate::manager::ControlManager;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Win32 service state values, bit-exact for control manager compatibility.
pub const SERVICE_STOPPED: u32 = 0x01;
pub const SERVICE_START_PENDING: u32 = 0x02;
pub const SERVICE_STOP_PENDING: u32 = 0x03;
pub const SERVICE_RUNNING: u32 = 0x04;
pub const SERVICE_CONTINUE_PENDING: u32 = 0x05;
pub const SERVICE_PAUSE_PENDING: u32 = 0x06;
pub const SERVICE_PAUSED: u32 = 0x07;

/// Exit code the OS interprets as "look at the service-specific code instead".
pub const ERROR_SERVICE_SPECIFIC_ERROR: u32 = 1066;
pub const NO_ERROR: u32 = 0;

/// Service lifecycle states as the OS control manager observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl ServiceState {
    /// Map a raw state value; the control manager accepts only these seven.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            SERVICE_STOPPED => Some(ServiceState::Stopped),
            SERVICE_START_PENDING => Some(ServiceState::StartPending),
            SERVICE_STOP_PENDING => Some(ServiceState::StopPending),
            SERVICE_RUNNING => Some(ServiceState::Running),
            SERVICE_CONTINUE_PENDING => Some(ServiceState::ContinuePending),
            SERVICE_PAUSE_PENDING => Some(ServiceState::PausePending),
            SERVICE_PAUSED => Some(ServiceState::Paused),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            ServiceState::Stopped => SERVICE_STOPPED,
            ServiceState::StartPending => SERVICE_START_PENDING,
            ServiceState::StopPending => SERVICE_STOP_PENDING,
            ServiceState::Running => SERVICE_RUNNING,
            ServiceState::ContinuePending => SERVICE_CONTINUE_PENDING,
            ServiceState::PausePending => SERVICE_PAUSE_PENDING,
            ServiceState::Paused => SERVICE_PAUSED,
        }
    }
}

/// Bitset of control codes the service tells the OS it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcceptedControls(u32);

impl AcceptedControls {
    pub const STOP: Self = Self(0x01);
    pub const PAUSE_CONTINUE: Self = Self(0x02);
    pub const SHUTDOWN: Self = Self(0x04);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AcceptedControls {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Snapshot of the service status as pushed to the OS control manager.
///
/// Invariant: `win32_exit_code == ERROR_SERVICE_SPECIFIC_ERROR` exactly when
/// `service_exit_code != 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepted_controls: AcceptedControls,
    pub win32_exit_code: u32,
    pub service_exit_code: u32,
    pub checkpoint: u32,
    pub wait_hint: Duration,
}

/// The authoritative service status state machine.
///
/// Owns the current status exclusively. Transitions build a snapshot, push it
/// through the [`ControlManager`] seam, and commit only after a successful
/// report; a rejected report leaves the in-memory state at its prior value so
/// state and report never diverge. One mutex guards build/report/commit, so a
/// concurrent [`query`](Self::query) observes either the pre- or the
/// post-transition status, never a torn mix.
pub struct StatusReporter {
    manager: Arc<dyn ControlManager>,
    inner: Mutex<ReporterInner>,
    wait_hint: Duration,
}

struct ReporterInner {
    accepted: AcceptedControls,
    current: ServiceStatus,
}

impl StatusReporter {
    /// Create a reporter in the `Stopped` state with an empty caller-supplied
    /// accepted set.
    pub fn new(manager: Arc<dyn ControlManager>, wait_hint: Duration) -> Self {
        let initial = build_snapshot(
            ServiceState::Stopped,
            AcceptedControls::default(),
            NO_ERROR,
            0,
            wait_hint,
        );
        Self {
            manager,
            inner: Mutex::new(ReporterInner {
                accepted: AcceptedControls::default(),
                current: initial,
            }),
            wait_hint,
        }
    }

    /// Report `new_state` to the OS and commit it as current.
    ///
    /// A nonzero `service_code` reports `ERROR_SERVICE_SPECIFIC_ERROR` as the
    /// Win32 exit code with the service code alongside; otherwise `win32_code`
    /// is reported verbatim. Reporting failure is not retried: the error is
    /// returned and the in-memory status stays at its prior value.
    pub fn transition(
        &self,
        new_state: ServiceState,
        win32_code: u32,
        service_code: u32,
    ) -> Result<ServiceStatus> {
        let mut inner = self.inner.lock();
        let snapshot = build_snapshot(
            new_state,
            inner.accepted,
            win32_code,
            service_code,
            self.wait_hint,
        );

        self.manager.report_status(&snapshot).map_err(|e| {
            warn!(
                "status report for {:?} rejected, keeping {:?}: {}",
                new_state, inner.current.state, e
            );
            e
        })?;

        debug!("service status committed: {:?}", new_state);
        inner.current = snapshot.clone();
        Ok(snapshot)
    }

    /// Update the caller-supplied accepted set and immediately re-report
    /// `Running` so the OS observes the new capability set.
    ///
    /// Stop and Shutdown are always accepted regardless of `mask`. If the
    /// report is rejected the accepted set rolls back along with the state.
    pub fn set_accepted_controls(&self, mask: u32) -> Result<ServiceStatus> {
        let mut inner = self.inner.lock();
        let previous = inner.accepted;
        inner.accepted = AcceptedControls::from_bits(mask);

        let snapshot = build_snapshot(
            ServiceState::Running,
            inner.accepted,
            NO_ERROR,
            0,
            self.wait_hint,
        );

        match self.manager.report_status(&snapshot) {
            Ok(()) => {
                debug!(
                    "accepted controls updated to {:#x}",
                    snapshot.accepted_controls.bits()
                );
                inner.current = snapshot.clone();
                Ok(snapshot)
            }
            Err(e) => {
                warn!("accepted-controls report rejected, rolling back: {}", e);
                inner.accepted = previous;
                Err(e)
            }
        }
    }

    /// Force a raw state report, bypassing the normal transition triggers.
    ///
    /// Backs the host-facing state override; the control manager only accepts
    /// the seven canonical states, so anything else is rejected here without
    /// touching the current status.
    pub fn force_state(&self, raw: u32) -> Result<ServiceStatus> {
        let state = ServiceState::from_raw(raw).ok_or_else(|| {
            BridgeError::invalid_argument(format!("unknown service state {}", raw))
        })?;
        self.transition(state, NO_ERROR, 0)
    }

    /// The last successfully committed status.
    pub fn query(&self) -> ServiceStatus {
        self.inner.lock().current.clone()
    }

    /// Raw value of the last committed state.
    pub fn current_raw(&self) -> u32 {
        self.inner.lock().current.state.as_raw()
    }
}

fn build_snapshot(
    state: ServiceState,
    accepted: AcceptedControls,
    win32_code: u32,
    service_code: u32,
    wait_hint: Duration,
) -> ServiceStatus {
    ServiceStatus {
        state,
        accepted_controls: accepted | AcceptedControls::STOP | AcceptedControls::SHUTDOWN,
        win32_exit_code: if service_code != 0 {
            ERROR_SERVICE_SPECIFIC_ERROR
        } else {
            win32_code
        },
        service_exit_code: service_code,
        checkpoint: 0,
        wait_hint,
    }
}
