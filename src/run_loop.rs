use crate::handler::ControlHandler;
use crate::manager::ControlManager;
use crate::status::{ServiceState, StatusReporter, NO_ERROR};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Lifecycle phases of the service run loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Registering,
    Running,
    StopRequested,
    Stopped,
}

/// Process-wide run flags.
///
/// `initialized` transitions false to true exactly once, when the bridge is
/// first started, and is never reset: the bridge cannot be re-armed within a
/// single process lifetime. `control_handle_valid` records that handler
/// registration with the OS succeeded.
#[derive(Debug, Default)]
pub struct RunState {
    pub(crate) initialized: AtomicBool,
    pub(crate) control_handle_valid: AtomicBool,
}

impl RunState {
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn control_handle_valid(&self) -> bool {
        self.control_handle_valid
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// The service's dedicated run-loop thread state.
///
/// The thread registers the control handler with the OS, reports the service
/// running, emits the bootstrap probe and then blocks for the service's
/// entire active phase until a stop request wakes it. Registration failure
/// short-circuits straight to `Stopped` with the registration error reported
/// as the exit status; `Running` is never reached.
pub struct ServiceRunLoop {
    state: Mutex<LoopState>,
    phase_cv: Condvar,
}

struct LoopState {
    phase: RunPhase,
    registration_error: Option<u32>,
}

impl ServiceRunLoop {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState {
                phase: RunPhase::NotStarted,
                registration_error: None,
            }),
            phase_cv: Condvar::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.state.lock().phase
    }

    /// The OS error code that aborted registration, if registration failed.
    pub fn registration_error(&self) -> Option<u32> {
        self.state.lock().registration_error
    }

    /// Block until the loop reaches `target`, or the timeout elapses.
    pub fn wait_for_phase(&self, target: RunPhase, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.phase != target {
            if self.phase_cv.wait_until(&mut state, deadline).timed_out() {
                return state.phase == target;
            }
        }
        true
    }

    /// Body of the dedicated run-loop thread.
    pub(crate) fn run(
        &self,
        manager: Arc<dyn ControlManager>,
        status: Arc<StatusReporter>,
        handler: Arc<ControlHandler>,
        run_state: Arc<RunState>,
        probe_on_ready: bool,
    ) {
        {
            // An early stop request must survive the phase advance.
            let mut state = self.state.lock();
            if state.phase == RunPhase::NotStarted {
                state.phase = RunPhase::Registering;
                self.phase_cv.notify_all();
            }
        }
        info!("registering control handler with the service control manager");

        if let Err(e) = manager.register_handler(Arc::clone(&handler)) {
            let code = e.os_code();
            error!("control handler registration failed: {}", e);
            self.state.lock().registration_error = Some(code);
            if let Err(report_err) = status.transition(ServiceState::Stopped, code, 0) {
                error!("failed to report terminal stopped status: {}", report_err);
            }
            self.set_phase(RunPhase::Stopped);
            return;
        }
        run_state
            .control_handle_valid
            .store(true, std::sync::atomic::Ordering::SeqCst);

        if let Err(e) = status.transition(ServiceState::Running, NO_ERROR, 0) {
            // The service keeps going on a rejected running report; only
            // registration failure is fatal here.
            error!("failed to report running status: {}", e);
        }

        if probe_on_ready {
            handler.emit_probe();
        }

        {
            let mut state = self.state.lock();
            // A stop may already have been requested during registration.
            if state.phase == RunPhase::Registering {
                state.phase = RunPhase::Running;
                self.phase_cv.notify_all();
                info!("service run loop active");
            }
        }

        let mut state = self.state.lock();
        while state.phase == RunPhase::Running {
            self.phase_cv.wait(&mut state);
        }
        state.phase = RunPhase::Stopped;
        self.phase_cv.notify_all();
        info!("service run loop ended");
    }

    /// Wake the blocked run-loop thread. Returns false if the loop is already
    /// terminal or a stop was already requested.
    pub(crate) fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        match state.phase {
            RunPhase::Stopped | RunPhase::StopRequested => false,
            _ => {
                state.phase = RunPhase::StopRequested;
                self.phase_cv.notify_all();
                true
            }
        }
    }

    fn set_phase(&self, phase: RunPhase) {
        let mut state = self.state.lock();
        state.phase = phase;
        self.phase_cv.notify_all();
    }
}

impl Default for ServiceRunLoop {
    fn default() -> Self {
        Self::new()
    }
}
