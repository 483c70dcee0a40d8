use super::ControlManager;
use crate::error::{BridgeError, Result};
use crate::handler::ControlHandler;
use crate::status::ServiceStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// In-process stand-in for the OS service control manager.
///
/// Records every reported status in order, holds the registered control
/// handler so a test or host can fire control codes at it the way the OS
/// callback thread would, and injects registration/report failures for
/// error-path coverage.
pub struct MockControlManager {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    handler: Option<Arc<ControlHandler>>,
    reported: Vec<ServiceStatus>,
    registrations: u32,
    registration_failure: Option<u32>,
    report_failure: Option<u32>,
}

impl MockControlManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Make the next `register_handler` call fail with the given OS code.
    pub fn fail_registration_with(&self, code: u32) {
        self.state.lock().registration_failure = Some(code);
    }

    /// Make every `report_status` call fail with the given OS code.
    pub fn fail_reports_with(&self, code: u32) {
        self.state.lock().report_failure = Some(code);
    }

    pub fn clear_report_failure(&self) {
        self.state.lock().report_failure = None;
    }

    /// Every status reported so far, in report order.
    pub fn reported(&self) -> Vec<ServiceStatus> {
        self.state.lock().reported.clone()
    }

    pub fn last_reported(&self) -> Option<ServiceStatus> {
        self.state.lock().reported.last().cloned()
    }

    /// How many times a handler was registered.
    pub fn registration_count(&self) -> u32 {
        self.state.lock().registrations
    }

    /// The handler registered by the run loop, if registration happened.
    pub fn handler(&self) -> Option<Arc<ControlHandler>> {
        self.state.lock().handler.clone()
    }

    /// Deliver a control code to the registered handler, as the OS callback
    /// thread would. Returns the handler's acknowledgment code.
    pub fn fire(&self, raw_code: u32, event_type: u32, payload: Option<Vec<u8>>) -> Result<u32> {
        // Clone the handler out so the mock lock is not held across the
        // handler call, which reports status back through this mock.
        let handler = self.handler().ok_or_else(|| {
            BridgeError::invalid_argument("no control handler registered")
        })?;
        Ok(handler.handle(raw_code, event_type, payload))
    }
}

impl Default for MockControlManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlManager for MockControlManager {
    fn register_handler(&self, handler: Arc<ControlHandler>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(code) = state.registration_failure.take() {
            return Err(BridgeError::Registration { code });
        }
        state.registrations += 1;
        state.handler = Some(handler);
        debug!("control handler registered with mock manager");
        Ok(())
    }

    fn report_status(&self, status: &ServiceStatus) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(code) = state.report_failure {
            return Err(BridgeError::Report {
                state: status.state,
                code,
            });
        }
        state.reported.push(status.clone());
        Ok(())
    }
}
