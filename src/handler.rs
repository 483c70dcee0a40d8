use crate::event::{ControlCode, ControlEvent, PayloadTable};
use crate::queue::ControlEventQueue;
use crate::signal::CrossThreadSignal;
use crate::status::{ServiceState, StatusReporter, NO_ERROR};
use crate::stop::StopFlag;
use std::sync::Arc;
use tracing::{debug, error};

/// Entry point invoked by the OS control manager on its callback thread.
///
/// Stop, Shutdown, Pause and Continue require their pending state to be
/// acknowledged synchronously, inside the callback, before the OS dispatcher
/// gets control back; everything is then queued for the consumer thread. The
/// handler itself never fails: a rejected status report is logged and the OS
/// still receives a success acknowledgment, because failing the callback has
/// undefined consequences for the OS dispatcher.
///
/// Pause/Continue stop at the pending report. The onward transition to
/// `Paused`/`Running` is the consumer's responsibility (via the bridge's
/// state override) once its workload has actually quiesced or resumed.
pub struct ControlHandler {
    status: Arc<StatusReporter>,
    queue: Arc<ControlEventQueue>,
    signal: Arc<CrossThreadSignal>,
    stop_flag: Arc<StopFlag>,
    payloads: Arc<PayloadTable>,
}

impl ControlHandler {
    pub fn new(
        status: Arc<StatusReporter>,
        queue: Arc<ControlEventQueue>,
        signal: Arc<CrossThreadSignal>,
        stop_flag: Arc<StopFlag>,
        payloads: Arc<PayloadTable>,
    ) -> Self {
        Self {
            status,
            queue,
            signal,
            stop_flag,
            payloads,
        }
    }

    /// Handle one control dispatch from the OS.
    ///
    /// Always returns the OS success code; transition failures go through the
    /// state machine's own error channel.
    pub fn handle(&self, raw_code: u32, event_type: u32, payload: Option<Vec<u8>>) -> u32 {
        let code = ControlCode::from_raw(raw_code);
        debug!("control dispatch: {} (raw {:#x})", code.name(), raw_code);

        match code {
            ControlCode::Stop | ControlCode::Shutdown => {
                self.acknowledge_pending(ServiceState::StopPending);
                self.stop_flag.raise();
            }
            ControlCode::Pause => self.acknowledge_pending(ServiceState::PausePending),
            ControlCode::Continue => self.acknowledge_pending(ServiceState::ContinuePending),
            _ => {}
        }

        self.enqueue(code, event_type, payload);
        NO_ERROR
    }

    /// Queue the bootstrap probe once the run loop has reported running.
    pub(crate) fn emit_probe(&self) {
        self.queue.push(ControlEvent::probe());
        self.signal.notify();
    }

    fn acknowledge_pending(&self, pending: ServiceState) {
        if let Err(e) = self.status.transition(pending, NO_ERROR, 0) {
            error!("failed to acknowledge {:?}: {}", pending, e);
        }
    }

    fn enqueue(&self, code: ControlCode, event_type: u32, payload: Option<Vec<u8>>) {
        let handle = payload.map(|blob| self.payloads.insert(blob));
        self.queue.push(ControlEvent::new(code, event_type, handle));
        self.signal.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CONTROL_DEVICE_EVENT, CONTROL_PAUSE, CONTROL_SHUTDOWN, CONTROL_STOP};
    use crate::manager::{ControlManager, MockControlManager};
    use std::time::Duration;

    struct Fixture {
        manager: Arc<MockControlManager>,
        handler: ControlHandler,
        queue: Arc<ControlEventQueue>,
        stop_flag: Arc<StopFlag>,
        signal: Arc<CrossThreadSignal>,
        payloads: Arc<PayloadTable>,
    }

    fn fixture() -> Fixture {
        let manager = Arc::new(MockControlManager::new());
        let status = Arc::new(StatusReporter::new(
            Arc::clone(&manager) as Arc<dyn ControlManager>,
            Duration::from_millis(10_000),
        ));
        let queue = Arc::new(ControlEventQueue::new());
        let signal = Arc::new(CrossThreadSignal::new());
        let stop_flag = Arc::new(StopFlag::new());
        let payloads = Arc::new(PayloadTable::new());

        let handler = ControlHandler::new(
            status,
            Arc::clone(&queue),
            Arc::clone(&signal),
            Arc::clone(&stop_flag),
            Arc::clone(&payloads),
        );

        Fixture {
            manager,
            handler,
            queue,
            stop_flag,
            signal,
            payloads,
        }
    }

    #[test]
    fn test_stop_acknowledges_pending_and_raises_flag() {
        let f = fixture();

        let rc = f.handler.handle(CONTROL_STOP, 0, None);

        assert_eq!(rc, NO_ERROR);
        assert_eq!(
            f.manager.last_reported().unwrap().state,
            ServiceState::StopPending
        );
        assert!(f.stop_flag.consume());

        let drained = f.queue.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].code, ControlCode::Stop);
    }

    #[test]
    fn test_shutdown_behaves_like_stop() {
        let f = fixture();

        f.handler.handle(CONTROL_SHUTDOWN, 0, None);

        assert_eq!(
            f.manager.last_reported().unwrap().state,
            ServiceState::StopPending
        );
        assert!(f.stop_flag.consume());
    }

    #[test]
    fn test_pause_reports_pause_pending_without_stop_flag() {
        let f = fixture();

        f.handler.handle(CONTROL_PAUSE, 0, None);

        assert_eq!(
            f.manager.last_reported().unwrap().state,
            ServiceState::PausePending
        );
        assert!(!f.stop_flag.consume());
    }

    #[test]
    fn test_device_event_enqueues_without_status_transition() {
        let f = fixture();

        f.handler.handle(CONTROL_DEVICE_EVENT, 0x8000, None);

        assert!(f.manager.reported().is_empty());
        let drained = f.queue.drain_all();
        assert_eq!(drained[0].code, ControlCode::DeviceEvent);
        assert_eq!(drained[0].event_type, 0x8000);
    }

    #[test]
    fn test_payload_is_owned_by_the_table_until_drained() {
        let f = fixture();

        f.handler.handle(CONTROL_DEVICE_EVENT, 1, Some(vec![0xAA, 0xBB]));

        let drained = f.queue.drain_all();
        let handle = drained[0].payload.expect("payload handle");
        assert_eq!(
            f.payloads.with(handle, |bytes| bytes.to_vec()),
            Some(vec![0xAA, 0xBB])
        );
    }

    #[test]
    fn test_handler_succeeds_even_when_report_is_rejected() {
        let f = fixture();
        f.manager.fail_reports_with(6);

        let rc = f.handler.handle(CONTROL_STOP, 0, None);

        // The callback must never fail; the event is still queued, the flag
        // still raised, the signal still notified.
        assert_eq!(rc, NO_ERROR);
        assert!(f.stop_flag.consume());
        assert_eq!(f.queue.len(), 1);
        assert_eq!(f.signal.wait(), crate::signal::Wake::Notified);
    }
}
