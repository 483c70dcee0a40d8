use crate::config::ServiceConfig;
use crate::error::Result;
use crate::event::{ControlEvent, PayloadHandle, PayloadTable};
use crate::handler::ControlHandler;
use crate::manager::ControlManager;
use crate::queue::ControlEventQueue;
use crate::run_loop::{RunPhase, RunState, ServiceRunLoop};
use crate::signal::{CrossThreadSignal, Wake};
use crate::status::{ServiceState, ServiceStatus, StatusReporter, NO_ERROR};
use crate::stop::StopFlag;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// The one-per-process service bridge.
///
/// Composes the status state machine, the control event queue, the wake
/// signal, the stop flag and the payload table behind shared ownership, and
/// runs the two dedicated threads: the run loop (registers with the OS and
/// blocks for the service's active lifetime) and the dispatcher (drains the
/// queue and invokes the consumer callback once per event, in push order).
///
/// The OS service API is inherently single-instance per process; this type
/// makes that instance explicit instead of hiding it in globals.
pub struct ServiceBridge {
    config: ServiceConfig,
    manager: Arc<dyn ControlManager>,
    status: Arc<StatusReporter>,
    queue: Arc<ControlEventQueue>,
    signal: Arc<CrossThreadSignal>,
    stop_flag: Arc<StopFlag>,
    payloads: Arc<PayloadTable>,
    handler: Arc<ControlHandler>,
    run_loop: Arc<ServiceRunLoop>,
    run_state: Arc<RunState>,
    stop_issued: AtomicBool,
    threads: Mutex<BridgeThreads>,
}

#[derive(Default)]
struct BridgeThreads {
    run_loop: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ServiceBridge {
    pub fn new(manager: Arc<dyn ControlManager>) -> Self {
        Self::with_config(manager, ServiceConfig::default())
    }

    pub fn with_config(manager: Arc<dyn ControlManager>, config: ServiceConfig) -> Self {
        let status = Arc::new(StatusReporter::new(
            Arc::clone(&manager),
            Duration::from_millis(config.wait_hint_ms),
        ));
        let queue = Arc::new(ControlEventQueue::new());
        let signal = Arc::new(CrossThreadSignal::new());
        let stop_flag = Arc::new(StopFlag::new());
        let payloads = Arc::new(PayloadTable::new());
        let handler = Arc::new(ControlHandler::new(
            Arc::clone(&status),
            Arc::clone(&queue),
            Arc::clone(&signal),
            Arc::clone(&stop_flag),
            Arc::clone(&payloads),
        ));

        Self {
            config,
            manager,
            status,
            queue,
            signal,
            stop_flag,
            payloads,
            handler,
            run_loop: Arc::new(ServiceRunLoop::new()),
            run_state: Arc::new(RunState::default()),
            stop_issued: AtomicBool::new(false),
            threads: Mutex::new(BridgeThreads::default()),
        }
    }

    /// Start the bridge: spawn the run-loop thread (handler registration,
    /// running report, probe) and the dispatcher thread that feeds
    /// `on_control_event` once per drained event, in order.
    ///
    /// Returns immediately. Idempotent after the first call: a second start
    /// neither spawns threads nor registers the handler again, and a stopped
    /// bridge can never be re-armed.
    pub fn start<F>(&self, on_control_event: F) -> Result<()>
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        if self.run_state.initialized.swap(true, Ordering::SeqCst) {
            debug!("bridge already started; ignoring start");
            return Ok(());
        }
        info!("starting service bridge");

        if let Err(e) = self.spawn_threads(on_control_event) {
            self.run_state.initialized.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    fn spawn_threads<F>(&self, on_control_event: F) -> Result<()>
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        let run_loop_handle = {
            let run_loop = Arc::clone(&self.run_loop);
            let manager = Arc::clone(&self.manager);
            let status = Arc::clone(&self.status);
            let handler = Arc::clone(&self.handler);
            let run_state = Arc::clone(&self.run_state);
            let probe = self.config.probe_on_ready;
            thread::Builder::new()
                .name(self.config.run_loop_thread_name.clone())
                .spawn(move || run_loop.run(manager, status, handler, run_state, probe))?
        };

        let dispatcher_handle = {
            let queue = Arc::clone(&self.queue);
            let signal = Arc::clone(&self.signal);
            let payloads = Arc::clone(&self.payloads);
            thread::Builder::new()
                .name(self.config.dispatch_thread_name.clone())
                .spawn(move || loop {
                    // Wakes coalesce, so every wake drains the whole queue;
                    // on close, one final drain picks up anything signalled
                    // before the close.
                    let wake = signal.wait();
                    dispatch_batch(&queue, &payloads, &on_control_event);
                    if wake == Wake::Closed {
                        debug!("dispatch loop closed");
                        break;
                    }
                })?
        };

        let mut threads = self.threads.lock();
        threads.run_loop = Some(run_loop_handle);
        threads.dispatcher = Some(dispatcher_handle);
        Ok(())
    }

    /// Whether `start` has ever been called on this bridge.
    pub fn is_started(&self) -> bool {
        self.run_state.is_initialized()
    }

    /// Destructive poll of the pending-stop flag.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.consume()
    }

    /// End the service's active phase.
    ///
    /// Reports `StopPending`, wakes the run-loop thread, reports the terminal
    /// `Stopped` status carrying `exit_code` (nonzero values are reported as
    /// a service-specific error), and closes the wake signal so the
    /// dispatcher drains once more and exits. A no-op before `start` and
    /// after a stop has already been issued.
    pub fn request_stop(&self, exit_code: u32) -> Result<()> {
        if !self.run_state.is_initialized() {
            debug!("request_stop before start; nothing to do");
            return Ok(());
        }
        if self.stop_issued.swap(true, Ordering::SeqCst) {
            debug!("stop already issued");
            return Ok(());
        }

        info!("stop requested with exit code {}", exit_code);
        if let Err(e) = self.perform_stop(exit_code) {
            // Leave the operation retryable: a rejected report has not
            // changed the committed state.
            self.stop_issued.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    fn perform_stop(&self, exit_code: u32) -> Result<()> {
        self.status
            .transition(ServiceState::StopPending, NO_ERROR, 0)?;
        self.run_loop.request_stop();
        self.status
            .transition(ServiceState::Stopped, NO_ERROR, exit_code)?;
        self.signal.close();
        Ok(())
    }

    /// Directly report a raw service state, bypassing the normal transition
    /// triggers. Intended for host-driven states such as completing a
    /// pause/continue that the control handler left pending.
    pub fn set_state(&self, raw: u32) -> Result<ServiceStatus> {
        self.status.force_state(raw)
    }

    /// Raw value of the current service state.
    pub fn get_state(&self) -> u32 {
        self.status.current_raw()
    }

    /// Update the control codes the OS is told this service accepts, beyond
    /// the always-accepted Stop/Shutdown.
    pub fn set_accepted_controls(&self, mask: u32) -> Result<ServiceStatus> {
        self.status.set_accepted_controls(mask)
    }

    /// Full snapshot of the last committed service status.
    pub fn query_status(&self) -> ServiceStatus {
        self.status.query()
    }

    /// Access an event payload during the consumer callback. The payload is
    /// released when that callback returns; afterwards this yields `None`.
    pub fn with_payload<R>(&self, handle: PayloadHandle, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.payloads.with(handle, f)
    }

    /// Current run-loop phase.
    pub fn phase(&self) -> RunPhase {
        self.run_loop.phase()
    }

    /// OS error code that aborted handler registration, if it failed.
    pub fn registration_error(&self) -> Option<u32> {
        self.run_loop.registration_error()
    }

    /// Block until the run loop reaches its terminal phase.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        self.run_loop.wait_for_phase(RunPhase::Stopped, timeout)
    }

    /// Join the bridge threads. Must not be called from inside the consumer
    /// callback, which runs on the dispatcher thread being joined.
    pub fn join(&self) {
        let (run_loop, dispatcher) = {
            let mut threads = self.threads.lock();
            (threads.run_loop.take(), threads.dispatcher.take())
        };
        if let Some(handle) = run_loop {
            let _ = handle.join();
        }
        if let Some(handle) = dispatcher {
            let _ = handle.join();
        }
    }
}

fn dispatch_batch<F>(queue: &ControlEventQueue, payloads: &PayloadTable, on_control_event: &F)
where
    F: Fn(&ControlEvent),
{
    for event in queue.drain_all() {
        debug!("dispatching control event: {}", event.description());
        on_control_event(&event);
        if let Some(handle) = event.payload {
            payloads.release(handle);
        }
    }
}
