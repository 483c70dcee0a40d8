pub mod bridge;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod logging;
pub mod manager;
pub mod queue;
pub mod run_loop;
pub mod signal;
pub mod status;
pub mod stop;
pub mod stream;

pub use bridge::ServiceBridge;
pub use config::{BridgeConfig, LoggingConfig, ServiceConfig};
pub use error::{BridgeError, Result};
pub use event::{ControlCode, ControlEvent, PayloadHandle, PayloadTable};
pub use handler::ControlHandler;
pub use manager::{ControlManager, MockControlManager};
pub use queue::{ControlEventQueue, QueueStatsSnapshot};
pub use run_loop::{RunPhase, RunState, ServiceRunLoop};
pub use signal::{CrossThreadSignal, Wake};
pub use status::{AcceptedControls, ServiceState, ServiceStatus, StatusReporter};
pub use stop::StopFlag;
pub use stream::{control_events, ControlMessage};
