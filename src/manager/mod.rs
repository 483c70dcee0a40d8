mod mock;

pub use mock::MockControlManager;

use crate::error::Result;
use crate::handler::ControlHandler;
use crate::status::ServiceStatus;
use std::sync::Arc;

/// Interface to the OS service control manager.
///
/// The bridge only ever performs two operations against the OS: registering
/// the control handler that the OS invokes on its callback thread, and
/// pushing status snapshots. Both are assumed cheap and are never retried; a
/// failure either aborts the run loop (registration) or is surfaced to the
/// transition caller (report). Platform bindings implement this trait; tests
/// and in-process hosts use [`MockControlManager`].
pub trait ControlManager: Send + Sync {
    /// Register the control handler the OS will invoke for this service.
    fn register_handler(&self, handler: Arc<ControlHandler>) -> Result<()>;

    /// Push a status snapshot to the OS.
    fn report_status(&self, status: &ServiceStatus) -> Result<()>;
}
