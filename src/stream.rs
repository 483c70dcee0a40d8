use crate::bridge::ServiceBridge;
use crate::error::{BridgeError, Result};
use crate::event::ControlCode;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::warn;

/// A control event as delivered to an event-loop consumer.
///
/// The payload bytes are copied out of the bridge's handle table before the
/// originating callback returns, so the message stays valid for as long as
/// the consumer keeps it.
#[derive(Debug, Clone)]
pub struct ControlMessage {
    pub code: ControlCode,
    pub event_type: u32,
    pub payload: Option<Vec<u8>>,
    pub received_at: SystemTime,
}

/// Start `bridge` and surface its control events on an async channel.
///
/// This replaces the callback form of [`ServiceBridge::start`] for hosts
/// whose consumer is an async event loop: events arrive on the returned
/// receiver in dispatch order, and the channel closes once the bridge stops
/// and its dispatcher exits. Must be the call that starts the bridge; a
/// bridge that is already running keeps its original callback and cannot be
/// re-wired.
pub fn control_events(
    bridge: &Arc<ServiceBridge>,
) -> Result<mpsc::UnboundedReceiver<ControlMessage>> {
    if bridge.is_started() {
        return Err(BridgeError::invalid_argument(
            "bridge is already started; control_events must perform the first start",
        ));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let callback_bridge = Arc::clone(bridge);
    bridge.start(move |event| {
        let payload = event
            .payload
            .and_then(|handle| callback_bridge.with_payload(handle, |bytes| bytes.to_vec()));
        let message = ControlMessage {
            code: event.code,
            event_type: event.event_type,
            payload,
            received_at: event.received_at,
        };
        if tx.send(message).is_err() {
            warn!("control event receiver dropped; event discarded");
        }
    })?;

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CONTROL_DEVICE_EVENT, CONTROL_STOP};
    use crate::manager::{ControlManager, MockControlManager};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_events_arrive_on_the_channel_in_order() {
        let manager = Arc::new(MockControlManager::new());
        let bridge = Arc::new(ServiceBridge::new(
            Arc::clone(&manager) as Arc<dyn ControlManager>
        ));

        let mut events = control_events(&bridge).unwrap();

        let probe = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(probe.code, ControlCode::Probe);

        manager
            .fire(CONTROL_DEVICE_EVENT, 3, Some(vec![1, 2, 3]))
            .unwrap();
        manager.fire(CONTROL_STOP, 0, None).unwrap();

        let device = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(device.code, ControlCode::DeviceEvent);
        assert_eq!(device.event_type, 3);
        assert_eq!(device.payload, Some(vec![1, 2, 3]));

        let stop = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(stop.code, ControlCode::Stop);
        assert!(bridge.is_stop_requested());
    }

    #[tokio::test]
    async fn test_channel_closes_after_request_stop() {
        let manager = Arc::new(MockControlManager::new());
        let bridge = Arc::new(ServiceBridge::new(
            Arc::clone(&manager) as Arc<dyn ControlManager>
        ));

        let mut events = control_events(&bridge).unwrap();
        let probe = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(probe.code, ControlCode::Probe);

        bridge.request_stop(0).unwrap();
        assert!(bridge.wait_until_stopped(WAIT));

        // The dispatcher exits and drops the sender; the stream ends.
        assert!(timeout(WAIT, events.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_an_already_started_bridge() {
        let manager = Arc::new(MockControlManager::new());
        let bridge = Arc::new(ServiceBridge::new(
            Arc::clone(&manager) as Arc<dyn ControlManager>
        ));

        bridge.start(|_| {}).unwrap();

        assert!(matches!(
            control_events(&bridge),
            Err(BridgeError::InvalidArgument { .. })
        ));
    }
}
