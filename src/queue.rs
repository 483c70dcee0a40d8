use crate::event::ControlEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Thread-safe FIFO of pending control events.
///
/// Written by the OS callback thread, drained by the consumer thread.
/// Unbounded: control events are rare and must never be dropped. The queue
/// has its own mutex, disjoint from the status mutex; neither is ever taken
/// while holding the other, so the callback thread and the consumer thread
/// cannot deadlock against each other.
pub struct ControlEventQueue {
    inner: Mutex<VecDeque<ControlEvent>>,
    stats: QueueStats,
}

/// Counters for queue observability.
#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    drained: AtomicU64,
}

/// Snapshot of queue statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub pushed: u64,
    pub drained: u64,
}

impl ControlEventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            stats: QueueStats::default(),
        }
    }

    /// Append an event to the tail. Never blocks beyond the enqueue critical
    /// section, never drops.
    pub fn push(&self, event: ControlEvent) {
        trace!("queueing control event: {}", event.description());
        self.inner.lock().push_back(event);
        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Swap out the full queue contents, in push order.
    ///
    /// The swap is atomic: events pushed while the drain result is being
    /// processed land in the next drain.
    pub fn drain_all(&self) -> Vec<ControlEvent> {
        let drained: Vec<ControlEvent> = {
            let mut queue = self.inner.lock();
            queue.drain(..).collect()
        };
        self.stats
            .drained
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            pushed: self.stats.pushed.load(Ordering::Relaxed),
            drained: self.stats.drained.load(Ordering::Relaxed),
        }
    }
}

impl Default for ControlEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ControlCode;
    use std::sync::Arc;

    fn event(code: ControlCode, event_type: u32) -> ControlEvent {
        ControlEvent::new(code, event_type, None)
    }

    #[test]
    fn test_drain_preserves_push_order() {
        let queue = ControlEventQueue::new();

        queue.push(event(ControlCode::Probe, 0));
        queue.push(event(ControlCode::Pause, 1));
        queue.push(event(ControlCode::Continue, 2));

        let drained = queue.drain_all();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].code, ControlCode::Probe);
        assert_eq!(drained[1].code, ControlCode::Pause);
        assert_eq!(drained[2].code, ControlCode::Continue);

        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_pushes_after_drain_land_in_next_drain() {
        let queue = ControlEventQueue::new();

        queue.push(event(ControlCode::Stop, 0));
        let first = queue.drain_all();
        queue.push(event(ControlCode::Shutdown, 0));
        let second = queue.drain_all();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].code, ControlCode::Shutdown);
        assert_eq!(queue.stats(), QueueStatsSnapshot { pushed: 2, drained: 2 });
    }

    #[test]
    fn test_concurrent_producers_no_loss_no_duplication() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 250;

        let queue = Arc::new(ControlEventQueue::new());

        crossbeam::thread::scope(|scope| {
            for producer in 0..PRODUCERS {
                let queue = Arc::clone(&queue);
                scope.spawn(move |_| {
                    for seq in 0..PER_PRODUCER {
                        // event_type encodes (producer, sequence) so the
                        // consumer can check per-producer ordering.
                        queue.push(event(ControlCode::Custom(0x80), producer << 16 | seq));
                    }
                });
            }

            let queue = Arc::clone(&queue);
            scope.spawn(move |_| {
                let mut seen: Vec<ControlEvent> = Vec::new();
                while seen.len() < (PRODUCERS * PER_PRODUCER) as usize {
                    seen.extend(queue.drain_all());
                    std::thread::yield_now();
                }

                assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);

                // Per-producer sequence numbers arrive strictly increasing.
                let mut next_seq = vec![0u32; PRODUCERS as usize];
                for event in &seen {
                    let producer = (event.event_type >> 16) as usize;
                    let seq = event.event_type & 0xFFFF;
                    assert_eq!(seq, next_seq[producer]);
                    next_seq[producer] += 1;
                }
            });
        })
        .unwrap();

        assert!(queue.is_empty());
        let stats = queue.stats();
        assert_eq!(stats.pushed, (PRODUCERS * PER_PRODUCER) as u64);
        assert_eq!(stats.drained, stats.pushed);
    }
}
