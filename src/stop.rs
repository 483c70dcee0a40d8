use std::sync::atomic::{AtomicBool, Ordering};

/// Level-triggered pending-stop flag.
///
/// Raised by the control handler when Stop or Shutdown arrives; the
/// consumer's poll is destructive and collapses any number of raises into a
/// single `true` read. Polling twice without an intervening stop request
/// therefore yields `false` the second time.
#[derive(Debug, Default)]
pub struct StopFlag(AtomicBool);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a stop as requested. Raising an already-raised flag is a no-op;
    /// the flag is a level, not a counter.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Destructive poll: returns whether a stop was requested since the last
    /// poll, and resets the flag.
    pub fn consume(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unraised_flag_reads_false() {
        let flag = StopFlag::new();
        assert!(!flag.consume());
    }

    #[test]
    fn test_consume_resets_flag() {
        let flag = StopFlag::new();

        flag.raise();
        assert!(flag.consume());
        assert!(!flag.consume());
    }

    #[test]
    fn test_multiple_raises_collapse_into_one_read() {
        let flag = StopFlag::new();

        flag.raise();
        flag.raise();
        flag.raise();

        assert!(flag.consume());
        assert!(!flag.consume());
    }
}
