//! Clipboard change detection
//!
//! The clipboard exposes an opaque change counter that is cheap to read.
//! `ChangeLatch` remembers the last value seen so a poll tick can tell
//! whether anything happened without reading the payload.

use tracing::debug;

use super::ports::SystemClipboard;

#[derive(Debug, Default)]
pub struct ChangeLatch {
    last_change_count: Option<i64>,
}

impl ChangeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current counter as already seen
    pub fn latch(&mut self, clipboard: &dyn SystemClipboard) -> i64 {
        let current = clipboard.change_count();
        self.last_change_count = Some(current);
        current
    }

    /// Compare against the latched value. On a change the new value is
    /// latched *before* returning, so the change is reported exactly once.
    ///
    /// An unlatched detector latches and reports no change.
    pub fn check(&mut self, clipboard: &dyn SystemClipboard) -> Option<i64> {
        let current = clipboard.change_count();
        match self.last_change_count.replace(current) {
            Some(last) if last != current => {
                debug!(old_count = last, new_count = current, "Clipboard change detected");
                Some(current)
            }
            _ => None,
        }
    }

    /// Forget the latched value
    pub fn reset(&mut self) {
        self.last_change_count = None;
    }

    #[cfg(test)]
    pub fn last_count(&self) -> Option<i64> {
        self.last_change_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::test_support::FakeClipboard;

    #[test]
    fn test_unlatched_detector_reports_no_change() {
        let clipboard = FakeClipboard::default();
        clipboard.copy_text("before start");
        let mut latch = ChangeLatch::new();
        assert_eq!(latch.check(&clipboard), None);
        assert_eq!(latch.last_count(), Some(1));
    }

    #[test]
    fn test_change_reported_once() {
        let clipboard = FakeClipboard::default();
        let mut latch = ChangeLatch::new();
        latch.latch(&clipboard);

        clipboard.copy_text("a");
        assert_eq!(latch.check(&clipboard), Some(1));
        assert_eq!(latch.check(&clipboard), None);
    }

    #[test]
    fn test_relatch_swallows_pending_change() {
        let clipboard = FakeClipboard::default();
        let mut latch = ChangeLatch::new();
        latch.latch(&clipboard);

        clipboard.copy_text("self-written");
        latch.latch(&clipboard);
        assert_eq!(latch.check(&clipboard), None);
    }

    #[test]
    fn test_reset_clears_latch() {
        let clipboard = FakeClipboard::default();
        let mut latch = ChangeLatch::new();
        latch.latch(&clipboard);
        latch.reset();
        assert_eq!(latch.last_count(), None);
    }
}
