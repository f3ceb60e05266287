/// Keeps the viewport steady while older messages are prepended above it.
///
/// Capture the container height before the prepend; once the new content is
/// laid out, [`ScrollAnchor::restore`] yields the scroll offset that keeps the
/// previously visible first message in place.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    captured: Option<Captured>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Captured {
    scroll_height: f32,
    scroll_top: f32,
}

impl ScrollAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backfill triggers at the very top, and only when a load is allowed.
    pub fn should_backfill(scroll_top: f32, eligible: bool) -> bool {
        eligible && scroll_top <= 0.0
    }

    pub fn capture(&mut self, scroll_height: f32, scroll_top: f32) {
        self.captured = Some(Captured { scroll_height, scroll_top });
    }

    pub fn is_armed(&self) -> bool {
        self.captured.is_some()
    }

    /// Scroll offset for the grown container; consumes the capture.
    pub fn restore(&mut self, new_scroll_height: f32) -> Option<f32> {
        let captured = self.captured.take()?;
        let offset = new_scroll_height - captured.scroll_height + captured.scroll_top;
        Some(offset.max(0.0))
    }

    /// Drop the capture when the backfill failed or was discarded.
    pub fn cancel(&mut self) {
        self.captured = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_offsets_by_height_growth() {
        let mut anchor = ScrollAnchor::new();
        anchor.capture(1000.0, 0.0);
        assert_eq!(anchor.restore(1400.0), Some(400.0));
    }

    #[test]
    fn test_restore_keeps_captured_offset() {
        let mut anchor = ScrollAnchor::new();
        anchor.capture(800.0, 12.0);
        assert_eq!(anchor.restore(1000.0), Some(212.0));
    }

    #[test]
    fn test_restore_is_single_use() {
        let mut anchor = ScrollAnchor::new();
        anchor.capture(1000.0, 0.0);
        assert!(anchor.is_armed());
        anchor.restore(1200.0);
        assert!(!anchor.is_armed());
        assert_eq!(anchor.restore(1500.0), None);
    }

    #[test]
    fn test_cancel_disarms() {
        let mut anchor = ScrollAnchor::new();
        anchor.capture(1000.0, 0.0);
        anchor.cancel();
        assert_eq!(anchor.restore(1400.0), None);
    }

    #[test]
    fn test_backfill_trigger() {
        assert!(ScrollAnchor::should_backfill(0.0, true));
        assert!(!ScrollAnchor::should_backfill(0.0, false));
        assert!(!ScrollAnchor::should_backfill(35.0, true));
    }
}
