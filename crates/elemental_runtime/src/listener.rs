//! Debounced resize handling
//!
//! Window resizes arrive in bursts. [`ResizeListener`] collapses a burst into
//! one viewport recomputation once the window has been quiet for the
//! configured interval. The host drives it with explicit timestamps:
//! [`notify_resize`](ResizeListener::notify_resize) on every resize event and
//! [`poll`](ResizeListener::poll) from its frame or timer loop.

use elemental_core::Viewport;
use std::cell::Cell;
use std::time::{Duration, Instant};

use crate::runtime::Runtime;

/// Trailing-edge debounce in front of [`Runtime::calculate_viewport`]
#[derive(Debug)]
pub struct ResizeListener {
    runtime: Runtime,
    debounce: Duration,
    deadline: Cell<Option<Instant>>,
}

impl ResizeListener {
    /// Listener using the runtime's configured debounce interval
    pub fn new(runtime: Runtime) -> Self {
        let debounce = runtime.config().resize_debounce();
        Self::with_debounce(runtime, debounce)
    }

    pub fn with_debounce(runtime: Runtime, debounce: Duration) -> Self {
        Self {
            runtime,
            debounce,
            deadline: Cell::new(None),
        }
    }

    /// Record a resize; supersedes any pending recomputation
    pub fn notify_resize(&self, now: Instant) {
        self.deadline.set(Some(now + self.debounce));
    }

    /// Whether a recomputation is scheduled
    pub fn is_pending(&self) -> bool {
        self.deadline.get().is_some()
    }

    /// Recompute the viewport if the quiet period has elapsed
    ///
    /// Returns the freshly computed viewport, or `None` when nothing was due.
    pub fn poll(&self, now: Instant) -> Option<Viewport> {
        let deadline = self.deadline.get()?;
        if now < deadline {
            return None;
        }

        self.deadline.set(None);
        Some(self.runtime.calculate_viewport())
    }

    /// Drop a pending recomputation
    pub fn cancel(&self) {
        self.deadline.set(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::WidthProbe;
    use std::rc::Rc;

    #[test]
    fn test_burst_collapses_to_one_computation() {
        let probe = Rc::new(WidthProbe::new(320));
        let runtime = Runtime::new(probe.clone());
        assert_eq!(runtime.viewport(), Viewport::Mobile);

        let listener = ResizeListener::new(runtime.clone());
        let start = Instant::now();

        probe.set_width(900);
        listener.notify_resize(start);
        listener.notify_resize(start + Duration::from_millis(150));
        // First deadline passed, but the second notification superseded it
        assert_eq!(listener.poll(start + Duration::from_millis(250)), None);

        assert_eq!(
            listener.poll(start + Duration::from_millis(350)),
            Some(Viewport::Tablet)
        );
        assert!(!listener.is_pending());
        assert_eq!(listener.poll(start + Duration::from_secs(1)), None);
        assert_eq!(runtime.classifier().computations(), 2);
    }

    #[test]
    fn test_cancel() {
        let runtime = Runtime::new(Rc::new(WidthProbe::new(320)));
        let listener = ResizeListener::with_debounce(runtime.clone(), Duration::ZERO);
        let now = Instant::now();

        listener.notify_resize(now);
        listener.cancel();
        assert_eq!(listener.poll(now), None);
        assert_eq!(runtime.classifier().computations(), 0);
    }
}
