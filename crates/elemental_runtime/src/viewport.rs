//! Viewport classification
//!
//! The current tier is found by rendering hidden marker elements, one per
//! tier, and asking a [`ViewportProbe`] which of them would be visible. This
//! mirrors how a stylesheet shows `responsive-tracking--visible-on-<tier>`
//! only inside the matching media query.
//!
//! The result is memoized. Recomputing it (typically from the debounced
//! [`ResizeListener`](crate::ResizeListener)) publishes
//! [`RESPONSIVE_CHANGED`](elemental_core::event_names::RESPONSIVE_CHANGED) when
//! the tier differs from the memoized one.

use elemental_core::events::event_names;
use elemental_core::{Document, ElementId, EventBus, EventPayload, Subject, Viewport};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::config::Breakpoints;

/// Class of the container holding the tier markers
pub const TRACKING_CLASS: &str = "responsive-tracking";

/// Tiers probed in order; the first marker that renders wins
const PROBE_ORDER: [Viewport; 3] = [Viewport::LargeDesktop, Viewport::Desktop, Viewport::Tablet];

/// Reports whether a marker element would render with a nonzero size
pub trait ViewportProbe {
    fn renders(&self, document: &Document, marker: ElementId) -> bool;

    /// Laid-out vertical bounds of an element, if it has any
    fn bounds(&self, _document: &Document, _element: ElementId) -> Option<ElementBounds> {
        None
    }
}

/// Vertical placement of an element in page coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBounds {
    pub top: f64,
    pub height: f64,
}

/// The vertical slice of the page currently scrolled into view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollWindow {
    pub scroll_top: f64,
    pub height: f64,
}

impl ScrollWindow {
    /// Whether an element with `bounds` overlaps the window
    ///
    /// An element without bounds never does. Touching edges count as overlap.
    pub fn has_offset(&self, bounds: Option<ElementBounds>) -> bool {
        let Some(bounds) = bounds else {
            return false;
        };
        bounds.top + bounds.height >= self.scroll_top
            && bounds.top <= self.scroll_top + self.height
    }
}

/// Probe driven by a host-supplied viewport width
///
/// A marker renders when it is attached to the document and its tier class
/// matches the tier of the current width.
#[derive(Debug)]
pub struct WidthProbe {
    width: Cell<u32>,
    breakpoints: Breakpoints,
    bounds: RefCell<FxHashMap<ElementId, ElementBounds>>,
}

impl WidthProbe {
    pub fn new(width: u32) -> Self {
        Self::with_breakpoints(width, Breakpoints::default())
    }

    pub fn with_breakpoints(width: u32, breakpoints: Breakpoints) -> Self {
        Self {
            width: Cell::new(width),
            breakpoints,
            bounds: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width.get()
    }

    /// Update the width, e.g. from a window resize
    pub fn set_width(&self, width: u32) {
        self.width.set(width);
    }

    /// Record the host layout of an element
    pub fn set_bounds(&self, element: ElementId, bounds: ElementBounds) {
        self.bounds.borrow_mut().insert(element, bounds);
    }
}

impl ViewportProbe for WidthProbe {
    fn renders(&self, document: &Document, marker: ElementId) -> bool {
        if !document.is_connected(marker) {
            return false;
        }
        let visible = self.breakpoints.classify(self.width.get()).marker_class();
        document.has_class(marker, &visible)
    }

    fn bounds(&self, document: &Document, element: ElementId) -> Option<ElementBounds> {
        if !document.is_connected(element) {
            return None;
        }
        self.bounds.borrow().get(&element).copied()
    }
}

/// Memoizing viewport classifier
pub struct ViewportClassifier {
    probe: Rc<dyn ViewportProbe>,
    bus: Rc<EventBus>,
    current: Cell<Option<Viewport>>,
    computations: Cell<u64>,
}

impl fmt::Debug for ViewportClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewportClassifier")
            .field("current", &self.current.get())
            .field("computations", &self.computations.get())
            .finish()
    }
}

impl ViewportClassifier {
    pub fn new(probe: Rc<dyn ViewportProbe>, bus: Rc<EventBus>) -> Self {
        Self {
            probe,
            bus,
            current: Cell::new(None),
            computations: Cell::new(0),
        }
    }

    /// The memoized tier, computed on first access
    pub fn get_viewport(&self, document: &RefCell<Document>) -> Viewport {
        match self.current.get() {
            Some(viewport) => viewport,
            None => self.calculate_viewport(document),
        }
    }

    /// Probe the document and memoize the result
    ///
    /// Publishes a change event when a previous value existed and differs.
    /// The document must not be borrowed by the caller.
    pub fn calculate_viewport(&self, document: &RefCell<Document>) -> Viewport {
        let viewport = {
            let mut doc = document.borrow_mut();
            self.probe_markers(&mut doc)
        };
        self.computations.set(self.computations.get() + 1);

        let previous = self.current.replace(Some(viewport));
        match previous {
            Some(previous) if previous != viewport => {
                tracing::debug!("Viewport changed from {} to {}", previous, viewport);
                self.bus.publish(
                    &Subject::Global,
                    event_names::RESPONSIVE_CHANGED,
                    &EventPayload::ViewportChanged {
                        viewport,
                        previous_viewport: previous,
                    },
                );
            }
            _ => {}
        }
        viewport
    }

    fn probe_markers(&self, doc: &mut Document) -> Viewport {
        let tracking = doc.create_element("span");
        doc.add_class(tracking, TRACKING_CLASS);
        let body = doc.body();
        if let Err(err) = doc.append_child(body, tracking) {
            tracing::warn!("Could not attach viewport markers: {}", err);
        }

        let mut viewport = Viewport::Mobile;
        for tier in PROBE_ORDER {
            let marker = doc.create_element("span");
            doc.add_class(marker, &tier.marker_class());
            if doc.append_child(tracking, marker).is_err() {
                continue;
            }
            if self.probe.renders(doc, marker) {
                viewport = tier;
                break;
            }
        }

        if let Err(err) = doc.remove_element(tracking) {
            tracing::warn!("Could not remove viewport markers: {}", err);
        }
        viewport
    }

    /// Whether the element currently overlaps the scrolled window
    pub fn window_has_offset(
        &self,
        document: &Document,
        element: ElementId,
        window: ScrollWindow,
    ) -> bool {
        window.has_offset(self.probe.bounds(document, element))
    }

    /// Memoized tier without computing it
    pub fn current(&self) -> Option<Viewport> {
        self.current.get()
    }

    /// Number of probe runs so far
    pub fn computations(&self) -> u64 {
        self.computations.get()
    }

    /// Forget the memoized tier; the next access recomputes silently
    pub fn reset(&self) {
        self.current.set(None);
    }
}
