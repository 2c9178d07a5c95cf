//! Elemental Runtime
//!
//! Binds named behaviors to elements declared in markup and manages their
//! lifecycle:
//!
//! - **Runtime**: the shared document, event bus, storage and viewport state
//! - **Elementals**: behavior factories with options merging and teardown
//! - **Responsive controller**: pauses and resumes behaviors across breakpoints
//! - **Lifecycle manager**: idempotent scans of the declaration attribute
//!
//! # Example
//!
//! ```rust
//! use elemental_runtime::prelude::*;
//! use std::rc::Rc;
//!
//! let probe = Rc::new(WidthProbe::new(1280));
//! let runtime = Runtime::new(probe.clone());
//! let nav = {
//!     let mut doc = runtime.document_mut();
//!     let nav = doc.create_element("nav");
//!     doc.set_attribute(nav, "data-elemental", r#"[{"name":"megaMenu","isActiveOn":["desktop"]}]"#);
//!     let body = doc.body();
//!     doc.append_child(body, nav).unwrap();
//!     nav
//! };
//!
//! let registry: FactoryRegistry = [Elemental::new(
//!     "megaMenu",
//!     |ctx: &ElementalContext, _: Options| Ok(Some(ctx.clone().into())),
//!     None,
//! )
//! .unwrap()]
//! .into_iter()
//! .collect();
//!
//! let manager = ElementalManager::new(runtime.clone());
//! manager.init_document(&registry);
//! assert!(runtime.instances().get_by_id(nav, "megaMenu", "0").is_some());
//! ```

mod config;
mod declaration;
mod elemental;
mod error;
mod listener;
mod manager;
mod responsive;
mod runtime;
mod viewport;


pub use config::{Breakpoints, RuntimeConfig};
pub use declaration::{parse_declarations, serialize_declarations, Declaration, DeclarationState};
pub use elemental::{Elemental, ElementalBody, ElementalContext, Options};
pub use error::{ConfigError, DeclarationError, ElementalError, Result};
pub use listener::ResizeListener;
pub use manager::{ElementalManager, FactoryRegistry};
pub use responsive::{
    responsive_elemental, ResponsiveSettings, ResponsiveWrapper, WrapperState,
    RESPONSIVE_CONTROLLER,
};
pub use runtime::{Runtime, RuntimeStats};
pub use viewport::{
    ElementBounds, ScrollWindow, ViewportClassifier, ViewportProbe, WidthProbe, TRACKING_CLASS,
};

// Re-export the core crate for convenience
pub use elemental_core;

/// Prelude module - import everything commonly needed
pub mod prelude {
    pub use crate::config::{Breakpoints, RuntimeConfig};
    pub use crate::elemental::{Elemental, ElementalContext, Options};
    pub use crate::error::{ElementalError, Result};
    pub use crate::listener::ResizeListener;
    pub use crate::manager::{ElementalManager, FactoryRegistry};
    pub use crate::responsive::{responsive_elemental, ResponsiveWrapper, WrapperState};
    pub use crate::runtime::Runtime;
    pub use crate::viewport::{ScrollWindow, ViewportProbe, WidthProbe};

    // Core types
    pub use elemental_core::{
        event_names, Behavior, BehaviorError, Capabilities, ElementId, EventPayload,
        InstanceHandle, Subject, Viewport,
    };
}
