//! Behavior instances and their lifecycle capabilities
//!
//! A behavior is whatever a factory body hands back for an element. The
//! lifecycle manager only cares about three optional capabilities: pausing,
//! resuming and destroying. They are declared once through
//! [`Behavior::capabilities`] and captured when the instance is registered,
//! so callers check a flag instead of probing the object.
//!
//! ```rust
//! use elemental_core::behavior::{Behavior, Capabilities, InstanceHandle};
//! use elemental_core::error::Result;
//! use std::cell::Cell;
//!
//! #[derive(Default)]
//! struct Carousel {
//!     running: Cell<bool>,
//! }
//!
//! impl Behavior for Carousel {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::PAUSE | Capabilities::RESUME
//!     }
//!
//!     fn pause(&self) -> Result<()> {
//!         self.running.set(false);
//!         Ok(())
//!     }
//!
//!     fn resume(&self) -> Result<()> {
//!         self.running.set(true);
//!         Ok(())
//!     }
//! }
//!
//! let instance = InstanceHandle::new("carousel", Carousel::default());
//! assert!(instance.can(Capabilities::PAUSE));
//! assert!(instance.destroy().is_err());
//! ```

use bitflags::bitflags;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{BehaviorError, Result};

bitflags! {
    /// Lifecycle operations a behavior supports
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const PAUSE = 1 << 0;
        const RESUME = 1 << 1;
        const DESTROY = 1 << 2;

        const PAUSABLE = Self::PAUSE.bits() | Self::RESUME.bits();
    }
}

/// A behavior bound to an element
///
/// Every lifecycle method defaults to [`BehaviorError::Unsupported`]; a
/// behavior opts in by overriding the method and reporting the matching flag
/// from [`Behavior::capabilities`].
pub trait Behavior: 'static {
    /// Capabilities this behavior implements
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn pause(&self) -> Result<()> {
        Err(BehaviorError::Unsupported("pause"))
    }

    fn resume(&self) -> Result<()> {
        Err(BehaviorError::Unsupported("resume"))
    }

    fn destroy(&self) -> Result<()> {
        Err(BehaviorError::Unsupported("destroy"))
    }
}

/// Behavior with no capabilities, registered when a body returns nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyBehavior;

impl Behavior for EmptyBehavior {}

/// Shared, type-erased reference to a behavior that can still be downcast
#[derive(Clone)]
pub struct BehaviorRef {
    behavior: Rc<dyn Behavior>,
    any: Rc<dyn Any>,
}

impl BehaviorRef {
    pub fn new<B: Behavior>(behavior: B) -> Self {
        Self::from_rc(Rc::new(behavior))
    }

    /// Wrap an already shared behavior, keeping the caller's `Rc` alive
    pub fn from_rc<B: Behavior>(behavior: Rc<B>) -> Self {
        Self {
            behavior: behavior.clone(),
            any: behavior,
        }
    }

    pub fn behavior(&self) -> &Rc<dyn Behavior> {
        &self.behavior
    }

    /// Recover the concrete behavior type
    pub fn downcast<B: Behavior>(&self) -> Option<Rc<B>> {
        self.any.clone().downcast::<B>().ok()
    }

    fn ptr_eq(&self, other: &BehaviorRef) -> bool {
        Rc::ptr_eq(&self.any, &other.any)
    }
}

impl<B: Behavior> From<B> for BehaviorRef {
    fn from(behavior: B) -> Self {
        BehaviorRef::new(behavior)
    }
}

impl<B: Behavior> From<Rc<B>> for BehaviorRef {
    fn from(behavior: Rc<B>) -> Self {
        BehaviorRef::from_rc(behavior)
    }
}

impl fmt::Debug for BehaviorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRef")
            .field("capabilities", &self.behavior.capabilities())
            .finish()
    }
}

struct InstanceInner {
    name: String,
    behavior: BehaviorRef,
    capabilities: Capabilities,
    id: RefCell<Option<String>>,
}

/// A registered behavior instance (cheap to clone, compared by identity)
#[derive(Clone)]
pub struct InstanceHandle {
    inner: Rc<InstanceInner>,
}

impl InstanceHandle {
    /// Register a behavior under a name, capturing its capabilities once
    pub fn new(name: impl Into<String>, behavior: impl Into<BehaviorRef>) -> Self {
        let behavior = behavior.into();
        let capabilities = behavior.behavior().capabilities();
        Self {
            inner: Rc::new(InstanceInner {
                name: name.into(),
                behavior,
                capabilities,
                id: RefCell::new(None),
            }),
        }
    }

    /// An instance with no capabilities
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, EmptyBehavior)
    }

    /// Name of the behavior that produced this instance
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identifier assigned by the lifecycle manager
    pub fn id(&self) -> Option<String> {
        self.inner.id.borrow().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        *self.inner.id.borrow_mut() = Some(id.into());
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Whether every capability in `capability` was declared
    pub fn can(&self, capability: Capabilities) -> bool {
        self.inner.capabilities.contains(capability)
    }

    pub fn pause(&self) -> Result<()> {
        self.call(Capabilities::PAUSE, "pause", |b| b.pause())
    }

    pub fn resume(&self) -> Result<()> {
        self.call(Capabilities::RESUME, "resume", |b| b.resume())
    }

    pub fn destroy(&self) -> Result<()> {
        self.call(Capabilities::DESTROY, "destroy", |b| b.destroy())
    }

    pub fn behavior(&self) -> &BehaviorRef {
        &self.inner.behavior
    }

    /// Recover the concrete behavior type
    pub fn downcast<B: Behavior>(&self) -> Option<Rc<B>> {
        self.inner.behavior.downcast()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &InstanceHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether both handles wrap the same behavior object
    pub fn same_behavior(&self, other: &InstanceHandle) -> bool {
        self.inner.behavior.ptr_eq(&other.inner.behavior)
    }

    fn call(
        &self,
        capability: Capabilities,
        operation: &'static str,
        f: impl FnOnce(&dyn Behavior) -> Result<()>,
    ) -> Result<()> {
        if !self.can(capability) {
            return Err(BehaviorError::Unsupported(operation));
        }
        // Clone out so the behavior may freely re-enter through this handle
        let behavior = self.inner.behavior.behavior().clone();
        f(behavior.as_ref())
    }
}

impl PartialEq for InstanceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for InstanceHandle {}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id.borrow())
            .field("capabilities", &self.inner.capabilities)
            .finish()
    }
}
