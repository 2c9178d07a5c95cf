//! Responsive controller
//!
//! Wraps another [`Elemental`] so it only runs on selected viewport tiers.
//! The wrapped instance is created lazily the first time the viewport is in
//! the active set, paused when the viewport leaves the set and resumed when
//! it comes back. It is never constructed twice.
//!
//! Declarations opt in with `isActiveOn`:
//!
//! ```json
//! [{"name": "megaMenu", "isActiveOn": ["desktop", "large-desktop"]}]
//! ```

use elemental_core::events::event_names;
use elemental_core::{
    Behavior, BehaviorError, BehaviorRef, Capabilities, ElementId, EventPayload, InstanceHandle,
    Subject, SubscriptionToken, Viewport,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::elemental::{Elemental, ElementalContext, Options};
use crate::error::ElementalError;

/// Name under which responsive controllers are registered
pub const RESPONSIVE_CONTROLLER: &str = "responsiveController";

/// Options of a responsive controller
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveSettings {
    /// Viewport names on which the wrapped elemental runs
    #[serde(default)]
    pub is_active_on: Vec<String>,
    /// Name of the wrapped elemental
    pub elemental_name: String,
    /// Options forwarded to the wrapped elemental
    #[serde(default)]
    pub elemental_options: Option<Value>,
    /// Id stamped on the wrapped instance
    #[serde(default)]
    pub id: Option<String>,
}

impl ResponsiveSettings {
    pub fn is_active_on(&self, viewport: Viewport) -> bool {
        self.is_active_on.iter().any(|v| v == viewport.as_str())
    }

    /// Options as handed to the controller's body
    pub fn to_options(&self) -> Options {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Options::new(),
        }
    }
}

/// Lifecycle of the wrapped instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    /// Not constructed yet (or destroyed)
    Uninitialized,
    Active,
    Paused,
}

struct WrapperInner {
    context: ElementalContext,
    target: Elemental,
    settings: ResponsiveSettings,
    state: Cell<WrapperState>,
    instance: RefCell<Option<InstanceHandle>>,
    viewport_subscription: Cell<Option<SubscriptionToken>>,
    destroyed_subscription: Cell<Option<SubscriptionToken>>,
}

/// Behavior returned by the responsive controller
///
/// It has no lifecycle capabilities of its own; the lifecycle manager acts on
/// the wrapped instance, which carries the declaration id.
#[derive(Clone)]
pub struct ResponsiveWrapper {
    inner: Rc<WrapperInner>,
}

impl fmt::Debug for ResponsiveWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponsiveWrapper")
            .field("elemental", &self.inner.target.name())
            .field("state", &self.inner.state.get())
            .field("is_active_on", &self.inner.settings.is_active_on)
            .finish()
    }
}

impl Behavior for ResponsiveWrapper {
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }
}

impl ResponsiveWrapper {
    fn new(context: ElementalContext, target: Elemental, settings: ResponsiveSettings) -> Self {
        Self {
            inner: Rc::new(WrapperInner {
                context,
                target,
                settings,
                state: Cell::new(WrapperState::Uninitialized),
                instance: RefCell::new(None),
                viewport_subscription: Cell::new(None),
                destroyed_subscription: Cell::new(None),
            }),
        }
    }

    pub fn state(&self) -> WrapperState {
        self.inner.state.get()
    }

    /// The wrapped instance, once constructed
    pub fn instance(&self) -> Option<InstanceHandle> {
        self.inner.instance.borrow().clone()
    }

    pub fn settings(&self) -> &ResponsiveSettings {
        &self.inner.settings
    }

    pub fn element(&self) -> ElementId {
        self.inner.context.element()
    }

    /// Subscribe to viewport and destroy events, then evaluate the viewport
    fn start(&self) -> Result<(), ElementalError> {
        let events = self.inner.context.events();

        let weak = Rc::downgrade(&self.inner);
        let token = events.subscribe(
            Subject::Global,
            event_names::RESPONSIVE_CHANGED,
            move |_| match upgrade(&weak) {
                Some(wrapper) => Ok(wrapper.bootstrap()?),
                None => Ok(()),
            },
        );
        self.inner.viewport_subscription.set(Some(token));

        let weak = Rc::downgrade(&self.inner);
        let token = events.subscribe(
            Subject::Element(self.element()),
            event_names::INSTANCE_DESTROYED,
            move |payload| {
                if let Some(wrapper) = upgrade(&weak) {
                    wrapper.on_instance_destroyed(payload);
                }
                Ok(())
            },
        );
        self.inner.destroyed_subscription.set(Some(token));

        self.bootstrap()
    }

    /// Bring the wrapped instance in line with the current viewport
    fn bootstrap(&self) -> Result<(), ElementalError> {
        let name = self.inner.target.name();
        let viewport = self.inner.context.runtime().viewport();
        let instance = self.instance();

        if !self.inner.settings.is_active_on(viewport) {
            let Some(instance) = instance else {
                return Ok(());
            };
            if self.state() == WrapperState::Paused {
                return Ok(());
            }
            if !instance.can(Capabilities::PAUSE) {
                tracing::debug!(
                    "Unable to pause '{}', it stays active on {} as it does not implement pause",
                    name,
                    viewport
                );
                return Ok(());
            }

            self.inner.state.set(WrapperState::Paused);
            if let Err(err) = instance.pause() {
                tracing::debug!("Failed to pause '{}': {}", name, err);
            }
            return Ok(());
        }

        if self.state() != WrapperState::Paused {
            return self.ensure_instance();
        }

        let Some(instance) = instance else {
            return self.ensure_instance();
        };
        if !instance.can(Capabilities::RESUME) {
            tracing::debug!("Unable to resume '{}', it does not implement resume", name);
            return Ok(());
        }

        self.inner.state.set(WrapperState::Active);
        if let Err(err) = instance.resume() {
            tracing::debug!("Failed to resume '{}': {}", name, err);
        }
        Ok(())
    }

    /// Construct the wrapped instance unless it already exists
    fn ensure_instance(&self) -> Result<(), ElementalError> {
        if self.inner.instance.borrow().is_some() {
            return Ok(());
        }

        let context = &self.inner.context;
        let settings = &self.inner.settings;
        let name = self.inner.target.name();

        let existing = settings
            .id
            .as_deref()
            .and_then(|id| context.runtime().instances().get_by_id(context.element(), name, id));
        let instance = match existing {
            Some(instance) => instance,
            None => self.inner.target.instantiate(
                context.runtime(),
                context.element(),
                settings.elemental_options.as_ref(),
            )?,
        };

        if let Some(id) = &settings.id {
            instance.set_id(id.as_str());
        }
        *self.inner.instance.borrow_mut() = Some(instance);
        self.inner.state.set(WrapperState::Active);
        Ok(())
    }

    /// Forget the wrapped instance once it is destroyed
    fn on_instance_destroyed(&self, payload: &EventPayload) {
        let Some(destroyed) = payload.instance() else {
            return;
        };
        let matches = self
            .inner
            .instance
            .borrow()
            .as_ref()
            .is_some_and(|i| i.ptr_eq(destroyed));
        if !matches {
            return;
        }

        let events = self.inner.context.events();
        for slot in [
            &self.inner.viewport_subscription,
            &self.inner.destroyed_subscription,
        ] {
            if let Some(token) = slot.take() {
                events.unsubscribe(token);
            }
        }

        let forgotten = self.inner.instance.borrow_mut().take();
        self.inner.state.set(WrapperState::Uninitialized);
        drop(forgotten);
        tracing::debug!(
            "Responsive '{}' released its destroyed instance",
            self.inner.target.name()
        );
    }
}

fn upgrade(weak: &Weak<WrapperInner>) -> Option<ResponsiveWrapper> {
    weak.upgrade().map(|inner| ResponsiveWrapper { inner })
}

/// Build the responsive controller for `target`
///
/// The controller expects [`ResponsiveSettings`] as options. Bus callbacks
/// only hold weak references; the wrapper lives as long as its registry entry.
pub fn responsive_elemental(target: Elemental) -> Elemental {
    Elemental::builtin(
        RESPONSIVE_CONTROLLER,
        move |ctx: &ElementalContext, options: Options| {
            let settings: ResponsiveSettings = serde_json::from_value(Value::Object(options))
                .map_err(|err| BehaviorError::InvalidOptions(err.to_string()))?;
            if settings.elemental_name != target.name() {
                tracing::debug!(
                    "Responsive settings name '{}' differs from wrapped elemental '{}'",
                    settings.elemental_name,
                    target.name()
                );
            }

            let wrapper = ResponsiveWrapper::new(ctx.clone(), target.clone(), settings);
            wrapper.start().map_err(anyhow::Error::new)?;
            Ok(Some(BehaviorRef::new(wrapper)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::viewport::WidthProbe;
    use elemental_core::Result as BehaviorResult;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        paused: Cell<u32>,
        resumed: Cell<u32>,
        fail_pause: bool,
    }

    impl Behavior for Counter {
        fn capabilities(&self) -> Capabilities {
            Capabilities::PAUSABLE | Capabilities::DESTROY
        }

        fn pause(&self) -> BehaviorResult<()> {
            self.paused.set(self.paused.get() + 1);
            if self.fail_pause {
                return Err(BehaviorError::failed("cannot pause"));
            }
            Ok(())
        }

        fn resume(&self) -> BehaviorResult<()> {
            self.resumed.set(self.resumed.get() + 1);
            Ok(())
        }

        fn destroy(&self) -> BehaviorResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        probe: Rc<WidthProbe>,
        runtime: Runtime,
        element: ElementId,
        constructed: Rc<Cell<u32>>,
        last: Rc<RefCell<Option<Rc<Counter>>>>,
    }

    fn fixture(width: u32) -> Fixture {
        let probe = Rc::new(WidthProbe::new(width));
        let runtime = Runtime::new(probe.clone());
        let element = {
            let mut doc = runtime.document_mut();
            let el = doc.create_element("nav");
            let body = doc.body();
            doc.append_child(body, el).unwrap();
            el
        };
        Fixture {
            probe,
            runtime,
            element,
            constructed: Rc::new(Cell::new(0)),
            last: Rc::new(RefCell::new(None)),
        }
    }

    impl Fixture {
        fn target(&self, fail_pause: bool) -> Elemental {
            let constructed = self.constructed.clone();
            let last = self.last.clone();
            Elemental::new(
                "megaMenu",
                move |_: &ElementalContext, _: Options| {
                    constructed.set(constructed.get() + 1);
                    let counter = Rc::new(Counter {
                        fail_pause,
                        ..Default::default()
                    });
                    *last.borrow_mut() = Some(counter.clone());
                    Ok(Some(counter.into()))
                },
                None,
            )
            .unwrap()
        }

        fn wrap(&self, target: Elemental, active_on: &[&str]) -> ResponsiveWrapper {
            let settings = ResponsiveSettings {
                is_active_on: active_on.iter().map(|v| v.to_string()).collect(),
                elemental_name: target.name().to_string(),
                elemental_options: None,
                id: Some("0".to_string()),
            };
            let options = Value::Object(settings.to_options());
            let handle = responsive_elemental(target)
                .instantiate(&self.runtime, self.element, Some(&options))
                .unwrap();
            handle.downcast::<ResponsiveWrapper>().unwrap().as_ref().clone()
        }

        fn resize(&self, width: u32) {
            self.probe.set_width(width);
            self.runtime.calculate_viewport();
        }

        fn counter(&self) -> Rc<Counter> {
            self.last.borrow().clone().unwrap()
        }
    }

    #[test]
    fn test_lazy_activation() {
        let f = fixture(320);
        let wrapper = f.wrap(f.target(false), &["desktop"]);

        assert_eq!(wrapper.state(), WrapperState::Uninitialized);
        assert_eq!(f.constructed.get(), 0);

        f.resize(1100);
        assert_eq!(wrapper.state(), WrapperState::Active);
        assert_eq!(f.constructed.get(), 1);
        let instance = wrapper.instance().unwrap();
        assert_eq!(instance.id().as_deref(), Some("0"));
        assert_eq!(
            f.runtime.instances().get_by_id(f.element, "megaMenu", "0"),
            Some(instance)
        );
    }

    #[test]
    fn test_pause_resume_without_reconstruction() {
        let f = fixture(1100);
        let wrapper = f.wrap(f.target(false), &["desktop"]);
        assert_eq!(wrapper.state(), WrapperState::Active);

        f.resize(320);
        assert_eq!(wrapper.state(), WrapperState::Paused);
        // Leaving for another inactive tier does not pause twice
        f.resize(800);
        assert_eq!(f.counter().paused.get(), 1);

        f.resize(1100);
        assert_eq!(wrapper.state(), WrapperState::Active);
        assert_eq!(f.counter().resumed.get(), 1);
        assert_eq!(f.constructed.get(), 1);
    }

    #[test]
    fn test_failed_pause_is_contained() {
        let f = fixture(1100);
        let wrapper = f.wrap(f.target(true), &["desktop"]);

        f.resize(320);
        assert_eq!(wrapper.state(), WrapperState::Paused);
        assert_eq!(f.counter().paused.get(), 1);
    }

    #[test]
    fn test_unpausable_stays_active() {
        let f = fixture(1100);
        let plain =
            Elemental::new("plain", |_: &ElementalContext, _: Options| Ok(None), None).unwrap();
        let wrapper = f.wrap(plain, &["desktop"]);

        f.resize(320);
        assert_eq!(wrapper.state(), WrapperState::Active);
    }

    #[test]
    fn test_released_on_destroy_event() {
        let f = fixture(1100);
        let wrapper = f.wrap(f.target(false), &["desktop"]);
        let instance = wrapper.instance().unwrap();
        let subscriptions = f.runtime.bus().subscription_count();

        // Another instance on the same element does not release the wrapper
        f.runtime.bus().publish(
            &Subject::Element(f.element),
            event_names::INSTANCE_DESTROYED,
            &EventPayload::Instance {
                instance: InstanceHandle::empty("other"),
            },
        );
        assert!(wrapper.instance().is_some());

        f.runtime.bus().publish(
            &Subject::Element(f.element),
            event_names::INSTANCE_DESTROYED,
            &EventPayload::Instance { instance },
        );
        assert_eq!(wrapper.state(), WrapperState::Uninitialized);
        assert!(wrapper.instance().is_none());
        assert_eq!(f.runtime.bus().subscription_count(), subscriptions - 2);

        // No longer follows the viewport
        f.resize(320);
        f.resize(1100);
        assert_eq!(f.constructed.get(), 1);
    }

    #[test]
    fn test_invalid_settings() {
        let f = fixture(1100);
        let err = responsive_elemental(f.target(false))
            .instantiate(&f.runtime, f.element, Some(&json!({ "isActiveOn": "desktop" })))
            .unwrap_err();
        assert!(matches!(
            err,
            ElementalError::Body {
                source: BehaviorError::InvalidOptions(_),
                ..
            }
        ));
        assert_eq!(f.runtime.bus().subscription_count(), 0);
    }
}
