//! Engine event stream and subscription handling.

use crate::error::{EngineError, EngineResult};
use crate::history::{HistoryStats, Operation};
use crate::layers::LayerId;
use crate::shapes::{ElementId, ElementInfo};
use crate::tools::DrawingMode;
use kurbo::{Point, Size};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Everything observers can be told about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    MouseDown { display: Point, target: Point },
    MouseMove { display: Point, target: Point },
    MouseUp { display: Point, target: Point },
    DoubleClick { display: Point, target: Point },
    MediaLoaded { native: Size },
    MediaFailed { message: String },
    Resize { display: Size },
    ModeChange { from: DrawingMode, to: DrawingMode },
    /// A public operation ran.
    Action {
        name: String,
        success: bool,
        affected_elements: Vec<ElementId>,
    },
    /// Label info of an element changed.
    Annotation { element_id: ElementId, info: ElementInfo },
    LayerAction { action: String, layer_id: Option<LayerId> },
    /// Request forwarded to the effects subsystem.
    EffectAction { effect: String, payload: serde_json::Value },
    Feedback { level: FeedbackLevel, message: String },
    HistoryChanged { stats: HistoryStats },
    /// The persistent document changed.
    StateChanged {
        operation: Option<Operation>,
        element_count: usize,
        selected_count: usize,
    },
}

type Listener = Box<dyn FnMut(&EngineEvent)>;

struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    /// Ids unsubscribed while their listener was out for delivery.
    removed: HashSet<u64>,
    max_listeners: usize,
}

/// Synchronous observer list. Listeners run in registration order; a
/// panicking listener is logged and skipped.
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once, after the bus is
    /// gone, or from inside a listener.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(mut registry) = registry.try_borrow_mut() else {
            log::error!("Listener {} could not be removed: registry busy", self.id);
            return;
        };
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        if registry.listeners.len() == before {
            registry.removed.insert(self.id);
        }
    }
}

impl EventBus {
    pub fn new(max_listeners: usize) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
                removed: HashSet::new(),
                max_listeners,
            })),
        }
    }

    pub fn subscribe(&self, listener: impl FnMut(&EngineEvent) + 'static) -> EngineResult<Subscription> {
        let mut registry = self.registry.borrow_mut();
        if registry.listeners.len() >= registry.max_listeners {
            log::warn!("Listener limit of {} reached", registry.max_listeners);
            return Err(EngineError::TooManyListeners(registry.max_listeners));
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Box::new(listener)));
        Ok(Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        })
    }

    pub fn listener_count(&self) -> usize {
        self.registry.try_borrow().map_or(0, |r| r.listeners.len())
    }

    /// Deliver an event to every listener. The exclusive borrow keeps a
    /// listener from re-entering delivery.
    pub fn emit(&mut self, event: &EngineEvent) {
        let mut taken = std::mem::take(&mut self.registry.borrow_mut().listeners);

        for (id, listener) in taken.iter_mut() {
            if self.registry.borrow().removed.contains(id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::error!("Event listener {} panicked while handling {:?}", id, event);
            }
        }

        let mut registry = self.registry.borrow_mut();
        let removed = std::mem::take(&mut registry.removed);
        taken.retain(|(id, _)| !removed.contains(id));
        registry.listeners = taken;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(message: &str) -> EngineEvent {
        EngineEvent::Feedback {
            level: FeedbackLevel::Info,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let mut bus = EventBus::new(8);
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let log = log.clone();
            bus.subscribe(move |_| log.borrow_mut().push(n)).unwrap();
        }
        bus.emit(&feedback("hi"));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new(8);
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let sub = bus.subscribe(move |_| *c.borrow_mut() += 1).unwrap();
        bus.emit(&feedback("a"));
        sub.unsubscribe();
        sub.unsubscribe();
        bus.emit(&feedback("b"));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_listener() {
        let mut bus = EventBus::new(8);
        let count = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let (c, s) = (count.clone(), slot.clone());
        let sub = bus
            .subscribe(move |_| {
                *c.borrow_mut() += 1;
                if let Some(sub) = s.borrow().as_ref() {
                    sub.unsubscribe();
                }
            })
            .unwrap();
        *slot.borrow_mut() = Some(sub);
        bus.emit(&feedback("a"));
        bus.emit(&feedback("b"));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let mut bus = EventBus::new(8);
        let reached = Rc::new(RefCell::new(false));
        bus.subscribe(|_| panic!("listener failure")).unwrap();
        let r = reached.clone();
        bus.subscribe(move |_| *r.borrow_mut() = true).unwrap();
        bus.emit(&feedback("a"));
        assert!(*reached.borrow());
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_listener_limit() {
        let bus = EventBus::new(1);
        let _first = bus.subscribe(|_| {}).unwrap();
        assert_eq!(bus.subscribe(|_| {}).unwrap_err(), EngineError::TooManyListeners(1));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(feedback("saved")).unwrap();
        assert_eq!(json["type"], "feedback");
        assert_eq!(json["level"], "info");
    }
}
