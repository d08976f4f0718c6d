//! Named-topic publish/subscribe bus connecting widgets, the value registry,
//! the chart engine and any external transport.
//!
//! Dispatch is synchronous and single-threaded: `publish` invokes every
//! handler subscribed to the topic, in subscription order, before returning.
//! The listener list is snapshotted at publish time, so subscribing or
//! unsubscribing from inside a handler only affects subsequent publishes. A
//! panicking handler is caught and logged; it never prevents the remaining
//! handlers from running and never propagates to the publisher.
//!
//! The bus has no built-in topics. Topic names and payload shapes are a
//! convention between producers and consumers; the conventional panel topics
//! and their typed payloads live in [`topics`] and the structs below.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

/// Conventional topic names used by the panel core.
pub mod topics {
    /// A parameter value changed through user interaction.
    pub const PARAMETER_VALUE_CHANGED: &str = "PARAMETER_VALUE_CHANGED";
    /// A momentary command was activated.
    pub const COMMAND_CLICKED: &str = "COMMAND_CLICKED";
    /// A toggle command flipped; payload carries the new state.
    pub const COMMAND_TOGGLED: &str = "COMMAND_TOGGLED";
    /// An element's visibility was changed.
    pub const VISIBILITY_CHANGED: &str = "VISIBILITY_CHANGED";
    /// A refreshed schema document arrived from the outside.
    pub const SCHEMA_UPDATE_RECEIVED: &str = "SCHEMA_UPDATE_RECEIVED";
}

/// Payload for [`topics::PARAMETER_VALUE_CHANGED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValueChanged {
    pub param_id: String,
    pub value: Value,
    pub controller_name: String,
}

/// Payload for [`topics::COMMAND_CLICKED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandClicked {
    pub command_id: String,
    pub controller_name: String,
}

/// Payload for [`topics::COMMAND_TOGGLED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandToggled {
    pub command_id: String,
    pub controller_name: String,
    pub state: bool,
}

/// Payload for [`topics::VISIBILITY_CHANGED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityChanged {
    pub element_id: String,
    pub is_visible: bool,
}

type Handler = Rc<RefCell<dyn FnMut(&Value)>>;

struct Listener {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    listeners: HashMap<String, Vec<Listener>>,
    next_id: u64,
}

/// Handle identifying one subscription; pass to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    topic: String,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// The event bus. Cheap to clone; clones share the same listener table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to a topic. Handlers run in subscription order.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: FnMut(&Value) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .listeners
            .entry(topic.to_string())
            .or_default()
            .push(Listener {
                id,
                handler: Rc::new(RefCell::new(handler)),
            });
        debug!(topic, "subscribed to topic");
        Subscription {
            topic: topic.to_string(),
            id,
        }
    }

    /// Remove a subscription. Unknown handles are a no-op.
    pub fn unsubscribe(&self, sub: &Subscription) {
        let mut inner = self.inner.borrow_mut();
        if let Some(list) = inner.listeners.get_mut(&sub.topic) {
            list.retain(|l| l.id != sub.id);
            debug!(topic = %sub.topic, "unsubscribed from topic");
        }
    }

    /// Publish a payload to every current subscriber of `topic`.
    ///
    /// Iterates over a snapshot of the listener list; handlers may freely
    /// subscribe, unsubscribe or publish again without affecting this
    /// dispatch.
    pub fn publish(&self, topic: &str, payload: &Value) {
        let snapshot: Vec<Handler> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .get(topic)
                .map(|list| list.iter().map(|l| l.handler.clone()).collect())
                .unwrap_or_default()
        };
        debug!(topic, handlers = snapshot.len(), "publishing event");
        for handler in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                (handler.borrow_mut())(payload);
            }));
            if outcome.is_err() {
                error!(topic, "event handler panicked; remaining handlers still run");
            }
        }
    }

    /// Serialize a typed payload and publish it.
    pub fn publish_event<T: Serialize>(&self, topic: &str, event: &T) {
        match serde_json::to_value(event) {
            Ok(value) => self.publish(topic, &value),
            Err(err) => error!(topic, %err, "failed to serialize event payload"),
        }
    }

    /// Number of handlers currently subscribed to `topic`.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(topic)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe("t", move |_| order.borrow_mut().push(tag));
        }
        bus.publish("t", &json!({}));
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        bus.subscribe("t", |_| panic!("boom"));
        {
            let hits = hits.clone();
            bus.subscribe("t", move |_| *hits.borrow_mut() += 1);
        }
        bus.publish("t", &json!(null));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn subscribe_during_publish_affects_only_later_publishes() {
        let bus = EventBus::new();
        let late_hits = Rc::new(RefCell::new(0u32));
        {
            let bus2 = bus.clone();
            let late_hits = late_hits.clone();
            bus.subscribe("t", move |_| {
                let late_hits = late_hits.clone();
                bus2.subscribe("t", move |_| *late_hits.borrow_mut() += 1);
            });
        }
        bus.publish("t", &json!(1));
        assert_eq!(*late_hits.borrow(), 0, "new handler must not see the in-flight publish");
        bus.publish("t", &json!(2));
        assert_eq!(*late_hits.borrow(), 1);
    }

    #[test]
    fn unsubscribe_during_publish_still_delivers_current_snapshot() {
        let bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        let second: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        {
            let bus2 = bus.clone();
            let second = second.clone();
            bus.subscribe("t", move |_| {
                if let Some(sub) = second.borrow().as_ref() {
                    bus2.unsubscribe(sub);
                }
            });
        }
        {
            let hits = hits.clone();
            let sub = bus.subscribe("t", move |_| *hits.borrow_mut() += 1);
            *second.borrow_mut() = Some(sub);
        }
        bus.publish("t", &json!({}));
        assert_eq!(*hits.borrow(), 1, "snapshot taken at publish time still runs");
        bus.publish("t", &json!({}));
        assert_eq!(*hits.borrow(), 1, "unsubscribed handler no longer runs");
    }

    #[test]
    fn unrelated_topics_are_not_delivered() {
        let bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        {
            let hits = hits.clone();
            bus.subscribe("a", move |_| *hits.borrow_mut() += 1);
        }
        bus.publish("b", &json!({}));
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn typed_payload_round_trip() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(None));
        {
            let seen = seen.clone();
            bus.subscribe(topics::PARAMETER_VALUE_CHANGED, move |v| {
                *seen.borrow_mut() =
                    Some(serde_json::from_value::<ParameterValueChanged>(v.clone()).unwrap());
            });
        }
        bus.publish_event(
            topics::PARAMETER_VALUE_CHANGED,
            &ParameterValueChanged {
                param_id: "speed".into(),
                value: json!(300),
                controller_name: "pump".into(),
            },
        );
        let seen = seen.borrow();
        let evt = seen.as_ref().unwrap();
        assert_eq!(evt.param_id, "speed");
        assert_eq!(evt.controller_name, "pump");
        assert_eq!(evt.value, json!(300));
    }
}
