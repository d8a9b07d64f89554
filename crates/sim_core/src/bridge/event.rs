use serde_json::Value;
use tracing::debug;

use crate::ecs::{Handle, World};

use super::command::CommandBuffer;

pub const TOPIC_ANIMATION_FINISHED: &str = "anim.finished";
pub const TOPIC_ANIMATION_MARKER: &str = "anim.marker";
pub const TOPIC_COLLISION: &str = "physics.collision";
pub const TOPIC_WILDCARD: &str = "*";

/// One-shot notification flowing back into the simulation. Handles must be
/// re-validated by the consumer; the target may be gone by dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AnimationFinished {
        handle: Handle,
        animation: String,
    },
    AnimationMarker {
        handle: Handle,
        marker: String,
        payload: Value,
    },
    Collision {
        first: Handle,
        second: Handle,
        payload: Value,
    },
    /// Free-form UI event; `name` is its namespaced topic, e.g. `ui.open_map`.
    Ui {
        name: String,
        payload: Value,
    },
}

impl Event {
    pub fn topic(&self) -> &str {
        match self {
            Self::AnimationFinished { .. } => TOPIC_ANIMATION_FINISHED,
            Self::AnimationMarker { .. } => TOPIC_ANIMATION_MARKER,
            Self::Collision { .. } => TOPIC_COLLISION,
            Self::Ui { name, .. } => name,
        }
    }
}

/// What a subscriber can touch while an event is delivered. Events emitted
/// here are queued for the next flush, never the one being dispatched.
pub struct DispatchContext<'a> {
    pub world: &'a mut World,
    pub commands: &'a mut CommandBuffer,
    deferred: &'a mut Vec<Event>,
}

impl DispatchContext<'_> {
    pub fn emit(&mut self, event: Event) {
        self.deferred.push(event);
    }
}

pub type EventHandler = Box<dyn FnMut(&Event, &mut DispatchContext<'_>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    topic: String,
    handler: EventHandler,
}

#[derive(Default)]
pub struct EventBus {
    queue: Vec<Event>,
    subscriptions: Vec<Subscription>,
    next_subscription_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push(event);
    }

    pub fn flush(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.queue)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Registers `handler` for `topic`, or for every event when `topic` is
    /// [`TOPIC_WILDCARD`].
    pub fn subscribe<F>(&mut self, topic: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: FnMut(&Event, &mut DispatchContext<'_>) + 'static,
    {
        let id = SubscriptionId(self.next_subscription_id);
        self.next_subscription_id = self.next_subscription_id.saturating_add(1);
        self.subscriptions.push(Subscription {
            id,
            topic: topic.into(),
            handler: Box::new(handler),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Flushes the queue and delivers each event to its topic subscribers,
    /// then to wildcard subscribers, both in subscription order. Returns the
    /// number of events delivered.
    pub fn dispatch(&mut self, world: &mut World, commands: &mut CommandBuffer) -> usize {
        let events = self.flush();
        if events.is_empty() {
            return 0;
        }

        let mut deferred = Vec::new();
        for event in &events {
            let mut context = DispatchContext {
                world: &mut *world,
                commands: &mut *commands,
                deferred: &mut deferred,
            };
            let topic = event.topic();
            let mut delivered = false;
            // A UI event named `*` reaches wildcard subscribers once, below.
            for subscription in self.subscriptions.iter_mut().filter(|subscription| {
                topic != TOPIC_WILDCARD && subscription.topic == topic
            }) {
                (subscription.handler)(event, &mut context);
                delivered = true;
            }
            for subscription in self
                .subscriptions
                .iter_mut()
                .filter(|subscription| subscription.topic == TOPIC_WILDCARD)
            {
                (subscription.handler)(event, &mut context);
                delivered = true;
            }
            if !delivered {
                debug!(topic, "event_without_subscribers");
            }
        }

        // Anything emitted during delivery waits for the next flush, after
        // whatever was pushed from outside in the meantime.
        self.queue.extend(deferred);
        events.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;

    fn ui(name: &str) -> Event {
        Event::Ui {
            name: name.to_string(),
            payload: Value::Null,
        }
    }

    #[test]
    fn topic_subscribers_run_before_wildcards_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let wildcard_log = Rc::clone(&log);
        bus.subscribe(TOPIC_WILDCARD, move |_, _| {
            wildcard_log.borrow_mut().push("wildcard");
        });
        let first_log = Rc::clone(&log);
        bus.subscribe("ui.open", move |_, _| first_log.borrow_mut().push("first"));
        let second_log = Rc::clone(&log);
        bus.subscribe("ui.open", move |_, _| second_log.borrow_mut().push("second"));

        bus.push(ui("ui.open"));
        let mut world = World::new();
        let mut commands = CommandBuffer::new();
        assert_eq!(bus.dispatch(&mut world, &mut commands), 1);

        assert_eq!(*log.borrow(), vec!["first", "second", "wildcard"]);
    }

    #[test]
    fn events_emitted_during_dispatch_land_in_next_flush() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(0u32));
        let seen_in_handler = Rc::clone(&seen);
        bus.subscribe("ui.ping", move |_, context| {
            *seen_in_handler.borrow_mut() += 1;
            context.emit(ui("ui.ping"));
        });

        bus.push(ui("ui.ping"));
        let mut world = World::new();
        let mut commands = CommandBuffer::new();

        assert_eq!(bus.dispatch(&mut world, &mut commands), 1);
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(bus.len(), 1);

        assert_eq!(bus.dispatch(&mut world, &mut commands), 1);
        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0u32));
        let hits_in_handler = Rc::clone(&hits);
        let id = bus.subscribe(TOPIC_COLLISION, move |_, _| {
            *hits_in_handler.borrow_mut() += 1;
        });
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        let mut world = World::new();
        let first = world.create();
        let second = world.create();
        bus.push(Event::Collision {
            first,
            second,
            payload: json!({ "impulse": 2.5 }),
        });
        let mut commands = CommandBuffer::new();
        bus.dispatch(&mut world, &mut commands);

        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn flush_returns_copy_and_clears_queue() {
        let mut bus = EventBus::new();
        bus.push(ui("ui.a"));
        bus.push(ui("ui.b"));

        let flushed = bus.flush();
        assert_eq!(flushed.iter().map(Event::topic).collect::<Vec<_>>(), vec!["ui.a", "ui.b"]);
        assert!(bus.is_empty());
    }

    #[test]
    fn ui_event_named_wildcard_reaches_each_wildcard_subscriber_once() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        let counter = Rc::clone(&hits);
        bus.subscribe(TOPIC_WILDCARD, move |_, _| *counter.borrow_mut() += 1);
        let mut world = World::new();
        let mut commands = CommandBuffer::new();

        bus.push(ui(TOPIC_WILDCARD));
        assert_eq!(bus.dispatch(&mut world, &mut commands), 1);

        assert_eq!(*hits.borrow(), 1);
    }
}
