mod command;
mod event;
mod presentation;

pub use command::{Command, CommandBuffer, CommandKind};
pub use event::{
    DispatchContext, Event, EventBus, EventHandler, SubscriptionId, TOPIC_ANIMATION_FINISHED,
    TOPIC_ANIMATION_MARKER, TOPIC_COLLISION, TOPIC_WILDCARD,
};
pub use presentation::PresentationSink;
