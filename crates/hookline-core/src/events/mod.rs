//! In-process event pipeline: the canonical event record, the pub/sub bus,
//! the persist-then-publish dispatcher, and the optional schema registry.

mod bus;
mod dispatcher;
mod event;
mod registry;

pub use bus::{EventBus, EventSubscriber};
pub use dispatcher::{EventDispatcher, EventRepository};
pub use event::{is_valid_event_type, Event, EventBuilder, EventType};
pub use registry::{EventHandlerKind, EventRegistry, EventSchema};
