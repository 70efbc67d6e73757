//! Lifecycle and progress events, and the bus that fans them out.

mod bus;
mod types;

pub use bus::{DEFAULT_BUFFER_CAPACITY, EventBus, Subscription, SubscriptionId};
pub use types::{Event, EventPayload, EventType};
