//! Event dispatcher: classification, filtering, routing between the rule and
//! model engines, per-source counters, and result publishing.

pub mod counters;
pub mod dispatcher;
pub mod publisher;

pub use counters::{Counter, CounterSnapshot, DispatchCounters, SourceCounters, OTHER_SOURCE};
pub use dispatcher::{DispatchResult, Dispatcher, CANNOT_VALIDATE};
pub use publisher::{
    publisher_from_config, CollectingPublisher, JsonlFilePublisher, LogPublisher, PublishError,
    Publisher,
};
