pub mod broker;
pub mod replay;

pub use broker::{AmqpBroker, Delivery, InMemoryBroker, MessageBroker};
pub use replay::{ReplayPublisher, ReplayReport, ReplayState};
