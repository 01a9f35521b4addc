pub mod builder;

pub use builder::{MasterTimeline, TimelineBuilder};
