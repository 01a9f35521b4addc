pub mod classifier;
pub mod pool;
pub mod sentiment;
pub mod vpin;

pub use classifier::{Classification, Classifier, HttpClassifier};
pub use pool::InferencePool;
pub use sentiment::{ConsumerStats, SentimentConsumer};
pub use vpin::{VpinCalculator, VpinConsumer, VpinReading, VpinStats};
