use thiserror::Error;

// Only startup paths bubble errors up to `main`; the fetchers and the consumer absorb the rest.

/// A provider call (one news window or one ticker download) failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode provider payload: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    #[error("broker connection closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Request(String),

    #[error("classifier returned an unusable response: {0}")]
    BadResponse(String),

    #[error("unknown sentiment label: {0}")]
    UnknownLabel(String),

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Why one inbound message was rejected or skipped.
#[derive(Debug, Error)]
pub enum MessageFailure {
    #[error("malformed message: {0}")]
    Deserialize(String),

    #[error("invalid message: {0}")]
    Invalid(String),

    #[error("could not encode sentiment result: {0}")]
    Encode(String),

    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("publish failed: {0}")]
    Publish(#[source] BrokerError),

    #[error("ack failed: {0}")]
    Ack(#[source] BrokerError),
}
