pub mod pipeline_profile;

pub use pipeline_profile::{
    BrokerConfig, NewsConfig, PipelineProfile, PriceConfig, ReplayConfig, SentimentConfig,
    VpinConfig,
};
