pub mod config;
pub mod context;
pub mod error;
pub mod modules;
pub mod pipeline;
pub mod utils;
