pub mod frame_pipeline;
pub mod live_config;
pub mod parameter;
pub mod quality;
pub mod score_aggregator;
