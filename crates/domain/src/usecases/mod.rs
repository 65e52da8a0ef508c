//! Application use cases / business logic

pub mod dedup;
pub mod engine;
pub mod register;
pub mod render;

pub use engine::{DeliveryEngine, EngineConfig, CATCHUP_DAYS, CATCHUP_TAGS};
pub use register::register_channel;
pub use render::article_embed;
