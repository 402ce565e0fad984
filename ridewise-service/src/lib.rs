//! Engine assembly for ridewise.
//!
//! [`Engine`] is an explicit instance wiring the position store, the
//! subscription broker, guarded predictors, the [`RecommendationCache`] and
//! the notification scheduler together. Build one with [`Engine::builder`],
//! call [`Engine::start`] inside a tokio runtime to run the periodic sweeps,
//! and [`Engine::shutdown`] to stop them.

#![forbid(unsafe_code)]

mod cache;
mod config;
mod engine;
mod tasks;

pub use cache::{CacheKey, RecommendationCache};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, NoRoutes, QueryError, RecommendError};
pub use tasks::BackgroundTasks;
