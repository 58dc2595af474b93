pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use services::SocialCore;
