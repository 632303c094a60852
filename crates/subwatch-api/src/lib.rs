//! subwatch HTTP surface
//!
//! Serves the admin dashboard and public status page over warp:
//! - Admin routes behind bearer tokens ([`auth`])
//! - A per-client quota on the public status route ([`rate_limit`])
//! - Uniform JSON error bodies ([`error`])
//! - Server configuration and logging setup ([`config`], [`telemetry`])
//! - Assembly over caller-supplied stores ([`server`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subwatch_api::{routes, AppState, ServerConfig};
//! use subwatch_engine::Monitor;
//!
//! # async fn run() {
//! let config = ServerConfig::default();
//! let (monitor, _directory) = Monitor::in_memory(config.monitor.clone());
//! let state = AppState::new(Arc::new(monitor), &config);
//! warp::serve(routes(state)).run(config.bind).await;
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod params;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use auth::AdminAuth;
pub use config::{LogConfig, LogFormat, RateLimitConfig, ServerConfig};
pub use error::ApiError;
pub use rate_limit::StatusRateLimiter;
pub use routes::routes;
pub use server::Server;
pub use state::AppState;
