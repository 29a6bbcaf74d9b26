//! # KUHA Gateway
//!
//! REST gateway over several independent relational schemas (FIS race
//! results, wearable telemetry) with a Redis-backed response cache.
//!
//! ## Modules
//! - `core`: error type and configuration
//! - `caching`: key builder, cache stores, degrading cache manager, invalidation
//! - `aggregation`: source adapters and the read-through / fan-out aggregator
//! - `sources`: PostgreSQL backing stores
//! - `auth`: bearer token verification and the route access policy
//! - `gateway`: HTTP router, handlers and server loop
//! - `observability`: logging setup

pub mod aggregation;
pub mod auth;
pub mod caching;
pub mod core;
pub mod gateway;
pub mod observability;
pub mod sources;

pub use crate::core::config::GatewayConfig;
pub use crate::core::error::{GatewayError, GatewayResult};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
