//! HTTP surface: router, server loop and the per-domain handlers.

pub mod handlers;
pub mod server;

pub use server::{build_router, AppState, HttpServer};
