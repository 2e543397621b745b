//! HTTP surface: analytics endpoints served through the compute cache.

pub mod analytics;
pub mod cached;
pub mod error;
pub mod middleware;
pub mod query;
pub mod routes;
pub mod status;

pub use routes::*;
