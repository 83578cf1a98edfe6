#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::large_enum_variant,
    clippy::missing_errors_doc
)]
#![forbid(unsafe_code)]
mod config;
pub mod api;
pub mod implementations;
pub mod service;

pub use async_trait;
pub use axum;
pub use config::{CONFIG, DaysAvailablePolicy, DynAppConfig, NoosConfig, PgConfig, PoolSizing};
#[cfg(feature = "sqlx")]
pub use sqlx;
pub use tokio;
pub use tokio_util::sync::CancellationToken;
#[cfg(feature = "router")]
pub use tower;
#[cfg(feature = "router")]
pub use tower_http;
pub use tracing;

#[cfg(test)]
pub(crate) mod tests;
