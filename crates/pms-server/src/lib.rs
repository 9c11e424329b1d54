pub mod config;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod operations;
pub mod routes;
pub mod server;

pub use config::{AppConfig, LoggingConfig, ServerConfig, StorageConfig};
pub use observability::{LogFilterSource, apply_logging, init_tracing};
pub use operations::AppServices;
pub use server::{AppState, PmsServer, ServerBuilder, build_app, router};
