pub mod models;

pub use models::{ApiConfig, AppConfig, DatabaseConfig, DispatchConfig, ObservabilityConfig};
