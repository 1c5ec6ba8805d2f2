pub mod collector;
pub mod config;
pub mod coordinator;
pub mod detail;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use collector::Collector;
pub use config::AppConfig;
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use detail::{DetailService, FetchPool};
pub use scheduler::{JobInfo, RefreshScheduler, SchedulerStats};
pub use sources::SourceRegistry;
pub use store::SnapshotStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
