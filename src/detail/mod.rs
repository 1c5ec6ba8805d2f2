pub mod cache;
pub mod pool;
pub mod service;
pub mod validator;

pub use cache::DetailCache;
pub use pool::FetchPool;
pub use service::{DetailLookup, DetailService};
pub use validator::{SourceValidator, ValidatedRequest};
