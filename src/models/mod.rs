pub mod detail;
pub mod listing;
pub mod snapshot;

// Re-exports for convenience
pub use detail::*;
pub use listing::*;
pub use snapshot::*;
