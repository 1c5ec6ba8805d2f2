pub mod http;
pub mod providers;
pub mod registry;
pub mod traits;

pub use registry::SourceRegistry;
pub use traits::{DetailSource, ListingSource, ProviderProfile};
