use std::sync::Arc;

use super::providers::{BonbanhSource, ChototSource, OtoAnhLuongSource, XeLuotToanTrungSource};
use super::traits::{DetailSource, ListingSource};
use crate::config::{AppConfig, ScraperConfig};
use crate::utils::error::AppError;

pub type ListingSourceRef = Arc<dyn ListingSource>;
pub type DetailSourceRef = Arc<dyn DetailSource>;

/// Fixed, ordered set of providers. Registration order is the order sources
/// are reported in every snapshot.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    listing_sources: Vec<ListingSourceRef>,
    detail_sources: Vec<DetailSourceRef>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listing provider
    pub fn register_listing_source(&mut self, source: ListingSourceRef) -> Result<(), AppError> {
        if self.has_listing_source(source.id()) {
            return Err(AppError::Internal(format!(
                "Listing source '{}' registered twice",
                source.id()
            )));
        }
        tracing::debug!(source = source.id(), "Registered listing source");
        self.listing_sources.push(source);
        Ok(())
    }

    /// Register a detail provider
    pub fn register_detail_source(&mut self, source: DetailSourceRef) -> Result<(), AppError> {
        let id = source.profile().id.clone();
        if self.detail_source(&id).is_some() {
            return Err(AppError::Internal(format!(
                "Detail source '{}' registered twice",
                id
            )));
        }
        tracing::debug!(source = %id, "Registered detail source");
        self.detail_sources.push(source);
        Ok(())
    }

    pub fn listing_sources(&self) -> &[ListingSourceRef] {
        &self.listing_sources
    }

    pub fn detail_sources(&self) -> &[DetailSourceRef] {
        &self.detail_sources
    }

    pub fn has_listing_source(&self, id: &str) -> bool {
        self.listing_sources.iter().any(|s| s.id() == id)
    }

    pub fn detail_source(&self, id: &str) -> Option<&DetailSourceRef> {
        self.detail_sources.iter().find(|s| s.profile().id == id)
    }

    pub fn list_source_ids(&self) -> Vec<String> {
        self.listing_sources.iter().map(|s| s.id().to_string()).collect()
    }

    /// Builds the providers named in `sources.enabled`, in that order.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let mut registry = Self::new();
        for id in &config.sources.enabled {
            registry.register_builtin(id, &config.scraper)?;
        }
        Ok(registry)
    }

    fn register_builtin(&mut self, id: &str, scraper: &ScraperConfig) -> Result<(), AppError> {
        let build_error = |e: anyhow::Error| AppError::Internal(format!("Failed to build source {}: {:#}", id, e));

        match id {
            "bonbanh" => {
                let source = Arc::new(BonbanhSource::new(scraper).map_err(build_error)?);
                self.register_listing_source(source.clone())?;
                self.register_detail_source(source)?;
            }
            "chotot" => {
                let source = Arc::new(ChototSource::new(scraper).map_err(build_error)?);
                self.register_listing_source(source.clone())?;
                self.register_detail_source(source)?;
            }
            "xeluottoantrung" => {
                let source = XeLuotToanTrungSource::new(scraper).map_err(build_error)?;
                self.register_listing_source(Arc::new(source))?;
            }
            "otoanhluong" => {
                let source = OtoAnhLuongSource::new(scraper).map_err(build_error)?;
                self.register_listing_source(Arc::new(source))?;
            }
            other => {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Unknown source '{}' in sources.enabled",
                    other
                ))));
            }
        }
        Ok(())
    }
}
