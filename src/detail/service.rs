use std::sync::Arc;
use std::time::Duration;

use super::cache::DetailCache;
use super::validator::SourceValidator;
use crate::config::CacheConfig;
use crate::models::DetailRecord;
use crate::sources::registry::{DetailSourceRef, SourceRegistry};
use crate::utils::error::AppError;

#[derive(Debug, Clone)]
pub struct DetailLookup {
    pub record: Arc<DetailRecord>,
    pub cached: bool,
}

/// On-demand detail lookups: validate, serve from cache, otherwise ask the
/// provider and remember the answer. Failures are never cached.
pub struct DetailService {
    validator: SourceValidator,
    cache: DetailCache,
}

impl DetailService {
    pub fn new(sources: Vec<DetailSourceRef>, ttl: Duration) -> Self {
        Self {
            validator: SourceValidator::new(sources),
            cache: DetailCache::new(ttl),
        }
    }

    pub fn from_registry(registry: &SourceRegistry, cache: &CacheConfig) -> Self {
        Self {
            validator: SourceValidator::new(registry.detail_sources().to_vec()),
            cache: DetailCache::with_max_entries(cache.detail_ttl(), cache.detail_max_entries),
        }
    }

    pub fn cache(&self) -> &DetailCache {
        &self.cache
    }

    pub async fn fetch(
        &self,
        raw_url: &str,
        source_hint: Option<&str>,
    ) -> Result<DetailLookup, AppError> {
        let request = self.validator.validate(raw_url, source_hint)?;
        let key = request.cache_key();

        if let Some(record) = self.cache.get(&key) {
            metrics::counter!("detail_cache_hits_total").increment(1);
            tracing::debug!(source = request.source_id(), url = %request.url, "Detail cache hit");
            return Ok(DetailLookup { record, cached: true });
        }
        metrics::counter!("detail_cache_misses_total").increment(1);

        let record = request
            .source
            .fetch_detail(&request.url)
            .await
            .map_err(|e| {
                tracing::warn!(source = request.source_id(), url = %request.url, error = %format!("{:#}", e), "Detail fetch failed");
                AppError::UpstreamDetail(format!("{:#}", e))
            })?;

        Ok(DetailLookup {
            record: self.cache.insert(key, record),
            cached: false,
        })
    }
}
