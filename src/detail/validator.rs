use url::Url;

use crate::sources::registry::DetailSourceRef;
use crate::utils::error::AppError;

/// A detail request that passed origin checks: the provider that will serve
/// it and the normalized URL to fetch.
#[derive(Clone)]
pub struct ValidatedRequest {
    pub source: DetailSourceRef,
    pub url: Url,
}

impl ValidatedRequest {
    pub fn source_id(&self) -> &str {
        &self.source.profile().id
    }

    /// Cache key, `provider|normalized_url`.
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.source_id(), self.url)
    }
}

impl std::fmt::Debug for ValidatedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedRequest")
            .field("source", &self.source_id())
            .field("url", &self.url.as_str())
            .finish()
    }
}

/// Resolves which provider serves a detail URL and refuses any URL whose
/// host is not on that provider's allow-list.
#[derive(Clone, Default)]
pub struct SourceValidator {
    sources: Vec<DetailSourceRef>,
}

impl SourceValidator {
    pub fn new(sources: Vec<DetailSourceRef>) -> Self {
        Self { sources }
    }

    pub fn validate(
        &self,
        raw_url: &str,
        source_hint: Option<&str>,
    ) -> Result<ValidatedRequest, AppError> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(AppError::validation("Missing url parameter"));
        }
        let hint = source_hint.map(str::trim).filter(|h| !h.is_empty());

        let source = match hint {
            Some(id) => self
                .sources
                .iter()
                .find(|s| s.profile().id == id)
                .ok_or_else(|| AppError::validation(format!("Unsupported source: {}", id)))?,
            None => {
                let parsed = Url::parse(raw_url)
                    .map_err(|_| AppError::validation("Invalid url parameter"))?;
                let host = parsed.host_str().unwrap_or_default();
                self.sources
                    .iter()
                    .find(|s| s.profile().allows_host(host))
                    .ok_or_else(|| AppError::validation("Unsupported source for this url"))?
            }
        };

        let url = normalize(raw_url, &source.profile().base_url)?;

        // checked again even when the caller named the source
        let host = url.host_str().unwrap_or_default();
        if !source.profile().allows_host(host) {
            tracing::warn!(source = %source.profile().id, host, "Rejected detail url outside allow-list");
            return Err(AppError::validation(format!(
                "Url host is not allowed for source {}",
                source.profile().id
            )));
        }

        Ok(ValidatedRequest {
            source: source.clone(),
            url,
        })
    }
}

fn normalize(raw_url: &str, base: &Url) -> Result<Url, AppError> {
    let mut url = match Url::parse(raw_url) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(raw_url)
            .map_err(|_| AppError::validation("Invalid url parameter"))?,
        Err(_) => return Err(AppError::validation("Invalid url parameter")),
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::validation("Only http and https urls are supported"));
    }
    url.set_fragment(None);
    Ok(url)
}
