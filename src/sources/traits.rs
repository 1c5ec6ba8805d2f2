use async_trait::async_trait;
use url::Url;

use crate::models::{DetailRecord, Listing};

/// Static description of an upstream site: where relative links resolve and
/// which hosts a detail request may target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    pub base_url: Url,
    pub allowed_hosts: Vec<String>,
}

impl ProviderProfile {
    pub fn new(id: &str, name: &str, base_url: Url, allowed_hosts: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            base_url,
            allowed_hosts: allowed_hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    /// Exact, case-insensitive host match against the allow-list.
    pub fn allows_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| *allowed == host)
    }
}

/// Fetches every current listing from one provider.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    async fn fetch_listings(&self) -> anyhow::Result<Vec<Listing>>;
}

/// Fetches the detail page behind one listing URL. The URL has already been
/// normalized and checked against [`ProviderProfile::allowed_hosts`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DetailSource: Send + Sync {
    fn profile(&self) -> &ProviderProfile;

    async fn fetch_detail(&self, url: &Url) -> anyhow::Result<DetailRecord>;
}
