use anyhow::{anyhow, Result};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_retry::strategy::{jitter, FibonacciBackoff};
use tokio_retry::RetryIf;

use crate::config::ScraperConfig;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug)]
enum FetchError {
    Status(StatusCode),
    Transport(reqwest::Error),
}

impl FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        }
    }
}

/// HTTP client shared by one provider: browser-like headers, a request
/// timeout and retries on transient failures.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    label: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

/// Follows redirects only while they stay on `hosts`. A hop elsewhere is
/// not followed, so the 3xx itself comes back and fails the request.
fn same_hosts_policy(hosts: Vec<String>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let allowed = attempt
            .url()
            .host_str()
            .map(|host| host.trim_end_matches('.').to_ascii_lowercase())
            .is_some_and(|host| hosts.iter().any(|allowed| *allowed == host));
        if allowed {
            attempt.follow()
        } else {
            tracing::warn!(target_url = %attempt.url(), "Refusing redirect to a host outside the allow-list");
            attempt.stop()
        }
    })
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig, label: impl Into<String>) -> Result<Self> {
        Self::build(config, label.into(), Policy::limited(MAX_REDIRECTS))
    }

    /// A fetcher for caller-supplied URLs: redirects to hosts outside
    /// `allowed_hosts` are refused.
    pub fn restricted_to(
        config: &ScraperConfig,
        label: impl Into<String>,
        allowed_hosts: &[String],
    ) -> Result<Self> {
        Self::build(config, label.into(), same_hosts_policy(allowed_hosts.to_vec()))
    }

    fn build(config: &ScraperConfig, label: String, redirects: Policy) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("vi,en;q=0.9"),
        );

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .redirect(redirects)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            label,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms.max(1)),
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(|| self.client.get(url)).await?;
        response
            .text()
            .await
            .map_err(|e| anyhow!("{} body read failed: {}", self.label, e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .send(|| {
                self.client
                    .get(url)
                    .header(reqwest::header::ACCEPT, "application/json")
            })
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("{} returned malformed JSON: {}", self.label, e))
    }

    /// POSTs `form` urlencoded and decodes a JSON reply.
    pub async fn post_form_json<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .send(|| {
                self.client
                    .post(url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .header("X-Requested-With", "XMLHttpRequest")
                    .form(form)
            })
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("{} returned malformed JSON: {}", self.label, e))
    }

    async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let strategy = FibonacciBackoff::from_millis(self.retry_delay.as_millis() as u64)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.retry_attempts as usize);

        let build = &build;
        let attempt = || async move {
            let response = build().send().await.map_err(FetchError::Transport)?;
            let status = response.status();
            if !status.is_success() {
                tracing::debug!(source = %self.label, status = %status, "Upstream returned error status");
                return Err(FetchError::Status(status));
            }
            Ok(response)
        };

        RetryIf::spawn(strategy, attempt, FetchError::is_transient)
            .await
            .map_err(|e| match e {
                FetchError::Status(status) => {
                    anyhow!("{} returned HTTP {}", self.label, status.as_u16())
                }
                FetchError::Transport(e) if e.is_timeout() => {
                    anyhow!("{} timed out", self.label)
                }
                FetchError::Transport(e) => anyhow!("{} request failed: {}", self.label, e),
            })
    }
}
