//! Cost API source
//!
//! `GET {base}?window={window_id}`. The API answers either with costs
//! grouped by user or with a flat list of per-namespace records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, LAST_MODIFIED};
use url::Url;

use super::{parse_body, CostSource, FetchError, FetchedPayload};
use crate::config::{ConfigError, DashboardSettings};

pub struct HttpCostSource {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpCostSource {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url,
            timeout,
        }
    }

    pub fn from_settings(settings: &DashboardSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(settings.endpoint()?, settings.request_timeout()))
    }

    /// Request URL for a window, with the id query-encoded.
    pub fn request_url(&self, window_id: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("window", window_id);
        url
    }

    async fn fetch_window(&self, window_id: &str) -> Result<FetchedPayload, FetchError> {
        if window_id.trim().is_empty() {
            return Err(FetchError::MissingWindow);
        }

        let url = self.request_url(window_id);
        tracing::debug!("Fetching cost data from: {}", url);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date);

        // Read as text first so server error text survives even when it isn't JSON
        let text = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !status.is_success() {
            let body = text.trim();
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.to_string()
            };
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(FetchedPayload {
            body: parse_body(&text)?,
            last_modified,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CostSource for HttpCostSource {
    fn name(&self) -> &'static str {
        "Cost API"
    }

    async fn fetch(&self, window_id: &str) -> Result<FetchedPayload, FetchError> {
        self.fetch_window(window_id).await
    }
}

/// `Last-Modified` uses the RFC 7231 IMF-fixdate form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
fn parse_http_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
