//! Static cost document on disk
//!
//! Serves a pre-computed payload (e.g. an exported `costs.json`). The
//! document covers a single window, so the requested id is only logged.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{parse_body, CostSource, FetchError, FetchedPayload};

pub struct FileCostSource {
    path: PathBuf,
}

impl FileCostSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, err: std::io::Error) -> FetchError {
        FetchError::Io {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl CostSource for FileCostSource {
    fn name(&self) -> &'static str {
        "Cost file"
    }

    async fn fetch(&self, window_id: &str) -> Result<FetchedPayload, FetchError> {
        tracing::debug!(
            "Reading cost data from {} (requested window: {})",
            self.path.display(),
            window_id
        );

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        let last_modified = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok())
            .map(DateTime::<Utc>::from);

        Ok(FetchedPayload {
            body: parse_body(&text)?,
            last_modified,
        })
    }
}
