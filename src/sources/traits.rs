//! Cost source trait definition

use async_trait::async_trait;

use super::{FetchError, FetchedPayload};

/// Trait for implementing a cost data source
#[async_trait]
pub trait CostSource: Send + Sync {
    /// Fetch the raw cost payload for the given reporting window
    async fn fetch(&self, window_id: &str) -> Result<FetchedPayload, FetchError>;

    /// Get the source name for display
    fn name(&self) -> &'static str;
}
