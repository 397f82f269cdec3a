//! Cost aggregation and chart dataset assembly
//!
//! Turns whichever payload shape the cost API returned into a
//! `{ user → { namespace → cost } }` matrix and from there into a
//! stacked chart dataset.

mod dataset;
mod matrix;
mod owner;
mod payload;

pub use dataset::*;
pub use matrix::CostMatrix;
pub use owner::*;
pub use payload::{CostRecord, RawCostPayload, UserCosts, Window};

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Payload that matches neither supported shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Unsupported payload: expected an object keyed by user or a list of records, got {0}")]
    UnsupportedShape(&'static str),
    #[error("Entry for user '{user}' must be an object, got {kind}")]
    EntryNotObject { user: String, kind: &'static str },
    #[error("Cost for namespace '{namespace}' of user '{user}' is not a number")]
    InvalidCost { user: String, namespace: String },
    #[error("Record #{index} must be an object, got {kind}")]
    RecordNotObject { index: usize, kind: &'static str },
    #[error("Record #{index} is malformed: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error("Cost {cost} for namespace '{namespace}' ({owner}) must be a non-negative number")]
    NegativeCost {
        owner: String,
        namespace: String,
        cost: f64,
    },
    #[error("Window start {start} is after end {end}")]
    InvertedWindow { start: String, end: String },
}

/// Window bounds plus the dataset built for them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    /// `None` when the first entry carried no readable window.
    pub window: Option<Window>,
    pub dataset: ChartDataset,
    /// Not serialized; the dataset already carries the chart data.
    #[serde(skip)]
    pub matrix: CostMatrix,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Ready(CostReport),
    /// No records for the window. Not an error.
    Empty,
}

/// Builds chart datasets from raw payloads.
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    resolver: OwnerResolver,
}

impl DatasetBuilder {
    pub fn new(resolver: OwnerResolver) -> Self {
        Self { resolver }
    }

    pub fn build(&self, payload: &Value) -> Result<BuildOutcome, SchemaError> {
        self.build_with_rng(payload, &mut rand::thread_rng())
    }

    pub fn build_with_rng<R: Rng + ?Sized>(
        &self,
        payload: &Value,
        rng: &mut R,
    ) -> Result<BuildOutcome, SchemaError> {
        let Some(raw) = RawCostPayload::detect(payload)? else {
            tracing::debug!("Payload is empty, nothing to build");
            return Ok(BuildOutcome::Empty);
        };

        let window = raw.window()?;
        let matrix = self.normalize(&raw);
        let dataset = ChartDataset::from_matrix(&matrix, rng);

        tracing::debug!(
            "Built dataset: {} entries -> {} users, {} namespaces",
            raw.entry_count(),
            dataset.labels.len(),
            dataset.series.len()
        );

        Ok(BuildOutcome::Ready(CostReport {
            window,
            dataset,
            matrix,
        }))
    }

    pub fn normalize(&self, raw: &RawCostPayload) -> CostMatrix {
        match raw {
            RawCostPayload::ByUser(users) => CostMatrix::from_by_user(users),
            RawCostPayload::Records(records) => CostMatrix::from_records(records, &self.resolver),
        }
    }
}

/// Build with the default owner convention.
pub fn build(payload: &Value) -> Result<BuildOutcome, SchemaError> {
    DatasetBuilder::default().build(payload)
}
