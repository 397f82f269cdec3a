//! Renderer collaborator
//!
//! The renderer owns whatever visual instance it draws. The dashboard
//! always calls `clear` before a new refresh, so an old chart never sits
//! under new labels.

use crate::aggregation::CostReport;

use super::StatusIndicators;

pub trait Renderer: Send + Sync {
    /// Release the current visual instance, if any.
    fn clear(&self);

    /// Draw a fresh chart for `report`.
    fn draw(&self, window_id: &str, report: &CostReport);

    /// "No data" placeholder; never an empty chart.
    fn show_empty(&self, window_id: &str);

    fn show_error(&self, message: &str);

    fn update_status(&self, status: &StatusIndicators);
}

/// Renderer that only logs; used by headless callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderer;

impl Renderer for TracingRenderer {
    fn clear(&self) {
        tracing::trace!("Clearing chart");
    }

    fn draw(&self, window_id: &str, report: &CostReport) {
        tracing::info!(
            "Chart ready for window {}: {} users, {} namespaces",
            window_id,
            report.dataset.labels.len(),
            report.dataset.series.len()
        );
    }

    fn show_empty(&self, window_id: &str) {
        tracing::info!("No data available for window {}", window_id);
    }

    fn show_error(&self, message: &str) {
        tracing::warn!("Error loading data: {}", message);
    }

    fn update_status(&self, status: &StatusIndicators) {
        tracing::debug!(
            "Window {} - {} (last updated {})",
            status.window_start,
            status.window_end,
            status.last_updated
        );
    }
}
