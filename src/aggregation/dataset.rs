use std::fmt;

use rand::Rng;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use super::matrix::CostMatrix;

/// Stack tag shared by every series so a renderer draws one bar per user.
pub const STACK_GROUP: &str = "userStack";

const SERIES_ALPHA: f32 = 0.6;
const CHANNEL_MAX: u8 = 200;

/// Series fill color, serialized as a CSS `rgba(...)` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    /// Random color with each channel in `[0, 200)` and alpha 0.6.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            r: rng.gen_range(0..CHANNEL_MAX),
            g: rng.gen_range(0..CHANNEL_MAX),
            b: rng.gen_range(0..CHANNEL_MAX),
            a: SERIES_ALPHA,
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({},{},{},{})", self.r, self.g, self.b, self.a)
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub series_label: String,
    /// Aligned index-for-index with `ChartDataset::labels`.
    pub values: Vec<f64>,
    pub stack_group: &'static str,
    pub color: Rgba,
}

/// Chart-ready breakdown: one label per user, one stacked series per namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

impl ChartDataset {
    pub fn from_matrix<R: Rng + ?Sized>(matrix: &CostMatrix, rng: &mut R) -> Self {
        let labels: Vec<String> = matrix.users().map(str::to_string).collect();

        let series = matrix
            .namespaces()
            .into_iter()
            .map(|namespace| ChartSeries {
                series_label: namespace.to_string(),
                values: labels
                    .iter()
                    .map(|user| matrix.cost(user, namespace).unwrap_or(0.0))
                    .collect(),
                stack_group: STACK_GROUP,
                color: Rgba::random(rng),
            })
            .collect();

        Self { labels, series }
    }

    /// Column totals, one per label.
    pub fn totals(&self) -> Vec<f64> {
        (0..self.labels.len())
            .map(|index| self.series.iter().map(|s| s.values[index]).sum())
            .collect()
    }

    /// Declarative stacked-bar chart config for a JS charting widget.
    pub fn to_chart_config(&self, window_id: &str) -> Value {
        let datasets: Vec<Value> = self
            .series
            .iter()
            .map(|series| {
                json!({
                    "label": series.series_label,
                    "data": series.values,
                    "backgroundColor": series.color.to_string(),
                    "stack": series.stack_group,
                })
            })
            .collect();

        json!({
            "type": "bar",
            "data": {
                "labels": self.labels,
                "datasets": datasets,
            },
            "options": {
                "responsive": true,
                "maintainAspectRatio": false,
                "plugins": {
                    "title": {
                        "display": true,
                        "text": format!("User Cost Breakdown by Namespace (Window: {window_id})"),
                    },
                    "tooltip": { "mode": "index", "intersect": false },
                    "legend": { "display": true, "position": "top" },
                },
                "scales": {
                    "x": {
                        "stacked": true,
                        "title": { "display": true, "text": "User Group" },
                    },
                    "y": {
                        "stacked": true,
                        "title": { "display": true, "text": "Total Cost ($)" },
                        "beginAtZero": true,
                    },
                },
            },
        })
    }
}
