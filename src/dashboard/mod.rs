//! Refresh lifecycle
//!
//! `Idle → Loading → Success | Empty | Error`, and back to `Loading` on the
//! next trigger. Every refresh takes a ticket (window plus token) from the
//! selector; only the holder of the latest token may commit, so a slow
//! earlier response can't overwrite a newer one.

mod renderer;
mod selector;

pub use renderer::*;
pub use selector::*;

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::aggregation::{BuildOutcome, CostReport, DatasetBuilder, SchemaError, Window};
use crate::sources::{CostSource, FetchError};

pub const NOT_AVAILABLE: &str = "N/A";
pub const LOADING: &str = "Loading...";
pub const ERROR: &str = "Error";

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshState {
    Idle,
    Loading { window_id: String },
    Success { window_id: String, report: CostReport },
    Empty { window_id: String },
    Error { window_id: String, message: String },
}

impl RefreshState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading { .. } => "loading",
            Self::Success { .. } => "success",
            Self::Empty { .. } => "empty",
            Self::Error { .. } => "error",
        }
    }

    pub fn window_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading { window_id }
            | Self::Success { window_id, .. }
            | Self::Empty { window_id }
            | Self::Error { window_id, .. } => Some(window_id),
        }
    }

    pub fn report(&self) -> Option<&CostReport> {
        match self {
            Self::Success { report, .. } => Some(report),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Empty { .. } | Self::Error { .. })
    }
}

/// Text shown next to the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicators {
    pub window_start: String,
    pub window_end: String,
    pub last_updated: String,
    /// Set on every attempt, failed or not.
    pub last_attempted: String,
}

impl StatusIndicators {
    pub fn idle() -> Self {
        Self {
            window_start: NOT_AVAILABLE.to_string(),
            window_end: NOT_AVAILABLE.to_string(),
            last_updated: NOT_AVAILABLE.to_string(),
            last_attempted: NOT_AVAILABLE.to_string(),
        }
    }

    fn loading(attempted_at: DateTime<Utc>) -> Self {
        Self {
            window_start: LOADING.to_string(),
            window_end: LOADING.to_string(),
            last_updated: format_timestamp(&attempted_at),
            last_attempted: format_timestamp(&attempted_at),
        }
    }

    /// Bounds read `N/A` when the payload carried no readable window.
    fn ready(
        window: Option<&Window>,
        updated_at: DateTime<Utc>,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        let (window_start, window_end) = match window {
            Some(window) => (format_timestamp(&window.start), format_timestamp(&window.end)),
            None => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
        };
        Self {
            window_start,
            window_end,
            last_updated: format_timestamp(&updated_at),
            last_attempted: format_timestamp(&attempted_at),
        }
    }

    fn empty(updated_at: DateTime<Utc>, attempted_at: DateTime<Utc>) -> Self {
        Self {
            window_start: NOT_AVAILABLE.to_string(),
            window_end: NOT_AVAILABLE.to_string(),
            last_updated: format_timestamp(&updated_at),
            last_attempted: format_timestamp(&attempted_at),
        }
    }

    fn failed(attempted_at: DateTime<Utc>) -> Self {
        Self {
            window_start: ERROR.to_string(),
            window_end: ERROR.to_string(),
            last_updated: ERROR.to_string(),
            last_attempted: format_timestamp(&attempted_at),
        }
    }
}

impl Default for StatusIndicators {
    fn default() -> Self {
        Self::idle()
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

struct Slot {
    state: RefreshState,
    status: StatusIndicators,
}

/// One dashboard instance: a source, a builder, a renderer and the
/// current-result slot they share.
pub struct Dashboard {
    source: Arc<dyn CostSource>,
    builder: DatasetBuilder,
    renderer: Arc<dyn Renderer>,
    selector: WindowSelector,
    slot: RwLock<Slot>,
}

impl Dashboard {
    pub fn new(
        source: Arc<dyn CostSource>,
        builder: DatasetBuilder,
        renderer: Arc<dyn Renderer>,
        initial_window: impl Into<String>,
    ) -> Self {
        Self {
            source,
            builder,
            renderer,
            selector: WindowSelector::new(initial_window),
            slot: RwLock::new(Slot {
                state: RefreshState::Idle,
                status: StatusIndicators::idle(),
            }),
        }
    }

    pub fn selector(&self) -> &WindowSelector {
        &self.selector
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub async fn state(&self) -> RefreshState {
        self.slot.read().await.state.clone()
    }

    pub async fn status(&self) -> StatusIndicators {
        self.slot.read().await.status.clone()
    }

    /// First load when the dashboard comes up.
    pub async fn mount(&self) -> RefreshState {
        self.trigger(RefreshTrigger::Initial).await
    }

    /// Manual refresh button.
    pub async fn refresh(&self) -> RefreshState {
        self.trigger(RefreshTrigger::Manual).await
    }

    pub async fn select_window(&self, window_id: &str) -> RefreshState {
        let ticket = self.selector.issue(Some(window_id));
        self.run(RefreshTrigger::WindowChanged, ticket).await
    }

    /// Run one refresh cycle for the current window.
    ///
    /// Returns the state after the cycle. If a newer refresh started in the
    /// meantime, this cycle's result is dropped and the newer state returned.
    pub async fn trigger(&self, trigger: RefreshTrigger) -> RefreshState {
        let ticket = self.selector.issue(None);
        self.run(trigger, ticket).await
    }

    async fn run(&self, trigger: RefreshTrigger, ticket: RefreshTicket) -> RefreshState {
        let RefreshTicket { window_id, token } = ticket;
        let attempted_at = Utc::now();
        tracing::info!(
            "Refresh #{} ({:?}) for window '{}' from {}",
            token,
            trigger,
            window_id,
            self.source.name()
        );

        if !self.begin(token, &window_id, attempted_at).await {
            return self.state().await;
        }

        let outcome = self.load(&window_id).await;
        self.commit(token, window_id, attempted_at, outcome).await
    }

    fn is_current(&self, token: u64) -> bool {
        self.selector.is_latest(token)
    }

    async fn begin(&self, token: u64, window_id: &str, attempted_at: DateTime<Utc>) -> bool {
        let mut slot = self.slot.write().await;
        if !self.is_current(token) {
            return false;
        }

        // Tear down the previous chart before anything new is built
        self.renderer.clear();
        slot.state = RefreshState::Loading {
            window_id: window_id.to_string(),
        };
        slot.status = StatusIndicators::loading(attempted_at);
        self.renderer.update_status(&slot.status);
        true
    }

    async fn load(
        &self,
        window_id: &str,
    ) -> Result<(BuildOutcome, Option<DateTime<Utc>>), DashboardError> {
        if window_id.trim().is_empty() {
            return Err(FetchError::MissingWindow.into());
        }
        let payload = self.source.fetch(window_id).await?;
        let outcome = self.builder.build(&payload.body)?;
        Ok((outcome, payload.last_modified))
    }

    async fn commit(
        &self,
        token: u64,
        window_id: String,
        attempted_at: DateTime<Utc>,
        outcome: Result<(BuildOutcome, Option<DateTime<Utc>>), DashboardError>,
    ) -> RefreshState {
        let mut slot = self.slot.write().await;
        if !self.is_current(token) {
            tracing::warn!(
                "Discarding stale result of refresh #{} for window '{}'",
                token,
                window_id
            );
            return slot.state.clone();
        }

        let state = match outcome {
            Ok((BuildOutcome::Ready(report), last_modified)) => {
                slot.status = StatusIndicators::ready(
                    report.window.as_ref(),
                    last_modified.unwrap_or(attempted_at),
                    attempted_at,
                );
                self.renderer.draw(&window_id, &report);
                RefreshState::Success { window_id, report }
            }
            Ok((BuildOutcome::Empty, last_modified)) => {
                slot.status =
                    StatusIndicators::empty(last_modified.unwrap_or(attempted_at), attempted_at);
                self.renderer.show_empty(&window_id);
                RefreshState::Empty { window_id }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!("Refresh #{} for window '{}' failed: {}", token, window_id, message);
                slot.status = StatusIndicators::failed(attempted_at);
                self.renderer.show_error(&message);
                RefreshState::Error { window_id, message }
            }
        };

        self.renderer.update_status(&slot.status);
        slot.state = state.clone();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FetchedPayload, HttpCostSource};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone)]
    enum Scripted {
        Body(Value),
        Status(u16, &'static str),
    }

    /// Answers per window id after an optional delay.
    struct ScriptedSource {
        script: HashMap<String, (Duration, Scripted)>,
    }

    impl ScriptedSource {
        fn new(entries: Vec<(&str, Duration, Scripted)>) -> Self {
            Self {
                script: entries
                    .into_iter()
                    .map(|(id, delay, reply)| (id.to_string(), (delay, reply)))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl CostSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, window_id: &str) -> Result<FetchedPayload, FetchError> {
            let (delay, reply) = self
                .script
                .get(window_id)
                .cloned()
                .unwrap_or((Duration::ZERO, Scripted::Status(404, "unknown window")));
            tokio::time::sleep(delay).await;
            match reply {
                Scripted::Body(body) => Ok(FetchedPayload {
                    body,
                    last_modified: None,
                }),
                Scripted::Status(status, message) => Err(FetchError::Http {
                    status,
                    message: message.to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        events: Mutex<Vec<String>>,
    }

    impl RecordingRenderer {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Renderer for RecordingRenderer {
        fn clear(&self) {
            self.push("clear".to_string());
        }

        fn draw(&self, window_id: &str, report: &CostReport) {
            self.push(format!("draw:{}:{}", window_id, report.dataset.labels.join(",")));
        }

        fn show_empty(&self, window_id: &str) {
            self.push(format!("empty:{window_id}"));
        }

        fn show_error(&self, message: &str) {
            self.push(format!("error:{message}"));
        }

        fn update_status(&self, status: &StatusIndicators) {
            self.push(format!("status:{}", status.window_start));
        }
    }

    fn records(namespaces: &[&str]) -> Value {
        let window = json!({ "start": "2024-01-01T00:00:00Z", "end": "2024-01-02T00:00:00Z" });
        Value::Array(
            namespaces
                .iter()
                .map(|ns| json!({ "namespace": ns, "totalCost": 1.0, "window": window }))
                .collect(),
        )
    }

    fn dashboard(
        source: ScriptedSource,
        initial: &str,
    ) -> (Arc<Dashboard>, Arc<RecordingRenderer>) {
        let renderer = Arc::new(RecordingRenderer::default());
        let dashboard = Dashboard::new(
            Arc::new(source),
            DatasetBuilder::default(),
            renderer.clone(),
            initial,
        );
        (Arc::new(dashboard), renderer)
    }

    #[tokio::test]
    async fn starts_idle() {
        let (dashboard, renderer) = dashboard(ScriptedSource::new(vec![]), "24h");
        assert_eq!(dashboard.state().await, RefreshState::Idle);
        assert_eq!(dashboard.status().await, StatusIndicators::idle());
        assert!(renderer.events().is_empty());
    }

    #[tokio::test]
    async fn success_clears_before_drawing() {
        let source = ScriptedSource::new(vec![(
            "24h",
            Duration::ZERO,
            Scripted::Body(records(&["ns1-us1", "billing-core"])),
        )]);
        let (dashboard, renderer) = dashboard(source, "24h");

        let state = dashboard.mount().await;
        assert_eq!(state.label(), "success");
        assert_eq!(state.report().unwrap().dataset.labels, vec!["us1", "system"]);
        assert_eq!(
            renderer.events(),
            vec![
                "clear".to_string(),
                format!("status:{LOADING}"),
                "draw:24h:us1,system".to_string(),
                format!("status:{}", format_timestamp(&"2024-01-01T00:00:00Z".parse().unwrap())),
            ]
        );
    }

    #[tokio::test]
    async fn every_trigger_tears_down_previous_chart() {
        let source = ScriptedSource::new(vec![
            ("24h", Duration::ZERO, Scripted::Body(records(&["ns1-us1"]))),
            ("7d", Duration::ZERO, Scripted::Body(json!({}))),
        ]);
        let (dashboard, renderer) = dashboard(source, "24h");

        dashboard.mount().await;
        dashboard.refresh().await;
        let state = dashboard.select_window("7d").await;

        assert_eq!(state, RefreshState::Empty { window_id: "7d".to_string() });
        let events = renderer.events();
        assert_eq!(events.iter().filter(|e| *e == "clear").count(), 3);
        assert_eq!(events.last().unwrap(), &format!("status:{NOT_AVAILABLE}"));
        assert!(events.contains(&"empty:7d".to_string()));
    }

    #[tokio::test]
    async fn errors_are_reported_and_retry_works() {
        let source = ScriptedSource::new(vec![
            ("24h", Duration::ZERO, Scripted::Status(500, "db unavailable")),
            ("7d", Duration::ZERO, Scripted::Body(records(&["ns1-us1"]))),
        ]);
        let (dashboard, renderer) = dashboard(source, "24h");

        let state = dashboard.mount().await;
        let RefreshState::Error { message, .. } = &state else {
            panic!("expected error state, got {state:?}");
        };
        assert!(message.contains("500"));
        assert!(message.contains("db unavailable"));

        let status = dashboard.status().await;
        assert_eq!(status.last_updated, ERROR);
        assert_ne!(status.last_attempted, NOT_AVAILABLE);
        assert!(renderer.events().iter().any(|e| e.starts_with("error:HTTP error 500")));

        let state = dashboard.select_window("7d").await;
        assert_eq!(state.label(), "success");
    }

    #[tokio::test]
    async fn schema_errors_become_error_state() {
        let source = ScriptedSource::new(vec![("24h", Duration::ZERO, Scripted::Body(json!("oops")))]);
        let (dashboard, _renderer) = dashboard(source, "24h");

        let state = dashboard.refresh().await;
        assert_eq!(state.label(), "error");
        assert!(dashboard.state().await.is_settled());
    }

    #[tokio::test]
    async fn empty_selection_never_reaches_source() {
        let (dashboard, renderer) = dashboard(ScriptedSource::new(vec![]), "");

        let state = dashboard.mount().await;
        assert_eq!(
            state,
            RefreshState::Error {
                window_id: String::new(),
                message: FetchError::MissingWindow.to_string(),
            }
        );
        assert!(renderer.events().contains(&"clear".to_string()));
    }

    #[tokio::test]
    async fn slow_stale_response_never_overwrites_newer_one() {
        let source = ScriptedSource::new(vec![
            ("30d", Duration::from_millis(400), Scripted::Body(records(&["ns1-us1"]))),
            ("1h", Duration::from_millis(10), Scripted::Body(records(&["ns2-us2"]))),
        ]);
        let (dashboard, renderer) = dashboard(source, "24h");

        let slow = {
            let dashboard = dashboard.clone();
            tokio::spawn(async move { dashboard.select_window("30d").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = dashboard.select_window("1h").await;
        assert_eq!(fast.window_id(), Some("1h"));

        let slow_result = slow.await.unwrap();
        assert_eq!(slow_result.window_id(), Some("1h"));
        assert_eq!(dashboard.state().await.window_id(), Some("1h"));

        let draws: Vec<String> = renderer
            .events()
            .into_iter()
            .filter(|e| e.starts_with("draw:"))
            .collect();
        assert_eq!(draws, vec!["draw:1h:us2".to_string()]);
    }

    #[tokio::test]
    async fn missing_window_shows_not_available_and_still_draws() {
        let body = json!([
            { "namespace": "ns1-us1", "totalCost": 5 },
            {
                "namespace": "ns2-us2",
                "totalCost": 2,
                "window": { "start": "2024-01-01T00:00:00Z", "end": "2024-01-02T00:00:00Z" }
            },
        ]);
        let source = ScriptedSource::new(vec![("24h", Duration::ZERO, Scripted::Body(body))]);
        let (dashboard, renderer) = dashboard(source, "24h");

        let state = dashboard.mount().await;
        assert_eq!(state.label(), "success");
        assert!(renderer.events().contains(&"draw:24h:us1,us2".to_string()));

        let status = dashboard.status().await;
        assert_eq!(status.window_start, NOT_AVAILABLE);
        assert_eq!(status.window_end, NOT_AVAILABLE);
        assert_ne!(status.last_updated, NOT_AVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selections_settle_on_the_last_selected_window() {
        let windows: Vec<String> = (0..16).map(|i| format!("{i}h")).collect();
        let source = ScriptedSource::new(
            windows
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    (
                        id.as_str(),
                        Duration::from_millis((i as u64 * 7) % 30),
                        Scripted::Body(records(&["ns1-us1"])),
                    )
                })
                .collect(),
        );
        let (dashboard, renderer) = dashboard(source, "24h");

        let tasks: Vec<_> = windows
            .iter()
            .cloned()
            .map(|id| {
                let dashboard = dashboard.clone();
                tokio::spawn(async move { dashboard.select_window(&id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let selected = dashboard.selector().current();
        let state = dashboard.state().await;
        assert_eq!(state.label(), "success");
        assert_eq!(state.window_id(), Some(selected.as_str()));

        let draws: Vec<String> = renderer
            .events()
            .into_iter()
            .filter(|e| e.starts_with("draw:"))
            .collect();
        assert_eq!(draws.last(), Some(&format!("draw:{selected}:us1")));
    }

    #[tokio::test]
    async fn http_failure_scenario_end_to_end() {
        use axum::http::StatusCode;
        use axum::routing::get;
        use axum::Router;

        let app = Router::new().route(
            "/getcost",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "db unavailable") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _h = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let base = url::Url::parse(&format!("http://{}:{}/getcost", addr.ip(), addr.port())).unwrap();
        let source = HttpCostSource::new(base, Duration::from_secs(5));
        let dashboard = Dashboard::new(
            Arc::new(source),
            DatasetBuilder::default(),
            Arc::new(TracingRenderer),
            "24h",
        );

        match dashboard.mount().await {
            RefreshState::Error { message, .. } => {
                assert!(message.contains("500"));
                assert!(message.contains("db unavailable"));
            }
            other => panic!("expected error state, got {other:?}"),
        }
    }
}
