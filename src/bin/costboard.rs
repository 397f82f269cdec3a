use std::path::PathBuf;
use std::sync::Arc;

use costboard_lib::aggregation::{CostReport, DatasetBuilder};
use costboard_lib::config::DashboardSettings;
use costboard_lib::dashboard::{
    format_timestamp, Dashboard, RefreshState, RefreshTrigger, TracingRenderer, NOT_AVAILABLE,
};
use costboard_lib::sources::{CostSource, FileCostSource, HttpCostSource};
use costboard_lib::{debug_settings, init_logging};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Default)]
struct CliArgs {
    command: String,
    format: Option<OutputFormat>,
    window: Option<String>,
    url: Option<String>,
    file: Option<PathBuf>,
    config: Option<PathBuf>,
    pretty: bool,
    log_file: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserSummary {
    user: String,
    total_cost: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowPayload<'a> {
    window_id: &'a str,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a CostReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    users: Vec<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grand_total: Option<f64>,
    last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[tokio::main]
async fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("costboard {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    init_logging();

    let result = match args.command.as_str() {
        "show" => run_show(args).await,
        "chart" => run_chart(args).await,
        "summary" => run_summary(args).await,
        "watch" => run_watch(args).await,
        _ => Err(anyhow::anyhow!(
            "Unknown command: {}. Use --help for usage.",
            args.command
        )),
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut args = CliArgs::default();

    if let Some(first) = argv.first() {
        if !first.starts_with('-') {
            args.command = argv.remove(0);
        }
    }

    if args.command.is_empty() {
        args.command = "show".to_string();
    }

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                args.format = match iter.next().as_deref() {
                    Some("json") => Some(OutputFormat::Json),
                    Some("text") => Some(OutputFormat::Text),
                    _ => args.format,
                }
            }
            "--json" => args.format = Some(OutputFormat::Json),
            "--pretty" => args.pretty = true,
            "--window" | "-w" => args.window = iter.next(),
            "--url" => args.url = iter.next(),
            "--file" => args.file = iter.next().map(PathBuf::from),
            "--config" => args.config = iter.next().map(PathBuf::from),
            "--log-file" => args.log_file = true,
            "--help" | "-h" | "--version" | "-V" => {
                args.command = arg;
                break;
            }
            _ => {}
        }
    }

    args
}

fn load_settings(args: &CliArgs) -> anyhow::Result<DashboardSettings> {
    let mut settings = DashboardSettings::load(args.config.as_deref())?;
    if let Some(url) = &args.url {
        settings.base_url = url.clone();
        settings.validate()?;
    }
    if let Some(window) = &args.window {
        settings.default_window = window.clone();
    }
    if args.log_file || settings.file_logging {
        debug_settings::set_file_logging(true);
        if let Some(path) = debug_settings::debug_log_path() {
            tracing::debug!("Writing debug log to {}", path.display());
        }
    }
    Ok(settings)
}

fn build_dashboard(args: &CliArgs, settings: &DashboardSettings) -> anyhow::Result<Dashboard> {
    let source: Arc<dyn CostSource> = match &args.file {
        Some(path) => Arc::new(FileCostSource::new(path)),
        None => Arc::new(HttpCostSource::from_settings(settings)?),
    };
    let builder = DatasetBuilder::new(settings.owner_resolver()?);
    Ok(Dashboard::new(
        source,
        builder,
        Arc::new(TracingRenderer),
        settings.default_window.clone(),
    ))
}

async fn run_show(args: CliArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args)?;
    let dashboard = build_dashboard(&args, &settings)?;
    let state = dashboard.mount().await;
    let format = args.format.unwrap_or(OutputFormat::Text);
    print_state(&dashboard, &state, format, args.pretty).await?;

    match state {
        RefreshState::Error { message, .. } => Err(anyhow::anyhow!("Error loading data: {message}")),
        _ => Ok(()),
    }
}

async fn run_chart(args: CliArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args)?;
    let dashboard = build_dashboard(&args, &settings)?;

    match dashboard.mount().await {
        RefreshState::Success { window_id, report } => {
            print_json(&report.dataset.to_chart_config(&window_id), args.pretty)
        }
        RefreshState::Empty { window_id } => Err(anyhow::anyhow!(
            "No data available for the selected window ({window_id})."
        )),
        RefreshState::Error { message, .. } => Err(anyhow::anyhow!("Error loading data: {message}")),
        other => Err(anyhow::anyhow!("Unexpected state: {}", other.label())),
    }
}

async fn run_summary(args: CliArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args)?;
    let dashboard = build_dashboard(&args, &settings)?;

    match dashboard.mount().await {
        RefreshState::Success { report, .. } => print_json(
            &report.matrix.to_grouped_summary(report.window.as_ref()),
            args.pretty,
        ),
        RefreshState::Empty { .. } => print_json(&serde_json::json!({}), args.pretty),
        RefreshState::Error { message, .. } => Err(anyhow::anyhow!("Error loading data: {message}")),
        other => Err(anyhow::anyhow!("Unexpected state: {}", other.label())),
    }
}

async fn run_watch(args: CliArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args)?;
    let dashboard = build_dashboard(&args, &settings)?;
    let format = args.format.unwrap_or(OutputFormat::Text);
    let mut interval = tokio::time::interval(settings.refresh_interval());
    let mut trigger = RefreshTrigger::Initial;

    tracing::info!(
        "Watching window '{}' every {}s (Ctrl+C to stop)",
        settings.default_window,
        settings.refresh_interval().as_secs()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let state = dashboard.trigger(trigger).await;
                trigger = RefreshTrigger::Scheduled;
                // Errors are shown and the next tick retries
                print_state(&dashboard, &state, format, args.pretty).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                return Ok(());
            }
        }
    }
}

async fn print_state(
    dashboard: &Dashboard,
    state: &RefreshState,
    format: OutputFormat,
    pretty: bool,
) -> anyhow::Result<()> {
    let status = dashboard.status().await;
    let window_id = state.window_id().unwrap_or_default();

    match format {
        OutputFormat::Text => {
            println!(
                "{}",
                render_text(dashboard.source_name(), window_id, state, &status.last_updated)
            );
            Ok(())
        }
        OutputFormat::Json => {
            let (users, grand_total) = match state.report() {
                Some(report) => (
                    report
                        .matrix
                        .users()
                        .map(|user| UserSummary {
                            user: user.to_string(),
                            total_cost: report.matrix.user_total(user),
                        })
                        .collect(),
                    Some(report.matrix.grand_total()),
                ),
                None => (Vec::new(), None),
            };
            let payload = ShowPayload {
                window_id,
                state: state.label(),
                report: state.report(),
                users,
                grand_total,
                last_updated: status.last_updated,
                error: match state {
                    RefreshState::Error { message, .. } => Some(message.as_str()),
                    _ => None,
                },
            };
            print_json(&payload, pretty)
        }
    }
}

fn render_text(source: &str, window_id: &str, state: &RefreshState, last_updated: &str) -> String {
    let mut lines = Vec::new();
    lines.push(format!("== User Cost Breakdown (Window: {window_id}) =="));
    lines.push(format!("Source: {source}"));

    match state {
        RefreshState::Success { report, .. } => {
            let (start, end) = match &report.window {
                Some(window) => (format_timestamp(&window.start), format_timestamp(&window.end)),
                None => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
            };
            lines.push(format!("Window: {start} → {end}"));
            let matrix = &report.matrix;
            let totals = report.dataset.totals();
            for (user, total) in report.dataset.labels.iter().zip(totals) {
                lines.push(format!("{user}: {}", format_usd(total)));
                for series in &report.dataset.series {
                    if let Some(cost) = matrix.cost(user, &series.series_label) {
                        lines.push(format!("  {} {}", series.series_label, format_usd(cost)));
                    }
                }
            }
            lines.push(format!("Total: {}", format_usd(matrix.grand_total())));
        }
        RefreshState::Empty { .. } => {
            lines.push("No data available for the selected window.".to_string());
        }
        RefreshState::Error { message, .. } => {
            lines.push(format!("Error loading data: {message}"));
        }
        RefreshState::Idle | RefreshState::Loading { .. } => {
            lines.push("Loading...".to_string());
        }
    }

    lines.push(format!("Last updated: {last_updated}"));
    lines.join("\n")
}

fn format_usd(amount: f64) -> String {
    format!("${:.2}", amount)
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> anyhow::Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }?;
    println!("{output}");
    Ok(())
}

fn print_help() {
    println!(
        "costboard {}\n\nUsage:\n  costboard show [--window <id>] [--format text|json] [--pretty]\n  costboard chart [--window <id>] [--pretty]\n  costboard summary [--window <id>] [--pretty]\n  costboard watch [--window <id>] [--format text|json]\n\nCommands:\n  show     Fetch one window and print the per-user breakdown\n  chart    Print a stacked bar chart config as JSON\n  summary  Print costs regrouped by user (namespaces, totalCost, window)\n  watch    Refresh periodically until interrupted\n\nFlags:\n  -w, --window <id>     Reporting window (e.g. 24h, 7d)\n  --url <url>           Cost API endpoint\n  --file <path>         Read a cost document from disk instead\n  --config <path>       Settings file\n  --format <text|json>  Output format\n  --json                Shortcut for --format json\n  --pretty              Pretty-print JSON output\n  --log-file            Also write the debug log to the data directory\n  -h, --help            Show help\n  -V, --version         Show version",
        env!("CARGO_PKG_VERSION")
    );
}
