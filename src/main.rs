use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chubwatch::config::{SinkKind, DEFAULT_CONFIG_FILE};
use chubwatch::data::uptime::{breakdown_lines, clamp_days, summary_line, DEFAULT_DAYS};
use chubwatch::{
    AlertSink, AlertTarget, CycleOutcome, DisplaySink, FileSource, HttpSource, LogSink, Poller,
    ScopeConfig, ScopeId, Settings, SqliteStore, StatusSource, Store, WebhookSink,
};
use chubwatch_adapters::chub::ChubAdapter;
use chubwatch_types::DEFAULT_SUBSCRIPTION_MARKER;

#[derive(Parser, Debug)]
#[command(name = "chubwatch", version)]
#[command(about = "Status tracking and outage alerting for the Chub.ai model fleet")]
struct Args {
    /// Path to the settings file (optional; environment variables override it)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore persisted state, then poll the status source
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,

        /// Read the status payload from a local JSON file instead of HTTP
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Inspect and change scope configuration
    #[command(subcommand)]
    Scope(ScopeCommand),

    /// Show uptime statistics from the sample log
    Uptime {
        /// Only report this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Size of the window in days (1-90)
        #[arg(short, long, default_value_t = DEFAULT_DAYS)]
        days: u32,
    },

    /// Delete samples older than the retention window
    Purge,
}

#[derive(Subcommand, Debug)]
enum ScopeCommand {
    /// List configured scopes
    List,

    /// Show a scope's configuration and alert states
    Show { scope: String },

    /// Render the live status view for a scope to a sink
    Display { scope: String, sink: String },

    /// Send outage alerts for a scope to a sink, mentioning an audience
    Alerts {
        scope: String,
        sink: String,
        audience: String,

        /// Marker users react with to subscribe
        #[arg(long, default_value = DEFAULT_SUBSCRIPTION_MARKER)]
        marker: String,
    },

    /// Stop alerting a scope and forget its alert states
    ClearAlerts { scope: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;
    init_tracing(&settings.logging.filter);

    match args.command {
        Command::Run { once, file } => run(&settings, once, file).await,
        Command::Scope(command) => scope(&settings, command),
        Command::Uptime { entity, days } => uptime(&settings, entity, days),
        Command::Purge => {
            let store = open_store(&settings)?;
            let deleted = store
                .purge_samples_older_than(settings.database.retention)
                .context("Failed to purge samples")?;
            println!("Deleted {} samples", deleted);
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::open(&settings.database.path)
        .with_context(|| format!("Failed to open database {}", settings.database.path.display()))
}

fn sinks(settings: &Settings) -> Result<(Arc<dyn DisplaySink>, Arc<dyn AlertSink>)> {
    let style = settings.sink.style();
    match settings.sink.kind {
        SinkKind::Log => {
            let sink = Arc::new(LogSink::new(style));
            let display: Arc<dyn DisplaySink> = sink.clone();
            let alerts: Arc<dyn AlertSink> = sink;
            Ok((display, alerts))
        }
        SinkKind::Webhook => {
            let sink = Arc::new(
                WebhookSink::new(style, settings.status.fetch_timeout)
                    .context("Failed to build webhook client")?,
            );
            let display: Arc<dyn DisplaySink> = sink.clone();
            let alerts: Arc<dyn AlertSink> = sink;
            Ok((display, alerts))
        }
    }
}

async fn run(settings: &Settings, once: bool, file: Option<PathBuf>) -> Result<()> {
    let store = Arc::new(open_store(settings)?);

    let source: Box<dyn StatusSource> = match file {
        Some(path) => Box::new(FileSource::new(path, settings.status.entities.clone())),
        None => {
            let adapter = ChubAdapter::builder()
                .endpoint(settings.status.endpoint.clone())
                .entities(settings.status.entities.clone())
                .timeout(settings.status.fetch_timeout)
                .build()
                .context("Failed to build HTTP client")?;
            Box::new(HttpSource::new(adapter))
        }
    };

    let (display, alerts) = sinks(settings)?;
    let mut poller = Poller::restore(settings.poller_options(), source, store, display, alerts)
        .context("Failed to restore persisted state")?;

    if once {
        match poller.run_cycle().await {
            CycleOutcome::Processed(report) => println!(
                "Processed snapshot {}: {} views rendered, {} alerts sent, {} failures",
                report.timestamp_ms,
                report.rendered,
                report.dispatched,
                report.render_failures + report.dispatch_failures
            ),
            CycleOutcome::Stale { timestamp_ms } => {
                println!("Snapshot {} was already processed", timestamp_ms)
            }
            CycleOutcome::Unchanged => println!("Status unchanged"),
            CycleOutcome::FetchFailed => println!("No status could be fetched"),
        }
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(poller.run(stop_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    let _ = stop_tx.send(true);
    handle.await.context("Poll task failed")?;
    Ok(())
}

fn scope(settings: &Settings, command: ScopeCommand) -> Result<()> {
    let store = open_store(settings)?;

    match command {
        ScopeCommand::List => {
            let scopes = store.list_scopes()?;
            if scopes.is_empty() {
                println!("No scopes configured");
            }
            for scope in scopes {
                println!(
                    "{}  display: {}  alerts: {}",
                    scope.id,
                    scope.display.as_ref().map_or("-", |d| d.sink.as_str()),
                    scope.alerts.as_ref().map_or("-", |a| a.sink.as_str()),
                );
            }
        }
        ScopeCommand::Show { scope } => {
            let id = ScopeId::from(scope);
            let config = store.get_scope(&id)?.unwrap_or_else(|| ScopeConfig::new(id.clone()));
            print_scope(&store, settings, &config)?;
        }
        ScopeCommand::Display { scope, sink } => {
            let id = ScopeId::from(scope);
            store.set_display(&id, &sink)?;
            println!("Status view for {} will be rendered to {}", id, sink);
        }
        ScopeCommand::Alerts {
            scope,
            sink,
            audience,
            marker,
        } => {
            let id = ScopeId::from(scope);
            let target = AlertTarget {
                sink,
                audience,
                marker,
            };
            store.set_alerts(&id, &target)?;
            println!("Outage alerts for {} will be sent to {} ({})", id, target.sink, target.audience);
        }
        ScopeCommand::ClearAlerts { scope } => {
            let id = ScopeId::from(scope);
            store.clear_alerts(&id)?;
            println!("Outage alerts disabled for {}", id);
        }
    }
    Ok(())
}

fn print_scope(store: &SqliteStore, settings: &Settings, config: &ScopeConfig) -> Result<()> {
    println!("Scope {}", config.id);
    match &config.display {
        Some(display) => println!(
            "  Status view: {} (message: {})",
            display.sink,
            display.message.as_deref().unwrap_or("not created yet")
        ),
        None => println!("  Status view: not configured"),
    }

    let Some(alerts) = &config.alerts else {
        println!("  Alerts: not configured");
        return Ok(());
    };
    println!(
        "  Alerts: {} mentioning {} (subscribe with {})",
        alerts.sink, alerts.audience, alerts.marker
    );
    for entity in &settings.status.entities {
        if let Some(state) = store.get_alert_state(&config.id, entity)? {
            println!(
                "    {:<10} {:<8} down {} / healthy {}",
                entity,
                if state.is_active { "OUTAGE" } else { "ok" },
                state.consecutive_down,
                state.consecutive_healthy
            );
        }
    }
    Ok(())
}

fn uptime(settings: &Settings, entity: Option<String>, days: u32) -> Result<()> {
    let store = open_store(settings)?;
    let days = clamp_days(days);
    let window = Duration::from_secs(u64::from(days) * 24 * 60 * 60);

    let entities = match entity {
        Some(entity) => vec![entity],
        None => store.logged_entities()?,
    };
    if entities.is_empty() {
        println!("No samples logged yet");
        return Ok(());
    }

    println!("Uptime over the last {} day{}", days, if days == 1 { "" } else { "s" });
    for entity in entities {
        let stats = store.uptime(&entity, window)?;
        if stats.is_empty() {
            println!("{:<10} no samples", entity);
            continue;
        }
        println!("{:<10} {}", entity, summary_line(&stats));
        for line in breakdown_lines(&stats) {
            println!("           {}", line);
        }
    }
    Ok(())
}
