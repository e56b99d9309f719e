//! famfin-core - real-time event bus client and access gate
//!
//! Connects to the family-finance event stream, logs every delivered
//! envelope and reports bus metrics. The `route` subcommand evaluates one
//! access decision against the configured route table.
//!
//! Module structure:
//! - `domain/` - Envelopes, event types, sessions and route decisions
//! - `io/` - Transport seam and WebSocket transport
//! - `services/` - EventBus, AccessGate, RouteGuard
//! - `infra/` - Config, Metrics

use clap::{Parser, Subcommand};
use famfin_core::domain::{EventEnvelope, EventType, Role, RouteDecision, Session};
use famfin_core::infra::{BusMetrics, Config};
use famfin_core::io::WebSocketTransport;
use famfin_core::services::{AccessGate, EventBus, Navigator, RouteGuard, RouteTable, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// famfin-core - event stream client for the family-finance dashboards
#[derive(Parser, Debug)]
#[command(name = "famfin-core", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the event stream and log delivered envelopes (default)
    Listen,
    /// Evaluate the access decision for one path
    Route {
        /// Requested path, e.g. /dashboard/kids/goals
        #[arg(long)]
        path: String,

        /// Session role: parent or kid (anything else is treated as invalid)
        #[arg(long)]
        role: Option<String>,

        /// Evaluate as a signed-out visitor
        #[arg(long)]
        anonymous: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides, default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    match args.command.unwrap_or(Command::Listen) {
        Command::Listen => listen(config).await,
        Command::Route { path, role, anonymous } => {
            route(&config, &path, role.as_deref(), anonymous);
            Ok(())
        }
    }
}

/// Prints redirects instead of performing them
struct StdoutNavigator;

impl Navigator for StdoutNavigator {
    fn redirect(&self, location: &str) {
        println!("redirect {}", location);
    }
}

fn route(config: &Config, path: &str, role: Option<&str>, anonymous: bool) {
    let session = if anonymous {
        Session::anonymous()
    } else {
        Session::authenticated(role.and_then(Role::parse))
    };

    let gate = AccessGate::new(RouteTable::from_config(config));
    let guard = RouteGuard::new(gate, session, StdoutNavigator);
    match guard.guard(path) {
        RouteDecision::Allow => println!("allow {}", path),
        RouteDecision::Redirect(redirect) => println!("reason {}", redirect.reason.as_str()),
    }
}

async fn listen(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        git_hash = %env!("GIT_HASH"),
        profile = %env!("BUILD_PROFILE"),
        "famfin-core starting"
    );
    info!(
        config_file = %config.config_file(),
        stream_url = %config.stream_url(),
        reconnect_delay_ms = %config.reconnect_delay_ms(),
        connect_timeout_ms = %config.connect_timeout_ms(),
        extension_types = ?config.extension_types(),
        "config_loaded"
    );

    let transport = Arc::new(WebSocketTransport::new(
        config.stream_url(),
        Duration::from_millis(config.connect_timeout_ms()),
    ));
    let metrics = Arc::new(BusMetrics::new());
    let bus = Arc::new(EventBus::from_config(&config, transport, metrics.clone()));

    // One logging subscriber per known type; handles live until shutdown
    let extensions = config.extension_types().iter().cloned().map(EventType::Extension);
    let subscriptions: Vec<Subscription> = EventType::BUILTIN
        .iter()
        .cloned()
        .chain(extensions)
        .filter(|event_type| bus.registry().resolve(event_type.as_str()).is_some())
        .map(|event_type| bus.subscribe(event_type, log_envelope))
        .collect();
    info!(subscriptions = %subscriptions.len(), "subscribers_registered");

    bus.connect();

    let metrics_interval = config.metrics_interval_secs();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics.report().log();
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown_signal_received");

    reporter.abort();
    bus.disconnect().await;
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    bus.metrics().report().log();

    info!("famfin-core shutdown complete");
    Ok(())
}

fn log_envelope(envelope: &EventEnvelope) -> anyhow::Result<()> {
    let action = envelope.payload.get("action").and_then(|v| v.as_str()).unwrap_or("-");
    info!(
        event_type = %envelope.event_type,
        action = %action,
        timestamp = %envelope.timestamp,
        source = %envelope.source.as_deref().unwrap_or("-"),
        "envelope_received"
    );
    Ok(())
}
