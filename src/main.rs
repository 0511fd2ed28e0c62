//! CLI entry point for the MTA realtime feed service.
//!
//! Each subcommand runs one feed operation and prints its JSON result, or the
//! `{"error": ...}` payload when the operation fails.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mta_realtime::{
    catalog::Category,
    config::AppConfig,
    error::ServiceError,
    fetch::HttpClient,
    output::render,
    service::FeedService,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "mta_realtime")]
#[command(about = "Decode and cache MTA realtime feeds", long_about = None)]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List feed ids for every category
    ListFeeds,
    /// List subway feed ids with their source URLs
    SubwayFeeds,
    /// Fetch a subway feed (e.g. "ace", "num_s")
    Subway { feed_id: String },
    /// Fetch a Long Island Rail Road feed
    Lirr { feed_id: String },
    /// Fetch a Metro-North feed
    Mnr { feed_id: String },
    /// Fetch a service alert feed (e.g. "subway_alerts")
    Alerts { alert_type: String },
    /// Fetch an elevator/escalator document ("current", "upcoming", "equipment")
    Accessibility { data_type: String },
    /// Elevator/escalator equipment at one station
    Station { station_id: String },
    /// Re-request a feed on an interval through one service, exercising the cache
    Watch {
        /// Feed category (subway, lirr, mnr, alerts, accessibility)
        category: Category,

        feed_id: String,

        /// Seconds between requests
        #[arg(short, long, default_value_t = 10)]
        interval: u64,

        /// Number of requests to issue (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Logging setup: colored stderr + JSON rolling log file
    let log_dir = Path::new(&config.log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&config.log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("mta_realtime.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let service = config.build_service()?;
    let pretty = cli.pretty;

    match cli.command {
        Commands::ListFeeds => emit(&Ok(service.list_feeds()), pretty)?,
        Commands::SubwayFeeds => emit(&Ok(service.list_subway_feeds()), pretty)?,
        Commands::Subway { feed_id } => emit(&service.get_subway_feed(&feed_id).await, pretty)?,
        Commands::Lirr { feed_id } => emit(&service.get_lirr_feed(&feed_id).await, pretty)?,
        Commands::Mnr { feed_id } => emit(&service.get_mnr_feed(&feed_id).await, pretty)?,
        Commands::Alerts { alert_type } => {
            emit(&service.get_service_alerts(&alert_type).await, pretty)?
        }
        Commands::Accessibility { data_type } => {
            emit(&service.get_accessibility_data(&data_type).await, pretty)?
        }
        Commands::Station { station_id } => {
            emit(&service.get_station_accessibility(&station_id).await, pretty)?
        }
        Commands::Watch {
            category,
            feed_id,
            interval,
            count,
        } => watch(&service, category, &feed_id, interval, count).await,
    }

    Ok(())
}

fn emit<T: Serialize>(result: &Result<T, ServiceError>, pretty: bool) -> Result<()> {
    println!("{}", render(result, pretty)?);
    Ok(())
}

/// Requests one feed repeatedly and logs a summary of each round. Requests
/// inside the feed's cache window are served without touching the network.
#[tracing::instrument(skip(service, category), fields(category = %category))]
async fn watch<C: HttpClient>(
    service: &FeedService<C>,
    category: Category,
    feed_id: &str,
    interval: u64,
    count: usize,
) {
    let timeout = service.catalog().timeout_secs(category, feed_id);
    info!(timeout_secs = timeout, interval, "Watching feed");

    let mut round = 0;
    loop {
        if count > 0 && round >= count {
            break;
        }
        round += 1;

        let started = std::time::Instant::now();
        let outcome = match category {
            Category::Accessibility => service
                .get_accessibility_data(feed_id)
                .await
                .map(|_| 0),
            _ => service
                .fetch(category, feed_id)
                .await
                .map(|feed| feed.entities.len()),
        };

        match outcome {
            Ok(entities) => info!(
                round,
                entities,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Feed ready"
            ),
            Err(e) => warn!(round, error = %e, "Feed request failed"),
        }

        if count == 0 || round < count {
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    }

    let stats = service.cache_stats();
    info!(total_keys = stats.total_keys, keys = ?stats.keys, "Cache contents");
}
