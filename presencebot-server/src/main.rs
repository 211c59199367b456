use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use presencebot_core::cache::ImageCache;
use presencebot_core::platforms::discord::{validate_token, DiscordImageResolver, DiscordTransportFactory};
use presencebot_core::repositories::JsonStores;
use presencebot_core::samplers::SystemSampler;
use presencebot_core::services::{ManagerSettings, ManagerStores, SessionManager};
use presencebot_core::session::{SessionDeps, SessionTimings, DEFAULT_APPLICATION_ID};
use presencebot_core::tasks::autostart::run_autostart;
use presencebot_core::tasks::health_sweep::spawn_health_sweep_task;
use presencebot_core::utils::ProcessMemoryMonitor;
use presencebot_core::{DefaultHttpClient, HttpClient};

#[derive(Parser, Debug, Clone)]
#[command(name = "presencebot")]
#[command(author, version, about = "PresenceBot - templated streaming presence for Discord accounts")]
struct Args {
    /// Directory holding userTokens.json, userConfig.json and activeStreams.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Holder to start at boot, in addition to the restored ones (repeatable)
    #[arg(long = "holder")]
    holders: Vec<String>,

    /// Do not bring back the holders that were streaming at last shutdown
    #[arg(long, default_value = "false")]
    no_restore: bool,

    #[arg(long, default_value = "60")]
    health_interval_secs: u64,

    /// Memory budget for the health sweep; defaults to total system memory
    #[arg(long)]
    memory_budget_mb: Option<u64>,

    /// Application the activity is attributed to when a config names none
    #[arg(long, default_value = DEFAULT_APPLICATION_ID)]
    application_id: String,

    /// Check one token against the account endpoint and exit
    #[arg(long)]
    check_token: Option<String>,
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;
    let mut filter = EnvFilter::from_default_env();
    for directive in ["presencebot=info", "presencebot_core=info", "presencebot_server=info"] {
        filter = filter.add_directive(directive.parse()?);
    }
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub).context("Failed to set global subscriber")?;
    Ok(())
}

fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("presencebot")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;
    let args = Args::parse();

    if let Some(token) = args.check_token.as_deref() {
        let http = DefaultHttpClient::new();
        let valid = validate_token(&http, token).await?;
        info!("[Discord] token check: {}", if valid { "valid" } else { "invalid" });
        return Ok(());
    }

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    info!("PresenceBot starting. data_dir={}", data_dir.display());

    let stores = JsonStores::open(&data_dir).await?;
    let stores = ManagerStores {
        credentials: Arc::new(stores.credentials),
        configs: Arc::new(stores.configs),
        active: Arc::new(stores.active),
    };

    let weather_api_key = std::env::var("WEATHER_API_KEY").ok().filter(|k| !k.trim().is_empty());
    if weather_api_key.is_none() {
        warn!("WEATHER_API_KEY is not set; weather placeholders keep their defaults");
    }

    let http: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::new());
    let deps = SessionDeps {
        transports: Arc::new(DiscordTransportFactory),
        images: Arc::new(DiscordImageResolver::new(Arc::clone(&http))),
        image_cache: Arc::new(ImageCache::default()),
        system: Arc::new(SystemSampler::new()),
        http,
        weather_api_key,
        default_application_id: args.application_id.clone(),
        timings: SessionTimings::default(),
    };

    let budget = args.memory_budget_mb.map(megabytes);
    let settings = ManagerSettings {
        health_interval: Duration::from_secs(args.health_interval_secs.max(1)),
        ..ManagerSettings::default()
    };
    let manager = Arc::new(SessionManager::new(
        stores,
        deps,
        Arc::new(ProcessMemoryMonitor::new(budget)),
        settings,
    ));

    if args.no_restore {
        info!("`--no-restore` given; only explicitly named holders start");
        for holder in &args.holders {
            match manager.start_for_holder(holder).await {
                Ok(start) => info!(
                    "Autostart: holder='{}' => {}/{} sessions",
                    holder, start.report.success_count, start.report.total_count
                ),
                Err(e) => error!("Autostart failed for holder='{}': {:?}", holder, e),
            }
        }
    } else if let Err(e) = run_autostart(Arc::clone(&manager), &args.holders).await {
        error!("Autostart failed: {:?}", e);
    }

    let cancel = CancellationToken::new();
    let sweep = spawn_health_sweep_task(
        Arc::clone(&manager),
        manager.settings().health_interval,
        cancel.child_token(),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {:?}", e);
    }
    info!("Ctrl-C detected; stopping streams...");
    cancel.cancel();
    let _ = sweep.await;
    manager.stop_all().await;
    Ok(())
}
