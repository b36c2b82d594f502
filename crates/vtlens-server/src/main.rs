//! vtlens server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `VTLENS_*` environment variables, opens the SQLite store, connects the
//! fast cache and serves the report API over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vtlens_cache::FastCacheBackend;
use vtlens_server::{AppState, Orchestrator, ServerConfig};
use vtlens_store_sqlite::SqliteStore;
use vtlens_upstream::VtClient;

#[derive(Parser)]
#[command(author, version, about = "vtlens threat-intelligence report server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VTLENS").try_parsing(true))
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  server_cfg.validate().context("invalid configuration")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_cache_capacity(server_cfg.persistent_cache_capacity)?;

  let cache = FastCacheBackend::from_config(
    server_cfg.redis_url.as_deref(),
    server_cfg.redis_password.as_deref(),
    server_cfg.fast_cache_capacity,
  )
  .await
  .context("failed to connect to fast cache")?;

  let upstream = VtClient::new(server_cfg.vt_config()).context("failed to build upstream client")?;

  tracing::info!(
    store = %store_path.display(),
    fast_cache = cache.name(),
    capacity = store.cache_capacity(),
    "storage ready"
  );

  let orchestrator = Orchestrator::new(
    Arc::new(store),
    Arc::new(cache),
    Arc::new(upstream),
    server_cfg.policy(),
  );
  let app = vtlens_server::router(AppState::new(orchestrator));
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("shut down");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "could not listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
