use anyhow::Context;
use fileserver::cache::SharedCache;
use fileserver::config::Config;
use fileserver::server::Server;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = Config::load()?;

    let _cache = if cfg.cache.enabled {
        Some(SharedCache::init(&cfg.cache).context("initializing cache segment")?)
    } else {
        None
    };

    let server = Server::bind(&cfg)?;
    let shutdown = server.shutdown_handle();
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    let reactor = tokio::task::spawn_blocking(move || server.run());
    tokio::pin!(reactor);

    tokio::select! {
        res = &mut reactor => {
            return res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
        _ = terminate.recv() => {
            tracing::info!("SIGTERM received");
        }
    }

    shutdown.shutdown();
    reactor.await??;
    Ok(())
}
