use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::{build_router, AppState};
use crate::config::ServerConfig;
use crate::git::autosave::{AutoSaver, GitSaveBackend};
use crate::uploads::ImageStore;

/// The scheduler as wired in production: git over the system `git` binary.
pub type GitAutoSaver = AutoSaver<GitSaveBackend>;

/// Build the shared state. The auto-saver is constructed here, once, and
/// handed to both the router and the caller that arms its timer.
pub fn build_state(config: &ServerConfig) -> Result<(AppState, Option<Arc<GitAutoSaver>>)> {
    let store = ImageStore::new(&config.uploads_dir);
    store.ensure_dir().with_context(|| {
        format!("failed to create uploads directory `{}`", config.uploads_dir.display())
    })?;

    let state = AppState::new(store, config.environment);
    if !config.autosave.enabled {
        return Ok((state, None));
    }

    let autosave = &config.autosave;
    let backend = GitSaveBackend::new(
        &autosave.repo_dir,
        &config.uploads_dir,
        &autosave.remote,
        &autosave.branch,
    );
    let saver = Arc::new(AutoSaver::new(&config.uploads_dir, autosave.min_commit_interval, backend));
    let state = state.with_autosave(saver.clone(), autosave.interval_minutes);
    Ok((state, Some(saver)))
}

/// Serve until Ctrl+C / SIGTERM.
pub async fn run(config: ServerConfig) -> Result<()> {
    let (state, saver) = build_state(&config)?;
    let images = state.store().count().await.unwrap_or_default();
    let app = build_router(state, &config.static_dir, config.cors_origins.as_deref());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind gallery listener on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        uploads_dir = %config.uploads_dir.display(),
        images,
        environment = ?config.environment,
        "gallery server started"
    );

    // Timers live until process exit; there is no stop operation.
    let _autosave = match &saver {
        Some(saver) => {
            info!(
                repo_dir = %config.autosave.repo_dir.display(),
                remote = %config.autosave.remote,
                branch = %config.autosave.branch,
                interval_minutes = config.autosave.interval_minutes,
                "auto-save to git enabled"
            );
            Some(saver.start_auto_save(config.autosave.interval_minutes))
        }
        None => {
            info!("auto-save to git disabled; uploads are only stored locally");
            None
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gallery server exited unexpectedly")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
