//! Attendance daemon: loads the face models, opens the store, builds the
//! initial gallery and serves the JSON API.

mod config;
mod engine;
mod gallery;
mod routes;
mod service;

use crate::config::Config;
use crate::gallery::GalleryCache;
use crate::routes::AppState;
use crate::service::AttendanceService;
use anyhow::Context;
use rollcall_core::FacePipeline;
use rollcall_store::{PhotoStore, Store};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }

    let store = Arc::new(
        Store::open(&config.db_path)
            .with_context(|| format!("opening database {}", config.db_path.display()))?,
    );
    let photos = Arc::new(
        PhotoStore::open(&config.upload_dir)
            .with_context(|| format!("opening upload directory {}", config.upload_dir.display()))?,
    );

    // Model loading fails fast: a daemon that cannot recognize faces
    // should not come up half-working.
    let pipeline = FacePipeline::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .context("loading face models")?;
    let engine = engine::spawn_engine(Box::new(pipeline));

    let gallery = Arc::new(GalleryCache::empty());
    let service = Arc::new(AttendanceService::new(
        store,
        photos,
        engine,
        gallery,
        config.match_tolerance,
    ));

    // Populate the gallery from the enrolled roster. A failure here is
    // logged and the daemon starts with an empty gallery; a later retrain
    // can recover without a restart.
    match service.retrain().await {
        Ok(count) => tracing::info!(enrolled = count, "initial gallery built"),
        Err(e) => tracing::error!(error = %e, "initial gallery build failed, starting empty"),
    }

    let app = routes::router(AppState {
        service,
        api_token: config.api_token.clone(),
        admin_token: config.admin_token.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %config.bind, "listening");
    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}
