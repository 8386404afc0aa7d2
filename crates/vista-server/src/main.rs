mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use vista_api::auth::{AppState, AppStateInner};
use vista_api::media::LocalDiskStore;
use vista_api::routes::build_router;
use vista_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vista=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and media storage
    let db = Database::open(&config.db_path)?;
    let fixed = db.reconcile_counters()?;
    if fixed > 0 {
        warn!("Counter reconciliation corrected {} rows", fixed);
    }
    db.purge_expired_stories()?;

    let media = LocalDiskStore::new(config.media_dir.clone())?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        media: Arc::new(media),
    });

    tokio::spawn(run_story_sweep(state.clone(), config.story_sweep_secs));

    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Vista server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Reclaims expired story rows on an interval. Listings already hide them.
async fn run_story_sweep(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        match tokio::task::spawn_blocking(move || db_state.db.purge_expired_stories()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Story sweep error: {}", e),
            Err(e) => warn!("Story sweep join error: {}", e),
        }
    }
}
