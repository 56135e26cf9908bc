mod config;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use homescreen_api::auth::{AppState, AppStateInner};
use homescreen_api::validate::Validator;
use homescreen_store::{ActionLog, Database, DocumentStore, KeyedStore, LocalStore, Records, RoutedStore, Session};

use crate::config::{Backend, Config, PLACEHOLDER_JWT_SECRET};

/// Screenshots travel inline as base64, so request bodies get a generous cap.
const BODY_LIMIT: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "homescreen=debug,homescreen_api=debug,homescreen_store=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == PLACEHOLDER_JWT_SECRET {
        warn!("HOMESCREEN_JWT_SECRET is not set; using the development placeholder");
    }

    let store = open_store(&config)?;
    info!("Storage backend: {}", store.backend_tag());

    let validator = Validator::new(
        config.anthropic_api_key.clone(),
        &config.validation_model,
        config.strict_validation,
    )?;
    if !validator.has_api_key() {
        warn!(
            "ANTHROPIC_API_KEY is not set; screenshots will be {}",
            if validator.is_strict() { "rejected" } else { "accepted unchecked" }
        );
    }

    let session = Session::new(store.clone());
    match session.restore().await {
        Ok(Some(user)) => info!("Restored session for {} ({})", user.email, user.id),
        Ok(None) => info!("No saved session"),
        Err(e) => warn!("Could not read the saved session: {}", e),
    }

    let state: AppState = Arc::new(AppStateInner {
        records: Records::new(store.clone()),
        actions: ActionLog::new(store.clone()),
        session,
        validator,
        jwt_secret: config.jwt_secret.clone(),
        backend: store.backend_tag(),
    });

    let app = homescreen_api::router(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("HomeScreen server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Local SQLite for everything, or the document API for shared records with
/// the session pointer kept in the local file.
fn open_store(config: &Config) -> anyhow::Result<Arc<dyn KeyedStore>> {
    let db = Arc::new(Database::open(&config.db_path)?);
    let local = LocalStore::with_database(db, &config.namespace);

    match config.backend {
        Backend::Local => Ok(Arc::new(local)),
        Backend::Document => {
            let url = config
                .docstore_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("HOMESCREEN_DOCSTORE_URL is required for the document backend"))?;
            let shared = DocumentStore::new(url, config.docstore_token.clone())?;
            info!("Shared records at {}", url);
            Ok(Arc::new(RoutedStore::new(Arc::new(local), Arc::new(shared))))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
