mod config;
mod dataset;
mod db;
mod docx;
mod error;
mod pdf;
mod pipeline;
mod qr;
mod routes;
mod session;
mod state;
mod storage;
mod templates;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use db::{MemoryRegistry, PgRegistry, RegistryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certificados=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let config = Arc::new(config);

    crate::storage::ensure_dirs(&config)?;
    if !config.template_path.exists() {
        tracing::warn!(
            "Certificate template {} not found; issuance will fail until it is provided",
            config.template_path.display()
        );
    }

    let registry: Arc<dyn RegistryStore> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgRegistry::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; issued certificates are kept in memory only");
            Arc::new(MemoryRegistry::new())
        }
    };

    let state = Arc::new(state::AppState {
        registry,
        config: config.clone(),
        sessions: Arc::new(session::SessionStore::new(config.session_ttl)),
    });

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Certificados listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
