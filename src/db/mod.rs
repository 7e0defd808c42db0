mod memory;
mod models;
mod postgres;

pub use memory::MemoryRegistry;
pub use models::*;
pub use postgres::PgRegistry;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("certificate {0} already exists")]
    Duplicate(String),
    #[error("certificate {0} does not exist")]
    Unknown(String),
}

/// Persistence for issued certificates.
///
/// Records are written once at issuance and patched once with the artifact
/// location. Nothing is ever deleted.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Fails with [`RegistryError::Duplicate`] instead of overwriting an existing id.
    async fn insert(&self, record: &CertificateRecord) -> Result<(), RegistryError>;

    async fn find(&self, certificate_id: &str) -> Result<Option<CertificateRecord>, RegistryError>;

    async fn set_artifact_path(
        &self,
        certificate_id: &str,
        artifact_path: &str,
    ) -> Result<(), RegistryError>;

    /// Newest first.
    async fn list_recent(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CertificateRecord>, RegistryError>;

    async fn count(&self) -> Result<i64, RegistryError>;
}

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
