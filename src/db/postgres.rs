use async_trait::async_trait;
use sqlx::PgPool;

use super::{CertificateRecord, RegistryError, RegistryStore};

pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistryStore for PgRegistry {
    async fn insert(&self, record: &CertificateRecord) -> Result<(), RegistryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO issued_certificates
                (certificate_id, code, national_id, holder_name, program, issued_at,
                 artifact_path, qr_image_path, verification_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.certificate_id)
        .bind(&record.code)
        .bind(&record.national_id)
        .bind(&record.holder_name)
        .bind(&record.program)
        .bind(record.issued_at)
        .bind(&record.artifact_path)
        .bind(&record.qr_image_path)
        .bind(&record.verification_url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RegistryError::Duplicate(record.certificate_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, certificate_id: &str) -> Result<Option<CertificateRecord>, RegistryError> {
        let record = sqlx::query_as::<_, CertificateRecord>(
            "SELECT * FROM issued_certificates WHERE certificate_id = $1",
        )
        .bind(certificate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn set_artifact_path(
        &self,
        certificate_id: &str,
        artifact_path: &str,
    ) -> Result<(), RegistryError> {
        let result = sqlx::query(
            "UPDATE issued_certificates SET artifact_path = $2 WHERE certificate_id = $1",
        )
        .bind(certificate_id)
        .bind(artifact_path)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::Unknown(certificate_id.to_string()));
        }
        Ok(())
    }

    async fn list_recent(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CertificateRecord>, RegistryError> {
        let records = sqlx::query_as::<_, CertificateRecord>(
            "SELECT * FROM issued_certificates ORDER BY issued_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn count(&self) -> Result<i64, RegistryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM issued_certificates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
