//! In-memory registry for tests and database-less deployments.
//!
//! Records live for the lifetime of the process only.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{CertificateRecord, RegistryError, RegistryStore};

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    // Insertion order; issuance timestamps are monotonic enough for listing.
    records: RwLock<Vec<CertificateRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn insert(&self, record: &CertificateRecord) -> Result<(), RegistryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records
            .iter()
            .any(|r| r.certificate_id == record.certificate_id)
        {
            return Err(RegistryError::Duplicate(record.certificate_id.clone()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find(&self, certificate_id: &str) -> Result<Option<CertificateRecord>, RegistryError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .find(|r| r.certificate_id == certificate_id)
            .cloned())
    }

    async fn set_artifact_path(
        &self,
        certificate_id: &str,
        artifact_path: &str,
    ) -> Result<(), RegistryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .iter_mut()
            .find(|r| r.certificate_id == certificate_id)
            .ok_or_else(|| RegistryError::Unknown(certificate_id.to_string()))?;
        record.artifact_path = Some(artifact_path.to_string());
        Ok(())
    }

    async fn list_recent(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CertificateRecord>, RegistryError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, RegistryError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str) -> CertificateRecord {
        CertificateRecord {
            certificate_id: id.to_string(),
            code: "COD123".to_string(),
            national_id: "12345678".to_string(),
            holder_name: "Test User".to_string(),
            program: "Test Program".to_string(),
            issued_at: Utc::now(),
            artifact_path: None,
            qr_image_path: None,
            verification_url: format!("http://localhost:8000/verify/{}", id),
        }
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_not_overwritten() {
        let registry = MemoryRegistry::new();
        registry.insert(&record("a")).await.unwrap();

        let mut other = record("a");
        other.holder_name = "Someone Else".to_string();
        let err = registry.insert(&other).await.unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(id) if id == "a"));

        let stored = registry.find("a").await.unwrap().unwrap();
        assert_eq!(stored.holder_name, "Test User");
    }

    #[tokio::test]
    async fn artifact_path_is_patched_once_issued() {
        let registry = MemoryRegistry::new();
        registry.insert(&record("a")).await.unwrap();
        registry
            .set_artifact_path("a", "/certificates/certificate_a.pdf")
            .await
            .unwrap();

        let stored = registry.find("a").await.unwrap().unwrap();
        assert_eq!(
            stored.artifact_path.as_deref(),
            Some("/certificates/certificate_a.pdf")
        );
        assert!(matches!(
            registry.set_artifact_path("missing", "x").await,
            Err(RegistryError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_paged() {
        let registry = MemoryRegistry::new();
        for id in ["a", "b", "c"] {
            registry.insert(&record(id)).await.unwrap();
        }

        let page: Vec<_> = registry
            .list_recent(2, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.certificate_id)
            .collect();
        assert_eq!(page, vec!["c", "b"]);

        let rest = registry.list_recent(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(registry.count().await.unwrap(), 3);
    }
}
