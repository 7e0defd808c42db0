use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One issued certificate. Holder fields are a snapshot of the dataset row at issuance.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub certificate_id: String,
    pub code: String,
    pub national_id: String,
    pub holder_name: String,
    pub program: String,
    pub issued_at: DateTime<Utc>,
    pub artifact_path: Option<String>,
    pub qr_image_path: Option<String>,
    pub verification_url: String,
}

/// Public projection served by the verification endpoints.
#[derive(Debug, Serialize)]
pub struct VerificationView {
    pub certificate_id: String,
    pub holder_name: String,
    pub national_id: String,
    pub program: String,
    pub issued_at: String,
}

impl From<&CertificateRecord> for VerificationView {
    fn from(record: &CertificateRecord) -> Self {
        Self {
            certificate_id: record.certificate_id.clone(),
            holder_name: record.holder_name.clone(),
            national_id: record.national_id.clone(),
            program: record.program.clone(),
            issued_at: record.issued_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}
