use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::BatchFailurePolicy;

#[derive(Clone, Debug)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// External office-suite converter settings (first state of the converter chain).
#[derive(Clone, Debug)]
pub struct OfficeSettings {
    pub enabled: bool,
    pub binary: PathBuf,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Postgres registry; the in-memory registry is used when unset.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Public origin embedded in QR payloads.
    pub base_url: String,
    pub media_root: PathBuf,
    pub template_path: PathBuf,
    /// Explicit font directory; system font folders are searched when unset.
    pub font_dir: Option<PathBuf>,
    pub font_family: String,
    pub office: OfficeSettings,
    pub admin: Option<AdminCredentials>,
    pub batch_failure_policy: BatchFailurePolicy,
    /// Login sessions expire this long after creation.
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let media_root = base_dir.join(
            std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string()),
        );
        let template_path = base_dir.join(
            std::env::var("TEMPLATE_PATH")
                .unwrap_or_else(|_| "word_templates/certificate_template.docx".to_string()),
        );

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);
        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let office = OfficeSettings {
            enabled: std::env::var("OFFICE_ENABLED")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            binary: PathBuf::from(
                std::env::var("OFFICE_BINARY").unwrap_or_else(|_| "soffice".to_string()),
            ),
            timeout: Duration::from_secs(
                std::env::var("OFFICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
        };

        let admin = match (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) if !username.is_empty() && !password.is_empty() => {
                Some(AdminCredentials { username, password })
            }
            _ => {
                tracing::warn!("ADMIN_USERNAME/ADMIN_PASSWORD not set; admin panel is disabled");
                None
            }
        };

        let batch_failure_policy = std::env::var("BATCH_FAILURE_POLICY")
            .unwrap_or_else(|_| "skip".to_string())
            .parse()?;

        let session_ttl = Duration::from_secs(
            std::env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8 * 60 * 60),
        );

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            media_root,
            template_path,
            font_dir: std::env::var("FONT_DIR").ok().map(PathBuf::from),
            font_family: std::env::var("FONT_FAMILY")
                .unwrap_or_else(|_| "LiberationSerif".to_string()),
            office,
            admin,
            batch_failure_policy,
            session_ttl,
        })
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.media_root.join("datasets")
    }

    pub fn qr_dir(&self) -> PathBuf {
        self.media_root.join("qr")
    }

    /// Scratch area for per-invocation intermediate documents.
    pub fn work_dir(&self) -> PathBuf {
        self.media_root.join("tmp")
    }
}
