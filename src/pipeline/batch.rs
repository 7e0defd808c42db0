use std::collections::HashSet;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use super::issue_certificate;
use crate::config::Config;
use crate::dataset::HolderRow;
use crate::db::RegistryStore;
use crate::error::AppError;
use crate::storage::holder_file_stem;

/// What a failing row does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFailurePolicy {
    /// Log the row and continue; the archive holds the rows that succeeded.
    Skip,
    /// Stop at the first failing row and fail the whole request.
    Abort,
}

impl FromStr for BatchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "invalid BATCH_FAILURE_POLICY {:?}, expected \"skip\" or \"abort\"",
                other
            )),
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub archive: Vec<u8>,
    pub issued: usize,
    pub failed: usize,
}

/// Issues certificates for the first `count` rows and zips the PDFs in memory.
///
/// Rows are processed one after another. Entries are named
/// `certificate_<holder>.pdf`; repeated names get a numeric suffix.
pub async fn generate_batch(
    config: Arc<Config>,
    registry: &dyn RegistryStore,
    rows: &[HolderRow],
    count: usize,
) -> Result<BatchOutcome, AppError> {
    let policy = config.batch_failure_policy;
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    let mut failed = 0;

    for holder in rows.iter().take(count) {
        match issue_certificate(config.clone(), registry, holder).await {
            Ok(certificate) => entries.push((holder.name.clone(), certificate.content)),
            Err(e) => match policy {
                BatchFailurePolicy::Abort => {
                    tracing::error!(holder = %holder.name, error = %e, "Batch aborted");
                    return Err(e);
                }
                BatchFailurePolicy::Skip => {
                    tracing::warn!(holder = %holder.name, error = %e, "Skipping batch row");
                    failed += 1;
                }
            },
        }
    }

    let issued = entries.len();
    let archive = tokio::task::spawn_blocking(move || write_archive(entries))
        .await
        .map_err(AppError::fatal)??;

    tracing::info!(issued, failed, bytes = archive.len(), "Batch archive built");
    Ok(BatchOutcome {
        archive,
        issued,
        failed,
    })
}

fn write_archive(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, AppError> {
    let mut zip_data = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_data));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut used = HashSet::new();
        for (holder_name, content) in entries {
            let stem = format!("certificate_{}", holder_file_stem(&holder_name));
            let mut name = format!("{}.pdf", stem);
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{}_{}.pdf", stem, n);
                n += 1;
            }
            zip.start_file(name, options).map_err(AppError::fatal)?;
            zip.write_all(&content).map_err(AppError::fatal)?;
        }
        zip.finish().map_err(AppError::fatal)?;
    }
    Ok(zip_data)
}
