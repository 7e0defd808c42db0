//! Issuance pipeline: QR issuance, template rendering and PDF conversion.

mod batch;

pub use batch::{generate_batch, BatchFailurePolicy, BatchOutcome};

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::dataset::HolderRow;
use crate::db::RegistryStore;
use crate::docx::{DocxTemplate, TemplateFields};
use crate::error::AppError;
use crate::pdf::{ConversionJob, ConverterChain};
use crate::qr;
use crate::storage::{holder_file_stem, ScopedFile};

#[derive(Debug)]
pub struct IssuedCertificate {
    pub certificate_id: String,
    /// Download name, `certificate_<Holder_Name>.pdf`.
    pub filename: String,
    pub content: Vec<u8>,
}

pub fn artifact_path(certificate_id: &str) -> String {
    format!("/certificates/certificate_{}.pdf", certificate_id)
}

/// Issues one certificate for `holder` and returns the PDF bytes.
///
/// The registry record exists before the bytes are returned and carries the
/// artifact location. The QR raster and every intermediate file are gone by
/// the time this returns, whatever the outcome.
pub async fn issue_certificate(
    config: Arc<Config>,
    registry: &dyn RegistryStore,
    holder: &HolderRow,
) -> Result<IssuedCertificate, AppError> {
    let issued = qr::issue(&config, registry, holder).await?;
    let qr_file = ScopedFile::new(issued.qr_image_path.clone());

    let render_config = config.clone();
    let holder_row = holder.clone();
    let certificate_id = issued.certificate_id.clone();
    let qr_path = issued.qr_image_path.clone();
    let content = tokio::task::spawn_blocking(move || {
        render_pdf(&render_config, &holder_row, &qr_path, &certificate_id)
    })
    .await
    .map_err(AppError::fatal)??;
    drop(qr_file);

    registry
        .set_artifact_path(&issued.certificate_id, &artifact_path(&issued.certificate_id))
        .await?;

    tracing::info!(
        certificate_id = %issued.certificate_id,
        bytes = content.len(),
        "Certificate generated"
    );

    Ok(IssuedCertificate {
        filename: format!("certificate_{}.pdf", holder_file_stem(&holder.name)),
        certificate_id: issued.certificate_id,
        content,
    })
}

/// Template rendering plus conversion. Blocking.
pub fn render_pdf(
    config: &Config,
    holder: &HolderRow,
    qr_image: &Path,
    certificate_id: &str,
) -> Result<Vec<u8>, AppError> {
    let template = DocxTemplate::open(&config.template_path)?;
    let work_dir = config.work_dir();
    std::fs::create_dir_all(&work_dir).map_err(AppError::fatal)?;

    let rendered = template.render(
        &TemplateFields {
            holder_name: &holder.name,
            program: &holder.program,
            certificate_id,
            qr_image_path: qr_image,
            issued_on: chrono::Local::now().format("%d %B %Y").to_string(),
        },
        &work_dir,
    )?;

    let chain = ConverterChain::from_config(config);
    let pdf = chain.convert(&ConversionJob {
        document: rendered.path(),
        holder_name: &holder.name,
        qr_image,
        work_dir: &work_dir,
    })?;
    Ok(pdf)
}
