//! QR issuance: mint an identifier, rasterize its verification URL and record it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

use crate::config::Config;
use crate::dataset::HolderRow;
use crate::db::{CertificateRecord, RegistryError, RegistryStore};
use crate::storage::generate_certificate_id;

/// Pixels per QR module.
const MODULE_PX: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("failed to encode QR payload: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("failed to write QR image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
pub struct IssuedQr {
    pub certificate_id: String,
    pub qr_image_path: PathBuf,
    pub verification_url: String,
}

pub fn verification_url(base_url: &str, certificate_id: &str) -> String {
    format!("{}/verify/{}", base_url.trim_end_matches('/'), certificate_id)
}

/// Writes the QR symbol for `payload` as an RGB PNG.
///
/// Low error correction (~7%), 20 px modules and the standard 4-module quiet zone.
pub fn write_qr_png(payload: &str, path: &Path) -> Result<(), QrError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)?;
    let luma = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PX, MODULE_PX)
        .quiet_zone(true)
        .build();
    // PDF layers reject alpha and some reject greyscale; plain RGB embeds everywhere.
    DynamicImage::ImageLuma8(luma)
        .to_rgb8()
        .save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Issues a certificate identifier for `holder`.
///
/// On success the QR raster exists under the QR area and the registry holds a
/// record without an artifact path. On failure neither is left behind.
pub async fn issue(
    config: &Config,
    registry: &dyn RegistryStore,
    holder: &HolderRow,
) -> Result<IssuedQr, QrError> {
    let certificate_id = generate_certificate_id();
    let verification_url = verification_url(&config.base_url, &certificate_id);
    let qr_image_path = config.qr_dir().join(format!("qr_{}.png", certificate_id));

    write_qr_png(&verification_url, &qr_image_path)?;

    let record = CertificateRecord {
        certificate_id: certificate_id.clone(),
        code: holder.code.clone(),
        national_id: holder.national_id.clone(),
        holder_name: holder.name.clone(),
        program: holder.program.clone(),
        issued_at: Utc::now(),
        artifact_path: None,
        qr_image_path: Some(qr_image_path.display().to_string()),
        verification_url: verification_url.clone(),
    };

    if let Err(e) = registry.insert(&record).await {
        let _ = std::fs::remove_file(&qr_image_path);
        return Err(e.into());
    }

    tracing::info!(certificate_id = %certificate_id, national_id = %holder.national_id, "Issued certificate id");

    Ok(IssuedQr {
        certificate_id,
        qr_image_path,
        verification_url,
    })
}
