//! Rendered-document to PDF conversion.
//!
//! Conversion is an ordered chain of [`PdfStrategy`] states, tried from the
//! highest fidelity down: the office suite, a paragraph-level re-layout with
//! genpdf, and finally a bare name-and-QR page. A state that errors or returns
//! something that is not a PDF hands over to the next one.

mod fonts;
mod layout;
mod minimal;
mod office;

#[cfg(test)]
pub(crate) use fonts::find_system_family;
pub use layout::LayoutConverter;
pub use minimal::MinimalConverter;
pub use office::OfficeConverter;

use std::path::Path;

use crate::config::Config;

pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Printed QR size used by the re-layout states (2 in).
pub(crate) const QR_SIZE_MM: f64 = 50.8;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The state cannot run here at all (tool not installed, fonts absent).
    #[error("{0} unavailable")]
    MissingDependency(String),
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Inputs shared by every converter state.
#[derive(Debug, Clone, Copy)]
pub struct ConversionJob<'a> {
    /// The populated DOCX.
    pub document: &'a Path,
    pub holder_name: &'a str,
    pub qr_image: &'a Path,
    /// Scratch directory for state-local temporaries.
    pub work_dir: &'a Path,
}

pub trait PdfStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError>;
}

pub struct ConverterChain {
    states: Vec<Box<dyn PdfStrategy>>,
}

impl ConverterChain {
    pub fn new(states: Vec<Box<dyn PdfStrategy>>) -> Self {
        Self { states }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            Box::new(OfficeConverter::new(config.office.clone())),
            Box::new(LayoutConverter::new(
                config.font_dir.clone(),
                config.font_family.clone(),
            )),
            Box::new(MinimalConverter),
        ])
    }

    /// Runs the states in order and returns the first valid PDF.
    ///
    /// Only the last state's error escapes.
    pub fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError> {
        let mut last_error = ConvertError::MissingDependency("PDF converter".to_string());
        for state in &self.states {
            match state.convert(job).and_then(ensure_pdf) {
                Ok(bytes) => {
                    tracing::debug!(state = state.name(), bytes = bytes.len(), "PDF produced");
                    return Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(state = state.name(), error = %e, "PDF conversion state failed, falling back");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

fn ensure_pdf(bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
    if bytes.starts_with(PDF_SIGNATURE) {
        Ok(bytes)
    } else {
        Err(ConvertError::Failed("output is not a PDF document".to_string()))
    }
}
