use std::path::{Path, PathBuf};

use genpdf::elements::{Break, Image, Paragraph};
use genpdf::style::Style;
use genpdf::{Alignment, Element};

use super::{fonts, ConversionJob, ConvertError, PdfStrategy, QR_SIZE_MM};
use crate::docx;

/// Re-lays the rendered document's paragraphs on a fresh genpdf page.
///
/// Exact template layout is lost; title, holder name and body text keep
/// distinct styles and the QR code is placed after the text.
pub struct LayoutConverter {
    font_dir: Option<PathBuf>,
    font_family: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Title,
    Name,
    Body,
}

impl LayoutConverter {
    pub fn new(font_dir: Option<PathBuf>, font_family: String) -> Self {
        Self {
            font_dir,
            font_family,
        }
    }
}

impl PdfStrategy for LayoutConverter {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError> {
        let paragraphs = docx::extract_paragraphs(job.document)
            .map_err(|e| ConvertError::Failed(format!("unreadable rendered document: {}", e)))?;
        let family = fonts::load_family(self.font_dir.as_deref(), &self.font_family)?;

        let mut doc = genpdf::Document::new(family);
        doc.set_title("Certificate");
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(20);
        doc.set_page_decorator(decorator);

        for (role, text) in classify(&paragraphs, job.holder_name) {
            let paragraph = Paragraph::new(text);
            match role {
                Role::Title => doc.push(
                    paragraph
                        .aligned(Alignment::Center)
                        .styled(Style::new().bold().with_font_size(24)),
                ),
                Role::Name => doc.push(
                    paragraph
                        .aligned(Alignment::Center)
                        .styled(Style::new().bold().italic().with_font_size(18)),
                ),
                Role::Body => doc.push(paragraph.styled(Style::new().with_font_size(12))),
            }
            doc.push(Break::new(0.5));
        }

        if job.qr_image.exists() {
            match qr_element(job.qr_image) {
                Ok(image) => doc.push(image),
                Err(e) => tracing::warn!("QR image left out of layout PDF: {}", e),
            }
        }

        let mut out = Vec::new();
        doc.render(&mut out)
            .map_err(|e| ConvertError::Failed(format!("genpdf render failed: {}", e)))?;
        Ok(out)
    }
}

fn classify<'a>(paragraphs: &'a [String], holder_name: &str) -> Vec<(Role, &'a str)> {
    paragraphs
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let role = if !holder_name.is_empty() && text.contains(holder_name) {
                Role::Name
            } else if i == 0 {
                Role::Title
            } else {
                Role::Body
            };
            (role, text.as_str())
        })
        .collect()
}

fn qr_element(path: &Path) -> Result<Image, String> {
    let (width_px, _) = image::image_dimensions(path).map_err(|e| e.to_string())?;
    let mut element = Image::from_path(path)
        .map_err(|e| e.to_string())?
        .with_alignment(Alignment::Center);
    element.set_dpi(f64::from(width_px) * 25.4 / QR_SIZE_MM);
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::PDF_SIGNATURE;
    use crate::testing;

    #[test]
    fn holder_paragraph_outranks_title() {
        let paragraphs = vec![
            "Certificate of Completion".to_string(),
            "Awarded to Test User".to_string(),
            "for completing Test Program".to_string(),
        ];
        let roles: Vec<Role> = classify(&paragraphs, "Test User")
            .into_iter()
            .map(|(role, _)| role)
            .collect();
        assert_eq!(roles, vec![Role::Title, Role::Name, Role::Body]);

        let first_is_name = classify(&paragraphs[1..], "Test User");
        assert_eq!(first_is_name[0].0, Role::Name);
    }

    #[test]
    fn rendered_template_becomes_a_pdf() {
        let Some(fonts) = testing::font_dir_fixture() else {
            eprintln!("no system fonts installed; skipping");
            return;
        };
        let root = tempfile::tempdir().unwrap();
        let template = root.path().join("template.docx");
        testing::write_template(&template);
        let qr = root.path().join("qr.png");
        crate::qr::write_qr_png("http://localhost:8000/verify/abc-123", &qr).unwrap();

        let rendered = docx::DocxTemplate::open(&template)
            .unwrap()
            .render(
                &docx::TemplateFields {
                    holder_name: "Test User",
                    program: "Test Program",
                    certificate_id: "abc-123",
                    qr_image_path: &qr,
                    issued_on: "01 June 2024".to_string(),
                },
                root.path(),
            )
            .unwrap();

        let converter =
            LayoutConverter::new(Some(fonts.path().to_path_buf()), "LiberationSerif".into());
        let convert = |qr_image: &Path| {
            converter
                .convert(&ConversionJob {
                    document: rendered.path(),
                    holder_name: "Test User",
                    qr_image,
                    work_dir: root.path(),
                })
                .unwrap()
        };

        let with_qr = convert(qr.as_path());
        let without_qr = convert(root.path().join("absent.png").as_path());
        assert!(with_qr.starts_with(PDF_SIGNATURE));
        assert!(without_qr.starts_with(PDF_SIGNATURE));
        assert!(with_qr.len() > without_qr.len());
    }

    #[test]
    fn missing_fonts_hand_over_to_next_state() {
        let root = tempfile::tempdir().unwrap();
        let template = root.path().join("template.docx");
        testing::write_template(&template);
        let empty_fonts = root.path().join("fonts");
        std::fs::create_dir_all(&empty_fonts).unwrap();

        let converter = LayoutConverter::new(Some(empty_fonts), "LiberationSerif".into());
        let err = converter
            .convert(&ConversionJob {
                document: &template,
                holder_name: "Test User",
                qr_image: &root.path().join("absent.png"),
                work_dir: root.path(),
            })
            .unwrap_err();
        assert!(matches!(err, ConvertError::MissingDependency(_)));
    }

    #[test]
    fn unreadable_document_fails() {
        let root = tempfile::tempdir().unwrap();
        let bogus = root.path().join("bogus.docx");
        std::fs::write(&bogus, b"plain text").unwrap();

        let converter = LayoutConverter::new(None, "LiberationSerif".into());
        assert!(matches!(
            converter.convert(&ConversionJob {
                document: &bogus,
                holder_name: "Test User",
                qr_image: &bogus,
                work_dir: root.path(),
            }),
            Err(ConvertError::Failed(_))
        ));
    }
}
