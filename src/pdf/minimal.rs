use printpdf::image_crate::GenericImageView;
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument};

use super::{ConversionJob, ConvertError, PdfStrategy, QR_SIZE_MM};

const PAGE_WIDTH_MM: f64 = 210.0;
const PAGE_HEIGHT_MM: f64 = 297.0;
const NAME_SIZE_PT: f64 = 18.0;
const NAME_BASELINE_MM: f64 = 200.0;
/// Average glyph advance of Times Bold Italic, in ems.
const AVG_GLYPH_EM: f64 = 0.5;
const PT_TO_MM: f64 = 0.352_778;

/// Last resort: holder name and QR code on an A4 page.
///
/// Uses the PDF base-14 Times faces, so it needs no font files and does not
/// read the rendered document. A missing or unreadable QR image is skipped.
pub struct MinimalConverter;

impl PdfStrategy for MinimalConverter {
    fn name(&self) -> &'static str {
        "minimal"
    }

    fn convert(&self, job: &ConversionJob<'_>) -> Result<Vec<u8>, ConvertError> {
        let (doc, page, layer) = PdfDocument::new(
            "Certificate",
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "Certificate",
        );
        let canvas = doc.get_page(page).get_layer(layer);

        let font = doc
            .add_builtin_font(BuiltinFont::TimesBoldItalic)
            .map_err(|e| ConvertError::Failed(e.to_string()))?;
        let text_width =
            job.holder_name.chars().count() as f64 * NAME_SIZE_PT * AVG_GLYPH_EM * PT_TO_MM;
        let x = ((PAGE_WIDTH_MM - text_width) / 2.0).max(10.0);
        canvas.use_text(job.holder_name, NAME_SIZE_PT, Mm(x), Mm(NAME_BASELINE_MM), &font);

        match printpdf::image_crate::open(job.qr_image) {
            Ok(raster) => {
                let (width_px, _) = raster.dimensions();
                let dpi = f64::from(width_px) * 25.4 / QR_SIZE_MM;
                Image::from_dynamic_image(&raster).add_to_layer(
                    canvas.clone(),
                    ImageTransform {
                        translate_x: Some(Mm((PAGE_WIDTH_MM - QR_SIZE_MM) / 2.0)),
                        translate_y: Some(Mm(NAME_BASELINE_MM - 15.0 - QR_SIZE_MM)),
                        dpi: Some(dpi),
                        ..Default::default()
                    },
                );
            }
            Err(e) => tracing::warn!("QR image left out of minimal PDF: {}", e),
        }

        doc.save_to_bytes()
            .map_err(|e| ConvertError::Failed(e.to_string()))
    }
}
