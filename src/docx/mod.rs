//! DOCX certificate templates.
//!
//! Templates carry `{{ name }}` placeholders in `word/document.xml`. Text
//! fields are substituted in place; the holder name and the QR code replace
//! the whole run that contains them so they can carry their own formatting.
//! The template file is read once and never written; every render produces a
//! fresh document in a scoped temp file.

use std::io::{Cursor, Read, Seek, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use regex::Regex;
use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const QR_REL_ID: &str = "rIdCertificateQr";
/// 30 mm in EMU (36 000 EMU per mm).
const QR_EXTENT_EMU: u32 = 1_080_000;

const NAME_FONT: &str = "Times New Roman";
/// Half-points: 28 pt.
const NAME_SIZE_HALF_PT: u32 = 56;

const NS_WP: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("certificate template not found at {}", .0.display())]
    Missing(PathBuf),
    #[error("template is not a valid DOCX archive: {0}")]
    Archive(#[from] ZipError),
    #[error("template has no {0} part")]
    MissingPart(&'static str),
    #[error("placeholder {{{{ {0} }}}} is not inside a text run")]
    Placeholder(&'static str),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Values poured into a template.
#[derive(Debug)]
pub struct TemplateFields<'a> {
    pub holder_name: &'a str,
    pub program: &'a str,
    pub certificate_id: &'a str,
    pub qr_image_path: &'a Path,
    pub issued_on: String,
}

#[derive(Debug)]
pub struct DocxTemplate {
    bytes: Vec<u8>,
}

/// A populated document. The backing file is deleted on drop.
#[derive(Debug)]
pub struct RenderedDocument {
    file: NamedTempFile,
}

impl RenderedDocument {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl DocxTemplate {
    pub fn open(path: &Path) -> Result<Self, TemplateError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Self { bytes }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TemplateError::Missing(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn render(
        &self,
        fields: &TemplateFields<'_>,
        work_dir: &Path,
    ) -> Result<RenderedDocument, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;

        let mut document =
            read_part(&mut archive, DOCUMENT_PART)?.ok_or(TemplateError::MissingPart(DOCUMENT_PART))?;
        let mut content_types = read_part(&mut archive, CONTENT_TYPES_PART)?
            .ok_or(TemplateError::MissingPart(CONTENT_TYPES_PART))?;
        let mut rels = read_part(&mut archive, RELS_PART)?;

        let name_run = styled_name_run(fields.holder_name);
        document = replace_runs(&document, "holder_name", &name_run)?;

        let mut qr_media = None;
        if placeholder("qr_code")?.is_match(&document) {
            let media = format!("media/qr_{}.png", fields.certificate_id);
            let drawing = qr_drawing_run(next_drawing_id(&document), fields.certificate_id);
            document = replace_runs(&document, "qr_code", &drawing)?;
            document = ensure_namespaces(&document);
            rels = Some(add_image_relationship(rels.as_deref(), &media));
            content_types = ensure_png_content_type(&content_types);
            qr_media = Some((format!("word/{}", media), std::fs::read(fields.qr_image_path)?));
        }

        document = replace_text(&document, "certificate_id", fields.certificate_id)?;
        document = replace_text(&document, "program", fields.program)?;
        document = replace_text(&document, "date", &fields.issued_on)?;

        let mut output = tempfile::Builder::new()
            .prefix("certificate_")
            .suffix(".docx")
            .tempfile_in(work_dir)?;
        {
            let mut writer = ZipWriter::new(output.as_file_mut());
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            for i in 0..archive.len() {
                let mut entry = archive.by_index(i)?;
                let name = entry.name().to_string();
                if entry.is_dir() {
                    writer.add_directory(name, options)?;
                    continue;
                }
                if [DOCUMENT_PART, CONTENT_TYPES_PART, RELS_PART].contains(&name.as_str()) {
                    continue;
                }
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                writer.start_file(name, options)?;
                writer.write_all(&content)?;
            }

            writer.start_file(CONTENT_TYPES_PART, options)?;
            writer.write_all(content_types.as_bytes())?;
            writer.start_file(DOCUMENT_PART, options)?;
            writer.write_all(document.as_bytes())?;
            if let Some(rels) = rels {
                writer.start_file(RELS_PART, options)?;
                writer.write_all(rels.as_bytes())?;
            }
            if let Some((name, png)) = qr_media {
                writer.start_file(name, options)?;
                writer.write_all(&png)?;
            }
            writer.finish()?;
        }

        Ok(RenderedDocument { file: output })
    }
}

/// Visible text of each non-empty paragraph of a DOCX file, in document order.
pub fn extract_paragraphs(path: &Path) -> Result<Vec<String>, TemplateError> {
    let file = std::fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let document =
        read_part(&mut archive, DOCUMENT_PART)?.ok_or(TemplateError::MissingPart(DOCUMENT_PART))?;

    let paragraph = Regex::new(r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>(.*?)</w:p>)")?;
    let text = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:(?:tab|br)\s*/>")?;

    let mut paragraphs = Vec::new();
    for caps in paragraph.captures_iter(&document) {
        let Some(body) = caps.get(1) else { continue };
        let mut line = String::new();
        for piece in text.captures_iter(body.as_str()) {
            match piece.get(1) {
                Some(t) => line.push_str(&xml_unescape(t.as_str())),
                None => line.push(' '),
            }
        }
        let line = line.trim();
        if !line.is_empty() {
            paragraphs.push(line.to_string());
        }
    }
    Ok(paragraphs)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, TemplateError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(Some(content))
}

fn placeholder(key: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key)))
}

fn replace_text(xml: &str, key: &'static str, value: &str) -> Result<String, TemplateError> {
    let escaped = field_text(value);
    Ok(placeholder(key)?
        .replace_all(xml, regex::NoExpand(&escaped))
        .into_owned())
}

/// Splits the run around each `key` placeholder into prefix run, `middle`, suffix run.
///
/// Scanning resumes right after each inserted `middle`, which is never rescanned.
fn replace_runs(xml: &str, key: &'static str, middle: &str) -> Result<String, TemplateError> {
    let pattern = placeholder(key)?;
    let mut out = xml.to_string();
    let mut cursor = 0;
    while let Some(m) = pattern.find_at(&out, cursor) {
        let slot = RunSlot::locate(&out, m.range()).ok_or(TemplateError::Placeholder(key))?;
        let prefix = slot.prefix_run();
        let replacement = format!("{}{}{}", prefix, middle, slot.suffix_run());
        cursor = slot.run.start + prefix.len() + middle.len();
        out.replace_range(slot.run, &replacement);
    }
    Ok(out)
}

/// A `<w:r>` split at a placeholder inside one of its `<w:t>` elements.
#[derive(Debug)]
struct RunSlot {
    run: Range<usize>,
    props: String,
    lead: String,
    before: String,
    after: String,
    trail: String,
}

impl RunSlot {
    fn locate(xml: &str, placeholder: Range<usize>) -> Option<Self> {
        let head = &xml[..placeholder.start];
        let run_start = [head.rfind("<w:r>"), head.rfind("<w:r ")]
            .into_iter()
            .flatten()
            .max()?;
        if xml[run_start..placeholder.start].contains("</w:r>") {
            return None;
        }
        let run_end = placeholder.end + xml[placeholder.end..].find("</w:r>")?;

        let mut content_start = run_start + xml[run_start..].find('>')? + 1;
        let mut props = String::new();
        if xml[content_start..].starts_with("<w:rPr/>") {
            props = "<w:rPr/>".to_string();
            content_start += props.len();
        } else if xml[content_start..].starts_with("<w:rPr>") {
            let end = content_start + xml[content_start..].find("</w:rPr>")? + "</w:rPr>".len();
            props = xml[content_start..end].to_string();
            content_start = end;
        }

        let text_open = [head.rfind("<w:t>"), head.rfind("<w:t ")]
            .into_iter()
            .flatten()
            .max()
            .filter(|&at| at >= content_start)?;
        let text_start = text_open + xml[text_open..].find('>')? + 1;
        if text_start > placeholder.start {
            return None;
        }
        let text_end = placeholder.end + xml[placeholder.end..run_end].find("</w:t>")?;

        Some(Self {
            run: run_start..run_end + "</w:r>".len(),
            props,
            lead: xml[content_start..text_open].to_string(),
            before: xml[text_start..placeholder.start].to_string(),
            after: xml[placeholder.end..text_end].to_string(),
            trail: xml[text_end + "</w:t>".len()..run_end].to_string(),
        })
    }

    fn prefix_run(&self) -> String {
        let mut out = String::new();
        if !self.lead.is_empty() || !self.before.is_empty() {
            out.push_str("<w:r>");
            out.push_str(&self.props);
            out.push_str(&self.lead);
            if !self.before.is_empty() {
                out.push_str(&preserved_text(&self.before));
            }
            out.push_str("</w:r>");
        }
        out
    }

    fn suffix_run(&self) -> String {
        let mut out = String::new();
        if !self.after.is_empty() || !self.trail.is_empty() {
            out.push_str("<w:r>");
            out.push_str(&self.props);
            if !self.after.is_empty() {
                out.push_str(&preserved_text(&self.after));
            }
            out.push_str(&self.trail);
            out.push_str("</w:r>");
        }
        out
    }
}

fn preserved_text(escaped: &str) -> String {
    format!(r#"<w:t xml:space="preserve">{}</w:t>"#, escaped)
}

fn styled_name_run(name: &str) -> String {
    format!(
        concat!(
            r#"<w:r><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/>"#,
            r#"<w:b/><w:bCs/><w:i/><w:iCs/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr>"#,
            "{text}</w:r>"
        ),
        font = NAME_FONT,
        size = NAME_SIZE_HALF_PT,
        text = preserved_text(&field_text(name)),
    )
}

fn qr_drawing_run(drawing_id: u32, certificate_id: &str) -> String {
    format!(
        concat!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{emu}" cy="{emu}"/>"#,
            r#"<wp:docPr id="{id}" name="QR {cert}"/>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="qr_{cert}.png"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{emu}" cy="{emu}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
        ),
        emu = QR_EXTENT_EMU,
        id = drawing_id,
        cert = xml_escape(certificate_id),
        rel = QR_REL_ID,
    )
}

/// Drawing ids must be unique within a document.
fn next_drawing_id(document: &str) -> u32 {
    let existing = document.matches("<wp:docPr").count() as u32;
    1000 + existing
}

/// Declares the `wp` and `r` prefixes on the root element when the template lacks them.
fn ensure_namespaces(document: &str) -> String {
    let Some(root) = document.find("<w:document") else {
        return document.to_string();
    };
    let Some(close) = document[root..].find('>').map(|at| root + at) else {
        return document.to_string();
    };
    let tag = &document[root..close];
    let mut extra = String::new();
    if !tag.contains("xmlns:wp=") {
        extra.push_str(&format!(r#" xmlns:wp="{}""#, NS_WP));
    }
    if !tag.contains("xmlns:r=") {
        extra.push_str(&format!(r#" xmlns:r="{}""#, NS_R));
    }
    let mut out = document.to_string();
    out.insert_str(close, &extra);
    out
}

fn add_image_relationship(rels: Option<&str>, target: &str) -> String {
    let relationship = format!(
        r#"<Relationship Id="{}" Type="{}/image" Target="{}"/>"#,
        QR_REL_ID, NS_R, target
    );
    let rels = rels.unwrap_or(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
    ));
    match rels.rfind("</Relationships>") {
        Some(at) => {
            let mut out = rels.to_string();
            out.insert_str(at, &relationship);
            out
        }
        None => rels.to_string(),
    }
}

fn ensure_png_content_type(content_types: &str) -> String {
    if content_types.contains(r#"Extension="png""#) {
        return content_types.to_string();
    }
    match content_types.rfind("</Types>") {
        Some(at) => {
            let mut out = content_types.to_string();
            out.insert_str(at, r#"<Default Extension="png" ContentType="image/png"/>"#);
            out
        }
        None => content_types.to_string(),
    }
}

pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes a dataset value for element text. `{` becomes a character
/// reference so inserted values can never form a placeholder.
fn field_text(value: &str) -> String {
    xml_escape(value).replace('{', "&#123;")
}

fn xml_unescape(text: &str) -> String {
    text.replace("&#123;", "{")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    struct Fixture {
        _root: tempfile::TempDir,
        template: PathBuf,
        qr: PathBuf,
        work: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let template = root.path().join("template.docx");
        testing::write_template(&template);
        let qr = root.path().join("qr.png");
        crate::qr::write_qr_png("http://localhost:8000/verify/abc", &qr).unwrap();
        let work = root.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        Fixture {
            _root: root,
            template,
            qr,
            work,
        }
    }

    fn fields<'a>(qr: &'a Path, name: &'a str) -> TemplateFields<'a> {
        TemplateFields {
            holder_name: name,
            program: "Test Program",
            certificate_id: "abc-123",
            qr_image_path: qr,
            issued_on: "01 June 2024".to_string(),
        }
    }

    fn part(path: &Path, name: &str) -> Option<String> {
        let mut archive = ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        read_part(&mut archive, name).unwrap()
    }

    fn binary_part(path: &Path, name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut content = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut content).unwrap();
        content
    }

    #[test]
    fn render_fills_every_placeholder() {
        let fx = fixture();
        let template = DocxTemplate::open(&fx.template).unwrap();
        let rendered = template.render(&fields(&fx.qr, "Test User"), &fx.work).unwrap();

        let document = part(rendered.path(), DOCUMENT_PART).unwrap();
        assert!(!document.contains("{{"));
        assert!(document.contains(r#"<w:t xml:space="preserve">Awarded to </w:t>"#));
        assert!(document.contains(r#"w:ascii="Times New Roman""#));
        assert!(document.contains("<w:b/>"));
        assert!(document.contains("<w:i/>"));
        assert!(document.contains(r#"<w:sz w:val="56"/>"#));
        assert!(document.contains(r#"<wp:extent cx="1080000" cy="1080000"/>"#));
        assert!(document.contains("ID: abc-123"));
        assert!(document.contains("for completing Test Program"));
        assert!(document.contains("01 June 2024"));
        assert!(document.contains(&format!(r#"xmlns:wp="{}""#, NS_WP)));

        let rels = part(rendered.path(), RELS_PART).unwrap();
        assert!(rels.contains(r#"Target="media/qr_abc-123.png""#));
        let types = part(rendered.path(), CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"Extension="png""#));
        let png = binary_part(rendered.path(), "word/media/qr_abc-123.png");
        assert_eq!(png, std::fs::read(&fx.qr).unwrap());
    }

    #[test]
    fn render_leaves_template_untouched_and_cleans_up() {
        let fx = fixture();
        let before = std::fs::read(&fx.template).unwrap();
        let template = DocxTemplate::open(&fx.template).unwrap();

        let path = {
            let rendered = template.render(&fields(&fx.qr, "Test User"), &fx.work).unwrap();
            assert!(rendered.path().starts_with(&fx.work));
            rendered.path().to_path_buf()
        };

        assert!(!path.exists());
        assert_eq!(std::fs::read(&fx.template).unwrap(), before);
        let again = template.render(&fields(&fx.qr, "Other"), &fx.work).unwrap();
        let document = part(again.path(), DOCUMENT_PART).unwrap();
        assert!(document.contains(">Other</w:t>"));
        assert!(!document.contains("Test User"));
    }

    #[test]
    fn names_are_xml_escaped() {
        let fx = fixture();
        let template = DocxTemplate::open(&fx.template).unwrap();
        let rendered = template
            .render(&fields(&fx.qr, "Tom & <Jerry>"), &fx.work)
            .unwrap();
        let paragraphs = extract_paragraphs(rendered.path()).unwrap();
        assert!(paragraphs.iter().any(|p| p == "Awarded to Tom & <Jerry>"));
    }

    #[test]
    fn missing_template_is_reported() {
        let err = DocxTemplate::open(Path::new("/definitely/not/here.docx")).unwrap_err();
        assert!(matches!(err, TemplateError::Missing(_)));
    }

    #[test]
    fn extract_paragraphs_skips_empty_ones() {
        let fx = fixture();
        let template = DocxTemplate::open(&fx.template).unwrap();
        let rendered = template.render(&fields(&fx.qr, "Test User"), &fx.work).unwrap();

        let paragraphs = extract_paragraphs(rendered.path()).unwrap();
        assert_eq!(
            paragraphs,
            vec![
                "Certificate of Completion",
                "Awarded to Test User",
                "for completing Test Program",
                "ID: abc-123 01 June 2024",
            ]
        );
    }

    #[test]
    fn run_split_keeps_text_around_placeholder() {
        let xml = r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Dear {{ holder_name }}, welcome</w:t></w:r></w:p>"#;
        let out = replace_runs(xml, "holder_name", "<X/>").unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Dear </w:t></w:r>"#,
                r#"<X/>"#,
                r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">, welcome</w:t></w:r></w:p>"#,
            )
        );
    }

    #[test]
    fn holder_name_holding_its_own_placeholder_is_inserted_once() {
        let xml = "<w:p><w:r><w:t>Awarded to {{ holder_name }}</w:t></w:r></w:p>";
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(replace_runs(xml, "holder_name", &styled_name_run("{{holder_name}}")));
        });
        let out = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("replacement did not terminate")
            .unwrap();
        assert_eq!(out.matches("<w:rFonts").count(), 1);
        assert!(out.contains("&#123;&#123;holder_name}}"));
    }

    #[test]
    fn repeated_placeholders_in_one_run_are_all_replaced() {
        let xml = "<w:p><w:r><w:t>{{ holder_name }} and {{ holder_name }}</w:t></w:r></w:p>";
        let out = replace_runs(xml, "holder_name", "<X/>").unwrap();
        assert_eq!(out.matches("<X/>").count(), 2);
        assert!(!out.contains("{{"));
    }

    #[test]
    fn dataset_values_are_copied_verbatim() {
        let fx = fixture();
        let template = DocxTemplate::open(&fx.template).unwrap();
        let fields = TemplateFields {
            holder_name: "Eve {{ certificate_id }}",
            program: "{{ date }} Studies",
            certificate_id: "abc-123",
            qr_image_path: &fx.qr,
            issued_on: "01 June 2024".to_string(),
        };
        let rendered = template.render(&fields, &fx.work).unwrap();

        let paragraphs = extract_paragraphs(rendered.path()).unwrap();
        assert!(paragraphs.iter().any(|p| p == "Awarded to Eve {{ certificate_id }}"));
        assert!(paragraphs
            .iter()
            .any(|p| p == "for completing {{ date }} Studies"));
    }

    #[test]
    fn placeholder_outside_a_run_is_rejected() {
        let xml = r#"<w:p><w:r><w:t>x</w:t></w:r>{{ holder_name }}</w:p>"#;
        assert!(matches!(
            replace_runs(xml, "holder_name", ""),
            Err(TemplateError::Placeholder("holder_name"))
        ));
    }
}
