//! Fixtures shared by the unit tests: holder rows, datasets, a DOCX template
//! and a configuration rooted in a scratch directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zip::write::SimpleFileOptions;

use crate::config::{AdminCredentials, Config, OfficeSettings};
use crate::dataset::HolderRow;
use crate::pipeline::BatchFailurePolicy;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-secret";

pub fn holder() -> HolderRow {
    HolderRow {
        national_id: "12345678".into(),
        code: "COD123".into(),
        name: "Test User".into(),
        program: "Test Program".into(),
    }
}

pub fn holder_named(national_id: &str, name: &str) -> HolderRow {
    HolderRow {
        national_id: national_id.into(),
        code: format!("C{}", national_id),
        name: name.into(),
        program: "Test Program".into(),
    }
}

pub fn csv_dataset(rows: &[HolderRow]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["national_id", "code", "holder_name", "program"])
        .unwrap();
    for row in rows {
        writer
            .write_record([&row.national_id, &row.code, &row.name, &row.program])
            .unwrap();
    }
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

pub fn write_csv_dataset(path: &Path, rows: &[HolderRow]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, csv_dataset(rows)).unwrap();
}

pub const TEMPLATE_DOCUMENT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    r#"<w:p><w:r><w:t>Certificate of Completion</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:rPr><w:sz w:val="24"/></w:rPr><w:t xml:space="preserve">Awarded to {{ holder_name }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>for completing {{program}}</w:t></w:r></w:p>"#,
    r#"<w:p/>"#,
    r#"<w:p><w:r><w:t>{{ qr_code }}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>ID: {{ certificate_id }}</w:t></w:r><w:r><w:tab/><w:t>{{ date }}</w:t></w:r></w:p>"#,
    r#"</w:body></w:document>"#,
);

pub fn write_template(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let entries = [
        (
            "[Content_Types].xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                r#"</Types>"#,
            ),
        ),
        (
            "_rels/.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
                r#"</Relationships>"#,
            ),
        ),
        ("word/document.xml", TEMPLATE_DOCUMENT),
        (
            "word/_rels/document.xml.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"</Relationships>"#,
            ),
        ),
    ];
    for (name, content) in entries {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Configuration that can never reach the office suite or system fonts, so
/// conversions deterministically land on the last converter state.
pub fn config(root: &Path) -> Config {
    let template_path = root.join("word_templates").join("certificate_template.docx");
    write_template(&template_path);
    let fonts = root.join("fonts");
    std::fs::create_dir_all(&fonts).unwrap();

    let config = Config {
        database_url: None,
        host: "127.0.0.1".into(),
        port: 0,
        base_url: "http://localhost:8000".into(),
        media_root: root.join("media"),
        template_path,
        font_dir: Some(fonts),
        font_family: "LiberationSerif".into(),
        office: OfficeSettings {
            enabled: false,
            binary: PathBuf::from("soffice"),
            timeout: Duration::from_secs(5),
        },
        admin: Some(AdminCredentials {
            username: ADMIN_USER.into(),
            password: ADMIN_PASSWORD.into(),
        }),
        batch_failure_policy: BatchFailurePolicy::Skip,
        session_ttl: Duration::from_secs(600),
    };
    crate::storage::ensure_dirs(&config).unwrap();
    config
}

pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Scratch font directory holding one complete system family, or `None` on
/// hosts without any of the known families installed.
pub fn font_dir_fixture() -> Option<tempfile::TempDir> {
    let (system_dir, family) = crate::pdf::find_system_family()?;
    let dir = tempfile::tempdir().unwrap();
    for file in &family.styles {
        std::fs::copy(system_dir.join(file), dir.path().join(file)).unwrap();
    }
    Some(dir)
}
