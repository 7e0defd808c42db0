//! Identity lookup over the administrator-uploaded holder dataset.
//!
//! The dataset is a spreadsheet (`.xlsx`, `.xls`, `.ods`) or a `.csv` file with
//! the header row `national_id`, `code`, `holder_name`, `program`. Columns are
//! validated once when the file is loaded; rows are typed from then on.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;

pub const REQUIRED_COLUMNS: [&str; 4] = ["national_id", "code", "holder_name", "program"];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),
    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),
    #[error("dataset has no worksheet")]
    EmptyWorkbook,
    #[error("failed to read dataset: {0}")]
    Read(String),
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        Self::Read(err.to_string())
    }
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        Self::Read(err.to_string())
    }
}

impl From<calamine::Error> for DatasetError {
    fn from(err: calamine::Error) -> Self {
        Self::Read(err.to_string())
    }
}

/// One dataset line. Never persisted; issuance copies what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderRow {
    pub national_id: String,
    pub code: String,
    pub name: String,
    pub program: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Csv,
    Spreadsheet,
}

impl DatasetKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<HolderRow>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let kind = DatasetKind::from_path(path)
            .ok_or_else(|| DatasetError::UnsupportedFormat(path.display().to_string()))?;
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes, kind)
    }

    pub fn from_bytes(bytes: Vec<u8>, kind: DatasetKind) -> Result<Self, DatasetError> {
        match kind {
            DatasetKind::Csv => Self::from_csv(&bytes),
            DatasetKind::Spreadsheet => Self::from_spreadsheet(bytes),
        }
    }

    fn from_csv(bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?.iter().map(str::to_string).collect());
        }
        Self::from_table(&headers, records)
    }

    fn from_spreadsheet(bytes: Vec<u8>) -> Result<Self, DatasetError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(DatasetError::EmptyWorkbook)??;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(cell_text).collect(),
            None => Vec::new(),
        };
        let records = rows.map(|row| row.iter().map(cell_text).collect()).collect();
        Self::from_table(&headers, records)
    }

    fn from_table(headers: &[String], records: Vec<Vec<String>>) -> Result<Self, DatasetError> {
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<&'static str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| column(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(DatasetError::MissingColumns(missing));
        }

        // All four are present past the check above.
        let [id_col, code_col, name_col, program_col] =
            REQUIRED_COLUMNS.map(|name| column(name).unwrap_or_default());

        let field = |record: &[String], idx: usize| {
            record.get(idx).map(|v| v.trim().to_string()).unwrap_or_default()
        };

        let rows = records
            .iter()
            .map(|record| HolderRow {
                national_id: field(record, id_col),
                code: field(record, code_col),
                name: field(record, name_col),
                program: field(record, program_col),
            })
            .filter(|row| {
                !(row.national_id.is_empty()
                    && row.code.is_empty()
                    && row.name.is_empty()
                    && row.program.is_empty())
            })
            .collect();

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[HolderRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<HolderRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First matching row wins; duplicates are not rejected.
    pub fn find(
        &self,
        national_id: &str,
        code: Option<&str>,
        code_required: bool,
    ) -> Option<&HolderRow> {
        let national_id = national_id.trim();
        let code = code.map(str::trim);
        self.rows.iter().find(|row| {
            row.national_id == national_id
                && (!code_required || code.is_some_and(|c| row.code == c))
        })
    }
}

/// Resolves a holder from the dataset file at `path`.
///
/// A missing or unreadable dataset is a miss, not an error.
pub fn resolve(
    path: Option<&Path>,
    national_id: &str,
    code: Option<&str>,
    code_required: bool,
) -> Option<HolderRow> {
    let path = path?;
    match Dataset::load(path) {
        Ok(dataset) => dataset.find(national_id, code, code_required).cloned(),
        Err(e) => {
            tracing::warn!("Dataset {} unusable for lookup: {}", path.display(), e);
            None
        }
    }
}

/// Location of the currently uploaded dataset, whichever format it was stored in.
pub fn current_path(dataset_dir: &Path) -> Option<PathBuf> {
    ["xlsx", "xlsm", "xls", "ods", "csv"]
        .iter()
        .map(|ext| dataset_dir.join(format!("{}.{}", DATASET_STEM, ext)))
        .find(|p| p.exists())
}

pub const DATASET_STEM: &str = "certificates";

/// Renders a cell the way it reads in the sheet: integral numbers lose the `.0`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}
