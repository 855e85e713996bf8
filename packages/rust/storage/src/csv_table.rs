//! The single CSV dialect used by every export file.
//!
//! RFC 4180, comma separated, `\n` terminated. Header cells are quoted only
//! when needed so the header reads as the comma-joined field names; data
//! cells are always quoted, with embedded quotes doubled.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::debug;
use wisdom_shared::{Result, WisdomError};

/// One data row, position-aligned to a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow(Vec<String>);

impl CsvRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self(cells)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }
}

/// A whole CSV file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl CsvTable {
    /// Index of a header cell, compared case-insensitively.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }
}

pub(crate) fn csv_error(path: &Path, err: csv::Error) -> WisdomError {
    match err.into_kind() {
        csv::ErrorKind::Io(source) => WisdomError::io(path, source),
        other => WisdomError::validation(format!("{}: malformed CSV: {other:?}", path.display())),
    }
}

/// Write the header record.
pub(crate) fn write_header<W: Write>(out: W, header: &[String], path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    writer
        .write_record(header)
        .map_err(|e| csv_error(path, e))?;
    writer.flush().map_err(|e| WisdomError::io(path, e))
}

/// Write data records.
pub(crate) fn write_rows<'a, W: Write>(
    out: W,
    rows: impl IntoIterator<Item = &'a CsvRow>,
    path: &Path,
) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    for row in rows {
        writer
            .write_record(row.cells())
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| WisdomError::io(path, e))
}

/// Read a CSV file with its header. Every record must match the header width.
pub fn read_table(path: &Path) -> Result<CsvTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let header = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        rows.push(CsvRow::new(record.iter().map(str::to_string).collect()));
    }

    Ok(CsvTable { header, rows })
}

/// Replace `path` with `table`.
///
/// The table is written to a sibling temp file, read back and checked
/// (same row count, every row as wide as the header) before it is renamed
/// over the original. The original is untouched if any step fails.
pub fn replace_table(path: &Path, table: &CsvTable) -> Result<()> {
    if let Some(row) = table.rows.iter().find(|r| r.len() != table.header.len()) {
        return Err(WisdomError::validation(format!(
            "{}: row has {} cells, header has {}",
            path.display(),
            row.len(),
            table.header.len()
        )));
    }

    let temp = temp_path(path);
    {
        let file = File::create(&temp).map_err(|e| WisdomError::io(&temp, e))?;
        let mut out = BufWriter::new(file);
        write_header(&mut out, &table.header, &temp)?;
        write_rows(&mut out, &table.rows, &temp)?;
        out.flush().map_err(|e| WisdomError::io(&temp, e))?;
    }

    let written = match read_table(&temp) {
        Ok(written) => written,
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }
    };
    if written.header != table.header || written.rows.len() != table.rows.len() {
        let _ = std::fs::remove_file(&temp);
        return Err(WisdomError::validation(format!(
            "{}: verification failed ({} of {} rows read back)",
            temp.display(),
            written.rows.len(),
            table.rows.len()
        )));
    }

    std::fs::rename(&temp, path).map_err(|e| WisdomError::io(path, e))?;
    debug!(path = %path.display(), rows = table.rows.len(), "replaced CSV");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.new.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wisdom-csv-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn rows_are_always_quoted() {
        let mut buf = Vec::new();
        let rows = vec![CsvRow::new(vec![
            "plain".into(),
            "with \"quotes\"".into(),
            "a,b".into(),
            String::new(),
        ])];
        write_rows(&mut buf, &rows, Path::new("mem")).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "\"plain\",\"with \"\"quotes\"\"\",\"a,b\",\"\"\n"
        );
    }

    #[test]
    fn header_is_comma_joined() {
        let mut buf = Vec::new();
        write_header(
            &mut buf,
            &["Title".to_string(), "Body".to_string()],
            Path::new("mem"),
        )
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Title,Body\n");
    }

    #[test]
    fn replace_table_roundtrips_multiline_cells() {
        let dir = temp_dir();
        let path = dir.join("t.csv");
        std::fs::write(&path, "A,B\n\"1\",\"2\"\n").unwrap();

        let table = CsvTable {
            header: vec!["A".into(), "B".into(), "C".into()],
            rows: vec![CsvRow::new(vec![
                "1".into(),
                "line one\nline two".into(),
                "x,y".into(),
            ])],
        };
        replace_table(&path, &table).unwrap();

        let back = read_table(&path).unwrap();
        assert_eq!(back, table);
        assert!(!dir.join("t.csv.new.csv").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn replace_table_rejects_ragged_rows() {
        let dir = temp_dir();
        let path = dir.join("t.csv");
        std::fs::write(&path, "A,B\n").unwrap();

        let table = CsvTable {
            header: vec!["A".into(), "B".into()],
            rows: vec![CsvRow::new(vec!["only one".into()])],
        };
        assert!(replace_table(&path, &table).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A,B\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn column_lookup_ignores_case() {
        let table = CsvTable {
            header: vec!["Title".into(), "KnowledgeArticleId".into()],
            rows: vec![],
        };
        assert_eq!(table.column("knowledgearticleid"), Some(1));
        assert_eq!(table.column("Missing"), None);
    }
}
