//! Writing rows to disk.
//!
//! The output format follows the destination's extension: `.csv` writes a
//! header line and one line per row, `.json` writes an array of objects keyed
//! by the same header names.
//!
//! ```no_run
//! use framemood::{TableOptions, write_table};
//!
//! # let rows: Vec<framemood::EmotionRow> = Vec::new();
//! write_table(&rows, "emotions.csv", &TableOptions::default())?;
//! # Ok::<(), framemood::FramemoodError>(())
//! ```

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde_json::{Map, Value};

use crate::{
    aggregate::{Emotion, EmotionRow},
    error::FramemoodError,
};

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Comma-separated values with a header line.
    Csv,
    /// Pretty-printed JSON array.
    Json,
}

impl TableFormat {
    /// Pick a format from the path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, FramemoodError> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("csv") => Ok(TableFormat::Csv),
            Some("json") => Ok(TableFormat::Json),
            _ => Err(FramemoodError::UnsupportedTableFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Table writer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOptions {
    /// Append a `status` column (`ok` or the failure kind) after the scores.
    pub status_column: bool,
}

impl TableOptions {
    /// Enable or disable the trailing `status` column.
    #[must_use]
    pub fn with_status_column(mut self, enabled: bool) -> Self {
        self.status_column = enabled;
        self
    }
}

/// Header cells in output order.
pub fn header(options: &TableOptions) -> Vec<&'static str> {
    let mut columns = vec!["Frame"];
    columns.extend(Emotion::ALL.iter().map(|emotion| emotion.label()));
    if options.status_column {
        columns.push("status");
    }
    columns
}

/// Write `rows` to `path` in the format its extension names.
///
/// # Errors
///
/// [`FramemoodError::UnsupportedTableFormat`] for an unknown extension, or
/// an I/O / serialization error while writing.
pub fn write_table(
    rows: &[EmotionRow],
    path: impl AsRef<Path>,
    options: &TableOptions,
) -> Result<(), FramemoodError> {
    let path = path.as_ref();
    let format = TableFormat::from_path(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        TableFormat::Csv => write_csv(rows, &mut writer, options)?,
        TableFormat::Json => write_json(rows, &mut writer, options)?,
    }
    writer.flush()?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write rows as CSV.
pub fn write_csv<W: Write>(
    rows: &[EmotionRow],
    writer: &mut W,
    options: &TableOptions,
) -> Result<(), FramemoodError> {
    writeln!(writer, "{}", header(options).join(","))?;
    for row in rows {
        write!(writer, "{}", row.frame)?;
        for score in row.scores() {
            write!(writer, ",{score:.6}")?;
        }
        if options.status_column {
            write!(writer, ",{}", row.status().tag())?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write rows as a JSON array of objects.
pub fn write_json<W: Write>(
    rows: &[EmotionRow],
    writer: &mut W,
    options: &TableOptions,
) -> Result<(), FramemoodError> {
    if !options.status_column {
        serde_json::to_writer_pretty(&mut *writer, rows)?;
        writeln!(writer)?;
        return Ok(());
    }

    let records: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut record = match serde_json::to_value(row) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            record.insert("status".to_string(), Value::from(row.status().tag()));
            Value::Object(record)
        })
        .collect();
    serde_json::to_writer_pretty(&mut *writer, &records)?;
    writeln!(writer)?;
    Ok(())
}
