//! Replay table loader
//!
//! Reads pre-recorded samples from comma-separated text: one row per frame, one
//! column per channel in microvolts, with an optional header line and an
//! optional leading timestamp column.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use eeglink::replay::{ReplayTable, TableFormat};
//!
//! fn load() -> eeglink::Result<()> {
//!     let table = ReplayTable::open("session.csv", 8, TableFormat::default())?;
//!     println!("{} usable rows, {} malformed", table.valid_rows(), table.malformed_rows());
//!     Ok(())
//! }
//! ```
//!
//! Malformed rows are kept in place so that their line number can be reported
//! when the replay cursor reaches them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Result, StreamError};

/// Layout options for a replay table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFormat {
    /// First line holds column names
    pub has_header: bool,
    /// First column holds a timestamp that is not replayed
    pub timestamp_column: bool,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self { has_header: true, timestamp_column: false }
    }
}

/// One table row, either parsed microvolt values or the reason it is unusable.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRow {
    Values(Vec<f64>),
    Malformed { line: usize, details: String },
}

/// An ordered, finite, read-only table of recorded frames.
#[derive(Debug, Clone)]
pub struct ReplayTable {
    rows: Vec<TableRow>,
    channels: usize,
    path: PathBuf,
}

impl ReplayTable {
    /// Load a table file, keeping the first `channels` value columns of every row.
    pub fn open<P: AsRef<Path>>(path: P, channels: usize, format: TableFormat) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;

        let mut table = Self::from_text(&text, channels, format)?;
        table.path = path.to_path_buf();
        info!(
            "Loaded replay table {}: {} rows ({} malformed), {} channels",
            path.display(),
            table.len(),
            table.malformed_rows(),
            channels
        );
        Ok(table)
    }

    /// Parse a table from in-memory text.
    pub fn from_text(text: &str, channels: usize, format: TableFormat) -> Result<Self> {
        if channels == 0 {
            return Err(StreamError::config("replay table needs at least one channel"));
        }

        let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line));
        if format.has_header {
            if let Some((_, header)) = lines.next() {
                debug!("Replay table header: {}", header.trim());
            }
        }

        let rows: Vec<TableRow> = lines
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| parse_row(line_no, line, channels, format.timestamp_column))
            .collect();

        if rows.is_empty() {
            return Err(StreamError::config("replay table contains no data rows"));
        }

        let table = Self { rows, channels, path: PathBuf::from("<memory>") };
        if table.valid_rows() == 0 {
            return Err(StreamError::config(format!(
                "replay table has no usable rows ({} malformed)",
                table.malformed_rows()
            )));
        }
        if table.malformed_rows() > 0 {
            warn!("Replay table has {} malformed rows that will be skipped", table.malformed_rows());
        }

        Ok(table)
    }

    /// Total rows, malformed included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn valid_rows(&self) -> usize {
        self.rows.iter().filter(|r| matches!(r, TableRow::Values(_))).count()
    }

    pub fn malformed_rows(&self) -> usize {
        self.len() - self.valid_rows()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row(&self, index: usize) -> Option<&TableRow> {
        self.rows.get(index)
    }
}

fn parse_row(line_no: usize, line: &str, channels: usize, timestamp_column: bool) -> TableRow {
    let skip = usize::from(timestamp_column);
    let cells: Vec<&str> = line.split(',').map(str::trim).skip(skip).collect();

    if cells.len() < channels {
        return TableRow::Malformed {
            line: line_no,
            details: format!("expected {} value columns, found {}", channels, cells.len()),
        };
    }

    let mut values = Vec::with_capacity(channels);
    for (column, cell) in cells.iter().take(channels).enumerate() {
        match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => values.push(v),
            Ok(_) => {
                return TableRow::Malformed {
                    line: line_no,
                    details: format!("column {} is not finite", column + skip),
                };
            }
            Err(_) => {
                return TableRow::Malformed {
                    line: line_no,
                    details: format!("column {} is not numeric: '{}'", column + skip, cell),
                };
            }
        }
    }

    TableRow::Values(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_header_and_rows() {
        let text = "Channel_1,Channel_2\n1.5,-2.5\n3,4\n";
        let table = ReplayTable::from_text(text, 2, TableFormat::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0), Some(&TableRow::Values(vec![1.5, -2.5])));
        assert_eq!(table.row(1), Some(&TableRow::Values(vec![3.0, 4.0])));
    }

    #[test]
    fn extra_columns_are_ignored() {
        let text = "1,2,3,4\n";
        let format = TableFormat { has_header: false, ..TableFormat::default() };
        let table = ReplayTable::from_text(text, 2, format).unwrap();
        assert_eq!(table.row(0), Some(&TableRow::Values(vec![1.0, 2.0])));
    }

    #[test]
    fn timestamp_column_is_skipped() {
        let text = "t,a,b\n0.004,10,20\n";
        let format = TableFormat { has_header: true, timestamp_column: true };
        let table = ReplayTable::from_text(text, 2, format).unwrap();
        assert_eq!(table.row(0), Some(&TableRow::Values(vec![10.0, 20.0])));
    }

    #[test]
    fn malformed_rows_keep_their_line_numbers() {
        let text = "a,b\n1,2\n3\nx,4\n5,NaN\n6,7\n";
        let table = ReplayTable::from_text(text, 2, TableFormat::default()).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.valid_rows(), 2);
        assert!(matches!(table.row(1), Some(TableRow::Malformed { line: 3, .. })));
        assert!(matches!(table.row(2), Some(TableRow::Malformed { line: 4, .. })));
        assert!(matches!(table.row(3), Some(TableRow::Malformed { line: 5, .. })));
    }

    #[test]
    fn blank_lines_are_not_rows() {
        let text = "a\n1\n\n2\n   \n";
        let table = ReplayTable::from_text(text, 1, TableFormat::default()).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn empty_or_unusable_tables_are_config_errors() {
        assert!(matches!(
            ReplayTable::from_text("a,b\n", 2, TableFormat::default()),
            Err(StreamError::Config { .. })
        ));
        assert!(matches!(
            ReplayTable::from_text("a,b\nx,y\n", 2, TableFormat::default()),
            Err(StreamError::Config { .. })
        ));
        assert!(ReplayTable::from_text("1\n", 0, TableFormat::default()).is_err());
    }

    #[test]
    fn open_reads_file_and_reports_missing_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "c1,c2,c3").unwrap();
        writeln!(file, "1,2,3").unwrap();
        let table = ReplayTable::open(file.path(), 3, TableFormat::default()).unwrap();
        assert_eq!(table.path(), file.path());
        assert_eq!(table.valid_rows(), 1);

        let missing = ReplayTable::open("/definitely/not/here.csv", 3, TableFormat::default());
        assert!(matches!(missing, Err(StreamError::File { .. })));
    }
}
