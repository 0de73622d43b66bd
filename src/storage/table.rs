//! Delimited-text tables and the per-date partition merge.
//!
//! Report files carry three header/metadata rows followed by data rows whose
//! first field is the observation date. Nothing else about the schema is
//! assumed, and rows may differ in width. Fields are kept as raw bytes so
//! payloads in a legacy encoding are written back unchanged.

use std::collections::HashSet;

use csv::{ByteRecord, QuoteStyle, ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};

/// Number of leading header/metadata rows.
pub const HEADER_ROWS: usize = 3;

/// Rows of byte fields, in source-line order.
#[derive(Debug, Clone, Default)]
pub struct RowTable {
    rows: Vec<ByteRecord>,
}

impl RowTable {
    pub fn new(rows: Vec<ByteRecord>) -> Self {
        Self { rows }
    }

    /// Read `data` as `delimiter`-separated records.
    ///
    /// Quote characters are ordinary field bytes. Any line ending is accepted
    /// and blank lines are skipped.
    pub fn parse(data: &[u8], delimiter: u8) -> Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(data);

        let rows = reader.byte_records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    /// Inverse of [`RowTable::parse`]; every record ends with `\n`.
    pub fn serialize(&self, delimiter: u8) -> Result<Vec<u8>, csv::Error> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .quote_style(QuoteStyle::Never)
            .from_writer(Vec::new());

        for row in &self.rows {
            writer.write_byte_record(row)?;
        }

        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }

    pub fn rows(&self) -> &[ByteRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header_rows(&self) -> &[ByteRecord] {
        &self.rows[..self.rows.len().min(HEADER_ROWS)]
    }

    pub fn data_rows(&self) -> &[ByteRecord] {
        &self.rows[self.rows.len().min(HEADER_ROWS)..]
    }

    /// Data rows whose `column` field equals `token`.
    pub fn rows_for<'a>(
        &'a self,
        column: usize,
        token: &'a str,
    ) -> impl Iterator<Item = &'a ByteRecord> + 'a {
        self.data_rows()
            .iter()
            .filter(move |row| row.get(column) == Some(token.as_bytes()))
    }

    /// Distinct values of `column` across data rows, in first-seen order.
    ///
    /// Empty and non-UTF-8 values are skipped; neither can be a date.
    pub fn distinct_values(&self, column: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for field in self.data_rows().iter().filter_map(|row| row.get(column)) {
            let Ok(value) = std::str::from_utf8(field) else {
                continue;
            };
            if !value.is_empty() && seen.insert(value) {
                values.push(value.to_string());
            }
        }
        values
    }
}

fn row_key(row: &ByteRecord) -> Vec<&[u8]> {
    row.iter().collect()
}

/// How incoming rows are combined with a partition's existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Append every matching incoming row. Re-merging unchanged upstream
    /// data duplicates rows (at-least-once).
    #[default]
    Append,
    /// Skip incoming rows identical to one already in the partition.
    Deduplicate,
}

/// Parses report payloads and folds them into per-date partition files.
#[derive(Debug, Clone)]
pub struct CsvMerger {
    pub delimiter: u8,
    pub date_column: usize,
    pub mode: MergeMode,
}

impl Default for CsvMerger {
    fn default() -> Self {
        Self {
            delimiter: b';',
            date_column: 0,
            mode: MergeMode::Append,
        }
    }
}

impl CsvMerger {
    pub fn new(delimiter: u8, mode: MergeMode) -> Self {
        Self {
            delimiter,
            mode,
            ..Default::default()
        }
    }

    pub fn parse(&self, data: &[u8]) -> Result<RowTable, csv::Error> {
        RowTable::parse(data, self.delimiter)
    }

    pub fn serialize(&self, table: &RowTable) -> Result<Vec<u8>, csv::Error> {
        table.serialize(self.delimiter)
    }

    /// Fold the rows of `incoming` dated `token` into an existing partition.
    ///
    /// Output: the existing header rows verbatim, then the matching incoming
    /// rows in source order, then every existing data row.
    pub fn merge(
        &self,
        existing: &[u8],
        incoming: &[u8],
        token: &str,
    ) -> Result<Vec<u8>, csv::Error> {
        let merged = self.merge_tables(&self.parse(existing)?, &self.parse(incoming)?, token);
        self.serialize(&merged)
    }

    /// [`CsvMerger::merge`] on already parsed tables.
    pub fn merge_tables(&self, existing: &RowTable, incoming: &RowTable, token: &str) -> RowTable {
        let mut rows: Vec<ByteRecord> = existing.header_rows().to_vec();

        match self.mode {
            MergeMode::Append => {
                rows.extend(incoming.rows_for(self.date_column, token).cloned());
            }
            MergeMode::Deduplicate => {
                let mut seen: HashSet<Vec<&[u8]>> =
                    existing.data_rows().iter().map(row_key).collect();
                for row in incoming.rows_for(self.date_column, token) {
                    if seen.insert(row_key(row)) {
                        rows.push(row.clone());
                    }
                }
            }
        }

        rows.extend(existing.data_rows().iter().cloned());
        RowTable::new(rows)
    }

    /// A new partition: the incoming header rows plus the rows dated `token`.
    pub fn fresh(&self, incoming: &RowTable, token: &str) -> RowTable {
        let mut rows: Vec<ByteRecord> = incoming.header_rows().to_vec();
        match self.mode {
            MergeMode::Append => rows.extend(incoming.rows_for(self.date_column, token).cloned()),
            MergeMode::Deduplicate => {
                let mut seen = HashSet::new();
                rows.extend(
                    incoming
                        .rows_for(self.date_column, token)
                        .filter(|row| seen.insert(row_key(*row)))
                        .cloned(),
                );
            }
        }
        RowTable::new(rows)
    }
}
