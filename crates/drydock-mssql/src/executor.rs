//! SQL execution seam and the tabular result model.

use async_trait::async_trait;
use std::path::Path;

use drydock_engine::target::TargetError;

/// Executes SQL text against the target server.
///
/// Both metadata queries and mutating commands go through here. Any
/// statement error aborts the call — there is no partial-batch
/// continuation.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a single read-only statement and return its result set.
    async fn query(&self, sql: &str) -> Result<Table, TargetError>;

    /// Run a single statement for effect; result sets are discarded.
    async fn execute(&self, sql: &str) -> Result<(), TargetError>;

    /// Run a multi-batch script file, aborting on the first failing batch.
    async fn run_file(&self, path: &Path) -> Result<(), TargetError>;
}

/// A result set: column names plus rows of string cells.
///
/// Cells are the textual renderings the transport produced. NULL is carried
/// as the literal `NULL`; free-text columns that may contain newlines or
/// the column separator must be selected through the hex protocol and read
/// back with [`Row::get_hex_text`].
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row {
            columns: &self.columns,
            cells,
        })
    }
}

/// One row of a [`Table`], with typed column accessors.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    cells: &'a [String],
}

impl<'a> Row<'a> {
    fn cell(&self, column: &str) -> Result<&'a str, TargetError> {
        let at = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| TargetError::Decode(format!("missing column `{column}`")))?;
        self.cells
            .get(at)
            .map(String::as_str)
            .ok_or_else(|| TargetError::Decode(format!("short row at column `{column}`")))
    }

    pub fn get_str(&self, column: &str) -> Result<&'a str, TargetError> {
        self.cell(column)
    }

    /// NULL-aware accessor: the literal `NULL` reads as `None`.
    pub fn get_opt_str(&self, column: &str) -> Result<Option<&'a str>, TargetError> {
        let cell = self.cell(column)?;
        Ok(if cell == "NULL" { None } else { Some(cell) })
    }

    pub fn get_i32(&self, column: &str) -> Result<i32, TargetError> {
        let cell = self.cell(column)?;
        cell.parse().map_err(|_| {
            TargetError::Decode(format!("column `{column}`: `{cell}` is not an i32"))
        })
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, TargetError> {
        let cell = self.cell(column)?;
        cell.parse().map_err(|_| {
            TargetError::Decode(format!("column `{column}`: `{cell}` is not an i64"))
        })
    }

    /// Bit/tinyint flag: `1` is true, `0` is false.
    pub fn get_bool(&self, column: &str) -> Result<bool, TargetError> {
        match self.cell(column)? {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(TargetError::Decode(format!(
                "column `{column}`: `{other}` is not a flag"
            ))),
        }
    }

    /// Decode a free-text column selected as
    /// `CONVERT(VARCHAR(MAX), CAST(col AS VARBINARY(MAX)), 1)`: a `0x…` hex
    /// rendering of the column's UTF-16LE bytes.
    pub fn get_hex_text(&self, column: &str) -> Result<String, TargetError> {
        decode_hex_utf16(self.cell(column)?)
            .map_err(|reason| TargetError::Decode(format!("column `{column}`: {reason}")))
    }
}

fn decode_hex_utf16(cell: &str) -> Result<String, String> {
    let digits = cell
        .strip_prefix("0x")
        .ok_or_else(|| format!("`{cell}` is not a 0x hex literal"))?;
    let bytes = hex::decode(digits).map_err(|e| format!("bad hex: {e}"))?;
    if bytes.len() % 2 != 0 {
        return Err("odd byte count for UTF-16LE text".to_string());
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| "invalid UTF-16LE text".to_string())
}
