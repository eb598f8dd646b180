//! Table schema model and its JSON side-car persistence.
//!
//! A [`SchemaDescriptor`] is produced once by [`infer::infer_schema`] and
//! saved next to the data file as `<table>.config.json`. On later runs the
//! side-car is loaded verbatim and never re-inferred, so an operator can
//! hand-edit widths, types and the `create` flag between `plan` runs.
//!
//! ## Side-car layout
//!
//! ```json
//! {
//!   "columns": {
//!     "city": { "original_name": "Город", "type": "VARCHAR2", "length": 12, "create": true }
//!   },
//!   "metadata": { "rowCount": 3, "tableName": "cities" },
//!   "columns_order": ["city"]
//! }
//! ```

pub mod infer;

use std::{
    collections::BTreeMap,
    fmt, fs,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StageError};

pub use infer::{ColumnAccumulator, infer_column, infer_schema, is_numeric_value};

pub const SIDECAR_SUFFIX: &str = ".config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "NUMBER", alias = "NUMERIC")]
    Number,
    #[serde(rename = "VARCHAR2", alias = "TEXT")]
    Varchar2,
    /// Only ever set by hand in the side-car.
    #[serde(rename = "DATE")]
    Date,
    /// Only ever set by hand in the side-car.
    #[serde(rename = "TIMESTAMP WITH TIME ZONE")]
    TimestampTz,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Number => "NUMBER",
            ColumnType::Varchar2 => "VARCHAR2",
            ColumnType::Date => "DATE",
            ColumnType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Header cell exactly as it appeared in the file.
    pub original_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(rename = "length")]
    pub width: usize,
    #[serde(rename = "create")]
    pub include: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    #[serde(rename = "tableName")]
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub columns: BTreeMap<String, ColumnDescriptor>,
    pub metadata: SchemaMetadata,
    #[serde(alias = "columnsOrder")]
    pub columns_order: Vec<String>,
}

impl SchemaDescriptor {
    pub fn table_name(&self) -> &str {
        &self.metadata.table_name
    }

    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(name)
    }

    /// Columns in file order. Names missing from `columns` are skipped;
    /// [`SchemaDescriptor::validate`] rejects such descriptors on load.
    pub fn ordered_columns(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.columns_order.iter().filter_map(|name| {
            self.columns
                .get(name)
                .map(|column| (name.as_str(), column))
        })
    }

    pub fn included_columns(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.ordered_columns().filter(|(_, column)| column.include)
    }

    /// Whether a header cell from the data file belongs to an included column.
    pub fn includes_header(&self, header: &str) -> bool {
        self.columns
            .values()
            .any(|column| column.include && column.original_name == header)
    }

    pub fn sidecar_path(data_file: &Path, table_name: &str) -> PathBuf {
        let dir = data_file.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!("{table_name}{SIDECAR_SUFFIX}"))
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let schema: SchemaDescriptor =
            serde_json::from_str(&contents).map_err(|err| StageError::CorruptSchema {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        schema.validate().map_err(|reason| StageError::CorruptSchema {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(schema)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.metadata.table_name.trim().is_empty() {
            return Err("metadata.tableName is empty".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.columns_order {
            if !seen.insert(name.as_str()) {
                return Err(format!("column '{name}' is listed twice in columns_order"));
            }
            let Some(column) = self.columns.get(name) else {
                return Err(format!(
                    "column '{name}' is listed in columns_order but missing from columns"
                ));
            };
            if column.width == 0 {
                return Err(format!("column '{name}' has length 0; the minimum is 1"));
            }
        }
        if let Some(orphan) = self.columns.keys().find(|name| !seen.contains(name.as_str())) {
            return Err(format!("column '{orphan}' is missing from columns_order"));
        }
        Ok(())
    }
}
