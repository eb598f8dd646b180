//! SQL*Loader control-file generation.

use std::{fs, path::Path};

use itertools::Itertools;

use crate::{encoding::LegacyCodec, error::Result, schema::SchemaDescriptor};

pub const ROWS: u32 = 65_535;
pub const BINDSIZE: u32 = 65_535_000;
pub const READSIZE: u32 = 65_535_000;
pub const ALLOWED_ERRORS: u32 = 0;
pub const SKIP_HEADER_ROWS: u32 = 1;

pub fn delimiter_clause(delimiter: u8) -> String {
    let terminator = match delimiter {
        b'\t' => "X'09'".to_string(),
        other => format!("'{}'", other as char),
    };
    format!("FIELDS TERMINATED BY {terminator} OPTIONALLY ENCLOSED BY '\"'")
}

/// Control file loading `data_file_name` into the schema's table, replacing
/// existing rows. SQL*Loader resolves the bare name against its working
/// directory, which `apply` sets to the data file's directory.
pub fn render_control_file(
    schema: &SchemaDescriptor,
    data_file_name: &str,
    delimiter: u8,
    codec: LegacyCodec,
) -> String {
    let table = schema.table_name();
    let fields = schema
        .included_columns()
        .map(|(name, _)| name)
        .join(",\n  ");
    format!(
        "OPTIONS (bad={table}_bad.log, log={table}.log, errors={ALLOWED_ERRORS}, \
         skip={SKIP_HEADER_ROWS}, ROWS={ROWS}, BINDSIZE={BINDSIZE}, READSIZE={READSIZE})\n\
         LOAD DATA\n\
         CHARACTERSET {charset}\n\
         INFILE '{data_file_name}'\n\
         INTO TABLE {table}\n\
         REPLACE\n\
         {clause}\n\
         \n\
         TRAILING NULLCOLS\n\
         (\n  {fields}\n)\n",
        charset = codec.oracle_charset(),
        clause = delimiter_clause(delimiter),
    )
}

pub fn write_control_file(
    path: &Path,
    schema: &SchemaDescriptor,
    data_file: &Path,
    delimiter: u8,
    codec: LegacyCodec,
) -> Result<()> {
    let data_file_name = data_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| data_file.display().to_string());
    let contents = render_control_file(schema, &data_file_name, delimiter, codec);
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, ColumnType, SchemaMetadata};
    use std::collections::BTreeMap;

    fn schema() -> SchemaDescriptor {
        let mut columns = BTreeMap::new();
        for (name, include) in [("id", true), ("empty1", false), ("city", true)] {
            columns.insert(
                name.to_string(),
                ColumnDescriptor {
                    original_name: name.to_string(),
                    column_type: ColumnType::Varchar2,
                    width: 4,
                    include,
                },
            );
        }
        SchemaDescriptor {
            columns,
            metadata: SchemaMetadata {
                row_count: 1,
                table_name: "towns".to_string(),
            },
            columns_order: vec!["id".into(), "empty1".into(), "city".into()],
        }
    }

    #[test]
    fn tab_renders_as_hex_escape() {
        assert_eq!(
            delimiter_clause(b'\t'),
            "FIELDS TERMINATED BY X'09' OPTIONALLY ENCLOSED BY '\"'"
        );
        assert_eq!(
            delimiter_clause(b';'),
            "FIELDS TERMINATED BY ';' OPTIONALLY ENCLOSED BY '\"'"
        );
    }

    #[test]
    fn control_file_lists_included_columns_in_order() {
        let rendered =
            render_control_file(&schema(), "towns--converted.csv", b',', LegacyCodec::default());
        let expected = "OPTIONS (bad=towns_bad.log, log=towns.log, errors=0, skip=1, ROWS=65535, BINDSIZE=65535000, READSIZE=65535000)
LOAD DATA
CHARACTERSET CL8MSWIN1251
INFILE 'towns--converted.csv'
INTO TABLE towns
REPLACE
FIELDS TERMINATED BY ',' OPTIONALLY ENCLOSED BY '\"'

TRAILING NULLCOLS
(
  id,
  city
)
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn written_file_references_data_file_by_name_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let ctl = dir.path().join("towns.ctl");
        let data = dir.path().join("towns--converted.csv");
        write_control_file(&ctl, &schema(), &data, b'\t', LegacyCodec::default())
            .expect("write ctl");
        let contents = std::fs::read_to_string(&ctl).unwrap();
        assert!(contents.contains("INFILE 'towns--converted.csv'\n"));
        assert!(contents.contains("X'09'"));
    }
}
