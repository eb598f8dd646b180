use itertools::Itertools;

use crate::schema::{ColumnDescriptor, ColumnType, SchemaDescriptor, infer::MIN_WIDTH};

/// Oracle `CREATE TABLE` for the included columns, in declared order.
pub fn create_table_sql(schema: &SchemaDescriptor) -> String {
    let mut sql = format!("CREATE TABLE {} (\n", schema.table_name());
    let definitions = schema
        .included_columns()
        .map(|(name, column)| format!("  {name} {}", column_sql_type(column)))
        .join(",\n");
    sql.push_str(&definitions);
    sql.push_str("\n);");
    sql
}

pub fn column_sql_type(column: &ColumnDescriptor) -> String {
    match column.column_type {
        ColumnType::Varchar2 => format!("VARCHAR2({})", column.width.max(MIN_WIDTH)),
        other => other.as_str().to_string(),
    }
}
