use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
};

use log::{info, warn};

use crate::{
    config::Credentials,
    error::{Result, StageError},
    loader::combined_output,
};

pub const DEFAULT_SQLPLUS: &str = "sqlplus";
const NAME_ALREADY_USED: &str = "ORA-00955";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCreation {
    Created,
    AlreadyExists,
}

/// Executes a `CREATE TABLE` statement against the target database.
pub trait TableCreator {
    fn create_table(&self, credentials: &Credentials, ddl: &str) -> Result<TableCreation>;
}

/// Creates tables by piping a script into `sqlplus`.
#[derive(Debug, Clone)]
pub struct SqlPlus {
    program: PathBuf,
}

impl SqlPlus {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SqlPlus {
    fn default() -> Self {
        Self::new(DEFAULT_SQLPLUS)
    }
}

impl TableCreator for SqlPlus {
    fn create_table(&self, credentials: &Credentials, ddl: &str) -> Result<TableCreation> {
        let launch_failure = |err: std::io::Error| StageError::TableCreationFailed {
            reason: format!("failed to run {}: {err}", self.program.display()),
            output: String::new(),
        };
        let mut child = Command::new(&self.program)
            .arg("-S")
            .arg("-L")
            .arg(credentials.connect_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch_failure)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(creation_script(ddl).as_bytes())
                .map_err(launch_failure)?;
        }
        let output = child.wait_with_output().map_err(launch_failure)?;
        let creation = classify(output.status.success(), &combined_output(&output))?;
        match creation {
            TableCreation::Created => info!("Table created"),
            TableCreation::AlreadyExists => warn!("Table already exists; keeping it"),
        }
        Ok(creation)
    }
}

pub fn creation_script(ddl: &str) -> String {
    format!("WHENEVER SQLERROR EXIT SQL.SQLCODE\n{ddl}\nEXIT\n")
}

/// An `ORA-00955` (name already used) response means the table is already
/// there, which is not treated as a failure.
pub fn classify(success: bool, output: &str) -> Result<TableCreation> {
    if output.contains(NAME_ALREADY_USED) {
        return Ok(TableCreation::AlreadyExists);
    }
    if success && !output.contains("ORA-") && !output.contains("SP2-") {
        return Ok(TableCreation::Created);
    }
    Err(StageError::TableCreationFailed {
        reason: "sqlplus reported an error".to_string(),
        output: output.to_string(),
    })
}
