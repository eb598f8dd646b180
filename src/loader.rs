use std::{
    path::{self, Path, PathBuf},
    process::{Command, Output},
};

use log::{debug, info};

use crate::{
    config::Credentials,
    error::{Result, StageError},
};

pub const DEFAULT_SQLLDR: &str = "sqlldr";
pub const COMMAND_LINE_ERRORS: u32 = 10;

/// Runs a bulk load described by a control file and returns its console output.
///
/// `working_dir` is where the loader resolves the control file's bare
/// `INFILE` name and writes its bad and log files.
pub trait BulkLoader {
    fn load(
        &self,
        credentials: &Credentials,
        control_file: &Path,
        working_dir: &Path,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct SqlLoader {
    program: PathBuf,
}

impl SqlLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `sqlldr` invocation with bad/log files named after the control file stem.
    /// `control_file` should be absolute once `working_dir` is set.
    pub fn command(
        &self,
        credentials: &Credentials,
        control_file: &Path,
        working_dir: &Path,
    ) -> Command {
        let table = control_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut command = Command::new(&self.program);
        command
            .arg(format!("userid={}", credentials.connect_string()))
            .arg(format!("control={}", control_file.display()))
            .arg(format!("bad={table}_bad.bad"))
            .arg(format!("log={table}.log"))
            .arg(format!("errors={COMMAND_LINE_ERRORS}"));
        if !working_dir.as_os_str().is_empty() {
            command.current_dir(working_dir);
        }
        command
    }
}

impl Default for SqlLoader {
    fn default() -> Self {
        Self::new(DEFAULT_SQLLDR)
    }
}

impl BulkLoader for SqlLoader {
    fn load(
        &self,
        credentials: &Credentials,
        control_file: &Path,
        working_dir: &Path,
    ) -> Result<String> {
        let control_file = path::absolute(control_file)?;
        info!(
            "Running {} for {:?} in {:?}",
            self.program.display(),
            control_file,
            working_dir
        );
        let output = self
            .command(credentials, &control_file, working_dir)
            .output()
            .map_err(|err| StageError::LoaderFailed {
                reason: format!("failed to launch {}: {err}", self.program.display()),
                output: String::new(),
            })?;
        let combined = combined_output(&output);
        if !output.status.success() {
            return Err(StageError::LoaderFailed {
                reason: format!("{} exited with {}", self.program.display(), output.status),
                output: combined,
            });
        }
        debug!("{} finished with {}", self.program.display(), output.status);
        Ok(combined)
    }
}

/// Stdout followed by stderr, decoded lossily.
pub fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}
