//! `plan` and `apply` orchestration.
//!
//! `plan` prepares every artifact on disk (side-car schema, converted data
//! file, control file) without touching the database. `apply` reuses those
//! artifacts, optionally creates the table and then runs the bulk loader.

use std::{
    ffi::OsString,
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::{
    config::Credentials,
    control,
    database::{TableCreation, TableCreator},
    ddl, delimiter,
    encoding::{self, LegacyCodec},
    filter::{self, FilterSummary},
    loader::BulkLoader,
    printable_delimiter,
    schema::{self, SchemaDescriptor},
};

const UTF8_SUFFIX: &str = "_utf8";
const CONVERTED_SUFFIX: &str = "--converted";
const CONTROL_EXTENSION: &str = "ctl";

/// Files derived from the source data file and the table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub source: PathBuf,
    pub utf8: PathBuf,
    pub converted: PathBuf,
    pub schema: PathBuf,
    pub control: PathBuf,
}

impl StagePaths {
    pub fn new(source: &Path, table_name: &str, control_override: Option<&Path>) -> Self {
        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        let control = control_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.join(format!("{table_name}.{CONTROL_EXTENSION}")));
        StagePaths {
            source: source.to_path_buf(),
            utf8: sibling_with_suffix(source, UTF8_SUFFIX),
            converted: sibling_with_suffix(source, CONVERTED_SUFFIX),
            schema: SchemaDescriptor::sidecar_path(source, table_name),
            control,
        }
    }
}

/// `dir/name.csv` with suffix `_x` becomes `dir/name_x.csv`.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.file_stem().unwrap_or_default());
    name.push(suffix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub source: &'a Path,
    pub table_name: &'a str,
    pub control_file: Option<&'a Path>,
    pub codec: LegacyCodec,
}

#[derive(Debug, Clone)]
pub struct PlanReport {
    pub schema: SchemaDescriptor,
    pub ddl: String,
    pub delimiter: u8,
    pub schema_reused: bool,
    pub paths: StagePaths,
    pub filter: FilterSummary,
}

pub fn plan(request: &PlanRequest<'_>) -> Result<PlanReport> {
    let paths = StagePaths::new(request.source, request.table_name, request.control_file);
    let delimiter = delimiter::detect_delimiter(&paths.source)
        .with_context(|| format!("Detecting delimiter of {:?}", paths.source))?;
    info!(
        "Detected delimiter '{}' in {:?}",
        printable_delimiter(delimiter),
        paths.source
    );

    encoding::convert_legacy_to_universal(&paths.source, &paths.utf8, request.codec)
        .with_context(|| {
            format!(
                "Converting {:?} from {} to UTF-8",
                paths.source,
                request.codec.name()
            )
        })?;
    debug!("Wrote UTF-8 working copy {:?}", paths.utf8);

    let (schema, schema_reused) = if SchemaDescriptor::exists(&paths.schema) {
        info!("Reusing schema from {:?}", paths.schema);
        let schema = SchemaDescriptor::load(&paths.schema)
            .with_context(|| format!("Loading schema from {:?}", paths.schema))?;
        if schema.table_name() != request.table_name {
            warn!(
                "Schema {:?} names table '{}' but '{}' was requested; using the schema's table",
                paths.schema,
                schema.table_name(),
                request.table_name
            );
        }
        (schema, true)
    } else {
        let schema = schema::infer_schema(&paths.utf8, request.table_name, delimiter)
            .with_context(|| format!("Inferring schema from {:?}", paths.source))?;
        schema
            .save(&paths.schema)
            .with_context(|| format!("Writing schema to {:?}", paths.schema))?;
        info!(
            "Inferred {} column(s) over {} row(s); schema written to {:?}",
            schema.columns.len(),
            schema.row_count(),
            paths.schema
        );
        (schema, false)
    };

    let summary = filter::filter_excluded_columns(&paths.utf8, &schema, delimiter)
        .with_context(|| format!("Dropping excluded columns from {:?}", paths.utf8))?;
    if summary.dropped_columns > 0 {
        info!(
            "Dropped {} excluded column(s), kept {}",
            summary.dropped_columns, summary.kept_columns
        );
    }

    encoding::encode_to_legacy(&paths.utf8, &paths.converted, request.codec).with_context(
        || {
            format!(
                "Converting {:?} back to {}",
                paths.utf8,
                request.codec.name()
            )
        },
    )?;
    control::write_control_file(
        &paths.control,
        &schema,
        &paths.converted,
        delimiter,
        request.codec,
    )
    .with_context(|| format!("Writing control file {:?}", paths.control))?;
    info!("SQL*Loader control file written to {:?}", paths.control);

    let ddl = ddl::create_table_sql(&schema);
    fs::remove_file(&paths.utf8)
        .with_context(|| format!("Removing temporary file {:?}", paths.utf8))?;
    debug!("Removed temporary file {:?}", paths.utf8);

    Ok(PlanReport {
        schema,
        ddl,
        delimiter,
        schema_reused,
        paths,
        filter: summary,
    })
}

/// Asks the operator whether the shown DDL should be executed.
pub trait ConfirmationProvider {
    fn confirm(&mut self, ddl: &str) -> Result<bool>;
}

/// Approves everything; used for `--auto-approve`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl ConfirmationProvider for AutoApprove {
    fn confirm(&mut self, _ddl: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Shows the DDL and prompts on `output`, then reads one answer line from
/// `input`; only `yes` approves.
pub struct StdinConfirmation<R, W> {
    input: R,
    output: W,
}

impl StdinConfirmation<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> StdinConfirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ConfirmationProvider for StdinConfirmation<R, W> {
    fn confirm(&mut self, ddl: &str) -> Result<bool> {
        writeln!(self.output, "The following table will be created:\n{ddl}")?;
        write!(self.output, "Are you sure you want to create it? (yes/no): ")?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .context("Reading confirmation answer")?;
        Ok(answer.trim().eq_ignore_ascii_case("yes"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyState {
    Planned,
    AwaitingConfirmation,
    Applied,
    Aborted,
}

impl ApplyState {
    pub fn can_transition_to(self, next: ApplyState) -> bool {
        use ApplyState::*;
        matches!(
            (self, next),
            (Planned, AwaitingConfirmation)
                | (Planned, Applied)
                | (AwaitingConfirmation, Applied)
                | (AwaitingConfirmation, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ApplyState::Applied | ApplyState::Aborted)
    }
}

/// Tracks one `apply` run and rejects out-of-order transitions.
#[derive(Debug)]
pub struct ApplyRun {
    state: ApplyState,
    history: Vec<ApplyState>,
}

impl ApplyRun {
    pub fn new() -> Self {
        ApplyRun {
            state: ApplyState::Planned,
            history: vec![ApplyState::Planned],
        }
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    pub fn history(&self) -> &[ApplyState] {
        &self.history
    }

    pub fn advance(&mut self, next: ApplyState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            bail!("Invalid apply transition {:?} -> {:?}", self.state, next);
        }
        debug!("Apply state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for ApplyRun {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ApplyRequest<'a> {
    pub source: &'a Path,
    pub table_name: &'a str,
    pub control_file: Option<&'a Path>,
    pub credentials: &'a Credentials,
    pub skip_table: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub state: ApplyState,
    pub ddl: String,
    pub table: Option<TableCreation>,
    pub loader_output: Option<String>,
}

pub fn apply(
    request: &ApplyRequest<'_>,
    confirmation: &mut dyn ConfirmationProvider,
    creator: &dyn TableCreator,
    loader: &dyn BulkLoader,
) -> Result<ApplyOutcome> {
    let paths = StagePaths::new(request.source, request.table_name, request.control_file);
    if !SchemaDescriptor::exists(&paths.schema) {
        return Err(anyhow!(
            "Schema file {:?} not found; run `plan` first",
            paths.schema
        ));
    }
    if !paths.control.is_file() {
        return Err(anyhow!(
            "Control file {:?} not found; run `plan` first",
            paths.control
        ));
    }
    let schema = SchemaDescriptor::load(&paths.schema)
        .with_context(|| format!("Loading schema from {:?}", paths.schema))?;
    let ddl = ddl::create_table_sql(&schema);
    let mut run = ApplyRun::new();
    let mut table = None;

    if request.skip_table {
        info!("Table creation skipped (--skip-table)");
    } else {
        run.advance(ApplyState::AwaitingConfirmation)?;
        if !confirmation.confirm(&ddl)? {
            run.advance(ApplyState::Aborted)?;
            info!("Table creation declined");
            return Ok(ApplyOutcome {
                state: run.state(),
                ddl,
                table: None,
                loader_output: None,
            });
        }
        let creation = creator
            .create_table(request.credentials, &ddl)
            .with_context(|| format!("Creating table {}", schema.table_name()))?;
        table = Some(creation);
    }

    // INFILE names only the converted file, so the loader runs beside it.
    let working_dir = paths.converted.parent().unwrap_or(Path::new(""));
    let output = loader
        .load(request.credentials, &paths.control, working_dir)
        .with_context(|| format!("Loading data with {:?}", paths.control))?;
    run.advance(ApplyState::Applied)?;
    info!("Data loaded into {}", schema.table_name());
    Ok(ApplyOutcome {
        state: run.state(),
        ddl,
        table,
        loader_output: Some(output),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{self, StageError};
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct FakeCreator {
        calls: RefCell<Vec<String>>,
        outcome: fn() -> error::Result<TableCreation>,
    }

    impl FakeCreator {
        fn new(outcome: fn() -> error::Result<TableCreation>) -> Self {
            FakeCreator {
                calls: RefCell::new(Vec::new()),
                outcome,
            }
        }
    }

    impl TableCreator for FakeCreator {
        fn create_table(&self, _: &Credentials, ddl: &str) -> error::Result<TableCreation> {
            self.calls.borrow_mut().push(ddl.to_string());
            (self.outcome)()
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        controls: RefCell<Vec<PathBuf>>,
        working_dirs: RefCell<Vec<PathBuf>>,
    }

    impl BulkLoader for FakeLoader {
        fn load(
            &self,
            _: &Credentials,
            control_file: &Path,
            working_dir: &Path,
        ) -> error::Result<String> {
            self.controls.borrow_mut().push(control_file.to_path_buf());
            self.working_dirs.borrow_mut().push(working_dir.to_path_buf());
            Ok("Load completed - logical record count 2.".to_string())
        }
    }

    struct Always(bool);

    impl ConfirmationProvider for Always {
        fn confirm(&mut self, _ddl: &str) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            user: "u".into(),
            password: "p".into(),
            dsn: "d".into(),
        }
    }

    fn planned(dir: &Path) -> PathBuf {
        let source = dir.join("towns.csv");
        fs::write(&source, "id,name\n1,Kyiv\n2,Lviv\n").unwrap();
        plan(&PlanRequest {
            source: &source,
            table_name: "towns",
            control_file: None,
            codec: LegacyCodec::default(),
        })
        .expect("plan succeeds");
        source
    }

    #[test]
    fn stage_paths_follow_source_name() {
        let paths = StagePaths::new(Path::new("/data/in.csv"), "towns", None);
        assert_eq!(paths.utf8, Path::new("/data/in_utf8.csv"));
        assert_eq!(paths.converted, Path::new("/data/in--converted.csv"));
        assert_eq!(paths.schema, Path::new("/data/towns.config.json"));
        assert_eq!(paths.control, Path::new("/data/towns.ctl"));

        let custom = StagePaths::new(Path::new("in"), "t", Some(Path::new("/ctl/x.ctl")));
        assert_eq!(custom.utf8, Path::new("in_utf8"));
        assert_eq!(custom.control, Path::new("/ctl/x.ctl"));
    }

    #[test]
    fn transitions_are_restricted() {
        use ApplyState::*;
        assert!(Planned.can_transition_to(AwaitingConfirmation));
        assert!(Planned.can_transition_to(Applied));
        assert!(!Planned.can_transition_to(Aborted));
        assert!(!Applied.can_transition_to(Planned));
        assert!(!Aborted.can_transition_to(Applied));
        let mut run = ApplyRun::new();
        assert!(run.advance(Aborted).is_err());
        run.advance(AwaitingConfirmation).unwrap();
        run.advance(Aborted).unwrap();
        assert!(run.state().is_terminal());
        assert_eq!(run.history(), &[Planned, AwaitingConfirmation, Aborted]);
    }

    #[test]
    fn plan_writes_artifacts_and_removes_working_copy() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("towns.csv");
        fs::write(&source, "id;name\n1;Kyiv\n").unwrap();
        let report = plan(&PlanRequest {
            source: &source,
            table_name: "towns",
            control_file: None,
            codec: LegacyCodec::default(),
        })
        .expect("plan");
        assert_eq!(report.delimiter, b';');
        assert!(!report.schema_reused);
        assert!(report.paths.schema.is_file());
        assert!(report.paths.control.is_file());
        assert!(report.paths.converted.is_file());
        assert!(!report.paths.utf8.exists());
        assert!(report.ddl.contains("id NUMBER"));
    }

    #[test]
    fn second_plan_reuses_schema() {
        let dir = tempdir().expect("temp dir");
        let source = planned(dir.path());
        let report = plan(&PlanRequest {
            source: &source,
            table_name: "towns",
            control_file: None,
            codec: LegacyCodec::default(),
        })
        .expect("replan");
        assert!(report.schema_reused);
    }

    #[test]
    fn apply_without_plan_fails() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("towns.csv");
        let creator = FakeCreator::new(|| Ok(TableCreation::Created));
        let loader = FakeLoader::default();
        let err = apply(
            &ApplyRequest {
                source: &source,
                table_name: "towns",
                control_file: None,
                credentials: &credentials(),
                skip_table: false,
            },
            &mut AutoApprove,
            &creator,
            &loader,
        )
        .unwrap_err();
        assert!(err.to_string().contains("run `plan` first"));
        assert!(loader.controls.borrow().is_empty());
    }

    #[test]
    fn approved_apply_creates_table_then_loads() {
        let dir = tempdir().expect("temp dir");
        let source = planned(dir.path());
        let creator = FakeCreator::new(|| Ok(TableCreation::Created));
        let loader = FakeLoader::default();
        let outcome = apply(
            &ApplyRequest {
                source: &source,
                table_name: "towns",
                control_file: None,
                credentials: &credentials(),
                skip_table: false,
            },
            &mut Always(true),
            &creator,
            &loader,
        )
        .expect("apply");
        assert_eq!(outcome.state, ApplyState::Applied);
        assert_eq!(outcome.table, Some(TableCreation::Created));
        assert_eq!(creator.calls.borrow().len(), 1);
        assert_eq!(loader.controls.borrow()[0], dir.path().join("towns.ctl"));
        assert_eq!(loader.working_dirs.borrow()[0], dir.path());
        assert!(outcome.loader_output.unwrap().contains("logical record count"));
    }

    #[test]
    fn declined_apply_aborts_without_side_effects() {
        let dir = tempdir().expect("temp dir");
        let source = planned(dir.path());
        let creator = FakeCreator::new(|| Ok(TableCreation::Created));
        let loader = FakeLoader::default();
        let outcome = apply(
            &ApplyRequest {
                source: &source,
                table_name: "towns",
                control_file: None,
                credentials: &credentials(),
                skip_table: false,
            },
            &mut Always(false),
            &creator,
            &loader,
        )
        .expect("apply");
        assert_eq!(outcome.state, ApplyState::Aborted);
        assert!(creator.calls.borrow().is_empty());
        assert!(loader.controls.borrow().is_empty());
    }

    #[test]
    fn skip_table_goes_straight_to_loader() {
        let dir = tempdir().expect("temp dir");
        let source = planned(dir.path());
        let creator = FakeCreator::new(|| Ok(TableCreation::Created));
        let loader = FakeLoader::default();
        let outcome = apply(
            &ApplyRequest {
                source: &source,
                table_name: "towns",
                control_file: None,
                credentials: &credentials(),
                skip_table: true,
            },
            &mut Always(false),
            &creator,
            &loader,
        )
        .expect("apply");
        assert_eq!(outcome.state, ApplyState::Applied);
        assert_eq!(outcome.table, None);
        assert!(creator.calls.borrow().is_empty());
        assert_eq!(loader.controls.borrow().len(), 1);
    }

    #[test]
    fn table_creation_failure_stops_before_load() {
        let dir = tempdir().expect("temp dir");
        let source = planned(dir.path());
        let creator = FakeCreator::new(|| {
            Err(StageError::TableCreationFailed {
                reason: "denied".into(),
                output: "ORA-01031".into(),
            })
        });
        let loader = FakeLoader::default();
        let result = apply(
            &ApplyRequest {
                source: &source,
                table_name: "towns",
                control_file: None,
                credentials: &credentials(),
                skip_table: false,
            },
            &mut AutoApprove,
            &creator,
            &loader,
        );
        assert!(result.is_err());
        assert!(loader.controls.borrow().is_empty());
    }

    #[test]
    fn stdin_confirmation_accepts_only_yes() {
        let mut prompt = Vec::new();
        let mut yes = StdinConfirmation::new(&b" YES \n"[..], &mut prompt);
        assert!(yes.confirm("CREATE TABLE t (a NUMBER);").unwrap());
        let shown = String::from_utf8(prompt).unwrap();
        assert!(shown.starts_with("The following table will be created:\nCREATE TABLE t (a NUMBER);\n"));
        assert!(shown.ends_with("(yes/no): "));

        let mut sink = Vec::new();
        let mut no = StdinConfirmation::new(&b"y\n"[..], &mut sink);
        assert!(!no.confirm("").unwrap());
        let mut eof = StdinConfirmation::new(&b""[..], io::sink());
        assert!(!eof.confirm("").unwrap());
    }
}
