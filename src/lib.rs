pub mod cli;
pub mod config;
pub mod control;
pub mod database;
pub mod ddl;
pub mod delimiter;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod headers;
pub mod io_utils;
pub mod loader;
pub mod pipeline;
pub mod schema;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{ApplyArgs, Cli, Commands},
    config::Config,
    database::SqlPlus,
    loader::SqlLoader,
    pipeline::{ApplyState, AutoApprove, ConfirmationProvider, StdinConfirmation},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_stager", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::load(cli.global.env_file.as_deref())
        .context("Loading configuration")?
        .with_overrides(
            cli.global.file.clone(),
            cli.global.table.clone(),
            cli.global.legacy_encoding.clone(),
        );
    match cli.command {
        Commands::Plan => handle_plan(&config),
        Commands::Apply(args) => handle_apply(&config, &args),
    }
}

fn handle_plan(config: &Config) -> Result<()> {
    let source = config.data_file()?;
    let table = config.table()?;
    let codec = config.codec()?;
    info!(
        "Planning load of {:?} into {} ({})",
        source,
        table,
        codec.name()
    );
    let report = pipeline::plan(&pipeline::PlanRequest {
        source,
        table_name: table,
        control_file: config.ctl_file_path.as_deref(),
        codec,
    })?;
    println!("Planned table:\n{}", report.ddl);
    info!(
        "Converted file {:?} and control file {:?} are ready",
        report.paths.converted, report.paths.control
    );
    Ok(())
}

fn handle_apply(config: &Config, args: &ApplyArgs) -> Result<()> {
    let source = config.data_file()?;
    let table = config.table()?;
    let credentials = config.credentials()?;
    let mut confirmation: Box<dyn ConfirmationProvider> = if args.auto_approve {
        Box::new(AutoApprove)
    } else {
        Box::new(StdinConfirmation::stdio())
    };
    let outcome = pipeline::apply(
        &pipeline::ApplyRequest {
            source,
            table_name: table,
            control_file: config.ctl_file_path.as_deref(),
            credentials: &credentials,
            skip_table: args.skip_table,
        },
        confirmation.as_mut(),
        &SqlPlus::new(&config.sqlplus_path),
        &SqlLoader::new(&config.sqlldr_path),
    )?;
    match outcome.state {
        ApplyState::Aborted => println!("Operation cancelled."),
        ApplyState::Applied => {
            if args.auto_approve && !args.skip_table {
                println!("The following table was created:\n{}", outcome.ddl);
            }
            if let Some(output) = outcome.loader_output {
                println!("Output from SQL*Loader:\n{output}");
            }
            println!("Data uploaded successfully");
        }
        ApplyState::Planned | ApplyState::AwaitingConfirmation => {}
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
