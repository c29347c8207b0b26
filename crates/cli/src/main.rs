mod args;
mod json;
mod text;

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use script_consolidate_core::{ConsolidateOptions, Consolidator, Error, IncidentLog};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::args::{Cli, Command, ExecuteArgs};
use crate::json::{JsonAnalysis, JsonRun, write_json};

const LOG_ENV: &str = "SCRIPT_CONSOLIDATE_LOG";

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_tracing(verbose: u8, log_path: &Path) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let (file_layer, file_err) = match open_log(log_path) {
        Ok(file) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(file_layer)
        .init();

    if let Some(err) = file_err {
        warn!(path = %log_path.display(), error = %err, "log file unavailable");
    }
}

fn record_incident(options: &ConsolidateOptions, err: &Error, context: &str) {
    let log = IncidentLog::new(options.resolve(&options.incident_dir));
    match log.record(err, context) {
        Ok(path) => info!(path = %path.display(), code = %err.code(), "incident recorded"),
        Err(io_err) => warn!(error = %io_err, "failed to record incident"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.selected_command();

    let options = match cli.options() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Error: {err}");
            record_incident(&ConsolidateOptions::with_root(&cli.root), &err, "configuration");
            return ExitCode::from(1);
        }
    };
    init_tracing(cli.verbose, &options.resolve(&options.log_path));
    info!(command = %command, root = %options.root.display(), "starting");

    match run(&cli, &command, options.clone()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(command = %command, error = %format!("{err:#}"), "run failed");
            eprintln!("Error: {err:#}");
            if let Some(core_err) = err.downcast_ref::<Error>() {
                record_incident(&options, core_err, command.name());
            }
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli, command: &Command, options: ConsolidateOptions) -> anyhow::Result<()> {
    let mut consolidator = Consolidator::new(options);

    match command {
        Command::Analyze => {
            let analysis = consolidator.analyze().context("analysis failed")?;
            if cli.json {
                write_json(&JsonAnalysis::from(analysis))?;
            } else {
                print!("{}", text::format_analysis(analysis));
            }
        }
        Command::Plan => {
            let plan = consolidator.plan().context("planning failed")?.to_vec();
            if cli.json {
                write_json(&plan)?;
            } else {
                if let Some(analysis) = consolidator.analysis() {
                    print!("{}", text::format_stats(&analysis.stats));
                }
                print!("{}", text::format_plan(&plan));
            }
        }
        Command::Execute(ExecuteArgs { group_ids, dry_run }) => {
            let results = consolidator
                .execute(group_ids.as_deref(), *dry_run)
                .context("execution failed")?;
            if cli.json {
                write_json(&results)?;
            } else {
                print!("{}", text::format_results(&results));
            }
        }
        Command::Report => {
            let path = consolidator.report().context("reporting failed")?;
            if cli.json {
                write_json(&JsonRun {
                    analysis: None,
                    plan: None,
                    results: None,
                    report_path: Some(path.display().to_string()),
                })?;
            } else {
                println!("report: {}", path.display());
            }
        }
        Command::All(ExecuteArgs { group_ids, dry_run }) => {
            let plan = consolidator.plan().context("planning failed")?.to_vec();
            let results = consolidator
                .execute(group_ids.as_deref(), *dry_run)
                .context("execution failed")?;
            let path = consolidator.report().context("reporting failed")?;

            if cli.json {
                write_json(&JsonRun {
                    analysis: consolidator.analysis().map(JsonAnalysis::from),
                    plan: Some(plan.as_slice()),
                    results: Some(results.as_slice()),
                    report_path: Some(path.display().to_string()),
                })?;
            } else {
                if let Some(analysis) = consolidator.analysis() {
                    print!("{}", text::format_analysis(analysis));
                }
                print!("{}", text::format_plan(&plan));
                print!("{}", text::format_results(&results));
                println!("report: {}", path.display());
            }
        }
    }
    Ok(())
}
