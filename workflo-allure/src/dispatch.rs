// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result, WorkfloAllureExitCode},
    ingest::{EventSource, ingest},
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use tracing::{info, warn};
use workflo_reporter::{
    config::ReporterConfig,
    patcher::{JsonResultsSource, PatchSummary, ResultPatcher},
    router::EventRouter,
};

/// Writes Allure reports for parallel, spec-validating test runs.
///
/// Reporter events are read as newline-delimited JSON, one stream per file or from standard
/// input. Each worker's suites end up in their own result file under the output directory.
#[derive(Debug, Parser)]
#[command(version, name = "workflo-allure")]
pub struct WorkfloAllureApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl WorkfloAllureApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code for the process.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let config = self.config_opts.make_config()?;
        if config.debug() && !output.verbose {
            info!("debug output is enabled but hidden: pass --verbose to show it");
        }

        match self.command {
            Command::Report { events, no_patch } => {
                let events = if events.is_empty() {
                    vec![EventSource::Stdin]
                } else {
                    events
                };
                exec_report(config, &events, no_patch, self.config_opts.config_file.as_deref())
            }
            Command::Patch => {
                let summary = exec_patch(&config, self.config_opts.config_file.as_deref())?;
                log_patch_summary(&summary);
                Ok(WorkfloAllureExitCode::OK)
            }
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/workflo-allure.toml]
    #[arg(long, global = true, value_name = "PATH", env = "WORKFLO_ALLURE_CONFIG")]
    config_file: Option<Utf8PathBuf>,

    /// Directory to write Allure results to [default: allure-results]
    #[arg(long, global = true, value_name = "DIR", env = "WORKFLO_ALLURE_OUTPUT_DIR")]
    output_dir: Option<Utf8PathBuf>,

    /// Log every event and attach raw step payloads to the report
    #[arg(long, global = true, env = "WORKFLO_ALLURE_DEBUG")]
    debug: bool,

    /// Record WebDriver commands as steps
    #[arg(long, global = true, env = "WORKFLO_ALLURE_DEBUG_SELENIUM_COMMAND")]
    debug_selenium_command: bool,
}

impl ConfigOpts {
    /// Loads the config, applying command-line overrides on top.
    fn make_config(&self) -> Result<ReporterConfig> {
        let current_dir = std::env::current_dir()
            .map_err(|error| ExpectedError::CurrentDirFailed { error })?;
        let current_dir = Utf8PathBuf::try_from(current_dir)
            .map_err(|error| ExpectedError::CurrentDirInvalidUtf8 { error })?;

        let mut config = ReporterConfig::from_sources(&current_dir, self.config_file.as_deref())?;
        if let Some(output_dir) = &self.output_dir {
            config.set_output_dir(output_dir.clone());
        }
        if self.debug {
            config.set_debug(true);
        }
        if self.debug_selenium_command {
            config.set_debug_selenium_command(true);
        }
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route reporter events into Allure result files
    ///
    /// Streams are read concurrently. Once every stream has ended, aggregate results are patched
    /// into the written reports if `[results]` is configured.
    ///
    /// Events from different streams are routed in arrival order. A spec step only reports the
    /// failures that reached the reporter before it, so feed a single interleaved stream when
    /// test cases and spec validation run on different workers.
    Report {
        /// Event streams to read, `-` for standard input [default: -]
        #[arg(value_name = "EVENTS")]
        events: Vec<EventSource>,

        /// Skip patching aggregate results into the reports
        #[arg(long)]
        no_patch: bool,
    },

    /// Patch aggregate results into previously written reports
    Patch,
}

fn exec_report(
    config: ReporterConfig,
    events: &[EventSource],
    no_patch: bool,
    config_file: Option<&Utf8Path>,
) -> Result<i32> {
    let mut router = EventRouter::new(config);
    let summary = ingest(events, &mut router)?;

    info!(
        "routed {} events from {} ({} malformed)",
        summary.handled,
        events.iter().join(", "),
        summary.malformed,
    );

    let unfinished: Vec<_> = router.unfinished_workers().collect();
    if !unfinished.is_empty() {
        warn!(
            "workers {} never ended their suites, their open suites were not written",
            unfinished.iter().join(", "),
        );
    }

    if !no_patch && router.config().results().paths().is_some() {
        let summary = exec_patch(router.config(), config_file)?;
        log_patch_summary(&summary);
    }

    Ok(WorkfloAllureExitCode::OK)
}

fn exec_patch(config: &ReporterConfig, config_file: Option<&Utf8Path>) -> Result<PatchSummary> {
    let source = JsonResultsSource::from_config(config.results()).ok_or_else(|| {
        ExpectedError::ResultsNotConfigured {
            config_file: config_file.map(ToOwned::to_owned),
        }
    })?;
    let patcher = ResultPatcher::new(config.output_dir());
    Ok(patcher.run(&source)?)
}

fn log_patch_summary(summary: &PatchSummary) {
    info!(
        "patched aggregate results into {} of {} report files",
        summary.patched.len(),
        summary.scanned,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_app() {
        WorkfloAllureApp::command().debug_assert();
    }

    #[test]
    fn parses_report_arguments() {
        let app = WorkfloAllureApp::try_parse_from([
            "workflo-allure",
            "--output-dir",
            "out",
            "report",
            "--debug-selenium-command",
            "0-0.ndjson",
            "-",
        ])
        .expect("arguments parse");

        assert_eq!(
            app.config_opts.output_dir.as_deref(),
            Some(Utf8Path::new("out"))
        );
        assert!(app.config_opts.debug_selenium_command);
        match app.command {
            Command::Report { events, no_patch } => {
                assert_eq!(
                    events,
                    vec![EventSource::File("0-0.ndjson".into()), EventSource::Stdin]
                );
                assert!(!no_patch);
            }
            Command::Patch => panic!("expected report"),
        }
    }

    #[test]
    fn report_help_explains_stream_ordering() {
        let command = WorkfloAllureApp::command();
        let report = command
            .find_subcommand("report")
            .expect("report subcommand exists");
        let help = report
            .get_long_about()
            .expect("report has long help")
            .to_string();
        assert!(help.contains("arrival order"), "help: {help}");
    }

    #[test]
    fn patch_without_results_is_a_setup_error() {
        let config = ReporterConfig::default_config();
        let error = exec_patch(&config, None).expect_err("no results configured");
        assert_eq!(error.process_exit_code(), WorkfloAllureExitCode::SETUP_ERROR);
    }
}
