// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::{FromPathBufError, Utf8PathBuf};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;
use workflo_reporter::errors::{ConfigParseError, PatchError, WriteEventError};

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Documented exit codes for `workflo-allure` failures.
///
/// Unknown or unexpected failures always result in exit code 1.
pub enum WorkfloAllureExitCode {}

impl WorkfloAllureExitCode {
    /// No errors occurred and the command completed successfully.
    pub const OK: i32 = 0;

    /// An error occurred while setting up the command: for example, the config was invalid.
    pub const SETUP_ERROR: i32 = 96;

    /// An event stream could not be opened or read.
    pub const EVENT_STREAM_FAILED: i32 = 104;

    /// Writing a report to the output directory failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// Patching aggregate results into the written reports failed.
    pub const PATCH_FAILED: i32 = 111;
}

// The #[error()] strings are placeholders: errors are meant to be printed with display_to_stderr.

/// An expected error that stops `workflo-allure`.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed { error: std::io::Error },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { error: FromPathBufError },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to create tokio runtime")]
    TokioRuntimeCreate { error: std::io::Error },
    #[error("failed to open event stream")]
    EventStreamOpen {
        path: Utf8PathBuf,
        error: std::io::Error,
    },
    #[error("failed to read event stream")]
    EventStreamRead {
        stream: String,
        line: usize,
        error: std::io::Error,
    },
    #[error("failed to write report")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("no aggregate results configured")]
    ResultsNotConfigured { config_file: Option<Utf8PathBuf> },
    #[error("failed to patch results")]
    PatchError {
        #[from]
        err: PatchError,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::TokioRuntimeCreate { .. }
            | Self::ResultsNotConfigured { .. } => WorkfloAllureExitCode::SETUP_ERROR,
            Self::EventStreamOpen { .. } | Self::EventStreamRead { .. } => {
                WorkfloAllureExitCode::EVENT_STREAM_FAILED
            }
            Self::WriteEventError { .. } => WorkfloAllureExitCode::WRITE_OUTPUT_ERROR,
            Self::PatchError { .. } => WorkfloAllureExitCode::PATCH_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { error } => {
                error!("could not determine current directory");
                Some(error as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { error } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    error.as_path().display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::TokioRuntimeCreate { error } => {
                error!("failed to create tokio runtime");
                Some(error as &dyn Error)
            }
            Self::EventStreamOpen { path, error } => {
                error!("failed to open event stream `{}`", path.style(styles.bold));
                Some(error as &dyn Error)
            }
            Self::EventStreamRead {
                stream,
                line,
                error,
            } => {
                error!(
                    "failed to read event stream `{}` after line {line}",
                    stream.style(styles.bold)
                );
                Some(error as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write Allure report");
                Some(err as &dyn Error)
            }
            Self::ResultsNotConfigured { config_file } => {
                let config_file = config_file
                    .as_ref()
                    .map_or(workflo_reporter::config::ReporterConfig::CONFIG_PATH, |file| {
                        file.as_str()
                    });
                error!(
                    "no aggregate results configured: set {} and {} in `{}`",
                    "results.results-path".style(styles.bold),
                    "results.latest-run-path".style(styles.bold),
                    config_file.style(styles.warning_text),
                );
                None
            }
            Self::PatchError { err } => {
                error!("failed to patch aggregate results into reports");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
