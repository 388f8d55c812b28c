// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patches aggregate results into report files after a run.
//!
//! Aggregate counts are only known once every worker has finished, but result files are written
//! as each suite ends. Report files therefore carry placeholder tokens which this pass replaces
//! with the final summaries.

use crate::{config::ResultsConfig, errors::PatchError};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde::Deserialize;
use std::{fmt, fs, io::Write};
use tracing::{debug, warn};

/// Replaced with the test case summary.
pub static TESTCASE_PLACEHOLDER: &str = "%%TESTCASE_RESULTS%%";

/// Replaced with the spec summary.
pub static SPEC_PLACEHOLDER: &str = "%%SPEC_RESULTS%%";

static PATCHED_EXTENSIONS: &[&str] = &["xml", "json", "txt"];

/// Outcome counts along one axis.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct Counts {
    /// Passing outcomes.
    pub passing: u64,
    /// Skipped outcomes.
    pub skipped: u64,
    /// Unvalidated outcomes.
    pub unvalidated: u64,
    /// Failing outcomes.
    pub failing: u64,
    /// Broken outcomes.
    pub broken: u64,
}

impl Counts {
    /// Returns the total number of outcomes.
    pub fn total(&self) -> u64 {
        self.passing + self.skipped + self.unvalidated + self.failing + self.broken
    }

    /// Formats these counts as a one-line summary.
    ///
    /// Zero counts are left out, except for `passing` which is always shown.
    pub fn summary(&self) -> Summary {
        Summary(*self)
    }

    fn categories(&self) -> [(&'static str, u64); 5] {
        [
            ("passing", self.passing),
            ("skipped", self.skipped),
            ("unvalidated", self.unvalidated),
            ("failing", self.failing),
            ("broken", self.broken),
        ]
    }
}

/// A one-line summary of [`Counts`], e.g. `3 passing (~75%), 1 failing (~25%)`.
#[derive(Clone, Copy, Debug)]
pub struct Summary(Counts);

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.total();
        let shown = self
            .0
            .categories()
            .into_iter()
            .filter(|&(name, count)| name == "passing" || count > 0)
            .map(|(name, count)| format!("{count} {name} (~{}%)", percentage(count, total)));
        write!(f, "{}", shown.format(", "))
    }
}

fn percentage(count: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (100.0 * count as f64 / total as f64).round() as u64
    }
}

/// Aggregate results of a run, along the test case and spec axes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct RunResults {
    /// Test case outcomes.
    pub testcases: Counts,

    /// Spec outcomes.
    pub specs: Counts,
}

/// Supplies the aggregate results of a run.
pub trait ResultsSource {
    /// Loads the results.
    fn load(&self) -> Result<RunResults, PatchError>;
}

impl ResultsSource for RunResults {
    fn load(&self) -> Result<RunResults, PatchError> {
        Ok(*self)
    }
}

/// Reads aggregate results written by the runner.
///
/// `latest_run_path` holds the name of the latest run; its results are read from
/// `<results_path>/<run>.json`.
#[derive(Clone, Debug)]
pub struct JsonResultsSource {
    results_path: Utf8PathBuf,
    latest_run_path: Utf8PathBuf,
}

impl JsonResultsSource {
    /// Creates a new source.
    pub fn new(
        results_path: impl Into<Utf8PathBuf>,
        latest_run_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            results_path: results_path.into(),
            latest_run_path: latest_run_path.into(),
        }
    }

    /// Creates a source from the results config, if both paths are configured.
    pub fn from_config(config: &ResultsConfig) -> Option<Self> {
        config
            .paths()
            .map(|(results_path, latest_run_path)| Self::new(results_path, latest_run_path))
    }

    /// Returns the results file of the latest run.
    pub fn results_file(&self) -> Result<Utf8PathBuf, PatchError> {
        let latest_run = fs::read_to_string(&self.latest_run_path).map_err(|error| {
            PatchError::ReadLatestRun {
                path: self.latest_run_path.clone(),
                error,
            }
        })?;
        let latest_run = latest_run.trim();
        if latest_run.is_empty() {
            return Err(PatchError::EmptyLatestRun {
                path: self.latest_run_path.clone(),
            });
        }
        Ok(self.results_path.join(format!("{latest_run}.json")))
    }
}

impl ResultsSource for JsonResultsSource {
    fn load(&self) -> Result<RunResults, PatchError> {
        let path = self.results_file()?;
        let contents = fs::read_to_string(&path).map_err(|error| PatchError::ReadResults {
            path: path.clone(),
            error,
        })?;
        serde_json::from_str(&contents).map_err(|error| PatchError::ParseResults { path, error })
    }
}

/// What a patch pass did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchSummary {
    /// The number of report files looked at.
    pub scanned: usize,

    /// The files that contained placeholders and were rewritten.
    pub patched: Vec<Utf8PathBuf>,
}

/// Replaces placeholder tokens in report files with aggregate summaries.
#[derive(Clone, Debug)]
pub struct ResultPatcher {
    output_dir: Utf8PathBuf,
}

impl ResultPatcher {
    /// Creates a patcher for the report files under `output_dir`.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the directory that is scanned.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Loads results from `source` and patches them in.
    pub fn run(&self, source: &impl ResultsSource) -> Result<PatchSummary, PatchError> {
        let results = source.load()?;
        self.patch(&results)
    }

    /// Patches `results` into every report file under the output directory.
    ///
    /// Files are rewritten atomically. Files without placeholders are left untouched.
    pub fn patch(&self, results: &RunResults) -> Result<PatchSummary, PatchError> {
        let mut summary = PatchSummary::default();
        if !self.output_dir.is_dir() {
            warn!(output_dir = %self.output_dir, "output directory does not exist, nothing to patch");
            return Ok(summary);
        }

        let testcases = results.testcases.summary().to_string();
        let specs = results.specs.summary().to_string();
        debug!(%testcases, %specs, "patching results");

        for path in self.report_files()? {
            summary.scanned += 1;
            let bytes = fs::read(&path).map_err(|error| PatchError::Read {
                path: path.clone(),
                error,
            })?;
            // Binary attachments can be stored under a text extension.
            let Ok(contents) = String::from_utf8(bytes) else {
                debug!(%path, "skipping file that is not UTF-8");
                continue;
            };
            if !contents.contains(TESTCASE_PLACEHOLDER) && !contents.contains(SPEC_PLACEHOLDER) {
                continue;
            }

            let patched = contents
                .replace(TESTCASE_PLACEHOLDER, &testcases)
                .replace(SPEC_PLACEHOLDER, &specs);
            AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
                .write(|file| file.write_all(patched.as_bytes()))
                .map_err(|error| PatchError::Write {
                    path: path.clone(),
                    error,
                })?;
            summary.patched.push(path);
        }

        Ok(summary)
    }

    fn report_files(&self) -> Result<Vec<Utf8PathBuf>, PatchError> {
        let mut files = vec![];
        for entry in walkdir::WalkDir::new(&self.output_dir).sort_by_file_name() {
            let entry = entry.map_err(|error| PatchError::Walk {
                dir: self.output_dir.clone(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
                warn!("skipping non-UTF-8 path under {}", self.output_dir);
                continue;
            };
            if path
                .extension()
                .is_some_and(|extension| PATCHED_EXTENSIONS.contains(&extension))
            {
                files.push(path);
            }
        }
        Ok(files)
    }
}
