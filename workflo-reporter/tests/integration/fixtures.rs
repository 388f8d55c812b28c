// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Context, Result};
use workflo_reporter::{config::ReporterConfig, events::ReporterEvent, router::EventRouter};

/// Two workers: `0-0` runs a test case that violates spec criteria, `0-1` validates the spec.
pub(crate) static TWO_WORKER_RUN: &str = r#"
{"event": "suite:start", "cid": "0-0", "title": "Cart suite"}
{"event": "suite:start", "cid": "0-1", "title": "Cart spec"}
{"event": "step:triggerSpecMode", "cid": "0-1"}
{"event": "hook:start", "cid": "0-0", "title": "\"before all\" hook"}
{"event": "hook:end", "cid": "0-0", "title": "\"before all\" hook"}
{"event": "test:start", "cid": "0-0", "title": "adds item", "parent": "Cart suite", "runner": {"0-0": {"browserName": "firefox"}}}
{"event": "test:meta", "cid": "0-0", "feature": "Cart", "bug": "42", "description": "%%TESTCASE_RESULTS%%"}
{"event": "step:start", "cid": "0-0", "title": "click add"}
{"event": "test:fail", "cid": "0-0", "title": "adds item", "parent": "Cart suite", "errs": [{"message": "expected 1 to equal 2", "stack": "at cart.ts:12", "matcherName": "toEqual", "specObj": {"S1": [1, 2]}}]}
{"event": "test:start", "cid": "0-1", "title": "S1"}
{"event": "test:meta", "cid": "0-1", "description": "%%SPEC_RESULTS%%"}
{"event": "step:start", "cid": "0-1", "title": "criteria 1"}
{"event": "step:end", "cid": "0-1", "verify": {"storyId": "S1", "criteriaId": 1}}
{"event": "step:start", "cid": "0-1", "title": "criteria 3"}
{"event": "step:end", "cid": "0-1", "verify": {"storyId": "S1", "criteriaId": 3}}
{"event": "test:pass", "cid": "0-1", "title": "S1"}
{"event": "suite:end", "cid": "0-0", "title": "Cart suite"}
{"event": "suite:end", "cid": "0-1", "title": "Cart spec"}
"#;

pub(crate) struct RunFixture {
    pub(crate) temp_dir: Utf8TempDir,
    pub(crate) router: EventRouter,
}

impl RunFixture {
    pub(crate) fn new(config_toml: &str) -> Result<Self> {
        let temp_dir = Utf8TempDir::new()?;
        let mut config = ReporterConfig::from_toml_str(config_toml)?;
        config.set_output_dir(temp_dir.path().join("allure-results"));
        Ok(Self {
            temp_dir,
            router: EventRouter::new(config),
        })
    }

    pub(crate) fn output_dir(&self) -> &Utf8Path {
        self.router.config().output_dir()
    }

    pub(crate) fn feed(&mut self, stream: &str) -> Result<()> {
        for (index, line) in stream.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event = ReporterEvent::from_json(line)
                .wrap_err_with(|| format!("parsing line {}", index + 1))?;
            self.router.handle(event)?;
        }
        Ok(())
    }

    pub(crate) fn written_suites(&self) -> Result<Vec<String>> {
        let mut suites = vec![];
        for entry in self.output_dir().read_dir_utf8()? {
            let path: Utf8PathBuf = entry?.into_path();
            if path.as_str().ends_with("-testsuite.xml") {
                suites.push(std::fs::read_to_string(&path)?);
            }
        }
        suites.sort();
        Ok(suites)
    }
}
