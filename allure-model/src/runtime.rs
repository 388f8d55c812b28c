// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An incremental builder for Allure result files.
//!
//! [`Allure`] keeps a stack of open suites. Each open suite tracks the test case currently
//! running in it and the path to the innermost open step of that test case. Suites are
//! written out to the results directory as soon as they end, so the builder only ever holds
//! the suites that are still open.

use crate::{Attachment, Failure, Status, Step, TestCase, TestSuite, errors::WriteError};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use std::fs;
use tracing::warn;
use uuid::Uuid;

static DEFAULT_TEXT_MIME: &str = "text/plain";
static DEFAULT_BINARY_MIME: &str = "application/octet-stream";

/// Incremental builder for Allure result files written to a single results directory.
#[derive(Debug)]
pub struct Allure {
    target_dir: Utf8PathBuf,
    suites: Vec<OpenSuite>,
}

#[derive(Debug)]
struct OpenSuite {
    suite: TestSuite,
    // Index into `suite.test_cases` of the running test case.
    current_test: Option<usize>,
    // Indexes leading from the running test case's steps to the innermost open step.
    step_path: Vec<usize>,
}

impl Allure {
    /// Creates a new builder writing into `target_dir`.
    ///
    /// The directory is created the first time a file is written to it.
    pub fn new(target_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            suites: vec![],
        }
    }

    /// Returns the directory result files are written to.
    pub fn target_dir(&self) -> &Utf8Path {
        &self.target_dir
    }

    /// Opens a new suite nested in the current one.
    pub fn start_suite(&mut self, name: impl Into<String>) {
        self.suites.push(OpenSuite {
            suite: TestSuite::new(name, now()),
            current_test: None,
            step_path: vec![],
        });
    }

    /// Closes the current suite, writing it out if it holds any test cases.
    ///
    /// Returns the path of the result file, if one was written.
    pub fn end_suite(&mut self) -> Result<Option<Utf8PathBuf>, WriteError> {
        let Some(mut open) = self.suites.pop() else {
            warn!("end_suite called with no suite open");
            return Ok(None);
        };
        open.suite.stop = Some(now());
        if !open.suite.has_test_cases() {
            return Ok(None);
        }

        self.create_target_dir()?;
        let path = self
            .target_dir
            .join(format!("{}-testsuite.xml", Uuid::new_v4()));
        let file = fs::File::create(&path).map_err(|error| WriteError::Fs {
            path: path.clone(),
            error,
        })?;
        open.suite
            .serialize(file)
            .map_err(|error| WriteError::Serialize {
                path: path.clone(),
                error,
            })?;
        Ok(Some(path))
    }

    /// Returns the innermost open suite.
    pub fn current_suite(&self) -> Option<&TestSuite> {
        self.suites.last().map(|open| &open.suite)
    }

    /// Returns the test case currently running in the innermost open suite.
    pub fn current_test(&self) -> Option<&TestCase> {
        let open = self.suites.last()?;
        open.current_test.map(|index| &open.suite.test_cases[index])
    }

    /// Returns the running test case mutably.
    pub fn current_test_mut(&mut self) -> Option<&mut TestCase> {
        let open = self.suites.last_mut()?;
        let index = open.current_test?;
        Some(&mut open.suite.test_cases[index])
    }

    /// Returns true if a test case is running in the innermost open suite.
    pub fn is_test_running(&self) -> bool {
        self.current_test().is_some()
    }

    /// Starts a new test case in the innermost open suite.
    ///
    /// Returns false, and does nothing, if no suite is open.
    pub fn start_case(&mut self, name: impl Into<String>) -> bool {
        let Some(open) = self.suites.last_mut() else {
            warn!("start_case called with no suite open");
            return false;
        };
        open.suite.test_cases.push(TestCase::new(name, now()));
        open.current_test = Some(open.suite.test_cases.len() - 1);
        open.step_path.clear();
        true
    }

    /// Ends the running test case with the given status.
    ///
    /// Steps still open are left without a status; callers are expected to close them first.
    pub fn end_case(&mut self, status: Status, failure: Option<Failure>) -> bool {
        let Some(open) = self.suites.last_mut() else {
            warn!("end_case called with no suite open");
            return false;
        };
        let Some(index) = open.current_test.take() else {
            warn!("end_case called with no test case running");
            return false;
        };
        let test_case = &mut open.suite.test_cases[index];
        test_case.stop = Some(now());
        test_case.status = Some(status);
        test_case.failure = failure;
        open.step_path.clear();
        true
    }

    /// Records a skipped test case.
    pub fn pending_case(&mut self, name: impl Into<String>) -> bool {
        self.start_case(name) && self.skip_case()
    }

    /// Ends the running test case as skipped.
    pub fn skip_case(&mut self) -> bool {
        self.end_case(Status::Pending, Some(Failure::new("Test ignored", "")))
    }

    /// Removes the most recently added test case of the innermost open suite.
    pub fn pop_last_case(&mut self) -> Option<TestCase> {
        let open = self.suites.last_mut()?;
        let popped = open.suite.test_cases.pop()?;
        if open.current_test == Some(open.suite.test_cases.len()) {
            open.current_test = None;
            open.step_path.clear();
        }
        Some(popped)
    }

    /// Returns the number of steps currently open in the running test case.
    pub fn open_step_depth(&self) -> usize {
        self.suites.last().map_or(0, |open| open.step_path.len())
    }

    /// Opens a step under the innermost open step, or under the running test case.
    ///
    /// Returns false, and does nothing, if no test case is running.
    pub fn start_step(&mut self, name: impl Into<String>) -> bool {
        let start = now();
        let Some(open) = self.suites.last_mut() else {
            warn!("start_step called with no suite open");
            return false;
        };
        let Some(index) = open.current_test else {
            warn!("start_step called with no test case running");
            return false;
        };
        let siblings = steps_at_mut(&mut open.suite.test_cases[index].steps, &open.step_path);
        siblings.push(Step::new(name, start));
        let new_index = siblings.len() - 1;
        open.step_path.push(new_index);
        true
    }

    /// Closes the innermost open step with the given status.
    ///
    /// Returns false, and does nothing, if no step is open.
    pub fn end_step(&mut self, status: Status) -> bool {
        let stop = now();
        let Some(step) = self.innermost_step_mut() else {
            warn!("end_step called with no step open");
            return false;
        };
        step.stop = Some(stop);
        step.status = Some(status);
        if let Some(open) = self.suites.last_mut() {
            open.step_path.pop();
        }
        true
    }

    /// Writes an attachment file and records it on the innermost open step, or on the
    /// running test case if no step is open.
    ///
    /// If `mime_type` is `None`, it is guessed from the content. Attachments made while no
    /// test case is running are dropped with a warning.
    pub fn add_attachment(
        &mut self,
        title: impl Into<String>,
        content: &[u8],
        mime_type: Option<&str>,
    ) -> Result<(), WriteError> {
        let title = title.into();
        if !self.is_test_running() {
            warn!("dropping attachment `{title}`: no test case running");
            return Ok(());
        }

        let mime_type = match mime_type {
            Some(mime_type) => mime_type.to_owned(),
            None if std::str::from_utf8(content).is_ok() => DEFAULT_TEXT_MIME.to_owned(),
            None => DEFAULT_BINARY_MIME.to_owned(),
        };
        let source = format!(
            "{}-attachment.{}",
            Uuid::new_v4(),
            extension_for_mime(&mime_type)
        );

        self.create_target_dir()?;
        let path = self.target_dir.join(&source);
        fs::write(&path, content).map_err(|error| WriteError::Fs { path, error })?;

        let attachment = Attachment {
            title,
            source,
            mime_type,
        };
        if let Some(step) = self.innermost_step_mut() {
            step.attachments.push(attachment);
        } else if let Some(test_case) = self.current_test_mut() {
            test_case.attachments.push(attachment);
        }
        Ok(())
    }

    // ---
    // Helper methods
    // ---

    fn innermost_step_mut(&mut self) -> Option<&mut Step> {
        let open = self.suites.last_mut()?;
        let index = open.current_test?;
        let (last, parents) = open.step_path.split_last()?;
        let siblings = steps_at_mut(&mut open.suite.test_cases[index].steps, parents);
        siblings.get_mut(*last)
    }

    fn create_target_dir(&self) -> Result<(), WriteError> {
        fs::create_dir_all(&self.target_dir).map_err(|error| WriteError::Fs {
            path: self.target_dir.clone(),
            error,
        })
    }
}

// Walks `path` down from `steps`, returning the child list of the step it ends at.
fn steps_at_mut<'a>(mut steps: &'a mut Vec<Step>, path: &[usize]) -> &'a mut Vec<Step> {
    for &index in path {
        steps = &mut steps[index].steps;
    }
    steps
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "text/html" => "html",
        "text/csv" => "csv",
        "text/plain" => "txt",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        _ => "attach",
    }
}

fn now() -> i64 {
    Utc::now().timestamp_millis()
}
