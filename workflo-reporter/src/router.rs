// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes runner events to report sessions.
//!
//! Each event is resolved to the session of the worker that produced it and handled to completion
//! before the next one is looked at. Events that arrive out of order, such as a step with no test
//! running, are logged and discarded: they never stop other workers' events from being handled.
//! Only failures to write to disk are returned as errors.

use crate::{
    config::ReporterConfig,
    correlator::{FailureRecord, SpecFailureIndex, VerificationFailure},
    errors::WriteEventError,
    events::{
        AttachEvent, CommandEvent, CommandResultEvent, HookEvent, LogEvent, MetaEvent,
        ReporterEvent, ScreenshotEvent, StepEvent, SuiteEvent, TestEvent, TestMeta, WorkerId,
    },
    session::{ReportSession, SessionMap},
    status::TestOutcome,
};
use allure_model::Status;
use base64::{Engine, engine::general_purpose::STANDARD};
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, ser::PrettyFormatter};
use std::{fs, sync::LazyLock};
use tracing::{debug, error};

static JSON_MIME: &str = "application/json";
static PNG_MIME: &str = "image/png";
static ENVIRONMENT_VARIABLE: &str = "environment-variable";
static DEFAULT_STEP_NAME: &str = "No name defined";
static VERIFY_END_KIND: &str = "verifyEnd";
static LOGGING_HOOKS: [&str; 2] = ["\"before all\" hook", "\"after all\" hook"];
static SCREENSHOT_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/wd/hub/session/[^/]*/screenshot").unwrap());

/// Routes events from any number of workers into their report sessions.
#[derive(Debug)]
pub struct EventRouter {
    config: ReporterConfig,
    sessions: SessionMap,
    spec_failures: SpecFailureIndex,
}

impl EventRouter {
    /// Creates a new router. Every session writes into the configured output directory.
    pub fn new(config: ReporterConfig) -> Self {
        let sessions = SessionMap::new(config.output_dir());
        Self {
            config,
            sessions,
            spec_failures: SpecFailureIndex::new(),
        }
    }

    /// Returns the config this router was created with.
    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Returns the sessions created so far.
    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    /// Returns the failures recorded against spec criteria so far.
    pub fn spec_failures(&self) -> &SpecFailureIndex {
        &self.spec_failures
    }

    /// Handles a single event.
    pub fn handle(&mut self, event: ReporterEvent) -> Result<(), WriteEventError> {
        if self.config.debug() {
            debug!(worker = %event.worker_id(), event = event.name(), "{event:?}");
        }

        let session = self.sessions.get_session(event.worker_id());
        let mut dispatch = Dispatch {
            config: &self.config,
            session,
            spec_failures: &mut self.spec_failures,
        };
        dispatch.dispatch(event)
    }

    /// Returns the workers that still have a suite open.
    ///
    /// Such workers never sent their closing events, so their open suites were never written.
    pub fn unfinished_workers(&self) -> impl Iterator<Item = &WorkerId> {
        self.sessions
            .iter()
            .filter(|session| session.allure().current_suite().is_some())
            .map(|session| session.worker_id())
    }
}

struct Dispatch<'a> {
    config: &'a ReporterConfig,
    session: &'a mut ReportSession,
    spec_failures: &'a mut SpecFailureIndex,
}

impl Dispatch<'_> {
    fn dispatch(&mut self, event: ReporterEvent) -> Result<(), WriteEventError> {
        match event {
            ReporterEvent::SuiteStart(suite) => self.suite_start(suite),
            ReporterEvent::SuiteEnd(_) => self.suite_end(),
            ReporterEvent::TestStart(test) => self.test_start(test),
            ReporterEvent::TestPass(_) => self.test_end("test:pass", TestOutcome::Passed),
            ReporterEvent::TestUnvalidated(_) => {
                self.test_end("test:unvalidated", TestOutcome::Unvalidated)
            }
            ReporterEvent::TestFail(test) => self.test_fail(test, false),
            ReporterEvent::TestBroken(test) => self.test_fail(test, true),
            ReporterEvent::TestPending(test) => self.test_pending(test),
            ReporterEvent::TestMeta(meta) => self.test_meta(meta),
            ReporterEvent::TestAttach(attach) => self.test_attach(attach),
            ReporterEvent::TestLog(log) => self.test_log(log),
            ReporterEvent::StepStart(step) => self.step_start(step),
            ReporterEvent::StepEnd(step) => self.step_end(step),
            ReporterEvent::StepPass(step) => self.step_fixed("step:pass", step, Status::Passed),
            ReporterEvent::StepFail(step) => self.step_fixed("step:fail", step, Status::Failed),
            ReporterEvent::StepBroken(step) => {
                self.step_fixed("step:broken", step, Status::Broken)
            }
            ReporterEvent::StepUnvalidated(step) => {
                self.step_fixed("step:unvalidated", step, Status::Unvalidated)
            }
            ReporterEvent::TriggerSpecMode(_) => {
                debug!(worker = %self.session.worker_id(), "entering spec mode");
                self.session.enter_spec_mode();
                Ok(())
            }
            ReporterEvent::VerifyStart(verify) => {
                self.session.set_verify_container(verify.verify_container);
                Ok(())
            }
            ReporterEvent::VerifyEnd(_) => {
                self.session.set_verify_container(None);
                Ok(())
            }
            ReporterEvent::Command(command) => self.command(command),
            ReporterEvent::CommandResult(result) => self.command_result(result),
            ReporterEvent::Screenshot(screenshot) => self.screenshot(screenshot),
            ReporterEvent::HookStart(hook) => self.hook_start(hook),
            ReporterEvent::HookEnd(hook) => self.hook_end(hook),
        }
    }

    // ---
    // Suites and tests
    // ---

    fn suite_start(&mut self, suite: SuiteEvent) -> Result<(), WriteEventError> {
        let allure = self.session.allure_mut();
        let title = match allure.current_suite() {
            Some(parent) => format!("{} {}", parent.name, suite.title),
            None => suite.title,
        };
        allure.start_suite(title);
        Ok(())
    }

    fn suite_end(&mut self) -> Result<(), WriteEventError> {
        if !self.require_suite("suite:end") {
            return Ok(());
        }
        if let Some(path) = self.session.allure_mut().end_suite()? {
            debug!(worker = %self.session.worker_id(), %path, "wrote suite");
        }
        Ok(())
    }

    fn test_start(&mut self, test: TestEvent) -> Result<(), WriteEventError> {
        if !self.require_suite("test:start") {
            return Ok(());
        }
        self.session.begin_test(test.title);

        let base_url = self.config.base_url();
        let Some(test_case) = self.session.current_test_mut() else {
            return Ok(());
        };
        if let Some(capabilities) = test.runner.get(test.cid.as_str()) {
            test_case.add_parameter(ENVIRONMENT_VARIABLE, "capabilities", capabilities.to_string());
        }
        if let Some(specs) = &test.specs {
            test_case.add_parameter(ENVIRONMENT_VARIABLE, "spec files", specs.to_string());
        }
        if let Some(base_url) = base_url {
            test_case.add_parameter(ENVIRONMENT_VARIABLE, "base url", base_url);
        }
        Ok(())
    }

    fn test_end(
        &mut self,
        event: &'static str,
        outcome: TestOutcome<'_>,
    ) -> Result<(), WriteEventError> {
        if !self.require_test(event) {
            return Ok(());
        }
        if let Some(resolution) = self.session.finish_test(outcome) {
            debug!(worker = %self.session.worker_id(), status = %resolution.status, "{event}");
        }
        Ok(())
    }

    fn test_fail(&mut self, test: TestEvent, broken: bool) -> Result<(), WriteEventError> {
        let event = if broken { "test:broken" } else { "test:fail" };
        if !self.require_suite(event) {
            return Ok(());
        }

        // A test can fail before it ever started, e.g. in a `before each` hook.
        match self.session.current_test_mut() {
            Some(test_case) => test_case.name.clone_from(&test.title),
            None => {
                self.session.begin_test(test.title.clone());
            }
        }

        if !self.session.spec_mode() {
            let registered = self.spec_failures.register_test(&test);
            if registered > 0 {
                debug!(
                    worker = %self.session.worker_id(),
                    registered,
                    "recorded failures against spec criteria",
                );
            }
        }

        let outcome = if broken {
            TestOutcome::Broken(test.errors())
        } else {
            TestOutcome::Failed(test.errors())
        };
        self.test_end(event, outcome)
    }

    fn test_pending(&mut self, test: TestEvent) -> Result<(), WriteEventError> {
        if let Some(running) = self
            .session
            .current_test_name()
            .filter(|running| *running != test.title)
        {
            error!(
                worker = %self.session.worker_id(),
                "test:pending: test {running:?} was still running, ending it as pending",
            );
        }
        if !self.session.pending_test(test.title) {
            error!(worker = %self.session.worker_id(), "test:pending: no suite is open, discarding event");
        }
        Ok(())
    }

    fn test_meta(&mut self, event: MetaEvent) -> Result<(), WriteEventError> {
        if !self.require_test("test:meta") {
            return Ok(());
        }

        let (meta, errors) = TestMeta::from_event(&event);
        for meta_error in errors {
            error!(worker = %self.session.worker_id(), "{meta_error}, skipping field");
        }

        let bug = self.config.bug();
        let Some(test_case) = self.session.current_test_mut() else {
            return Ok(());
        };
        if let Some(description) = meta.description {
            test_case.set_description(description);
        }
        for (name, values) in [
            ("feature", meta.features),
            ("story", meta.stories),
            ("issue", meta.issues),
        ] {
            for value in values {
                test_case.add_label(name, value);
            }
        }
        for bug_id in &meta.bugs {
            let value = bug.apply(bug_id);
            test_case
                .add_label("issue", value.clone())
                .add_label("bug", value);
        }
        if let Some(severity) = meta.severity {
            test_case.add_label("severity", severity);
        }
        for (name, value) in meta.arguments {
            test_case.add_parameter("argument", name, value);
        }
        for (name, value) in meta.environment {
            test_case.add_parameter(ENVIRONMENT_VARIABLE, name, value);
        }
        Ok(())
    }

    fn test_attach(&mut self, attach: AttachEvent) -> Result<(), WriteEventError> {
        if !self.require_test("test:attach") {
            return Ok(());
        }
        let content = fs::read(&attach.file).map_err(|error| WriteEventError::Fs {
            file: attach.file.clone(),
            error,
        })?;
        self.session.allure_mut().add_attachment(
            attach.title,
            &content,
            attach.mime_type.as_deref(),
        )?;
        Ok(())
    }

    fn test_log(&mut self, log: LogEvent) -> Result<(), WriteEventError> {
        if !self.require_test("test:log") {
            return Ok(());
        }
        let content = match &log.detail {
            Some(detail) => to_pretty_json(&log.message, detail)?,
            None => String::new(),
        };
        self.session
            .allure_mut()
            .add_attachment(log.message, content.as_bytes(), Some(JSON_MIME))?;
        Ok(())
    }

    // ---
    // Steps
    // ---

    fn step_start(&mut self, step: StepEvent) -> Result<(), WriteEventError> {
        if !self.require_test("step:start") {
            return Ok(());
        }
        let title = step.title.unwrap_or_else(|| DEFAULT_STEP_NAME.to_owned());
        self.session.open_step(title);
        if let Some(arg) = step.arg.as_ref().filter(|arg| !is_blank(arg)) {
            dump_json(self.session, "Step Arg", arg)?;
        }
        Ok(())
    }

    fn step_end(&mut self, step: StepEvent) -> Result<(), WriteEventError> {
        if !self.require_step("step:end") {
            return Ok(());
        }

        if let Some(verify) = &step.verify {
            let failures = self
                .spec_failures
                .lookup(verify.story_id.as_str(), verify.criteria_id.as_str());
            if !failures.is_empty() {
                debug!(
                    worker = %self.session.worker_id(),
                    spec = verify.story_id.as_str(),
                    criteria = verify.criteria_id.as_str(),
                    failures = failures.len(),
                    "verified criteria has recorded failures",
                );
                if let Some(state) = self.session.current_step_mut() {
                    state.apply(Status::Failed);
                }
                self.session.accumulate_spec_failures(failures.iter().cloned());
                let listing: Vec<_> = failures.iter().map(VerificationFailure::from).collect();
                dump_json(self.session, "Verification Failures", &listing)?;
            }
        }

        if let Some(arg) = step.arg.as_ref().filter(|arg| !is_blank(arg)) {
            dump_json(self.session, "Step Result", arg)?;
        }

        if step.kind.as_deref() == Some(VERIFY_END_KIND) {
            let failed_assertions = self
                .session
                .current_step()
                .filter(|state| state.status() == Status::Failed)
                .map(|state| state.failed_assertions().to_vec())
                .unwrap_or_default();
            if !failed_assertions.is_empty() {
                dump_json(self.session, "Verification Failures", &failed_assertions)?;
            }
        }

        self.session.close_step(step.status.map(Status::from));
        Ok(())
    }

    fn step_fixed(
        &mut self,
        event: &'static str,
        step: StepEvent,
        status: Status,
    ) -> Result<(), WriteEventError> {
        if !self.require_step(event) {
            return Ok(());
        }
        let failure = step
            .assertion
            .as_ref()
            .filter(|_| status.is_failing())
            .map(|assertion| FailureRecord::from_error(assertion, None));

        let Some(state) = self.session.current_step_mut() else {
            return Ok(());
        };
        match &failure {
            Some(failure) => state.record_failure(status, failure.clone()),
            None => state.apply(status),
        }

        if let Some(failure) = &failure {
            dump_json(self.session, "Step Failure", failure)?;
        }
        Ok(())
    }

    // ---
    // WebDriver commands and screenshots
    // ---

    fn command(&mut self, command: CommandEvent) -> Result<(), WriteEventError> {
        if !self.config.debug_selenium_command() || !self.session.is_test_running() {
            return Ok(());
        }
        self.session
            .open_step(format!("{} {}", command.method, command.uri.path));
        if let Some(data) = command.data.as_ref().filter(|data| !is_blank(data)) {
            dump_json(self.session, "Request", data)?;
        }
        Ok(())
    }

    fn command_result(&mut self, mut result: CommandResultEvent) -> Result<(), WriteEventError> {
        if !self.config.debug_selenium_command() || !self.session.is_test_running() {
            return Ok(());
        }

        let mut status = Status::Passed;
        if SCREENSHOT_PATH_REGEX.is_match(&result.request_options.uri.path) {
            if let Some(data) = result.body.get("value").and_then(Value::as_str) {
                attach_base64(self.session, "Screenshot", data)?;
            }
        } else {
            let screenshot = result
                .body
                .as_object_mut()
                .and_then(|body| body.remove("screenshot"));
            if let Some(Value::String(data)) = &screenshot {
                attach_base64(self.session, "Screenshot", data)?;
            }
            if result.body.get("type").and_then(Value::as_str) == Some("RuntimeError") {
                status = Status::Broken;
            }
            dump_json(self.session, "Response", &result.body)?;
        }

        self.session.close_step(Some(status));
        Ok(())
    }

    fn screenshot(&mut self, screenshot: ScreenshotEvent) -> Result<(), WriteEventError> {
        if !self.require_test("runner:screenshot") {
            return Ok(());
        }
        attach_base64(
            self.session,
            &format!("screenshot {}", screenshot.filename),
            &screenshot.data,
        )
    }

    // ---
    // Hooks
    // ---

    fn hook_start(&mut self, hook: HookEvent) -> Result<(), WriteEventError> {
        if !self.is_logging_hook(&hook) {
            return Ok(());
        }
        self.session.begin_test(hook.title);
        Ok(())
    }

    fn hook_end(&mut self, hook: HookEvent) -> Result<(), WriteEventError> {
        if !self.is_logging_hook(&hook) {
            return Ok(());
        }
        let kept = self.session.finish_hook();
        debug!(worker = %self.session.worker_id(), hook = %hook.title, kept, "hook ended");
        Ok(())
    }

    fn is_logging_hook(&self, hook: &HookEvent) -> bool {
        self.session.allure().current_suite().is_some()
            && LOGGING_HOOKS.contains(&hook.title.as_str())
    }

    // ---
    // Preconditions
    // ---

    fn require_suite(&self, event: &'static str) -> bool {
        let open = self.session.allure().current_suite().is_some();
        if !open {
            error!(worker = %self.session.worker_id(), "{event}: no suite is open, discarding event");
        }
        open
    }

    fn require_test(&self, event: &'static str) -> bool {
        let running = self.session.is_test_running();
        if !running {
            error!(worker = %self.session.worker_id(), "{event}: no test is running, discarding event");
        }
        running
    }

    fn require_step(&self, event: &'static str) -> bool {
        if !self.require_test(event) {
            return false;
        }
        let open = self.session.current_step().is_some();
        if !open {
            error!(worker = %self.session.worker_id(), "{event}: no step is open, discarding event");
        }
        open
    }
}

/// Attaches a value as pretty-printed JSON, with escaped double quotes turned into single quotes.
fn dump_json(
    session: &mut ReportSession,
    title: &str,
    value: &impl Serialize,
) -> Result<(), WriteEventError> {
    let json = to_pretty_json(title, value)?.replace("\\\"", "'");
    session
        .allure_mut()
        .add_attachment(title, json.as_bytes(), Some(JSON_MIME))?;
    Ok(())
}

fn to_pretty_json(title: &str, value: &impl Serialize) -> Result<String, WriteEventError> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .map_err(|error| WriteEventError::Json {
            title: title.to_owned(),
            error,
        })?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn attach_base64(
    session: &mut ReportSession,
    title: &str,
    data: &str,
) -> Result<(), WriteEventError> {
    match STANDARD.decode(data) {
        Ok(image) => {
            session
                .allure_mut()
                .add_attachment(title, &image, Some(PNG_MIME))?;
        }
        Err(decode_error) => {
            error!(
                worker = %session.worker_id(),
                "{title}: invalid base64 data, discarding attachment: {decode_error}",
            );
        }
    }
    Ok(())
}

// Null, false and empty values carry nothing worth attaching.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(_) => false,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
