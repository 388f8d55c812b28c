// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-worker report sessions.
//!
//! Each worker builds its report in isolation: interleaved events from different workers never
//! touch each other's running test or open steps.

use crate::{
    correlator::FailureRecord,
    events::WorkerId,
    status::{Resolution, StepState, TestObservations, TestOutcome, resolve_test},
};
use allure_model::{Allure, Status, TestCase};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// The report-building context of a single worker.
#[derive(Debug)]
pub struct ReportSession {
    worker_id: WorkerId,
    allure: Allure,
    spec_mode: bool,
    verify_container: Option<Value>,
    // One entry per step open in `allure`, innermost last.
    steps: Vec<StepState>,
    observations: TestObservations,
}

impl ReportSession {
    /// Creates a session writing result files into `output_dir`.
    pub fn new(worker_id: WorkerId, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            worker_id,
            allure: Allure::new(output_dir),
            spec_mode: false,
            verify_container: None,
            steps: vec![],
            observations: TestObservations::default(),
        }
    }

    /// Returns the worker this session belongs to.
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Returns the report-tree builder.
    pub fn allure(&self) -> &Allure {
        &self.allure
    }

    /// Returns the report-tree builder mutably.
    pub fn allure_mut(&mut self) -> &mut Allure {
        &mut self.allure
    }

    /// Returns true once the worker has moved on to validating specs.
    pub fn spec_mode(&self) -> bool {
        self.spec_mode
    }

    /// Switches the session into spec-validation mode. There is no way back.
    pub fn enter_spec_mode(&mut self) {
        self.spec_mode = true;
    }

    /// Returns the container of the verification block in progress, if any.
    pub fn verify_container(&self) -> Option<&Value> {
        self.verify_container.as_ref()
    }

    /// Sets or clears the verification block in progress.
    pub fn set_verify_container(&mut self, verify_container: Option<Value>) {
        self.verify_container = verify_container;
    }

    /// Returns true if both a suite and a test are open.
    pub fn is_test_running(&self) -> bool {
        self.allure.current_suite().is_some() && self.allure.is_test_running()
    }

    /// Returns the running test.
    pub fn current_test_mut(&mut self) -> Option<&mut TestCase> {
        self.allure.current_test_mut()
    }

    /// Returns what has been observed about the running test so far.
    pub fn observations(&self) -> &TestObservations {
        &self.observations
    }

    /// Starts a test, resetting everything accumulated for the previous one.
    ///
    /// Returns false if no suite is open.
    pub fn begin_test(&mut self, name: impl Into<String>) -> bool {
        if !self.allure.start_case(name) {
            return false;
        }
        self.steps.clear();
        self.observations = TestObservations::default();
        true
    }

    /// Records a skipped test.
    ///
    /// A running test is ended as skipped first, closing its open steps. If the running test is
    /// the one being skipped, no further test is recorded. Returns false if no suite is open.
    pub fn pending_test(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.is_test_running() {
            let skipped_itself = self
                .allure
                .current_test()
                .is_some_and(|test_case| test_case.name == name);
            self.unwind_steps(Status::Pending);
            self.allure.skip_case();
            if skipped_itself {
                return true;
            }
        }
        self.steps.clear();
        self.allure.pending_case(name)
    }

    /// Returns the name of the running test.
    pub fn current_test_name(&self) -> Option<&str> {
        self.allure
            .current_test()
            .map(|test_case| test_case.name.as_str())
    }

    /// Appends failures correlated onto the running test.
    pub fn accumulate_spec_failures(&mut self, failures: impl IntoIterator<Item = FailureRecord>) {
        self.observations.spec_failures.extend(failures);
    }

    /// Opens a step within the running test.
    ///
    /// Returns false if no test is running.
    pub fn open_step(&mut self, name: impl Into<String>) -> bool {
        if !self.allure.start_step(name) {
            return false;
        }
        self.steps.push(StepState::new());
        true
    }

    /// Returns the number of open steps.
    pub fn open_step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the state of the innermost open step.
    pub fn current_step(&self) -> Option<&StepState> {
        self.steps.last()
    }

    /// Returns the state of the innermost open step mutably.
    pub fn current_step_mut(&mut self) -> Option<&mut StepState> {
        self.steps.last_mut()
    }

    /// Closes the innermost open step, returning the status it was closed with.
    ///
    /// A failing step downgrades its enclosing step and is remembered for the test's resolution.
    pub fn close_step(&mut self, explicit: Option<Status>) -> Option<Status> {
        let state = self.steps.pop()?;
        let status = state.end_status(explicit);
        self.finish_step(state, status);
        Some(status)
    }

    /// Ends the running test with the given outcome.
    ///
    /// Steps still open are closed first, innermost first. Returns `None` if no test is running.
    pub fn finish_test(&mut self, outcome: TestOutcome<'_>) -> Option<Resolution> {
        if !self.is_test_running() {
            return None;
        }
        self.unwind_steps(outcome.status());
        let resolution = resolve_test(outcome, self.spec_mode, &self.observations);
        self.allure
            .end_case(resolution.status, resolution.failure.clone());
        Some(resolution)
    }

    /// Ends the pseudo-test recorded for a fixture hook.
    ///
    /// Hooks always pass. A hook in which no step ran is dropped from the report; returns true if
    /// the hook was kept.
    pub fn finish_hook(&mut self) -> bool {
        if !self.is_test_running() {
            return false;
        }
        self.unwind_steps(Status::Passed);
        self.allure.end_case(Status::Passed, None);

        let has_steps = self
            .allure
            .current_suite()
            .and_then(|suite| suite.test_cases.last())
            .is_some_and(|test_case| !test_case.steps.is_empty());
        if !has_steps {
            self.allure.pop_last_case();
        }
        has_steps
    }

    // ---
    // Helper methods
    // ---

    fn unwind_steps(&mut self, test_status: Status) {
        while let Some(state) = self.steps.pop() {
            let status = state.unwind_status(test_status);
            self.finish_step(state, status);
        }
    }

    fn finish_step(&mut self, state: StepState, status: Status) {
        self.allure.end_step(status);
        if status.is_failing() {
            if let Some(parent) = self.steps.last_mut() {
                parent.apply(status);
            }
            self.observations
                .record_failed_step(status, state.into_failed_assertions());
        }
    }
}

/// Report sessions keyed by worker id.
#[derive(Debug)]
pub struct SessionMap {
    output_dir: Utf8PathBuf,
    sessions: IndexMap<WorkerId, ReportSession>,
}

impl SessionMap {
    /// Creates an empty map. Every session writes into `output_dir`.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sessions: IndexMap::new(),
        }
    }

    /// Returns the directory every session writes into.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Returns the session of a worker, creating it on first use.
    ///
    /// Calling this again with the same id returns the same session, state intact.
    pub fn get_session(&mut self, worker_id: &WorkerId) -> &mut ReportSession {
        let output_dir = &self.output_dir;
        self.sessions
            .entry(worker_id.clone())
            .or_insert_with(|| {
                debug!(worker = %worker_id, %output_dir, "creating report session");
                ReportSession::new(worker_id.clone(), output_dir.clone())
            })
    }

    /// Returns the session of a worker, if it exists.
    pub fn get(&self, worker_id: &WorkerId) -> Option<&ReportSession> {
        self.sessions.get(worker_id)
    }

    /// Returns the number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session was created yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterates over sessions in the order they were created.
    pub fn iter(&self) -> impl Iterator<Item = &ReportSession> {
        self.sessions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ErrorDetail;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn running_session(temp_dir: &Utf8TempDir) -> ReportSession {
        let mut session = ReportSession::new(WorkerId::new("0-0"), temp_dir.path());
        session.allure_mut().start_suite("suite");
        assert!(session.begin_test("test"));
        session
    }

    fn failure(message: &str) -> FailureRecord {
        FailureRecord::from_error(
            &ErrorDetail {
                message: Some(message.to_owned()),
                matcher_name: Some("toBe".to_owned()),
                ..ErrorDetail::default()
            },
            None,
        )
    }

    #[test]
    fn get_session_is_idempotent() {
        let mut sessions = SessionMap::new("allure-results");
        let worker_id = WorkerId::new("0-1");

        sessions
            .get_session(&worker_id)
            .accumulate_spec_failures([failure("kept")]);
        let session = sessions.get_session(&worker_id);
        assert_eq!(session.observations().spec_failures.len(), 1);
        assert_eq!(
            session.allure().target_dir(),
            Utf8Path::new("allure-results")
        );

        sessions.get_session(&WorkerId::new("0-2"));
        assert_eq!(sessions.len(), 2);
        let ids: Vec<_> = sessions.iter().map(|s| s.worker_id().as_str()).collect();
        assert_eq!(ids, ["0-1", "0-2"]);
    }

    #[test]
    fn begin_test_requires_suite() {
        let mut session = ReportSession::new(WorkerId::new("0"), "unused");
        assert!(!session.begin_test("orphan"));
        assert!(!session.is_test_running());
    }

    #[test]
    fn begin_test_resets_observations() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let mut session = running_session(&temp_dir);
        session.accumulate_spec_failures([failure("stale")]);
        session.open_step("left open");

        assert!(session.begin_test("next"));
        assert!(session.observations().spec_failures.is_empty());
        assert_eq!(session.open_step_count(), 0);
    }

    #[test]
    fn failed_step_fails_passing_test() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let mut session = running_session(&temp_dir);

        session.open_step("step");
        session
            .current_step_mut()
            .unwrap()
            .record_failure(Status::Failed, failure("nope"));
        assert_eq!(session.close_step(None), Some(Status::Failed));

        let resolution = session.finish_test(TestOutcome::Passed).unwrap();
        assert_eq!(resolution.status, Status::Failed);
        let test_case = &session.allure().current_suite().unwrap().test_cases[0];
        assert_eq!(test_case.status, Some(Status::Failed));
        assert_eq!(test_case.steps[0].status, Some(Status::Failed));
    }

    #[test]
    fn failing_child_downgrades_parent() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let mut session = running_session(&temp_dir);

        session.open_step("outer");
        session.open_step("inner");
        session.current_step_mut().unwrap().apply(Status::Broken);
        assert_eq!(session.close_step(None), Some(Status::Broken));
        assert_eq!(session.current_step().unwrap().status(), Status::Broken);
        assert_eq!(session.close_step(None), Some(Status::Broken));
        assert_eq!(session.close_step(None), None);
    }

    #[test]
    fn finishing_test_unwinds_open_steps() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let mut session = running_session(&temp_dir);
        session.open_step("outer");
        session.open_step("inner");

        let errors = [ErrorDetail {
            message: Some("kaput".to_owned()),
            ..ErrorDetail::default()
        }];
        let resolution = session.finish_test(TestOutcome::Broken(&errors)).unwrap();
        assert_eq!(resolution.status, Status::Broken);
        assert_eq!(session.open_step_count(), 0);
        assert_eq!(session.allure().open_step_depth(), 0);

        let test_case = &session.allure().current_suite().unwrap().test_cases[0];
        let outer = &test_case.steps[0];
        assert_eq!(outer.status, Some(Status::Broken));
        assert_eq!(outer.steps[0].status, Some(Status::Broken));
        assert!(outer.steps[0].stop.unwrap() <= outer.stop.unwrap());
    }

    #[test]
    fn hook_without_steps_is_dropped() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let mut session = ReportSession::new(WorkerId::new("0"), temp_dir.path());
        session.allure_mut().start_suite("suite");

        session.begin_test("\"before all\" hook");
        assert!(!session.finish_hook());
        assert!(!session.allure().current_suite().unwrap().has_test_cases());

        session.begin_test("\"after all\" hook");
        session.open_step("cleanup");
        assert!(session.finish_hook());
        let test_cases = &session.allure().current_suite().unwrap().test_cases;
        assert_eq!(test_cases.len(), 1);
        assert_eq!(test_cases[0].status, Some(Status::Passed));
    }

    #[test]
    fn skipping_the_running_test_ends_it() {
        let temp_dir = Utf8TempDir::new().unwrap();
        let mut session = running_session(&temp_dir);
        assert!(session.open_step("step"));

        assert!(session.pending_test("test"));
        assert!(!session.is_test_running());
        assert_eq!(session.open_step_count(), 0);

        let test_cases = &session.allure().current_suite().unwrap().test_cases;
        assert_eq!(test_cases.len(), 1);
        assert_eq!(test_cases[0].status, Some(Status::Pending));
        assert_eq!(test_cases[0].steps[0].status, Some(Status::Passed));
    }
}
