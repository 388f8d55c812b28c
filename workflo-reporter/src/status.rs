// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status resolution for tests and steps.
//!
//! Everything in this module is pure: the session feeds in what it observed, and gets back the
//! status and failure payload to record. Precedence is the ordering of [`Status`]:
//! `Broken > Failed > Passed > Pending > Unvalidated`.

use crate::{correlator::FailureRecord, events::ErrorDetail};
use allure_model::{Failure, Status};

/// Folds a set of observed outcomes into the one with the highest precedence.
///
/// Returns `None` if nothing was observed.
pub fn reduce(outcomes: impl IntoIterator<Item = Status>) -> Option<Status> {
    outcomes.into_iter().max()
}

/// What the runner reported at the end of a test.
#[derive(Clone, Copy, Debug)]
pub enum TestOutcome<'a> {
    /// `test:pass`.
    Passed,

    /// `test:fail`, with the errors the test raised. Errors without a matcher make the test
    /// broken rather than failed.
    Failed(&'a [ErrorDetail]),

    /// `test:broken`, with the errors the test raised.
    Broken(&'a [ErrorDetail]),

    /// `test:unvalidated`.
    Unvalidated,
}

impl TestOutcome<'_> {
    /// Returns the status implied by this outcome alone.
    pub fn status(&self) -> Status {
        match self {
            Self::Passed => Status::Passed,
            Self::Failed(errors) => {
                reduce(errors.iter().map(ErrorDetail::status)).unwrap_or(Status::Failed)
            }
            Self::Broken(_) => Status::Broken,
            Self::Unvalidated => Status::Unvalidated,
        }
    }

    fn errors(&self) -> &[ErrorDetail] {
        match self {
            Self::Failed(errors) | Self::Broken(errors) => errors,
            Self::Passed | Self::Unvalidated => &[],
        }
    }
}

/// What a session observed about the running test before its terminal event.
///
/// Reset whenever a test starts.
#[derive(Clone, Debug, Default)]
pub struct TestObservations {
    /// Failures correlated onto this test by steps verifying spec criteria.
    pub spec_failures: Vec<FailureRecord>,

    /// Failing statuses of steps that ended within this test.
    pub step_outcomes: Vec<Status>,

    /// Failed assertions recorded by those steps.
    pub step_failures: Vec<FailureRecord>,
}

impl TestObservations {
    /// Records a step that ended with a failing status.
    pub fn record_failed_step(&mut self, status: Status, failures: Vec<FailureRecord>) {
        self.step_outcomes.push(status);
        self.step_failures.extend(failures);
    }
}

/// The status and failure payload to record for a test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    /// The final status.
    pub status: Status,

    /// The failure payload, if there is anything to report.
    pub failure: Option<Failure>,
}

/// Resolves the final status of a test.
///
/// In spec-validation mode, failures correlated onto the test turn an otherwise passing outcome
/// into `Failed`. Failing steps can likewise never leave a test passed.
pub fn resolve_test(
    outcome: TestOutcome<'_>,
    spec_mode: bool,
    observations: &TestObservations,
) -> Resolution {
    let spec_failed = spec_mode && !observations.spec_failures.is_empty();
    let status = reduce(
        std::iter::once(outcome.status())
            .chain(observations.step_outcomes.iter().copied())
            .chain(spec_failed.then_some(Status::Failed)),
    )
    .unwrap_or(Status::Passed);

    let errors = outcome.errors();
    let failure = if !errors.is_empty() {
        combine_failures(
            errors
                .iter()
                .map(|error| (error.message(), error.stack())),
        )
    } else if spec_failed {
        combine_records(&observations.spec_failures)
    } else if status.is_failing() {
        combine_records(&observations.step_failures)
    } else {
        None
    };

    Resolution { status, failure }
}

/// Combines several failures into one payload.
///
/// Messages are joined by newlines and stacks by blank lines, each wrapped with a leading newline.
/// Returns `None` if there is nothing to combine.
pub fn combine_failures<'a>(
    failures: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<Failure> {
    let (messages, stacks): (Vec<_>, Vec<_>) = failures.into_iter().unzip();
    if messages.is_empty() {
        return None;
    }
    Some(Failure::new(
        format!("\n{}\n", messages.join("\n")),
        format!("\n{}", stacks.join("\n\n")),
    ))
}

fn combine_records(records: &[FailureRecord]) -> Option<Failure> {
    combine_failures(
        records
            .iter()
            .map(|record| (record.message.as_str(), record.stack.as_str())),
    )
}

/// The status of an open step, as it accumulates.
#[derive(Clone, Debug)]
pub struct StepState {
    status: Status,
    failed_assertions: Vec<FailureRecord>,
}

impl Default for StepState {
    fn default() -> Self {
        Self {
            status: Status::Passed,
            failed_assertions: vec![],
        }
    }
}

impl StepState {
    /// Creates the state of a freshly opened step, which starts out passed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the assertions that failed within this step.
    pub fn failed_assertions(&self) -> &[FailureRecord] {
        &self.failed_assertions
    }

    /// Fixes the status of this step.
    ///
    /// Failing statuses are sticky: once failed or broken, a step can only get worse.
    pub fn apply(&mut self, status: Status) {
        self.status = if self.status.is_failing() {
            self.status.max(status)
        } else {
            status
        };
    }

    /// Records a failed assertion and downgrades the step accordingly.
    pub fn record_failure(&mut self, status: Status, failure: FailureRecord) {
        self.apply(status);
        self.failed_assertions.push(failure);
    }

    /// Returns the status to close this step with, honoring an explicit override.
    pub fn end_status(&self, explicit: Option<Status>) -> Status {
        explicit.unwrap_or(self.status)
    }

    /// Returns the status to close this step with when its test ends while it is still open.
    ///
    /// A failing test drags its open steps down with it.
    pub fn unwind_status(&self, test_status: Status) -> Status {
        if test_status.is_failing() {
            self.status.max(test_status)
        } else {
            self.status
        }
    }

    /// Consumes the state, returning the failed assertions.
    pub fn into_failed_assertions(self) -> Vec<FailureRecord> {
        self.failed_assertions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn assertion(message: &str) -> ErrorDetail {
        ErrorDetail {
            message: Some(message.to_owned()),
            stack: Some(format!("at {message}")),
            matcher_name: Some("toEqual".to_owned()),
            ..ErrorDetail::default()
        }
    }

    fn unexpected(message: &str) -> ErrorDetail {
        ErrorDetail {
            message: Some(message.to_owned()),
            stack: Some(format!("at {message}")),
            ..ErrorDetail::default()
        }
    }

    fn record(message: &str) -> FailureRecord {
        FailureRecord::from_error(&assertion(message), None)
    }

    #[test_case(&[Status::Passed, Status::Broken, Status::Failed], Some(Status::Broken); "broken wins")]
    #[test_case(&[Status::Passed, Status::Failed], Some(Status::Failed); "failed beats passed")]
    #[test_case(&[Status::Unvalidated, Status::Pending], Some(Status::Pending); "pending beats unvalidated")]
    #[test_case(&[], None; "nothing observed")]
    fn reduce_picks_highest_precedence(outcomes: &[Status], expected: Option<Status>) {
        assert_eq!(reduce(outcomes.iter().copied()), expected);
    }

    #[test]
    fn failed_outcome_with_unexpected_error_is_broken() {
        let errors = [assertion("a"), unexpected("b")];
        assert_eq!(TestOutcome::Failed(&errors).status(), Status::Broken);
        assert_eq!(TestOutcome::Failed(&errors[..1]).status(), Status::Failed);
        assert_eq!(TestOutcome::Failed(&[]).status(), Status::Failed);
    }

    #[test]
    fn empty_matcher_name_is_broken() {
        let mut error = assertion("a");
        error.matcher_name = Some(String::new());
        assert_eq!(TestOutcome::Failed(&[error]).status(), Status::Broken);
    }

    #[test]
    fn failed_outcome_combines_errors() {
        let errors = [assertion("first"), assertion("second")];
        let resolution = resolve_test(
            TestOutcome::Failed(&errors),
            false,
            &TestObservations::default(),
        );
        assert_eq!(
            resolution,
            Resolution {
                status: Status::Failed,
                failure: Some(Failure::new(
                    "\nfirst\nsecond\n",
                    "\nat first\n\nat second"
                )),
            }
        );
    }

    #[test]
    fn spec_failures_fail_a_passing_test_in_spec_mode() {
        let observations = TestObservations {
            spec_failures: vec![record("c1 broke"), record("c2 broke")],
            ..TestObservations::default()
        };

        let resolution = resolve_test(TestOutcome::Passed, true, &observations);
        assert_eq!(resolution.status, Status::Failed);
        assert_eq!(
            resolution.failure,
            Some(Failure::new(
                "\nc1 broke\nc2 broke\n",
                "\nat c1 broke\n\nat c2 broke"
            ))
        );

        let resolution = resolve_test(TestOutcome::Passed, false, &observations);
        assert_eq!(
            resolution,
            Resolution {
                status: Status::Passed,
                failure: None,
            },
            "outside spec mode correlated failures are not applied"
        );
    }

    #[test]
    fn failing_step_never_leaves_test_passed() {
        let mut observations = TestObservations::default();
        observations.record_failed_step(Status::Failed, vec![record("step assertion")]);

        let resolution = resolve_test(TestOutcome::Passed, false, &observations);
        assert_eq!(resolution.status, Status::Failed);
        assert_eq!(
            resolution.failure,
            Some(Failure::new("\nstep assertion\n", "\nat step assertion"))
        );

        let resolution = resolve_test(TestOutcome::Unvalidated, false, &observations);
        assert_eq!(resolution.status, Status::Failed);
    }

    #[test]
    fn unvalidated_stays_unvalidated() {
        let resolution = resolve_test(
            TestOutcome::Unvalidated,
            true,
            &TestObservations::default(),
        );
        assert_eq!(resolution.status, Status::Unvalidated);
        assert_eq!(resolution.failure, None);
    }

    #[test]
    fn step_failure_is_sticky() {
        let mut step = StepState::new();
        assert_eq!(step.status(), Status::Passed);

        step.record_failure(Status::Failed, record("nope"));
        step.apply(Status::Passed);
        assert_eq!(step.status(), Status::Failed);

        step.apply(Status::Broken);
        assert_eq!(step.status(), Status::Broken);
        step.apply(Status::Failed);
        assert_eq!(step.status(), Status::Broken);
        assert_eq!(step.failed_assertions().len(), 1);
    }

    #[test]
    fn non_failing_statuses_replace_each_other() {
        let mut step = StepState::new();
        step.apply(Status::Unvalidated);
        assert_eq!(step.status(), Status::Unvalidated);
        step.apply(Status::Passed);
        assert_eq!(step.status(), Status::Passed);
    }

    #[test]
    fn explicit_end_status_overrides() {
        let mut step = StepState::new();
        step.apply(Status::Failed);
        assert_eq!(step.end_status(None), Status::Failed);
        assert_eq!(step.end_status(Some(Status::Passed)), Status::Passed);
    }

    #[test_case(Status::Passed, Status::Broken, Status::Broken; "broken test drags passed step")]
    #[test_case(Status::Failed, Status::Broken, Status::Broken; "broken test drags failed step")]
    #[test_case(Status::Broken, Status::Failed, Status::Broken; "broken step stays broken")]
    #[test_case(Status::Failed, Status::Passed, Status::Failed; "passing test keeps step status")]
    fn unwinding(step_status: Status, test_status: Status, expected: Status) {
        let mut step = StepState::new();
        step.apply(step_status);
        assert_eq!(step.unwind_status(test_status), expected);
    }

    #[test]
    fn nothing_to_combine() {
        assert_eq!(combine_failures(std::iter::empty()), None);
    }
}
