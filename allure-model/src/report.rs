// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::SerializeError, serialize::serialize_suite};
use std::{fmt, io};

/// The outcome of a test case or step.
///
/// Variants are declared in ascending order of severity, so the derived `Ord` doubles as
/// the precedence used when several outcomes have to be folded into one:
/// `Unvalidated < Pending < Passed < Failed < Broken`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Status {
    /// The test or step was never checked against anything.
    Unvalidated,

    /// The test was skipped.
    Pending,

    /// Everything went as expected.
    Passed,

    /// An assertion did not hold. This is an *expected* kind of failure.
    Failed,

    /// An unexpected error occurred.
    Broken,
}

impl Status {
    /// Returns the string used for this status in result files.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unvalidated => "unvalidated",
            Status::Pending => "pending",
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Broken => "broken",
        }
    }

    /// Returns true if this status represents a failed or broken outcome.
    pub fn is_failing(self) -> bool {
        matches!(self, Status::Failed | Status::Broken)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The root element of an Allure 1 result file: a single test suite.
#[derive(Clone, Debug)]
pub struct TestSuite {
    /// The name of this suite.
    pub name: String,

    /// The time at which this suite started, in milliseconds since the epoch.
    pub start: i64,

    /// The time at which this suite ended, in milliseconds since the epoch.
    pub stop: Option<i64>,

    /// The test cases contained in this suite, in the order they were started.
    pub test_cases: Vec<TestCase>,

    /// Labels attached to the suite as a whole.
    pub labels: Vec<Label>,
}

impl TestSuite {
    /// Creates a new, empty `TestSuite`.
    pub fn new(name: impl Into<String>, start: i64) -> Self {
        Self {
            name: name.into(),
            start,
            stop: None,
            test_cases: vec![],
            labels: vec![],
        }
    }

    /// Returns true if this suite holds at least one test case.
    pub fn has_test_cases(&self) -> bool {
        !self.test_cases.is_empty()
    }

    /// Serialize this suite to the given writer.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_suite(self, writer)
    }

    /// Serialize this suite to a string.
    pub fn to_string(&self) -> Result<String, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        String::from_utf8(buf).map_err(SerializeError::from)
    }
}

/// Represents a single test case.
#[derive(Clone, Debug)]
pub struct TestCase {
    /// The name of the test case.
    pub name: String,

    /// The time at which this test case started, in milliseconds since the epoch.
    pub start: i64,

    /// The time at which this test case ended, in milliseconds since the epoch.
    pub stop: Option<i64>,

    /// The status of this test case. `None` while the test case is still running.
    pub status: Option<Status>,

    /// Failure details, if the test case did not pass.
    pub failure: Option<Failure>,

    /// A free-form description.
    pub description: Option<String>,

    /// The top-level steps of this test case.
    pub steps: Vec<Step>,

    /// Attachments recorded directly on the test case.
    pub attachments: Vec<Attachment>,

    /// Labels such as `feature`, `story` or `severity`. Labels may repeat.
    pub labels: Vec<Label>,

    /// Parameters such as arguments and environment variables.
    pub parameters: Vec<Parameter>,
}

impl TestCase {
    /// Creates a new, running test case.
    pub fn new(name: impl Into<String>, start: i64) -> Self {
        Self {
            name: name.into(),
            start,
            stop: None,
            status: None,
            failure: None,
            description: None,
            steps: vec![],
            attachments: vec![],
            labels: vec![],
            parameters: vec![],
        }
    }

    /// Sets the description.
    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a label.
    pub fn add_label(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.labels.push(Label::new(name, value));
        self
    }

    /// Adds a parameter.
    pub fn add_parameter(
        &mut self,
        kind: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.parameters.push(Parameter::new(kind, name, value));
        self
    }

    /// Returns the values of all labels with the given name, in insertion order.
    pub fn label_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.labels
            .iter()
            .filter(move |label| label.name == name)
            .map(|label| label.value.as_str())
    }

    /// Returns the value of the first parameter with the given kind and name.
    pub fn parameter(&self, kind: &str, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.kind == kind && p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// A step within a test case. Steps may nest.
#[derive(Clone, Debug)]
pub struct Step {
    /// The name of the step.
    pub name: String,

    /// The time at which this step started, in milliseconds since the epoch.
    pub start: i64,

    /// The time at which this step ended, in milliseconds since the epoch.
    pub stop: Option<i64>,

    /// The status of this step. `None` while the step is still open.
    pub status: Option<Status>,

    /// Nested steps.
    pub steps: Vec<Step>,

    /// Attachments recorded while this step was the innermost open step.
    pub attachments: Vec<Attachment>,
}

impl Step {
    /// Creates a new, open step.
    pub fn new(name: impl Into<String>, start: i64) -> Self {
        Self {
            name: name.into(),
            start,
            stop: None,
            status: None,
            steps: vec![],
            attachments: vec![],
        }
    }
}

/// The failure payload of a test case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure {
    /// The failure message.
    pub message: String,

    /// The stack trace.
    pub stack_trace: String,
}

impl Failure {
    /// Creates a new `Failure`.
    pub fn new(message: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }
}

/// A reference to an attachment file written next to the result file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attachment {
    /// The human-readable title.
    pub title: String,

    /// The file name of the attachment, relative to the results directory.
    pub source: String,

    /// The MIME type of the attachment.
    pub mime_type: String,
}

/// A label, e.g. `feature=Login`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Label {
    /// The label name.
    pub name: String,

    /// The label value.
    pub value: String,
}

impl Label {
    /// Creates a new `Label`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<T> From<(T, T)> for Label
where
    T: Into<String>,
{
    fn from((k, v): (T, T)) -> Self {
        Label::new(k, v)
    }
}

/// A parameter of a test case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Parameter {
    /// The kind of parameter, e.g. `argument` or `environment-variable`.
    pub kind: String,

    /// The parameter name.
    pub name: String,

    /// The parameter value.
    pub value: String,
}

impl Parameter {
    /// Creates a new `Parameter`.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}
