// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted by the test runner.
//!
//! Events arrive as JSON objects tagged by an `"event"` field. Every event names the worker that
//! produced it through a required `cid` field.

use crate::errors::MetaFieldError;
use allure_model::Status;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;

/// Identifier of the parallel worker that produced an event.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Creates a new worker id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event emitted by the test runner.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "event")]
pub enum ReporterEvent {
    /// A suite started.
    #[serde(rename = "suite:start")]
    SuiteStart(SuiteEvent),

    /// A suite ended.
    #[serde(rename = "suite:end")]
    SuiteEnd(SuiteEvent),

    /// A test started.
    #[serde(rename = "test:start")]
    TestStart(TestEvent),

    /// A test passed.
    #[serde(rename = "test:pass")]
    TestPass(TestEvent),

    /// A test failed. Whether it failed or broke depends on the error detail.
    #[serde(rename = "test:fail")]
    TestFail(TestEvent),

    /// A test hit an unexpected error.
    #[serde(rename = "test:broken")]
    TestBroken(TestEvent),

    /// A test was skipped.
    #[serde(rename = "test:pending")]
    TestPending(TestEvent),

    /// A test ran without validating anything.
    #[serde(rename = "test:unvalidated")]
    TestUnvalidated(TestEvent),

    /// Metadata for the running test.
    #[serde(rename = "test:meta")]
    TestMeta(MetaEvent),

    /// A file to attach to the running test.
    #[serde(rename = "test:attach")]
    TestAttach(AttachEvent),

    /// A JSON log entry to attach to the running test.
    #[serde(rename = "test:log")]
    TestLog(LogEvent),

    /// A step started.
    #[serde(rename = "step:start")]
    StepStart(StepEvent),

    /// A step ended.
    #[serde(rename = "step:end")]
    StepEnd(StepEvent),

    /// The innermost step passed.
    #[serde(rename = "step:pass")]
    StepPass(StepEvent),

    /// An assertion within the innermost step failed.
    #[serde(rename = "step:fail", alias = "step:failed")]
    StepFail(StepEvent),

    /// The innermost step hit an unexpected error.
    #[serde(rename = "step:broken")]
    StepBroken(StepEvent),

    /// The innermost step validated nothing.
    #[serde(rename = "step:unvalidated")]
    StepUnvalidated(StepEvent),

    /// The worker moved on from running test cases to validating specs.
    #[serde(rename = "step:triggerSpecMode")]
    TriggerSpecMode(WorkerEvent),

    /// A verification block started.
    #[serde(rename = "step:verifyStart")]
    VerifyStart(VerifyContainerEvent),

    /// A verification block ended.
    #[serde(rename = "step:verifyEnd")]
    VerifyEnd(WorkerEvent),

    /// A WebDriver command was issued.
    #[serde(rename = "runner:command")]
    Command(CommandEvent),

    /// A WebDriver command returned.
    #[serde(rename = "runner:result")]
    CommandResult(CommandResultEvent),

    /// The runner took a screenshot.
    #[serde(rename = "runner:screenshot")]
    Screenshot(ScreenshotEvent),

    /// A hook started.
    #[serde(rename = "hook:start")]
    HookStart(HookEvent),

    /// A hook ended.
    #[serde(rename = "hook:end")]
    HookEnd(HookEvent),
}

impl ReporterEvent {
    /// Parses an event from a line of JSON.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Returns the worker that produced this event.
    pub fn worker_id(&self) -> &WorkerId {
        match self {
            Self::SuiteStart(e) | Self::SuiteEnd(e) => &e.cid,
            Self::TestStart(e)
            | Self::TestPass(e)
            | Self::TestFail(e)
            | Self::TestBroken(e)
            | Self::TestPending(e)
            | Self::TestUnvalidated(e) => &e.cid,
            Self::TestMeta(e) => &e.cid,
            Self::TestAttach(e) => &e.cid,
            Self::TestLog(e) => &e.cid,
            Self::StepStart(e)
            | Self::StepEnd(e)
            | Self::StepPass(e)
            | Self::StepFail(e)
            | Self::StepBroken(e)
            | Self::StepUnvalidated(e) => &e.cid,
            Self::TriggerSpecMode(e) | Self::VerifyEnd(e) => &e.cid,
            Self::VerifyStart(e) => &e.cid,
            Self::Command(e) => &e.cid,
            Self::CommandResult(e) => &e.cid,
            Self::Screenshot(e) => &e.cid,
            Self::HookStart(e) | Self::HookEnd(e) => &e.cid,
        }
    }

    /// Returns the wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SuiteStart(_) => "suite:start",
            Self::SuiteEnd(_) => "suite:end",
            Self::TestStart(_) => "test:start",
            Self::TestPass(_) => "test:pass",
            Self::TestFail(_) => "test:fail",
            Self::TestBroken(_) => "test:broken",
            Self::TestPending(_) => "test:pending",
            Self::TestUnvalidated(_) => "test:unvalidated",
            Self::TestMeta(_) => "test:meta",
            Self::TestAttach(_) => "test:attach",
            Self::TestLog(_) => "test:log",
            Self::StepStart(_) => "step:start",
            Self::StepEnd(_) => "step:end",
            Self::StepPass(_) => "step:pass",
            Self::StepFail(_) => "step:fail",
            Self::StepBroken(_) => "step:broken",
            Self::StepUnvalidated(_) => "step:unvalidated",
            Self::TriggerSpecMode(_) => "step:triggerSpecMode",
            Self::VerifyStart(_) => "step:verifyStart",
            Self::VerifyEnd(_) => "step:verifyEnd",
            Self::Command(_) => "runner:command",
            Self::CommandResult(_) => "runner:result",
            Self::Screenshot(_) => "runner:screenshot",
            Self::HookStart(_) => "hook:start",
            Self::HookEnd(_) => "hook:end",
        }
    }
}

/// An event carrying nothing but the worker id.
#[derive(Clone, Debug, Deserialize)]
pub struct WorkerEvent {
    /// The worker id.
    pub cid: WorkerId,
}

/// `suite:start` / `suite:end`.
#[derive(Clone, Debug, Deserialize)]
pub struct SuiteEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The suite title.
    pub title: String,
}

/// `test:*` lifecycle events.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The test title.
    pub title: String,

    /// The full title of the owning suite.
    #[serde(default)]
    pub parent: Option<String>,

    /// Capabilities of each worker's browser session, keyed by worker id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub runner: IndexMap<String, Value>,

    /// The spec files the worker is running.
    #[serde(default)]
    pub specs: Option<Value>,

    /// The error that ended the test.
    #[serde(default, deserialize_with = "ok_or_none")]
    pub err: Option<ErrorDetail>,

    /// Every error raised by the test, when there was more than one.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errs: Vec<ErrorDetail>,
}

impl TestEvent {
    /// Returns the errors this test raised: `errs` if present, otherwise `err`.
    pub fn errors(&self) -> &[ErrorDetail] {
        if self.errs.is_empty() {
            self.err.as_slice()
        } else {
            &self.errs
        }
    }
}

/// Details of an assertion failure or unexpected error.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// The error message.
    #[serde(default, deserialize_with = "scalar_or_none")]
    pub message: Option<String>,

    /// The stack trace.
    #[serde(default, deserialize_with = "scalar_or_none")]
    pub stack: Option<String>,

    /// The assertion matcher that failed. Absent for unexpected errors.
    #[serde(default, deserialize_with = "scalar_or_none")]
    pub matcher_name: Option<String>,

    /// The expected value of a failed assertion.
    #[serde(default)]
    pub expected: Option<Value>,

    /// The actual value of a failed assertion.
    #[serde(default)]
    pub actual: Option<Value>,

    /// The spec criteria this failure violates, keyed by spec id.
    ///
    /// Values are kept as sent; [`CriteriaRef::from_value`] reads the criteria out of each one.
    /// Anything other than an object is treated as empty.
    #[serde(default, deserialize_with = "object_or_empty")]
    pub spec_obj: IndexMap<String, Value>,
}

impl ErrorDetail {
    /// Returns the message, or an empty string.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    /// Returns the stack trace, or an empty string.
    pub fn stack(&self) -> &str {
        self.stack.as_deref().unwrap_or_default()
    }

    /// Returns true if this is an assertion failure rather than an unexpected error.
    pub fn is_assertion(&self) -> bool {
        self.matcher_name
            .as_deref()
            .is_some_and(|matcher_name| !matcher_name.is_empty())
    }

    /// Returns the status this error implies: `Failed` for assertions, `Broken` otherwise.
    pub fn status(&self) -> Status {
        if self.is_assertion() {
            Status::Failed
        } else {
            Status::Broken
        }
    }
}

/// An identifier given either as a string or as an integer.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
#[serde(from = "RawId")]
pub struct LooseId(String);

impl LooseId {
    /// Creates a new id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reads an id from a JSON string or integer.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
}

impl From<RawId> for LooseId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => Self(s),
            RawId::Int(i) => Self(i.to_string()),
        }
    }
}

/// One or several criteria of a spec.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CriteriaRef {
    /// A single criteria id.
    One(LooseId),

    /// Several criteria ids.
    Many(Vec<LooseId>),
}

impl CriteriaRef {
    /// Reads the criteria named by one `specObj` entry: an id or an array of ids.
    ///
    /// Array items that are not ids are left out. Returns `None` for any other value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::Many(
                items.iter().filter_map(LooseId::from_value).collect(),
            )),
            other => LooseId::from_value(other).map(Self::One),
        }
    }

    /// Normalizes this reference to a sequence of ids.
    pub fn to_vec(&self) -> Vec<LooseId> {
        match self {
            Self::One(id) => vec![id.clone()],
            Self::Many(ids) => ids.clone(),
        }
    }
}

/// The explicit status a step event may carry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// See [`Status::Passed`].
    Passed,
    /// See [`Status::Failed`].
    Failed,
    /// See [`Status::Broken`].
    Broken,
    /// See [`Status::Pending`].
    Pending,
    /// See [`Status::Unvalidated`].
    Unvalidated,
}

impl From<EventStatus> for Status {
    fn from(status: EventStatus) -> Self {
        match status {
            EventStatus::Passed => Status::Passed,
            EventStatus::Failed => Status::Failed,
            EventStatus::Broken => Status::Broken,
            EventStatus::Pending => Status::Pending,
            EventStatus::Unvalidated => Status::Unvalidated,
        }
    }
}

/// `step:*` events.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The step title.
    #[serde(default)]
    pub title: Option<String>,

    /// The step argument (on start) or result (on end).
    #[serde(default)]
    pub arg: Option<Value>,

    /// An explicit status overriding the accumulated one at `step:end`.
    #[serde(default)]
    pub status: Option<EventStatus>,

    /// The spec criteria this step verifies.
    #[serde(default, deserialize_with = "ok_or_none")]
    pub verify: Option<VerifyRef>,

    /// The kind of step, e.g. `verifyEnd`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Failure detail carried by `step:fail` and friends.
    #[serde(default)]
    pub assertion: Option<ErrorDetail>,
}

/// A `(spec, criteria)` pair verified by a step.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRef {
    /// The spec (story) id.
    pub story_id: LooseId,

    /// The criteria id within the spec.
    pub criteria_id: LooseId,
}

/// `step:verifyStart`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContainerEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The container of spec criteria about to be verified.
    #[serde(default)]
    pub verify_container: Option<Value>,
}

/// `test:meta`, with every field kept as raw JSON until [`TestMeta::from_event`] validates it.
#[derive(Clone, Debug, Deserialize)]
pub struct MetaEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// A description for the running test.
    #[serde(default)]
    pub description: Option<Value>,

    /// One or more `feature` labels.
    #[serde(default)]
    pub feature: Option<Value>,

    /// One or more `story` labels.
    #[serde(default)]
    pub story: Option<Value>,

    /// One or more `issue` labels.
    #[serde(default)]
    pub issue: Option<Value>,

    /// One or more bug ids.
    #[serde(default)]
    pub bug: Option<Value>,

    /// The severity label.
    #[serde(default)]
    pub severity: Option<Value>,

    /// Test arguments, as a map of name to value.
    #[serde(default)]
    pub argument: Option<Value>,

    /// Environment variables, as a map of name to value.
    #[serde(default)]
    pub environment: Option<Value>,
}

/// A label given as a single value or as a sequence of values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LabelValue {
    /// A single value.
    Single(String),

    /// Several values.
    Multiple(Vec<String>),
}

impl LabelValue {
    /// Parses a label value from JSON. Strings and numbers are accepted, alone or in an array.
    pub fn from_json(field: &'static str, value: &Value) -> Result<Self, MetaFieldError> {
        let malformed =
            || MetaFieldError::new(field, "a string or an array of strings", value.to_string());
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(malformed))
                .collect::<Result<_, _>>()
                .map(Self::Multiple),
            other => scalar_to_string(other).map(Self::Single).ok_or_else(malformed),
        }
    }

    /// Normalizes this value to a sequence.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Multiple(values) => values,
        }
    }
}

/// Validated `test:meta` content.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestMeta {
    /// The description.
    pub description: Option<String>,

    /// `feature` labels.
    pub features: Vec<String>,

    /// `story` labels.
    pub stories: Vec<String>,

    /// `issue` labels.
    pub issues: Vec<String>,

    /// Raw bug ids, before templating.
    pub bugs: Vec<String>,

    /// The `severity` label.
    pub severity: Option<String>,

    /// `argument` parameters.
    pub arguments: Vec<(String, String)>,

    /// `environment-variable` parameters.
    pub environment: Vec<(String, String)>,
}

impl TestMeta {
    /// Validates a `test:meta` event.
    ///
    /// Malformed fields are skipped and reported alongside the fields that did validate.
    pub fn from_event(event: &MetaEvent) -> (Self, Vec<MetaFieldError>) {
        let mut meta = Self::default();
        let mut errors = vec![];

        if let Some(description) = &event.description {
            match description {
                Value::String(description) => meta.description = Some(description.clone()),
                other => errors.push(MetaFieldError::new(
                    "description",
                    "a string",
                    other.to_string(),
                )),
            }
        }

        for (field, value, target) in [
            ("feature", &event.feature, &mut meta.features),
            ("story", &event.story, &mut meta.stories),
            ("issue", &event.issue, &mut meta.issues),
            ("bug", &event.bug, &mut meta.bugs),
        ] {
            if let Some(value) = value {
                match LabelValue::from_json(field, value) {
                    Ok(label) => target.extend(label.into_vec()),
                    Err(error) => errors.push(error),
                }
            }
        }

        if let Some(severity) = &event.severity {
            match severity {
                Value::String(severity) => meta.severity = Some(severity.clone()),
                other => {
                    errors.push(MetaFieldError::new("severity", "a string", other.to_string()))
                }
            }
        }

        for (field, value, target) in [
            ("argument", &event.argument, &mut meta.arguments),
            ("environment", &event.environment, &mut meta.environment),
        ] {
            if let Some(value) = value {
                match value {
                    Value::Object(map) => target.extend(
                        map.iter()
                            .map(|(key, value)| (key.clone(), value_to_string(value))),
                    ),
                    other => errors.push(MetaFieldError::new(
                        field,
                        "an object { name1: value1, name2: value2 }",
                        other.to_string(),
                    )),
                }
            }
        }

        (meta, errors)
    }
}

/// `test:attach`.
#[derive(Clone, Debug, Deserialize)]
pub struct AttachEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The attachment title.
    pub title: String,

    /// The file to read the attachment from.
    pub file: Utf8PathBuf,

    /// The MIME type of the attachment.
    #[serde(default, rename = "type")]
    pub mime_type: Option<String>,
}

/// `test:log`.
#[derive(Clone, Debug, Deserialize)]
pub struct LogEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The log message, used as the attachment title.
    pub message: String,

    /// Structured detail, serialized as the attachment body.
    #[serde(default)]
    pub detail: Option<Value>,
}

/// `runner:screenshot`.
#[derive(Clone, Debug, Deserialize)]
pub struct ScreenshotEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The screenshot file name.
    pub filename: String,

    /// The base64-encoded image.
    pub data: String,
}

/// `hook:start` / `hook:end`.
#[derive(Clone, Debug, Deserialize)]
pub struct HookEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The hook title, e.g. `"before all" hook`.
    pub title: String,
}

/// The URI of a WebDriver request.
#[derive(Clone, Debug, Deserialize)]
pub struct RequestUri {
    /// The request path.
    pub path: String,
}

/// `runner:command`.
#[derive(Clone, Debug, Deserialize)]
pub struct CommandEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The HTTP method.
    pub method: String,

    /// The request URI.
    pub uri: RequestUri,

    /// The request body.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Options of the request a `runner:result` answers.
#[derive(Clone, Debug, Deserialize)]
pub struct RequestOptions {
    /// The request URI.
    pub uri: RequestUri,
}

/// `runner:result`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultEvent {
    /// The worker id.
    pub cid: WorkerId,

    /// The options of the originating request.
    pub request_options: RequestOptions,

    /// The response body.
    #[serde(default)]
    pub body: Value,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn ok_or_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|value| T::deserialize(value).ok()))
}

fn scalar_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(scalar_to_string))
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<IndexMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => Ok(map.into_iter().collect()),
        _ => Ok(IndexMap::new()),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
