// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correlates failures with the spec criteria they violate.
//!
//! While test cases run, every failure that names spec criteria through `specObj` is recorded in
//! a [`SpecFailureIndex`]. Later, while specs are validated, a step that verifies a
//! `(spec, criteria)` pair looks the pair up and reports every failure recorded against it, even
//! though those failures were raised by a different test, possibly on a different worker.

use crate::events::{CriteriaRef, ErrorDetail, TestEvent};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

/// A failed assertion or unexpected error, as recorded against a test, step or spec criteria.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// The failure message.
    pub message: String,

    /// The stack trace.
    pub stack: String,

    /// The assertion matcher. Absent for unexpected errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher_name: Option<String>,

    /// The expected value of a failed assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,

    /// The actual value of a failed assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,

    /// The test that produced this failure, as `"<suite>: <title>"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl FailureRecord {
    /// Records an error raised by the runner.
    pub fn from_error(error: &ErrorDetail, origin: Option<String>) -> Self {
        Self {
            message: error.message().to_owned(),
            stack: error.stack().to_owned(),
            matcher_name: error.matcher_name.clone(),
            expected: error.expected.clone(),
            actual: error.actual.clone(),
            origin,
        }
    }
}

/// The `{origin, message, stack}` triple attached for every correlated failure.
#[derive(Clone, Debug, Serialize)]
pub struct VerificationFailure<'a> {
    /// The test that produced the failure.
    pub origin: &'a str,

    /// The failure message.
    pub message: &'a str,

    /// The stack trace.
    pub stack: &'a str,
}

impl<'a> From<&'a FailureRecord> for VerificationFailure<'a> {
    fn from(record: &'a FailureRecord) -> Self {
        Self {
            origin: record.origin.as_deref().unwrap_or_default(),
            message: &record.message,
            stack: &record.stack,
        }
    }
}

/// Failures indexed by spec id, then by criteria id.
///
/// Shared by every worker session and kept for the lifetime of the process.
#[derive(Clone, Debug, Default)]
pub struct SpecFailureIndex {
    specs: IndexMap<String, IndexMap<String, Vec<FailureRecord>>>,
}

impl SpecFailureIndex {
    /// Creates a new, empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every error of a failed test under each `(spec, criteria)` pair it names.
    ///
    /// Returns the number of entries added.
    pub fn register_test(&mut self, test: &TestEvent) -> usize {
        let origin = failure_origin(test.parent.as_deref(), &test.title);
        test.errors()
            .iter()
            .map(|error| self.register(error, &origin))
            .sum()
    }

    /// Records an error under each `(spec, criteria)` pair named by its `specObj`.
    ///
    /// Entries that name no criteria are logged and skipped. Returns the number of entries added.
    pub fn register(&mut self, error: &ErrorDetail, origin: &str) -> usize {
        let mut added = 0;
        for (spec_id, value) in &error.spec_obj {
            let Some(criteria) = CriteriaRef::from_value(value) else {
                error!(spec = %spec_id, %origin, "specObj entry {value} names no criteria, skipping it");
                continue;
            };
            let by_criteria = self.specs.entry(spec_id.clone()).or_default();
            for criteria_id in criteria.to_vec() {
                by_criteria
                    .entry(criteria_id.as_str().to_owned())
                    .or_default()
                    .push(FailureRecord::from_error(error, Some(origin.to_owned())));
                added += 1;
            }
        }
        added
    }

    /// Returns the failures recorded against a criteria, in the order they were recorded.
    pub fn lookup(&self, spec_id: &str, criteria_id: &str) -> &[FailureRecord] {
        self.specs
            .get(spec_id)
            .and_then(|by_criteria| by_criteria.get(criteria_id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns true if no failure has been recorded.
    pub fn is_empty(&self) -> bool {
        self.specs.values().all(|by_criteria| by_criteria.is_empty())
    }
}

/// Returns the origin of a failure raised by a test: `"<suite>: <title>"`.
///
/// The suite name is the parent title up to its last occurrence of `suite`, so a parent titled
/// `"Cart suite"` yields `"Cart"`. A parent without `suite` in it is used as a whole.
pub fn failure_origin(parent: Option<&str>, title: &str) -> String {
    let parent = parent.unwrap_or_default();
    let suite = match parent.rfind("suite") {
        Some(index) => &parent[..index],
        None => parent,
    };
    format!("{}: {}", suite.trim_end(), title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn error_for(spec_obj: IndexMap<String, Value>) -> ErrorDetail {
        ErrorDetail {
            message: Some("expected 1 to equal 2".to_owned()),
            stack: Some("at cart.ts:12".to_owned()),
            matcher_name: Some("toEqual".to_owned()),
            spec_obj,
            ..ErrorDetail::default()
        }
    }

    #[test]
    fn failure_is_registered_for_every_criteria() {
        let mut index = SpecFailureIndex::new();
        let error = error_for([("S1".to_owned(), json!(["C1", "C2"]))].into_iter().collect());

        assert_eq!(index.register(&error, "Cart: adds"), 2);

        let expected = hashmap! {
            "C1" => 1,
            "C2" => 1,
            "C3" => 0,
        };
        for (criteria_id, count) in expected {
            assert_eq!(
                index.lookup("S1", criteria_id).len(),
                count,
                "failures for S1/{criteria_id}"
            );
        }
        assert_eq!(
            index.lookup("S1", "C1")[0].origin.as_deref(),
            Some("Cart: adds")
        );
        assert!(index.lookup("S2", "C1").is_empty());
    }

    #[test]
    fn single_criteria_is_normalized() {
        let mut index = SpecFailureIndex::new();
        let error = error_for([("7".to_owned(), json!(3))].into_iter().collect());
        index.register(&error, "origin");
        index.register(&error, "origin");

        let records = index.lookup("7", "3");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "expected 1 to equal 2");
        assert_eq!(records[0].matcher_name.as_deref(), Some("toEqual"));
    }

    #[test]
    fn error_without_spec_obj_registers_nothing() {
        let mut index = SpecFailureIndex::new();
        assert_eq!(index.register(&error_for(IndexMap::new()), "origin"), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn entries_without_criteria_are_skipped() {
        let mut index = SpecFailureIndex::new();
        let error = error_for(
            [
                ("S1".to_owned(), json!({"nested": 1})),
                ("S2".to_owned(), json!(1.5)),
                ("S3".to_owned(), json!(null)),
                ("S4".to_owned(), json!(["C1", {"nested": 1}])),
            ]
            .into_iter()
            .collect(),
        );

        assert_eq!(index.register(&error, "origin"), 1);
        assert_eq!(index.lookup("S4", "C1").len(), 1);
        assert!(index.lookup("S1", "nested").is_empty());
    }

    #[test_case(Some("Cart suite"), "Cart: adds item"; "suffix")]
    #[test_case(Some("Checkout suite for guests suite"), "Checkout suite for guests: adds item"; "last occurrence")]
    #[test_case(Some("Login"), "Login: adds item"; "no suite in parent")]
    #[test_case(None, ": adds item"; "no parent")]
    fn origin_from_parent(parent: Option<&str>, expected: &str) {
        assert_eq!(failure_origin(parent, "adds item"), expected);
    }

    #[test]
    fn verification_failure_projection() {
        let record = FailureRecord::from_error(
            &error_for(IndexMap::new()),
            Some("Cart: adds".to_owned()),
        );
        let json = serde_json::to_value(VerificationFailure::from(&record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "origin": "Cart: adds",
                "message": "expected 1 to equal 2",
                "stack": "at cart.ts:12",
            })
        );
    }
}
