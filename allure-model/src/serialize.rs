// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialize a `TestSuite` into the Allure 1 XML result format.

use crate::{
    Attachment, Failure, Label, Parameter, Step, TestCase, TestSuite, errors::SerializeError,
};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::io;

static ALLURE_NAMESPACE: &str = "urn:model.allure.qatools.yandex.ru";

static TEST_SUITE_TAG: &str = "ns2:test-suite";
static TEST_CASES_TAG: &str = "test-cases";
static TEST_CASE_TAG: &str = "test-case";
static STEPS_TAG: &str = "steps";
static STEP_TAG: &str = "step";
static NAME_TAG: &str = "name";
static TITLE_TAG: &str = "title";
static DESCRIPTION_TAG: &str = "description";
static FAILURE_TAG: &str = "failure";
static MESSAGE_TAG: &str = "message";
static STACK_TRACE_TAG: &str = "stack-trace";
static ATTACHMENTS_TAG: &str = "attachments";
static ATTACHMENT_TAG: &str = "attachment";
static LABELS_TAG: &str = "labels";
static LABEL_TAG: &str = "label";
static PARAMETERS_TAG: &str = "parameters";
static PARAMETER_TAG: &str = "parameter";

pub(crate) fn serialize_suite(
    suite: &TestSuite,
    writer: impl io::Write,
) -> Result<(), SerializeError> {
    let mut writer = Writer::new_with_indent(writer, b' ', 4);

    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;

    serialize_suite_impl(suite, &mut writer)?;

    // Add a trailing newline.
    writer.write_indent()?;
    Ok(())
}

fn serialize_suite_impl(
    suite: &TestSuite,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    // Use the destructuring syntax to ensure that all fields are handled.
    let TestSuite {
        name,
        start,
        stop,
        test_cases,
        labels,
    } = suite;

    let mut suite_tag = BytesStart::new(TEST_SUITE_TAG);
    suite_tag.push_attribute(("xmlns:ns2", ALLURE_NAMESPACE));
    suite_tag.push_attribute(("start", start.to_string().as_str()));
    if let Some(stop) = stop {
        suite_tag.push_attribute(("stop", stop.to_string().as_str()));
    }
    writer.write_event(Event::Start(suite_tag))?;

    serialize_text_element(NAME_TAG, name, writer)?;
    serialize_text_element(TITLE_TAG, name, writer)?;

    serialize_empty_start_tag(TEST_CASES_TAG, writer)?;
    for test_case in test_cases {
        serialize_test_case(test_case, writer)?;
    }
    serialize_end_tag(TEST_CASES_TAG, writer)?;

    serialize_labels(labels, writer)?;

    serialize_end_tag(TEST_SUITE_TAG, writer)
}

fn serialize_test_case(
    test_case: &TestCase,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    let TestCase {
        name,
        start,
        stop,
        status,
        failure,
        description,
        steps,
        attachments,
        labels,
        parameters,
    } = test_case;

    let mut test_case_tag = BytesStart::new(TEST_CASE_TAG);
    test_case_tag.push_attribute(("start", start.to_string().as_str()));
    if let Some(stop) = stop {
        test_case_tag.push_attribute(("stop", stop.to_string().as_str()));
    }
    if let Some(status) = status {
        test_case_tag.push_attribute(("status", status.as_str()));
    }
    writer.write_event(Event::Start(test_case_tag))?;

    serialize_text_element(NAME_TAG, name, writer)?;
    serialize_text_element(TITLE_TAG, name, writer)?;

    if let Some(description) = description {
        let mut tag = BytesStart::new(DESCRIPTION_TAG);
        tag.push_attribute(("type", "text"));
        writer.write_event(Event::Start(tag))?;
        writer.write_event(Event::Text(BytesText::new(description)))?;
        serialize_end_tag(DESCRIPTION_TAG, writer)?;
    }

    if let Some(failure) = failure {
        serialize_failure(failure, writer)?;
    }

    serialize_steps(steps, writer)?;
    serialize_attachments(attachments, writer)?;
    serialize_labels(labels, writer)?;
    serialize_parameters(parameters, writer)?;

    serialize_end_tag(TEST_CASE_TAG, writer)
}

fn serialize_failure(
    failure: &Failure,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    serialize_empty_start_tag(FAILURE_TAG, writer)?;
    serialize_text_element(MESSAGE_TAG, &failure.message, writer)?;
    serialize_text_element(STACK_TRACE_TAG, &failure.stack_trace, writer)?;
    serialize_end_tag(FAILURE_TAG, writer)
}

fn serialize_steps(steps: &[Step], writer: &mut Writer<impl io::Write>) -> quick_xml::Result<()> {
    serialize_empty_start_tag(STEPS_TAG, writer)?;
    for step in steps {
        serialize_step(step, writer)?;
    }
    serialize_end_tag(STEPS_TAG, writer)
}

fn serialize_step(step: &Step, writer: &mut Writer<impl io::Write>) -> quick_xml::Result<()> {
    let Step {
        name,
        start,
        stop,
        status,
        steps,
        attachments,
    } = step;

    let mut step_tag = BytesStart::new(STEP_TAG);
    step_tag.push_attribute(("start", start.to_string().as_str()));
    if let Some(stop) = stop {
        step_tag.push_attribute(("stop", stop.to_string().as_str()));
    }
    if let Some(status) = status {
        step_tag.push_attribute(("status", status.as_str()));
    }
    writer.write_event(Event::Start(step_tag))?;

    serialize_text_element(NAME_TAG, name, writer)?;
    serialize_text_element(TITLE_TAG, name, writer)?;
    serialize_attachments(attachments, writer)?;
    serialize_steps(steps, writer)?;

    serialize_end_tag(STEP_TAG, writer)
}

fn serialize_attachments(
    attachments: &[Attachment],
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    serialize_empty_start_tag(ATTACHMENTS_TAG, writer)?;
    for attachment in attachments {
        let mut tag = BytesStart::new(ATTACHMENT_TAG);
        tag.push_attribute(("title", attachment.title.as_str()));
        tag.push_attribute(("source", attachment.source.as_str()));
        tag.push_attribute(("type", attachment.mime_type.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    serialize_end_tag(ATTACHMENTS_TAG, writer)
}

fn serialize_labels(
    labels: &[Label],
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    serialize_empty_start_tag(LABELS_TAG, writer)?;
    for label in labels {
        let mut tag = BytesStart::new(LABEL_TAG);
        tag.push_attribute(("name", label.name.as_str()));
        tag.push_attribute(("value", label.value.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    serialize_end_tag(LABELS_TAG, writer)
}

fn serialize_parameters(
    parameters: &[Parameter],
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    serialize_empty_start_tag(PARAMETERS_TAG, writer)?;
    for parameter in parameters {
        let mut tag = BytesStart::new(PARAMETER_TAG);
        tag.push_attribute(("name", parameter.name.as_str()));
        tag.push_attribute(("value", parameter.value.as_str()));
        tag.push_attribute(("kind", parameter.kind.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    serialize_end_tag(PARAMETERS_TAG, writer)
}

fn serialize_text_element(
    tag_name: &'static str,
    text: &str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    serialize_empty_start_tag(tag_name, writer)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    serialize_end_tag(tag_name, writer)
}

fn serialize_empty_start_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag_name)))
}

fn serialize_end_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> quick_xml::Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag_name)))
}
