// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use allure_model::{Attachment, Failure, Status, Step, TestCase, TestSuite};

#[test]
fn basic_suite() {
    let xml = basic_suite_fixture()
        .to_string()
        .expect("serializing basic suite succeeds");

    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(xml.contains(
        r#"<ns2:test-suite xmlns:ns2="urn:model.allure.qatools.yandex.ru" start="1000" stop="9000">"#
    ));
    assert!(xml.contains("<name>checkout suite</name>"));
    assert!(xml.contains(r#"<test-case start="1100" stop="1900" status="passed">"#));
    assert!(xml.contains(r#"<test-case start="2000" stop="2500" status="broken">"#));
    assert!(xml.contains(r#"<description type="text">pays with a card</description>"#));
    assert!(xml.contains(r#"<label name="feature" value="Checkout"/>"#));
    assert!(xml.contains(r#"<label name="issue" value="BUG-42"/>"#));
    assert!(xml.contains(
        r#"<parameter name="browser" value="firefox" kind="environment-variable"/>"#
    ));
    assert!(xml.contains(r#"<step start="1200" stop="1300" status="passed">"#));
    assert!(xml.contains(
        r#"<attachment title="Step Arg" source="abc-attachment.json" type="application/json"/>"#
    ));
    assert!(xml.contains("<message>\nexpected 1 to equal 2\n</message>"));
    assert!(xml.ends_with("</ns2:test-suite>\n"));
}

#[test]
fn text_is_escaped() {
    let mut suite = TestSuite::new("a < b", 0);
    let mut test_case = TestCase::new(r#"says "hi" & leaves"#, 0);
    test_case.add_label("story", "<script>");
    suite.test_cases.push(test_case);

    let xml = suite.to_string().unwrap();
    assert!(xml.contains("<name>a &lt; b</name>"));
    assert!(xml.contains("<name>says &quot;hi&quot; &amp; leaves</name>"));
    assert!(xml.contains(r#"value="&lt;script&gt;""#));
}

fn basic_suite_fixture() -> TestSuite {
    let mut suite = TestSuite::new("checkout suite", 1000);
    suite.stop = Some(9000);

    let mut passed = TestCase::new("pays", 1100);
    passed.stop = Some(1900);
    passed.status = Some(Status::Passed);
    passed
        .set_description("pays with a card")
        .add_label("feature", "Checkout")
        .add_label("issue", "BUG-42")
        .add_parameter("environment-variable", "browser", "firefox");
    let mut step = Step::new("fill card", 1200);
    step.stop = Some(1300);
    step.status = Some(Status::Passed);
    step.attachments.push(Attachment {
        title: "Step Arg".to_owned(),
        source: "abc-attachment.json".to_owned(),
        mime_type: "application/json".to_owned(),
    });
    passed.steps.push(step);
    suite.test_cases.push(passed);

    let mut broken = TestCase::new("refunds", 2000);
    broken.stop = Some(2500);
    broken.status = Some(Status::Broken);
    broken.failure = Some(Failure::new(
        "\nexpected 1 to equal 2\n",
        "\nat refunds (checkout.js:10)",
    ));
    suite.test_cases.push(broken);

    suite
}
