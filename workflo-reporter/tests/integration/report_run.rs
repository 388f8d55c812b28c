// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::{RunFixture, TWO_WORKER_RUN};
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use workflo_reporter::patcher::{JsonResultsSource, ResultPatcher, RunResults};

#[test]
fn two_workers_write_correlated_reports() -> Result<()> {
    let mut fixture = RunFixture::new(indoc! {r#"
        [bug]
        prefix = "BUG-"
    "#})?;
    fixture.feed(TWO_WORKER_RUN)?;

    ensure!(
        fixture.router.unfinished_workers().next().is_none(),
        "every suite was closed"
    );
    let suites = fixture.written_suites()?;
    assert_eq!(suites.len(), 2, "one result file per worker suite");

    let cart = suites
        .iter()
        .find(|xml| xml.contains("<name>Cart suite</name>"))
        .expect("test case suite written");
    assert!(!cart.contains("before all"), "empty hook is dropped");
    assert!(cart.contains(r#"status="failed""#));
    assert!(cart.contains("<message>\nexpected 1 to equal 2\n</message>"));
    assert!(cart.contains(r#"<label name="feature" value="Cart"/>"#));
    assert!(cart.contains(r#"<label name="issue" value="BUG-42"/>"#));
    assert!(cart.contains(r#"<label name="bug" value="BUG-42"/>"#));
    assert!(cart.contains(
        r#"<parameter name="capabilities" value="{&quot;browserName&quot;:&quot;firefox&quot;}" kind="environment-variable"/>"#
    ));

    let spec = suites
        .iter()
        .find(|xml| xml.contains("<name>Cart spec</name>"))
        .expect("spec suite written");
    assert!(spec.contains(r#"<test-case start="#));
    assert_eq!(spec.matches(r#"status="failed""#).count(), 2, "test and criteria 1");
    assert_eq!(spec.matches(r#"status="passed""#).count(), 1, "criteria 3");
    assert!(spec.contains(r#"<attachment title="Verification Failures""#));

    Ok(())
}

#[test]
fn patch_pass_fills_in_aggregate_results() -> Result<()> {
    let mut fixture = RunFixture::new("")?;
    fixture.feed(TWO_WORKER_RUN)?;

    let results_dir = fixture.temp_dir.path().join("results");
    std::fs::create_dir_all(&results_dir)?;
    let latest = results_dir.join("latest-run");
    std::fs::write(&latest, "run-7\n")?;
    std::fs::write(
        results_dir.join("run-7.json"),
        r#"{"testcases": {"passing": 1, "failing": 1}, "specs": {"failing": 1}}"#,
    )?;

    let patcher = ResultPatcher::new(fixture.output_dir());
    let summary = patcher.run(&JsonResultsSource::new(&results_dir, &latest))?;
    assert_eq!(summary.patched.len(), 2);

    let suites = fixture.written_suites()?;
    let all = suites.concat();
    ensure!(!all.contains("%%"), "no placeholder left behind");
    assert!(all.contains("<description type=\"text\">1 passing (~50%), 1 failing (~50%)</description>"));
    assert!(all.contains("<description type=\"text\">0 passing (~0%), 1 failing (~100%)</description>"));

    // A second pass finds nothing left to patch.
    let summary = patcher.run(&RunResults::default())?;
    assert!(summary.patched.is_empty());
    assert!(summary.scanned >= 2);

    Ok(())
}
