// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Builds Allure reports from the lifecycle events of parallel, spec-validating test runs.
//!
//! Events from every worker go through one [`EventRouter`](router::EventRouter), which keeps a
//! separate [`ReportSession`](session::ReportSession) per worker. Failures raised while test
//! cases run are indexed by the spec criteria they violate, so that steps verifying those criteria
//! later on report them too. Once the run is over, the
//! [`ResultPatcher`](patcher::ResultPatcher) fills aggregate counts into the written reports.

pub mod config;
pub mod correlator;
pub mod errors;
pub mod events;
pub mod patcher;
pub mod router;
pub mod session;
pub mod status;
