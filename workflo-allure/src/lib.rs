// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line front end for `workflo-reporter`.
//!
//! Reads newline-delimited reporter events from files or standard input, writes one Allure
//! result file per worker suite, and optionally patches aggregate run results into them.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod ingest;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
