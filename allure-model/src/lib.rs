// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build and write Allure 1 XML result files in Rust.
//!
//! The data model lives in [`TestSuite`] and friends. [`Allure`] builds that model
//! incrementally from start/end calls and writes each suite out as soon as it ends.

mod errors;
mod report;
mod runtime;
mod serialize;

pub use errors::*;
pub use report::*;
pub use runtime::Allure;
