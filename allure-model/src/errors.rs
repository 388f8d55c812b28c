// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use std::string::FromUtf8Error;
use thiserror::Error;

/// An error that occurs while serializing a [`TestSuite`](crate::TestSuite).
///
/// Returned by [`TestSuite::serialize`](crate::TestSuite::serialize) and
/// [`TestSuite::to_string`](crate::TestSuite::to_string).
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The XML writer failed.
    #[error("error serializing Allure test suite")]
    Xml(#[from] quick_xml::Error),

    /// The serialized output was not valid UTF-8.
    #[error("serialized Allure test suite is not valid UTF-8")]
    Utf8(#[from] FromUtf8Error),
}

/// An error that occurs while writing a result or attachment file to the results directory.
#[derive(Debug, Error)]
pub enum WriteError {
    /// An I/O error occurred on the given path.
    #[error("error writing Allure output to {path}")]
    Fs {
        /// The path being written.
        path: Utf8PathBuf,

        /// The underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// Serializing a test suite failed.
    #[error("error serializing Allure test suite to {path}")]
    Serialize {
        /// The result file that was being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: SerializeError,
    },
}
