// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the reporter.

use camino::Utf8PathBuf;
use config::ConfigError;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse workflo-allure config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the layered config.
    #[error("error building config")]
    BuildError(#[source] ConfigError),

    /// An error occurred while deserializing the config.
    #[error("error deserializing config")]
    DeserializeError(#[source] serde_path_to_error::Error<ConfigError>),
}

/// An error that occurred while handling a reporter event.
///
/// Only failures to touch the disk are reported this way. Malformed or out-of-order events are
/// logged and discarded instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while writing Allure output.
    #[error("error writing Allure output")]
    Allure(#[from] allure_model::WriteError),

    /// A JSON attachment could not be serialized.
    #[error("error serializing attachment `{title}`")]
    Json {
        /// The attachment title.
        title: String,

        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },
}

/// A malformed field in a `test:meta` event.
///
/// The field is skipped; other fields of the same event still apply.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("test:meta field `{field}` should be {expected}, found: {found}")]
pub struct MetaFieldError {
    field: &'static str,
    expected: &'static str,
    found: String,
}

impl MetaFieldError {
    pub(crate) fn new(field: &'static str, expected: &'static str, found: String) -> Self {
        Self {
            field,
            expected,
            found,
        }
    }

    /// Returns the name of the malformed field.
    pub fn field(&self) -> &'static str {
        self.field
    }
}

/// An error that occurred while patching aggregate results into report files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PatchError {
    /// The file naming the latest run could not be read.
    #[error("failed to read latest run pointer at {path}")]
    ReadLatestRun {
        /// The pointer file.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The file naming the latest run was empty.
    #[error("latest run pointer at {path} is empty")]
    EmptyLatestRun {
        /// The pointer file.
        path: Utf8PathBuf,
    },

    /// The aggregate results file could not be read.
    #[error("failed to read aggregate results at {path}")]
    ReadResults {
        /// The results file.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// The aggregate results file could not be parsed.
    #[error("failed to parse aggregate results at {path}")]
    ParseResults {
        /// The results file.
        path: Utf8PathBuf,

        /// The underlying deserialization error.
        #[source]
        error: serde_json::Error,
    },

    /// Walking the output directory failed.
    #[error("failed to walk output directory {dir}")]
    Walk {
        /// The output directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A report file could not be read.
    #[error("failed to read report file {path}")]
    Read {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// A report file could not be rewritten.
    #[error("failed to rewrite report file {path}")]
    Write {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}
