// Copyright (c) The workflo-allure Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for the reporter.

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;

/// Overall configuration for the reporter.
///
/// Built from the embedded default config, with a repository config file layered on top. Command
/// line flags are applied afterwards through the `set_*` methods.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReporterConfig {
    output_dir: Utf8PathBuf,
    debug: bool,
    debug_selenium_command: bool,
    #[serde(default)]
    base_url: Option<String>,
    bug: BugTemplate,
    #[serde(default)]
    results: ResultsConfig,
}

impl ReporterConfig {
    /// The default location of the config within a directory: `.config/workflo-allure.toml`.
    pub const CONFIG_PATH: &'static str = ".config/workflo-allure.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or if not specified from
    /// `.config/workflo-allure.toml` under `root`.
    ///
    /// An explicitly specified file must exist. The implicit file is optional: if it is missing,
    /// the default config is used.
    pub fn from_sources(
        root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))
    }

    /// Reads the config from a TOML string layered over the defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigParseError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(contents, FileFormat::Toml));
        Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new("<inline>", kind))
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        config
            .try_deserialize()
            .expect("default config is always valid")
    }

    /// The directory result files are written to.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Whether every routed event is traced.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether WebDriver commands are recorded as steps.
    pub fn debug_selenium_command(&self) -> bool {
        self.debug_selenium_command
    }

    /// The base URL of the system under test, if configured.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// The template applied to `bug` metadata values.
    pub fn bug(&self) -> &BugTemplate {
        &self.bug
    }

    /// Where aggregate results are read from by the patch pass.
    pub fn results(&self) -> &ResultsConfig {
        &self.results
    }

    /// Overrides the output directory.
    pub fn set_output_dir(&mut self, output_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Overrides debug tracing.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Overrides WebDriver command recording.
    pub fn set_debug_selenium_command(&mut self, debug_selenium_command: bool) -> &mut Self {
        self.debug_selenium_command = debug_selenium_command;
        self
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(ConfigParseErrorKind::BuildError)?;

        serde_path_to_error::deserialize(config).map_err(ConfigParseErrorKind::DeserializeError)
    }
}

/// Turns a bug id into an issue label value: `<prefix><id><appendix>`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct BugTemplate {
    prefix: String,
    appendix: String,
}

impl BugTemplate {
    /// Creates a new template.
    pub fn new(prefix: impl Into<String>, appendix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            appendix: appendix.into(),
        }
    }

    /// Applies the template to a bug id.
    pub fn apply(&self, bug: &str) -> String {
        format!("{}{}{}", self.prefix, bug, self.appendix)
    }
}

/// Location of the aggregate results consumed by the patch pass.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ResultsConfig {
    #[serde(default)]
    results_path: Option<Utf8PathBuf>,
    #[serde(default)]
    latest_run_path: Option<Utf8PathBuf>,
}

impl ResultsConfig {
    /// Creates a results config pointing at the given paths.
    pub fn new(
        results_path: impl Into<Utf8PathBuf>,
        latest_run_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            results_path: Some(results_path.into()),
            latest_run_path: Some(latest_run_path.into()),
        }
    }

    /// Returns `(results_path, latest_run_path)` if both are configured.
    pub fn paths(&self) -> Option<(&Utf8Path, &Utf8Path)> {
        match (&self.results_path, &self.latest_run_path) {
            (Some(results_path), Some(latest_run_path)) => {
                Some((results_path.as_path(), latest_run_path.as_path()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let config = ReporterConfig::default_config();
        assert_eq!(config.output_dir(), Utf8Path::new("allure-results"));
        assert!(!config.debug());
        assert!(!config.debug_selenium_command());
        assert_eq!(config.base_url(), None);
        assert_eq!(config.bug().apply("42"), "42");
        assert_eq!(config.results().paths(), None);
    }

    #[test]
    fn repository_config_is_layered_over_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(ReporterConfig::CONFIG_PATH);
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(
            &config_path,
            indoc! {r#"
                output-dir = "out/allure"
                base-url = "https://shop.test"

                [bug]
                prefix = "BUG-"
                appendix = "-X"

                [results]
                results-path = "results"
                latest-run-path = "results/latest"
            "#},
        )
        .unwrap();

        let config = ReporterConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.output_dir(), Utf8Path::new("out/allure"));
        assert!(!config.debug(), "unset keys keep their defaults");
        assert_eq!(config.base_url(), Some("https://shop.test"));
        assert_eq!(config.bug().apply("42"), "BUG-42-X");
        assert_eq!(
            config.results().paths(),
            Some((Utf8Path::new("results"), Utf8Path::new("results/latest")))
        );
    }

    #[test]
    fn missing_implicit_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = ReporterConfig::from_sources(dir.path(), None).unwrap();
        assert_eq!(config.output_dir(), Utf8Path::new("allure-results"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let error = ReporterConfig::from_sources(dir.path(), Some(&missing)).unwrap_err();
        assert_eq!(error.config_file(), &missing);
        assert!(matches!(error.kind(), ConfigParseErrorKind::BuildError(_)));
    }

    #[test]
    fn invalid_value_reports_path() {
        let error = ReporterConfig::from_toml_str("debug = \"sometimes\"").unwrap_err();
        match error.kind() {
            ConfigParseErrorKind::DeserializeError(error) => {
                assert_eq!(error.path().to_string(), "debug");
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
