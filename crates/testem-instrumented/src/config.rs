//! Run configuration
//!
//! [`RunConfig`] is what users write (YAML file, CLI overrides, or the
//! `with_*` builders). [`RunConfig::resolve`] turns it into a
//! [`ResolvedConfig`] with absolute paths before any hook runs.

use crate::error::{HarnessError, HarnessResult};
use crate::report::ReportMarkers;
use crate::tools::ToolCommand;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default port of the coverage collector
pub const DEFAULT_COVERAGE_PORT: u16 = 7358;

/// Configuration file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "testem-instrumented.yaml";

const ISTANBUL_CLI: &str = "./node_modules/istanbul/lib/cli.js";

/// User-facing run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Root that relative paths are resolved against
    pub module_root: PathBuf,
    /// Port the coverage collector listens on
    pub coverage_port: u16,
    /// Directory handed to the instrumenter
    pub source_dir: PathBuf,
    /// Directory receiving fragments and reports
    pub coverage_dir: PathBuf,
    /// Directory receiving instrumented sources
    pub instrumented_dir: PathBuf,
    /// Source file globs for the runner's `src_files`
    pub source_files: Vec<String>,
    /// Globs for the runner's `serve_files`
    pub serve_files: Vec<String>,
    /// Test pages for the runner's `test_page`
    pub test_pages: Vec<String>,
    /// Instrumenter; `{output}` and `{source}` are substituted
    pub instrument_command: ToolCommand,
    /// Report generator; `{coverage}` is substituted
    pub report_command: ToolCommand,
    /// Test runner; `{config}` is substituted
    pub runner_command: ToolCommand,
    /// Where the generated runner configuration is written
    pub runner_config_path: PathBuf,
    /// Markers checked after report generation
    pub markers: ReportMarkers,
    /// Allow cross-origin posts to the collector
    pub cors: bool,
    /// Kill external tools after this many seconds (unset waits forever)
    pub tool_timeout_secs: Option<u64>,
    /// How long the collector waits for in-flight uploads on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            module_root: PathBuf::from("."),
            coverage_port: DEFAULT_COVERAGE_PORT,
            source_dir: PathBuf::from("src"),
            coverage_dir: PathBuf::from("coverage"),
            instrumented_dir: PathBuf::from("instrumented"),
            source_files: vec!["src/js/*.js".to_string()],
            serve_files: vec!["src/js/*.js".to_string()],
            test_pages: Vec::new(),
            instrument_command: ToolCommand::new(
                "node",
                [ISTANBUL_CLI, "instrument", "--output", "{output}", "{source}"],
            ),
            report_command: ToolCommand::new("node", [ISTANBUL_CLI, "report"]),
            runner_command: ToolCommand::new("testem", ["ci", "--file", "{config}"]),
            runner_config_path: PathBuf::from("testem.instrumented.json"),
            markers: ReportMarkers::default(),
            cors: false,
            tool_timeout_secs: None,
            shutdown_grace_secs: 5,
        }
    }
}

impl RunConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> HarnessResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a YAML configuration file
    ///
    /// A relative `module_root` in the file is taken relative to the file's
    /// own directory.
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        if config.module_root.is_relative() {
            if let Some(parent) = path.parent() {
                config.module_root = parent.join(&config.module_root);
            }
        }
        Ok(config)
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] in `dir` if it
    /// exists, else defaults
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> HarnessResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    /// Set module root
    #[must_use]
    pub fn with_module_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.module_root = root.into();
        self
    }

    /// Set collector port
    #[must_use]
    pub const fn with_coverage_port(mut self, port: u16) -> Self {
        self.coverage_port = port;
        self
    }

    /// Set source directory
    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    /// Set coverage directory
    #[must_use]
    pub fn with_coverage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.coverage_dir = dir.into();
        self
    }

    /// Set instrumented-output directory
    #[must_use]
    pub fn with_instrumented_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.instrumented_dir = dir.into();
        self
    }

    /// Set source file globs
    #[must_use]
    pub fn with_source_files<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_files = globs.into_iter().map(Into::into).collect();
        self
    }

    /// Set serve file globs
    #[must_use]
    pub fn with_serve_files<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.serve_files = globs.into_iter().map(Into::into).collect();
        self
    }

    /// Set test pages
    #[must_use]
    pub fn with_test_pages<I, S>(mut self, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.test_pages = pages.into_iter().map(Into::into).collect();
        self
    }

    /// Set instrument command
    #[must_use]
    pub fn with_instrument_command(mut self, command: ToolCommand) -> Self {
        self.instrument_command = command;
        self
    }

    /// Set report command
    #[must_use]
    pub fn with_report_command(mut self, command: ToolCommand) -> Self {
        self.report_command = command;
        self
    }

    /// Set runner command
    #[must_use]
    pub fn with_runner_command(mut self, command: ToolCommand) -> Self {
        self.runner_command = command;
        self
    }

    /// Set report markers
    #[must_use]
    pub fn with_markers(mut self, markers: ReportMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Enable CORS on the collector
    #[must_use]
    pub const fn with_cors(mut self, cors: bool) -> Self {
        self.cors = cors;
        self
    }

    /// Set external tool timeout
    #[must_use]
    pub const fn with_tool_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    /// Set collector shutdown grace period
    #[must_use]
    pub const fn with_shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = secs;
        self
    }

    /// Resolve every path against the module root
    pub fn resolve(&self) -> HarnessResult<ResolvedConfig> {
        let module_root = if self.module_root.is_absolute() {
            self.module_root.clone()
        } else {
            std::env::current_dir()?.join(&self.module_root)
        };
        let module_root = without_cur_dir(&module_root);

        if !module_root.is_dir() {
            return Err(HarnessError::config(format!(
                "module root {} is not a directory",
                module_root.display()
            )));
        }
        for (name, command) in [
            ("instrument_command", &self.instrument_command),
            ("report_command", &self.report_command),
            ("runner_command", &self.runner_command),
        ] {
            if command.program.trim().is_empty() {
                return Err(HarnessError::config(format!("{name}.program must not be empty")));
            }
        }
        if self.source_files.is_empty() {
            return Err(HarnessError::config("source_files must list at least one glob"));
        }
        for pattern in self.source_files.iter().chain(&self.serve_files) {
            glob::Pattern::new(pattern).map_err(|e| {
                HarnessError::config(format!("invalid glob `{pattern}`: {e}"))
            })?;
        }

        let join = |p: &Path| without_cur_dir(&module_root.join(p));
        let join_patterns = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| join(Path::new(p)).to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };

        Ok(ResolvedConfig {
            coverage_port: self.coverage_port,
            source_dir: join(self.source_dir.as_path()),
            coverage_dir: join(self.coverage_dir.as_path()),
            instrumented_dir: join(self.instrumented_dir.as_path()),
            source_files: join_patterns(&self.source_files),
            serve_files: join_patterns(&self.serve_files),
            test_pages: join_patterns(&self.test_pages),
            instrument_command: self.instrument_command.clone(),
            report_command: self.report_command.clone(),
            runner_command: self.runner_command.clone(),
            runner_config_path: join(self.runner_config_path.as_path()),
            markers: self.markers.clone(),
            cors: self.cors,
            tool_timeout: self.tool_timeout_secs.map(Duration::from_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            module_root,
        })
    }
}

/// Drop `.` components so `<root>/./src` reads `<root>/src`
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Configuration with every path made absolute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Absolute module root; external tools run here
    pub module_root: PathBuf,
    /// Collector port
    pub coverage_port: u16,
    /// Absolute source directory
    pub source_dir: PathBuf,
    /// Absolute coverage directory
    pub coverage_dir: PathBuf,
    /// Absolute instrumented-output directory
    pub instrumented_dir: PathBuf,
    /// Absolute source globs
    pub source_files: Vec<String>,
    /// Absolute serve globs
    pub serve_files: Vec<String>,
    /// Absolute test page paths
    pub test_pages: Vec<String>,
    /// Instrumenter
    pub instrument_command: ToolCommand,
    /// Report generator
    pub report_command: ToolCommand,
    /// Test runner
    pub runner_command: ToolCommand,
    /// Absolute path of the generated runner configuration
    pub runner_config_path: PathBuf,
    /// Report markers
    pub markers: ReportMarkers,
    /// CORS on the collector
    pub cors: bool,
    /// External tool timeout
    pub tool_timeout: Option<Duration>,
    /// Collector shutdown grace period
    pub shutdown_grace: Duration,
}

impl ResolvedConfig {
    /// Directories cleaned by the start hook
    #[must_use]
    pub fn working_dirs(&self) -> [&Path; 2] {
        [&self.coverage_dir, &self.instrumented_dir]
    }

    /// Files currently matched by the source globs
    pub fn matched_source_files(&self) -> HarnessResult<Vec<PathBuf>> {
        let mut matched = Vec::new();
        for pattern in &self.source_files {
            let paths = glob::glob(pattern)
                .map_err(|e| HarnessError::config(format!("invalid glob `{pattern}`: {e}")))?;
            matched.extend(paths.filter_map(Result::ok));
        }
        matched.sort();
        matched.dedup();
        Ok(matched)
    }
}
