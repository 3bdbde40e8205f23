use crate::core::{DebugLevel, ModelError, Result};
use crate::job::JobRunner;
use crate::runtime::SolverRuntime;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable overriding the configured debug level.
pub const DEBUG_ENV_VAR: &str = "SCENARIODB_DEBUG";

pub const DEFAULT_SCRATCH_PREFIX: &str = "_scenario_";

/// Workspace configuration
///
/// Runtime and job runner default to the in-process backend when not set.
#[derive(Clone, Default)]
pub struct WorkspaceConfig {
    /// Working directory; a temporary directory is created when `None`
    pub working_directory: Option<PathBuf>,

    pub debug: DebugLevel,

    /// Prefix for generated object names
    pub scratch_prefix: Option<String>,

    pub runtime: Option<Arc<dyn SolverRuntime>>,

    pub job_runner: Option<Arc<dyn JobRunner>>,
}

impl WorkspaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn debug(mut self, level: DebugLevel) -> Self {
        self.debug = level;
        self
    }

    pub fn scratch_prefix(mut self, prefix: &str) -> Self {
        self.scratch_prefix = Some(prefix.to_string());
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn SolverRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn job_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.job_runner = Some(runner);
        self
    }

    /// Applies `SCENARIODB_DEBUG` when it is set to a known level.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(DEBUG_ENV_VAR) {
            match value.parse::<DebugLevel>() {
                Ok(level) => self.debug = level,
                Err(err) => log::warn!("Ignoring {}: {}", DEBUG_ENV_VAR, err),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(prefix) = &self.scratch_prefix
            && prefix.chars().any(char::is_whitespace)
        {
            return Err(ModelError::InvalidArgument(format!(
                "Scratch file prefix '{}' must not contain whitespace",
                prefix
            )));
        }
        if let Some(dir) = &self.working_directory
            && dir.as_os_str().is_empty()
        {
            return Err(ModelError::InvalidArgument(
                "Working directory must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn prefix(&self) -> &str {
        self.scratch_prefix.as_deref().unwrap_or(DEFAULT_SCRATCH_PREFIX)
    }
}

impl std::fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("working_directory", &self.working_directory)
            .field("debug", &self.debug)
            .field("scratch_prefix", &self.scratch_prefix)
            .field("custom_runtime", &self.runtime.is_some())
            .field("custom_job_runner", &self.job_runner.is_some())
            .finish()
    }
}
