use super::checkpoint::Checkpoint;
use super::config::WorkspaceConfig;
use super::registry::NameRegistry;
use crate::core::{DebugLevel, Result};
use crate::job::{Job, JobRunner};
use crate::runtime::SolverRuntime;
use crate::runtime::memory::{InMemoryJobRunner, InMemoryRuntime};
use crate::storage::SyncStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// Shared entry point owning the working directory, the name registries and the
/// runtime collaborators. Cloning is cheap and clones refer to the same workspace.
#[derive(Clone)]
pub struct Workspace {
    inner: Arc<WorkspaceInner>,
}

struct WorkspaceInner {
    working_dir: PathBuf,
    // Removes the directory on drop when the workspace created it.
    _temp_dir: Option<TempDir>,
    debug: DebugLevel,
    prefix: String,
    checkpoints: NameRegistry,
    instances: NameRegistry,
    databases: NameRegistry,
    jobs: NameRegistry,
    runtime: Arc<dyn SolverRuntime>,
    job_runner: Arc<dyn JobRunner>,
}

impl Workspace {
    pub fn new(config: WorkspaceConfig) -> Result<Self> {
        let config = config.with_env_overrides();
        config.validate()?;
        let prefix = config.prefix().to_string();

        let (working_dir, temp_dir) = match &config.working_directory {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (fs::canonicalize(dir)?, None)
            }
            None => {
                let dir = tempfile::Builder::new().prefix(&prefix).tempdir()?;
                if config.debug >= DebugLevel::KeepFiles {
                    (dir.keep(), None)
                } else {
                    (dir.path().to_path_buf(), Some(dir))
                }
            }
        };

        let runtime = config
            .runtime
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryRuntime::new()));
        let job_runner = config
            .job_runner
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryJobRunner::new()));

        info!(
            working_dir = %working_dir.display(),
            debug = ?config.debug,
            "workspace created"
        );

        Ok(Self {
            inner: Arc::new(WorkspaceInner {
                checkpoints: NameRegistry::new("Checkpoint", format!("{}cp", prefix)),
                instances: NameRegistry::new("ModelInstance", format!("{}mi", prefix)),
                databases: NameRegistry::new("Database", format!("{}db", prefix)),
                jobs: NameRegistry::new("Job", format!("{}job", prefix)),
                working_dir,
                _temp_dir: temp_dir,
                debug: config.debug,
                prefix,
                runtime,
                job_runner,
            }),
        })
    }

    /// Workspace in a fresh temporary directory with the in-process backend.
    pub fn with_defaults() -> Result<Self> {
        Self::new(WorkspaceConfig::new())
    }

    pub fn working_directory(&self) -> &Path {
        &self.inner.working_dir
    }

    pub fn debug(&self) -> DebugLevel {
        self.inner.debug
    }

    pub fn scratch_prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn runtime(&self) -> Arc<dyn SolverRuntime> {
        Arc::clone(&self.inner.runtime)
    }

    pub fn job_runner(&self) -> Arc<dyn JobRunner> {
        Arc::clone(&self.inner.job_runner)
    }

    /// Registers a checkpoint name; the file appears once a job saves into it.
    pub fn add_checkpoint(&self, name: Option<&str>) -> Result<Checkpoint> {
        let name = self.inner.checkpoints.claim(name)?;
        debug!(checkpoint = %name, "checkpoint registered");
        Ok(Checkpoint::new(self.clone(), name))
    }

    pub fn add_database(&self, name: Option<&str>) -> Result<SyncStore> {
        let name = self.inner.databases.claim(name)?;
        Ok(SyncStore::new(name))
    }

    /// New database holding a copy of `source`'s symbols and records.
    pub fn add_database_from(&self, source: &SyncStore, name: Option<&str>) -> Result<SyncStore> {
        let name = self.inner.databases.claim(name)?;
        Ok(source.duplicate(name))
    }

    /// Writes `source` into the working directory as a new job.
    pub fn add_job_from_string(
        &self,
        source: &str,
        restart: Option<&Checkpoint>,
        name: Option<&str>,
    ) -> Result<Job> {
        let name = self.inner.jobs.claim(name)?;
        Job::create(self.clone(), name, source, restart.cloned())
    }

    pub(crate) fn register_model_instance(&self, name: Option<&str>) -> Result<String> {
        self.inner.instances.claim(name)
    }

    pub fn opt_file_extension(&self, opt_file: i32) -> String {
        opt_file_extension(opt_file)
    }

    pub fn same_as(&self, other: &Workspace) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Workspace {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("working_dir", &self.inner.working_dir)
            .field("debug", &self.inner.debug)
            .finish()
    }
}

/// File extension of solver option file number `opt_file`.
pub fn opt_file_extension(opt_file: i32) -> String {
    if opt_file < 2 {
        "opt".to_string()
    } else if opt_file < 10 {
        format!("op{}", opt_file)
    } else if opt_file < 100 {
        format!("o{}", opt_file)
    } else {
        opt_file.to_string()
    }
}
