//! One-shot compile/solve jobs and the collaborators that execute them.

pub mod process;

pub use process::ProcessJobRunner;

use crate::core::{ModelError, Result};
use crate::workspace::{Checkpoint, Options, Workspace};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, event, info_span};

pub const SOURCE_EXTENSION: &str = "src";
pub const LISTING_EXTENSION: &str = "lst";

/// Everything a runner needs to execute one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub name: String,
    pub source_file: PathBuf,
    pub working_dir: PathBuf,
    /// Checkpoint the job resumes from.
    pub restart: Option<PathBuf>,
    /// Where the job saves its final state. The caller moves it into place.
    pub save: Option<PathBuf>,
    pub listing: PathBuf,
    pub options: Options,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    pub exit_code: i32,
}

impl JobOutcome {
    pub fn success() -> Self {
        Self { exit_code: 0 }
    }

    pub fn failure(exit_code: i32) -> Self {
        Self { exit_code }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes compile/solve jobs.
pub trait JobRunner: Send + Sync {
    fn run(&self, request: &JobRequest) -> Result<JobOutcome>;
}

/// Source text written to the working directory, optionally resuming a checkpoint.
#[derive(Debug, Clone)]
pub struct Job {
    workspace: Workspace,
    name: String,
    source_file: PathBuf,
    restart: Option<Checkpoint>,
}

impl Job {
    pub(crate) fn create(
        workspace: Workspace,
        name: String,
        source: &str,
        restart: Option<Checkpoint>,
    ) -> Result<Self> {
        if let Some(cp) = &restart
            && !cp.workspace()?.same_as(&workspace)
        {
            return Err(ModelError::InvalidArgument(format!(
                "Checkpoint {} belongs to a different workspace",
                cp.name()?
            )));
        }
        let source_file = workspace
            .working_directory()
            .join(format!("{}.{}", name, SOURCE_EXTENSION));
        fs::write(&source_file, source)?;
        Ok(Self {
            workspace,
            name,
            source_file,
            restart,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn listing_file(&self) -> PathBuf {
        self.workspace
            .working_directory()
            .join(format!("{}.{}", self.name, LISTING_EXTENSION))
    }

    /// Runs the job; on success a requested `save` checkpoint is replaced by rename.
    pub fn run(&self, options: Option<&Options>, save: Option<&Checkpoint>) -> Result<()> {
        let span = info_span!("job.run", job = %self.name);
        let _enter = span.enter();

        let restart = match &self.restart {
            Some(cp) => Some(cp.file_name()?.to_path_buf()),
            None => None,
        };
        let save_target = match save {
            Some(cp) => Some(cp.file_name()?.to_path_buf()),
            None => None,
        };
        let save_temp = save_target.as_ref().map(|p| p.with_extension("tmp"));

        let request = JobRequest {
            name: self.name.clone(),
            source_file: self.source_file.clone(),
            working_dir: self.workspace.working_directory().to_path_buf(),
            restart,
            save: save_temp.clone(),
            listing: self.listing_file(),
            options: options.cloned().unwrap_or_default(),
        };

        let outcome = self.workspace.job_runner().run(&request)?;
        if !outcome.is_success() {
            if let Some(temp) = &save_temp {
                let _ = fs::remove_file(temp);
            }
            event!(Level::ERROR, code = outcome.exit_code, "job failed");
            return Err(ModelError::ExternalProcess {
                job: self.name.clone(),
                code: outcome.exit_code,
                listing: request.listing.is_file().then_some(request.listing),
            });
        }

        if let (Some(temp), Some(target)) = (save_temp, save_target) {
            fs::rename(&temp, &target).map_err(|e| {
                ModelError::Io(format!(
                    "Failed to move saved state to {}: {}",
                    target.display(),
                    e
                ))
            })?;
            event!(Level::DEBUG, checkpoint = %target.display(), "checkpoint saved");
        }
        Ok(())
    }
}
