use super::{JobOutcome, JobRequest, JobRunner};
use crate::core::{ExitCode, ModelError, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Runs jobs through an external compiler executable.
///
/// The executable receives the source file followed by `key=value` arguments
/// for the listing, restart and save files and for every option.
#[derive(Debug, Clone)]
pub struct ProcessJobRunner {
    executable: PathBuf,
    extra_args: Vec<String>,
}

impl ProcessJobRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn command(&self, request: &JobRequest) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.current_dir(&request.working_dir)
            .arg(&request.source_file)
            .arg(format!("o={}", request.listing.display()));
        if let Some(restart) = &request.restart {
            cmd.arg(format!("r={}", restart.display()));
        }
        if let Some(save) = &request.save {
            cmd.arg(format!("s={}", save.display()));
        }
        cmd.args(request.options.to_args()).args(&self.extra_args);
        cmd
    }
}

impl JobRunner for ProcessJobRunner {
    fn run(&self, request: &JobRequest) -> Result<JobOutcome> {
        let mut cmd = self.command(request);
        debug!(job = %request.name, command = ?cmd, "spawning job process");
        let status = cmd.status().map_err(|e| {
            ModelError::Io(format!(
                "Could not start {}: {}",
                self.executable.display(),
                e
            ))
        })?;
        // Killed by a signal: no code to report.
        let exit_code = status.code().unwrap_or(ExitCode::SystemError.code());
        Ok(JobOutcome { exit_code })
    }
}
