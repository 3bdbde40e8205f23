use crate::core::{Result, check_native};
use crate::runtime::{HandleId, LogState, LogTarget, SolverRuntime};
use std::io::Write;
use tracing::warn;

/// Where `solve` sends the solver log.
pub enum SolveOutput<'a> {
    /// Stream the log to stdout while the solver runs.
    Stdout,
    /// Copy the log into the writer after the solve.
    Writer(&'a mut dyn Write),
}

impl std::fmt::Debug for SolveOutput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveOutput::Stdout => write!(f, "Stdout"),
            SolveOutput::Writer(_) => write!(f, "Writer"),
        }
    }
}

/// Log target switched for a scope. Dropping the guard restores the previous
/// target; `finish` does the same and reports failures.
#[must_use]
pub struct LogRedirect<'a> {
    runtime: &'a dyn SolverRuntime,
    env: HandleId,
    saved: Option<LogState>,
    rewrite: bool,
}

impl<'a> LogRedirect<'a> {
    pub fn switch(runtime: &'a dyn SolverRuntime, env: HandleId, target: LogTarget) -> Result<Self> {
        let saved = check_native(runtime.switch_log(env, target))?;
        Ok(Self {
            runtime,
            env,
            saved: Some(saved),
            rewrite: false,
        })
    }

    /// Truncate a restored log file so it only holds output produced afterwards.
    pub fn rewrite_on_restore(mut self) -> Self {
        self.rewrite = true;
        self
    }

    pub fn finish(mut self) -> Result<()> {
        match self.saved.take() {
            Some(saved) => check_native(self.runtime.restore_log(self.env, saved, self.rewrite)),
            None => Ok(()),
        }
    }
}

impl Drop for LogRedirect<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take()
            && let Err(err) = self.runtime.restore_log(self.env, saved, self.rewrite)
        {
            warn!(env = %self.env, error = %err, "failed to restore solver log");
        }
    }
}
