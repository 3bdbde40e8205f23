//! Native solver-runtime collaborator.
//!
//! The engine drives an environment handle and a model handle through this
//! handle-based interface. [`memory::InMemoryRuntime`] is the in-process backend.

pub mod memory;
pub mod program;
pub mod solver;

use crate::core::{NativeResult, SymbolKind, UpdateAction, UpdateType};
use crate::storage::{NativeStore, SyncStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Opaque id of a native environment or model object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Where an environment sends its solver log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Silent,
    Stdout,
    File(PathBuf),
}

impl LogTarget {
    /// Log option number as understood by jobs (0 silent, 2 file, 3 stdout).
    pub fn from_option(option: i32, file: Option<&Path>) -> Self {
        match (option, file) {
            (3, _) => LogTarget::Stdout,
            (2 | 4, Some(path)) => LogTarget::File(path.to_path_buf()),
            _ => LogTarget::Silent,
        }
    }
}

/// Log configuration saved by `switch_log`, handed back to `restore_log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogState {
    pub previous: LogTarget,
}

/// Model-side view of one symbol the scenario dictionary maps to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub dim: usize,
}

/// Mapping between sync store symbols and model symbols, built at instantiation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioDictionary {
    entries: BTreeMap<String, NativeSymbol>,
}

impl ScenarioDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, store_symbol: impl Into<String>, native: NativeSymbol) {
        self.entries.insert(store_symbol.into(), native);
    }

    pub fn lookup(&self, store_symbol: &str) -> Option<&NativeSymbol> {
        self.entries.get(store_symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NativeSymbol)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Handle-based native runtime.
///
/// Every fallible call returns the runtime's own error code and message; the
/// engine attaches its call site when converting them.
pub trait SolverRuntime: Send + Sync {
    fn version(&self) -> NativeResult<RuntimeVersion>;

    fn create_environment(&self) -> NativeResult<HandleId>;
    fn free_environment(&self, env: HandleId);
    fn create_model(&self) -> NativeResult<HandleId>;
    fn free_model(&self, model: HandleId);

    /// Reads the control file a job left in a scratch directory.
    fn init_environment(&self, env: HandleId, control_file: &Path) -> NativeResult<()>;
    /// Attaches `model` to `env` and loads the model the control file describes.
    fn load_model(&self, model: HandleId, env: HandleId) -> NativeResult<()>;
    fn model_type(&self, model: HandleId) -> NativeResult<String>;
    fn default_solver(&self, model_type: &str) -> NativeResult<String>;

    fn opt_file(&self, model: HandleId) -> NativeResult<i32>;
    fn set_opt_file(&self, model: HandleId, opt_file: i32) -> NativeResult<()>;
    fn opt_file_name(&self, model: HandleId) -> NativeResult<PathBuf>;
    fn set_opt_file_name(&self, model: HandleId, name: &Path) -> NativeResult<()>;

    /// Binds `model` to `store`, publishes model variables and equations into
    /// it and returns the dictionary of every mapped symbol.
    fn init_dictionary(
        &self,
        model: HandleId,
        store: &mut NativeStore<'_>,
    ) -> NativeResult<ScenarioDictionary>;

    fn begin_update(&self, model: HandleId) -> NativeResult<()>;

    /// Pushes `data_symbol`'s records into `target`. Returns the number of data
    /// records whose keys have no counterpart in the model.
    fn update_model_symbol(
        &self,
        model: HandleId,
        store: &SyncStore,
        target: &NativeSymbol,
        action: UpdateAction,
        data_symbol: &str,
        update_type: UpdateType,
    ) -> NativeResult<usize>;

    /// Runs `solver` on the model and writes the solution into `store`.
    fn call_solver(
        &self,
        model: HandleId,
        store: &mut NativeStore<'_>,
        solver: &str,
    ) -> NativeResult<()>;

    fn model_status(&self, model: HandleId) -> NativeResult<i32>;
    fn solve_status(&self, model: HandleId) -> NativeResult<i32>;

    /// Copies the scratch state of `env` into `scr_dir` and returns the new control file.
    fn duplicate_scratch(&self, env: HandleId, scr_dir: &Path, log_file: &Path)
    -> NativeResult<PathBuf>;

    fn switch_log(&self, env: HandleId, target: LogTarget) -> NativeResult<LogState>;
    /// Restores a saved log target; `rewrite` truncates a restored log file.
    fn restore_log(&self, env: HandleId, state: LogState, rewrite: bool) -> NativeResult<()>;
    fn log_file(&self, env: HandleId) -> NativeResult<Option<PathBuf>>;

    /// Asks a running solve in `env` to stop. Best effort.
    fn interrupt(&self, env: HandleId) -> NativeResult<()>;
}

// ============================================================================
// Owned handles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Environment,
    Model,
}

/// Native handle released through the runtime when dropped.
pub struct NativeHandle {
    runtime: Arc<dyn SolverRuntime>,
    id: HandleId,
    kind: HandleKind,
}

impl NativeHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        match self.kind {
            HandleKind::Environment => self.runtime.free_environment(self.id),
            HandleKind::Model => self.runtime.free_model(self.id),
        }
    }
}

/// Environment and model handle created together and freed together.
pub struct NativeHandles {
    // Declared first so the model is freed before its environment.
    model: NativeHandle,
    env: NativeHandle,
}

impl NativeHandles {
    /// Creates both handles; a half-built pair is released before returning the error.
    pub fn create(runtime: &Arc<dyn SolverRuntime>) -> NativeResult<Self> {
        let env = NativeHandle {
            runtime: Arc::clone(runtime),
            id: runtime.create_environment()?,
            kind: HandleKind::Environment,
        };
        let model_id = match runtime.create_model() {
            Ok(id) => id,
            Err(err) => {
                warn!(env = %env.id, "model handle creation failed, releasing environment");
                return Err(err);
            }
        };
        let model = NativeHandle {
            runtime: Arc::clone(runtime),
            id: model_id,
            kind: HandleKind::Model,
        };
        Ok(Self { model, env })
    }

    pub fn env(&self) -> HandleId {
        self.env.id
    }

    pub fn model(&self) -> HandleId {
        self.model.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::memory::InMemoryRuntime;

    #[test]
    fn test_handles_are_released_on_drop() {
        let memory = Arc::new(InMemoryRuntime::new());
        let runtime: Arc<dyn SolverRuntime> = memory.clone();
        {
            let handles = NativeHandles::create(&runtime).unwrap();
            assert_ne!(handles.env(), handles.model());
            assert_eq!(memory.live_handles(), 2);
        }
        assert_eq!(memory.live_handles(), 0);
    }

    #[test]
    fn test_log_target_from_option() {
        let file = PathBuf::from("/tmp/solve.log");
        assert_eq!(LogTarget::from_option(3, None), LogTarget::Stdout);
        assert_eq!(
            LogTarget::from_option(2, Some(&file)),
            LogTarget::File(file.clone())
        );
        assert_eq!(LogTarget::from_option(2, None), LogTarget::Silent);
        assert_eq!(LogTarget::from_option(0, Some(&file)), LogTarget::Silent);
    }
}
