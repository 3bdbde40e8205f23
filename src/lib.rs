// ============================================================================
// ScenarioDB Library
// ============================================================================

pub mod core;
pub mod storage;
pub mod workspace;
pub mod job;
pub mod runtime;
pub mod instance;

// Re-export main types for convenience
pub use core::{
    DebugLevel, ModelError, ModelStatus, Result, SolveStatus, SymbolKind, UpdateAction,
    UpdateType,
};
pub use storage::{SymbolRef, SyncStore};
pub use workspace::{Checkpoint, Options, Workspace, WorkspaceConfig};

// Re-export the instance API
pub use instance::{
    InstanceCloner,
    InstanceState,
    InterruptHandle,
    ModelInstance,
    Modifier,
    SolveOptions,
    SolveOutput,
};

// Re-export the in-process backend
pub use runtime::{
    SolverRuntime,
    memory::{InMemoryJobRunner, InMemoryRuntime},
    program::ModelProgram,
    solver::{SolveContext, Solver, SolverModel},
};
