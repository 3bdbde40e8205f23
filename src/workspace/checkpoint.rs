use super::workspace::Workspace;
use crate::core::{ModelError, Result};
use crate::instance::ModelInstance;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CHECKPOINT_EXTENSION: &str = "ckpt";

/// Named, file-backed snapshot of a compiled program.
///
/// A default-constructed checkpoint is uninitialized and every accessor fails.
#[derive(Clone, Default)]
pub struct Checkpoint {
    inner: Option<Arc<CheckpointInner>>,
}

struct CheckpointInner {
    workspace: Workspace,
    name: String,
    file_name: PathBuf,
}

impl Checkpoint {
    pub(crate) fn new(workspace: Workspace, name: String) -> Self {
        let file_name = workspace
            .working_directory()
            .join(format!("{}.{}", name, CHECKPOINT_EXTENSION));
        Self {
            inner: Some(Arc::new(CheckpointInner {
                workspace,
                name,
                file_name,
            })),
        }
    }

    fn inner(&self) -> Result<&CheckpointInner> {
        self.inner
            .as_deref()
            .ok_or_else(|| ModelError::Uninitialized("Checkpoint".into()))
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    pub fn name(&self) -> Result<&str> {
        Ok(&self.inner()?.name)
    }

    pub fn file_name(&self) -> Result<&Path> {
        Ok(&self.inner()?.file_name)
    }

    pub fn workspace(&self) -> Result<&Workspace> {
        Ok(&self.inner()?.workspace)
    }

    /// Whether a job has written this checkpoint yet.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.file_name()?.is_file())
    }

    pub fn add_model_instance(&self, name: Option<&str>) -> Result<ModelInstance> {
        ModelInstance::new(self, name)
    }
}

impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => a.workspace.same_as(&b.workspace) && a.name == b.name,
            (None, None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Checkpoint")
                .field("name", &inner.name)
                .field("file_name", &inner.file_name)
                .finish(),
            None => write!(f, "Checkpoint(uninitialized)"),
        }
    }
}
