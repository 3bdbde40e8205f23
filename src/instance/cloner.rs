use super::model_instance::{InstanceCore, LOG_FILE_NAME, ModelInstance, solver_opt_file};
use super::modifier::Modifier;
use super::state::InstanceState;
use crate::core::{ModelError, Result, check_native};
use crate::runtime::NativeHandles;
use crate::workspace::Workspace;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info_span, warn};

/// Copies an instantiated [`ModelInstance`] into an independent one.
pub struct InstanceCloner;

impl InstanceCloner {
    /// The copy gets its own name, scratch directory, store and native
    /// handles. Modifiers whose symbols cannot be found in the copied store are
    /// dropped with a warning. A failed copy removes its scratch directory.
    pub fn copy(source: &ModelInstance, name: Option<&str>) -> Result<ModelInstance> {
        let src = source.core()?;
        src.state.require(InstanceState::Instantiated, "copy")?;

        let workspace = src.workspace.clone();
        let name = workspace.register_model_instance(name)?;
        let span = info_span!("instance.copy", source = %src.name, copy = %name);
        let _enter = span.enter();

        let scr_dir = workspace.working_directory().join(&name);
        if scr_dir.exists() {
            debug!(dir = %scr_dir.display(), "removing stale scratch directory");
            remove_scratch(&workspace, &scr_dir)?;
        }

        Self::build(src, workspace.clone(), name, scr_dir.clone()).inspect_err(|err| {
            warn!(error = %err, "model instance copy failed");
            if let Err(cleanup) = remove_scratch(&workspace, &scr_dir) {
                warn!(dir = %scr_dir.display(), error = %cleanup, "scratch directory left behind");
            }
        })
    }

    fn build(
        src: &InstanceCore,
        workspace: Workspace,
        name: String,
        scr_dir: PathBuf,
    ) -> Result<ModelInstance> {
        let mut store = workspace.add_database_from(&src.store, None)?;
        let modifiers: Vec<Modifier> = src
            .modifiers
            .iter()
            .filter_map(|modifier| match modifier.rebind(&store) {
                Ok(rebound) => Some(rebound),
                Err(err) => {
                    warn!(modifier = %modifier, error = %err, "dropping modifier from copy");
                    None
                }
            })
            .collect();

        let runtime = src.runtime.clone();
        let handles = check_native(NativeHandles::create(&runtime))?;
        let control = check_native(runtime.duplicate_scratch(
            src.handles.env(),
            &scr_dir,
            &scr_dir.join(LOG_FILE_NAME),
        ))?;
        check_native(runtime.init_environment(handles.env(), &control))?;
        check_native(runtime.load_model(handles.model(), handles.env()))?;
        let dictionary = check_native(runtime.init_dictionary(handles.model(), &mut store.native()))?;

        let source_opt = check_native(runtime.opt_file_name(src.handles.model()))?;
        check_native(
            runtime.set_opt_file_name(handles.model(), &solver_opt_file(&source_opt, &src.selected_solver)),
        )?;
        store.lock_symbols();

        debug!(modifiers = modifiers.len(), "model instance copied");
        Ok(ModelInstance::from_core(InstanceCore {
            workspace,
            checkpoint: src.checkpoint.clone(),
            name,
            scr_dir,
            store,
            modifiers,
            state: InstanceState::Instantiated,
            selected_solver: src.selected_solver.clone(),
            log_available: src.log_available,
            dictionary,
            runtime,
            handles,
        }))
    }
}

/// Removes a scratch directory, refusing anything that is not a direct child of
/// the working directory.
fn remove_scratch(workspace: &Workspace, dir: &Path) -> Result<()> {
    if dir.parent() != Some(workspace.working_directory()) {
        return Err(ModelError::InvalidArgument(format!(
            "Refusing to remove '{}': not a scratch directory of '{}'",
            dir.display(),
            workspace.working_directory().display()
        )));
    }
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}
