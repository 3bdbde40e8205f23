use super::cloner::InstanceCloner;
use super::log::{LogRedirect, SolveOutput};
use super::modifier::Modifier;
use super::options::SolveOptions;
use super::scenario::ScenarioUnit;
use super::state::InstanceState;
use crate::core::{
    ModelError, ModelStatus, Result, SolveStatus, UpdateType, check_native, DebugLevel,
};
use crate::runtime::{HandleId, LogTarget, NativeHandles, ScenarioDictionary, SolverRuntime};
use crate::storage::SyncStore;
use crate::workspace::options::{LOG_FILE, LOG_OPTION, SCR_DIR, SOLVER_CNTR};
use crate::workspace::{Checkpoint, Options, Workspace, opt_file_extension};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, debug, event, info_span};

pub(super) const LOG_FILE_NAME: &str = "solver.log";
pub(super) const CONTROL_FILE_NAME: &str = "solvercntr.dat";
const MIN_RUNTIME_MAJOR: u32 = 1;
const DUMP_SOLVER: &str = "convert";
const NO_LOG: &str = "No solver log available";

/// A compiled model kept alive between solves.
///
/// Created from a [`Checkpoint`], instantiated once with a model definition and
/// a list of [`Modifier`]s, then solved repeatedly. Data flows in and results
/// flow out through the instance's [`SyncStore`].
#[derive(Default)]
pub struct ModelInstance {
    core: Option<InstanceCore>,
}

pub(super) struct InstanceCore {
    pub(super) workspace: Workspace,
    pub(super) checkpoint: Checkpoint,
    pub(super) name: String,
    pub(super) scr_dir: PathBuf,
    pub(super) store: SyncStore,
    pub(super) modifiers: Vec<Modifier>,
    pub(super) state: InstanceState,
    pub(super) selected_solver: String,
    pub(super) log_available: bool,
    pub(super) dictionary: ScenarioDictionary,
    pub(super) runtime: Arc<dyn SolverRuntime>,
    pub(super) handles: NativeHandles,
}

/// Sends an interrupt to a running solve from another thread.
#[derive(Clone)]
pub struct InterruptHandle {
    runtime: Arc<dyn SolverRuntime>,
    env: HandleId,
}

impl InterruptHandle {
    pub fn interrupt(&self) -> Result<()> {
        check_native(self.runtime.interrupt(self.env))
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle").field("env", &self.env).finish()
    }
}

/// `<dir>/<solver>.<ext>`, keeping the directory and extension of `current`.
pub(super) fn solver_opt_file(current: &Path, solver: &str) -> PathBuf {
    let ext = current
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("opt");
    current
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{}.{}", solver, ext))
}

impl ModelInstance {
    pub(crate) fn new(checkpoint: &Checkpoint, name: Option<&str>) -> Result<Self> {
        let workspace = checkpoint.workspace()?.clone();
        let name = workspace.register_model_instance(name)?;
        let scr_dir = workspace.working_directory().join(&name);
        let mut store = workspace.add_database(None)?;
        store.lock_records();

        let runtime = workspace.runtime();
        let handles = check_native(NativeHandles::create(&runtime))?;
        debug!(instance = %name, env = %handles.env(), model = %handles.model(), "model instance created");

        Ok(Self::from_core(InstanceCore {
            workspace,
            checkpoint: checkpoint.clone(),
            name,
            scr_dir,
            store,
            modifiers: Vec::new(),
            state: InstanceState::Created,
            selected_solver: String::new(),
            log_available: false,
            dictionary: ScenarioDictionary::new(),
            runtime,
            handles,
        }))
    }

    pub(super) fn from_core(core: InstanceCore) -> Self {
        Self { core: Some(core) }
    }

    pub(super) fn core(&self) -> Result<&InstanceCore> {
        self.core
            .as_ref()
            .ok_or_else(|| ModelError::Uninitialized("ModelInstance".into()))
    }

    fn core_mut(&mut self) -> Result<&mut InstanceCore> {
        self.core
            .as_mut()
            .ok_or_else(|| ModelError::Uninitialized("ModelInstance".into()))
    }

    pub fn is_initialized(&self) -> bool {
        self.core.is_some()
    }

    pub fn name(&self) -> Result<&str> {
        Ok(&self.core()?.name)
    }

    pub fn state(&self) -> Result<InstanceState> {
        Ok(self.core()?.state)
    }

    pub fn checkpoint(&self) -> Result<&Checkpoint> {
        Ok(&self.core()?.checkpoint)
    }

    /// The store modifiers read from and results are written to.
    pub fn sync_store(&self) -> Result<&SyncStore> {
        Ok(&self.core()?.store)
    }

    pub fn sync_store_mut(&mut self) -> Result<&mut SyncStore> {
        Ok(&mut self.core_mut()?.store)
    }

    pub fn modifiers(&self) -> Result<&[Modifier]> {
        Ok(&self.core()?.modifiers)
    }

    pub fn scratch_dir(&self) -> Result<&Path> {
        Ok(&self.core()?.scr_dir)
    }

    /// Solver picked at instantiation; empty before.
    pub fn selected_solver(&self) -> Result<&str> {
        Ok(&self.core()?.selected_solver)
    }

    pub fn log_available(&self) -> Result<bool> {
        Ok(self.core()?.log_available)
    }

    // ========================================================================
    // Instantiation
    // ========================================================================

    /// Compiles `model_definition` (e.g. `transport use lp min z`) against the
    /// checkpoint and loads the result. The store must not hold any labels yet.
    pub fn instantiate(
        &mut self,
        model_definition: &str,
        options: Option<&Options>,
        modifiers: &[Modifier],
    ) -> Result<()> {
        let core = self.core_mut()?;
        core.state.require(InstanceState::Created, "instantiate")?;

        let span = info_span!("instance.instantiate", instance = %core.name);
        let _enter = span.enter();

        if core.store.unique_label_count() > 0 {
            return Err(ModelError::StateViolation(format!(
                "Sync store of {} holds labels, no records may be added before instantiate",
                core.name
            )));
        }
        for modifier in modifiers {
            if modifier.symbol().store() != core.store.id() {
                return Err(ModelError::StateViolation(format!(
                    "Symbol {} is not part of the sync store of {}",
                    modifier.symbol().name(),
                    core.name
                )));
            }
        }

        let version = check_native(core.runtime.version())?;
        if version.major < MIN_RUNTIME_MAJOR {
            return Err(ModelError::StateViolation(format!(
                "Runtime version {} is not supported, {} or newer required",
                version, MIN_RUNTIME_MAJOR
            )));
        }

        let unit = ScenarioUnit::from_modifiers(model_definition, modifiers);
        let mut job_options = options.cloned().unwrap_or_default();
        let log_file = core.scr_dir.join(LOG_FILE_NAME);
        job_options
            .set(SCR_DIR, core.scr_dir.display())
            .set(LOG_FILE, log_file.display())
            .set(SOLVER_CNTR, CONTROL_FILE_NAME);
        if core.workspace.debug() >= DebugLevel::ShowLog {
            job_options.set(LOG_OPTION, 3);
            core.log_available = false;
        } else {
            job_options.set(LOG_OPTION, 2);
            core.log_available = true;
        }
        fs::create_dir_all(&core.scr_dir)?;

        let job = core
            .workspace
            .add_job_from_string(&unit.build(), Some(&core.checkpoint), None)?;
        job.run(Some(&job_options), None)?;

        let env = core.handles.env();
        let model = core.handles.model();
        check_native(
            core.runtime
                .init_environment(env, &core.scr_dir.join(CONTROL_FILE_NAME)),
        )?;
        check_native(core.runtime.load_model(model, env))?;

        let model_type = check_native(core.runtime.model_type(model))?;
        let solver = match job_options.solver_for(&model_type) {
            Some(solver) => solver.to_lowercase(),
            None => check_native(core.runtime.default_solver(&model_type))?,
        };
        let opt_file_name = check_native(core.runtime.opt_file_name(model))?;
        check_native(
            core.runtime
                .set_opt_file_name(model, &solver_opt_file(&opt_file_name, &solver)),
        )?;

        let dictionary = check_native(core.runtime.init_dictionary(model, &mut core.store.native()))?;
        for modifier in modifiers {
            let symbol = modifier.symbol();
            match dictionary.lookup(symbol.name()) {
                Some(native) if native.kind == symbol.kind() => {}
                _ => {
                    return Err(ModelError::StateViolation(format!(
                        "{} {} of modifier {} is not part of model {}",
                        symbol.kind(),
                        symbol.name(),
                        modifier,
                        unit.model_name()
                    )));
                }
            }
        }
        core.dictionary = dictionary;
        core.selected_solver = solver;
        core.modifiers = modifiers.to_vec();
        core.state = InstanceState::Instantiated;
        core.store.lock_symbols();

        event!(
            Level::INFO,
            model_type = %model_type,
            solver = %core.selected_solver,
            modifiers = core.modifiers.len(),
            "model instance instantiated"
        );
        Ok(())
    }

    // ========================================================================
    // Solve
    // ========================================================================

    /// Solves with `UseOriginalIfMissing`, the selected solver and no log output.
    pub fn solve(&mut self) -> Result<()> {
        self.solve_with(UpdateType::UseOriginalIfMissing, None, &SolveOptions::default())
    }

    /// Pushes modifier data into the model, runs the solver and leaves the
    /// results in the sync store.
    pub fn solve_with(
        &mut self,
        update_type: UpdateType,
        output: Option<SolveOutput<'_>>,
        options: &SolveOptions,
    ) -> Result<()> {
        let core = self.core_mut()?;
        core.state.require(InstanceState::Instantiated, "solve")?;

        let span = info_span!("instance.solve", instance = %core.name);
        let _enter = span.enter();

        let runtime = Arc::clone(&core.runtime);
        let env = core.handles.env();
        let model = core.handles.model();

        check_native(runtime.begin_update(model))?;
        let mut no_match = 0;
        for modifier in &core.modifiers {
            let target = core
                .dictionary
                .lookup(modifier.symbol().name())
                .ok_or_else(|| ModelError::SymbolNotFound(modifier.symbol().name().to_string()))?;
            let count = check_native(runtime.update_model_symbol(
                model,
                &core.store,
                target,
                modifier.action(),
                modifier.data_symbol().name(),
                modifier.update_type().resolve(update_type),
            ))?;
            no_match += count;
            if no_match > options.limit() {
                return Err(ModelError::NoMatchLimitExceeded {
                    modifier: modifier.symbol().name().to_string(),
                    count: no_match,
                    limit: options.limit(),
                });
            }
        }

        // Start the log file over so it only holds this solve.
        if core.log_available && output.is_some() {
            LogRedirect::switch(runtime.as_ref(), env, LogTarget::Silent)?
                .rewrite_on_restore()
                .finish()?;
        }
        let to_stdout = match output {
            Some(SolveOutput::Stdout) => {
                Some(LogRedirect::switch(runtime.as_ref(), env, LogTarget::Stdout)?)
            }
            _ => None,
        };

        let solver = options
            .solver_override()
            .map(str::to_lowercase)
            .unwrap_or_else(|| core.selected_solver.clone());
        let saved_opt_file = check_native(runtime.opt_file(model))?;
        let saved_opt_name = check_native(runtime.opt_file_name(model))?;
        let opt_file = options.opt_file_override().unwrap_or(saved_opt_file);

        let solved = Self::call_solvers(core, runtime.as_ref(), &solver, opt_file, options.is_debug());
        let restored = check_native(runtime.set_opt_file(model, saved_opt_file))
            .and_then(|_| check_native(runtime.set_opt_file_name(model, &saved_opt_name)));
        solved?;
        restored?;

        if let Some(redirect) = to_stdout {
            redirect.finish()?;
        }

        if let Some(SolveOutput::Writer(writer)) = output {
            Self::copy_log(core, runtime.as_ref(), writer)?;
        }

        event!(
            Level::INFO,
            solver = %solver,
            no_match,
            model_status = check_native(runtime.model_status(model))?,
            "solve finished"
        );
        Ok(())
    }

    fn call_solvers(
        core: &mut InstanceCore,
        runtime: &dyn SolverRuntime,
        solver: &str,
        opt_file: i32,
        dump: bool,
    ) -> Result<()> {
        let model = core.handles.model();
        let opt_name = core
            .workspace
            .working_directory()
            .join(format!("{}.{}", solver, opt_file_extension(opt_file)));
        check_native(runtime.set_opt_file(model, opt_file))?;
        check_native(runtime.set_opt_file_name(model, &opt_name))?;
        check_native(runtime.call_solver(model, &mut core.store.native(), solver))?;

        if dump {
            let dir = &core.scr_dir;
            fs::create_dir_all(dir)?;
            let convert_opt = dir.join("convert.opt");
            fs::write(
                &convert_opt,
                format!(
                    "model {}\ndump {}\ndictmap {}\n",
                    dir.join("model.txt").display(),
                    dir.join("dump.json").display(),
                    dir.join("dictmap.txt").display()
                ),
            )?;
            check_native(runtime.set_opt_file(model, 1))?;
            check_native(runtime.set_opt_file_name(model, &convert_opt))?;
            check_native(runtime.call_solver(model, &mut core.store.native(), DUMP_SOLVER))?;
        }
        Ok(())
    }

    fn copy_log(core: &InstanceCore, runtime: &dyn SolverRuntime, writer: &mut dyn Write) -> Result<()> {
        if !core.log_available {
            writeln!(writer, "{}", NO_LOG)?;
            return Ok(());
        }
        let env = core.handles.env();
        let redirect = LogRedirect::switch(runtime, env, LogTarget::Silent)?;
        match check_native(runtime.log_file(env))? {
            Some(path) if path.is_file() => {
                for line in BufReader::new(File::open(&path)?).lines() {
                    writeln!(writer, "{}", line?)?;
                }
            }
            _ => writeln!(writer, "{}", NO_LOG)?,
        }
        redirect.finish()
    }

    // ========================================================================
    // Status and control
    // ========================================================================

    pub fn model_status(&self) -> Result<ModelStatus> {
        let core = self.core()?;
        let code = check_native(core.runtime.model_status(core.handles.model()))?;
        ModelStatus::from_code(code)
            .ok_or_else(|| ModelError::InvalidArgument(format!("Unknown model status {}", code)))
    }

    pub fn model_status_text(&self) -> Result<&'static str> {
        Ok(self.model_status()?.text())
    }

    pub fn solve_status(&self) -> Result<SolveStatus> {
        let core = self.core()?;
        let code = check_native(core.runtime.solve_status(core.handles.model()))?;
        SolveStatus::from_code(code)
            .ok_or_else(|| ModelError::InvalidArgument(format!("Unknown solve status {}", code)))
    }

    pub fn solve_status_text(&self) -> Result<&'static str> {
        Ok(self.solve_status()?.text())
    }

    /// Asks a running solve to stop. Best effort.
    pub fn interrupt(&self) -> Result<()> {
        let core = self.core()?;
        check_native(core.runtime.interrupt(core.handles.env()))
    }

    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        let core = self.core()?;
        Ok(InterruptHandle {
            runtime: Arc::clone(&core.runtime),
            env: core.handles.env(),
        })
    }

    /// Independent copy of an instantiated instance with its own store.
    pub fn copy(&self, name: Option<&str>) -> Result<ModelInstance> {
        InstanceCloner::copy(self, name)
    }
}

impl std::fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.core {
            Some(core) => f
                .debug_struct("ModelInstance")
                .field("name", &core.name)
                .field("state", &core.state)
                .field("solver", &core.selected_solver)
                .field("modifiers", &core.modifiers.len())
                .finish(),
            None => write!(f, "ModelInstance(uninitialized)"),
        }
    }
}
