//! In-process implementation of the runtime and job collaborators.
//!
//! Models come from [`ModelProgram`]s; solving is delegated to registered
//! [`Solver`]s. Runtime state lives behind one mutex which is released while a
//! solver runs, so `interrupt` can reach a blocked solve.

use super::program::{
    CheckpointImage, ControlFile, IMAGE_VERSION, ModelProgram, ScenarioRequest,
};
use super::solver::{ConvertUtility, SolveContext, Solver, SolverModel};
use super::{
    HandleId, LogState, LogTarget, NativeSymbol, RuntimeVersion, ScenarioDictionary, SolverRuntime,
};
use crate::core::{
    ExitCode, LevelRecord, ModelStatus, NativeError, NativeResult, Record, Result, SolveStatus,
    SymbolKind, UpdateAction, UpdateType,
};
use crate::job::{JobOutcome, JobRequest, JobRunner};
use crate::storage::persistence::{load_binary, load_json, save_binary, save_json};
use crate::storage::{Keys, NativeStore, StoreId, Symbol, SyncStore};
use crate::workspace::options::{LOG_FILE, SCR_DIR, SOLVER_CNTR};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info_span, warn};

pub const CONVERT: &str = "convert";
pub const DEFAULT_CONTROL_FILE: &str = "solvercntr.dat";

const E_HANDLE: i32 = 101;
const E_STATE: i32 = 102;
const E_IO: i32 = 103;
const E_SYMBOL: i32 = 104;
const E_SOLVER: i32 = super::solver::E_SOLVER;
const E_LOCK: i32 = 106;

fn io_error(context: &str, path: &Path, err: impl std::fmt::Display) -> NativeError {
    NativeError::new(E_IO, format!("{} {}: {}", context, path.display(), err))
}

/// Opens the writer behind a log target; files are appended to.
pub(crate) fn open_log(target: &LogTarget) -> io::Result<Box<dyn Write>> {
    Ok(match target {
        LogTarget::Silent => Box::new(io::sink()),
        LogTarget::Stdout => Box::new(io::stdout()),
        LogTarget::File(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
    })
}

// ============================================================================
// Runtime state
// ============================================================================

struct Environment {
    control: Option<(PathBuf, ControlFile)>,
    log: LogTarget,
    log_file: Option<PathBuf>,
    interrupt: Arc<AtomicBool>,
}

struct ModelData {
    model: SolverModel,
    /// Records as loaded, for `UseOriginalIfMissing`.
    baseline: BTreeMap<String, Symbol>,
    /// Scenario parameter name -> shadow parameter name.
    scenario: BTreeMap<String, String>,
    store: Option<StoreId>,
    opt_file: i32,
    opt_file_name: PathBuf,
    updating: bool,
}

#[derive(Default)]
struct LoadedModel {
    env: Option<HandleId>,
    data: Option<ModelData>,
}

#[derive(Default)]
struct RuntimeState {
    environments: HashMap<HandleId, Environment>,
    models: HashMap<HandleId, LoadedModel>,
}

impl RuntimeState {
    fn env(&mut self, id: HandleId) -> NativeResult<&mut Environment> {
        self.environments
            .get_mut(&id)
            .ok_or_else(|| NativeError::new(E_HANDLE, format!("Unknown environment handle {}", id)))
    }

    fn model(&mut self, id: HandleId) -> NativeResult<&mut ModelData> {
        self.models
            .get_mut(&id)
            .ok_or_else(|| NativeError::new(E_HANDLE, format!("Unknown model handle {}", id)))?
            .data
            .as_mut()
            .ok_or_else(|| NativeError::new(E_STATE, format!("Model {} has not been loaded", id)))
    }
}

pub struct InMemoryRuntime {
    state: Mutex<RuntimeState>,
    solvers: RwLock<HashMap<String, Arc<dyn Solver>>>,
    default_solvers: RwLock<HashMap<String, String>>,
    next_id: AtomicU64,
    version: RuntimeVersion,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::with_version(RuntimeVersion { major: 1, minor: 0 })
    }

    pub fn with_version(version: RuntimeVersion) -> Self {
        let mut solvers: HashMap<String, Arc<dyn Solver>> = HashMap::new();
        solvers.insert(CONVERT.to_string(), Arc::new(ConvertUtility));
        Self {
            state: Mutex::new(RuntimeState::default()),
            solvers: RwLock::new(solvers),
            default_solvers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            version,
        }
    }

    /// Registers `solver` under `name` (case-insensitive).
    pub fn register_solver(&self, name: &str, solver: Arc<dyn Solver>) {
        match self.solvers.write() {
            Ok(mut solvers) => {
                solvers.insert(name.to_lowercase(), solver);
            }
            Err(_) => warn!(solver = name, "solver registry poisoned"),
        }
    }

    pub fn set_default_solver(&self, model_type: &str, solver: &str) {
        if let Ok(mut defaults) = self.default_solvers.write() {
            defaults.insert(model_type.to_lowercase(), solver.to_lowercase());
        }
    }

    pub fn solver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .solvers
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Environments and models currently allocated.
    pub fn live_handles(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.environments.len() + s.models.len())
            .unwrap_or(0)
    }

    fn state(&self) -> NativeResult<MutexGuard<'_, RuntimeState>> {
        self.state
            .lock()
            .map_err(|e| NativeError::new(E_LOCK, e.to_string()))
    }

    fn next_handle(&self) -> HandleId {
        HandleId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn solver(&self, name: &str) -> NativeResult<Arc<dyn Solver>> {
        let solvers = self
            .solvers
            .read()
            .map_err(|e| NativeError::new(E_LOCK, e.to_string()))?;
        solvers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| NativeError::new(E_SOLVER, format!("Solver {} is not available", name)))
    }
}

/// Builds the solver-side model described by a control file.
fn build_model(control: &ControlFile) -> NativeResult<ModelData> {
    let program = &control.program;
    let decl = program.find_model(&control.model).ok_or_else(|| {
        NativeError::new(E_SYMBOL, format!("Model {} not found in program", control.model))
    })?;

    let mut symbols = BTreeMap::new();
    let mut domains = BTreeMap::new();
    let mut sets = BTreeMap::new();

    for set in &program.sets {
        let mut symbol = Symbol::set(&set.name, 1, &set.text);
        for element in &set.elements {
            symbol.insert(vec![element.clone()], Record::Set { text: String::new() });
        }
        sets.insert(set.name.clone(), set.elements.clone());
        domains.insert(set.name.clone(), vec![super::program::ANY_DOMAIN.to_string()]);
        symbols.insert(set.name.clone(), symbol);
    }

    for param in &program.parameters {
        let mut symbol = Symbol::parameter(&param.name, param.domain.len(), &param.text);
        for (keys, value) in &param.values {
            symbol.insert(keys.clone(), Record::Parameter { value: *value });
        }
        domains.insert(param.name.clone(), param.domain.clone());
        symbols.insert(param.name.clone(), symbol);
    }

    for var in &program.variables {
        let mut symbol = Symbol::variable(&var.name, var.domain.len(), var.var_type, &var.text);
        for keys in program.enumerate(&var.domain).unwrap_or_default() {
            symbol.insert(keys, Record::Variable(LevelRecord::for_variable(var.var_type)));
        }
        domains.insert(var.name.clone(), var.domain.clone());
        symbols.insert(var.name.clone(), symbol);
    }

    for equ in &program.equations {
        if !decl.equations.is_empty() && !decl.equations.contains(&equ.name) {
            continue;
        }
        let mut symbol = Symbol::equation(&equ.name, equ.domain.len(), equ.equ_type, &equ.text);
        for keys in program.enumerate(&equ.domain).unwrap_or_default() {
            symbol.insert(keys, Record::Equation(LevelRecord::for_equation(equ.equ_type)));
        }
        domains.insert(equ.name.clone(), equ.domain.clone());
        symbols.insert(equ.name.clone(), symbol);
    }

    if program.find_variable(&control.objective).is_none() {
        return Err(NativeError::new(
            E_SYMBOL,
            format!("Objective variable {} not declared", control.objective),
        ));
    }

    let mut scenario = BTreeMap::new();
    for param in &control.scenario {
        if program.find_parameter(&param.name).is_none() {
            return Err(NativeError::new(
                E_SYMBOL,
                format!("Scenario symbol {} is not a parameter of the model", param.name),
            ));
        }
        scenario.insert(param.name.clone(), param.shadow.clone());
    }

    let model = SolverModel {
        name: decl.name.clone(),
        model_type: control.model_type.clone(),
        sense: control.sense,
        objective: control.objective.clone(),
        symbols,
        domains,
        sets,
        model_status: ModelStatus::NoSolutionReturned,
        solve_status: SolveStatus::Normal,
    };
    Ok(ModelData {
        baseline: model.symbols.clone(),
        model,
        scenario,
        store: None,
        opt_file: control.opt_file,
        opt_file_name: control.opt_file_name.clone(),
        updating: false,
    })
}

fn domain_accepts(model: &SolverModel, symbol: &str, keys: &[String]) -> bool {
    let Some(domain) = model.domains.get(symbol) else {
        return false;
    };
    domain.len() == keys.len()
        && domain.iter().zip(keys).all(|(set, label)| {
            set == super::program::ANY_DOMAIN
                || model.sets.get(set).is_some_and(|e| e.contains(label))
        })
}

/// Writes one attribute of a level record.
fn apply_action(rec: &mut LevelRecord, action: UpdateAction, value: f64) {
    match action {
        UpdateAction::Upper => rec.upper = value,
        UpdateAction::Lower => rec.lower = value,
        UpdateAction::Fixed => {
            rec.lower = value;
            rec.upper = value;
            rec.level = value;
        }
        UpdateAction::Primal => rec.level = value,
        UpdateAction::Dual => rec.marginal = value,
        UpdateAction::Param => {}
    }
}

fn copy_action(rec: &mut LevelRecord, action: UpdateAction, from: &LevelRecord) {
    match action {
        UpdateAction::Upper => rec.upper = from.upper,
        UpdateAction::Lower => rec.lower = from.lower,
        UpdateAction::Fixed => {
            rec.lower = from.lower;
            rec.upper = from.upper;
            rec.level = from.level;
        }
        UpdateAction::Primal => rec.level = from.level,
        UpdateAction::Dual => rec.marginal = from.marginal,
        UpdateAction::Param => {}
    }
}

fn data_values(store: &SyncStore, data_symbol: &str) -> NativeResult<Vec<(Keys, f64)>> {
    let symbol = store
        .symbol(data_symbol)
        .map_err(|e| NativeError::new(E_SYMBOL, e.to_string()))?;
    if symbol.kind() != SymbolKind::Parameter {
        return Err(NativeError::new(
            E_SYMBOL,
            format!("Data symbol {} must be a parameter", data_symbol),
        ));
    }
    Ok(symbol
        .records()
        .filter_map(|(keys, rec)| rec.value().map(|v| (keys.clone(), v)))
        .collect())
}

fn update_parameter(
    data: &mut ModelData,
    target: &str,
    values: Vec<(Keys, f64)>,
    update_type: UpdateType,
) -> NativeResult<usize> {
    let mut no_match = 0;
    let mut accepted = Vec::new();
    for (keys, value) in values {
        if domain_accepts(&data.model, target, &keys) {
            accepted.push((keys, value));
        } else {
            no_match += 1;
        }
    }

    let baseline = data.baseline.get(target);
    let symbol = data
        .model
        .symbols
        .get_mut(target)
        .ok_or_else(|| NativeError::new(E_SYMBOL, format!("Symbol {} not in model", target)))?;

    let touched: BTreeSet<Keys> = accepted.iter().map(|(k, _)| k.clone()).collect();
    let mut untouched: BTreeSet<Keys> = symbol
        .records()
        .map(|(k, _)| k.clone())
        .filter(|k| !touched.contains(k))
        .collect();
    if let Some(base) = baseline {
        untouched.extend(
            base.records()
                .map(|(k, _)| k.clone())
                .filter(|k| !touched.contains(k)),
        );
    }

    for (keys, value) in accepted {
        symbol.insert(keys, Record::Parameter { value });
    }
    for keys in untouched {
        match update_type {
            UpdateType::UseZeroIfMissing => {
                symbol.remove(&keys);
            }
            UpdateType::KeepPreviousIfMissing => {}
            UpdateType::UseOriginalIfMissing | UpdateType::InheritFromSolveCall => {
                match baseline.and_then(|b| b.get(&keys)) {
                    Some(original) => {
                        symbol.insert(keys, original.clone());
                    }
                    None => {
                        symbol.remove(&keys);
                    }
                }
            }
        }
    }
    Ok(no_match)
}

fn update_levels(
    data: &mut ModelData,
    target: &str,
    action: UpdateAction,
    values: Vec<(Keys, f64)>,
    update_type: UpdateType,
) -> NativeResult<usize> {
    let baseline = data.baseline.get(target);
    let symbol = data
        .model
        .symbols
        .get_mut(target)
        .ok_or_else(|| NativeError::new(E_SYMBOL, format!("Symbol {} not in model", target)))?;

    let mut no_match = 0;
    let mut touched = BTreeSet::new();
    for (keys, value) in values {
        match symbol.get_mut(&keys).and_then(Record::levels_mut) {
            Some(rec) => {
                apply_action(rec, action, value);
                touched.insert(keys);
            }
            None => no_match += 1,
        }
    }

    let untouched: Vec<Keys> = symbol
        .records()
        .map(|(k, _)| k.clone())
        .filter(|k| !touched.contains(k))
        .collect();
    for keys in untouched {
        let original = baseline
            .and_then(|b| b.get(&keys))
            .and_then(Record::levels)
            .copied();
        let Some(rec) = symbol.get_mut(&keys).and_then(Record::levels_mut) else {
            continue;
        };
        match update_type {
            UpdateType::UseZeroIfMissing => apply_action(rec, action, 0.0),
            UpdateType::KeepPreviousIfMissing => {}
            UpdateType::UseOriginalIfMissing | UpdateType::InheritFromSolveCall => {
                if let Some(original) = original {
                    copy_action(rec, action, &original);
                }
            }
        }
    }
    Ok(no_match)
}

impl SolverRuntime for InMemoryRuntime {
    fn version(&self) -> NativeResult<RuntimeVersion> {
        Ok(self.version)
    }

    fn create_environment(&self) -> NativeResult<HandleId> {
        let id = self.next_handle();
        self.state()?.environments.insert(
            id,
            Environment {
                control: None,
                log: LogTarget::Silent,
                log_file: None,
                interrupt: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(id)
    }

    fn free_environment(&self, env: HandleId) {
        if let Ok(mut state) = self.state.lock() {
            state.environments.remove(&env);
        }
    }

    fn create_model(&self) -> NativeResult<HandleId> {
        let id = self.next_handle();
        self.state()?.models.insert(id, LoadedModel::default());
        Ok(id)
    }

    fn free_model(&self, model: HandleId) {
        if let Ok(mut state) = self.state.lock() {
            state.models.remove(&model);
        }
    }

    fn init_environment(&self, env: HandleId, control_file: &Path) -> NativeResult<()> {
        let control: ControlFile = load_json(control_file)
            .map_err(|e| io_error("Cannot read control file", control_file, e))?;
        if control.version != IMAGE_VERSION {
            return Err(NativeError::new(
                E_STATE,
                format!("Unsupported control file version {}", control.version),
            ));
        }
        let mut state = self.state()?;
        let environment = state.env(env)?;
        environment.log = LogTarget::from_option(control.log_option, control.log_file.as_deref());
        environment.log_file = control.log_file.clone();
        environment.control = Some((control_file.to_path_buf(), control));
        Ok(())
    }

    fn load_model(&self, model: HandleId, env: HandleId) -> NativeResult<()> {
        let mut state = self.state()?;
        let control = match &state.env(env)?.control {
            Some((_, control)) => control.clone(),
            None => {
                return Err(NativeError::new(
                    E_STATE,
                    format!("Environment {} has not been initialized", env),
                ));
            }
        };
        let data = build_model(&control)?;
        let slot = state
            .models
            .get_mut(&model)
            .ok_or_else(|| NativeError::new(E_HANDLE, format!("Unknown model handle {}", model)))?;
        slot.env = Some(env);
        slot.data = Some(data);
        Ok(())
    }

    fn model_type(&self, model: HandleId) -> NativeResult<String> {
        Ok(self.state()?.model(model)?.model.model_type.clone())
    }

    fn default_solver(&self, model_type: &str) -> NativeResult<String> {
        let defaults = self
            .default_solvers
            .read()
            .map_err(|e| NativeError::new(E_LOCK, e.to_string()))?;
        if let Some(solver) = defaults.get(&model_type.to_lowercase()) {
            return Ok(solver.clone());
        }
        self.solver_names()
            .into_iter()
            .find(|name| name != CONVERT)
            .ok_or_else(|| {
                NativeError::new(
                    E_SOLVER,
                    format!("No solver registered for model type {}", model_type),
                )
            })
    }

    fn opt_file(&self, model: HandleId) -> NativeResult<i32> {
        Ok(self.state()?.model(model)?.opt_file)
    }

    fn set_opt_file(&self, model: HandleId, opt_file: i32) -> NativeResult<()> {
        self.state()?.model(model)?.opt_file = opt_file;
        Ok(())
    }

    fn opt_file_name(&self, model: HandleId) -> NativeResult<PathBuf> {
        Ok(self.state()?.model(model)?.opt_file_name.clone())
    }

    fn set_opt_file_name(&self, model: HandleId, name: &Path) -> NativeResult<()> {
        self.state()?.model(model)?.opt_file_name = name.to_path_buf();
        Ok(())
    }

    fn init_dictionary(
        &self,
        model: HandleId,
        store: &mut NativeStore<'_>,
    ) -> NativeResult<ScenarioDictionary> {
        let mut state = self.state()?;
        let data = state.model(model)?;
        let mut dictionary = ScenarioDictionary::new();

        for symbol in data.model.symbols.values() {
            let published = match symbol.kind() {
                SymbolKind::Variable => {
                    Symbol::variable(symbol.name(), symbol.dim(), symbol.var_type(), symbol.text())
                }
                SymbolKind::Equation => {
                    Symbol::equation(symbol.name(), symbol.dim(), symbol.equ_type(), symbol.text())
                }
                _ => continue,
            };
            store
                .ensure_symbol(published)
                .map_err(|e| NativeError::new(E_SYMBOL, e.to_string()))?;
            dictionary.insert(
                symbol.name(),
                NativeSymbol {
                    name: symbol.name().to_string(),
                    kind: symbol.kind(),
                    dim: symbol.dim(),
                },
            );
        }

        for name in data.scenario.keys() {
            if store.kind_of(name) != Some(SymbolKind::Parameter) {
                return Err(NativeError::new(
                    E_SYMBOL,
                    format!("Scenario parameter {} not found in sync store", name),
                ));
            }
            let dim = data.model.symbols.get(name).map_or(0, Symbol::dim);
            dictionary.insert(
                name.clone(),
                NativeSymbol {
                    name: name.clone(),
                    kind: SymbolKind::Parameter,
                    dim,
                },
            );
        }

        data.store = Some(store.id());
        debug!(model = %model, symbols = dictionary.len(), "dictionary initialized");
        Ok(dictionary)
    }

    fn begin_update(&self, model: HandleId) -> NativeResult<()> {
        let mut state = self.state()?;
        let data = state.model(model)?;
        if data.store.is_none() {
            return Err(NativeError::new(
                E_STATE,
                format!("Model {} is not registered with a store", model),
            ));
        }
        data.updating = true;
        Ok(())
    }

    fn update_model_symbol(
        &self,
        model: HandleId,
        store: &SyncStore,
        target: &NativeSymbol,
        action: UpdateAction,
        data_symbol: &str,
        update_type: UpdateType,
    ) -> NativeResult<usize> {
        let values = data_values(store, data_symbol)?;
        let mut state = self.state()?;
        let data = state.model(model)?;
        if data.store != Some(store.id()) {
            return Err(NativeError::new(
                E_STATE,
                format!("Store {} is not registered with model {}", store.id(), model),
            ));
        }
        if !data.updating {
            return Err(NativeError::new(E_STATE, "No update in progress"));
        }

        match (target.kind, action) {
            (SymbolKind::Parameter, UpdateAction::Param) => {
                if !data.scenario.contains_key(&target.name) {
                    return Err(NativeError::new(
                        E_SYMBOL,
                        format!("{} is not a scenario parameter", target.name),
                    ));
                }
                update_parameter(data, &target.name, values, update_type)
            }
            (SymbolKind::Variable | SymbolKind::Equation, action)
                if action != UpdateAction::Param =>
            {
                update_levels(data, &target.name, action, values, update_type)
            }
            (kind, action) => Err(NativeError::new(
                E_SYMBOL,
                format!("Update action {} cannot be applied to {} {}", action, kind, target.name),
            )),
        }
    }

    fn call_solver(
        &self,
        model: HandleId,
        store: &mut NativeStore<'_>,
        solver: &str,
    ) -> NativeResult<()> {
        let span = info_span!("runtime.call_solver", model = %model, solver);
        let _enter = span.enter();

        let implementation = self.solver(solver)?;
        let (mut snapshot, opt_file, log_target, interrupt) = {
            let mut state = self.state()?;
            let data = state.model(model)?;
            if data.store != Some(store.id()) {
                return Err(NativeError::new(
                    E_STATE,
                    format!("Store {} is not registered with model {}", store.id(), model),
                ));
            }
            data.updating = false;
            let snapshot = data.model.clone();
            let opt_file = (data.opt_file > 0).then(|| data.opt_file_name.clone());
            let env = state
                .models
                .get(&model)
                .and_then(|m| m.env)
                .ok_or_else(|| NativeError::new(E_STATE, "Model has no environment"))?;
            let environment = state.env(env)?;
            (
                snapshot,
                opt_file,
                environment.log.clone(),
                Arc::clone(&environment.interrupt),
            )
        };
        let opt_file = opt_file.filter(|p| p.is_file());

        let mut log = open_log(&log_target).map_err(|e| NativeError::new(E_IO, e.to_string()))?;
        let _ = writeln!(log, "--- Calling {} for model {}", solver, snapshot.name());
        let result = {
            let mut ctx = SolveContext::new(opt_file.as_deref(), log.as_mut(), &interrupt);
            implementation.solve(&mut snapshot, &mut ctx)
        };
        interrupt.store(false, Ordering::SeqCst);
        let _ = writeln!(
            log,
            "--- {} finished: {} / {}",
            solver,
            snapshot.model_status(),
            snapshot.solve_status()
        );
        let _ = log.flush();
        result?;

        let mut state = self.state()?;
        let data = state.model(model)?;
        for symbol in snapshot.symbols.values() {
            if !matches!(symbol.kind(), SymbolKind::Variable | SymbolKind::Equation) {
                continue;
            }
            if store.kind_of(symbol.name()) != Some(symbol.kind()) {
                continue;
            }
            for (keys, record) in symbol.records() {
                store
                    .write_record(symbol.name(), keys.clone(), record.clone())
                    .map_err(|e| NativeError::new(E_SYMBOL, e.to_string()))?;
            }
        }
        data.model = snapshot;
        Ok(())
    }

    fn model_status(&self, model: HandleId) -> NativeResult<i32> {
        Ok(self.state()?.model(model)?.model.model_status.code())
    }

    fn solve_status(&self, model: HandleId) -> NativeResult<i32> {
        Ok(self.state()?.model(model)?.model.solve_status.code())
    }

    fn duplicate_scratch(
        &self,
        env: HandleId,
        scr_dir: &Path,
        log_file: &Path,
    ) -> NativeResult<PathBuf> {
        let (control_path, mut control) = {
            let mut state = self.state()?;
            state.env(env)?.control.clone().ok_or_else(|| {
                NativeError::new(E_STATE, format!("Environment {} has not been initialized", env))
            })?
        };

        fs::create_dir_all(scr_dir).map_err(|e| io_error("Cannot create", scr_dir, e))?;
        let entries =
            fs::read_dir(&control.scr_dir).map_err(|e| io_error("Cannot read", &control.scr_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error("Cannot read", &control.scr_dir, e))?;
            let source = entry.path();
            if !source.is_file() || control.log_file.as_deref() == Some(source.as_path()) {
                continue;
            }
            let target = scr_dir.join(entry.file_name());
            fs::copy(&source, &target).map_err(|e| io_error("Cannot copy", &source, e))?;
        }

        control.scr_dir = scr_dir.to_path_buf();
        control.log_file = Some(log_file.to_path_buf());
        let file_name = control_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTROL_FILE));
        let new_control = scr_dir.join(file_name);
        save_json(&new_control, &control).map_err(|e| io_error("Cannot write", &new_control, e))?;
        Ok(new_control)
    }

    fn switch_log(&self, env: HandleId, target: LogTarget) -> NativeResult<LogState> {
        let mut state = self.state()?;
        let environment = state.env(env)?;
        let previous = std::mem::replace(&mut environment.log, target);
        Ok(LogState { previous })
    }

    fn restore_log(&self, env: HandleId, saved: LogState, rewrite: bool) -> NativeResult<()> {
        let mut state = self.state()?;
        let environment = state.env(env)?;
        if rewrite && let LogTarget::File(path) = &saved.previous {
            File::create(path).map_err(|e| io_error("Cannot rewrite", path, e))?;
        }
        environment.log = saved.previous;
        Ok(())
    }

    fn log_file(&self, env: HandleId) -> NativeResult<Option<PathBuf>> {
        Ok(self.state()?.env(env)?.log_file.clone())
    }

    fn interrupt(&self, env: HandleId) -> NativeResult<()> {
        self.state()?.env(env)?.interrupt.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Job runner
// ============================================================================

struct JobFailure {
    code: ExitCode,
    message: String,
}

impl JobFailure {
    fn new(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Compiles JSON programs into checkpoints and prepares scratch directories
/// for generated scenario units.
#[derive(Debug, Default)]
pub struct InMemoryJobRunner;

impl InMemoryJobRunner {
    pub fn new() -> Self {
        Self
    }

    fn restart_program(request: &JobRequest) -> std::result::Result<Option<ModelProgram>, JobFailure> {
        let Some(path) = &request.restart else {
            return Ok(None);
        };
        if !path.is_file() {
            return Err(JobFailure::new(
                ExitCode::FileError,
                format!("Restart file {} not found", path.display()),
            ));
        }
        let image: CheckpointImage = load_binary(path)
            .map_err(|e| JobFailure::new(ExitCode::FileError, e.to_string()))?;
        if image.version != IMAGE_VERSION {
            return Err(JobFailure::new(
                ExitCode::FileError,
                format!("Unsupported checkpoint version {}", image.version),
            ));
        }
        Ok(Some(image.program))
    }

    fn save(request: &JobRequest, program: ModelProgram) -> std::result::Result<(), JobFailure> {
        if let Some(save) = &request.save {
            save_binary(save, &CheckpointImage::new(program))
                .map_err(|e| JobFailure::new(ExitCode::FileError, e.to_string()))?;
        }
        Ok(())
    }

    fn execute(
        &self,
        source: &str,
        request: &JobRequest,
        log: &mut dyn Write,
    ) -> std::result::Result<(), JobFailure> {
        let base = Self::restart_program(request)?;

        if source.trim_start().starts_with('{') {
            let program = ModelProgram::from_json(source)
                .map_err(|e| JobFailure::new(ExitCode::CompilationError, e))?;
            let program = base
                .unwrap_or_default()
                .extend(program)
                .map_err(|e| JobFailure::new(ExitCode::CompilationError, e))?;
            let _ = writeln!(
                log,
                "--- Compiled {} sets, {} parameters, {} models",
                program.sets.len(),
                program.parameters.len(),
                program.models.len()
            );
            return Self::save(request, program);
        }

        let scenario = ScenarioRequest::parse(source)
            .map_err(|e| JobFailure::new(ExitCode::CompilationError, e))?;
        let program = base.ok_or_else(|| {
            JobFailure::new(ExitCode::CompilationError, "Solve statement without restart file")
        })?;
        if program.find_model(&scenario.model).is_none() {
            return Err(JobFailure::new(
                ExitCode::CompilationError,
                format!("Unknown model {}", scenario.model),
            ));
        }
        if program.find_variable(&scenario.objective).is_none() {
            return Err(JobFailure::new(
                ExitCode::CompilationError,
                format!("Objective {} is not a variable", scenario.objective),
            ));
        }
        for param in &scenario.parameters {
            if program.find_parameter(&param.name).is_none() {
                return Err(JobFailure::new(
                    ExitCode::CompilationError,
                    format!("Scenario symbol {} is not a parameter", param.name),
                ));
            }
        }

        let options = &request.options;
        let scr_dir = options.path(SCR_DIR).ok_or_else(|| {
            JobFailure::new(ExitCode::ParameterError, "Scratch directory option missing")
        })?;
        let parameter_error = |e: crate::core::ModelError| {
            JobFailure::new(ExitCode::ParameterError, e.to_string())
        };
        let log_option = options.log_option().map_err(parameter_error)?.unwrap_or(2);
        let opt_file = options.opt_file().map_err(parameter_error)?.unwrap_or(0);
        let solver = options
            .solver_for(&scenario.model_type)
            .unwrap_or(&scenario.model_type)
            .to_lowercase();
        let control = ControlFile {
            version: IMAGE_VERSION,
            program: program.clone(),
            model: scenario.model.clone(),
            model_type: scenario.model_type.clone(),
            sense: scenario.sense,
            objective: scenario.objective.clone(),
            scenario: scenario.parameters.clone(),
            scr_dir: scr_dir.clone(),
            log_option,
            log_file: options.path(LOG_FILE),
            opt_file,
            opt_file_name: request.working_dir.join(format!("{}.opt", solver)),
        };
        let control_name = options.get(SOLVER_CNTR).unwrap_or(DEFAULT_CONTROL_FILE);
        fs::create_dir_all(&scr_dir)
            .map_err(|e| JobFailure::new(ExitCode::CouldNotCreateScratchDir, e.to_string()))?;
        save_json(&scr_dir.join(control_name), &control)
            .map_err(|e| JobFailure::new(ExitCode::FileError, e.to_string()))?;
        let _ = writeln!(
            log,
            "--- Model {} ({}) generated into {}",
            scenario.model,
            scenario.model_type,
            scr_dir.display()
        );
        Self::save(request, program)
    }
}

impl JobRunner for InMemoryJobRunner {
    fn run(&self, request: &JobRequest) -> Result<JobOutcome> {
        let span = info_span!("runtime.job", job = %request.name);
        let _enter = span.enter();

        let source = fs::read_to_string(&request.source_file)?;
        let target = LogTarget::from_option(
            request.options.log_option()?.unwrap_or(0),
            request.options.path(LOG_FILE).as_deref(),
        );
        let mut log = open_log(&target)?;
        let _ = writeln!(log, "--- Job {} start", request.name);

        match self.execute(&source, request, log.as_mut()) {
            Ok(()) => {
                let _ = writeln!(log, "--- Job {} completed", request.name);
                Ok(JobOutcome::success())
            }
            Err(failure) => {
                let _ = writeln!(log, "*** Job {} failed: {}", request.name, failure.message);
                fs::write(
                    &request.listing,
                    format!("*** Error {}: {}\n", failure.code.code(), failure.message),
                )?;
                warn!(code = failure.code.code(), message = %failure.message, "job failed");
                Ok(JobOutcome::failure(failure.code.code()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EquType, VarType};
    use crate::runtime::solver::Sense;
    use crate::workspace::Options;
    use tempfile::TempDir;

    fn program() -> ModelProgram {
        ModelProgram::new()
            .set("i", &["a", "b"])
            .parameter("cap", &["i"], &[(&["a"], 5.0), (&["b"], 7.0)])
            .scalar("mult", 1.0)
            .variable("x", &["i"], VarType::Positive)
            .variable("z", &[], VarType::Free)
            .equation("obj", &[], EquType::E)
            .model("m", &[])
    }

    fn control(dir: &Path) -> PathBuf {
        let control = ControlFile {
            version: IMAGE_VERSION,
            program: program(),
            model: "m".into(),
            model_type: "lp".into(),
            sense: Sense::Minimize,
            objective: "z".into(),
            scenario: vec![super::super::program::ScenarioParameter {
                name: "mult".into(),
                shadow: "s__mult".into(),
            }],
            scr_dir: dir.to_path_buf(),
            log_option: 2,
            log_file: Some(dir.join("solver.log")),
            opt_file: 0,
            opt_file_name: dir.join("lp.opt"),
        };
        let path = dir.join(DEFAULT_CONTROL_FILE);
        save_json(&path, &control).unwrap();
        path
    }

    struct Loaded {
        _dir: TempDir,
        runtime: InMemoryRuntime,
        env: HandleId,
        model: HandleId,
        store: SyncStore,
    }

    fn loaded() -> Loaded {
        let dir = TempDir::new().unwrap();
        let runtime = InMemoryRuntime::new();
        let env = runtime.create_environment().unwrap();
        let model = runtime.create_model().unwrap();
        runtime.init_environment(env, &control(dir.path())).unwrap();
        runtime.load_model(model, env).unwrap();

        let mut store = SyncStore::new("sync");
        store.add_parameter("mult", 0, "").unwrap();
        store.add_parameter("xup", 1, "").unwrap();
        store.add_variable("x", 1, VarType::Positive, "").unwrap();
        runtime.init_dictionary(model, &mut store.native()).unwrap();
        Loaded {
            _dir: dir,
            runtime,
            env,
            model,
            store,
        }
    }

    fn native(name: &str, kind: SymbolKind, dim: usize) -> NativeSymbol {
        NativeSymbol {
            name: name.into(),
            kind,
            dim,
        }
    }

    #[test]
    fn test_dictionary_publishes_model_symbols() {
        let l = loaded();
        assert!(l.store.contains_symbol("z"));
        assert!(l.store.contains_symbol("obj"));
        assert_eq!(l.runtime.model_type(l.model).unwrap(), "lp");
    }

    #[test]
    fn test_update_counts_unmatched_keys() {
        let mut l = loaded();
        l.store.set_value("xup", &["a"], 3.0).unwrap();
        l.store.set_value("xup", &["nowhere"], 3.0).unwrap();
        l.runtime.begin_update(l.model).unwrap();
        let count = l
            .runtime
            .update_model_symbol(
                l.model,
                &l.store,
                &native("x", SymbolKind::Variable, 1),
                UpdateAction::Upper,
                "xup",
                UpdateType::UseOriginalIfMissing,
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_update_requires_begin() {
        let l = loaded();
        let err = l
            .runtime
            .update_model_symbol(
                l.model,
                &l.store,
                &native("mult", SymbolKind::Parameter, 0),
                UpdateAction::Param,
                "mult",
                UpdateType::UseOriginalIfMissing,
            )
            .unwrap_err();
        assert_eq!(err.code, E_STATE);
    }

    #[test]
    fn test_missing_records_follow_update_type() {
        let mut l = loaded();
        let target = native("mult", SymbolKind::Parameter, 0);
        l.store.set_value("mult", &[], 0.5).unwrap();
        let update = |l: &Loaded, update_type| {
            l.runtime.begin_update(l.model).unwrap();
            l.runtime
                .update_model_symbol(l.model, &l.store, &target, UpdateAction::Param, "mult", update_type)
                .unwrap();
            let mut state = l.runtime.state().unwrap();
            let value = state.model(l.model).unwrap().model.scalar("mult").unwrap();
            value
        };

        assert_eq!(update(&l, UpdateType::UseOriginalIfMissing), 0.5);
        l.store.clear("mult").unwrap();
        assert_eq!(update(&l, UpdateType::KeepPreviousIfMissing), 0.5);
        assert_eq!(update(&l, UpdateType::UseOriginalIfMissing), 1.0);
        assert_eq!(update(&l, UpdateType::UseZeroIfMissing), 0.0);
    }

    #[test]
    fn test_log_switch_and_rewrite() {
        let l = loaded();
        let log_file = l.runtime.log_file(l.env).unwrap().unwrap();
        fs::write(&log_file, "old output\n").unwrap();

        let saved = l.runtime.switch_log(l.env, LogTarget::Silent).unwrap();
        assert_eq!(saved.previous, LogTarget::File(log_file.clone()));
        l.runtime.restore_log(l.env, saved, true).unwrap();
        assert_eq!(fs::read_to_string(&log_file).unwrap(), "");
    }

    #[test]
    fn test_duplicate_scratch_writes_new_control() {
        let l = loaded();
        let target = TempDir::new().unwrap();
        let new_dir = target.path().join("copy");
        let control = l
            .runtime
            .duplicate_scratch(l.env, &new_dir, &new_dir.join("solver.log"))
            .unwrap();
        let copied: ControlFile = load_json(&control).unwrap();
        assert_eq!(copied.scr_dir, new_dir);
        assert_eq!(copied.log_file, Some(new_dir.join("solver.log")));
    }

    #[test]
    fn test_unknown_solver() {
        let mut l = loaded();
        let err = l
            .runtime
            .call_solver(l.model, &mut l.store.native(), "nosuch")
            .unwrap_err();
        assert_eq!(err.code, E_SOLVER);
    }

    #[test]
    fn test_job_runner_compiles_program_into_checkpoint() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("job.src");
        fs::write(&source, program().to_json().unwrap()).unwrap();
        let request = JobRequest {
            name: "job".into(),
            source_file: source,
            working_dir: dir.path().to_path_buf(),
            restart: None,
            save: Some(dir.path().join("base.tmp")),
            listing: dir.path().join("job.lst"),
            options: Options::new(),
        };
        assert!(InMemoryJobRunner::new().run(&request).unwrap().is_success());
        let image: CheckpointImage = load_binary(&dir.path().join("base.tmp")).unwrap();
        assert_eq!(image.program, program());
    }

    #[test]
    fn test_job_runner_rejects_unknown_model() {
        let dir = TempDir::new().unwrap();
        let restart = dir.path().join("base.ckpt");
        save_binary(&restart, &CheckpointImage::new(program())).unwrap();
        let source = dir.path().join("job.src");
        fs::write(&source, "solve other use lp min z;").unwrap();
        let mut options = Options::new();
        options.set(SCR_DIR, dir.path().join("scr").display());
        let request = JobRequest {
            name: "job".into(),
            source_file: source,
            working_dir: dir.path().to_path_buf(),
            restart: Some(restart),
            save: None,
            listing: dir.path().join("job.lst"),
            options,
        };
        let outcome = InMemoryJobRunner::new().run(&request).unwrap();
        assert_eq!(outcome.exit_code, ExitCode::CompilationError.code());
        assert!(fs::read_to_string(&request.listing).unwrap().contains("Unknown model other"));
    }
}
