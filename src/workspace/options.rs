use crate::core::{ModelError, Result};
use crate::storage::persistence::{load_json, save_json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LOG_OPTION: &str = "logoption";
pub const LOG_FILE: &str = "logfile";
pub const SCR_DIR: &str = "scrdir";
pub const SOLVER_CNTR: &str = "solvercntr";
pub const OPT_FILE: &str = "optfile";
pub const RESTART: &str = "restart";
pub const SAVE: &str = "save";
const SOLVER_PREFIX: &str = "solver.";
const ANY_MODEL_TYPE: &str = "*";

/// Flat key-value option set handed to jobs and the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    values: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.values.insert(key.to_lowercase(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(&key.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values from `other` win.
    pub fn merge(&mut self, other: &Options) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn set_solver(&mut self, model_type: &str, solver: &str) -> &mut Self {
        self.set(&format!("{}{}", SOLVER_PREFIX, model_type), solver)
    }

    pub fn set_all_model_types(&mut self, solver: &str) -> &mut Self {
        self.set_solver(ANY_MODEL_TYPE, solver)
    }

    /// Solver for `model_type`, falling back to the all-types entry.
    pub fn solver_for(&self, model_type: &str) -> Option<&str> {
        self.get(&format!("{}{}", SOLVER_PREFIX, model_type))
            .or_else(|| self.get(&format!("{}{}", SOLVER_PREFIX, ANY_MODEL_TYPE)))
    }

    pub fn log_option(&self) -> Result<Option<i32>> {
        self.int(LOG_OPTION)
    }

    pub fn opt_file(&self) -> Result<Option<i32>> {
        self.int(OPT_FILE)
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    fn int(&self, key: &str) -> Result<Option<i32>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<i32>().map(Some).map_err(|_| {
                ModelError::InvalidArgument(format!("Option {} expects an integer, got '{}'", key, raw))
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }

    /// `key=value` arguments for an external process.
    pub fn to_args(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}
