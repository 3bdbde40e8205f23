//! Pluggable solvers for the in-process runtime.

use super::program::parse_option_lines;
use crate::core::{
    LevelRecord, ModelStatus, NativeError, NativeResult, Record, SolveStatus, SymbolKind,
};
use crate::storage::{Keys, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const E_SOLVER: i32 = 105;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Minimize,
    Maximize,
}

/// A loaded model as a solver sees it.
#[derive(Debug, Clone)]
pub struct SolverModel {
    pub(crate) name: String,
    pub(crate) model_type: String,
    pub(crate) sense: Sense,
    pub(crate) objective: String,
    pub(crate) symbols: BTreeMap<String, Symbol>,
    pub(crate) domains: BTreeMap<String, Vec<String>>,
    pub(crate) sets: BTreeMap<String, Vec<String>>,
    pub(crate) model_status: ModelStatus,
    pub(crate) solve_status: SolveStatus,
}

impl SolverModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Name of the objective variable.
    pub fn objective(&self) -> &str {
        &self.objective
    }

    pub fn set_elements(&self, set: &str) -> Option<&[String]> {
        self.sets.get(set).map(Vec::as_slice)
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn domain(&self, name: &str) -> Option<&[String]> {
        self.domains.get(name).map(Vec::as_slice)
    }

    /// Parameter value; a missing record reads as zero.
    pub fn parameter(&self, name: &str, keys: &[&str]) -> Option<f64> {
        let symbol = self.symbols.get(name)?;
        if symbol.kind() != SymbolKind::Parameter {
            return None;
        }
        Some(
            symbol
                .find_record(keys)
                .and_then(Record::value)
                .unwrap_or(0.0),
        )
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.parameter(name, &[])
    }

    pub fn levels(&self, name: &str, keys: &[&str]) -> Option<&LevelRecord> {
        self.symbols.get(name)?.find_record(keys)?.levels()
    }

    pub fn level_keys(&self, name: &str) -> Vec<Keys> {
        self.symbols
            .get(name)
            .map(|s| s.records().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    pub fn set_level(&mut self, name: &str, keys: &[&str], level: f64) -> NativeResult<()> {
        self.levels_mut(name, keys)?.level = level;
        Ok(())
    }

    pub fn set_marginal(&mut self, name: &str, keys: &[&str], marginal: f64) -> NativeResult<()> {
        self.levels_mut(name, keys)?.marginal = marginal;
        Ok(())
    }

    fn levels_mut(&mut self, name: &str, keys: &[&str]) -> NativeResult<&mut LevelRecord> {
        let keys: Keys = keys.iter().map(|k| k.to_string()).collect();
        self.symbols
            .get_mut(name)
            .and_then(|s| s.get_mut(&keys))
            .and_then(Record::levels_mut)
            .ok_or_else(|| {
                NativeError::new(
                    E_SOLVER,
                    format!("No variable or equation record {}({})", name, keys.join(",")),
                )
            })
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model_status
    }

    pub fn solve_status(&self) -> SolveStatus {
        self.solve_status
    }

    pub fn set_status(&mut self, model_status: ModelStatus, solve_status: SolveStatus) {
        self.model_status = model_status;
        self.solve_status = solve_status;
    }
}

/// Per-call environment of a solver.
pub struct SolveContext<'a> {
    opt_file: Option<&'a Path>,
    log: &'a mut dyn Write,
    interrupt: &'a AtomicBool,
}

impl<'a> SolveContext<'a> {
    pub fn new(opt_file: Option<&'a Path>, log: &'a mut dyn Write, interrupt: &'a AtomicBool) -> Self {
        Self {
            opt_file,
            log,
            interrupt,
        }
    }

    pub fn opt_file(&self) -> Option<&Path> {
        self.opt_file
    }

    /// Parsed option file, empty when none is active.
    pub fn options(&self) -> NativeResult<BTreeMap<String, String>> {
        match self.opt_file {
            None => Ok(BTreeMap::new()),
            Some(path) => fs::read_to_string(path)
                .map(|text| parse_option_lines(&text))
                .map_err(|e| {
                    NativeError::new(
                        E_SOLVER,
                        format!("Cannot read option file {}: {}", path.display(), e),
                    )
                }),
        }
    }

    pub fn log(&mut self) -> &mut dyn Write {
        self.log
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

/// Solver plugged into the in-process runtime.
pub trait Solver: Send + Sync {
    fn solve(&self, model: &mut SolverModel, ctx: &mut SolveContext<'_>) -> NativeResult<()>;
}

// ============================================================================
// convert: model dump utility
// ============================================================================

/// Writes introspection files named in its option file (`dump`, `dictmap`,
/// `model`). Leaves records and status untouched.
#[derive(Debug, Default)]
pub struct ConvertUtility;

#[derive(Serialize)]
struct DumpRecord<'a> {
    keys: &'a [String],
    record: &'a Record,
}

#[derive(Serialize)]
struct DumpSymbol<'a> {
    name: &'a str,
    kind: SymbolKind,
    domain: &'a [String],
    records: Vec<DumpRecord<'a>>,
}

impl ConvertUtility {
    fn dump(model: &SolverModel, path: &Path) -> NativeResult<()> {
        let symbols: Vec<DumpSymbol<'_>> = model
            .symbols
            .values()
            .map(|s| DumpSymbol {
                name: s.name(),
                kind: s.kind(),
                domain: model.domain(s.name()).unwrap_or(&[]),
                records: s
                    .records()
                    .map(|(keys, record)| DumpRecord { keys, record })
                    .collect(),
            })
            .collect();
        let json = serde_json::to_vec_pretty(&symbols)
            .map_err(|e| NativeError::new(E_SOLVER, e.to_string()))?;
        write_file(path, &json)
    }

    fn dictmap(model: &SolverModel, path: &Path) -> NativeResult<()> {
        let mut text = String::new();
        for symbol in model.symbols.values() {
            text.push_str(&format!(
                "{} {} {}\n",
                symbol.name(),
                symbol.kind(),
                symbol.number_records()
            ));
        }
        write_file(path, text.as_bytes())
    }

    fn listing(model: &SolverModel, path: &Path) -> NativeResult<()> {
        let sense = match model.sense {
            Sense::Minimize => "min",
            Sense::Maximize => "max",
        };
        let text = format!(
            "model {} type {} {} {}\nsymbols {}\n",
            model.name,
            model.model_type,
            sense,
            model.objective,
            model.symbols.len()
        );
        write_file(path, text.as_bytes())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> NativeResult<()> {
    fs::write(path, bytes).map_err(|e| {
        NativeError::new(E_SOLVER, format!("Cannot write {}: {}", path.display(), e))
    })
}

impl Solver for ConvertUtility {
    fn solve(&self, model: &mut SolverModel, ctx: &mut SolveContext<'_>) -> NativeResult<()> {
        let options = ctx.options()?;
        if let Some(path) = options.get("dump") {
            Self::dump(model, Path::new(path))?;
        }
        if let Some(path) = options.get("dictmap") {
            Self::dictmap(model, Path::new(path))?;
        }
        if let Some(path) = options.get("model") {
            Self::listing(model, Path::new(path))?;
        }
        let _ = writeln!(ctx.log(), "--- convert wrote {} file(s)", options.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VarType;
    use tempfile::TempDir;

    fn model() -> SolverModel {
        let mut x = Symbol::variable("x", 1, VarType::Positive, "");
        x.insert(vec!["a".into()], Record::Variable(LevelRecord::for_variable(VarType::Positive)));
        let mut p = Symbol::parameter("p", 0, "");
        p.insert(vec![], Record::Parameter { value: 4.0 });
        SolverModel {
            name: "m".into(),
            model_type: "lp".into(),
            sense: Sense::Minimize,
            objective: "x".into(),
            symbols: [("x".to_string(), x), ("p".to_string(), p)].into_iter().collect(),
            domains: BTreeMap::new(),
            sets: BTreeMap::new(),
            model_status: ModelStatus::NoSolutionReturned,
            solve_status: SolveStatus::Normal,
        }
    }

    #[test]
    fn test_model_accessors() {
        let mut m = model();
        assert_eq!(m.scalar("p"), Some(4.0));
        assert_eq!(m.parameter("x", &["a"]), None);
        m.set_level("x", &["a"], 2.5).unwrap();
        assert_eq!(m.levels("x", &["a"]).unwrap().level, 2.5);
        assert!(m.set_level("x", &["b"], 1.0).is_err());
    }

    #[test]
    fn test_convert_writes_requested_files() {
        let dir = TempDir::new().unwrap();
        let opt = dir.path().join("convert.opt");
        let dump = dir.path().join("dump.json");
        let dict = dir.path().join("dictmap.txt");
        fs::write(
            &opt,
            format!("dump {}\ndictmap {}\n", dump.display(), dict.display()),
        )
        .unwrap();

        let mut m = model();
        let flag = AtomicBool::new(false);
        let mut log = Vec::new();
        let mut ctx = SolveContext::new(Some(&opt), &mut log, &flag);
        ConvertUtility.solve(&mut m, &mut ctx).unwrap();

        let dumped: serde_json::Value =
            serde_json::from_slice(&fs::read(&dump).unwrap()).unwrap();
        assert_eq!(dumped.as_array().unwrap().len(), 2);
        assert!(fs::read_to_string(&dict).unwrap().contains("x Variable 1"));
        assert_eq!(m.model_status(), ModelStatus::NoSolutionReturned);
    }
}
