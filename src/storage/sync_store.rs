//! Record container shared between a model instance and its caller.
//!
//! A store can be in one of two guarded modes. Record-locked stores refuse new
//! (or removed) records but accept value changes; symbol-locked stores refuse new
//! symbol definitions. The modes are switched by the owning model instance only.

use super::symbol::{to_keys, Keys, StoreId, Symbol, SymbolRef};
use crate::core::{EquType, LevelRecord, ModelError, Record, Result, SymbolKind, VarType};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreLock {
    #[default]
    Unlocked,
    Records,
    Symbols,
}

#[derive(Debug, Clone)]
pub struct SyncStore {
    id: StoreId,
    name: String,
    symbols: BTreeMap<String, Symbol>,
    lock: StoreLock,
}

impl SyncStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StoreId::new(),
            name: name.into(),
            symbols: BTreeMap::new(),
            lock: StoreLock::Unlocked,
        }
    }

    pub(crate) fn from_symbols(name: impl Into<String>, symbols: Vec<Symbol>) -> Self {
        let mut store = Self::new(name);
        for symbol in symbols {
            store.symbols.insert(symbol.name().to_string(), symbol);
        }
        store
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock(&self) -> StoreLock {
        self.lock
    }

    // ------------------------------------------------------------------
    // Symbol definitions
    // ------------------------------------------------------------------

    pub fn add_set(&mut self, name: &str, dim: usize, text: &str) -> Result<SymbolRef> {
        self.define(Symbol::set(name, dim, text))
    }

    pub fn add_parameter(&mut self, name: &str, dim: usize, text: &str) -> Result<SymbolRef> {
        self.define(Symbol::parameter(name, dim, text))
    }

    pub fn add_variable(
        &mut self,
        name: &str,
        dim: usize,
        var_type: VarType,
        text: &str,
    ) -> Result<SymbolRef> {
        self.define(Symbol::variable(name, dim, var_type, text))
    }

    pub fn add_equation(
        &mut self,
        name: &str,
        dim: usize,
        equ_type: EquType,
        text: &str,
    ) -> Result<SymbolRef> {
        self.define(Symbol::equation(name, dim, equ_type, text))
    }

    fn define(&mut self, symbol: Symbol) -> Result<SymbolRef> {
        if self.lock == StoreLock::Symbols {
            return Err(ModelError::StateViolation(
                "Cannot add symbols to symbol-locked store".into(),
            ));
        }
        self.insert_symbol(symbol)
    }

    fn insert_symbol(&mut self, symbol: Symbol) -> Result<SymbolRef> {
        if self.symbols.contains_key(symbol.name()) {
            return Err(ModelError::NameCollision {
                kind: "Symbol",
                name: symbol.name().to_string(),
            });
        }
        let handle = SymbolRef::new(self.id, &symbol);
        self.symbols.insert(symbol.name().to_string(), symbol);
        Ok(handle)
    }

    pub fn symbol(&self, name: &str) -> Result<&Symbol> {
        self.symbols
            .get(name)
            .ok_or_else(|| ModelError::SymbolNotFound(name.to_string()))
    }

    pub fn symbol_ref(&self, name: &str) -> Result<SymbolRef> {
        self.symbol(name).map(|s| SymbolRef::new(self.id, s))
    }

    pub fn contains_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Adds a new record with the symbol's default values.
    pub fn add_record(&mut self, symbol: &str, keys: &[&str]) -> Result<&mut Record> {
        self.guard_records("add data records to")?;
        let sym = self.symbol_mut(symbol)?;
        sym.check_keys(keys)?;
        let keys = to_keys(keys);
        if sym.contains(&keys) {
            return Err(ModelError::InvalidArgument(format!(
                "Record ({}) already exists in symbol '{}'",
                keys.join(", "),
                symbol
            )));
        }
        let record = sym.default_record();
        sym.insert(keys.clone(), record);
        sym.get_mut(&keys)
            .ok_or_else(|| ModelError::SymbolNotFound(symbol.to_string()))
    }

    /// Returns the existing record for `keys` or adds a new one.
    pub fn merge_record(&mut self, symbol: &str, keys: &[&str]) -> Result<&mut Record> {
        let locked = self.lock == StoreLock::Records;
        let sym = self.symbol_mut(symbol)?;
        sym.check_keys(keys)?;
        let keys = to_keys(keys);
        if !sym.contains(&keys) {
            if locked {
                return Err(record_lock_violation("add data records to"));
            }
            let record = sym.default_record();
            sym.insert(keys.clone(), record);
        }
        sym.get_mut(&keys)
            .ok_or_else(|| ModelError::SymbolNotFound(symbol.to_string()))
    }

    pub fn find_record(&self, symbol: &str, keys: &[&str]) -> Result<&Record> {
        let sym = self.symbol(symbol)?;
        sym.check_keys(keys)?;
        sym.find_record(keys).ok_or_else(|| missing_record(symbol, keys))
    }

    pub fn find_record_mut(&mut self, symbol: &str, keys: &[&str]) -> Result<&mut Record> {
        let sym = self.symbol_mut(symbol)?;
        sym.check_keys(keys)?;
        sym.get_mut(&to_keys(keys))
            .ok_or_else(|| missing_record(symbol, keys))
    }

    /// Sets a parameter value, adding the record when it does not exist yet.
    pub fn set_value(&mut self, symbol: &str, keys: &[&str], value: f64) -> Result<()> {
        match self.merge_record(symbol, keys)? {
            Record::Parameter { value: v } => {
                *v = value;
                Ok(())
            }
            other => Err(ModelError::TypeMismatch(format!(
                "'{}' is a {}, not a Parameter",
                symbol,
                other.kind()
            ))),
        }
    }

    pub fn value(&self, symbol: &str, keys: &[&str]) -> Result<f64> {
        let record = self.find_record(symbol, keys)?;
        record.value().ok_or_else(|| {
            ModelError::TypeMismatch(format!("'{}' is a {}, not a Parameter", symbol, record.kind()))
        })
    }

    pub fn levels(&self, symbol: &str, keys: &[&str]) -> Result<LevelRecord> {
        let record = self.find_record(symbol, keys)?;
        record.levels().copied().ok_or_else(|| {
            ModelError::TypeMismatch(format!(
                "'{}' is a {}, not a Variable or Equation",
                symbol,
                record.kind()
            ))
        })
    }

    pub fn remove_record(&mut self, symbol: &str, keys: &[&str]) -> Result<()> {
        self.guard_records("remove data records from")?;
        let sym = self.symbol_mut(symbol)?;
        sym.check_keys(keys)?;
        sym.remove(&to_keys(keys))
            .map(|_| ())
            .ok_or_else(|| missing_record(symbol, keys))
    }

    /// Removes every record of `symbol`.
    pub fn clear(&mut self, symbol: &str) -> Result<()> {
        self.guard_records("remove data records from")?;
        self.symbol_mut(symbol)?.clear();
        Ok(())
    }

    pub fn number_records(&self, symbol: &str) -> Result<usize> {
        Ok(self.symbol(symbol)?.number_records())
    }

    /// Number of distinct labels used by any record of any symbol.
    pub fn unique_label_count(&self) -> usize {
        let labels: BTreeSet<&str> = self
            .symbols
            .values()
            .flat_map(|s| s.records())
            .flat_map(|(keys, _)| keys.iter().map(String::as_str))
            .collect();
        labels.len()
    }

    /// Copies symbols and records into a new, unlocked store with its own id.
    pub fn duplicate(&self, name: impl Into<String>) -> SyncStore {
        Self::from_symbols(name, self.symbols.values().cloned().collect())
    }

    fn symbol_mut(&mut self, name: &str) -> Result<&mut Symbol> {
        self.symbols
            .get_mut(name)
            .ok_or_else(|| ModelError::SymbolNotFound(name.to_string()))
    }

    fn guard_records(&self, what: &str) -> Result<()> {
        if self.lock == StoreLock::Records {
            return Err(record_lock_violation(what));
        }
        Ok(())
    }

    pub(crate) fn lock_records(&mut self) {
        self.lock = StoreLock::Records;
    }

    pub(crate) fn lock_symbols(&mut self) {
        self.lock = StoreLock::Symbols;
    }

    pub(crate) fn native(&mut self) -> NativeStore<'_> {
        NativeStore { store: self }
    }
}

fn record_lock_violation(what: &str) -> ModelError {
    ModelError::StateViolation(format!("Cannot {} record-locked store", what))
}

fn missing_record(symbol: &str, keys: &[&str]) -> ModelError {
    ModelError::InvalidArgument(format!(
        "Cannot find record ({}) in symbol '{}'",
        keys.join(", "),
        symbol
    ))
}

/// Privileged view the solver runtime uses to publish model symbols and results.
///
/// Writes through this view ignore both locks.
pub struct NativeStore<'a> {
    store: &'a mut SyncStore,
}

impl NativeStore<'_> {
    pub fn id(&self) -> StoreId {
        self.store.id
    }

    pub fn store(&self) -> &SyncStore {
        self.store
    }

    /// Defines `symbol` unless a symbol with the same shape exists already.
    pub fn ensure_symbol(&mut self, symbol: Symbol) -> Result<()> {
        match self.store.symbols.get(symbol.name()) {
            Some(existing) if existing.same_shape(&symbol) => Ok(()),
            Some(existing) => Err(ModelError::TypeMismatch(format!(
                "Store symbol '{}' is a {}-dimensional {}, model expects a {}-dimensional {}",
                existing.name(),
                existing.dim(),
                existing.kind(),
                symbol.dim(),
                symbol.kind()
            ))),
            None => self.store.insert_symbol(symbol).map(|_| ()),
        }
    }

    pub fn write_record(&mut self, symbol: &str, keys: Keys, record: Record) -> Result<()> {
        let sym = self.store.symbol_mut(symbol)?;
        sym.check_record(&record)?;
        if keys.len() != sym.dim() {
            return Err(ModelError::InvalidArgument(format!(
                "Different dimensions for symbol '{}': {} vs. {}",
                symbol,
                keys.len(),
                sym.dim()
            )));
        }
        sym.insert(keys, record);
        Ok(())
    }

    pub fn kind_of(&self, symbol: &str) -> Option<SymbolKind> {
        self.store.symbols.get(symbol).map(|s| s.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_parameter() -> SyncStore {
        let mut store = SyncStore::new("db");
        store.add_parameter("p", 1, "").unwrap();
        store.set_value("p", &["a"], 1.0).unwrap();
        store
    }

    #[test]
    fn test_record_lock_blocks_new_keys_but_not_updates() {
        let mut store = store_with_parameter();
        store.lock_records();

        assert!(store.add_record("p", &["b"]).is_err());
        assert!(store.set_value("p", &["b"], 2.0).is_err());
        assert!(store.remove_record("p", &["a"]).is_err());
        assert!(store.clear("p").is_err());

        store.set_value("p", &["a"], 5.0).unwrap();
        assert_eq!(store.value("p", &["a"]).unwrap(), 5.0);
        // symbols may still be defined while only records are locked
        assert!(store.add_parameter("q", 0, "").is_ok());
    }

    #[test]
    fn test_symbol_lock_releases_record_lock() {
        let mut store = SyncStore::new("db");
        store.lock_records();
        store.add_parameter("p", 0, "").unwrap();
        store.lock_symbols();

        let err = store.add_parameter("q", 0, "").unwrap_err();
        assert!(err.to_string().contains("symbol-locked"));
        store.set_value("p", &[], 3.0).unwrap();
        assert_eq!(store.value("p", &[]).unwrap(), 3.0);
    }

    #[test]
    fn test_unique_label_count() {
        let mut store = SyncStore::new("db");
        assert_eq!(store.unique_label_count(), 0);
        store.add_parameter("c", 2, "").unwrap();
        store.set_value("c", &["a", "b"], 1.0).unwrap();
        store.set_value("c", &["b", "a"], 1.0).unwrap();
        assert_eq!(store.unique_label_count(), 2);
    }

    #[test]
    fn test_duplicate_gets_new_identity() {
        let mut store = store_with_parameter();
        store.lock_symbols();
        let copy = store.duplicate("copy");
        assert_ne!(copy.id(), store.id());
        assert_eq!(copy.lock(), StoreLock::Unlocked);
        assert_eq!(copy.value("p", &["a"]).unwrap(), 1.0);
    }

    #[test]
    fn test_native_view_bypasses_locks() {
        let mut store = SyncStore::new("db");
        store.lock_symbols();
        let mut native = store.native();
        native
            .ensure_symbol(Symbol::variable("x", 1, VarType::Positive, ""))
            .unwrap();
        native
            .write_record("x", vec!["a".into()], Record::Variable(LevelRecord::default()))
            .unwrap();
        assert_eq!(store.number_records("x").unwrap(), 1);
    }

    #[test]
    fn test_missing_symbol_is_named() {
        let store = SyncStore::new("db");
        let err = store.symbol("demand").unwrap_err();
        assert!(matches!(err, ModelError::SymbolNotFound(ref n) if n == "demand"));
    }
}
