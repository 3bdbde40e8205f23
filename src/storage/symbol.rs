use crate::core::{EquType, LevelRecord, ModelError, Record, Result, SymbolKind, VarType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identity of one sync store instance. Duplicated stores get a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(Uuid);

impl StoreId {
    pub fn new() -> Self {
        StoreId(Uuid::new_v4())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store_{}", self.0.simple())
    }
}

/// Record key: one label per dimension.
pub type Keys = Vec<String>;

/// A named, fixed-dimension collection of records of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
    dim: usize,
    text: String,
    var_type: VarType,
    equ_type: EquType,
    records: BTreeMap<Keys, Record>,
}

impl Symbol {
    pub fn set(name: impl Into<String>, dim: usize, text: impl Into<String>) -> Self {
        Self::with_kind(name, SymbolKind::Set, dim, text)
    }

    pub fn parameter(name: impl Into<String>, dim: usize, text: impl Into<String>) -> Self {
        Self::with_kind(name, SymbolKind::Parameter, dim, text)
    }

    pub fn variable(
        name: impl Into<String>,
        dim: usize,
        var_type: VarType,
        text: impl Into<String>,
    ) -> Self {
        let mut symbol = Self::with_kind(name, SymbolKind::Variable, dim, text);
        symbol.var_type = var_type;
        symbol
    }

    pub fn equation(
        name: impl Into<String>,
        dim: usize,
        equ_type: EquType,
        text: impl Into<String>,
    ) -> Self {
        let mut symbol = Self::with_kind(name, SymbolKind::Equation, dim, text);
        symbol.equ_type = equ_type;
        symbol
    }

    fn with_kind(name: impl Into<String>, kind: SymbolKind, dim: usize, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            dim,
            text: text.into(),
            var_type: VarType::default(),
            equ_type: EquType::default(),
            records: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn var_type(&self) -> VarType {
        self.var_type
    }

    pub fn equ_type(&self) -> EquType {
        self.equ_type
    }

    pub fn number_records(&self) -> usize {
        self.records.len()
    }

    /// Record a freshly added key starts with.
    pub fn default_record(&self) -> Record {
        match self.kind {
            SymbolKind::Set => Record::Set {
                text: String::new(),
            },
            SymbolKind::Parameter => Record::Parameter { value: 0.0 },
            SymbolKind::Variable => Record::Variable(LevelRecord::for_variable(self.var_type)),
            SymbolKind::Equation => Record::Equation(LevelRecord::for_equation(self.equ_type)),
        }
    }

    pub fn find_record(&self, keys: &[&str]) -> Option<&Record> {
        self.records.get(&to_keys(keys))
    }

    pub fn records(&self) -> impl Iterator<Item = (&Keys, &Record)> {
        self.records.iter()
    }

    pub fn contains(&self, keys: &[String]) -> bool {
        self.records.contains_key(keys)
    }

    pub fn get(&self, keys: &[String]) -> Option<&Record> {
        self.records.get(keys)
    }

    /// Same name, kind and dimension.
    pub fn same_shape(&self, other: &Symbol) -> bool {
        self.name == other.name && self.kind == other.kind && self.dim == other.dim
    }

    pub(crate) fn check_keys(&self, keys: &[&str]) -> Result<()> {
        if keys.len() != self.dim {
            return Err(ModelError::InvalidArgument(format!(
                "Different dimensions for symbol '{}': {} vs. {}",
                self.name,
                keys.len(),
                self.dim
            )));
        }
        Ok(())
    }

    pub(crate) fn check_record(&self, record: &Record) -> Result<()> {
        if record.kind() != self.kind {
            return Err(ModelError::TypeMismatch(format!(
                "{} record does not fit {} '{}'",
                record.kind(),
                self.kind,
                self.name
            )));
        }
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, keys: &[String]) -> Option<&mut Record> {
        self.records.get_mut(keys)
    }

    pub(crate) fn insert(&mut self, keys: Keys, record: Record) -> Option<Record> {
        self.records.insert(keys, record)
    }

    pub(crate) fn remove(&mut self, keys: &[String]) -> Option<Record> {
        self.records.remove(keys)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

/// Lightweight handle naming a symbol inside one specific store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    store: StoreId,
    name: String,
    kind: SymbolKind,
    dim: usize,
}

impl SymbolRef {
    pub(crate) fn new(store: StoreId, symbol: &Symbol) -> Self {
        Self {
            store,
            name: symbol.name.clone(),
            kind: symbol.kind,
            dim: symbol.dim,
        }
    }

    pub fn store(&self) -> StoreId {
        self.store
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

pub(crate) fn to_keys(keys: &[&str]) -> Keys {
    keys.iter().map(|k| k.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_follows_kind() {
        let x = Symbol::variable("x", 2, VarType::Positive, "shipment");
        match x.default_record() {
            Record::Variable(rec) => {
                assert_eq!(rec.lower, 0.0);
                assert!(rec.upper.is_infinite());
            }
            other => panic!("unexpected record {other:?}"),
        }
        let p = Symbol::parameter("p", 0, "");
        assert_eq!(p.default_record(), Record::Parameter { value: 0.0 });
    }

    #[test]
    fn test_check_keys_rejects_wrong_dimension() {
        let c = Symbol::parameter("c", 2, "cost");
        assert!(c.check_keys(&["seattle", "chicago"]).is_ok());
        let err = c.check_keys(&["seattle"]).unwrap_err();
        assert!(err.to_string().contains("'c'"));
    }
}
