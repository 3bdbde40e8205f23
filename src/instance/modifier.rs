use crate::core::{ModelError, Result, SymbolKind, UpdateAction, UpdateType};
use crate::storage::{SymbolRef, SyncStore};
use std::fmt;

/// Binds one model symbol to the store symbol that supplies its values.
///
/// For parameters the model symbol is its own data symbol. Variables and
/// equations take an explicit action and a parameter holding the values.
/// Store ownership is checked when the instance is instantiated.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifier {
    symbol: SymbolRef,
    action: UpdateAction,
    data: SymbolRef,
    update_type: UpdateType,
}

impl Modifier {
    pub fn parameter(symbol: &SymbolRef) -> Result<Self> {
        if symbol.kind() != SymbolKind::Parameter {
            return Err(ModelError::TypeMismatch(format!(
                "Modifier symbol '{}' is a {}, expected a Parameter",
                symbol.name(),
                symbol.kind()
            )));
        }
        Ok(Self {
            symbol: symbol.clone(),
            action: UpdateAction::Param,
            data: symbol.clone(),
            update_type: UpdateType::default(),
        })
    }

    pub fn variable(symbol: &SymbolRef, action: UpdateAction, data: &SymbolRef) -> Result<Self> {
        Self::with_data(SymbolKind::Variable, symbol, action, data)
    }

    pub fn equation(symbol: &SymbolRef, action: UpdateAction, data: &SymbolRef) -> Result<Self> {
        if action.is_bound_action() {
            return Err(ModelError::InvalidArgument(format!(
                "Update action {} is not allowed for equation '{}'",
                action,
                symbol.name()
            )));
        }
        Self::with_data(SymbolKind::Equation, symbol, action, data)
    }

    fn with_data(
        expected: SymbolKind,
        symbol: &SymbolRef,
        action: UpdateAction,
        data: &SymbolRef,
    ) -> Result<Self> {
        if symbol.kind() != expected {
            return Err(ModelError::TypeMismatch(format!(
                "Modifier symbol '{}' is a {}, expected a {}",
                symbol.name(),
                symbol.kind(),
                expected
            )));
        }
        if action == UpdateAction::Param {
            return Err(ModelError::InvalidArgument(format!(
                "Update action Param requires a parameter, '{}' is a {}",
                symbol.name(),
                expected
            )));
        }
        if data.kind() != SymbolKind::Parameter {
            return Err(ModelError::TypeMismatch(format!(
                "Data symbol '{}' must be a Parameter",
                data.name()
            )));
        }
        if data.dim() != symbol.dim() {
            return Err(ModelError::InvalidArgument(format!(
                "Data symbol '{}' has dimension {}, '{}' has {}",
                data.name(),
                data.dim(),
                symbol.name(),
                symbol.dim()
            )));
        }
        if data.store() != symbol.store() {
            return Err(ModelError::InvalidArgument(format!(
                "Data symbol '{}' and modifier symbol '{}' belong to different stores",
                data.name(),
                symbol.name()
            )));
        }
        Ok(Self {
            symbol: symbol.clone(),
            action,
            data: data.clone(),
            update_type: UpdateType::default(),
        })
    }

    pub fn with_update_type(mut self, update_type: UpdateType) -> Self {
        self.update_type = update_type;
        self
    }

    pub fn is_parameter(&self) -> bool {
        self.symbol.kind() == SymbolKind::Parameter
    }

    pub fn is_variable(&self) -> bool {
        self.symbol.kind() == SymbolKind::Variable
    }

    pub fn is_equation(&self) -> bool {
        self.symbol.kind() == SymbolKind::Equation
    }

    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    pub fn data_symbol(&self) -> &SymbolRef {
        &self.data
    }

    pub fn action(&self) -> UpdateAction {
        self.action
    }

    pub fn update_type(&self) -> UpdateType {
        self.update_type
    }

    /// Same modifier pointing at the symbols of the same names in `store`.
    pub(crate) fn rebind(&self, store: &SyncStore) -> Result<Self> {
        let symbol = store.symbol_ref(self.symbol.name())?;
        let modifier = match symbol.kind() {
            SymbolKind::Parameter => Self::parameter(&symbol)?,
            SymbolKind::Variable => {
                Self::variable(&symbol, self.action, &store.symbol_ref(self.data.name())?)?
            }
            SymbolKind::Equation => {
                Self::equation(&symbol, self.action, &store.symbol_ref(self.data.name())?)?
            }
            SymbolKind::Set => {
                return Err(ModelError::TypeMismatch(format!(
                    "Symbol '{}' in store '{}' is a Set",
                    symbol.name(),
                    store.name()
                )));
            }
        };
        Ok(modifier.with_update_type(self.update_type))
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_parameter() {
            write!(f, "{}", self.symbol.name())
        } else {
            write!(f, "{}.{}({})", self.symbol.name(), self.action, self.data.name())
        }
    }
}
