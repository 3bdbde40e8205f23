use super::types::{EquType, SymbolKind, VarType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest representable non-zero; distinguishes "explicit zero" from "no record".
pub const EPS: f64 = f64::MIN_POSITIVE;
pub const NA: f64 = f64::NAN;
pub const INF: f64 = f64::INFINITY;
pub const MINUS_INF: f64 = f64::NEG_INFINITY;
pub const UNDEF: f64 = 1.0e300;

/// Attributes of a variable or equation record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub level: f64,
    pub marginal: f64,
    pub lower: f64,
    pub upper: f64,
    pub scale: f64,
}

impl LevelRecord {
    pub fn with_bounds(lower: f64, upper: f64) -> Self {
        Self {
            level: 0.0,
            marginal: 0.0,
            lower,
            upper,
            scale: 1.0,
        }
    }

    pub fn for_variable(var_type: VarType) -> Self {
        let (lower, upper) = var_type.default_bounds();
        Self::with_bounds(lower, upper)
    }

    pub fn for_equation(equ_type: EquType) -> Self {
        let (lower, upper) = equ_type.default_bounds();
        Self::with_bounds(lower, upper)
    }

    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }
}

impl Default for LevelRecord {
    fn default() -> Self {
        Self::with_bounds(MINUS_INF, INF)
    }
}

/// One record of a symbol. The shape is fixed by the owning symbol's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Set { text: String },
    Parameter { value: f64 },
    Variable(LevelRecord),
    Equation(LevelRecord),
}

impl Record {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Record::Set { .. } => SymbolKind::Set,
            Record::Parameter { .. } => SymbolKind::Parameter,
            Record::Variable(_) => SymbolKind::Variable,
            Record::Equation(_) => SymbolKind::Equation,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Record::Parameter { value } => Some(*value),
            _ => None,
        }
    }

    pub fn levels(&self) -> Option<&LevelRecord> {
        match self {
            Record::Variable(rec) | Record::Equation(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn levels_mut(&mut self) -> Option<&mut LevelRecord> {
        match self {
            Record::Variable(rec) | Record::Equation(rec) => Some(rec),
            _ => None,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Set { text } if text.is_empty() => write!(f, "yes"),
            Record::Set { text } => write!(f, "'{}'", text),
            Record::Parameter { value } => write!(f, "{}", value),
            Record::Variable(r) | Record::Equation(r) => write!(
                f,
                "level={} marginal={} lower={} upper={} scale={}",
                r.level, r.marginal, r.lower, r.upper, r.scale
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eps_is_positive_and_tiny() {
        assert!(EPS > 0.0);
        assert!(EPS < 1e-300);
    }

    #[test]
    fn test_variable_default_bounds() {
        let rec = LevelRecord::for_variable(VarType::Positive);
        assert_eq!(rec.lower, 0.0);
        assert_eq!(rec.upper, INF);
        assert_eq!(rec.scale, 1.0);
        assert!(!rec.is_fixed());
    }

    #[test]
    fn test_record_kind_probes() {
        assert_eq!(Record::Parameter { value: 2.0 }.value(), Some(2.0));
        assert!(Record::Set { text: String::new() }.levels().is_none());
        assert_eq!(
            Record::Equation(LevelRecord::for_equation(EquType::E)).kind(),
            SymbolKind::Equation
        );
    }
}
