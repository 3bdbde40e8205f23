use crate::core::{ModelError, Result};
use std::fmt;

/// Lifecycle of a model instance. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceState {
    #[default]
    Created,
    Instantiated,
}

impl InstanceState {
    /// Fails unless the instance is in `expected` state; `operation` names the caller.
    pub fn require(self, expected: InstanceState, operation: &str) -> Result<()> {
        if self == expected {
            return Ok(());
        }
        let reason = match expected {
            InstanceState::Created => "model instance is already instantiated",
            InstanceState::Instantiated => "model instance has not been instantiated",
        };
        Err(ModelError::StateViolation(format!(
            "Cannot {}: {}",
            operation, reason
        )))
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceState::Created => write!(f, "Created"),
            InstanceState::Instantiated => write!(f, "Instantiated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        assert!(InstanceState::Created.require(InstanceState::Created, "instantiate").is_ok());
        let err = InstanceState::Created
            .require(InstanceState::Instantiated, "solve")
            .unwrap_err();
        assert!(matches!(err, ModelError::StateViolation(ref m) if m.contains("Cannot solve")));
        assert!(
            InstanceState::Instantiated
                .require(InstanceState::Created, "instantiate")
                .is_err()
        );
    }
}
