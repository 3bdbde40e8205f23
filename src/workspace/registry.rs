use crate::core::{ModelError, Result};
use std::collections::HashSet;
use std::sync::Mutex;

/// Set of names in use for one kind of workspace object.
///
/// Names are only ever added; a name stays taken for the life of the workspace.
#[derive(Debug)]
pub struct NameRegistry {
    kind: &'static str,
    prefix: String,
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    names: HashSet<String>,
    counter: u64,
}

impl NameRegistry {
    pub fn new(kind: &'static str, prefix: impl Into<String>) -> Self {
        Self {
            kind,
            prefix: prefix.into(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Registers `name` or fails with a name collision.
    ///
    /// Names end up as file and directory names inside the working directory,
    /// so empty names, `.`, `..` and names with path separators are rejected.
    pub fn register(&self, name: &str) -> Result<()> {
        self.check_name(name)?;
        let mut state = self.state.lock()?;
        if !state.names.insert(name.to_string()) {
            return Err(ModelError::NameCollision {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Registers and returns the next generated name not yet taken.
    pub fn next_free(&self) -> Result<String> {
        let mut state = self.state.lock()?;
        loop {
            state.counter += 1;
            let candidate = format!("{}{}", self.prefix, state.counter);
            if state.names.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }
    }

    /// `next_free` when `name` is `None` or empty, `register` otherwise.
    pub fn claim(&self, name: Option<&str>) -> Result<String> {
        match name {
            Some(name) if !name.is_empty() => self.register(name).map(|_| name.to_string()),
            _ => self.next_free(),
        }
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock()?.names.contains(name))
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
        {
            return Err(ModelError::InvalidArgument(format!(
                "Invalid {} name '{}'",
                self.kind, name
            )));
        }
        Ok(())
    }
}
