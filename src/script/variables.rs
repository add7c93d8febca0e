//! Variable scopes
//!
//! Locals live for one script run; globals for the process. Lookups try
//! the local frame first.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::value::{Keyword, Value};
use crate::error::ScriptError;

/// Process-wide variable frame shared by every run
#[derive(Debug, Default)]
pub struct GlobalVariables {
    vars: RwLock<HashMap<String, Value>>,
}

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Set a global, returning the previous value
    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Variables visible to one script run
#[derive(Debug)]
pub struct VariableStore<'g> {
    locals: HashMap<String, Value>,
    globals: &'g GlobalVariables,
}

impl<'g> VariableStore<'g> {
    pub fn new(globals: &'g GlobalVariables) -> Self {
        Self {
            locals: HashMap::new(),
            globals,
        }
    }

    /// Look a name up, local frame first
    pub fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        self.globals
            .get(name)
            .ok_or_else(|| ScriptError::UnknownVariable(name.to_string()))
    }

    pub fn assign(&mut self, scope: Keyword, name: impl Into<String>, value: Value) {
        let name = name.into();
        tracing::debug!("{} {} = {}", scope.as_str(), name, value);
        match scope {
            Keyword::Local => {
                self.locals.insert(name, value);
            }
            Keyword::Global => {
                self.globals.set(name, value);
            }
        }
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_shadows_global() {
        let globals = GlobalVariables::new();
        globals.set("x", Value::number(1.0));

        let mut vars = VariableStore::new(&globals);
        assert_eq!(vars.lookup("x").unwrap(), Value::number(1.0));

        vars.assign(Keyword::Local, "x", Value::number(2.0));
        assert_eq!(vars.lookup("x").unwrap(), Value::number(2.0));
        assert_eq!(globals.get("x"), Some(Value::number(1.0)));
    }

    #[test]
    fn test_global_outlives_run() {
        let globals = GlobalVariables::new();
        {
            let mut vars = VariableStore::new(&globals);
            vars.assign(Keyword::Global, "team", Value::string("red"));
            vars.assign(Keyword::Local, "tmp", Value::string("gone"));
        }

        let vars = VariableStore::new(&globals);
        assert_eq!(vars.lookup("team").unwrap(), Value::string("red"));
        assert!(matches!(
            vars.lookup("tmp"),
            Err(ScriptError::UnknownVariable(name)) if name == "tmp"
        ));
        assert_eq!(globals.names(), vec!["team".to_string()]);
    }
}
