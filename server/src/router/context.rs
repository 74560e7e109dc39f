//! Per-Dispatch Context
//!
//! Scratch space handlers use to pass auxiliary data to later handlers in
//! the same dispatch. Created fresh per `route` call and owned exclusively
//! by that call, so concurrent dispatches never share mutable state.

use std::collections::HashMap;

use serde_json::Value;

/// Mutable key/value scratch map scoped to a single dispatch.
#[derive(Debug, Default)]
pub struct DispatchContext {
    values: HashMap<String, Value>,
}

impl DispatchContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value for later handlers in this dispatch.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Read a value stored by an earlier handler.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove and return a stored value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut ctx = DispatchContext::new();
        assert!(ctx.is_empty());

        ctx.insert("count", 3);
        ctx.insert("user", "u1");
        assert_eq!(ctx.get("count"), Some(&Value::from(3)));
        assert_eq!(ctx.get("user"), Some(&Value::from("u1")));

        assert_eq!(ctx.remove("count"), Some(Value::from(3)));
        assert_eq!(ctx.get("count"), None);
    }
}
