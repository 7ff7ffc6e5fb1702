//! Operation handlers and the table that names them.

use crate::value::LogicalValue;
use crate::{Result, RpcError};
use std::collections::HashMap;
use std::sync::Arc;

/// Failure raised by a handler, passed to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub kind: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HandlerError {}

pub type HandlerResult = std::result::Result<LogicalValue, HandlerError>;

/// A named operation.
///
/// Handlers may be invoked concurrently from several connections.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, args: Vec<LogicalValue>) -> HandlerResult;

    /// Number of arguments the handler expects, if fixed.
    fn arity(&self) -> Option<usize> {
        None
    }
}

impl<F> Handler for F
where
    F: Fn(Vec<LogicalValue>) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, args: Vec<LogicalValue>) -> HandlerResult {
        self(args)
    }
}

/// A handler that declares a fixed argument count.
pub struct WithArity<F> {
    arity: usize,
    inner: F,
}

impl<F> Handler for WithArity<F>
where
    F: Fn(Vec<LogicalValue>) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, args: Vec<LogicalValue>) -> HandlerResult {
        (self.inner)(args)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.arity)
    }
}

/// Wrap `f` so calls with any other argument count are rejected before it runs.
pub fn with_arity<F>(arity: usize, f: F) -> WithArity<F>
where
    F: Fn(Vec<LogicalValue>) -> HandlerResult + Send + Sync + 'static,
{
    WithArity { arity, inner: f }
}

/// Operation name to handler.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`; names are unique.
    pub fn insert(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RpcError::DuplicateHandler { name });
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Handler registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(args: Vec<LogicalValue>) -> HandlerResult {
        Ok(LogicalValue::Sequence(args))
    }

    #[test]
    fn test_closure_handler_has_no_arity() {
        let handler: Arc<dyn Handler> = Arc::new(echo);
        assert_eq!(handler.arity(), None);
        assert_eq!(
            handler.call(vec![LogicalValue::from(1i64)]).unwrap(),
            LogicalValue::Sequence(vec![LogicalValue::from(1i64)])
        );
    }

    #[test]
    fn test_with_arity_declares_count() {
        let handler = with_arity(2, echo);
        assert_eq!(handler.arity(), Some(2));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut table = HandlerTable::new();
        table.insert("echo", Arc::new(echo)).unwrap();

        let err = table.insert("echo", Arc::new(echo)).unwrap_err();
        assert!(matches!(err, RpcError::DuplicateHandler { ref name } if name == "echo"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_names_are_sorted() {
        let mut table = HandlerTable::new();
        table.insert("zeta", Arc::new(echo)).unwrap();
        table.insert("alpha", Arc::new(echo)).unwrap();
        assert_eq!(table.names(), vec!["alpha", "zeta"]);
        assert!(table.contains("zeta"));
        assert!(table.get("beta").is_none());
    }

    #[test]
    fn test_handler_error_display() {
        assert_eq!(
            HandlerError::type_error("bad arg").to_string(),
            "TypeError: bad arg"
        );
    }
}
