// File: presencebot-core/src/template/context.rs

use std::collections::HashMap;
use std::fmt;

use crate::Error;

/// What a placeholder name is bound to.
pub enum Resolver {
    Literal(String),
    Thunk(Box<dyn Fn() -> String + Send + Sync>),
    Unary(Box<dyn Fn(&str) -> Result<String, Error> + Send + Sync>),
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Resolver::Thunk(_) => f.write_str("Thunk(..)"),
            Resolver::Unary(_) => f.write_str("Unary(..)"),
        }
    }
}

/// Variables available to a single render. Built fresh each time and thrown
/// away afterwards.
#[derive(Debug, Default)]
pub struct TemplateContext {
    vars: HashMap<String, Resolver>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(&mut self, name: impl Into<String>, value: impl ToString) -> &mut Self {
        self.vars.insert(name.into(), Resolver::Literal(value.to_string()));
        self
    }

    pub fn thunk<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.vars.insert(name.into(), Resolver::Thunk(Box::new(f)));
        self
    }

    pub fn unary<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&str) -> Result<String, Error> + Send + Sync + 'static,
    {
        self.vars.insert(name.into(), Resolver::Unary(Box::new(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Resolver> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Direct lookup: literals and zero-argument functions only.
    pub(crate) fn value(&self, name: &str) -> Option<String> {
        match self.vars.get(name)? {
            Resolver::Literal(v) => Some(v.clone()),
            Resolver::Thunk(f) => Some(f()),
            Resolver::Unary(_) => None,
        }
    }

    /// Invokes the one-argument function registered under `name`.
    /// `None` when nothing callable is registered there.
    pub(crate) fn call(&self, name: &str, arg: &str) -> Option<Result<String, Error>> {
        match self.vars.get(name)? {
            Resolver::Unary(f) => Some(f(arg)),
            _ => None,
        }
    }
}

impl From<HashMap<String, String>> for TemplateContext {
    fn from(values: HashMap<String, String>) -> Self {
        let vars = values
            .into_iter()
            .map(|(k, v)| (k, Resolver::Literal(v)))
            .collect();
        Self { vars }
    }
}
