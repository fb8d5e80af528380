// symbols.rs — Compile-time symbol tables and runtime symbol environments
//
// A `SymbolTable` is what the compiler may reference at the anchor: fields of
// the context, locals declared before the offset, and the names of external
// symbols supplied with the request. A `RuntimeEnv` holds the values of those
// external symbols for exactly one invocation.

use std::collections::{BTreeMap, HashMap};

use crate::error::EvalError;
use crate::value::{Value, ValueType};

// ── Compile-time ────────────────────────────────────────────────────────────

/// Where a visible name comes from, which decides how it is read at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Field of the enclosing instance.
    Field,
    /// Local variable declared in the context source before the anchor.
    Local,
    /// Supplied by the caller alongside the request.
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub name: String,
    pub ty: ValueType,
    pub kind: SymbolKind,
}

/// Names visible to a snippet at its lexical anchor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: BTreeMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a symbol, replacing any earlier symbol with the same name.
    pub fn insert(&mut self, name: impl Into<String>, ty: ValueType, kind: SymbolKind) {
        let name = name.into();
        self.symbols.insert(
            name.clone(),
            SymbolInfo {
                name,
                ty,
                kind,
            },
        );
    }

    /// Declare caller-supplied names. Locals and fields already visible at the
    /// anchor keep their declared type but are read from the environment.
    pub fn declare_external<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            match self.symbols.get_mut(name) {
                Some(info) => info.kind = SymbolKind::External,
                None => self.insert(name, ValueType::Any, SymbolKind::External),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// ── Runtime ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSymbol {
    pub declared_type: ValueType,
    pub value: Value,
}

/// Name → value bindings standing in for the live locals of the paused frame.
#[derive(Debug, Clone, Default)]
pub struct RuntimeEnv {
    symbols: HashMap<String, RuntimeSymbol>,
}

impl RuntimeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a flat `[name, value, name, value, ...]` sequence.
    ///
    /// Names must be strings. A repeated name keeps the last value.
    pub fn from_flat_pairs(pairs: &[Value]) -> Result<Self, EvalError> {
        if pairs.len() % 2 != 0 {
            return Err(EvalError::InvalidSymbolPairs {
                reason: format!("expected name/value pairs, got {} items", pairs.len()),
            });
        }
        let mut env = RuntimeEnv::new();
        for (index, pair) in pairs.chunks_exact(2).enumerate() {
            let name = pair[0].as_str().ok_or_else(|| EvalError::InvalidSymbolPairs {
                reason: format!(
                    "name at position {} is {}, not a string",
                    index * 2,
                    pair[0].value_type()
                ),
            })?;
            env.bind(name, pair[1].clone());
        }
        Ok(env)
    }

    /// Bind `name`, replacing any earlier binding. Every runtime symbol is
    /// declared `any`; its value carries the concrete type.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.symbols.insert(
            name.into(),
            RuntimeSymbol {
                declared_type: ValueType::Any,
                value,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeSymbol> {
        self.symbols.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.symbols.get(name).map(|s| &s.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for RuntimeEnv {
    fn from_iter<T: IntoIterator<Item = (S, Value)>>(iter: T) -> Self {
        let mut env = RuntimeEnv::new();
        for (name, value) in iter {
            env.bind(name, value);
        }
        env
    }
}
