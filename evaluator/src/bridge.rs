// bridge.rs — Entry point for callers attached through another module
//
// A debugger may reach the evaluator through a module (loader) other than the
// one that owns the live evaluator. The bridge asks an injected locator for
// the implementation visible through the caller's module, falls back to the
// local one, forwards the request, and strips forwarding wrappers from any
// failure so the caller sees the originating error.
//
// Preconditions: none.
// Postconditions: a returned error is never `Forwarded`; a `Compilation` error
//                 carries only its first issue.
// Failure modes: whatever the target evaluator reports.
// Side effects: logs a warning when falling back to the local implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::EvalError;
use crate::pipeline::{EvalRequest, Evaluator};
use crate::value::Value;

/// The module (loader) a caller is attached through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleContext {
    pub name: String,
}

impl ModuleContext {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleContext { name: name.into() }
    }
}

impl fmt::Display for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Something that can run an evaluation request.
pub trait EntryPoint: Send + Sync {
    /// Identifies the implementation for logging.
    fn implementation_id(&self) -> &str;

    fn run(&self, request: &EvalRequest) -> Result<Value, EvalError>;
}

impl EntryPoint for Evaluator {
    fn implementation_id(&self) -> &str {
        "local"
    }

    fn run(&self, request: &EvalRequest) -> Result<Value, EvalError> {
        self.evaluate(request)
    }
}

/// Finds the implementation visible through a module.
pub trait ImplementationLocator: Send + Sync {
    fn locate(&self, module: &ModuleContext) -> Option<Arc<dyn EntryPoint>>;
}

// ── Registry locator ────────────────────────────────────────────────────────

/// Entry point reached across a module boundary. Wraps every failure the way
/// a cross-loader call would.
struct ForwardingEntry {
    module: String,
    target: Arc<dyn EntryPoint>,
}

impl EntryPoint for ForwardingEntry {
    fn implementation_id(&self) -> &str {
        &self.module
    }

    fn run(&self, request: &EvalRequest) -> Result<Value, EvalError> {
        self.target
            .run(request)
            .map_err(|source| EvalError::Forwarded {
                module: self.module.clone(),
                source: Box::new(source),
            })
    }
}

/// Module name → implementation registered under it.
#[derive(Default)]
pub struct LoaderRegistry {
    entries: RwLock<HashMap<String, Arc<dyn EntryPoint>>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `target` as the implementation visible through `module`,
    /// replacing any earlier registration.
    pub fn register(&self, module: impl Into<String>, target: Arc<dyn EntryPoint>) {
        let module = module.into();
        let entry = Arc::new(ForwardingEntry {
            module: module.clone(),
            target,
        });
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module, entry);
    }

    pub fn unregister(&self, module: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(module)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImplementationLocator for LoaderRegistry {
    fn locate(&self, module: &ModuleContext) -> Option<Arc<dyn EntryPoint>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&module.name)
            .cloned()
    }
}

// ── Bridge ──────────────────────────────────────────────────────────────────

pub struct DebuggerBridge {
    local: Arc<dyn EntryPoint>,
    locator: Option<Arc<dyn ImplementationLocator>>,
}

impl DebuggerBridge {
    pub fn new(local: Arc<dyn EntryPoint>, locator: Arc<dyn ImplementationLocator>) -> Self {
        DebuggerBridge {
            local,
            locator: Some(locator),
        }
    }

    /// A bridge that always runs the local implementation.
    pub fn local_only(local: Arc<dyn EntryPoint>) -> Self {
        DebuggerBridge {
            local,
            locator: None,
        }
    }

    fn target_for(&self, module: &ModuleContext) -> Arc<dyn EntryPoint> {
        let Some(locator) = &self.locator else {
            return self.local.clone();
        };
        match locator.locate(module) {
            Some(target) => {
                debug!(module = %module, target = target.implementation_id(), "forwarding evaluation");
                target
            }
            None => {
                warn!(module = %module, "no evaluator visible through module; using local implementation");
                self.local.clone()
            }
        }
    }

    /// Evaluate `request` on behalf of a caller attached through `module`.
    pub fn evaluate(&self, module: &ModuleContext, request: &EvalRequest) -> Result<Value, EvalError> {
        self.target_for(module).run(request).map_err(surface)
    }
}

/// Reduce a forwarded failure to what the caller should see.
fn surface(err: EvalError) -> EvalError {
    match err.into_root_cause() {
        EvalError::Compilation { mut issues } => {
            issues.truncate(1);
            EvalError::Compilation { issues }
        }
        other => other,
    }
}
