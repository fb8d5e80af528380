// services.rs — Interfaces of the external collaborators
//
// The evaluator orchestrates three services it does not implement: the type
// system (lookup, generation checksum, include-all visibility), the snippet
// compiler, and the executor that instantiates and runs compiled units.
// `crate::sandbox` provides in-memory implementations of all three.

use std::fmt;
use std::sync::Arc;

use crate::error::ExecutionFault;
use crate::fingerprint::Fingerprint;
use crate::source::{LexicalAnchor, SourceNode};
use crate::symbols::{RuntimeEnv, SymbolTable};
use crate::unit::{CompiledUnit, ParamKind};
use crate::value::{InstanceRef, Value};

// ── Type system ─────────────────────────────────────────────────────────────

/// A type a snippet can be evaluated in the context of.
pub trait ContextType: Send + Sync + fmt::Debug {
    /// Fully qualified name.
    fn name(&self) -> &str;

    /// The lexically enclosing unit, for nested units such as closures.
    fn enclosing(&self) -> Option<TypeRef>;

    /// Source tree of this unit. None for synthetic units that were generated
    /// without a recorded location.
    fn source(&self) -> Option<&SourceNode>;
}

pub type TypeRef = Arc<dyn ContextType>;

pub trait TypeSystem: Send + Sync {
    fn resolve_type(&self, name: &str) -> Option<TypeRef>;

    /// Process-wide counter, bumped on every change to the type system.
    fn generation_checksum(&self) -> u64;

    /// Make every module visible to resolution. Reentrant; each call must be
    /// paired with `exit_include_all`.
    fn enter_include_all(&self);

    fn exit_include_all(&self);
}

/// Include-all mode held for the lifetime of the guard.
pub struct IncludeAllScope<'a> {
    types: &'a dyn TypeSystem,
}

impl<'a> IncludeAllScope<'a> {
    pub fn enter(types: &'a dyn TypeSystem) -> Self {
        types.enter_include_all();
        IncludeAllScope { types }
    }
}

impl Drop for IncludeAllScope<'_> {
    fn drop(&mut self) {
        self.types.exit_include_all();
    }
}

// ── Compiler ────────────────────────────────────────────────────────────────

/// Everything the compiler needs to compile one snippet in context.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    pub fingerprint: &'a Fingerprint,
    pub source: &'a str,
    /// None for top-level evaluation.
    pub context: Option<&'a TypeRef>,
    pub symbols: &'a SymbolTable,
    pub anchor: Option<&'a LexicalAnchor>,
}

pub trait SnippetCompiler: Send + Sync {
    /// Names visible at `offset` inside `context`, whose source belongs to
    /// the file of the top-level type `top`.
    fn symbol_table_at(&self, top: &TypeRef, context: &TypeRef, offset: usize) -> SymbolTable;

    /// Never fails: problems are reported as issues on an invalid unit.
    fn compile_snippet(&self, request: &CompileRequest<'_>) -> CompiledUnit;
}

// ── Executor ────────────────────────────────────────────────────────────────

/// One actual constructor argument.
#[derive(Debug)]
pub enum CallArg {
    Instance(InstanceRef),
    Environment(RuntimeEnv),
}

impl CallArg {
    pub fn kind(&self) -> ParamKind {
        match self {
            CallArg::Instance(_) => ParamKind::Instance,
            CallArg::Environment(_) => ParamKind::Environment,
        }
    }
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Instance(obj) => write!(f, "instance <{}>", obj.type_name()),
            CallArg::Environment(env) => write!(f, "environment [{} symbols]", env.len()),
        }
    }
}

pub trait Executor: Send + Sync {
    /// Construct `unit` from `args` (already matched to its shape) and run it.
    fn instantiate_and_run(
        &self,
        unit: &CompiledUnit,
        args: Vec<CallArg>,
    ) -> Result<Value, ExecutionFault>;
}
