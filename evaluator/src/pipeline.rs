// pipeline.rs — Evaluation orchestration
//
// One `Evaluator` per process owns the fingerprint cache and drives each
// request through: symbol binding → fingerprint → cache lookup → context
// resolution and compilation on a miss → outer-instance walk → invocation.
//
// Preconditions: collaborators are thread-safe; `evaluate` may be called from
//                any thread concurrently.
// Postconditions: returns the snippet value or exactly one EvalError; the
//                 include-all scope is released on every path.
// Failure modes: every EvalError kind except Forwarded.
// Side effects: compiles through the compiler service, mutates the shared
//               cache, runs code through the executor.

use std::sync::Arc;

use tracing::debug;

use crate::cache::FingerprintCache;
use crate::diag::Diagnostic;
use crate::error::EvalError;
use crate::fingerprint::Fingerprint;
use crate::invoke::Invoker;
use crate::resolve::{walk_outer, ContextResolver};
use crate::services::{CompileRequest, Executor, IncludeAllScope, SnippetCompiler, TypeSystem};
use crate::source::Span;
use crate::symbols::RuntimeEnv;
use crate::unit::CompiledUnit;
use crate::value::{InstanceRef, Value};

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    /// Upper bound on synthetic levels walked while resolving a context.
    pub max_context_depth: usize,
    /// When false, every evaluation compiles and nothing is stored.
    pub cache_enabled: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        EvaluatorOptions {
            max_context_depth: 64,
            cache_enabled: true,
        }
    }
}

// ── Request ─────────────────────────────────────────────────────────────────

/// One evaluation request, as a debugger would issue it at a breakpoint.
#[derive(Debug, Clone, Default)]
pub struct EvalRequest {
    pub source: String,
    /// Top-level type enclosing the paused position. None evaluates top-level.
    pub enclosing_context: Option<String>,
    /// Type immediately enclosing the position; defaults to the enclosing one.
    pub immediate_context: Option<String>,
    pub offset: usize,
    /// Instance of the immediate context at the paused frame.
    pub this: Option<InstanceRef>,
    /// Flat `[name, value, name, value, ...]` external symbols.
    pub symbols: Vec<Value>,
}

impl EvalRequest {
    pub fn new(source: impl Into<String>) -> Self {
        EvalRequest {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn in_context(
        mut self,
        enclosing: impl Into<String>,
        immediate: Option<&str>,
        offset: usize,
    ) -> Self {
        self.enclosing_context = Some(enclosing.into());
        self.immediate_context = immediate.map(String::from);
        self.offset = offset;
        self
    }

    pub fn with_this(mut self, this: InstanceRef) -> Self {
        self.this = Some(this);
        self
    }

    pub fn with_symbol(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.symbols.push(Value::from(name));
        self.symbols.push(value.into());
        self
    }

    pub fn with_flat_symbols(mut self, pairs: Vec<Value>) -> Self {
        self.symbols = pairs;
        self
    }

    /// Cache key: snippet, contexts, offset and the external symbol names.
    pub fn fingerprint(&self) -> Fingerprint {
        let names = self.symbols.iter().step_by(2).filter_map(Value::as_str);
        self.fingerprint_with(names)
    }

    fn fingerprint_with<'a>(&self, externals: impl IntoIterator<Item = &'a str>) -> Fingerprint {
        Fingerprint::compute(
            &self.source,
            self.enclosing_context.as_deref(),
            self.immediate_context.as_deref(),
            self.offset,
        )
        .with_externals(externals)
    }
}

// ── Evaluator ───────────────────────────────────────────────────────────────

/// A compiled unit plus what is needed to bind it on a cache hit.
#[derive(Debug)]
pub struct CachedUnit {
    pub unit: CompiledUnit,
    /// Outer references to follow from the supplied instance.
    pub outer_hops: usize,
    /// Name of the context the unit was compiled against.
    pub context: Option<String>,
}

pub struct Evaluator {
    types: Arc<dyn TypeSystem>,
    compiler: Arc<dyn SnippetCompiler>,
    executor: Arc<dyn Executor>,
    cache: FingerprintCache<CachedUnit>,
    options: EvaluatorOptions,
}

impl Evaluator {
    pub fn new(
        types: Arc<dyn TypeSystem>,
        compiler: Arc<dyn SnippetCompiler>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Evaluator {
            types,
            compiler,
            executor,
            cache: FingerprintCache::new(),
            options: EvaluatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EvaluatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    pub fn cache(&self) -> &FingerprintCache<CachedUnit> {
        &self.cache
    }

    /// Evaluate `request` and return the snippet's value.
    pub fn evaluate(&self, request: &EvalRequest) -> Result<Value, EvalError> {
        let env = RuntimeEnv::from_flat_pairs(&request.symbols)?;
        let compiled = self.compiled_unit(request, &env)?;
        let context = compiled.context.as_deref().unwrap_or("<top level>");
        let this = walk_outer(request.this.clone(), compiled.outer_hops, context)?;
        Invoker::new(self.executor.as_ref()).invoke(&compiled.unit, this, env)
    }

    /// Cached unit for `request`, compiling on a miss or when the cached unit
    /// was invalidated. Fails with `Compilation` if the unit is invalid.
    pub fn compiled_unit(
        &self,
        request: &EvalRequest,
        env: &RuntimeEnv,
    ) -> Result<Arc<CachedUnit>, EvalError> {
        let fingerprint = request.fingerprint_with(env.names());
        let _scope = IncludeAllScope::enter(self.types.as_ref());
        // Read once: the unit is stored under the generation it compiled against.
        let generation = self.types.generation_checksum();

        if self.options.cache_enabled {
            match self.cache.get(&fingerprint, generation) {
                Some(hit) if hit.unit.is_valid() => {
                    debug!(unit = %fingerprint.unit_name(), generation, "cache hit");
                    return Ok(hit);
                }
                Some(_) => {
                    debug!(unit = %fingerprint.unit_name(), "cached unit invalid; recompiling")
                }
                None => debug!(unit = %fingerprint.unit_name(), generation, "cache miss"),
            }
        }

        let resolution = ContextResolver::new(self.types.as_ref(), self.compiler.as_ref())
            .with_max_depth(self.options.max_context_depth)
            .resolve(
                request.enclosing_context.as_deref(),
                request.immediate_context.as_deref(),
                request.offset,
            )?;
        let mut symbols = resolution.symbols;
        symbols.declare_external(env.names());

        let unit = self.compiler.compile_snippet(&CompileRequest {
            fingerprint: &fingerprint,
            source: &request.source,
            context: resolution.context.as_ref(),
            symbols: &symbols,
            anchor: resolution.anchor.as_ref(),
        });
        debug!(
            unit = %fingerprint.unit_name(),
            valid = unit.is_valid(),
            issues = unit.issues().len(),
            shape = ?unit.shape(),
            "snippet compiled"
        );

        let compiled = Arc::new(CachedUnit {
            unit,
            outer_hops: resolution.outer_hops,
            context: resolution.context.as_ref().map(|c| c.name().to_string()),
        });
        if self.options.cache_enabled {
            self.cache.put(fingerprint, compiled.clone(), generation);
        }

        if !compiled.unit.is_valid() {
            let mut issues = compiled.unit.errors();
            if issues.is_empty() {
                issues.push(Diagnostic::error(
                    Span::new(0, request.source.len()),
                    "compiled unit was invalidated before it could run",
                ));
            }
            return Err(EvalError::Compilation { issues });
        }
        Ok(compiled)
    }
}
