// resolve.rs — Context resolution for snippet evaluation
//
// Turns the (enclosing context, immediate context, offset) triple a debugger
// reports into something a compiler can work with: the context type that
// actually has source, the names visible at the offset, and the lexical
// anchor. Synthetic nested units (closures compiled without a location) are
// skipped by walking outward; the number of levels walked is returned so the
// caller can walk the enclosing instance outward by the same amount.
//
// Preconditions: the type system is in include-all mode if hidden types
//                must be resolvable.
// Postconditions: returns exactly one resolution or one error.
// Failure modes: UnresolvedContext, NoAnchor (chain exhausted, depth exceeded,
//                offset outside the context source).
// Side effects: none.

use tracing::debug;

use crate::error::{AnchorFailure, EvalError};
use crate::services::{SnippetCompiler, TypeRef, TypeSystem};
use crate::source::LexicalAnchor;
use crate::symbols::SymbolTable;
use crate::value::InstanceRef;

// ── Public types ────────────────────────────────────────────────────────────

/// Output of context resolution.
#[derive(Debug)]
pub struct Resolution {
    /// Context the snippet compiles against. None for top-level evaluation.
    pub context: Option<TypeRef>,
    pub symbols: SymbolTable,
    pub anchor: Option<LexicalAnchor>,
    /// Offset used for the anchor; 0 for top-level evaluation.
    pub offset: usize,
    /// Synthetic levels skipped between the immediate context and `context`.
    pub outer_hops: usize,
}

impl Resolution {
    /// Top-level evaluation: nothing visible, nothing to anchor.
    pub fn top_level() -> Self {
        Resolution {
            context: None,
            symbols: SymbolTable::new(),
            anchor: None,
            offset: 0,
            outer_hops: 0,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.context.is_none()
    }
}

// ── Resolver ────────────────────────────────────────────────────────────────

pub struct ContextResolver<'a> {
    types: &'a dyn TypeSystem,
    compiler: &'a dyn SnippetCompiler,
    max_depth: usize,
}

impl<'a> ContextResolver<'a> {
    pub fn new(types: &'a dyn TypeSystem, compiler: &'a dyn SnippetCompiler) -> Self {
        ContextResolver {
            types,
            compiler,
            max_depth: 64,
        }
    }

    /// Upper bound on outward walk steps before giving up.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn lookup(&self, name: &str) -> Result<TypeRef, EvalError> {
        self.types
            .resolve_type(name)
            .ok_or_else(|| EvalError::UnresolvedContext {
                name: name.to_string(),
            })
    }

    /// Resolve the evaluation context.
    ///
    /// Without an enclosing context the evaluation is top-level: the offset is
    /// ignored and no anchor is computed. A supplied immediate name must still
    /// resolve. With an enclosing context, a missing immediate name means the
    /// enclosing type itself.
    pub fn resolve(
        &self,
        enclosing: Option<&str>,
        immediate: Option<&str>,
        offset: usize,
    ) -> Result<Resolution, EvalError> {
        let Some(enclosing) = enclosing else {
            if let Some(name) = immediate {
                self.lookup(name)?;
            }
            return Ok(Resolution::top_level());
        };

        let top = self.lookup(enclosing)?;
        let immediate = match immediate {
            Some(name) => self.lookup(name)?,
            None => top.clone(),
        };

        let (context, outer_hops) = self.nearest_with_source(immediate)?;
        let symbols = self.compiler.symbol_table_at(&top, &context, offset);

        let root = context.source().ok_or_else(|| EvalError::NoAnchor {
            context: context.name().to_string(),
            reason: AnchorFailure::ChainExhausted,
        })?;
        let anchor = LexicalAnchor::locate(context.name(), root, offset).ok_or_else(|| {
            EvalError::NoAnchor {
                context: context.name().to_string(),
                reason: AnchorFailure::OffsetOutside(offset),
            }
        })?;
        debug!(context = context.name(), anchor = %anchor, symbols = symbols.len(), "context resolved");

        Ok(Resolution {
            context: Some(context),
            symbols,
            anchor: Some(anchor),
            offset,
            outer_hops,
        })
    }

    /// Walk outward from `start` until a unit with recorded source is found.
    fn nearest_with_source(&self, start: TypeRef) -> Result<(TypeRef, usize), EvalError> {
        let mut current = start;
        let mut hops = 0;
        while current.source().is_none() {
            if hops >= self.max_depth {
                return Err(EvalError::NoAnchor {
                    context: current.name().to_string(),
                    reason: AnchorFailure::DepthExceeded(self.max_depth),
                });
            }
            let outer = current.enclosing().ok_or_else(|| EvalError::NoAnchor {
                context: current.name().to_string(),
                reason: AnchorFailure::ChainExhausted,
            })?;
            hops += 1;
            debug!(from = current.name(), to = outer.name(), hops, "skipping synthetic context");
            current = outer;
        }
        Ok((current, hops))
    }
}

/// Follow `hops` declared outer references from `instance`.
///
/// No instance stays no instance: static contexts have nothing to walk.
pub fn walk_outer(
    instance: Option<InstanceRef>,
    hops: usize,
    context: &str,
) -> Result<Option<InstanceRef>, EvalError> {
    let Some(mut current) = instance else {
        return Ok(None);
    };
    for level in 1..=hops {
        current = current.outer().ok_or_else(|| EvalError::NoAnchor {
            context: context.to_string(),
            reason: AnchorFailure::MissingOuterInstance(level),
        })?;
        debug!(level, instance = current.type_name(), "walked to outer instance");
    }
    Ok(Some(current))
}
