// error.rs — Evaluation error kinds
//
// Every failure of an evaluation surfaces as exactly one `EvalError`.
// Nothing is retried: the same inputs would reproduce the same error.

use std::fmt;

use crate::diag::Diagnostic;

/// Why no lexical anchor could be established for a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorFailure {
    /// Walked outward past the outermost unit without finding source.
    ChainExhausted,
    /// Walked more than the configured number of enclosing levels.
    DepthExceeded(usize),
    /// The offset lies outside the context's source tree.
    OffsetOutside(usize),
    /// The enclosing instance ran out of outer references at this level.
    MissingOuterInstance(usize),
}

impl fmt::Display for AnchorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorFailure::ChainExhausted => {
                write!(f, "no enclosing unit has a recorded source location")
            }
            AnchorFailure::DepthExceeded(depth) => {
                write!(f, "enclosing chain deeper than {depth} levels")
            }
            AnchorFailure::OffsetOutside(offset) => {
                write!(f, "offset {offset} is outside the context source")
            }
            AnchorFailure::MissingOuterInstance(level) => {
                write!(f, "enclosing instance has no outer reference at level {level}")
            }
        }
    }
}

/// Category of a failure raised while running a compiled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    UnboundSymbol,
    MissingField,
    TypeMismatch,
    DivisionByZero,
    Overflow,
    /// The executor could not instantiate the unit at all.
    Host,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::UnboundSymbol => "unbound symbol",
            FaultKind::MissingField => "missing field",
            FaultKind::TypeMismatch => "type mismatch",
            FaultKind::DivisionByZero => "division by zero",
            FaultKind::Overflow => "overflow",
            FaultKind::Host => "host failure",
        };
        f.write_str(name)
    }
}

/// A failure raised by the executor while running a unit.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ExecutionFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        ExecutionFault {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// All ways an evaluation can fail.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("unresolved context type `{name}`")]
    UnresolvedContext { name: String },

    #[error("no lexical anchor in `{context}`: {reason}")]
    NoAnchor {
        context: String,
        reason: AnchorFailure,
    },

    /// Every issue the compiler reported; the first one is the headline.
    #[error("compilation failed: {}", .issues.first().map(ToString::to_string).unwrap_or_default())]
    Compilation { issues: Vec<Diagnostic> },

    #[error("invocation shape mismatch: unit expects ({expected}), call supplies ({actual})")]
    InvocationShape { expected: String, actual: String },

    #[error("evaluation failed: {0}")]
    Execution(#[source] ExecutionFault),

    #[error("malformed external symbols: {reason}")]
    InvalidSymbolPairs { reason: String },

    /// Plumbing wrapper added when a call crosses a module boundary.
    #[error("forwarded through module `{module}`: {source}")]
    Forwarded {
        module: String,
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn first_issue(&self) -> Option<&Diagnostic> {
        match self {
            EvalError::Compilation { issues } => issues.first(),
            _ => None,
        }
    }

    /// Strip every `Forwarded` wrapper, returning the originating error.
    pub fn into_root_cause(self) -> EvalError {
        let mut err = self;
        while let EvalError::Forwarded { source, .. } = err {
            err = *source;
        }
        err
    }
}
