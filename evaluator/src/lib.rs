// ctxeval — Context-sensitive snippet evaluation
//
// Library root. The core (everything except `sandbox`) is host-agnostic: it
// talks to a type system, a snippet compiler and an executor through the
// traits in `services`. `sandbox` is an in-memory host implementing them.

pub mod bridge;
pub mod cache;
pub mod diag;
pub mod error;
pub mod fingerprint;
pub mod invoke;
pub mod pipeline;
pub mod resolve;
pub mod sandbox;
pub mod services;
pub mod source;
pub mod symbols;
pub mod unit;
pub mod value;

pub use bridge::{DebuggerBridge, EntryPoint, ImplementationLocator, LoaderRegistry, ModuleContext};
pub use error::{EvalError, ExecutionFault, FaultKind};
pub use pipeline::{EvalRequest, Evaluator, EvaluatorOptions};
pub use value::{Instance, InstanceRef, Value};
