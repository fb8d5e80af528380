// sandbox — In-memory host for the evaluator
//
// A small expression language plus an in-memory type system, compiler and
// executor that implement the service traits. Used by the `ctxeval` binary,
// the integration tests and the benchmarks.
//
// Snippet grammar:
//
//   snippet := ("let" IDENT "=" expr ";")* expr?
//   expr    := literal | IDENT | "this" | expr "." IDENT | "(" expr ")"
//            | unary expr | expr binop expr

pub mod ast;
pub mod check;
pub mod describe;
pub mod exec;
pub mod lexer;
pub mod parser;
pub mod types;

use std::sync::Arc;

pub use check::{SandboxCompiler, SandboxProgram};
pub use describe::{HostDescription, HostError, ObjectDef};
pub use exec::SandboxExecutor;
pub use types::{FieldDef, SandboxObject, SandboxType, SandboxTypes, TypeDef};

use crate::pipeline::{Evaluator, EvaluatorOptions};

/// The three sandbox services, wired together.
#[derive(Clone)]
pub struct Sandbox {
    types: Arc<SandboxTypes>,
    compiler: Arc<SandboxCompiler>,
    executor: Arc<SandboxExecutor>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        let types = Arc::new(SandboxTypes::new());
        Sandbox {
            compiler: Arc::new(SandboxCompiler::new(types.clone())),
            executor: Arc::new(SandboxExecutor::new()),
            types,
        }
    }

    pub fn types(&self) -> &Arc<SandboxTypes> {
        &self.types
    }

    pub fn compiler(&self) -> &Arc<SandboxCompiler> {
        &self.compiler
    }

    pub fn executor(&self) -> &Arc<SandboxExecutor> {
        &self.executor
    }

    pub fn evaluator(&self) -> Evaluator {
        self.evaluator_with(EvaluatorOptions::default())
    }

    pub fn evaluator_with(&self, options: EvaluatorOptions) -> Evaluator {
        Evaluator::new(
            self.types.clone(),
            self.compiler.clone(),
            self.executor.clone(),
        )
        .with_options(options)
    }
}
