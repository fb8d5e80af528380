// Shared sandbox host used by the integration tests.
//
// `app.Counter` source layout (byte offsets):
//
//   0..100   type Counter
//     10..60   fn bump            (instance)
//       20..25   local step: int
//       30..55   block
//     60..90   static fn make
//       65..70   local seed: int
//
// `app.Counter.lambda_0` and `app.Counter.lambda_0.inner_1` are synthetic
// (no source) and nest inside `app.Counter`. `internal.Probe` is hidden.

#![allow(dead_code)]

use ctxeval::sandbox::{Sandbox, SandboxObject, TypeDef};
use ctxeval::source::{NodeKind, SourceNode, Span};
use ctxeval::value::ValueType;
use ctxeval::InstanceRef;

pub const IN_BUMP: usize = 40;
pub const IN_MAKE: usize = 66;

pub fn counter_source() -> SourceNode {
    SourceNode::new(NodeKind::Type { name: "Counter".into() }, Span::new(0, 100))
        .with_child(
            SourceNode::new(
                NodeKind::Function {
                    name: "bump".into(),
                    is_static: false,
                },
                Span::new(10, 60),
            )
            .with_child(SourceNode::new(
                NodeKind::Local {
                    name: "step".into(),
                    ty: ValueType::Int,
                },
                Span::new(20, 25),
            ))
            .with_child(SourceNode::new(NodeKind::Block, Span::new(30, 55))),
        )
        .with_child(
            SourceNode::new(
                NodeKind::Function {
                    name: "make".into(),
                    is_static: true,
                },
                Span::new(60, 90),
            )
            .with_child(SourceNode::new(
                NodeKind::Local {
                    name: "seed".into(),
                    ty: ValueType::Int,
                },
                Span::new(65, 70),
            )),
        )
}

pub fn counter_sandbox() -> Sandbox {
    let sandbox = Sandbox::new();
    let types = sandbox.types();
    types.define(
        TypeDef::new("app.Counter")
            .with_source(counter_source())
            .with_field("count", ValueType::Int)
            .with_field("label", ValueType::Str),
    );
    types.define(TypeDef::new("app.Counter.lambda_0").nested_in("app.Counter"));
    types.define(TypeDef::new("app.Counter.lambda_0.inner_1").nested_in("app.Counter.lambda_0"));
    types.define(
        TypeDef::new("internal.Probe")
            .with_source(SourceNode::new(
                NodeKind::Type { name: "Probe".into() },
                Span::new(0, 10),
            ))
            .hidden(),
    );
    sandbox
}

pub fn counter(count: i64) -> InstanceRef {
    SandboxObject::new("app.Counter")
        .with_field("count", count)
        .with_field("label", "clicks")
        .build()
}
