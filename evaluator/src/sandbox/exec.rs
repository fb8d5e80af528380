// exec.rs — Sandbox executor
//
// Tree-walking interpreter for compiled sandbox programs. The unit's
// arguments (already matched to its shape) become the frame: the enclosing
// instance for field and `this` reads, the runtime environment for locals
// and external symbols.
//
// Failure modes: unbound symbol, missing field, type mismatch, division by
//                zero, integer overflow, and a host fault for units that were
//                not produced by the sandbox compiler.

use std::collections::HashMap;

use super::ast::*;
use super::check::SandboxProgram;
use crate::error::{ExecutionFault, FaultKind};
use crate::services::{CallArg, Executor};
use crate::symbols::RuntimeEnv;
use crate::unit::CompiledUnit;
use crate::value::{InstanceRef, Value};

#[derive(Debug, Default)]
pub struct SandboxExecutor;

impl SandboxExecutor {
    pub fn new() -> Self {
        SandboxExecutor
    }
}

impl Executor for SandboxExecutor {
    fn instantiate_and_run(
        &self,
        unit: &CompiledUnit,
        args: Vec<CallArg>,
    ) -> Result<Value, ExecutionFault> {
        let program = unit
            .body()
            .and_then(|body| body.as_any().downcast_ref::<SandboxProgram>())
            .ok_or_else(|| {
                ExecutionFault::new(
                    FaultKind::Host,
                    format!("unit {} has no sandbox program", unit.fingerprint().unit_name()),
                )
            })?;

        let mut frame = Frame {
            program,
            this: None,
            env: None,
            lets: HashMap::new(),
        };
        for arg in args {
            match arg {
                CallArg::Instance(obj) => frame.this = Some(obj),
                CallArg::Environment(env) => frame.env = Some(env),
            }
        }
        frame.run()
    }
}

// ── Frame ───────────────────────────────────────────────────────────────────

struct Frame<'a> {
    program: &'a SandboxProgram,
    this: Option<InstanceRef>,
    env: Option<RuntimeEnv>,
    lets: HashMap<String, Value>,
}

fn fault(kind: FaultKind, message: impl Into<String>) -> ExecutionFault {
    ExecutionFault::new(kind, message)
}

impl Frame<'_> {
    fn run(&mut self) -> Result<Value, ExecutionFault> {
        let program = self.program;
        let snippet = &program.snippet;
        for binding in &snippet.lets {
            let value = self.eval(&binding.value)?;
            self.lets.insert(binding.name.name.clone(), value);
        }
        match &snippet.result {
            Some(expr) => self.eval(expr),
            None => Ok(Value::Null),
        }
    }

    fn instance(&self) -> Result<&InstanceRef, ExecutionFault> {
        self.this
            .as_ref()
            .ok_or_else(|| fault(FaultKind::Host, "unit was run without its enclosing instance"))
    }

    fn read_name(&self, name: &str) -> Result<Value, ExecutionFault> {
        if let Some(value) = self.lets.get(name) {
            return Ok(value.clone());
        }
        if self.program.instance_fields.contains(name) {
            let this = self.instance()?;
            return this.field(name).ok_or_else(|| {
                fault(
                    FaultKind::MissingField,
                    format!("<{}> has no field `{name}`", this.type_name()),
                )
            });
        }
        self.env
            .as_ref()
            .and_then(|env| env.value(name))
            .cloned()
            .ok_or_else(|| fault(FaultKind::UnboundSymbol, format!("no value for `{name}`")))
    }

    fn eval(&self, expr: &Expr) -> Result<Value, ExecutionFault> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(x) => Value::Float(*x),
                Literal::Str(s) => Value::from(s.as_str()),
            }),
            ExprKind::Name(ident) => self.read_name(&ident.name),
            ExprKind::This => self.instance().map(|obj| Value::Object(obj.clone())),
            ExprKind::Field(object, field) => match self.eval(object)? {
                Value::Object(obj) => obj.field(&field.name).ok_or_else(|| {
                    fault(
                        FaultKind::MissingField,
                        format!("<{}> has no field `{}`", obj.type_name(), field.name),
                    )
                }),
                other => Err(fault(
                    FaultKind::TypeMismatch,
                    format!("cannot read field `{}` of {}", field.name, other.value_type()),
                )),
            },
            ExprKind::Unary(op, operand) => unary(*op, self.eval(operand)?),
            ExprKind::Binary(BinOp::And, lhs, rhs) => {
                if !self.eval_bool(lhs, BinOp::And)? {
                    return Ok(Value::Bool(false));
                }
                self.eval_bool(rhs, BinOp::And).map(Value::Bool)
            }
            ExprKind::Binary(BinOp::Or, lhs, rhs) => {
                if self.eval_bool(lhs, BinOp::Or)? {
                    return Ok(Value::Bool(true));
                }
                self.eval_bool(rhs, BinOp::Or).map(Value::Bool)
            }
            ExprKind::Binary(op, lhs, rhs) => binary(*op, self.eval(lhs)?, self.eval(rhs)?),
        }
    }

    fn eval_bool(&self, expr: &Expr, op: BinOp) -> Result<bool, ExecutionFault> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(fault(
                FaultKind::TypeMismatch,
                format!("`{op}` expects bool, found {}", other.value_type()),
            )),
        }
    }
}

// ── Operators ───────────────────────────────────────────────────────────────

fn unary(op: UnOp, value: Value) -> Result<Value, ExecutionFault> {
    match (op, value) {
        (UnOp::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| fault(FaultKind::Overflow, format!("-({n}) overflows"))),
        (UnOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, other) => Err(fault(
            FaultKind::TypeMismatch,
            format!("cannot apply `{op}` to {}", other.value_type()),
        )),
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ExecutionFault> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        BinOp::Ne => return Ok(Value::Bool(lhs != rhs)),
        _ => {}
    }
    if op == BinOp::Add && (matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_))) {
        return Ok(Value::from(format!("{lhs}{rhs}")));
    }
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_op(op, as_float(&lhs), as_float(&rhs))
        }
        (Value::Str(a), Value::Str(b)) if op.is_comparison() => Ok(Value::Bool(compare(op, a, b))),
        _ => Err(fault(
            FaultKind::TypeMismatch,
            format!(
                "cannot apply `{op}` to {} and {}",
                lhs.value_type(),
                rhs.value_type()
            ),
        )),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn compare<T: PartialOrd + ?Sized>(op: BinOp, a: &T, b: &T) -> bool {
    match op {
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        _ => a >= b,
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, ExecutionFault> {
    if op.is_comparison() {
        return Ok(Value::Bool(compare(op, &a, &b)));
    }
    if matches!(op, BinOp::Div | BinOp::Rem) && b == 0 {
        return Err(fault(FaultKind::DivisionByZero, format!("{a} {op} 0")));
    }
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => a.checked_div(b),
        BinOp::Rem => a.checked_rem(b),
        _ => {
            return Err(fault(
                FaultKind::TypeMismatch,
                format!("cannot apply `{op}` to int and int"),
            ))
        }
    };
    result
        .map(Value::Int)
        .ok_or_else(|| fault(FaultKind::Overflow, format!("{a} {op} {b} overflows")))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, ExecutionFault> {
    if op.is_comparison() {
        return Ok(Value::Bool(compare(op, &a, &b)));
    }
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        _ => {
            return Err(fault(
                FaultKind::TypeMismatch,
                format!("cannot apply `{op}` to numbers"),
            ))
        }
    };
    Ok(Value::Float(result))
}
