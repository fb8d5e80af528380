// invoke.rs — Argument binding and invocation of compiled units
//
// Builds the actual constructor arguments for a unit from its shape, checks
// them against the parameters the unit declares, and hands the unit to the
// executor. The only tolerated mismatch is a call that supplies the instance
// but omits the trailing runtime environment.
//
// Preconditions: `unit` is valid.
// Postconditions: returns the unit's value or exactly one EvalError.
// Failure modes: InvocationShape (contract violation between compiler and
//                invoker), Execution (any fault raised while running).
// Side effects: whatever the executor does.

use crate::error::EvalError;
use crate::services::{CallArg, Executor};
use crate::symbols::RuntimeEnv;
use crate::unit::{CompiledUnit, ParamKind, UnitShape};
use crate::value::{InstanceRef, Value};

fn describe_params(params: &[ParamKind]) -> String {
    params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_args(args: &[CallArg]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Match `actual` against `expected`.
///
/// An exact match passes through. If `actual` is non-empty and exactly one
/// trailing `Environment` parameter is missing, `env` is appended. Everything
/// else is an `InvocationShape` error naming both lists.
pub fn match_call_shape(
    expected: &[ParamKind],
    mut actual: Vec<CallArg>,
    env: Option<RuntimeEnv>,
) -> Result<Vec<CallArg>, EvalError> {
    let kinds_match = |args: &[CallArg], params: &[ParamKind]| {
        args.len() == params.len() && args.iter().zip(params).all(|(a, p)| a.kind() == *p)
    };

    if kinds_match(&actual, expected) {
        return Ok(actual);
    }
    if let (Some((ParamKind::Environment, leading)), Some(env)) = (expected.split_last(), env) {
        if !actual.is_empty() && kinds_match(&actual, leading) {
            actual.push(CallArg::Environment(env));
            return Ok(actual);
        }
    }
    Err(EvalError::InvocationShape {
        expected: describe_params(expected),
        actual: describe_args(&actual),
    })
}

pub struct Invoker<'a> {
    executor: &'a dyn Executor,
}

impl<'a> Invoker<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Invoker { executor }
    }

    /// Run `unit` against `this` with `env` as its runtime symbols.
    ///
    /// Static units never receive the instance. Instance-bound units receive
    /// `this` first; their environment is appended by shape matching.
    pub fn invoke(
        &self,
        unit: &CompiledUnit,
        this: Option<InstanceRef>,
        env: RuntimeEnv,
    ) -> Result<Value, EvalError> {
        let (actual, env) = match unit.shape() {
            UnitShape::Static => (Vec::new(), Some(env)),
            UnitShape::StaticWithEnv => (vec![CallArg::Environment(env)], None),
            UnitShape::InstanceBound | UnitShape::InstanceBoundWithEnv => (
                this.map(CallArg::Instance).into_iter().collect(),
                Some(env),
            ),
        };
        let args = match_call_shape(unit.shape().params(), actual, env)?;
        self.executor
            .instantiate_and_run(unit, args)
            .map_err(EvalError::Execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionFault, FaultKind};
    use crate::fingerprint::Fingerprint;
    use crate::unit::UnitBody;
    use crate::value::Instance;
    use std::any::Any;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct Obj;

    impl Instance for Obj {
        fn type_name(&self) -> &str {
            "Obj"
        }
        fn field(&self, _name: &str) -> Option<Value> {
            None
        }
        fn outer(&self) -> Option<InstanceRef> {
            None
        }
    }

    #[derive(Debug)]
    struct NoBody;

    impl UnitBody for NoBody {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Records the argument kinds it was called with.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<ParamKind>>>,
        fail: bool,
    }

    impl Executor for Recorder {
        fn instantiate_and_run(
            &self,
            _unit: &CompiledUnit,
            args: Vec<CallArg>,
        ) -> Result<Value, ExecutionFault> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(CallArg::kind).collect());
            if self.fail {
                Err(ExecutionFault::new(FaultKind::DivisionByZero, "1 / 0"))
            } else {
                Ok(Value::Int(args.len() as i64))
            }
        }
    }

    fn unit(shape: UnitShape) -> CompiledUnit {
        CompiledUnit::valid(
            Fingerprint::compute("u", None, None, 0),
            shape,
            Arc::new(NoBody),
            Vec::new(),
        )
    }

    fn obj() -> InstanceRef {
        Arc::new(Obj)
    }

    #[test]
    fn exact_match_passes_through() {
        let args = match_call_shape(&[ParamKind::Instance], vec![CallArg::Instance(obj())], None)
            .unwrap();
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn missing_trailing_environment_is_appended() {
        let args = match_call_shape(
            &[ParamKind::Instance, ParamKind::Environment],
            vec![CallArg::Instance(obj())],
            Some(RuntimeEnv::new()),
        )
        .unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].kind(), ParamKind::Environment);
    }

    #[test]
    fn environment_alone_without_instance_is_rejected() {
        let err =
            match_call_shape(&[ParamKind::Environment], Vec::new(), Some(RuntimeEnv::new()))
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invocation shape mismatch: unit expects (environment), call supplies ()"
        );
    }

    #[test]
    fn two_missing_parameters_are_rejected() {
        let err = match_call_shape(
            &[ParamKind::Instance, ParamKind::Environment],
            Vec::new(),
            Some(RuntimeEnv::new()),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::InvocationShape { .. }));
    }

    #[test]
    fn surplus_argument_is_rejected() {
        let err = match_call_shape(&[], vec![CallArg::Instance(obj())], None).unwrap_err();
        match err {
            EvalError::InvocationShape { expected, actual } => {
                assert_eq!(expected, "");
                assert_eq!(actual, "instance <Obj>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invoker_builds_arguments_per_shape() {
        let exec = Recorder::default();
        let invoker = Invoker::new(&exec);
        invoker
            .invoke(&unit(UnitShape::Static), Some(obj()), RuntimeEnv::new())
            .unwrap();
        invoker
            .invoke(&unit(UnitShape::StaticWithEnv), None, RuntimeEnv::new())
            .unwrap();
        invoker
            .invoke(&unit(UnitShape::InstanceBoundWithEnv), Some(obj()), RuntimeEnv::new())
            .unwrap();

        let calls = exec.calls.lock().unwrap();
        assert_eq!(calls[0], Vec::<ParamKind>::new());
        assert_eq!(calls[1], vec![ParamKind::Environment]);
        assert_eq!(calls[2], vec![ParamKind::Instance, ParamKind::Environment]);
    }

    #[test]
    fn instance_bound_without_instance_never_reaches_executor() {
        let exec = Recorder::default();
        let err = Invoker::new(&exec)
            .invoke(&unit(UnitShape::InstanceBound), None, RuntimeEnv::new())
            .unwrap_err();
        assert!(matches!(err, EvalError::InvocationShape { .. }));
        assert!(exec.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn executor_fault_is_wrapped_with_cause() {
        let exec = Recorder {
            fail: true,
            ..Default::default()
        };
        let err = Invoker::new(&exec)
            .invoke(&unit(UnitShape::Static), None, RuntimeEnv::new())
            .unwrap_err();
        match err {
            EvalError::Execution(fault) => assert_eq!(fault.kind, FaultKind::DivisionByZero),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
