// unit.rs — Compiled units and their call shapes
//
// A compiled unit is immutable once the compiler returns it. Its shape says
// which arguments its constructor takes; the invoker matches call arguments
// against that shape instead of probing the unit at run time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::diag::Diagnostic;
use crate::fingerprint::Fingerprint;

/// One constructor parameter of a compiled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// The enclosing instance the snippet runs against.
    Instance,
    /// The runtime symbol environment.
    Environment,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Instance => f.write_str("instance"),
            ParamKind::Environment => f.write_str("environment"),
        }
    }
}

/// Generated call shape of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitShape {
    Static,
    StaticWithEnv,
    InstanceBound,
    InstanceBoundWithEnv,
}

impl UnitShape {
    pub fn new(instance_bound: bool, takes_env: bool) -> Self {
        match (instance_bound, takes_env) {
            (false, false) => UnitShape::Static,
            (false, true) => UnitShape::StaticWithEnv,
            (true, false) => UnitShape::InstanceBound,
            (true, true) => UnitShape::InstanceBoundWithEnv,
        }
    }

    pub fn is_instance_bound(self) -> bool {
        matches!(self, UnitShape::InstanceBound | UnitShape::InstanceBoundWithEnv)
    }

    /// Constructor parameters, in order.
    pub fn params(self) -> &'static [ParamKind] {
        match self {
            UnitShape::Static => &[],
            UnitShape::StaticWithEnv => &[ParamKind::Environment],
            UnitShape::InstanceBound => &[ParamKind::Instance],
            UnitShape::InstanceBoundWithEnv => &[ParamKind::Instance, ParamKind::Environment],
        }
    }
}

/// Executable payload of a unit, owned by whichever compiler produced it.
pub trait UnitBody: Send + Sync + fmt::Debug {
    /// False once the body has been invalidated out-of-band (e.g. a type it
    /// was compiled against was redefined).
    fn is_valid(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone)]
pub struct CompiledUnit {
    fingerprint: Fingerprint,
    shape: UnitShape,
    body: Option<Arc<dyn UnitBody>>,
    issues: Vec<Diagnostic>,
}

impl CompiledUnit {
    /// A runnable unit. Non-error issues (warnings) may be attached.
    pub fn valid(
        fingerprint: Fingerprint,
        shape: UnitShape,
        body: Arc<dyn UnitBody>,
        warnings: Vec<Diagnostic>,
    ) -> Self {
        CompiledUnit {
            fingerprint,
            shape,
            body: Some(body),
            issues: warnings,
        }
    }

    /// A unit that failed to compile.
    pub fn invalid(fingerprint: Fingerprint, issues: Vec<Diagnostic>) -> Self {
        CompiledUnit {
            fingerprint,
            shape: UnitShape::Static,
            body: None,
            issues,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn shape(&self) -> UnitShape {
        self.shape
    }

    pub fn body(&self) -> Option<&Arc<dyn UnitBody>> {
        self.body.as_ref()
    }

    pub fn issues(&self) -> &[Diagnostic] {
        &self.issues
    }

    /// Re-checks the body each call: validity can be revoked after caching.
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(Diagnostic::is_error)
            && self.body.as_ref().is_some_and(|b| b.is_valid())
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.issues.iter().filter(|d| d.is_error()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Span;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct Revocable(AtomicBool);

    impl UnitBody for Revocable {
        fn is_valid(&self) -> bool {
            !self.0.load(Ordering::SeqCst)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn fp() -> Fingerprint {
        Fingerprint::compute("1", None, None, 0)
    }

    #[test]
    fn shape_params_follow_tag() {
        assert!(UnitShape::Static.params().is_empty());
        assert_eq!(
            UnitShape::new(true, true).params(),
            &[ParamKind::Instance, ParamKind::Environment]
        );
        assert_eq!(UnitShape::new(false, true), UnitShape::StaticWithEnv);
        assert!(UnitShape::InstanceBound.is_instance_bound());
        assert!(!UnitShape::StaticWithEnv.is_instance_bound());
    }

    #[test]
    fn warnings_do_not_invalidate() {
        let warning = Diagnostic::new(crate::diag::DiagLevel::Warning, Span::new(0, 1), "w");
        let unit = CompiledUnit::valid(
            fp(),
            UnitShape::Static,
            Arc::new(Revocable::default()),
            vec![warning],
        );
        assert!(unit.is_valid());
        assert!(unit.errors().is_empty());
    }

    #[test]
    fn revoked_body_invalidates_unit() {
        let body = Arc::new(Revocable::default());
        let unit = CompiledUnit::valid(fp(), UnitShape::Static, body.clone(), Vec::new());
        assert!(unit.is_valid());
        body.0.store(true, Ordering::SeqCst);
        assert!(!unit.is_valid());
    }

    #[test]
    fn invalid_unit_has_no_body() {
        let unit = CompiledUnit::invalid(fp(), vec![Diagnostic::error(Span::new(0, 1), "bad")]);
        assert!(!unit.is_valid());
        assert!(unit.body().is_none());
        assert_eq!(unit.errors().len(), 1);
    }
}
