// check.rs — Sandbox snippet compiler
//
// Parses the snippet, checks every name against the symbols visible at the
// anchor, infers static types where operands are known, and derives the call
// shape from use: touching `this` or a field makes the unit instance-bound,
// reading a local or external symbol makes it take the runtime environment.
//
// Preconditions: the request's symbol table already includes the names of
//                external symbols.
// Postconditions: returns a unit carrying every issue found; the unit is
//                 valid iff no issue is an error.
// Failure modes: E0001 (lex/parse), E0101 (unknown name), E0102 (instance
//                access without an instance), E0201 (static type error).
// Side effects: increments the compile counter; registers the program so it
//               can be invalidated later.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

use super::ast::*;
use super::parser::{parse, to_span};
use super::types::SandboxTypes;
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::services::{CompileRequest, SnippetCompiler, TypeRef};
use crate::source::{NodeKind, Span};
use crate::symbols::{SymbolKind, SymbolTable};
use crate::unit::{CompiledUnit, UnitBody, UnitShape};
use crate::value::ValueType;

// ── Compiled program ────────────────────────────────────────────────────────

/// Body of a sandbox unit: the checked snippet plus how its free names bind.
#[derive(Debug)]
pub struct SandboxProgram {
    pub snippet: Snippet,
    /// Free names read from the enclosing instance. Everything else that is
    /// not `let`-bound is read from the runtime environment.
    pub instance_fields: HashSet<String>,
    /// Context the program was compiled against.
    pub context: Option<String>,
    invalidated: AtomicBool,
}

impl SandboxProgram {
    pub fn new(snippet: Snippet, instance_fields: HashSet<String>, context: Option<String>) -> Self {
        SandboxProgram {
            snippet,
            instance_fields,
            context,
            invalidated: AtomicBool::new(false),
        }
    }

    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }
}

impl UnitBody for SandboxProgram {
    fn is_valid(&self) -> bool {
        !self.invalidated.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ── Compiler ────────────────────────────────────────────────────────────────

pub struct SandboxCompiler {
    types: Arc<SandboxTypes>,
    compiles: AtomicUsize,
    programs: Mutex<Vec<Weak<SandboxProgram>>>,
}

impl SandboxCompiler {
    pub fn new(types: Arc<SandboxTypes>) -> Self {
        SandboxCompiler {
            types,
            compiles: AtomicUsize::new(0),
            programs: Mutex::new(Vec::new()),
        }
    }

    /// Number of `compile_snippet` calls so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Invalidate every live program compiled against `context` without
    /// touching the generation checksum. Returns how many were invalidated.
    pub fn invalidate_context(&self, context: &str) -> usize {
        let mut programs = self.programs.lock().unwrap_or_else(PoisonError::into_inner);
        programs.retain(|weak| weak.strong_count() > 0);
        let mut count = 0;
        for program in programs.iter().filter_map(Weak::upgrade) {
            if program.context.as_deref() == Some(context) {
                program.invalidate();
                count += 1;
            }
        }
        count
    }
}

impl SnippetCompiler for SandboxCompiler {
    fn symbol_table_at(&self, _top: &TypeRef, context: &TypeRef, offset: usize) -> SymbolTable {
        let mut table = SymbolTable::new();
        if let Some(def) = self.types.lookup_def(context.name()) {
            for field in def.fields {
                table.insert(field.name, field.ty, SymbolKind::Field);
            }
        }
        let Some(root) = context.source() else {
            return table;
        };
        let Some((_, path)) = root.deepest_at(offset) else {
            return table;
        };
        // Locals declared directly in an enclosing scope, up to the offset.
        for scope in root.walk_path(&path) {
            for child in &scope.children {
                if let NodeKind::Local { name, ty } = &child.kind {
                    if child.span.start <= offset {
                        table.insert(name.clone(), *ty, SymbolKind::Local);
                    }
                }
            }
        }
        table
    }

    fn compile_snippet(&self, request: &CompileRequest<'_>) -> CompiledUnit {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let fingerprint = *request.fingerprint;

        let parsed = parse(request.source);
        if !parsed.errors.is_empty() {
            let issues = parsed
                .errors
                .iter()
                .map(|e| Diagnostic::error(to_span(*e.span()), e.to_string()).with_code(codes::E0001))
                .collect();
            return CompiledUnit::invalid(fingerprint, issues);
        }
        let Some(snippet) = parsed.snippet else {
            let issue = Diagnostic::error(
                Span::new(0, request.source.len()),
                "snippet could not be parsed",
            )
            .with_code(codes::E0001);
            return CompiledUnit::invalid(fingerprint, vec![issue]);
        };

        let has_instance = match (request.context, request.anchor) {
            (Some(context), Some(anchor)) => context
                .source()
                .map_or(true, |root| !anchor.in_static_scope(root)),
            (Some(_), None) => true,
            (None, _) => false,
        };

        let mut checker = Checker {
            symbols: request.symbols,
            has_instance,
            lets: HashMap::new(),
            issues: Vec::new(),
            uses_instance: false,
            uses_env: false,
            instance_fields: HashSet::new(),
        };
        checker.check_snippet(&snippet);

        let Checker {
            issues,
            uses_instance,
            uses_env,
            instance_fields,
            ..
        } = checker;

        if issues.iter().any(Diagnostic::is_error) {
            debug!(unit = %fingerprint.unit_name(), issues = issues.len(), "snippet rejected");
            return CompiledUnit::invalid(fingerprint, issues);
        }

        let program = Arc::new(SandboxProgram::new(
            snippet,
            instance_fields,
            request.context.map(|c| c.name().to_string()),
        ));
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&program));

        CompiledUnit::valid(
            fingerprint,
            UnitShape::new(uses_instance, uses_env),
            program,
            issues,
        )
    }
}

// ── Checker ─────────────────────────────────────────────────────────────────

struct Checker<'a> {
    symbols: &'a SymbolTable,
    has_instance: bool,
    /// `let` names bound so far with their inferred types.
    lets: HashMap<String, ValueType>,
    issues: Vec<Diagnostic>,
    uses_instance: bool,
    uses_env: bool,
    instance_fields: HashSet<String>,
}

impl Checker<'_> {
    fn check_snippet(&mut self, snippet: &Snippet) {
        for binding in &snippet.lets {
            let ty = self.check_expr(&binding.value);
            let name = &binding.name.name;
            if self.symbols.contains(name) || self.lets.contains_key(name) {
                self.issues.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        binding.name.span,
                        format!("`{name}` shadows a visible symbol"),
                    )
                    .with_code(codes::W0301),
                );
            }
            self.lets.insert(name.clone(), ty);
        }
        if let Some(result) = &snippet.result {
            self.check_expr(result);
        }
    }

    fn require_instance(&mut self, span: Span, what: &str) -> bool {
        if self.has_instance {
            self.uses_instance = true;
            return true;
        }
        self.issues.push(
            Diagnostic::error(span, format!("{what} is not available without an enclosing instance"))
                .with_code(codes::E0102)
                .with_hint("evaluate inside a non-static context or pass the value as an external symbol"),
        );
        false
    }

    fn check_name(&mut self, ident: &Ident) -> ValueType {
        if let Some(ty) = self.lets.get(&ident.name) {
            return *ty;
        }
        let Some(info) = self.symbols.get(&ident.name) else {
            self.issues.push(
                Diagnostic::error(ident.span, format!("unknown name `{}`", ident.name))
                    .with_code(codes::E0101)
                    .with_hint(format!("pass `{}` as an external symbol", ident.name)),
            );
            return ValueType::Any;
        };
        match info.kind {
            SymbolKind::Field => {
                if self.require_instance(ident.span, &format!("field `{}`", ident.name)) {
                    self.instance_fields.insert(ident.name.clone());
                }
            }
            SymbolKind::Local | SymbolKind::External => self.uses_env = true,
        }
        info.ty
    }

    fn check_expr(&mut self, expr: &Expr) -> ValueType {
        match &expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Null => ValueType::Null,
                Literal::Bool(_) => ValueType::Bool,
                Literal::Int(_) => ValueType::Int,
                Literal::Float(_) => ValueType::Float,
                Literal::Str(_) => ValueType::Str,
            },
            ExprKind::Name(ident) => self.check_name(ident),
            ExprKind::This => {
                self.require_instance(expr.span, "`this`");
                ValueType::Object
            }
            ExprKind::Field(object, field) => {
                let ty = self.check_expr(object);
                if !matches!(ty, ValueType::Any | ValueType::Object) {
                    self.type_error(
                        field.span,
                        format!("no field `{}` on a value of type {ty}", field.name),
                    );
                }
                ValueType::Any
            }
            ExprKind::Unary(op, operand) => {
                let ty = self.check_expr(operand);
                match op {
                    UnOp::Neg if ty.is_numeric() || ty == ValueType::Any => ty,
                    UnOp::Not if matches!(ty, ValueType::Bool | ValueType::Any) => ValueType::Bool,
                    _ => {
                        self.type_error(expr.span, format!("cannot apply `{op}` to {ty}"));
                        ValueType::Any
                    }
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let l = self.check_expr(lhs);
                let r = self.check_expr(rhs);
                match binary_type(*op, l, r) {
                    Some(ty) => ty,
                    None => {
                        self.type_error(expr.span, format!("cannot apply `{op}` to {l} and {r}"));
                        ValueType::Any
                    }
                }
            }
        }
    }

    fn type_error(&mut self, span: Span, message: String) {
        self.issues
            .push(Diagnostic::error(span, message).with_code(codes::E0201));
    }
}

/// Static result type of `l op r`, or None if the operands can never work.
/// `any` operands defer the check to run time.
fn binary_type(op: BinOp, l: ValueType, r: ValueType) -> Option<ValueType> {
    use ValueType::*;
    match op {
        BinOp::Eq | BinOp::Ne => Some(Bool),
        BinOp::And | BinOp::Or => {
            (matches!(l, Bool | Any) && matches!(r, Bool | Any)).then_some(Bool)
        }
        _ if op.is_comparison() => match (l, r) {
            (Any, _) | (_, Any) => Some(Bool),
            (Str, Str) => Some(Bool),
            _ if l.is_numeric() && r.is_numeric() => Some(Bool),
            _ => None,
        },
        BinOp::Add if l == Str || r == Str => Some(Str),
        _ => match (l, r) {
            (Int, Int) => Some(Int),
            (Any, x) | (x, Any) if x.is_numeric() || x == Any => Some(Any),
            _ if l.is_numeric() && r.is_numeric() => Some(Float),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::sandbox::types::TypeDef;
    use crate::services::TypeSystem;
    use crate::source::{LexicalAnchor, SourceNode, Span};

    fn compile(
        compiler: &SandboxCompiler,
        source: &str,
        context: Option<&TypeRef>,
        symbols: &SymbolTable,
        anchor: Option<&LexicalAnchor>,
    ) -> CompiledUnit {
        let fingerprint = Fingerprint::compute(source, None, None, 0);
        compiler.compile_snippet(&CompileRequest {
            fingerprint: &fingerprint,
            source,
            context,
            symbols,
            anchor,
        })
    }

    fn top_level(source: &str, externals: &[&str]) -> CompiledUnit {
        let compiler = SandboxCompiler::new(Arc::new(SandboxTypes::new()));
        let mut symbols = SymbolTable::new();
        symbols.declare_external(externals.iter().copied());
        compile(&compiler, source, None, &symbols, None)
    }

    fn codes_of(unit: &CompiledUnit) -> Vec<&'static str> {
        unit.issues()
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    /// type Counter { fn bump { local step @10; <offset 30> } static fn make @50..90 }
    fn counter_types() -> Arc<SandboxTypes> {
        let types = Arc::new(SandboxTypes::new());
        let source = SourceNode::new(
            NodeKind::Type {
                name: "Counter".into(),
            },
            Span::new(0, 100),
        )
        .with_child(
            SourceNode::new(
                NodeKind::Function {
                    name: "bump".into(),
                    is_static: false,
                },
                Span::new(5, 45),
            )
            .with_child(SourceNode::new(
                NodeKind::Local {
                    name: "step".into(),
                    ty: ValueType::Int,
                },
                Span::new(10, 20),
            ))
            .with_child(SourceNode::new(
                NodeKind::Local {
                    name: "later".into(),
                    ty: ValueType::Int,
                },
                Span::new(35, 40),
            )),
        )
        .with_child(SourceNode::new(
            NodeKind::Function {
                name: "make".into(),
                is_static: true,
            },
            Span::new(50, 90),
        ));
        types.define(
            TypeDef::new("app.Counter")
                .with_source(source)
                .with_field("count", ValueType::Int),
        );
        types
    }

    #[test]
    fn literal_arithmetic_is_static() {
        let unit = top_level("1 + 1", &[]);
        assert!(unit.is_valid());
        assert_eq!(unit.shape(), UnitShape::Static);
    }

    #[test]
    fn external_symbol_takes_environment() {
        let unit = top_level("x + 1", &["x"]);
        assert!(unit.is_valid());
        assert_eq!(unit.shape(), UnitShape::StaticWithEnv);
    }

    #[test]
    fn unknown_names_are_all_reported() {
        let unit = top_level("a + b", &[]);
        assert!(!unit.is_valid());
        assert_eq!(codes_of(&unit), vec!["E0101", "E0101"]);
        assert_eq!(unit.issues()[1].span, Span::new(4, 5));
    }

    #[test]
    fn this_without_context_is_rejected() {
        let unit = top_level("this", &[]);
        assert_eq!(codes_of(&unit), vec!["E0102"]);
    }

    #[test]
    fn parse_errors_use_e0001() {
        let unit = top_level("1 +", &[]);
        assert!(!unit.is_valid());
        assert!(codes_of(&unit).iter().all(|c| *c == "E0001"));
    }

    #[test]
    fn literal_type_errors() {
        assert_eq!(codes_of(&top_level(r#""a" - 1"#, &[])), vec!["E0201"]);
        assert_eq!(codes_of(&top_level("!3", &[])), vec!["E0201"]);
        assert_eq!(codes_of(&top_level("true && 1", &[])), vec!["E0201"]);
        assert_eq!(codes_of(&top_level("(1).x", &[])), vec!["E0201"]);
    }

    #[test]
    fn dynamic_operands_defer_checks() {
        assert!(top_level("x - 1", &["x"]).is_valid());
        assert!(top_level("!x && y", &["x", "y"]).is_valid());
        assert!(top_level(r#""n=" + 1"#, &[]).is_valid());
    }

    #[test]
    fn let_binding_types_flow() {
        assert!(top_level("let a = 2; a * 3", &[]).is_valid());
        assert_eq!(codes_of(&top_level(r#"let s = "x"; s - 1"#, &[])), vec!["E0201"]);
    }

    #[test]
    fn shadowing_warns_but_stays_valid() {
        let unit = top_level("let x = 1; x", &["x"]);
        assert!(unit.is_valid());
        assert_eq!(codes_of(&unit), vec!["W0301"]);
    }

    #[test]
    fn symbol_table_has_fields_and_prior_locals() {
        let types = counter_types();
        let compiler = SandboxCompiler::new(types.clone());
        let counter = types.resolve_type("app.Counter").unwrap();

        let table = compiler.symbol_table_at(&counter, &counter, 30);
        assert_eq!(table.get("count").unwrap().kind, SymbolKind::Field);
        assert_eq!(table.get("step").unwrap().ty, ValueType::Int);
        assert!(!table.contains("later"));

        let in_make = compiler.symbol_table_at(&counter, &counter, 60);
        assert!(in_make.contains("count"));
        assert!(!in_make.contains("step"));
    }

    #[test]
    fn fields_make_unit_instance_bound() {
        let types = counter_types();
        let compiler = SandboxCompiler::new(types.clone());
        let counter = types.resolve_type("app.Counter").unwrap();
        let root = counter.source().unwrap().clone();
        let table = compiler.symbol_table_at(&counter, &counter, 30);
        let anchor = LexicalAnchor::locate("app.Counter", &root, 30).unwrap();

        let unit = compile(&compiler, "count + step", Some(&counter), &table, Some(&anchor));
        assert!(unit.is_valid());
        assert_eq!(unit.shape(), UnitShape::InstanceBoundWithEnv);

        let unit = compile(&compiler, "this.count", Some(&counter), &table, Some(&anchor));
        assert_eq!(unit.shape(), UnitShape::InstanceBound);
    }

    #[test]
    fn static_scope_has_no_instance() {
        let types = counter_types();
        let compiler = SandboxCompiler::new(types.clone());
        let counter = types.resolve_type("app.Counter").unwrap();
        let root = counter.source().unwrap().clone();
        let table = compiler.symbol_table_at(&counter, &counter, 60);
        let anchor = LexicalAnchor::locate("app.Counter", &root, 60).unwrap();

        let unit = compile(&compiler, "count", Some(&counter), &table, Some(&anchor));
        assert_eq!(codes_of(&unit), vec!["E0102"]);
    }

    #[test]
    fn compile_count_and_invalidation() {
        let types = counter_types();
        let compiler = SandboxCompiler::new(types.clone());
        let counter = types.resolve_type("app.Counter").unwrap();
        let table = compiler.symbol_table_at(&counter, &counter, 30);

        let unit = compile(&compiler, "1", Some(&counter), &table, None);
        let other = compile(&compiler, "2", None, &SymbolTable::new(), None);
        assert_eq!(compiler.compile_count(), 2);

        assert_eq!(compiler.invalidate_context("app.Counter"), 1);
        assert!(!unit.is_valid());
        assert!(other.is_valid());
    }
}
