// types.rs — In-memory type system and objects for the sandbox host
//
// Types are defined by name with an optional enclosing type, an optional
// source tree and declared fields. Every definition (and every explicit
// refresh) bumps the generation checksum. Hidden types resolve only while
// include-all mode is engaged.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::services::{ContextType, TypeRef, TypeSystem};
use crate::source::SourceNode;
use crate::value::{Instance, InstanceRef, Value, ValueType};

// ── Definitions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default = "any_type")]
    pub ty: ValueType,
}

fn any_type() -> ValueType {
    ValueType::Any
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub enclosing: Option<String>,
    /// None for synthetic units with no recorded location.
    #[serde(default)]
    pub source: Option<SourceNode>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub hidden: bool,
}

impl TypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        TypeDef {
            name: name.into(),
            enclosing: None,
            source: None,
            fields: Vec::new(),
            hidden: false,
        }
    }

    pub fn nested_in(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing = Some(enclosing.into());
        self
    }

    pub fn with_source(mut self, source: SourceNode) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    /// Only resolvable in include-all mode.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

// ── Type handles ────────────────────────────────────────────────────────────

type TypeTable = RwLock<HashMap<String, Arc<SandboxType>>>;

/// A defined type. Enclosing types are looked up by name on demand, so a
/// nested type may be defined before its enclosing type.
#[derive(Debug)]
pub struct SandboxType {
    def: TypeDef,
    table: Weak<TypeTable>,
}

impl SandboxType {
    pub fn def(&self) -> &TypeDef {
        &self.def
    }
}

impl ContextType for SandboxType {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn enclosing(&self) -> Option<TypeRef> {
        let name = self.def.enclosing.as_ref()?;
        let table = self.table.upgrade()?;
        let table = table.read().unwrap_or_else(PoisonError::into_inner);
        table.get(name).map(|ty| ty.clone() as TypeRef)
    }

    fn source(&self) -> Option<&SourceNode> {
        self.def.source.as_ref()
    }
}

// ── Type system ─────────────────────────────────────────────────────────────

pub struct SandboxTypes {
    table: Arc<TypeTable>,
    generation: AtomicU64,
    include_all: AtomicUsize,
}

impl Default for SandboxTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxTypes {
    pub fn new() -> Self {
        SandboxTypes {
            table: Arc::new(RwLock::new(HashMap::new())),
            generation: AtomicU64::new(0),
            include_all: AtomicUsize::new(0),
        }
    }

    /// Define or redefine a type. Bumps the generation.
    pub fn define(&self, def: TypeDef) {
        let name = def.name.clone();
        let ty = Arc::new(SandboxType {
            def,
            table: Arc::downgrade(&self.table),
        });
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), ty);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(name = %name, generation, "type defined");
    }

    /// Signal a type-system change without redefining anything.
    pub fn refresh(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn include_all_depth(&self) -> usize {
        self.include_all.load(Ordering::SeqCst)
    }

    /// Definition of `name`, regardless of visibility.
    pub fn lookup_def(&self, name: &str) -> Option<TypeDef> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|ty| ty.def.clone())
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TypeSystem for SandboxTypes {
    fn resolve_type(&self, name: &str) -> Option<TypeRef> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let ty = table.get(name)?;
        if ty.def.hidden && self.include_all_depth() == 0 {
            return None;
        }
        Some(ty.clone() as TypeRef)
    }

    fn generation_checksum(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn enter_include_all(&self) {
        self.include_all.fetch_add(1, Ordering::SeqCst);
    }

    fn exit_include_all(&self) {
        let balanced = self
            .include_all
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                depth.checked_sub(1)
            });
        if balanced.is_err() {
            warn!("include-all mode exited without a matching enter");
        }
    }
}

// ── Objects ─────────────────────────────────────────────────────────────────

/// A live object: named fields plus an optional declared outer instance.
#[derive(Debug)]
pub struct SandboxObject {
    type_name: String,
    fields: BTreeMap<String, Value>,
    outer: Option<InstanceRef>,
}

impl SandboxObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        SandboxObject {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
            outer: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_outer(mut self, outer: InstanceRef) -> Self {
        self.outer = Some(outer);
        self
    }

    pub fn build(self) -> InstanceRef {
        Arc::new(self)
    }
}

impl Instance for SandboxObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn outer(&self) -> Option<InstanceRef> {
        self.outer.clone()
    }
}
