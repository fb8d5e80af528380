// describe.rs — JSON description of a sandbox host
//
// A host file lists type definitions and an object graph:
//
//   {
//     "types":   [ { "name": "app.Counter", "fields": [...], "source": {...} } ],
//     "objects": [ { "id": "c", "type": "app.Counter",
//                    "fields": { "count": 3, "owner": { "ref": "o" } },
//                    "outer": "o" } ]
//   }
//
// Field values are JSON scalars or `{ "ref": ID }` references to other
// objects. Objects are built in dependency order; reference cycles are
// rejected because instances are immutable once built.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::{SandboxObject, SandboxTypes, TypeDef};
use crate::value::{InstanceRef, Value};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("cannot read host file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid host description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object `{referenced_by}` refers to unknown object `{id}`")]
    UnknownObject { id: String, referenced_by: String },

    #[error("field `{field}` of object `{object}` has an unsupported value")]
    UnsupportedValue { object: String, field: String },

    #[error("object `{id}` is part of a reference cycle")]
    Cycle { id: String },

    #[error("duplicate object id `{id}`")]
    DuplicateObject { id: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDescription {
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Id of the object this one is nested in.
    #[serde(default)]
    pub outer: Option<String>,
}

impl HostDescription {
    pub fn from_json(text: &str) -> Result<Self, HostError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Define every type in `types` and build the object graph, returning
    /// objects by id.
    pub fn install(&self, types: &SandboxTypes) -> Result<HashMap<String, InstanceRef>, HostError> {
        for def in &self.types {
            types.define(def.clone());
        }

        let mut defs: HashMap<&str, &ObjectDef> = HashMap::new();
        for object in &self.objects {
            if defs.insert(object.id.as_str(), object).is_some() {
                return Err(HostError::DuplicateObject {
                    id: object.id.clone(),
                });
            }
        }

        let mut builder = GraphBuilder {
            defs: &defs,
            built: HashMap::new(),
            in_progress: HashSet::new(),
        };
        for object in &self.objects {
            builder.build(&object.id, &object.id)?;
        }
        Ok(builder.built)
    }
}

struct GraphBuilder<'a> {
    defs: &'a HashMap<&'a str, &'a ObjectDef>,
    built: HashMap<String, InstanceRef>,
    in_progress: HashSet<String>,
}

impl GraphBuilder<'_> {
    fn build(&mut self, id: &str, referenced_by: &str) -> Result<InstanceRef, HostError> {
        if let Some(obj) = self.built.get(id) {
            return Ok(obj.clone());
        }
        let def = *self.defs.get(id).ok_or_else(|| HostError::UnknownObject {
            id: id.to_string(),
            referenced_by: referenced_by.to_string(),
        })?;
        if !self.in_progress.insert(id.to_string()) {
            return Err(HostError::Cycle { id: id.to_string() });
        }

        let mut object = SandboxObject::new(&def.type_name);
        for (name, raw) in &def.fields {
            let value = self.field_value(def, name, raw)?;
            object = object.with_field(name, value);
        }
        if let Some(outer) = &def.outer {
            object = object.with_outer(self.build(outer, id)?);
        }

        self.in_progress.remove(id);
        let obj = object.build();
        self.built.insert(id.to_string(), obj.clone());
        Ok(obj)
    }

    fn field_value(
        &mut self,
        def: &ObjectDef,
        field: &str,
        raw: &serde_json::Value,
    ) -> Result<Value, HostError> {
        use serde_json::Value as Json;

        let unsupported = || HostError::UnsupportedValue {
            object: def.id.clone(),
            field: field.to_string(),
        };
        match raw {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n.as_f64().map(Value::Float).ok_or_else(unsupported),
            },
            Json::String(s) => Ok(Value::from(s.as_str())),
            Json::Object(map) => match (map.len(), map.get("ref")) {
                (1, Some(Json::String(target))) => Ok(Value::Object(self.build(target, &def.id)?)),
                _ => Err(unsupported()),
            },
            Json::Array(_) => Err(unsupported()),
        }
    }
}
