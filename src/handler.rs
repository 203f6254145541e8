//! MO type handler
//!
//! One [`MoTypeHandler`] exists per registered MO type. It owns the type's
//! schema tree and the instances attached to it:
//!
//! - Allocates instance ids (explicit or lowest free positive integer)
//! - Builds the P1 structure entry for the type
//! - Serializes each instance by walking the schema and reading leaves
//! - Routes node writes to the addressed instance

use std::path::Path;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::ddf::{DdfSchema, SchemaNode};
use crate::error::{Error, Result};
use crate::mo::{read_mo, write_mo, ManagedObject, MoHandle};
use crate::path::{join_path, split_first, split_path};

/// P1 structure view of one MO type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSummary {
    /// Canonical DDF download URL, if known
    pub schema_url: Option<String>,
    /// Registered type id
    pub type_id: String,
    /// Self-reported instance ids
    pub instance_ids: Vec<String>,
}

/// Serialized content of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct MoDump {
    /// `{root_name: {...}}`
    pub tree: Value,
    /// `type_id/instance_id/`
    pub client_uri: String,
}

/// Schema and instances of one MO type
pub struct MoTypeHandler {
    type_id: String,
    schema_url: Option<String>,
    schema: SchemaNode,
    /// Instance id -> MO, in attachment order
    instances: IndexMap<String, MoHandle>,
}

impl std::fmt::Debug for MoTypeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoTypeHandler")
            .field("type_id", &self.type_id)
            .field("schema_url", &self.schema_url)
            .field("schema", &self.schema.name)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MoTypeHandler {
    /// Create a handler from an already parsed schema
    pub fn new(type_id: impl Into<String>, schema: DdfSchema, schema_url: Option<String>) -> Self {
        let type_id = type_id.into();
        if let Some(ddf_name) = schema.ddf_name() {
            if ddf_name != type_id {
                log::warn!(
                    "DDF declares type {} but is registered as {}",
                    ddf_name,
                    type_id
                );
            }
        }
        Self {
            type_id,
            schema_url,
            schema: schema.into_root(),
            instances: IndexMap::new(),
        }
    }

    /// Create a handler from a DDF file
    ///
    /// # Arguments
    /// * `type_id` - MO type id (e.g. `urn:oma:mo:oma-dm-devinfo:1.2`)
    /// * `path` - Local copy of the DDF
    /// * `schema_url` - Canonical download URL of the DDF, reported in P1
    pub fn from_file(
        type_id: &str,
        path: impl AsRef<Path>,
        schema_url: Option<String>,
    ) -> Result<Self> {
        let schema = DdfSchema::from_file(path, type_id)?;
        Ok(Self::new(type_id, schema, schema_url))
    }

    /// Create a handler from DDF XML
    pub fn from_xml(type_id: &str, xml: &str, schema_url: Option<String>) -> Result<Self> {
        let schema = DdfSchema::from_xml(xml, type_id)?;
        Ok(Self::new(type_id, schema, schema_url))
    }

    /// Registered type id
    #[must_use]
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// Canonical DDF URL
    #[must_use]
    pub fn schema_url(&self) -> Option<&str> {
        self.schema_url.as_deref()
    }

    /// Root of the type's schema
    #[must_use]
    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    /// Registry-assigned instance ids in attachment order
    pub fn instance_ids(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    /// Get an instance by its registry-assigned id
    pub fn instance(&self, instance_id: &str) -> Option<&MoHandle> {
        self.instances.get(instance_id)
    }

    /// Number of attached instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no instance is attached
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Attach an instance
    ///
    /// # Arguments
    /// * `mo` - The MO implementation
    /// * `requested_id` - Instance id to use, or `None` to allocate one
    ///
    /// # Returns
    /// The id the instance was stored under
    pub fn add_instance(&mut self, mo: MoHandle, requested_id: Option<&str>) -> Result<String> {
        let instance_id = match requested_id {
            Some(id) if self.instances.contains_key(id) => {
                return Err(Error::DuplicateInstance {
                    type_id: self.type_id.clone(),
                    instance_id: id.to_string(),
                });
            }
            Some(id) => id.to_string(),
            None => self.next_free_id(),
        };

        if !read_mo(&mo).check_ddf_name_compatibility(&self.type_id) {
            return Err(Error::CompatibilityRejected(self.type_id.clone()));
        }

        write_mo(&mo).init_mo();
        self.instances.insert(instance_id.clone(), mo);
        log::info!("Added instance {} to MO type {}", instance_id, self.type_id);
        Ok(instance_id)
    }

    /// Lowest positive integer not used as an instance id
    fn next_free_id(&self) -> String {
        (1u64..)
            .map(|n| n.to_string())
            .find(|id| !self.instances.contains_key(id))
            .unwrap_or_default()
    }

    /// P1 structure entry for this type
    pub fn summary(&self) -> TypeSummary {
        TypeSummary {
            schema_url: self.schema_url.clone(),
            type_id: self.type_id.clone(),
            instance_ids: self
                .instances
                .values()
                .map(|mo| read_mo(mo).miid())
                .collect(),
        }
    }

    /// Serialize every instance against the schema
    pub fn dump_all(&self) -> Vec<MoDump> {
        self.instances
            .iter()
            .map(|(instance_id, mo)| MoDump {
                tree: self.serialize_instance(mo),
                client_uri: format!("{}/{}/", self.type_id, instance_id),
            })
            .collect()
    }

    /// Schema-driven serialization of one instance: `{root_name: {...}}`
    pub fn serialize_instance(&self, mo: &MoHandle) -> Value {
        let mo = read_mo(mo);
        let mut path = Vec::new();
        let content = serialize_children(&*mo, &self.schema.children, &mut path);

        let mut tree = Map::new();
        tree.insert(self.schema.name.clone(), Value::Object(content));
        Value::Object(tree)
    }

    /// Write a value into an instance
    ///
    /// # Arguments
    /// * `relative_path` - `instance_id/node/path`
    /// * `value` - Content to write
    pub fn try_node_set(&self, relative_path: &str, value: &Value) -> Result<()> {
        let (instance_id, node_path) = split_first(relative_path);
        if !self.instances.contains_key(instance_id) {
            return Err(Error::UnknownInstance {
                type_id: self.type_id.clone(),
                instance_id: instance_id.to_string(),
            });
        }

        if self.schema.find(&split_path(node_path)).is_none() {
            return Err(Error::UnknownNode {
                type_id: self.type_id.clone(),
                path: node_path.to_string(),
            });
        }

        log::debug!("node_set {}/{}: {}", self.type_id, relative_path, value);
        // TODO: check node type and access rights, then forward to set_val
        Err(Error::NodeWriteNotImplemented(format!(
            "{}/{}",
            self.type_id, relative_path
        )))
    }

    /// Write a value into an instance, logging the failure reason
    pub fn node_set(&self, relative_path: &str, value: &Value) -> bool {
        match self.try_node_set(relative_path, value) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("node_set failed: {}", e);
                false
            }
        }
    }

    /// Notify every instance that the client is shutting down
    pub fn close_all(&self) {
        for mo in self.instances.values() {
            write_mo(mo).close_mo();
        }
    }
}

/// Walk schema children, reading leaves from the MO
///
/// Leaves are kept only if they exist and are valid, interior nodes only if
/// something below them was kept.
fn serialize_children(
    mo: &dyn ManagedObject,
    children: &[SchemaNode],
    path: &mut Vec<String>,
) -> Map<String, Value> {
    let mut object = Map::new();
    for child in children {
        path.push(child.name.clone());
        if child.is_leaf {
            let value = mo.get_val(&join_path(path));
            if value.is_reportable() {
                object.insert(child.name.clone(), Value::String(value.data));
            }
        } else {
            let nested = serialize_children(mo, &child.children, path);
            if !nested.is_empty() {
                object.insert(child.name.clone(), Value::Object(nested));
            }
        }
        path.pop();
    }
    object
}
