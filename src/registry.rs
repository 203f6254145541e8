//! MO type registry
//!
//! Maps type ids to their [`MoTypeHandler`] and routes tree URIs of the form
//! `type_id/instance_id/node/path` to the right handler. It also produces the
//! registry-wide P1 aggregates (structure and full-tree dump), always in
//! registration order.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ddf::DdfSchema;
use crate::error::{Error, Result};
use crate::handler::{MoDump, MoTypeHandler, TypeSummary};
use crate::mo::MoHandle;
use crate::path::split_first;

/// Registered MO types and their instances
#[derive(Debug, Default)]
pub struct MoRegistry {
    /// Type id -> handler, in registration order
    types: IndexMap<String, MoTypeHandler>,
}

impl MoRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an MO type from a DDF file
    ///
    /// Registering an already known type succeeds without reading the file
    /// again.
    ///
    /// # Arguments
    /// * `type_id` - MO type id
    /// * `path` - Local copy of the DDF
    /// * `schema_url` - Canonical download URL of the DDF, reported in P1
    pub fn register_ddf(
        &mut self,
        type_id: &str,
        path: impl AsRef<Path>,
        schema_url: Option<&str>,
    ) -> bool {
        if self.types.contains_key(type_id) {
            log::debug!("MO type {} already registered", type_id);
            return true;
        }
        log::info!(
            "Registering DDF file {} for {}",
            path.as_ref().display(),
            type_id
        );
        self.insert_parsed(type_id, DdfSchema::from_file(path, type_id), schema_url)
    }

    /// Register an MO type from DDF XML
    pub fn register_ddf_str(&mut self, type_id: &str, xml: &str, schema_url: Option<&str>) -> bool {
        if self.types.contains_key(type_id) {
            log::debug!("MO type {} already registered", type_id);
            return true;
        }
        log::info!("Registering in-memory DDF for {}", type_id);
        self.insert_parsed(type_id, DdfSchema::from_xml(xml, type_id), schema_url)
    }

    fn insert_parsed(
        &mut self,
        type_id: &str,
        schema: Result<DdfSchema>,
        schema_url: Option<&str>,
    ) -> bool {
        match schema {
            Ok(schema) => {
                let handler =
                    MoTypeHandler::new(type_id, schema, schema_url.map(String::from));
                self.types.insert(type_id.to_string(), handler);
                true
            }
            Err(e) => {
                log::error!("Failed to register MO type {}: {}", type_id, e);
                false
            }
        }
    }

    /// Attach an MO instance to a registered type
    ///
    /// # Returns
    /// The instance id assigned by the type handler
    pub fn try_add_instance(
        &mut self,
        type_id: &str,
        mo: MoHandle,
        requested_id: Option<&str>,
    ) -> Result<String> {
        let handler = self
            .types
            .get_mut(type_id)
            .ok_or_else(|| Error::UnknownType(type_id.to_string()))?;
        handler.add_instance(mo, requested_id)
    }

    /// Attach an MO instance, logging the failure reason
    pub fn add_instance(&mut self, type_id: &str, mo: MoHandle, requested_id: Option<&str>) -> bool {
        match self.try_add_instance(type_id, mo, requested_id) {
            Ok(_) => true,
            Err(e) => {
                log::error!("Failed to add MO instance: {}", e);
                false
            }
        }
    }

    /// Route a node write to its type handler
    ///
    /// # Arguments
    /// * `uri` - `type_id/instance_id/node/path`, leading slash optional
    /// * `value` - Content to write
    pub fn try_node_set(&self, uri: &str, value: &Value) -> Result<()> {
        let (type_id, rest) = split_first(uri);
        let handler = self
            .types
            .get(type_id)
            .ok_or_else(|| Error::UnknownType(type_id.to_string()))?;
        handler.try_node_set(rest, value)
    }

    /// Route a node write, logging the failure reason
    pub fn node_set(&self, uri: &str, value: &Value) -> bool {
        match self.try_node_set(uri, value) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("node_set {} failed: {}", uri, e);
                false
            }
        }
    }

    /// P1 `MOS` content, one entry per type
    pub fn p1_structure(&self) -> Vec<TypeSummary> {
        self.types.values().map(MoTypeHandler::summary).collect()
    }

    /// P1 `MgmtTree` content, every instance of every type
    pub fn dump_all(&self) -> Vec<MoDump> {
        self.types
            .values()
            .flat_map(MoTypeHandler::dump_all)
            .collect()
    }

    /// Get the handler of a type
    pub fn handler(&self, type_id: &str) -> Option<&MoTypeHandler> {
        self.types.get(type_id)
    }

    /// Registered type ids in registration order
    pub fn type_ids(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Notify every instance of every type that the client is shutting down
    pub fn close_all(&self) {
        for handler in self.types.values() {
            handler.close_all();
        }
    }
}
