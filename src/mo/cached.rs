//! Static data store MO
//!
//! [`StaticDataMo`] keeps a complete copy of its node tree in memory. The
//! tree is seeded from a DDF (leaf defaults included) and the local
//! application fills in values with [`StaticDataMo::local_set_node`]. Server
//! writes land in the same cache.

use std::path::Path;

use serde_json::{Map, Value};

use super::{ManagedObject, NodeValue};
use crate::ddf::{DdfSchema, SchemaNode};
use crate::error::Result;
use crate::path::split_path;

/// Instance id reported when none is configured
pub const DEFAULT_MIID: &str = "miid1";

/// In-memory MO serving every node from its cache
#[derive(Debug, Clone)]
pub struct StaticDataMo {
    /// Cached tree, root named after the MO
    root: SchemaNode,
    /// Self-reported instance id
    miid: String,
    initialized: bool,
    closed: bool,
}

impl StaticDataMo {
    /// Create an MO with an empty tree
    pub fn new(mo_name: impl Into<String>) -> Self {
        Self::from_root(SchemaNode::interior(mo_name))
    }

    /// Create an MO whose tree is seeded from a DDF file
    ///
    /// # Arguments
    /// * `mo_name` - Name of the MO root node in serializations
    /// * `path` - Path to the DDF file
    pub fn from_ddf_file(mo_name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let schema = DdfSchema::from_file(path, "")?;
        Ok(Self::from_schema(mo_name, schema))
    }

    /// Create an MO whose tree is seeded from DDF XML
    pub fn from_ddf_str(mo_name: impl Into<String>, xml: &str) -> Result<Self> {
        let schema = DdfSchema::from_xml(xml, "")?;
        Ok(Self::from_schema(mo_name, schema))
    }

    fn from_schema(mo_name: impl Into<String>, schema: DdfSchema) -> Self {
        let mut root = schema.into_root();
        root.name = mo_name.into();
        root.is_leaf = false;
        let mo = Self::from_root(root);
        log::debug!("Static data MO created tree from DDF: {}", mo.serialize_json());
        mo
    }

    fn from_root(root: SchemaNode) -> Self {
        Self {
            root,
            miid: DEFAULT_MIID.to_string(),
            initialized: false,
            closed: false,
        }
    }

    /// Override the self-reported instance id
    pub fn with_miid(mut self, miid: impl Into<String>) -> Self {
        self.miid = miid.into();
        self
    }

    /// MO root name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Set a cached node from the local application
    ///
    /// No check against the DDF is made. Nodes created on the way down turn
    /// their parent into an interior node.
    ///
    /// # Arguments
    /// * `path` - Node path relative to the MO root
    /// * `data` - Raw node content
    /// * `add_missing` - Create missing nodes instead of ignoring the write
    pub fn local_set_node(&mut self, path: &str, data: &str, add_missing: bool) {
        let segments = split_path(path);
        let mut node = &mut self.root;

        for segment in &segments {
            let index = match node.children.iter().position(|c| &c.name == segment) {
                Some(index) => index,
                None if add_missing => {
                    node.is_leaf = false;
                    node.children.push(SchemaNode::leaf(segment.as_str(), ""));
                    node.children.len() - 1
                }
                None => {
                    log::warn!("Trying to set non-existing node {}", path);
                    return;
                }
            };
            node = &mut node.children[index];
        }
        node.default_value = data.to_string();
    }

    /// Get a cached node for the local application
    ///
    /// Returns `None` if the node does not exist.
    pub fn local_get_node(&self, path: &str) -> Option<String> {
        self.root
            .find(&split_path(path))
            .map(|node| node.default_value.clone())
    }

    /// `init_mo` has been called
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `close_mo` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ManagedObject for StaticDataMo {
    fn get_val(&self, path: &str) -> NodeValue {
        match self.local_get_node(path) {
            Some(data) => NodeValue::present(data),
            None => {
                log::debug!("MO {} has no node {}", self.root.name, path);
                NodeValue::missing()
            }
        }
    }

    fn set_val(&mut self, path: &str, data: &str) -> bool {
        self.local_set_node(path, data, true);
        true
    }

    fn remove_node(&mut self, _path: &str) -> bool {
        false
    }

    fn execute(&mut self, _path: &str) -> bool {
        false
    }

    // Serves any DDF, the tree is whatever it was seeded with
    fn check_ddf_name_compatibility(&self, _type_id: &str) -> bool {
        true
    }

    fn init_mo(&mut self) {
        self.initialized = true;
    }

    fn close_mo(&mut self) {
        self.closed = true;
    }

    fn serialize_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(self.root.name.clone(), self.root.children_json());
        Value::Object(object)
    }

    fn miid(&self) -> String {
        self.miid.clone()
    }
}
