//! DDF schema ingestion
//!
//! A device description file (DDF) describes the node tree of one MO type.
//! This module turns the XML document into an owned [`SchemaNode`] tree:
//!
//! - The document root must be `<MgmtTree>` holding at least one `<Node>`;
//!   the first one is the MO root
//! - Node names come from `<NodeName>`, defaulting to `*` when missing
//! - Leaf vs interior is decided by `<DFProperties><DFFormat>` when present
//!   (a `<node/>` child means interior), otherwise by the presence of child
//!   `<Node>` elements
//! - Leaves may carry a literal default in a `<Value>` child
//!
//! The precedence above must stay fixed so existing DDF files keep producing
//! the same trees.

use std::fs;
use std::path::Path;

use roxmltree::{Document, Node, ParsingOptions};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Name used for nodes whose `<NodeName>` is missing or empty
pub const WILDCARD_NAME: &str = "*";

/// Prefix of OMA-registered MO type ids
const OMA_MO_URN_PREFIX: &str = "urn:oma:mo:";

/// One position in an MO type's schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    /// Node name (`*` if the DDF did not name it)
    pub name: String,
    /// True for scalar-valued nodes
    pub is_leaf: bool,
    /// Literal default from the DDF (leaves only, empty otherwise)
    pub default_value: String,
    /// Child nodes in document order
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    /// Create an interior node without children
    pub fn interior(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_leaf: false,
            default_value: String::new(),
            children: Vec::new(),
        }
    }

    /// Create a leaf node with a default value
    pub fn leaf(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_leaf: true,
            default_value: default_value.into(),
            children: Vec::new(),
        }
    }

    /// Get a direct child by name
    pub fn child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Descend by child names; an empty path returns `self`
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&SchemaNode> {
        path.iter()
            .try_fold(self, |node, segment| node.child(segment.as_ref()))
    }

    /// Render this node's content: leaves become their default value,
    /// interior nodes an object of their children
    pub fn to_json(&self) -> Value {
        if self.is_leaf {
            Value::String(self.default_value.clone())
        } else {
            self.children_json()
        }
    }

    /// Render the children as one object, regardless of `is_leaf`
    pub fn children_json(&self) -> Value {
        let mut object = Map::new();
        for child in &self.children {
            object.insert(child.name.clone(), child.to_json());
        }
        Value::Object(object)
    }
}

/// Parsed DDF document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdfSchema {
    /// MO root node
    root: SchemaNode,
    /// `<DDFName>` declared on the root node, if any
    ddf_name: Option<String>,
}

impl DdfSchema {
    /// Load a DDF from a file
    ///
    /// # Arguments
    /// * `path` - Path to the DDF (XML) file
    /// * `type_id` - Registered type id, used to name an unnamed root node
    pub fn from_file(path: impl AsRef<Path>, type_id: &str) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::SchemaFile(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_xml(&content, type_id)
    }

    /// Parse a DDF from an XML string
    pub fn from_xml(xml: &str, type_id: &str) -> Result<Self> {
        // DDF files routinely carry a DOCTYPE pointing at the OMA DTD
        let mut options = ParsingOptions::default();
        options.allow_dtd = true;

        let doc = Document::parse_with_options(xml, options)
            .map_err(|e| Error::Schema(format!("Failed parsing DDF document: {}", e)))?;

        let mgmt_tree = doc.root_element();
        if !mgmt_tree.has_tag_name("MgmtTree") {
            return Err(Error::Schema(format!(
                "expected <MgmtTree> root element, found <{}>",
                mgmt_tree.tag_name().name()
            )));
        }
        let root_xml = first_child_element(mgmt_tree, "Node")
            .ok_or_else(|| Error::Schema("missing <MgmtTree><Node>".into()))?;

        let name = element_text(root_xml, "NodeName")
            .map(String::from)
            .unwrap_or_else(|| root_name_from_type_id(type_id));

        let children: Vec<SchemaNode> = child_elements(root_xml, "Node")
            .map(node_from_xml)
            .collect();

        let root = SchemaNode {
            name,
            is_leaf: children.is_empty(),
            default_value: String::new(),
            children,
        };

        Ok(Self {
            root,
            ddf_name: declared_ddf_name(root_xml),
        })
    }

    /// Build a schema directly from a node tree
    pub fn from_root(root: SchemaNode) -> Self {
        Self {
            root,
            ddf_name: None,
        }
    }

    /// MO root node
    #[must_use]
    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// Consume the schema, returning the root node
    pub fn into_root(self) -> SchemaNode {
        self.root
    }

    /// Canonical type name declared in the DDF, if present
    #[must_use]
    pub fn ddf_name(&self) -> Option<&str> {
        self.ddf_name.as_deref()
    }

    /// Full-tree dump: `{root_name: {...}}` with leaf defaults
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(self.root.name.clone(), self.root.children_json());
        Value::Object(object)
    }
}

/// Recursively build a schema node from a `<Node>` element
fn node_from_xml(xml_node: Node<'_, '_>) -> SchemaNode {
    // <NodeName> is mandatory per DTD but some published DDFs omit it
    let name = element_text(xml_node, "NodeName")
        .unwrap_or(WILDCARD_NAME)
        .to_string();

    let is_leaf = match descend(xml_node, &["DFProperties", "DFFormat"]) {
        Some(format) => first_child_element(format, "node").is_none(),
        None => first_child_element(xml_node, "Node").is_none(),
    };

    if is_leaf {
        SchemaNode {
            name,
            is_leaf,
            default_value: element_text(xml_node, "Value").unwrap_or_default().to_string(),
            children: Vec::new(),
        }
    } else {
        SchemaNode {
            name,
            is_leaf,
            default_value: String::new(),
            children: child_elements(xml_node, "Node").map(node_from_xml).collect(),
        }
    }
}

/// Derive the root node name from an OMA type id
///
/// `urn:oma:mo:oma-dm-devinfo:1.2` becomes `dm-devinfo`.
fn root_name_from_type_id(type_id: &str) -> String {
    let Some(rest) = type_id.strip_prefix(OMA_MO_URN_PREFIX) else {
        return WILDCARD_NAME.to_string();
    };
    let rest = rest.strip_prefix("oma-").unwrap_or(rest);
    match rest.split(':').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => WILDCARD_NAME.to_string(),
    }
}

fn declared_ddf_name(root_xml: Node<'_, '_>) -> Option<String> {
    descend(root_xml, &["DFProperties", "DFType", "DDFName"])
        .or_else(|| descend(root_xml, &["RTProperties", "Type", "DDFName"]))
        .and_then(|n| n.text())
        .filter(|t| !t.is_empty())
        .map(String::from)
}

fn child_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.has_tag_name(tag))
}

fn first_child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.has_tag_name(tag))
}

/// Follow a chain of child elements, `None` as soon as one is missing
fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    path.iter()
        .try_fold(node, |current, tag| first_child_element(current, tag))
}

/// Text of the first child element with `tag`, `None` when absent or empty
fn element_text<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<&'a str> {
    first_child_element(node, tag)
        .and_then(|n| n.text())
        .filter(|t| !t.is_empty())
}
