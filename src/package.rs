//! Protocol packages
//!
//! Wire documents exchanged during a session:
//!
//! - P1 (client initiation): `{"MOS": [...], "Alert": [...], "MgmtTree": [...]}`
//! - P2 (server commands): `{"CMD": [[name, params...], ...]}`
//! - P3 (client response): `{"SC": [{"sc": code, "URI": [...]}, ...]}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::StatusRecord;
use crate::error::{Error, Result};
use crate::handler::{MoDump, TypeSummary};

// =============================================================================
// Media types
// =============================================================================

/// Content type of P1
pub const P1_CONTENT_TYPE: &str = "application/vnd.oma.dm.initiation+json";
/// Content type of P3
pub const P3_CONTENT_TYPE: &str = "application/vnd.oma.dm.response+json";
/// Accepted content type of P2 replies
pub const P2_ACCEPT: &str = "application/vnd.oma.dm.request+json";

// =============================================================================
// P1
// =============================================================================

/// Client initiation package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct P1Package {
    #[serde(rename = "MOS")]
    pub mos: Vec<MoStructure>,
    #[serde(rename = "Alert")]
    pub alerts: Vec<AlertSummary>,
    /// Full tree dump, only when enabled
    #[serde(rename = "MgmtTree", default, skip_serializing_if = "Option::is_none")]
    pub mgmt_tree: Option<Vec<MgmtTreeEntry>>,
}

/// Structure entry of one MO type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoStructure {
    #[serde(rename = "DDF", default, skip_serializing_if = "Option::is_none")]
    pub ddf: Option<String>,
    #[serde(rename = "MOID")]
    pub moid: String,
    #[serde(rename = "MIID")]
    pub miid: Vec<String>,
}

impl From<TypeSummary> for MoStructure {
    fn from(summary: TypeSummary) -> Self {
        Self {
            ddf: summary.schema_url,
            moid: summary.type_id,
            miid: summary.instance_ids,
        }
    }
}

/// Alert as sent in P1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    #[serde(rename = "AlertType")]
    pub alert_type: String,
}

/// Serialized MO instance as sent in P1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MgmtTreeEntry {
    #[serde(rename = "MOData")]
    pub mo_data: Value,
    #[serde(rename = "ClientURI")]
    pub client_uri: String,
}

impl From<MoDump> for MgmtTreeEntry {
    fn from(dump: MoDump) -> Self {
        Self {
            mo_data: dump.tree,
            client_uri: dump.client_uri,
        }
    }
}

impl P1Package {
    /// Encode as JSON text
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// P2
// =============================================================================

/// Server command package, entries kept raw until classified
#[derive(Debug, Clone, PartialEq)]
pub struct P2Package {
    pub entries: Vec<Value>,
}

impl P2Package {
    /// Decode P2 JSON text
    ///
    /// Fails on malformed JSON, a non-object document, or a missing or
    /// non-array `CMD` member.
    pub fn decode(payload: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(payload)
            .map_err(|e| Error::Decode(format!("P2 is not valid JSON: {}", e)))?;

        let Value::Object(mut object) = document else {
            return Err(Error::Decode("P2 is not a JSON object".into()));
        };

        match object.remove("CMD") {
            Some(Value::Array(entries)) => Ok(Self { entries }),
            Some(_) => Err(Error::Decode("P2 CMD is not an array".into())),
            None => Err(Error::Decode("P2 has no CMD member".into())),
        }
    }
}

/// One `CMD` entry split into name and parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub name: String,
    pub parameters: Vec<String>,
}

impl RawCommand {
    /// Split a `[name, params...]` entry
    ///
    /// Returns `None` unless the entry is a non-empty array with a string
    /// head. Non-string parameters are kept as compact JSON text.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let (head, rest) = entry.as_array()?.split_first()?;
        let name = head.as_str()?.to_string();
        let parameters = rest
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        Some(Self { name, parameters })
    }
}

// =============================================================================
// P3
// =============================================================================

/// Client response package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P3Package {
    #[serde(rename = "SC")]
    pub statuses: Vec<StatusEntry>,
}

/// Status of one executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub sc: u16,
    #[serde(rename = "URI", default)]
    pub uri: Vec<String>,
}

impl From<StatusRecord> for StatusEntry {
    fn from(status: StatusRecord) -> Self {
        Self {
            sc: status.code,
            uri: status.uris,
        }
    }
}

impl P3Package {
    /// Build from drained statuses, keeping their order
    pub fn from_statuses(statuses: Vec<StatusRecord>) -> Self {
        Self {
            statuses: statuses.into_iter().map(StatusEntry::from).collect(),
        }
    }

    /// Encode as JSON text
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
