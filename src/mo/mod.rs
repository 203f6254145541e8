//! Managed object capability contract
//!
//! An MO implementation owns the actual data behind one instance of an MO
//! type. The registry only knows it through [`ManagedObject`] and holds it as
//! a shared [`MoHandle`] so the application can keep its own clone.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

pub mod cached;

pub use cached::StaticDataMo;

/// Result of reading one node from an MO
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeValue {
    /// Node content
    pub data: String,
    /// Node is present in the instance
    pub exists: bool,
    /// Content is meaningful (a node may exist but hold no valid value yet)
    pub valid: bool,
}

impl NodeValue {
    /// Existing node with valid content
    pub fn present(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            exists: true,
            valid: true,
        }
    }

    /// Node not present in the instance
    pub fn missing() -> Self {
        Self {
            data: String::new(),
            exists: false,
            valid: true,
        }
    }

    /// Whether the value belongs in a tree dump
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        self.exists && self.valid
    }
}

/// Capability set every MO implementation provides
///
/// Paths are relative to the MO root and carry no leading slash
/// (`DownloadAndUpdate/PkgURL`).
pub trait ManagedObject {
    /// Read one node
    fn get_val(&self, path: &str) -> NodeValue;

    /// Write one node, returns false if the write was refused
    fn set_val(&mut self, path: &str, data: &str) -> bool;

    /// Remove a node and its subtree
    fn remove_node(&mut self, path: &str) -> bool;

    /// Run an executable node
    fn execute(&mut self, path: &str) -> bool;

    /// Whether this implementation can serve the given MO type
    fn check_ddf_name_compatibility(&self, type_id: &str) -> bool;

    /// Called once after the instance is attached to the registry
    fn init_mo(&mut self) {}

    /// Called when the client shuts down
    fn close_mo(&mut self) {}

    /// Self-serialization of the whole instance
    fn serialize_json(&self) -> Value;

    /// Self-reported instance id
    fn miid(&self) -> String;
}

/// Shared handle to an MO instance
pub type MoHandle = Arc<RwLock<dyn ManagedObject + Send + Sync>>;

/// Wrap an MO implementation into a shareable handle
pub fn new_handle<M>(mo: M) -> MoHandle
where
    M: ManagedObject + Send + Sync + 'static,
{
    Arc::new(RwLock::new(mo))
}

/// Acquire a read lock on an MO, recovering from poison if necessary
pub fn read_mo(handle: &MoHandle) -> RwLockReadGuard<'_, dyn ManagedObject + Send + Sync> {
    match handle.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("MO lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock on an MO, recovering from poison if necessary
pub fn write_mo(handle: &MoHandle) -> RwLockWriteGuard<'_, dyn ManagedObject + Send + Sync + 'static> {
    match handle.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("MO lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
