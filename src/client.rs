//! Device management client
//!
//! [`DmClient`] owns the registry, the command queue, the session and the
//! alert queue, and runs complete sessions with [`DmClient::start_session`].

use std::path::Path;
use std::sync::Arc;

use crate::alert::{Alert, AlertQueue, AlertType};
use crate::command::{CommandPolicy, CommandQueue};
use crate::config::ClientConfig;
use crate::mo::MoHandle;
use crate::package::{MgmtTreeEntry, MoStructure, P1Package, P3Package};
use crate::registry::MoRegistry;
use crate::session::{P2Outcome, Session};
use crate::transport::{HttpTransport, SharedTransport};

/// Why a session loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server sent END
    EndCommand,
    /// A P2 could not be decoded (including an empty reply after a
    /// transport failure)
    DecodeFailure,
}

/// Summary of one completed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Number of P3 packages sent
    pub p3_sent: usize,
    pub end: SessionEnd,
}

/// OMA-DM client
pub struct DmClient {
    registry: MoRegistry,
    commands: CommandQueue,
    session: Session,
    alerts: AlertQueue,
    dump_tree: bool,
}

impl DmClient {
    /// Create a client talking HTTP(S) through `ureq`
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.timeout()));
        Self::with_transport(config, transport)
    }

    /// Create a client with a custom transport
    ///
    /// An invalid configuration is logged and used anyway: a zero timeout
    /// falls back to the default and zero fetch attempts act as one.
    pub fn with_transport(config: ClientConfig, transport: SharedTransport) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("Using invalid client configuration: {}", e);
        }
        Self {
            registry: MoRegistry::new(),
            commands: CommandQueue::new(transport.clone(), CommandPolicy::from(&config)),
            session: Session::new(transport, &config),
            alerts: AlertQueue::new(),
            dump_tree: config.dump_tree,
        }
    }

    /// Register an MO type from a DDF file
    ///
    /// # Arguments
    /// * `type_id` - MO type id (e.g. `urn:oma:mo:oma-fumo:1.0`)
    /// * `path` - Local copy of the DDF
    /// * `schema_url` - Canonical download URL of the DDF, reported in P1
    pub fn register_ddf(
        &mut self,
        type_id: &str,
        path: impl AsRef<Path>,
        schema_url: Option<&str>,
    ) -> bool {
        self.registry.register_ddf(type_id, path, schema_url)
    }

    /// Register an MO type from DDF XML
    pub fn register_ddf_str(&mut self, type_id: &str, xml: &str, schema_url: Option<&str>) -> bool {
        self.registry.register_ddf_str(type_id, xml, schema_url)
    }

    /// Attach an MO instance to a registered type
    pub fn add_mo(&mut self, type_id: &str, mo: MoHandle, instance_id: Option<&str>) -> bool {
        self.registry.add_instance(type_id, mo, instance_id)
    }

    /// Include the full tree dump in P1
    pub fn set_p1_dump_tree(&mut self, dump_tree: bool) {
        self.dump_tree = dump_tree;
    }

    pub fn set_device_id(&mut self, device_id: impl Into<String>) {
        self.session.set_device_id(device_id);
    }

    #[must_use]
    pub fn registry(&self) -> &MoRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MoRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn alerts(&self) -> &AlertQueue {
        &self.alerts
    }

    /// Run one complete session
    ///
    /// # Arguments
    /// * `server_initiated` - Send `ServerInitiatedMgmt` instead of
    ///   `ClientInitiatedMgmt`
    pub fn start_session(&mut self, server_initiated: bool) -> SessionReport {
        self.alerts.add(Alert::new(AlertType::session(server_initiated)));
        log::info!(
            "Starting {} session",
            if server_initiated { "server initiated" } else { "client initiated" }
        );

        let p1 = self.build_p1();
        let mut reply = match p1.to_json_string() {
            Ok(payload) => self.session.send_p1(&payload).unwrap_or_default(),
            Err(e) => {
                log::error!("Failed to encode P1: {}", e);
                String::new()
            }
        };

        let mut p3_sent = 0;
        let end = loop {
            match self.session.decode_p2(&reply, &mut self.commands) {
                P2Outcome::Continue => {}
                P2Outcome::End => {
                    // Commands sent alongside END still run in this session,
                    // but no P3 follows END so their statuses go nowhere
                    self.commands.drain_and_execute(&self.registry);
                    let dropped = self.commands.drain_statuses();
                    if !dropped.is_empty() {
                        log::warn!(
                            "Dropping {} status(es) produced after END: {:?}",
                            dropped.len(),
                            dropped.iter().map(|s| s.code).collect::<Vec<_>>()
                        );
                    }
                    break SessionEnd::EndCommand;
                }
                P2Outcome::DecodeFailure => break SessionEnd::DecodeFailure,
            }
            self.commands.drain_and_execute(&self.registry);

            let p3 = P3Package::from_statuses(self.commands.drain_statuses());
            reply = match p3.to_json_string() {
                Ok(payload) => {
                    p3_sent += 1;
                    self.session.send_p3(&payload).unwrap_or_default()
                }
                Err(e) => {
                    log::error!("Failed to encode P3: {}", e);
                    String::new()
                }
            };
        };
        self.session.finish();
        log::info!("Session finished after {} P3 package(s): {:?}", p3_sent, end);

        SessionReport { p3_sent, end }
    }

    fn build_p1(&mut self) -> P1Package {
        P1Package {
            mos: self
                .registry
                .p1_structure()
                .into_iter()
                .map(MoStructure::from)
                .collect(),
            alerts: self.alerts.flush_pending(),
            mgmt_tree: self.dump_tree.then(|| {
                self.registry
                    .dump_all()
                    .into_iter()
                    .map(MgmtTreeEntry::from)
                    .collect()
            }),
        }
    }

    /// Notify every MO instance that the client is going away
    pub fn shutdown(&mut self) {
        log::info!("Shutting down, closing all MO instances");
        self.registry.close_all();
    }
}
