//! omadm-client: OMA-DM 2.0 device management client (JSON over HTTP)
//!
//! A local application exposes managed objects (MOs), schema-described
//! configuration and state trees, to a remote management server. The server
//! reads and writes the tree during sessions built from three packages:
//! P1 (client initiation), P2 (server commands) and P3 (client responses).
//!
//! # Key Features
//!
//! - **MO Registry**: DDF (device description file) schemas turned into
//!   addressable node trees
//!   - Instances attached per type, ids allocated automatically or chosen
//!   - URIs of the form `type_id/instance_id/node/path`
//!
//! - **Session State Machine**: P1 -> P2 -> P3 (-> P2 -> P3 ...) until END
//!   - Pending alert queue, each alert sent exactly once
//!   - Optional full tree dump in P1
//!
//! - **Command Queue**: FIFO execution of server commands
//!   - `HGET` fetches a resource and writes it into the tree
//!   - Per-command status codes reported in the next P3
//!
//! - **Reference MO**: [`StaticDataMo`], an in-memory value store seeded from
//!   a DDF
//!
//! # Example
//!
//! ```no_run
//! use omadm_client::{mo::new_handle, ClientConfig, DmClient, StaticDataMo};
//!
//! let mut client = DmClient::new(ClientConfig::default());
//! client.register_ddf("urn:oma:mo:oma-fumo:1.0", "demos/ddf/Fumo.ddf", None);
//!
//! let fumo = StaticDataMo::from_ddf_file("fumo", "demos/ddf/Fumo.ddf").unwrap();
//! client.add_mo("urn:oma:mo:oma-fumo:1.0", new_handle(fumo), Some("rootfs"));
//!
//! let report = client.start_session(false);
//! println!("{} P3 package(s) sent", report.p3_sent);
//! ```

pub mod alert;
pub mod client;
pub mod command;
pub mod config;
pub mod ddf;
mod error;
pub mod handler;
pub mod mo;
pub mod package;
pub mod path;
pub mod registry;
pub mod session;
pub mod transport;

pub use alert::{Alert, AlertQueue, AlertType};
pub use client::{DmClient, SessionEnd, SessionReport};
pub use command::{Command, CommandKind, CommandPolicy, CommandQueue, StatusRecord};
pub use config::{ClientConfig, PayloadEncoding, RetryPolicy};
pub use ddf::{DdfSchema, SchemaNode};
pub use error::{Error, Result, StatusCode};
pub use handler::{MoDump, MoTypeHandler, TypeSummary};
pub use mo::{ManagedObject, MoHandle, NodeValue, StaticDataMo};
pub use registry::MoRegistry;
pub use session::{P2Outcome, Session, SessionState};
pub use transport::{HttpTransport, ServerUrl, SharedTransport, Transport};
