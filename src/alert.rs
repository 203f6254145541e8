//! Pending alert queue
//!
//! Alerts are queued by the orchestrator and flushed into the next P1. A
//! flushed alert is marked in transit and kept in the queue, so it is never
//! sent twice.

use crate::package::AlertSummary;

/// Alert type URNs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertType {
    /// Session started by the client
    ClientInitiatedMgmt,
    /// Session started in response to a server notification
    ServerInitiatedMgmt,
    /// Any other alert type, carried verbatim
    Other(String),
}

impl AlertType {
    /// URN of a client initiated session alert
    pub const CLIENT_INITIATED_URN: &'static str = "urn:oma:at:dm:2.0:ClientInitiatedMgmt";
    /// URN of a server initiated session alert
    pub const SERVER_INITIATED_URN: &'static str = "urn:oma:at:dm:2.0:ServerInitiatedMgmt";

    /// Convert from alert type URN
    pub fn from_urn(s: &str) -> Self {
        match s {
            Self::CLIENT_INITIATED_URN => AlertType::ClientInitiatedMgmt,
            Self::SERVER_INITIATED_URN => AlertType::ServerInitiatedMgmt,
            other => AlertType::Other(other.to_string()),
        }
    }

    /// Convert to alert type URN
    pub fn as_urn(&self) -> &str {
        match self {
            AlertType::ClientInitiatedMgmt => Self::CLIENT_INITIATED_URN,
            AlertType::ServerInitiatedMgmt => Self::SERVER_INITIATED_URN,
            AlertType::Other(urn) => urn,
        }
    }

    /// Session alert for the given initiator
    pub fn session(server_initiated: bool) -> Self {
        if server_initiated {
            AlertType::ServerInitiatedMgmt
        } else {
            AlertType::ClientInitiatedMgmt
        }
    }
}

/// One queued alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub alert_type: AlertType,
    pub source_uri: String,
    pub target_uri: String,
    pub mark: String,
    pub data_type: String,
    pub data: String,
    /// Already flushed into a package
    pub in_transit: bool,
}

impl Alert {
    /// Create an alert with empty payload fields
    pub fn new(alert_type: AlertType) -> Self {
        Self {
            alert_type,
            source_uri: String::new(),
            target_uri: String::new(),
            mark: String::new(),
            data_type: String::new(),
            data: String::new(),
            in_transit: false,
        }
    }

    /// `ClientInitiatedMgmt` session alert
    pub fn client_initiated() -> Self {
        Self::new(AlertType::ClientInitiatedMgmt)
    }

    /// `ServerInitiatedMgmt` session alert
    pub fn server_initiated() -> Self {
        Self::new(AlertType::ServerInitiatedMgmt)
    }
}

/// FIFO of alerts waiting to be sent
#[derive(Debug, Default)]
pub struct AlertQueue {
    alerts: Vec<Alert>,
}

impl AlertQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an alert
    pub fn add(&mut self, alert: Alert) {
        log::debug!("Queued alert {}", alert.alert_type.as_urn());
        self.alerts.push(alert);
    }

    /// Collect every alert not yet in transit and mark it in transit
    pub fn flush_pending(&mut self) -> Vec<AlertSummary> {
        self.alerts
            .iter_mut()
            .filter(|alert| !alert.in_transit)
            .map(|alert| {
                alert.in_transit = true;
                AlertSummary {
                    alert_type: alert.alert_type.as_urn().to_string(),
                }
            })
            .collect()
    }

    /// Total number of alerts, flushed or not
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// Whether the queue holds no alert at all
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Number of alerts not yet flushed
    pub fn pending_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.in_transit).count()
    }
}
