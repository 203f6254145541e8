//! Command queue
//!
//! Commands decoded from P2 are queued here and executed in FIFO order. Each
//! executed command may leave a [`StatusRecord`] that goes into the next P3.
//!
//! Only `HGET` has side effects so far: it fetches a resource over HTTP(S)
//! and writes the body into the MO tree. Every other command is answered
//! with 501 (not implemented).

use std::collections::VecDeque;
use std::thread;

use serde_json::Value;

use crate::config::{ClientConfig, RetryPolicy};
use crate::error::{Error, Result, StatusCode};
use crate::registry::MoRegistry;
use crate::transport::{ServerUrl, SharedTransport};

// =============================================================================
// Command kinds
// =============================================================================

/// Server command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    End,
    Cont,
    Hget,
    Hput,
    Hpost,
    Delete,
    Exec,
    Get,
    Show,
    Default,
    Sub,
    Unsub,
}

impl CommandKind {
    /// Map a wire command name, `None` if unrecognized
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "END" => Some(CommandKind::End),
            "CONT" => Some(CommandKind::Cont),
            "HGET" => Some(CommandKind::Hget),
            "HPUT" => Some(CommandKind::Hput),
            "HPOST" => Some(CommandKind::Hpost),
            "DELETE" => Some(CommandKind::Delete),
            "EXEC" => Some(CommandKind::Exec),
            "GET" => Some(CommandKind::Get),
            "SHOW" => Some(CommandKind::Show),
            "DEFAULT" => Some(CommandKind::Default),
            "SUB" => Some(CommandKind::Sub),
            "UNSUB" => Some(CommandKind::Unsub),
            _ => None,
        }
    }

    /// Wire command name
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::End => "END",
            CommandKind::Cont => "CONT",
            CommandKind::Hget => "HGET",
            CommandKind::Hput => "HPUT",
            CommandKind::Hpost => "HPOST",
            CommandKind::Delete => "DELETE",
            CommandKind::Exec => "EXEC",
            CommandKind::Get => "GET",
            CommandKind::Show => "SHOW",
            CommandKind::Default => "DEFAULT",
            CommandKind::Sub => "SUB",
            CommandKind::Unsub => "UNSUB",
        }
    }
}

/// One server command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub parameters: Vec<String>,
}

impl Command {
    pub fn new(kind: CommandKind, parameters: Vec<String>) -> Self {
        Self { kind, parameters }
    }

    /// Positional parameter, or `MissingParameter`
    pub fn parameter(&self, index: usize) -> Result<&str> {
        self.parameters
            .get(index)
            .map(String::as_str)
            .ok_or(Error::MissingParameter {
                command: self.kind.as_str(),
                index,
            })
    }
}

/// Outcome of one executed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub code: u16,
    pub uris: Vec<String>,
}

impl StatusRecord {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            uris: Vec::new(),
        }
    }

    pub fn with_uris(code: u16, uris: Vec<String>) -> Self {
        Self { code, uris }
    }
}

// =============================================================================
// Queue
// =============================================================================

/// How failed commands are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandPolicy {
    /// Append an error status for failed HGET commands
    pub report_failed_fetches: bool,
    pub fetch_retry: RetryPolicy,
}

impl From<&ClientConfig> for CommandPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            report_failed_fetches: config.report_failed_fetches,
            fetch_retry: config.fetch_retry,
        }
    }
}

/// Pending commands and pending statuses
pub struct CommandQueue {
    transport: SharedTransport,
    policy: CommandPolicy,
    commands: VecDeque<Command>,
    statuses: VecDeque<StatusRecord>,
}

impl CommandQueue {
    /// Create an empty queue
    ///
    /// # Arguments
    /// * `transport` - Used for HGET fetches
    /// * `policy` - Failure reporting and retry settings
    pub fn new(transport: SharedTransport, policy: CommandPolicy) -> Self {
        Self {
            transport,
            policy,
            commands: VecDeque::new(),
            statuses: VecDeque::new(),
        }
    }

    /// Queue a command for execution
    pub fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Queue a status for the next P3
    pub fn push_status(&mut self, status: StatusRecord) {
        self.statuses.push_back(status);
    }

    /// Number of commands waiting for execution
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Number of statuses waiting for P3
    pub fn pending_statuses(&self) -> usize {
        self.statuses.len()
    }

    /// Execute every queued command in order
    pub fn drain_and_execute(&mut self, registry: &MoRegistry) {
        while let Some(command) = self.commands.pop_front() {
            log::debug!(
                "Executing {} {:?}",
                command.kind.as_str(),
                command.parameters
            );
            match command.kind {
                CommandKind::Hget => match self.execute_hget(&command, registry) {
                    Ok(()) => self.push_status(StatusRecord::new(StatusCode::OK)),
                    Err(e) => {
                        log::error!("HGET failed: {}", e);
                        if self.policy.report_failed_fetches {
                            self.push_status(StatusRecord::new(e.status_code()));
                        }
                    }
                },
                _ => self.push_status(StatusRecord::new(StatusCode::NOT_IMPLEMENTED)),
            }
        }
    }

    /// Take every queued status in order
    pub fn drain_statuses(&mut self) -> Vec<StatusRecord> {
        self.statuses.drain(..).collect()
    }

    /// `HGET server_uri client_uri`
    fn execute_hget(&self, command: &Command, registry: &MoRegistry) -> Result<()> {
        let server_uri = command.parameter(0)?;
        // TODO: let the client pick a location when client_uri is omitted
        let client_uri = command.parameter(1)?;
        let url = ServerUrl::parse(server_uri)?;

        log::info!("HGET {} -> {}", url, client_uri);
        let body = self.fetch(&url)?;
        log::debug!("HGET body: {}", body);

        if !registry.node_set(client_uri, &Value::String(body)) {
            log::warn!("HGET content not stored at {}", client_uri);
        }
        Ok(())
    }

    fn fetch(&self, url: &ServerUrl) -> Result<String> {
        let retry = self.policy.fetch_retry;
        let mut attempt = 1;
        loop {
            match self.transport.get(url) {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                    log::warn!(
                        "GET {} failed (attempt {}/{}): {}",
                        url,
                        attempt,
                        retry.max_attempts,
                        e
                    );
                    thread::sleep(retry.backoff(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
