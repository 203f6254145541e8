//! Session state machine
//!
//! A session is one P1 followed by any number of P2/P3 exchanges:
//!
//! ```text
//! Idle -> P1 -> P2 -> (P3Cont -> P2)* -> P3End -> Idle
//! ```
//!
//! [`Session`] sends the client packages and decodes the server commands.
//! The loop itself is driven by [`crate::client::DmClient`].

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::command::{Command, CommandKind, CommandQueue, StatusRecord};
use crate::config::{ClientConfig, PayloadEncoding};
use crate::error::{Error, Result, StatusCode};
use crate::package::{P2Package, RawCommand, P1_CONTENT_TYPE, P2_ACCEPT, P3_CONTENT_TYPE};
use crate::transport::{SharedTransport, DEVICE_ID_HEADER};

/// Position in the package exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session running
    #[default]
    Idle,
    /// P1 being sent
    P1,
    /// P2 being decoded
    P2,
    /// P2 asked to continue, P3 due
    P3Cont,
    /// Session ended by END or a decode failure
    P3End,
}

/// Result of decoding one P2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2Outcome {
    /// Commands queued, a P3 is due
    Continue,
    /// Server sent END
    End,
    /// Package could not be decoded
    DecodeFailure,
}

/// Package exchange with the management server
pub struct Session {
    transport: SharedTransport,
    server_url: String,
    device_id: String,
    encoding: PayloadEncoding,
    report_unknown_commands: bool,
    state: SessionState,
}

impl Session {
    /// Create a session bound to the configured server
    pub fn new(transport: SharedTransport, config: &ClientConfig) -> Self {
        Self {
            transport,
            server_url: config.server_url.clone(),
            device_id: config.device_id.clone(),
            encoding: config.payload_encoding,
            report_unknown_commands: config.report_unknown_commands,
            state: SessionState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Device id sent in `OMADM-DevID`
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn set_device_id(&mut self, device_id: impl Into<String>) {
        self.device_id = device_id.into();
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("Session {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Return to idle after the loop ended
    pub fn finish(&mut self) {
        self.transition(SessionState::Idle);
    }

    /// Send P1, returning the server's reply (the first P2)
    pub fn send_p1(&mut self, payload: &str) -> Result<String> {
        self.transition(SessionState::P1);
        log::debug!("P1: {}", payload);
        self.send(payload, P1_CONTENT_TYPE)
            .inspect_err(|e| log::error!("Sending P1 failed: {}", e))
    }

    /// Send P3, returning the server's reply (the next P2)
    pub fn send_p3(&mut self, payload: &str) -> Result<String> {
        log::debug!("P3: {}", payload);
        self.send(payload, P3_CONTENT_TYPE)
            .inspect_err(|e| log::error!("Sending P3 failed: {}", e))
    }

    fn send(&self, payload: &str, content_type: &str) -> Result<String> {
        let body = match self.encoding {
            PayloadEncoding::Json => payload.to_string(),
            PayloadEncoding::Base64 => STANDARD.encode(payload),
        };
        let headers = [
            (DEVICE_ID_HEADER, self.device_id.as_str()),
            ("Accept", P2_ACCEPT),
            ("Content-Type", content_type),
        ];
        let reply = self.transport.post(&self.server_url, &headers, &body)?;

        match self.encoding {
            PayloadEncoding::Json => Ok(reply),
            PayloadEncoding::Base64 => {
                let bytes = STANDARD
                    .decode(reply.trim())
                    .map_err(|e| Error::Decode(format!("reply is not base64: {}", e)))?;
                String::from_utf8(bytes)
                    .map_err(|e| Error::Decode(format!("reply is not UTF-8: {}", e)))
            }
        }
    }

    /// Decode a P2 and queue its commands
    ///
    /// # Returns
    /// `true` if the session continues, `false` after END or when the
    /// package could not be decoded
    pub fn parse_p2(&mut self, payload: &str, queue: &mut CommandQueue) -> bool {
        self.decode_p2(payload, queue) == P2Outcome::Continue
    }

    /// Decode a P2 and queue its commands, telling why the session stops
    pub fn decode_p2(&mut self, payload: &str, queue: &mut CommandQueue) -> P2Outcome {
        self.transition(SessionState::P2);
        log::debug!("P2: {}", payload);

        let package = match P2Package::decode(payload) {
            Ok(package) => package,
            Err(e) => {
                log::error!("Failed to decode P2, ending session: {}", e);
                self.transition(SessionState::P3End);
                return P2Outcome::DecodeFailure;
            }
        };

        let mut session_continue = true;
        for entry in &package.entries {
            let Some(raw) = RawCommand::from_entry(entry) else {
                log::warn!("Ignoring malformed P2 command {}", entry);
                continue;
            };
            match CommandKind::from_name(&raw.name) {
                Some(CommandKind::End) => {
                    log::info!("Received END command");
                    session_continue = false;
                }
                Some(kind) => {
                    log::debug!("Received {} command", kind.as_str());
                    queue.push(Command::new(kind, raw.parameters));
                }
                None if self.report_unknown_commands => {
                    log::warn!("Received unknown command {}, answering 501", raw.name);
                    queue.push_status(StatusRecord::new(StatusCode::NOT_IMPLEMENTED));
                }
                None => log::warn!("Received unknown command {}, ignoring", raw.name),
            }
        }

        if session_continue {
            self.transition(SessionState::P3Cont);
            P2Outcome::Continue
        } else {
            self.transition(SessionState::P3End);
            P2Outcome::End
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandPolicy;
    use crate::transport::fake::FakeTransport;
    use std::sync::Arc;

    fn session(config: &ClientConfig, transport: FakeTransport) -> (Session, CommandQueue, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let session = Session::new(transport.clone(), config);
        let queue = CommandQueue::new(transport.clone(), CommandPolicy::from(config));
        (session, queue, transport)
    }

    #[test]
    fn test_parse_p2_queues_commands() {
        let (mut session, mut queue, _) = session(&ClientConfig::default(), FakeTransport::new());

        let cont = session.parse_p2(
            r#"{"CMD": [["HGET", "http://h/x", "t/1/A"], ["CONT"], ["GET", 7]]}"#,
            &mut queue,
        );

        assert!(cont);
        assert_eq!(session.state(), SessionState::P3Cont);
        assert_eq!(queue.pending_commands(), 3);
    }

    #[test]
    fn test_end_stops_the_session() {
        let (mut session, mut queue, _) = session(&ClientConfig::default(), FakeTransport::new());

        assert!(!session.parse_p2(r#"{"CMD": [["SHOW", "a"], ["END"]]}"#, &mut queue));
        assert_eq!(session.state(), SessionState::P3End);
        // END itself is never queued
        assert_eq!(queue.pending_commands(), 1);

        session.finish();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_decode_outcomes() {
        let (mut session, mut queue, _) = session(&ClientConfig::default(), FakeTransport::new());

        assert_eq!(session.decode_p2(r#"{"CMD": []}"#, &mut queue), P2Outcome::Continue);
        assert_eq!(session.decode_p2(r#"{"CMD": [["END"]]}"#, &mut queue), P2Outcome::End);
        assert_eq!(session.decode_p2("", &mut queue), P2Outcome::DecodeFailure);
    }

    #[test]
    fn test_decode_failure_ends_session() {
        let (mut session, mut queue, _) = session(&ClientConfig::default(), FakeTransport::new());

        for payload in ["", "{not json", r#"{"CMD": {}}"#, r#"{}"#] {
            assert!(!session.parse_p2(payload, &mut queue));
        }
        assert_eq!(queue.pending_commands(), 0);
    }

    #[test]
    fn test_unknown_commands_dropped_by_default() {
        let (mut session, mut queue, _) = session(&ClientConfig::default(), FakeTransport::new());

        assert!(session.parse_p2(r#"{"CMD": [["FOO"], [], [1], ["UNSUB"]]}"#, &mut queue));
        assert_eq!(queue.pending_commands(), 1);
        assert_eq!(queue.pending_statuses(), 0);
    }

    #[test]
    fn test_unknown_commands_reported_when_enabled() {
        let config = ClientConfig {
            report_unknown_commands: true,
            ..ClientConfig::default()
        };
        let (mut session, mut queue, _) = session(&config, FakeTransport::new());

        assert!(session.parse_p2(r#"{"CMD": [["FOO"]]}"#, &mut queue));
        assert_eq!(queue.pending_commands(), 0);
        assert_eq!(queue.drain_statuses(), vec![StatusRecord::new(501)]);
    }

    #[test]
    fn test_send_headers() {
        let config = ClientConfig {
            device_id: "PlanB".into(),
            ..ClientConfig::default()
        };
        let transport = FakeTransport::new()
            .reply(Some(r#"{"CMD": [["CONT"]]}"#))
            .reply(Some(r#"{"CMD": [["END"]]}"#));
        let (mut session, _, transport) = session(&config, transport);

        assert_eq!(session.send_p1(r#"{"MOS": []}"#).unwrap(), r#"{"CMD": [["CONT"]]}"#);
        assert_eq!(session.send_p3(r#"{"SC": []}"#).unwrap(), r#"{"CMD": [["END"]]}"#);

        let sent = transport.sent();
        assert_eq!(sent[0].url, "http://localhost:9988/path");
        assert_eq!(sent[0].body, r#"{"MOS": []}"#);
        let header = |i: usize, name: &str| {
            sent[i]
                .headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(header(0, "OMADM-DevID").as_deref(), Some("PlanB"));
        assert_eq!(header(0, "Accept").as_deref(), Some(P2_ACCEPT));
        assert_eq!(header(0, "Content-Type").as_deref(), Some(P1_CONTENT_TYPE));
        assert_eq!(header(1, "Content-Type").as_deref(), Some(P3_CONTENT_TYPE));
    }

    #[test]
    fn test_send_failure() {
        let (mut session, _, _) = session(&ClientConfig::default(), FakeTransport::new().reply(None));
        assert!(matches!(session.send_p1("{}"), Err(Error::Transport(_))));
    }

    #[test]
    fn test_base64_encoding() {
        let config = ClientConfig {
            payload_encoding: PayloadEncoding::Base64,
            ..ClientConfig::default()
        };
        let reply = STANDARD.encode(r#"{"CMD": [["END"]]}"#);
        let transport = FakeTransport::new().reply(Some(&reply)).reply(Some("%%%"));
        let (mut session, _, transport) = session(&config, transport);

        assert_eq!(session.send_p1(r#"{"MOS":[]}"#).unwrap(), r#"{"CMD": [["END"]]}"#);
        assert_eq!(transport.sent()[0].body, STANDARD.encode(r#"{"MOS":[]}"#));
        assert!(matches!(session.send_p3("{}"), Err(Error::Decode(_))));
    }
}
