//! HTTP transport
//!
//! The session and the command queue talk to the network only through the
//! [`Transport`] trait. [`HttpTransport`] is the blocking `ureq` implementation
//! used in production; every request it makes carries a bounded timeout.

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use ureq::{Agent, AgentBuilder};

use crate::error::{Error, Result};

/// Port used when a server URL does not name one
pub const DEFAULT_PORT: u16 = 8080;

/// Largest resource body accepted by [`HttpTransport::get`] (64 MiB)
pub const MAX_RESOURCE_BYTES: u64 = 64 * 1024 * 1024;

/// Header carrying the device id
pub const DEVICE_ID_HEADER: &str = "OMADM-DevID";

/// Blocking request/response capability
pub trait Transport {
    /// POST a body and return the reply body
    ///
    /// # Arguments
    /// * `url` - Target URL
    /// * `headers` - Extra request headers, content type included
    /// * `body` - Request body
    fn post(&self, url: &str, headers: &[(&str, &str)], body: &str) -> Result<String>;

    /// GET a resource and return its body
    fn get(&self, url: &ServerUrl) -> Result<String>;
}

/// Transport shared between the session and the command queue
pub type SharedTransport = Arc<dyn Transport + Send + Sync>;

// =============================================================================
// URL parsing
// =============================================================================

/// URL scheme accepted in server-supplied URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Parse a scheme name, case-insensitive
    pub fn from_name(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else {
            None
        }
    }

    /// Lowercase scheme name
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Parsed `scheme://[userinfo@]host[:port][/path]` URL
///
/// `Display` leaves out the userinfo so URLs can be logged;
/// [`ServerUrl::request_url`] keeps it for the actual request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl {
    pub scheme: Scheme,
    pub userinfo: Option<String>,
    /// Host name or address, IPv6 literals kept in brackets
    pub host: String,
    pub port: u16,
    /// Path including any query, always starting with `/`
    pub path: String,
}

impl ServerUrl {
    /// Parse a URL
    ///
    /// The port defaults to 8080 for both schemes and the path to `/`.
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::Url(format!("{}: missing scheme", url)))?;
        let scheme = Scheme::from_name(scheme)
            .ok_or_else(|| Error::Url(format!("{}: unsupported scheme {}", url, scheme)))?;

        let (authority, path) = match rest.find(['/', '?']) {
            Some(i) if rest[i..].starts_with('/') => (&rest[..i], rest[i..].to_string()),
            Some(i) => (&rest[..i], format!("/{}", &rest[i..])),
            None => (rest, "/".to_string()),
        };

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(userinfo.to_string()), host_port),
            None => (None, authority),
        };

        let (host, port) = if host_port.starts_with('[') {
            let end = host_port
                .find(']')
                .ok_or_else(|| Error::Url(format!("{}: unterminated IPv6 address", url)))?;
            let (host, after) = host_port.split_at(end + 1);
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(Error::Url(format!(
                            "{}: unexpected {} after IPv6 address",
                            url, after
                        )))
                    }
                },
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host_port, None),
            }
        };

        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| Error::Url(format!("{}: invalid port {}: {}", url, port, e)))?,
            None => DEFAULT_PORT,
        };

        if host.is_empty() || host == "[]" {
            return Err(Error::Url(format!("{}: missing host", url)));
        }

        Ok(Self {
            scheme,
            userinfo,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Full URL for the request, userinfo included
    pub fn request_url(&self) -> String {
        match &self.userinfo {
            Some(userinfo) => format!(
                "{}://{}@{}:{}{}",
                self.scheme.as_str(),
                userinfo,
                self.host,
                self.port,
                self.path
            ),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

// =============================================================================
// ureq transport
// =============================================================================

/// Blocking HTTP(S) transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: Agent,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &str, headers: &[(&str, &str)], body: &str) -> Result<String> {
        let mut request = self.agent.post(url);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let response = request.send_string(body).map_err(transport_error)?;
        log::debug!("POST {} -> HTTP {}", url, response.status());
        response
            .into_string()
            .map_err(|e| Error::Transport(format!("reading reply from {}: {}", url, e)))
    }

    fn get(&self, url: &ServerUrl) -> Result<String> {
        let response = self
            .agent
            .get(&url.request_url())
            .call()
            .map_err(transport_error)?;
        let url = url.to_string();
        log::debug!("GET {} -> HTTP {}", url, response.status());

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_RESOURCE_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Transport(format!("reading body of {}: {}", url, e)))?;
        resource_text(&url, bytes)
    }
}

/// Check a fetched body against the size cap and decode it as UTF-8
///
/// Both failures are permanent, so they surface as `Error::Decode` and are
/// never retried.
fn resource_text(url: &str, bytes: Vec<u8>) -> Result<String> {
    if bytes.len() as u64 > MAX_RESOURCE_BYTES {
        return Err(Error::Decode(format!(
            "{}: body exceeds {} bytes",
            url, MAX_RESOURCE_BYTES
        )));
    }
    String::from_utf8(bytes)
        .map_err(|e| Error::Decode(format!("{}: body is not UTF-8: {}", url, e.utf8_error())))
}

fn transport_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            Error::Transport(format!("{} replied HTTP {}", response.get_url(), code))
        }
        ureq::Error::Transport(transport) => Error::Transport(transport.to_string()),
    }
}

// =============================================================================
// Scripted transport for tests
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_url() {
        let url = ServerUrl::parse("HTTPS://updates.example.com:8443/pkg/v2?id=7").unwrap();
        assert_eq!(url.scheme, Scheme::Https);
        assert_eq!(url.host, "updates.example.com");
        assert_eq!(url.port, 8443);
        assert_eq!(url.path, "/pkg/v2?id=7");
    }

    #[test]
    fn test_parse_defaults() {
        let url = ServerUrl::parse("http://localhost").unwrap();
        assert_eq!(url.port, DEFAULT_PORT);
        assert_eq!(url.path, "/");
        assert_eq!(url.to_string(), "http://localhost:8080/");

        let url = ServerUrl::parse("https://localhost?x=1").unwrap();
        assert_eq!(url.port, DEFAULT_PORT);
        assert_eq!(url.path, "/?x=1");
    }

    #[test]
    fn test_parse_ipv6_host() {
        let url = ServerUrl::parse("http://[::1]/x").unwrap();
        assert_eq!(url.host, "[::1]");
        assert_eq!(url.port, DEFAULT_PORT);
        assert_eq!(url.path, "/x");
        assert_eq!(url.to_string(), "http://[::1]:8080/x");

        let url = ServerUrl::parse("https://[fe80::2]:9443").unwrap();
        assert_eq!(url.host, "[fe80::2]");
        assert_eq!(url.port, 9443);
        assert_eq!(url.path, "/");
    }

    #[test]
    fn test_parse_userinfo() {
        let url = ServerUrl::parse("http://u:p@h/x").unwrap();
        assert_eq!(url.userinfo.as_deref(), Some("u:p"));
        assert_eq!(url.host, "h");
        assert_eq!(url.port, DEFAULT_PORT);
        // Credentials stay out of the loggable form
        assert_eq!(url.to_string(), "http://h:8080/x");
        assert_eq!(url.request_url(), "http://u:p@h:8080/x");

        let url = ServerUrl::parse("http://h:81/x").unwrap();
        assert_eq!(url.userinfo, None);
        assert_eq!(url.request_url(), "http://h:81/x");
    }

    #[test]
    fn test_resource_text() {
        assert_eq!(resource_text("u", b"COFFEEBABE".to_vec()).unwrap(), "COFFEEBABE");

        let err = resource_text("u", vec![0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        for url in [
            "localhost/path",
            "ftp://host/file",
            "http://host:port/x",
            "http://host:99999/",
            "http:///path",
            "http://[::1/x",
            "http://[::1]x/",
            "http://[]:80/",
            "http://u:p@/x",
        ] {
            assert!(
                matches!(ServerUrl::parse(url), Err(Error::Url(_))),
                "{url} should be rejected"
            );
        }
    }
}
