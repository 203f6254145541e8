//! End-to-end session against a local HTTP management server

use std::io::Read;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use omadm_client::mo::new_handle;
use omadm_client::{
    ClientConfig, DmClient, Error, HttpTransport, ServerUrl, SessionEnd, StaticDataMo, Transport,
};
use serde_json::{json, Value};
use tiny_http::{Response, Server};

const FUMO_TYPE: &str = "urn:oma:mo:oma-fumo:1.0";
const FUMO_DDF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MgmtTree>
  <VerDTD>1.2</VerDTD>
  <Node>
    <NodeName>fumo</NodeName>
    <DFProperties><DFFormat><node/></DFFormat></DFProperties>
    <Node>
      <NodeName>PkgName</NodeName>
      <DFProperties><DFFormat><chr/></DFFormat></DFProperties>
    </Node>
    <Node>
      <NodeName>DownloadAndUpdate</NodeName>
      <DFProperties><DFFormat><node/></DFFormat></DFProperties>
      <Node>
        <NodeName>PkgURL</NodeName>
        <DFProperties><DFFormat><chr/></DFFormat></DFProperties>
      </Node>
    </Node>
  </Node>
</MgmtTree>"#;

/// One request seen by the test server
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    url: String,
    device_id: Option<String>,
    content_type: Option<String>,
    body: String,
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn can_bind() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_err() {
        eprintln!("skipping test: cannot bind local port");
        return false;
    }
    true
}

/// Scripted management server: each POST gets the next P2 from `script`
/// (which receives the server's port), any GET gets a FUMO package. Stops
/// after the last scripted reply.
fn spawn_server(
    script: impl FnOnce(u16) -> Vec<Value>,
) -> (u16, thread::JoinHandle<()>, Arc<Mutex<Vec<Seen>>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let post_replies = script(port);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let srv_seen = seen.clone();

    let handle = thread::spawn(move || {
        let mut replies = post_replies.into_iter();
        loop {
            let mut req = match server.recv_timeout(Duration::from_secs(10)) {
                Ok(Some(req)) => req,
                _ => break,
            };
            let header = |name: &str| {
                req.headers()
                    .iter()
                    .find(|h| h.field.to_string().eq_ignore_ascii_case(name))
                    .map(|h| h.value.to_string())
            };
            let mut entry = Seen {
                method: req.method().to_string(),
                url: req.url().to_string(),
                device_id: header("OMADM-DevID"),
                content_type: header("Content-Type"),
                body: String::new(),
            };
            req.as_reader().read_to_string(&mut entry.body).unwrap();

            let is_post = entry.method == "POST";
            srv_seen.lock().unwrap().push(entry);

            if is_post {
                match replies.next() {
                    Some(p2) => {
                        let _ = req.respond(Response::from_string(p2.to_string()));
                    }
                    None => {
                        let _ = req.respond(Response::from_string("").with_status_code(500));
                        break;
                    }
                }
                if replies.len() == 0 {
                    break;
                }
            } else {
                let package = json!({"MOData": {"fumo": {"DownloadAndUpdate": {"PkgURL": "COFFEEBABE"}}}});
                let _ = req.respond(Response::from_string(package.to_string()));
            }
        }
    });

    (port, handle, seen)
}

fn client(port: u16) -> DmClient {
    let config = ClientConfig {
        server_url: format!("http://127.0.0.1:{port}/path"),
        device_id: "PlanB".into(),
        dump_tree: true,
        timeout_ms: 5_000,
        ..ClientConfig::default()
    };
    let mut client = DmClient::new(config);
    assert!(client.register_ddf_str(FUMO_TYPE, FUMO_DDF, Some("http://localhost/dummy.ddf")));

    let mut fumo = StaticDataMo::from_ddf_str("fumo", FUMO_DDF).unwrap();
    fumo.local_set_node("PkgName", "rootfs-1.0", false);
    assert!(client.add_mo(FUMO_TYPE, new_handle(fumo), Some("apps")));
    client
}

#[test]
fn test_hget_session_over_http() {
    init_logger();
    if !can_bind() {
        return;
    }

    let (port, handle, seen) = spawn_server(|port| {
        vec![
            json!({"CMD": [[
                "HGET",
                format!("http://127.0.0.1:{port}/test_hget"),
                "urn:oma:mo:oma-fumo:1.0/apps/DownloadAndUpdate/PkgURL"
            ]]}),
            json!({"CMD": [["END"]]}),
        ]
    });

    let mut client = client(port);
    let report = client.start_session(false);
    handle.join().unwrap();

    assert_eq!(report.end, SessionEnd::EndCommand);
    assert_eq!(report.p3_sent, 1);

    let seen = seen.lock().unwrap();
    let methods: Vec<(&str, &str)> = seen
        .iter()
        .map(|s| (s.method.as_str(), s.url.as_str()))
        .collect();
    assert_eq!(
        methods,
        vec![("POST", "/path"), ("GET", "/test_hget"), ("POST", "/path")]
    );

    // P1
    assert_eq!(seen[0].device_id.as_deref(), Some("PlanB"));
    assert_eq!(
        seen[0].content_type.as_deref(),
        Some("application/vnd.oma.dm.initiation+json")
    );
    let p1: Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(
        p1["MOS"],
        json!([{"DDF": "http://localhost/dummy.ddf", "MOID": FUMO_TYPE, "MIID": ["miid1"]}])
    );
    assert_eq!(
        p1["Alert"],
        json!([{"AlertType": "urn:oma:at:dm:2.0:ClientInitiatedMgmt"}])
    );
    assert_eq!(
        p1["MgmtTree"],
        json!([{
            "MOData": {"fumo": {"PkgName": "rootfs-1.0", "DownloadAndUpdate": {"PkgURL": ""}}},
            "ClientURI": "urn:oma:mo:oma-fumo:1.0/apps/"
        }])
    );

    // P3
    assert_eq!(
        seen[2].content_type.as_deref(),
        Some("application/vnd.oma.dm.response+json")
    );
    let p3: Value = serde_json::from_str(&seen[2].body).unwrap();
    assert_eq!(p3, json!({"SC": [{"sc": 200, "URI": []}]}));
}

#[test]
fn test_unreachable_server_ends_session() {
    init_logger();
    if !can_bind() {
        return;
    }

    // Grab a free port and close it again so nothing listens there
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut client = client(port);
    let report = client.start_session(false);

    assert_eq!(report.p3_sent, 0);
    assert_eq!(report.end, SessionEnd::DecodeFailure);
    assert_eq!(client.alerts().pending_count(), 0);
}

#[test]
fn test_unknown_commands_over_http() {
    init_logger();
    if !can_bind() {
        return;
    }

    let (port, handle, seen) = spawn_server(|_| {
        vec![
            json!({"CMD": [["FOO", "x"], ["GET", "urn:oma:mo:oma-fumo:1.0/apps/PkgName"]]}),
            json!({"CMD": [["END"]]}),
        ]
    });

    let mut client = client(port);
    let report = client.start_session(true);
    handle.join().unwrap();

    assert_eq!(report.end, SessionEnd::EndCommand);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let p3: Value = serde_json::from_str(&seen[1].body).unwrap();
    // FOO dropped, GET not implemented
    assert_eq!(p3, json!({"SC": [{"sc": 501, "URI": []}]}));
}

/// Serve `body` to a single GET and return the URL to fetch
fn serve_once(body: Vec<u8>) -> (ServerUrl, thread::JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let handle = thread::spawn(move || {
        if let Ok(Some(req)) = server.recv_timeout(Duration::from_secs(10)) {
            let _ = req.respond(Response::from_data(body));
        }
    });
    let url = ServerUrl::parse(&format!("http://127.0.0.1:{port}/pkg")).unwrap();
    (url, handle)
}

#[test]
fn test_hget_fetches_large_body() {
    init_logger();
    if !can_bind() {
        return;
    }

    let size = 11 * 1024 * 1024;
    let (url, handle) = serve_once(vec![b'A'; size]);

    let body = HttpTransport::new(Duration::from_secs(30)).get(&url).unwrap();
    handle.join().unwrap();

    assert_eq!(body.len(), size);
    assert!(body.bytes().all(|b| b == b'A'));
}

#[test]
fn test_hget_rejects_binary_body_without_retry() {
    init_logger();
    if !can_bind() {
        return;
    }

    let (url, handle) = serve_once(vec![0xff, 0xfe, 0x00, 0x01]);

    let err = HttpTransport::new(Duration::from_secs(5)).get(&url).unwrap_err();
    handle.join().unwrap();

    assert!(matches!(err, Error::Decode(_)), "unexpected error {err}");
    assert!(!err.is_transient());
}
