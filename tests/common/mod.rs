//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum_server::Handle;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use tls_connect_proxy::config::ProxyConfig;
use tls_connect_proxy::lifecycle::Shutdown;
use tls_connect_proxy::net::connection::TunnelTracker;
use tls_connect_proxy::net::tls::load_tls_config;
use tls_connect_proxy::tunnel::{EventSink, TunnelEvent};
use tls_connect_proxy::ProxyServer;

/// Event sink that keeps the name of every event it sees.
#[derive(Default)]
pub struct RecordingSink {
    names: Mutex<Vec<&'static str>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.names.lock().unwrap().clone()
    }

    /// Event names without the state-machine noise.
    pub fn milestones(&self) -> Vec<&'static str> {
        self.names()
            .into_iter()
            .filter(|name| *name != "state_changed")
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: TunnelEvent<'_>) {
        self.names.lock().unwrap().push(event.name());
    }
}

/// A running proxy plus everything a test needs to talk to it.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: TunnelTracker,
    pub events: Arc<RecordingSink>,
    cert: CertificateDer<'static>,
    _certs: TempDir,
}

impl TestProxy {
    /// Open a TLS connection offering only `http/1.1`.
    pub async fn connect(&self) -> TlsStream<TcpStream> {
        self.connect_with_alpn(vec![b"http/1.1".to_vec()]).await
    }

    pub async fn connect_with_alpn(&self, alpn: Vec<Vec<u8>>) -> TlsStream<TcpStream> {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert.clone()).unwrap();

        let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = alpn;

        let tcp = TcpStream::connect(self.addr).await.unwrap();
        let server_name = ServerName::try_from("localhost").unwrap();
        TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .unwrap()
    }
}

/// Start a proxy on an ephemeral port with a freshly generated certificate.
pub async fn start_proxy() -> TestProxy {
    let certs = tempfile::tempdir().unwrap();
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = certs.path().join("proxy.crt");
    let key_path = certs.path().join("proxy.key");
    std::fs::write(&cert_path, generated.cert.pem()).unwrap();
    std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.tls.cert_path = cert_path.to_string_lossy().into_owned();
    config.listener.tls.key_path = key_path.to_string_lossy().into_owned();
    config.timeouts.dial_secs = 2;
    config.timeouts.shutdown_grace_secs = 1;

    let tls = load_tls_config(&cert_path, &key_path).unwrap();
    let events = Arc::new(RecordingSink::default());
    let server = ProxyServer::with_events(config, events.clone());
    let tracker = server.tracker();
    let shutdown = Shutdown::new();
    let handle = Handle::new();

    let receiver = shutdown.subscribe();
    let server_handle = handle.clone();
    tokio::spawn(async move {
        let _ = server.run(tls, server_handle, receiver).await;
    });

    let addr = tokio::time::timeout(Duration::from_secs(5), handle.listening())
        .await
        .expect("proxy did not start listening")
        .expect("proxy failed to bind");

    TestProxy {
        addr,
        shutdown,
        tracker,
        events,
        cert: generated.cert.der().clone(),
        _certs: certs,
    }
}

/// Start a target that echoes every byte back and closes after EOF.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });

    addr
}

/// Start a target that writes `greeting` and closes immediately.
pub async fn start_closing_server(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(greeting).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

/// Start a target that hands everything it received, up to EOF, to the test.
pub async fn start_sink_server() -> (SocketAddr, tokio::sync::mpsc::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let _ = socket.read_to_end(&mut received).await;
                let _ = tx.send(received).await;
            });
        }
    });

    (addr, rx)
}

/// A TCP port with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Parsed HTTP response head plus body.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Send a CONNECT request for `target`.
pub async fn send_connect<S: AsyncWrite + Unpin>(stream: &mut S, target: &str) {
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

/// Send a plain request with an origin-form path.
pub async fn send_request<S: AsyncWrite + Unpin>(stream: &mut S, method: &str, path: &str) {
    let request =
        format!("{method} {path} HTTP/1.1\r\nHost: example.com\r\nContent-Length: 0\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

/// Read exactly one response. The head is read byte by byte so nothing
/// that follows it (tunnel bytes) is consumed.
pub async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> RawResponse {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "connection closed before the response head ended");
        head.push(byte[0]);
    }

    let head = String::from_utf8(head).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("malformed status line");

    let headers: Vec<(String, String)> = lines
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();

    RawResponse {
        status,
        headers,
        body: String::from_utf8(body).unwrap(),
    }
}

/// Read until the peer closes. Errors count as closed: the TLS client
/// reports a missing close_notify as an error.
pub async fn read_until_closed<S: AsyncRead + Unpin>(stream: &mut S) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return received,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
}
