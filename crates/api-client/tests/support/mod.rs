//! In-process HTTP/1.1 stub backend for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use propdesk_api_client::{ApiClient, LoginRedirect, MemoryStorage, Session, SessionOptions};
use propdesk_api_client::{HttpRefresher, TokenRefresher};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string.
    pub target: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.authorization.as_deref()?.strip_prefix("Bearer ")
    }
}

pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl StubResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = dyn Fn(&RecordedRequest) -> StubResponse + Send + Sync;

pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> StubResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler, recorded).await;
                });
            }
        });

        Self { addr, requests }
    }

    /// Base URL including the `/api` prefix.
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path() == path)
            .count()
    }
}

async fn serve(
    stream: TcpStream,
    handler: Arc<Handler>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut authorization = None;
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "authorization" => authorization = Some(value.to_string()),
                "content-length" => content_length = value.parse().unwrap_or(0),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let request = RecordedRequest {
        method,
        target,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    recorded.lock().unwrap().push(request.clone());

    let response = handler(&request);
    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason(response.status),
        response.body.len()
    );
    let mut stream = reader.into_inner();
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(response.body.as_bytes()).await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Status",
    }
}

/// A JWT-shaped token for `sub` expiring `secs` from now.
pub fn token_expiring_in(secs: i64, sub: &str) -> String {
    let payload = serde_json::json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "role": "Agent",
        "exp": propdesk_api_client::propdesk_api::token::now_unix() + secs,
    });
    format!("hdr.{}.sig", URL_SAFE_NO_PAD.encode(payload.to_string()))
}

#[derive(Default)]
pub struct RecordingRedirect {
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingRedirect {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self, login_path: &str, return_to: Option<&str>) {
        self.calls
            .lock()
            .unwrap()
            .push((login_path.to_string(), return_to.map(str::to_string)));
    }
}

pub struct Harness {
    pub client: Arc<ApiClient>,
    pub redirect: Arc<RecordingRedirect>,
}

impl Harness {
    pub fn session(&self) -> &Arc<Session> {
        self.client.session()
    }
}

/// Client against `server`, with `token` already stored when given.
pub fn harness(server: &StubServer, token: Option<&str>) -> Harness {
    init_tracing();

    let storage = Arc::new(MemoryStorage::new());
    if let Some(token) = token {
        use propdesk_api_client::SessionStorage;
        storage.set_item("token", token).unwrap();
    }
    let redirect = Arc::new(RecordingRedirect::default());
    let refresher: Arc<dyn TokenRefresher> = Arc::new(
        HttpRefresher::new(
            format!("{}/auth/refresh", server.api_url()),
            Duration::from_secs(5),
        )
        .unwrap(),
    );
    let session = Session::create(
        storage,
        Some(refresher),
        redirect.clone(),
        SessionOptions::default(),
    );
    let client = ApiClient::new(&server.api_url(), Duration::from_secs(5), session).unwrap();

    Harness {
        client: Arc::new(client),
        redirect,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("propdesk_api_client=debug")
        .with_test_writer()
        .try_init();
}
