//! Shared harness for the chatrelay integration tests.
//!
//! [`TestServer`] runs a real gateway on an ephemeral loopback port so tests
//! can drive it over HTTP and WebSocket exactly as a browser client would.

use chatrelay_core::Config;
use chatrelay_gateway::Gateway;
use chatrelay_store::{IdentityStore, MemoryIdentityStore};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A gateway serving on `127.0.0.1:<ephemeral>`.
pub struct TestServer {
    pub addr: SocketAddr,
    pub gateway: Gateway,
    pub http: reqwest::Client,
    handle: JoinHandle<chatrelay_gateway::Result<()>>,
}

impl TestServer {
    /// Start with an in-memory store.
    pub async fn start(config: Config) -> Self {
        Self::start_with_store(config, Arc::new(MemoryIdentityStore::new())).await
    }

    pub async fn start_with_store(config: Config, store: Arc<dyn IdentityStore>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let gateway = Gateway::new(config, store);

        let handle = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.serve(listener).await })
        };

        Self {
            addr,
            gateway,
            http: reqwest::Client::new(),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, ticket: &str) -> String {
        format!("ws://{}/ws?ticket={}", self.addr, ticket)
    }

    pub async fn register(&self, username: &str, password: &str, email: &str) -> reqwest::Response {
        self.http
            .post(self.url("/register"))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
                "email": email,
            }))
            .send()
            .await
            .expect("register request")
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.http
            .post(self.url("/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login request")
    }

    /// Register `username` and return a fresh ticket for it.
    pub async fn ticket_for(&self, username: &str) -> String {
        let email = format!("{}@example.com", username);
        let registered = self.register(username, "secret", &email).await;
        assert_eq!(registered.status(), reqwest::StatusCode::CREATED);
        self.fresh_ticket(username).await
    }

    /// Log an already registered user in again.
    pub async fn fresh_ticket(&self, username: &str) -> String {
        let response = self.login(username, "secret").await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.expect("login body");
        body["ticket"].as_str().expect("ticket field").to_string()
    }

    /// Open a WebSocket with the given ticket.
    pub async fn connect(&self, ticket: &str) -> Result<Client, tungstenite::Error> {
        self.connect_with_origin(ticket, None).await
    }

    pub async fn connect_with_origin(
        &self,
        ticket: &str,
        origin: Option<&str>,
    ) -> Result<Client, tungstenite::Error> {
        let mut request = self.ws_url(ticket).into_client_request()?;
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert("Origin", HeaderValue::from_str(origin).expect("origin header"));
        }
        let (client, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(client)
    }

    /// Register, log in and connect, consuming the history frame.
    pub async fn join(&self, username: &str) -> (Client, serde_json::Value) {
        let ticket = self.ticket_for(username).await;
        let mut client = self.connect(&ticket).await.expect("connect");
        let history = next_json(&mut client).await.expect("history frame");
        (client, history)
    }

    /// Connected sessions as reported by `/health`.
    pub async fn clients(&self) -> u64 {
        let body: serde_json::Value = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .expect("health request")
            .json()
            .await
            .expect("health body");
        body["clients"].as_u64().expect("clients field")
    }

    pub async fn stop(self) {
        self.gateway.shutdown();
        self.handle
            .await
            .expect("server task")
            .expect("server result");
    }
}

/// Next text frame parsed as JSON, skipping control frames. `None` if nothing
/// arrives within a second or the connection ends.
pub async fn next_json(client: &mut Client) -> Option<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        let frame = tokio::time::timeout_at(deadline, client.next()).await.ok()??;
        match frame.ok()? {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// HTTP status of a refused handshake.
pub fn rejected_status(err: &tungstenite::Error) -> Option<u16> {
    match err {
        tungstenite::Error::Http(response) => Some(response.status().as_u16()),
        _ => None,
    }
}
