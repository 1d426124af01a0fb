//! WebSocket chat gateway server.

use crate::error::GatewayError;
use crate::handlers;
use crate::registry::{ConnectionRegistry, Slot};
use crate::session::{self, Session};
use crate::ticket::TicketVault;
use crate::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chatrelay_core::config::BindMode;
use chatrelay_core::{Config, HistoryPayload};
use chatrelay_store::IdentityStore;
use futures::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared state behind every endpoint.
pub struct GatewayState {
    /// Configuration.
    pub config: Config,

    /// Outstanding one-time tickets.
    pub vault: Arc<TicketVault>,

    /// Live sessions.
    pub registry: Arc<ConnectionRegistry>,

    /// Users and message history.
    pub store: Arc<dyn IdentityStore>,

    /// When the state was created.
    pub started_at: Instant,
}

impl GatewayState {
    /// Create state for `config` backed by `store`.
    pub fn new(config: Config, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            vault: Arc::new(TicketVault::new(config.tickets.retention())),
            registry: Arc::new(ConnectionRegistry::new(
                config.gateway.max_connections,
                config.session.max_dropped_messages,
            )),
            store,
            started_at: Instant::now(),
            config,
        }
    }

    /// Whether the request's `Origin` is on the allow-list. Requests without
    /// an `Origin` header come from non-browser clients and are allowed.
    pub fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        let origin = match headers.get(header::ORIGIN) {
            Some(value) => value,
            None => return true,
        };

        let allowed = origin.to_str().map_or(false, |origin| {
            self.config
                .gateway
                .allowed_origins
                .iter()
                .any(|allowed| allowed == origin)
        });

        if !allowed {
            warn!("Rejected connection from untrusted origin: {:?}", origin);
        }
        allowed
    }

    /// Run the upgrade checks in order: origin, ticket presence, capacity,
    /// ticket verification.
    ///
    /// Capacity is reserved before the ticket is consumed, so a client turned
    /// away for lack of room can retry with the same ticket. The returned
    /// admission holds the reserved slot; dropping it gives the slot back.
    pub async fn authorize_upgrade(&self, headers: &HeaderMap, ticket: Option<&str>) -> Result<Admission> {
        if !self.origin_allowed(headers) {
            return Err(GatewayError::AuthRejected("origin not allowed".to_string()));
        }

        let key = ticket
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GatewayError::AuthRejected("missing ticket".to_string()))?;

        let slot = self
            .registry
            .reserve()
            .ok_or_else(|| GatewayError::CapacityExceeded(self.registry.capacity()))?;

        let identity = self
            .vault
            .verify_and_consume(key)
            .await
            .map_err(|e| GatewayError::AuthRejected(e.to_string()))?
            .ok_or_else(|| GatewayError::AuthRejected("ticket has no identity".to_string()))?;

        Ok(Admission { identity, slot })
    }
}

/// An upgrade that passed every check.
#[derive(Debug)]
pub struct Admission {
    /// Identity the ticket was bound to.
    pub identity: String,

    slot: Slot,
}

/// The chat gateway.
#[derive(Clone)]
pub struct Gateway {
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a new gateway.
    pub fn new(config: Config, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, store)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Token that stops the server and the ticket sweep when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Begin graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let addr = self.bind_address();

        if self.state.config.gateway.bind != BindMode::Loopback {
            warn!("Gateway binding to {}; it is reachable from the network", addr);
        }

        let listener = TcpListener::bind(addr).await.map_err(GatewayError::Io)?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let sweeper = self.state.vault.spawn_sweeper(
            self.state.config.tickets.sweep_interval(),
            self.shutdown.clone(),
        );

        info!("Starting gateway server on {}", addr);

        let shutdown = self.shutdown.clone();
        let registry = Arc::clone(&self.state.registry);
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                registry.close_all().await;
            })
            .await;

        // Stop the sweep even when the server failed on its own.
        self.shutdown.cancel();
        if let Err(e) = sweeper.await {
            error!("Ticket sweeper failed: {}", e);
        }

        served.map_err(|e| GatewayError::Internal(e.to_string()))?;
        info!("Gateway server stopped");
        Ok(())
    }

    /// Create the Axum router.
    pub fn router(&self) -> Router {
        let auth = Router::new()
            .route("/login", post(handlers::login))
            .route("/register", post(handlers::register))
            .layer(Self::create_cors_layer(&self.state.config));

        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(handlers::health))
            .merge(auth);

        if let Some(dir) = &self.state.config.gateway.static_dir {
            router = router.fallback_service(ServeDir::new(dir));
        }

        router
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// CORS for the auth endpoints, limited to the allowed origins.
    fn create_cors_layer(config: &Config) -> CorsLayer {
        let origins: Vec<HeaderValue> = config
            .gateway
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    }

    /// Get the bind address.
    pub fn bind_address(&self) -> SocketAddr {
        let ip = match self.state.config.gateway.bind {
            BindMode::Loopback => [127, 0, 0, 1],
            BindMode::Lan => [0, 0, 0, 0],
        };

        SocketAddr::from((ip, self.state.config.gateway.port))
    }
}

#[derive(Debug, Deserialize)]
struct UpgradeQuery {
    ticket: Option<String>,
}

/// `GET /ws?ticket=<key>`
async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    headers: HeaderMap,
    Query(query): Query<UpgradeQuery>,
    State(state): State<Arc<GatewayState>>,
) -> Result<Response> {
    // Checked first so a plain GET never consumes a ticket.
    let ws = ws.ok_or_else(|| {
        GatewayError::BadRequest("expected a WebSocket upgrade request".to_string())
    })?;

    let admission = state
        .authorize_upgrade(&headers, query.ticket.as_deref())
        .await?;

    Ok(ws
        .on_upgrade(move |socket| accept(state, socket, admission))
        .into_response())
}

/// Register the session, push history, start the pumps.
async fn accept(state: Arc<GatewayState>, socket: WebSocket, admission: Admission) {
    let Admission { identity, slot } = admission;
    let (writer, reader) = socket.split();
    let (session, outbound) = Session::new(identity, state.config.session.outbound_capacity);
    state.registry.add(Arc::clone(&session), slot).await;

    let messages = match state.store.history().await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(session = %session.id(), "Failed to load history: {}", e);
            Vec::new()
        }
    };
    debug!(session = %session.id(), count = messages.len(), "sending history");

    match serde_json::to_string(&HistoryPayload::new(messages)) {
        Ok(json) => {
            if let Err(e) = session.enqueue(json.into()) {
                warn!(session = %session.id(), "Failed to queue history: {:?}", e);
            }
        }
        Err(e) => error!("Failed to serialize history: {}", e),
    }

    session::start(
        reader,
        writer,
        outbound,
        session,
        Arc::clone(&state.registry),
        Arc::clone(&state.store),
        &state.config.keepalive,
    );
}
