use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::platform::line::{self, WebhookPayload, SIGNATURE_HEADER};
use crate::platform::{IncomingMessage, ReplySink};
use crate::router::Router;

/// Shared state handed to every webhook request
#[derive(Clone)]
pub struct AppState {
    router: Arc<Router>,
    sink: Arc<dyn ReplySink>,
    channel_secret: Arc<str>,
}

impl AppState {
    pub fn new(router: Arc<Router>, sink: Arc<dyn ReplySink>, channel_secret: &str) -> Self {
        Self {
            router,
            sink,
            channel_secret: Arc::from(channel_secret),
        }
    }
}

pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/callback", post(callback))
        .with_state(state)
}

/// Serve the webhook until Ctrl-C.
pub async fn run(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook listening on http://{}/callback", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await
        .context("Server error")?;

    Ok(())
}

async fn callback(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(sig) => sig,
        None => {
            warn!("Rejected webhook request: missing signature header");
            return (StatusCode::BAD_REQUEST, "Missing signature").into_response();
        }
    };

    if !line::verify_signature(&state.channel_secret, &body, signature) {
        warn!("Rejected webhook request: invalid signature");
        return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
    }

    debug!("Request body: {}", String::from_utf8_lossy(&body));

    let payload = match WebhookPayload::parse(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!("Rejected webhook request: {:#}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };

    debug!(
        destination = payload.destination.as_deref().unwrap_or("-"),
        events = payload.events.len(),
        "Webhook received"
    );

    let messages = payload.into_text_messages();
    join_all(messages.iter().map(|m| handle_message(&state, m))).await;

    (StatusCode::OK, "OK").into_response()
}

async fn handle_message(state: &AppState, incoming: &IncomingMessage) {
    let replies = state.router.route(incoming).await;

    if let Err(e) = state.sink.deliver(&incoming.reply_token, &replies).await {
        error!("Failed to deliver reply: {:#}", e);
    }
}
