//! Webhook HTTP endpoint.
//!
//! Binds the axum router that git hosting providers deliver push webhooks to.
//! Each `POST /` runs through the same pipeline:
//!
//! 1. authorise the peer address against [`deploy::AddressAllowlist`], before
//!    the body is read;
//! 2. decode the body (JSON, or a form field named `payload`);
//! 3. [`deploy::resolve`] it to a [`deploy::DeployIntent`];
//! 4. sync the working directory through [`deploy::RepoSynchronizer`] on a
//!    task that outlives the request;
//! 5. hand the outcome to [`deploy::NotificationSink`] on a detached task.
//!
//! ## Responses
//!
//! | Situation | Status | Body |
//! |-----------|--------|------|
//! | Peer outside every allowed range | 200 | `ERROR` |
//! | Anything else on `POST /`, including failed deploys | 200 | `OK` |
//! | Any other method on `/` | 200 | `OK` |
//! | `GET /health` | 200 | `OK` |
//!
//! Providers therefore never see a deploy failure; failures reach operators
//! through the log and the notification sink.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and body decoding live here. Decisions
//! are delegated to the [`deploy`] crate; side effects to its ports.

mod body;
mod gateway;

use std::future::Future;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use deploy::DeliveryId;
use tokio::net::TcpListener;
use tracing::{info, info_span, Instrument};

pub use body::{decode_body, parse_lenient};
pub use gateway::{WebhookGateway, WebhookReply};

/// Largest accepted request body. Bitbucket pushes with many commits are large.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Builds the router for `gateway`.
///
/// The router needs the peer address, so it must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()` (see [`serve`]).
pub fn router(gateway: WebhookGateway) -> Router {
    let webhook = post(receive_webhook)
        .route_layer(middleware::from_fn_with_state(
            gateway.clone(),
            authorize_peer,
        ))
        .fallback(acknowledge);

    Router::new()
        .route("/", webhook)
        .route("/health", get(acknowledge))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(gateway)
}

/// Serves the webhook router on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    gateway: WebhookGateway,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening for webhooks");
    }
    axum::serve(
        listener,
        router(gateway).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Opens the per-delivery span and turns away unknown peers before the body
/// is buffered.
async fn authorize_peer(
    State(gateway): State<WebhookGateway>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let delivery = DeliveryId::new_random();
    let peer = peer.ip().to_canonical();
    let span = info_span!("webhook", %delivery, %peer);

    if span.in_scope(|| gateway.authorize(peer)).is_err() {
        return WebhookReply::Error.as_str().into_response();
    }
    next.run(request).instrument(span).await
}

async fn receive_webhook(
    State(gateway): State<WebhookGateway>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    gateway
        .handle(peer.ip().to_canonical(), content_type, &body)
        .await
        .as_str()
}

async fn acknowledge() -> &'static str {
    WebhookReply::Ok.as_str()
}
