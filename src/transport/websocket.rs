use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::transport::connection::{ConnectionContext, accept_subscriber};

const SOURCE: &str = "github.com/skidoodle/spotify-ws";

/// Builds the routes served on the listen port.
///
/// `/health` answers liveness checks. Every other path accepts a WebSocket
/// upgrade; plain requests get a 426 hint on `/` and a 404 elsewhere.
pub fn router(ctx: ConnectionContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(upgrade_or_reject)
        .with_state(ctx)
}

/// Serves [`router`] on `listener` until `shutdown` is cancelled.
///
/// Upgraded connections outlive this call; they run on the context's
/// tracker so the caller can wait for them to drain.
pub async fn start_websocket_server(
    listener: TcpListener,
    ctx: ConnectionContext,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let app = router(ctx).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("listener stopped accepting connections");
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn upgrade_or_reject(
    State(ctx): State<ConnectionContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) if uri.path() == "/" => {
            debug!(%peer, reason = %rejection, "plain request on websocket route");
            return upgrade_required();
        }
        Err(_) => {
            debug!(%peer, path = uri.path(), "no route");
            return (StatusCode::NOT_FOUND, "404 page not found").into_response();
        }
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    ws.on_failed_upgrade(move |e| warn!(%peer, error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| {
            let tracker = ctx.tracker.clone();
            tracker.track_future(
                async move { accept_subscriber(socket, origin.as_deref(), &ctx).await }
                    .instrument(info_span!("connection", %peer)),
            )
        })
}

fn upgrade_required() -> Response {
    (
        StatusCode::UPGRADE_REQUIRED,
        [
            (header::UPGRADE, "websocket"),
            (header::CONNECTION, "Upgrade"),
            (HeaderName::from_static("x-source"), SOURCE),
        ],
        format!("426 Upgrade Required ({SOURCE})"),
    )
        .into_response()
}
