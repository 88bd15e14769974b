//! Signaling over WebSocket.
//!
//! Each WebSocket is one signaling connection. Text frames carry one JSON
//! event each; see `callrelay_signaling::protocol` for the event set.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use callrelay_signaling::{ConnectionHandle, ConnectionSession, ServerEvent};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::server::AppState;

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(signaling_websocket_handler))
        .with_state(state)
}

/// GET /ws
///
/// Upgrades the HTTP connection to a signaling WebSocket.
async fn signaling_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("Signaling WebSocket connection request");
    ws.on_upgrade(move |socket| handle_signaling_websocket(socket, state))
}

/// Run one signaling connection until it closes.
async fn handle_signaling_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _guard = state.shutdown.connection_guard();
    let stop = state.shutdown.stop_token();

    let (handle, outbound) = ConnectionHandle::channel(state.config.outbound_buffer);
    let connection_id = handle.id();
    info!(connection_id = %connection_id, "Signaling connection established");

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(
        write_outbound(sink, outbound)
            .instrument(tracing::debug_span!("signaling_writer", connection_id = %connection_id)),
    );

    let mut session = ConnectionSession::open(state.relay.clone(), handle);

    loop {
        let msg = tokio::select! {
            _ = stop.cancelled() => {
                debug!(connection_id = %connection_id, "Server stopping, closing signaling connection");
                break;
            }
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let outcome = tokio::select! {
                    _ = stop.cancelled() => {
                        debug!(connection_id = %connection_id, "Server stopping mid-frame, closing signaling connection");
                        break;
                    }
                    outcome = session.handle_text(&text) => outcome,
                };
                debug!(connection_id = %connection_id, outcome = ?outcome, "Handled signaling frame");
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(connection_id = %connection_id, "Received binary WebSocket message (not supported for signaling)");
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                // Pong replies are queued by the WebSocket protocol layer
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(connection_id = %connection_id, "WebSocket close requested");
                break;
            }
            Some(Err(e)) => {
                debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Release the registration before the close is complete
    session.close();
    writer.abort();

    info!(connection_id = %connection_id, "Signaling connection closed");
}

/// Drain a connection's outbound queue into its socket.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
) {
    while let Some(event) = outbound.recv().await {
        let text = match event.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, event = event.name(), "Failed to encode outbound event");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(error = %e, "Failed to send WebSocket message");
            break;
        }
    }
}
