//! Station notification WebSocket
//!
//! GET /ws/:station?token=<JWT>
//! Browsers cannot set an Authorization header on a WebSocket, so the access
//! token travels as a query parameter.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::AuthService;
use crate::AppState;
use shared::{Caller, OrderNotification, Station, StationTopic};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    token: String,
    /// Owners and admins pick the branch they listen to
    branch_id: Option<Uuid>,
}

/// Upgrade to a WebSocket subscribed to one station of the caller's branch
pub async fn station_ws(
    State(state): State<AppState>,
    Path(station): Path<String>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let user = AuthService::authenticate(&query.token, &state.config.jwt.secret).map_err(|e| {
        tracing::debug!("Station WS token rejected: {}", e);
        e
    })?;

    let station = Station::from_str(&station).ok_or_else(|| {
        AppError::validation("station", format!("Unknown station '{}'", station))
    })?;
    let branch_id = user.resolve_branch(query.branch_id)?;
    check_can_listen(&user, station, branch_id)?;

    let topic = StationTopic::new(branch_id, station);
    Ok(ws.on_upgrade(move |socket| station_session(socket, state, topic, user.user_id)))
}

fn check_can_listen(user: &AuthUser, station: Station, branch_id: Uuid) -> AppResult<()> {
    if user.role.station() == Some(station) || user.manages_branch(branch_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "A {} cannot listen to the {} station",
            user.role,
            station.as_str()
        )))
    }
}

async fn station_session(socket: WebSocket, state: AppState, topic: StationTopic, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let mut hub_rx = state.notifications.subscribe(topic);

    tracing::info!(topic = %topic, user_id = %user_id, "Station WS connected");

    let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
    ping_interval.tick().await;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            event = hub_rx.recv() => {
                match event {
                    Ok(notification) => {
                        if send_notification(&mut sink, &notification).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(topic = %topic, lagged = n, "Station subscriber lagged, skipping ahead");
                        hub_rx = state.notifications.subscribe(topic);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Stations only listen
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!(topic = %topic, user_id = %user_id, "Station WS disconnected");
}

async fn send_notification<S>(sink: &mut S, notification: &OrderNotification) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(notification).map_err(|e| {
        tracing::error!("Failed to encode notification: {}", e);
    })?;
    sink.send(Message::Text(text)).await.map_err(|_| ())
}
