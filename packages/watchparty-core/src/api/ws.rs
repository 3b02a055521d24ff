//! WebSocket handler for party connections.
//!
//! A connection joins through its upgrade URL query, then exchanges JSON
//! text frames: commands in, `STATE_UPDATE` snapshots out. Room logic lives
//! in [`PartyService`]; this module owns the socket, liveness and cleanup.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::api::AppState;
use crate::protocol::JoinParams;
use crate::services::{CommandOutcome, PartyService, PartySession};

// ─────────────────────────────────────────────────────────────────────────────
// Session Guard (RAII cleanup)
// ─────────────────────────────────────────────────────────────────────────────

/// RAII guard that removes the connection from its room on drop.
///
/// Runs the departure path (failover, broadcast, room deletion) however the
/// handler exits: client close, transport error, idle timeout, force-close
/// or panic.
struct SessionGuard {
    session: PartySession,
    party: Arc<PartyService>,
}

impl SessionGuard {
    fn new(session: PartySession, party: Arc<PartyService>) -> Self {
        Self { session, party }
    }

    fn session(&self) -> &PartySession {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let departure = self.party.leave(&self.session);
        log::info!(
            "[WS] Session cleanup: {} left {} (new host: {:?}, room closed: {})",
            self.session.participant().id,
            self.session.room_id(),
            departure.new_host,
            departure.room_closed
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket upgrade handler.
///
/// Join parameters are validated after the upgrade so a bad join is answered
/// with a close frame the client can observe.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, params, state))
}

/// Main WebSocket connection handler.
async fn handle_ws(mut socket: WebSocket, params: JoinParams, state: AppState) {
    // Register connection for tracking and force-close capability
    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    let admission = match params.admit() {
        Ok(admission) => admission,
        Err(e) => {
            log::warn!("[WS] Refusing join on {}: {}", conn_guard.id(), e);
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: e.to_string().into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let (session, mut outbound_rx) = state.party.join(admission, conn_guard.id());
    conn_guard.attach(session.room_id(), &session.participant().id);
    log::info!(
        "[WS] {} joined {} ({} connection(s) in room)",
        conn_guard.id(),
        session.room_id(),
        state.ws_manager.room_connection_count(session.room_id())
    );
    let session = SessionGuard::new(session, Arc::clone(&state.party));

    let (mut sender, mut receiver) = socket.split();
    let ping_period = Duration::from_secs(state.config.ws_ping_interval_secs.max(1));
    let idle_timeout = Duration::from_secs(state.config.ws_idle_timeout_secs);
    let mut last_activity = Instant::now();

    // Delay mode skips missed ticks rather than bursting to catch up.
    let mut ping_interval = interval_at(Instant::now() + ping_period, ping_period);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Handle force-close request
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                let _ = sender.send(Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                }))).await;
                break;
            }
            // Snapshots queued by the room
            frame = outbound_rx.recv() => {
                let Some(text) = frame else { break };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            // Commands from the client
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let outcome = state.party.handle_text(session.session(), text.as_str());
                        if outcome != CommandOutcome::Applied {
                            log::trace!("[WS] {} command dropped: {:?}", conn_guard.id(), outcome);
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        log::debug!("[WS] Ignoring binary frame from {}", conn_guard.id());
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by axum; pongs only refresh activity.
                    _ => {}
                }
            }
            // Liveness: ping, and drop silent peers
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    log::warn!("[WS] Idle timeout: {}", conn_guard.id());
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Leave before unregistering so the room sees the departure first.
    drop(session);
    let _ = sender.close().await;
}
