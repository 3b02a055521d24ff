//! WebSocket sync client with automatic reconnect.
//!
//! The client keeps one connection to the sync server per process. Every
//! `STATE_UPDATE` is handed to the caller's callback; on any closure the
//! client waits a fixed delay and dials again with the same identity,
//! until [`SyncClient::shutdown`] is called or the client is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use watchparty_core::protocol_constants::DEFAULT_USERNAME;
use watchparty_core::{ClientMessage, ServerMessage, Snapshot, StatePatch};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked with every snapshot the server pushes.
pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Lifecycle of the sync socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Display identity sent with the join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinMetadata {
    pub username: Option<String>,
    pub avatar: Option<String>,
}

impl JoinMetadata {
    pub fn new(username: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            username: Some(username.into()),
            avatar,
        }
    }
}

/// Outbound side of the sync protocol.
///
/// Implemented by [`SyncClient`]; the playback coordinator depends on this
/// trait so it can be driven without a socket.
pub trait StateSink: Send + Sync {
    /// Sends an `UPDATE_STATE`. Returns `false` if it was not queued.
    fn update_state(&self, patch: StatePatch) -> bool;

    /// Sends a `TRANSFER_HOST`. Returns `false` if it was not queued.
    fn transfer_host(&self, target_user_id: &str) -> bool;
}

impl<T: StateSink + ?Sized> StateSink for Arc<T> {
    fn update_state(&self, patch: StatePatch) -> bool {
        (**self).update_state(patch)
    }

    fn transfer_host(&self, target_user_id: &str) -> bool {
        (**self).transfer_host(target_user_id)
    }
}

/// Builds the join URL for one dial attempt.
///
/// `http(s)` server URLs are mapped to `ws(s)`. The join is carried in the
/// query: `instanceId`, `userId`, `username` (default `Guest`) and `avatar`
/// (default empty).
pub fn build_ws_url(
    server_url: &str,
    instance_id: &str,
    user_id: &str,
    metadata: &JoinMetadata,
) -> ClientResult<Url> {
    let mut url = Url::parse(server_url).map_err(|e| ClientError::invalid_url(server_url, e))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::invalid_url(
                server_url,
                format!("unsupported scheme '{}'", other),
            ))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::invalid_url(server_url, "cannot switch scheme"))?;
    url.set_path("/");

    let username = metadata
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_USERNAME);
    url.query_pairs_mut()
        .clear()
        .append_pair("instanceId", instance_id)
        .append_pair("userId", user_id)
        .append_pair("username", username)
        .append_pair("avatar", metadata.avatar.as_deref().unwrap_or(""));
    Ok(url)
}

/// Connection slot owned by the most recent `connect` call.
///
/// Every loop carries the epoch it was started with and may only write the
/// slot while that epoch is current, so a replaced loop that is still
/// winding down cannot clobber its successor.
#[derive(Default)]
struct Link {
    epoch: u64,
    state: ConnectionState,
    /// Present only while a socket is open.
    outbound: Option<mpsc::Sender<String>>,
}

/// State shared between the client handle and its connection task.
struct Shared {
    config: ClientConfig,
    instance_id: RwLock<String>,
    link: Mutex<Link>,
}

impl Shared {
    /// Retires any running loop and returns the epoch for the next one.
    fn next_epoch(&self) -> u64 {
        let mut link = self.link.lock();
        link.epoch += 1;
        link.state = ConnectionState::Disconnected;
        link.outbound = None;
        link.epoch
    }

    /// Sets the connection state if `epoch` is still current.
    fn set_state(&self, epoch: u64, state: ConnectionState) -> bool {
        let mut link = self.link.lock();
        if link.epoch != epoch {
            return false;
        }
        link.state = state;
        if state != ConnectionState::Connected {
            link.outbound = None;
        }
        true
    }

    /// Publishes an open socket's queue if `epoch` is still current.
    fn attach(&self, epoch: u64, outbound: mpsc::Sender<String>) -> bool {
        let mut link = self.link.lock();
        if link.epoch != epoch {
            return false;
        }
        link.state = ConnectionState::Connected;
        link.outbound = Some(outbound);
        true
    }
}

/// How long a closing connection may spend sending its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Reconnecting sync client.
pub struct SyncClient {
    shared: Arc<Shared>,
    /// Cancels the current connection task; replaced on every `connect`.
    cancel: Mutex<CancellationToken>,
}

impl SyncClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        Url::parse(&config.server_url).map_err(|e| ClientError::invalid_url(&config.server_url, e))?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                instance_id: RwLock::new(String::new()),
                link: Mutex::new(Link::default()),
            }),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Room id used by the next dial.
    pub fn instance_id(&self) -> String {
        self.shared.instance_id.read().clone()
    }

    /// Sets the room id. Takes effect on the next (re)connect.
    pub fn set_instance_id(&self, instance_id: impl Into<String>) {
        *self.shared.instance_id.write() = instance_id.into();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Starts the connection loop. Must be called inside a tokio runtime.
    ///
    /// Replaces any loop started by an earlier call.
    pub fn connect(
        &self,
        participant_id: impl Into<String>,
        on_snapshot: SnapshotCallback,
        metadata: JoinMetadata,
    ) {
        let token = CancellationToken::new();
        let epoch = {
            let mut current = self.cancel.lock();
            current.cancel();
            *current = token.clone();
            self.shared.next_epoch()
        };

        let participant_id = participant_id.into();
        log::info!(
            "[Sync] Starting sync for {} in room '{}'",
            participant_id,
            self.instance_id()
        );
        tokio::spawn(run_loop(
            Arc::clone(&self.shared),
            epoch,
            participant_id,
            on_snapshot,
            metadata,
            token,
        ));
    }

    /// Stops the connection loop and closes the socket.
    ///
    /// This is process teardown, not a protocol-level leave.
    pub fn shutdown(&self) {
        self.cancel.lock().cancel();
    }

    fn send(&self, message: ClientMessage) -> bool {
        let link = self.shared.link.lock();
        let Some(tx) = link.outbound.as_ref() else {
            log::debug!("[Sync] Not connected, dropping {:?}", message);
            return false;
        };
        match serde_json::to_string(&message) {
            Ok(text) => tx.try_send(text).is_ok(),
            Err(e) => {
                log::error!("[Sync] Failed to serialize command: {}", e);
                false
            }
        }
    }
}

impl StateSink for SyncClient {
    fn update_state(&self, patch: StatePatch) -> bool {
        self.send(ClientMessage::UpdateState(patch))
    }

    fn transfer_host(&self, target_user_id: &str) -> bool {
        self.send(ClientMessage::transfer_host(target_user_id))
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.cancel.get_mut().cancel();
    }
}

/// Dials, serves the connection, waits, repeats.
async fn run_loop(
    shared: Arc<Shared>,
    epoch: u64,
    participant_id: String,
    on_snapshot: SnapshotCallback,
    metadata: JoinMetadata,
    cancel: CancellationToken,
) {
    let delay = shared.config.reconnect_delay;
    loop {
        if !shared.set_state(epoch, ConnectionState::Connecting) {
            break;
        }
        let instance_id = shared.instance_id.read().clone();
        match build_ws_url(&shared.config.server_url, &instance_id, &participant_id, &metadata) {
            Ok(url) => {
                let dial = tokio::select! {
                    _ = cancel.cancelled() => break,
                    dial = connect_async(url.as_str()) => dial,
                };
                match dial {
                    Ok((ws, _)) => {
                        log::info!("[Sync] Connected to room '{}'", instance_id);
                        serve_connection(&shared, epoch, ws, &on_snapshot, &cancel).await;
                    }
                    Err(e) => log::warn!("[Sync] Dial failed: {}", e),
                }
            }
            Err(e) => log::error!("[Sync] {}", e),
        }

        shared.set_state(epoch, ConnectionState::Disconnected);
        if cancel.is_cancelled() {
            break;
        }
        log::info!("[Sync] Connection closed. Reconnecting in {:?}", delay);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    shared.set_state(epoch, ConnectionState::Disconnected);
    log::info!("[Sync] Sync loop stopped for {}", participant_id);
}

/// Pumps one open socket until it closes or the loop is cancelled.
async fn serve_connection(
    shared: &Shared,
    epoch: u64,
    ws: WsStream,
    on_snapshot: &SnapshotCallback,
    cancel: &CancellationToken,
) {
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(shared.config.outbound_capacity);
    if !shared.attach(epoch, tx) {
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await;
                break;
            }
            Some(text) = rx.recv() => {
                // A peer that stops reading must not pin a cancelled loop.
                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = write.send(Message::Text(text.into())) => sent,
                };
                if let Err(e) = sent {
                    log::warn!("[Sync] Send failed: {}", e);
                    break;
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(ServerMessage::StateUpdate(snapshot)) => on_snapshot(snapshot),
                        Err(e) => log::debug!("[Sync] Ignoring unknown frame: {}", e),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    log::info!("[Sync] Server closed connection: {:?}", frame);
                    break;
                }
                Some(Err(e)) => {
                    log::warn!("[Sync] Socket error: {}", e);
                    break;
                }
                None => break,
                _ => {}
            },
        }
    }

    shared.set_state(epoch, ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
    }

    #[test]
    fn ws_url_carries_join_query() {
        let url = build_ws_url(
            "https://party.example.com/app",
            "ABCD",
            "u1",
            &JoinMetadata::new("alice smith", Some("hash".into())),
        )
        .unwrap();

        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("instanceId".into(), "ABCD".into()),
                ("userId".into(), "u1".into()),
                ("username".into(), "alice smith".into()),
                ("avatar".into(), "hash".into()),
            ]
        );
    }

    #[test]
    fn ws_url_defaults_username_and_avatar() {
        let url = build_ws_url("http://localhost:3000", "R", "u", &JoinMetadata::default()).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(
            url.query(),
            Some("instanceId=R&userId=u&username=Guest&avatar=")
        );
    }

    #[test]
    fn ws_url_rejects_unknown_scheme() {
        let err = build_ws_url("ftp://host", "R", "u", &JoinMetadata::default()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn commands_are_noops_while_disconnected() {
        let client = SyncClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(!client.update_state(StatePatch::position(1.0)));
        assert!(!client.transfer_host("b"));
    }

    #[test]
    fn instance_id_is_local_state() {
        let client = SyncClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.instance_id(), "");
        client.set_instance_id("WXYZ");
        assert_eq!(client.instance_id(), "WXYZ");
    }

    #[test]
    fn retired_epoch_cannot_touch_link() {
        let client = SyncClient::new(ClientConfig::default()).unwrap();
        let shared = &client.shared;

        let old = shared.next_epoch();
        let (old_tx, _old_rx) = mpsc::channel(1);
        assert!(shared.attach(old, old_tx));

        let new = shared.next_epoch();
        let (new_tx, mut new_rx) = mpsc::channel(1);
        assert!(shared.attach(new, new_tx));

        assert!(!shared.set_state(old, ConnectionState::Disconnected));
        assert!(client.is_connected());
        assert!(client.update_state(StatePatch::position(5.0)));
        assert!(new_rx.try_recv().unwrap().contains("UPDATE_STATE"));
    }

    #[tokio::test]
    async fn replaced_connection_dying_late_leaves_new_one_live() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = SyncClient::new(ClientConfig {
            reconnect_delay: Duration::from_millis(50),
            ..ClientConfig::new(format!("http://{}", addr))
        })
        .unwrap();
        let ignore: SnapshotCallback = Arc::new(|_| {});

        client.set_instance_id("OLD");
        client.connect("u", Arc::clone(&ignore), JoinMetadata::default());
        let (stream, _) = listener.accept().await.unwrap();
        let old_socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        wait_for("first connection", || client.is_connected()).await;

        client.set_instance_id("NEW");
        client.connect("u", ignore, JoinMetadata::default());
        let (stream, _) = listener.accept().await.unwrap();
        let mut new_socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        wait_for("second connection", || client.is_connected()).await;

        drop(old_socket);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert!(client.update_state(StatePatch::position(5.0)));
        let frame = timeout(Duration::from_secs(5), new_socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(frame.into_text().unwrap().as_str().contains("UPDATE_STATE"));
    }
}
