//! One participant's live session: sync socket, coordinator and heartbeat.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::coordinator::{spawn_host_heartbeat, PlaybackCoordinator, VideoAdapter};
use crate::directory::PartyCode;
use crate::error::ClientResult;
use crate::sync_client::{JoinMetadata, SnapshotCallback, SyncClient};

/// Coordinator type driven by a live [`SyncClient`].
pub type SessionCoordinator<A> = PlaybackCoordinator<Arc<SyncClient>, A>;

/// A joined watch party.
///
/// Dropping the session stops the heartbeat and the reconnect loop.
pub struct WatchSession<A: VideoAdapter + 'static> {
    code: PartyCode,
    client: Arc<SyncClient>,
    coordinator: Arc<Mutex<SessionCoordinator<A>>>,
    heartbeat: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<A: VideoAdapter + 'static> WatchSession<A> {
    /// Joins `code` as `participant_id`. Must be called inside a tokio runtime.
    pub fn start(
        config: ClientConfig,
        code: PartyCode,
        participant_id: impl Into<String>,
        metadata: JoinMetadata,
        adapter: A,
    ) -> ClientResult<Self> {
        let participant_id = participant_id.into();
        let heartbeat_interval = config.heartbeat_interval;
        let client = Arc::new(SyncClient::new(config)?);
        client.set_instance_id(code.as_str());

        let coordinator = Arc::new(Mutex::new(PlaybackCoordinator::new(
            participant_id.clone(),
            Arc::clone(&client),
            adapter,
        )));

        // Weak: the socket task must not keep the coordinator (and through it
        // the client) alive after the session is dropped.
        let weak = Arc::downgrade(&coordinator);
        let on_snapshot: SnapshotCallback = Arc::new(move |snapshot| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.lock().reconcile(snapshot);
            }
        });
        client.connect(participant_id, on_snapshot, metadata);

        let cancel = CancellationToken::new();
        let heartbeat = spawn_host_heartbeat(
            Arc::clone(&coordinator),
            heartbeat_interval,
            cancel.clone(),
        );

        log::info!("[Sync] Session started for party {}", code);
        Ok(Self {
            code,
            client,
            coordinator,
            heartbeat: Some(heartbeat),
            cancel,
        })
    }

    pub fn code(&self) -> &PartyCode {
        &self.code
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }

    /// Shared handle for player feedback and host actions.
    pub fn coordinator(&self) -> &Arc<Mutex<SessionCoordinator<A>>> {
        &self.coordinator
    }

    /// Stops the session and waits for the heartbeat task to finish.
    pub async fn leave(mut self) {
        self.stop();
        if let Some(handle) = self.heartbeat.take() {
            let _ = handle.await;
        }
        log::info!("[Sync] Left party {}", self.code);
    }

    fn stop(&self) {
        self.cancel.cancel();
        self.client.shutdown();
    }
}

impl<A: VideoAdapter + 'static> Drop for WatchSession<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
