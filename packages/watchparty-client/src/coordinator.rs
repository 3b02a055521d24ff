//! Local playback coordination.
//!
//! [`PlaybackCoordinator`] merges server snapshots into the local player,
//! turns the host's local actions into `UPDATE_STATE` commands, and keeps
//! the server's clock honest with a periodic heartbeat while playing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use watchparty_core::protocol_constants::DRIFT_SEEK_THRESHOLD_SECS;
use watchparty_core::{ParticipantInfo, Snapshot, StatePatch};

use crate::sync_client::StateSink;

/// Command for the local video element.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    /// Load a new media URL (empty clears the player).
    Load(String),
    SetPlaying(bool),
    /// Jump to a position in seconds.
    Seek(f64),
    /// Local output volume in `[0, 1]`.
    SetVolume(f64),
}

/// The local video element the coordinator drives.
///
/// Implementations report progress back through the coordinator's `on_*`
/// methods.
pub trait VideoAdapter: Send {
    fn apply(&mut self, command: PlayerCommand);
}

/// Local view of playback.
///
/// Snapshot fields plus local-only `volume`, `duration`, pending seek and
/// buffering. Volume is never sent and never taken from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVideoState {
    pub url: String,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub buffering: bool,
    /// Position the player has been asked to seek to and has not yet reported.
    pub seek_target: Option<f64>,
    pub host_id: Option<String>,
    pub participants: Vec<ParticipantInfo>,
}

impl Default for LocalVideoState {
    fn default() -> Self {
        Self {
            url: String::new(),
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            buffering: false,
            seek_target: None,
            host_id: None,
            participants: Vec::new(),
        }
    }
}

/// Whether a reconcile moved the local position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciled {
    /// Local position kept; drift was within tolerance.
    Kept,
    /// Seeked to the remote position.
    Seeked(f64),
}

/// Keeps the local player in line with the room.
pub struct PlaybackCoordinator<S, A> {
    local_id: String,
    state: LocalVideoState,
    sink: S,
    adapter: A,
}

impl<S: StateSink, A: VideoAdapter> PlaybackCoordinator<S, A> {
    pub fn new(local_id: impl Into<String>, sink: S, adapter: A) -> Self {
        Self {
            local_id: local_id.into(),
            state: LocalVideoState::default(),
            sink,
            adapter,
        }
    }

    pub fn state(&self) -> &LocalVideoState {
        &self.state
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn is_host(&self) -> bool {
        self.state.host_id.as_deref() == Some(self.local_id.as_str())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Remote → local
    // ─────────────────────────────────────────────────────────────────────

    /// Merges a server snapshot.
    ///
    /// URL, play state, host and participants are adopted as-is. The
    /// position is only adopted (with a seek) when local playback drifted
    /// more than [`DRIFT_SEEK_THRESHOLD_SECS`] or was paused.
    pub fn reconcile(&mut self, remote: Snapshot) -> Reconciled {
        let drift = (self.state.current_time - remote.current_time).abs();
        let should_seek = drift > DRIFT_SEEK_THRESHOLD_SECS || !self.state.is_playing;

        if remote.url != self.state.url {
            self.adapter.apply(PlayerCommand::Load(remote.url.clone()));
        }
        if remote.is_playing != self.state.is_playing {
            self.adapter.apply(PlayerCommand::SetPlaying(remote.is_playing));
        }

        self.state.url = remote.url;
        self.state.is_playing = remote.is_playing;
        self.state.host_id = Some(remote.host_id);
        self.state.participants = remote.participants;

        if should_seek {
            self.request_seek(remote.current_time);
            Reconciled::Seeked(remote.current_time)
        } else {
            Reconciled::Kept
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Host actions
    // ─────────────────────────────────────────────────────────────────────

    /// Loads a URL from the start and plays it.
    pub fn load_url(&mut self, url: impl Into<String>) -> bool {
        self.load_at(url, 0.0)
    }

    /// Loads a URL at a saved position and plays it.
    pub fn load_at(&mut self, url: impl Into<String>, position: f64) -> bool {
        if !self.is_host() {
            return false;
        }
        let url = url.into();
        let position = position.max(0.0);
        self.adapter.apply(PlayerCommand::Load(url.clone()));
        if position > 0.0 {
            self.request_seek(position);
        } else {
            self.state.current_time = 0.0;
        }
        self.adapter.apply(PlayerCommand::SetPlaying(true));
        self.state.url = url.clone();
        self.state.is_playing = true;
        self.sink.update_state(StatePatch {
            url: Some(url),
            is_playing: Some(true),
            current_time: Some(position),
        })
    }

    pub fn set_playing(&mut self, is_playing: bool) -> bool {
        if !self.is_host() {
            return false;
        }
        if self.state.is_playing != is_playing {
            self.adapter.apply(PlayerCommand::SetPlaying(is_playing));
        }
        self.state.is_playing = is_playing;
        self.sink.update_state(StatePatch {
            is_playing: Some(is_playing),
            current_time: Some(self.state.current_time),
            ..StatePatch::default()
        })
    }

    pub fn seek(&mut self, position: f64) -> bool {
        if !self.is_host() {
            return false;
        }
        let position = position.max(0.0);
        self.request_seek(position);
        self.sink.update_state(StatePatch::position(position))
    }

    /// Seeks relative to the current position, clamped to the media.
    pub fn skip(&mut self, delta: f64) -> bool {
        let mut target = (self.state.current_time + delta).max(0.0);
        if self.state.duration > 0.0 {
            target = target.min(self.state.duration);
        }
        self.seek(target)
    }

    /// Re-sends the current local position.
    pub fn resync(&mut self) -> bool {
        if !self.is_host() {
            return false;
        }
        self.sink
            .update_state(StatePatch::position(self.state.current_time))
    }

    /// Hands host to another connected participant.
    pub fn promote(&mut self, target: &str) -> bool {
        if !self.is_host() || target == self.local_id {
            return false;
        }
        if !self.state.participants.iter().any(|p| p.id == target) {
            log::debug!("[Sync] Not promoting unknown participant {}", target);
            return false;
        }
        self.sink.transfer_host(target)
    }

    /// Periodic position re-broadcast. Sends only while hosting and playing.
    pub fn heartbeat_tick(&mut self) -> bool {
        if !self.is_host() || !self.state.is_playing {
            return false;
        }
        self.sink
            .update_state(StatePatch::position(self.state.current_time))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Player feedback (local only)
    // ─────────────────────────────────────────────────────────────────────

    pub fn on_time_update(&mut self, position: f64) {
        self.state.current_time = position;
        self.state.seek_target = None;
    }

    pub fn on_duration_change(&mut self, duration: f64) {
        self.state.duration = duration;
    }

    pub fn on_buffering(&mut self, buffering: bool) {
        self.state.buffering = buffering;
    }

    /// End of media pauses the room when this participant is host.
    pub fn on_ended(&mut self) -> bool {
        self.set_playing(false)
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.adapter.apply(PlayerCommand::SetVolume(volume));
    }

    fn request_seek(&mut self, position: f64) {
        self.state.current_time = position;
        self.state.seek_target = Some(position);
        self.adapter.apply(PlayerCommand::Seek(position));
    }
}

/// Spawns the host heartbeat: every `period`, re-broadcast the position if
/// this participant is hosting and playing. Stops when `cancel` fires.
pub fn spawn_host_heartbeat<S, A>(
    coordinator: Arc<Mutex<PlaybackCoordinator<S, A>>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: StateSink + 'static,
    A: VideoAdapter + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if coordinator.lock().heartbeat_tick() {
                        log::trace!("[Sync] Host heartbeat sent");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<StatePatch>>,
        transfers: Mutex<Vec<String>>,
    }

    impl StateSink for RecordingSink {
        fn update_state(&self, patch: StatePatch) -> bool {
            self.updates.lock().push(patch);
            true
        }

        fn transfer_host(&self, target_user_id: &str) -> bool {
            self.transfers.lock().push(target_user_id.to_string());
            true
        }
    }

    #[derive(Default)]
    struct RecordingPlayer {
        commands: Vec<PlayerCommand>,
    }

    impl VideoAdapter for RecordingPlayer {
        fn apply(&mut self, command: PlayerCommand) {
            self.commands.push(command);
        }
    }

    type TestCoordinator = PlaybackCoordinator<Arc<RecordingSink>, RecordingPlayer>;

    fn coordinator(local: &str) -> (TestCoordinator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (
            PlaybackCoordinator::new(local, Arc::clone(&sink), RecordingPlayer::default()),
            sink,
        )
    }

    fn snapshot(host: &str, is_playing: bool, current_time: f64) -> Snapshot {
        Snapshot {
            url: "x.m3u8".into(),
            is_playing,
            current_time,
            host_id: host.into(),
            participants: vec![ParticipantInfo::new("a", "A"), ParticipantInfo::new("b", "B")],
        }
    }

    #[test]
    fn small_drift_keeps_local_time_large_drift_seeks() {
        let (mut c, _) = coordinator("b");
        c.reconcile(snapshot("a", true, 10.0));
        c.on_time_update(10.0);

        assert_eq!(c.reconcile(snapshot("a", true, 11.5)), Reconciled::Kept);
        assert_eq!(c.state().current_time, 10.0);

        assert_eq!(c.reconcile(snapshot("a", true, 13.1)), Reconciled::Seeked(13.1));
        assert_eq!(c.state().current_time, 13.1);
        assert_eq!(c.adapter().commands.last(), Some(&PlayerCommand::Seek(13.1)));
    }

    #[test]
    fn paused_local_player_always_adopts_remote_time() {
        let (mut c, _) = coordinator("b");
        c.reconcile(snapshot("a", false, 5.0));
        c.on_time_update(5.0);

        assert_eq!(c.reconcile(snapshot("a", false, 5.5)), Reconciled::Seeked(5.5));
    }

    #[test]
    fn snapshot_never_touches_volume() {
        let (mut c, sink) = coordinator("a");
        c.set_volume(0.3);
        c.reconcile(snapshot("a", true, 0.0));

        assert_eq!(c.state().volume, 0.3);
        assert!(sink.updates.lock().is_empty());
        assert!(c.adapter().commands.contains(&PlayerCommand::SetVolume(0.3)));
    }

    #[test]
    fn spectator_actions_are_ignored() {
        let (mut c, sink) = coordinator("b");
        c.reconcile(snapshot("a", true, 0.0));

        assert!(!c.load_url("y.m3u8"));
        assert!(!c.set_playing(false));
        assert!(!c.seek(30.0));
        assert!(!c.promote("a"));
        assert!(!c.heartbeat_tick());
        assert!(sink.updates.lock().is_empty());
        assert_eq!(c.state().url, "x.m3u8");
    }

    #[test]
    fn host_actions_apply_locally_and_send() {
        let (mut c, sink) = coordinator("a");
        c.reconcile(snapshot("a", false, 0.0));

        assert!(c.load_url("y.m3u8"));
        assert!(c.state().is_playing);
        assert_eq!(c.state().url, "y.m3u8");

        c.on_time_update(12.0);
        assert!(c.set_playing(false));
        assert!(c.seek(40.0));

        let updates = sink.updates.lock();
        assert_eq!(
            updates[0],
            StatePatch {
                url: Some("y.m3u8".into()),
                is_playing: Some(true),
                current_time: Some(0.0),
            }
        );
        assert_eq!(
            updates[1],
            StatePatch {
                is_playing: Some(false),
                current_time: Some(12.0),
                url: None,
            }
        );
        assert_eq!(updates[2], StatePatch::position(40.0));
    }

    #[test]
    fn skip_clamps_to_media_bounds() {
        let (mut c, sink) = coordinator("a");
        c.reconcile(snapshot("a", true, 0.0));
        c.on_duration_change(100.0);
        c.on_time_update(95.0);

        c.skip(10.0);
        c.skip(-500.0);

        let updates = sink.updates.lock();
        assert_eq!(updates[0].current_time, Some(100.0));
        assert_eq!(updates[1].current_time, Some(0.0));
    }

    #[test]
    fn promote_requires_known_participant() {
        let (mut c, sink) = coordinator("a");
        c.reconcile(snapshot("a", true, 0.0));

        assert!(!c.promote("ghost"));
        assert!(!c.promote("a"));
        assert!(c.promote("b"));
        assert_eq!(*sink.transfers.lock(), vec!["b".to_string()]);
    }

    #[test]
    fn ended_pauses_room_for_host() {
        let (mut c, sink) = coordinator("a");
        c.reconcile(snapshot("a", true, 0.0));
        c.on_time_update(99.0);

        assert!(c.on_ended());
        assert!(!c.state().is_playing);
        assert_eq!(sink.updates.lock()[0].is_playing, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_sends_every_period_while_hosting_and_playing() {
        let (c, sink) = coordinator("a");
        let c = Arc::new(Mutex::new(c));
        c.lock().reconcile(snapshot("a", true, 0.0));
        c.lock().on_time_update(7.0);

        let cancel = CancellationToken::new();
        let handle = spawn_host_heartbeat(Arc::clone(&c), Duration::from_secs(4), cancel.clone());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(sink.updates.lock().len(), 2);
        assert_eq!(sink.updates.lock()[0], StatePatch::position(7.0));

        c.lock().set_playing(false);
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(sink.updates.lock().len(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }
}
