//! Meeting transport: client lifecycle, participant tracking and the two
//! pipeline-facing endpoints.
//!
//! Native participant notifications are forwarded over an unbounded channel
//! to a single coordinator task. That task owns the participant table and is
//! the only caller of `start_listening` / `stop_listening`, so subscription
//! changes are serialized without further locking.

use crate::client::{
    MeetingClient, MeetingInfo, ParticipantEvents, ParticipantId, ParticipantRef,
};
use crate::config::TransportParams;
use crate::error::{BridgeError, Result};
use crate::transport::events::{Dispatcher, EventHandlers, EventKind, TransportEvent};
use crate::transport::input::InputTransport;
use crate::transport::output::OutputTransport;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Subscription state of a tracked remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    /// In the room, no audio callback registered.
    Joined,
    /// In the room with an active audio subscription.
    Listening,
}

/// Snapshot entry returned by [`MeetingTransport::participants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedParticipant {
    pub id: ParticipantId,
    pub state: ParticipantState,
}

/// Builder for [`MeetingTransport`].
///
/// Event handlers are fixed at build time so that no notification can be
/// emitted before its handlers exist.
pub struct TransportBuilder {
    client: Arc<dyn MeetingClient>,
    info: MeetingInfo,
    params: TransportParams,
    handlers: EventHandlers,
}

impl TransportBuilder {
    pub fn new(client: Arc<dyn MeetingClient>, info: MeetingInfo) -> Self {
        Self {
            client,
            info,
            params: TransportParams::default(),
            handlers: EventHandlers::new(),
        }
    }

    pub fn params(mut self, params: TransportParams) -> Self {
        self.params = params;
        self
    }

    /// Handler for remote participants joining.
    pub fn on_join<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(ParticipantRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_event(EventKind::Join, move |event| {
            handler(event.participant().clone())
        })
    }

    /// Handler for remote participants muting or unmuting.
    pub fn on_audio_update<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(bool, ParticipantRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_event(EventKind::AudioUpdate, move |event| {
            handler(event.enabled().unwrap_or_default(), event.participant().clone())
        })
    }

    /// Handler for remote participants leaving.
    pub fn on_leave<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(ParticipantRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_event(EventKind::Leave, move |event| {
            handler(event.participant().clone())
        })
    }

    pub fn on_event<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(TransportEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.add(kind, handler);
        self
    }

    /// Initialize the client, register for participant notifications and
    /// join the room.
    ///
    /// Must be called from within a tokio runtime; that runtime becomes the
    /// pipeline's execution context. Fails without leaving a usable
    /// transport if init or join fails.
    pub async fn connect(self) -> Result<MeetingTransport> {
        self.params.validate()?;
        let handle = Handle::current();

        let client = self.client.clone();
        let info = self.info.clone();
        let local_id = tokio::task::spawn_blocking(move || -> Result<ParticipantId> {
            client.init(&info)?;
            Ok(client.local_user().id())
        })
        .await
        .map_err(|e| BridgeError::ClientInit {
            message: e.to_string(),
        })?
        .map_err(|e| BridgeError::ClientInit {
            message: e.to_string(),
        })?;
        debug!(local = %local_id, "meeting client initialized");

        let shared = Arc::new(Shared {
            client: self.client.clone(),
            params: self.params,
            handle: handle.clone(),
            local_id: local_id.clone(),
            input: OnceLock::new(),
            output: OnceLock::new(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            shared: shared.clone(),
            dispatcher: self.handlers.spawn(&handle),
            participants: HashMap::new(),
        };
        handle.spawn(coordinator.run(rx));

        let listener = Arc::new(Forwarder {
            local_id,
            tx: tx.clone(),
        });
        let client = self.client.clone();
        let joined = tokio::task::spawn_blocking(move || {
            client.register_participant_events(listener);
            client.join_room()
        })
        .await
        .map_err(|e| BridgeError::JoinRoom {
            message: e.to_string(),
        })
        .and_then(|joined| {
            joined.map_err(|e| BridgeError::JoinRoom {
                message: e.to_string(),
            })
        });

        let transport = MeetingTransport { shared, tx };
        if let Err(e) = joined {
            if let Err(close_err) = transport.close().await {
                trace!(error = %close_err, "coordinator already stopped");
            }
            return Err(e);
        }

        info!(
            base_url = %self.info.base_url,
            local = %transport.shared.local_id,
            "joined meeting room"
        );
        Ok(transport)
    }
}

struct Shared {
    client: Arc<dyn MeetingClient>,
    params: TransportParams,
    handle: Handle,
    local_id: ParticipantId,
    input: OnceLock<Arc<InputTransport>>,
    output: OnceLock<Arc<OutputTransport>>,
}

impl Shared {
    fn input(&self) -> &Arc<InputTransport> {
        self.input.get_or_init(|| {
            Arc::new(InputTransport::new(
                self.client.clone(),
                &self.params,
                self.handle.clone(),
            ))
        })
    }

    fn output(&self) -> &Arc<OutputTransport> {
        self.output.get_or_init(|| {
            Arc::new(OutputTransport::new(
                self.client.clone(),
                &self.params,
                self.local_id.clone(),
            ))
        })
    }
}

/// A connected meeting transport.
pub struct MeetingTransport {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Command>,
}

impl MeetingTransport {
    /// The pipeline-facing audio source. Created on first call.
    pub fn input(&self) -> Arc<InputTransport> {
        self.shared.input().clone()
    }

    /// The pipeline-facing audio sink. Created on first call.
    pub fn output(&self) -> Arc<OutputTransport> {
        self.shared.output().clone()
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.shared.local_id
    }

    pub fn params(&self) -> &TransportParams {
        &self.shared.params
    }

    /// Wait until every notification received so far has been applied and
    /// its event handlers have finished.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Flush(done_tx))?;
        done_rx.await.map_err(|_| BridgeError::TransportClosed)
    }

    /// Remote participants currently tracked, sorted by id.
    pub async fn participants(&self) -> Result<Vec<TrackedParticipant>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| BridgeError::TransportClosed)
    }

    /// Stop every audio subscription and the coordinator task.
    ///
    /// Notifications arriving afterwards are ignored. A second call returns
    /// [`BridgeError::TransportClosed`].
    pub async fn close(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Shutdown(done_tx))?;
        done_rx.await.map_err(|_| BridgeError::TransportClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| BridgeError::TransportClosed)
    }
}

enum Command {
    Notify(TransportEvent),
    Flush(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<Vec<TrackedParticipant>>),
    Shutdown(oneshot::Sender<()>),
}

/// Participant listener handed to the native client.
///
/// Runs on native threads: drops local-user notifications and enqueues the
/// rest without waiting.
struct Forwarder {
    local_id: ParticipantId,
    tx: mpsc::UnboundedSender<Command>,
}

impl Forwarder {
    fn forward(&self, event: TransportEvent) {
        if event.participant().id() == self.local_id {
            trace!(kind = %event.kind(), "ignoring local participant");
            return;
        }
        if self.tx.send(Command::Notify(event)).is_err() {
            trace!("transport closed, notification ignored");
        }
    }
}

impl ParticipantEvents for Forwarder {
    fn on_join(&self, participant: ParticipantRef) {
        self.forward(TransportEvent::Joined(participant));
    }

    fn on_leave(&self, participant: ParticipantRef) {
        self.forward(TransportEvent::Left(participant));
    }

    fn on_audio_update(&self, enabled: bool, participant: ParticipantRef) {
        self.forward(TransportEvent::AudioUpdated {
            enabled,
            participant,
        });
    }
}

struct Tracked {
    participant: ParticipantRef,
    state: ParticipantState,
}

struct Coordinator {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    participants: HashMap<ParticipantId, Tracked>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Notify(event) => self.apply(event).await,
                Command::Flush(done) => self.dispatcher.flush(done),
                Command::Snapshot(reply) => {
                    if reply.send(self.snapshot()).is_err() {
                        trace!("snapshot requester gone");
                    }
                }
                Command::Shutdown(done) => {
                    rx.close();
                    if let Some(input) = self.shared.input.get() {
                        input.stop_all().await;
                    }
                    self.participants.clear();
                    debug!("transport closed");
                    if done.send(()).is_err() {
                        trace!("close requester gone");
                    }
                    break;
                }
            }
        }
    }

    async fn apply(&mut self, event: TransportEvent) {
        let id = event.participant().id();
        match event {
            TransportEvent::Joined(participant) => {
                debug!(participant = %id, "participant joined");
                let has_track = participant.has_audio_track();
                let participant = self.track(&id, participant);
                self.dispatcher.emit(TransportEvent::Joined(participant));
                if has_track {
                    self.listen(&id).await;
                }
            }
            TransportEvent::AudioUpdated {
                enabled,
                participant,
            } => {
                debug!(participant = %id, enabled, "participant audio update");
                // Track state comes from the notification, not the stored handle.
                let has_track = participant.has_audio_track();
                let participant = self.track(&id, participant);
                self.dispatcher.emit(TransportEvent::AudioUpdated {
                    enabled,
                    participant,
                });
                if !enabled {
                    self.unlisten(&id).await;
                } else if has_track {
                    self.listen(&id).await;
                } else {
                    debug!(participant = %id, "no audio track, not listening");
                }
            }
            TransportEvent::Left(participant) => {
                debug!(participant = %id, "participant left");
                let participant = self
                    .participants
                    .remove(&id)
                    .map_or(participant, |tracked| tracked.participant);
                self.dispatcher.emit(TransportEvent::Left(participant));
                self.shared.input().stop_listening(&id).await;
            }
        }
    }

    /// Returns the handle first seen for `id`, tracking it if new.
    fn track(&mut self, id: &ParticipantId, participant: ParticipantRef) -> ParticipantRef {
        self.participants
            .entry(id.clone())
            .or_insert_with(|| Tracked {
                participant,
                state: ParticipantState::Joined,
            })
            .participant
            .clone()
    }

    async fn listen(&mut self, id: &ParticipantId) {
        match self.shared.input().start_listening(id).await {
            Ok(()) => self.set_state(id, ParticipantState::Listening),
            Err(e) => warn!(participant = %id, error = %e, "could not start listening"),
        }
    }

    async fn unlisten(&mut self, id: &ParticipantId) {
        self.shared.input().stop_listening(id).await;
        self.set_state(id, ParticipantState::Joined);
    }

    fn set_state(&mut self, id: &ParticipantId, state: ParticipantState) {
        if let Some(tracked) = self.participants.get_mut(id) {
            tracked.state = state;
        }
    }

    fn snapshot(&self) -> Vec<TrackedParticipant> {
        let mut snapshot: Vec<TrackedParticipant> = self
            .participants
            .iter()
            .map(|(id, tracked)| TrackedParticipant {
                id: id.clone(),
                state: tracked.state,
            })
            .collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientCall, MockMeetingClient, MockParticipant};
    use std::sync::Mutex;
    use std::time::Duration;

    fn info() -> MeetingInfo {
        MeetingInfo {
            auth_token: "token".to_string(),
            enable_audio: true,
            enable_video: false,
            base_url: "meet.example.org".to_string(),
        }
    }

    fn remote(id: &str, with_track: bool) -> Arc<MockParticipant> {
        let participant = MockParticipant::new(id);
        if with_track {
            Arc::new(participant.with_audio_track())
        } else {
            Arc::new(participant)
        }
    }

    fn recording_builder(
        client: &Arc<MockMeetingClient>,
    ) -> (TransportBuilder, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (join_log, update_log, leave_log) = (log.clone(), log.clone(), log.clone());
        let builder = TransportBuilder::new(client.clone(), info())
            .on_join(move |p| {
                let log = join_log.clone();
                async move { log.lock().unwrap().push(format!("join:{}", p.id())) }
            })
            .on_audio_update(move |enabled, p| {
                let log = update_log.clone();
                async move {
                    log.lock()
                        .unwrap()
                        .push(format!("audio:{}:{}", enabled, p.id()))
                }
            })
            .on_leave(move |p| {
                let log = leave_log.clone();
                async move { log.lock().unwrap().push(format!("leave:{}", p.id())) }
            });
        (builder, log)
    }

    fn state_of(participants: &[TrackedParticipant], id: &str) -> Option<ParticipantState> {
        participants
            .iter()
            .find(|p| p.id.as_str() == id)
            .map(|p| p.state)
    }

    #[tokio::test]
    async fn test_connect_registers_listener_before_joining() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let transport = TransportBuilder::new(client.clone(), info())
            .connect()
            .await
            .unwrap();

        assert_eq!(
            client.calls(),
            vec![ClientCall::Init, ClientCall::RegisterListener, ClientCall::JoinRoom]
        );
        assert_eq!(client.meeting_info(), Some(info()));
        assert_eq!(transport.local_id(), &ParticipantId::from("bot"));
    }

    #[tokio::test]
    async fn test_init_failure_is_fatal() {
        let client = Arc::new(MockMeetingClient::new("bot").with_init_failure());
        let result = TransportBuilder::new(client.clone(), info()).connect().await;

        assert!(matches!(result, Err(BridgeError::ClientInit { .. })));
        assert_eq!(client.calls(), vec![ClientCall::Init]);
    }

    #[tokio::test]
    async fn test_join_failure_is_fatal() {
        let client = Arc::new(MockMeetingClient::new("bot").with_join_failure());
        let result = TransportBuilder::new(client.clone(), info()).connect().await;

        assert!(matches!(result, Err(BridgeError::JoinRoom { .. })));
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_init() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let params = TransportParams {
            audio_in_queue_frames: 0,
            ..Default::default()
        };
        let result = TransportBuilder::new(client.clone(), info())
            .params(params)
            .connect()
            .await;

        assert!(matches!(result, Err(BridgeError::ConfigInvalidValue { .. })));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_input_and_output_are_memoized() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let transport = TransportBuilder::new(client.clone(), info())
            .connect()
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&transport.input(), &transport.input()));
        assert!(Arc::ptr_eq(&transport.output(), &transport.output()));
    }

    #[tokio::test]
    async fn test_join_with_audio_track_starts_listening_once() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let (builder, log) = recording_builder(&client);
        let transport = builder.connect().await.unwrap();
        let alice = remote("alice", true);

        assert!(client.emit_join(alice.clone()));
        transport.flush().await.unwrap();

        let id = ParticipantId::from("alice");
        assert_eq!(client.register_count(&id), 1);
        assert!(transport.input().is_listening(&id).await);
        assert_eq!(*log.lock().unwrap(), vec!["join:alice"]);
        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "alice"), Some(ParticipantState::Listening));
    }

    #[tokio::test]
    async fn test_repeated_join_keeps_single_subscription() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let transport = TransportBuilder::new(client.clone(), info())
            .connect()
            .await
            .unwrap();
        let alice = remote("alice", true);

        client.emit_join(alice.clone());
        client.emit_join(alice.clone());
        client.emit_audio_update(true, alice);
        transport.flush().await.unwrap();

        assert_eq!(client.register_count(&ParticipantId::from("alice")), 1);
        assert_eq!(transport.input().subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_audio_update_without_track_does_not_listen() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let (builder, log) = recording_builder(&client);
        let transport = builder.connect().await.unwrap();
        let bob = remote("bob", false);
        let id = ParticipantId::from("bob");

        client.emit_join(bob.clone());
        client.emit_audio_update(true, bob.clone());
        transport.flush().await.unwrap();

        assert_eq!(client.register_count(&id), 0);
        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "bob"), Some(ParticipantState::Joined));
        assert_eq!(*log.lock().unwrap(), vec!["join:bob", "audio:true:bob"]);

        bob.set_audio_track(true);
        client.emit_audio_update(true, bob);
        transport.flush().await.unwrap();

        assert_eq!(client.register_count(&id), 1);
        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "bob"), Some(ParticipantState::Listening));
    }

    #[tokio::test]
    async fn test_audio_update_uses_track_of_incoming_handle() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let (builder, log) = recording_builder(&client);
        let transport = builder.connect().await.unwrap();
        let id = ParticipantId::from("bob");

        client.emit_join(remote("bob", false));
        transport.flush().await.unwrap();
        assert_eq!(client.register_count(&id), 0);

        // The SDK hands over a fresh object that now carries a track.
        client.emit_audio_update(true, remote("bob", true));
        transport.flush().await.unwrap();

        assert_eq!(client.register_count(&id), 1);
        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "bob"), Some(ParticipantState::Listening));
        assert_eq!(*log.lock().unwrap(), vec!["join:bob", "audio:true:bob"]);
    }

    #[tokio::test]
    async fn test_slow_join_handler_blocks_neither_notifier_nor_subscription() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let gate = Arc::new(tokio::sync::Notify::new());
        let finished = Arc::new(Mutex::new(Vec::new()));
        let (handler_gate, handler_log) = (gate.clone(), finished.clone());
        let transport = TransportBuilder::new(client.clone(), info())
            .on_join(move |p| {
                let gate = handler_gate.clone();
                let log = handler_log.clone();
                async move {
                    gate.notified().await;
                    log.lock().unwrap().push(p.id().to_string());
                }
            })
            .connect()
            .await
            .unwrap();
        let id = ParticipantId::from("alice");

        let started = std::time::Instant::now();
        assert!(client.emit_join(remote("alice", true)));
        assert!(started.elapsed() < Duration::from_secs(1));

        // The subscription lands while the handler is still parked.
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.register_count(&id) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert!(finished.lock().unwrap().is_empty());

        gate.notify_one();
        transport.flush().await.unwrap();
        assert_eq!(*finished.lock().unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_mute_stops_listening_and_unmute_resumes() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let (builder, log) = recording_builder(&client);
        let transport = builder.connect().await.unwrap();
        let alice = remote("alice", true);
        let id = ParticipantId::from("alice");

        client.emit_join(alice.clone());
        client.emit_audio_update(false, alice.clone());
        transport.flush().await.unwrap();

        assert!(!client.has_callback(&id));
        assert_eq!(client.unregister_count(&id), 1);
        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "alice"), Some(ParticipantState::Joined));

        client.emit_audio_update(true, alice);
        transport.flush().await.unwrap();

        assert!(client.has_callback(&id));
        assert_eq!(client.register_count(&id), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["join:alice", "audio:false:alice", "audio:true:alice"]
        );
    }

    #[tokio::test]
    async fn test_leave_stops_listening_and_forgets_participant() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let (builder, log) = recording_builder(&client);
        let transport = builder.connect().await.unwrap();
        let alice = remote("alice", true);
        let bob = remote("bob", false);

        client.emit_join(alice.clone());
        client.emit_join(bob.clone());
        client.emit_leave(alice);
        client.emit_leave(bob);
        transport.flush().await.unwrap();

        assert_eq!(client.unregister_count(&ParticipantId::from("alice")), 1);
        assert_eq!(client.unregister_count(&ParticipantId::from("bob")), 0);
        assert!(transport.participants().await.unwrap().is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["join:alice", "join:bob", "leave:alice", "leave:bob"]
        );
    }

    #[tokio::test]
    async fn test_local_participant_notifications_are_ignored() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let (builder, log) = recording_builder(&client);
        let transport = builder.connect().await.unwrap();
        let local = client.local_user();
        let calls_after_connect = client.calls().len();

        client.emit_join(local.clone());
        client.emit_audio_update(true, local.clone());
        client.emit_audio_update(false, local.clone());
        client.emit_leave(local);
        transport.flush().await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(client.calls().len(), calls_after_connect);
        assert!(transport.participants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audio_update_for_unknown_participant_tracks_it() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let transport = TransportBuilder::new(client.clone(), info())
            .connect()
            .await
            .unwrap();

        client.emit_audio_update(true, remote("carol", true));
        transport.flush().await.unwrap();

        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "carol"), Some(ParticipantState::Listening));
    }

    #[tokio::test]
    async fn test_register_failure_leaves_participant_joined() {
        let client = Arc::new(MockMeetingClient::new("bot").with_register_failure());
        let transport = TransportBuilder::new(client.clone(), info())
            .connect()
            .await
            .unwrap();

        client.emit_join(remote("alice", true));
        transport.flush().await.unwrap();

        let participants = transport.participants().await.unwrap();
        assert_eq!(state_of(&participants, "alice"), Some(ParticipantState::Joined));
    }

    #[tokio::test]
    async fn test_generic_event_handler_sees_every_kind() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = TransportBuilder::new(client.clone(), info());
        for kind in [EventKind::Join, EventKind::AudioUpdate, EventKind::Leave] {
            let seen = seen.clone();
            builder = builder.on_event(kind, move |event| {
                let seen = seen.clone();
                async move { seen.lock().unwrap().push(event.kind()) }
            });
        }
        let transport = builder.connect().await.unwrap();
        let alice = remote("alice", false);

        client.emit_join(alice.clone());
        client.emit_audio_update(true, alice.clone());
        client.emit_leave(alice);
        transport.flush().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Join, EventKind::AudioUpdate, EventKind::Leave]
        );
    }

    #[tokio::test]
    async fn test_close_stops_subscriptions_and_ignores_later_events() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let transport = TransportBuilder::new(client.clone(), info())
            .connect()
            .await
            .unwrap();
        let alice = remote("alice", true);

        client.emit_join(alice);
        transport.flush().await.unwrap();
        transport.close().await.unwrap();

        assert!(!client.has_callback(&ParticipantId::from("alice")));
        client.emit_join(remote("bob", true));
        assert!(matches!(transport.flush().await, Err(BridgeError::TransportClosed)));
        assert!(matches!(transport.close().await, Err(BridgeError::TransportClosed)));
        assert_eq!(client.register_count(&ParticipantId::from("bob")), 0);
    }
}
