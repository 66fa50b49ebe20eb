//! In-process meeting client for tests and the loopback demo.
//!
//! Records every call the bridge makes and lets the caller play the part of
//! the SDK: emit lifecycle notifications and deliver audio chunks through the
//! registered callbacks, from whichever thread the caller is on.

use crate::client::{
    MeetingClient, MeetingInfo, NativeAudioCallback, Participant, ParticipantEvents,
    ParticipantId, ParticipantRef, PcmPacket,
};
use crate::error::{BridgeError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock participant with mutable track state.
#[derive(Debug)]
pub struct MockParticipant {
    id: ParticipantId,
    has_audio_track: AtomicBool,
    audio_enabled: AtomicBool,
}

impl MockParticipant {
    /// Create a participant without an audio track.
    pub fn new(id: &str) -> Self {
        Self {
            id: ParticipantId::from(id),
            has_audio_track: AtomicBool::new(false),
            audio_enabled: AtomicBool::new(false),
        }
    }

    /// Configure the participant to publish an unmuted audio track.
    pub fn with_audio_track(self) -> Self {
        self.set_audio_track(true);
        self.set_audio_enabled(true);
        self
    }

    pub fn set_audio_track(&self, present: bool) {
        self.has_audio_track.store(present, Ordering::SeqCst);
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }
}

impl Participant for MockParticipant {
    fn id(&self) -> ParticipantId {
        self.id.clone()
    }

    fn has_audio_track(&self) -> bool {
        self.has_audio_track.load(Ordering::SeqCst)
    }

    fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }
}

/// A call made by the bridge, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Init,
    RegisterListener,
    JoinRoom,
    RegisterAudio(ParticipantId),
    UnregisterAudio(ParticipantId),
}

/// Owned copy of a packet passed to `send_audio`.
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub participant: ParticipantId,
    pub data: Vec<u8>,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
    pub capture_time_ms: i64,
    pub sent_at: tokio::time::Instant,
}

#[derive(Default)]
struct MockState {
    info: Option<MeetingInfo>,
    listener: Option<Arc<dyn ParticipantEvents>>,
    callbacks: HashMap<ParticipantId, NativeAudioCallback>,
    calls: Vec<ClientCall>,
    sent: Vec<SentPacket>,
}

/// Mock meeting client for testing
pub struct MockMeetingClient {
    local: Arc<MockParticipant>,
    fail_init: bool,
    fail_join: bool,
    fail_register: bool,
    fail_send: bool,
    state: Mutex<MockState>,
}

impl MockMeetingClient {
    /// Create a client whose local user has the given id.
    pub fn new(local_id: &str) -> Self {
        Self {
            local: Arc::new(MockParticipant::new(local_id)),
            fail_init: false,
            fail_join: false,
            fail_register: false,
            fail_send: false,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Configure the mock to fail on init
    pub fn with_init_failure(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Configure the mock to fail on join
    pub fn with_join_failure(mut self) -> Self {
        self.fail_join = true;
        self
    }

    /// Configure the mock to reject audio callback registration
    pub fn with_register_failure(mut self) -> Self {
        self.fail_register = true;
        self
    }

    /// Configure the mock to report failed sends
    pub fn with_send_failure(mut self) -> Self {
        self.fail_send = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> Option<Arc<dyn ParticipantEvents>> {
        self.state().listener.clone()
    }

    /// Notify the registered listener that a participant joined.
    ///
    /// Returns false if no listener is registered.
    pub fn emit_join(&self, participant: ParticipantRef) -> bool {
        self.listener()
            .map(|listener| listener.on_join(participant))
            .is_some()
    }

    /// Notify the registered listener that a participant left.
    pub fn emit_leave(&self, participant: ParticipantRef) -> bool {
        self.listener()
            .map(|listener| listener.on_leave(participant))
            .is_some()
    }

    /// Notify the registered listener of an audio state change.
    pub fn emit_audio_update(&self, enabled: bool, participant: ParticipantRef) -> bool {
        self.listener()
            .map(|listener| listener.on_audio_update(enabled, participant))
            .is_some()
    }

    /// Invoke a participant's audio callback on the current thread.
    ///
    /// Returns `None` if no callback is registered for the participant.
    pub fn deliver_audio(
        &self,
        participant: &ParticipantId,
        packet: PcmPacket<'_>,
    ) -> Option<Result<()>> {
        // Release the state lock before calling out: the callback blocks.
        let callback = self.state().callbacks.get(participant).cloned()?;
        Some(callback(packet))
    }

    pub fn has_callback(&self, participant: &ParticipantId) -> bool {
        self.state().callbacks.contains_key(participant)
    }

    pub fn register_count(&self, participant: &ParticipantId) -> usize {
        self.count_calls(&ClientCall::RegisterAudio(participant.clone()))
    }

    pub fn unregister_count(&self, participant: &ParticipantId) -> usize {
        self.count_calls(&ClientCall::UnregisterAudio(participant.clone()))
    }

    fn count_calls(&self, call: &ClientCall) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    /// Every call the bridge made, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.state().calls.clone()
    }

    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.state().sent.clone()
    }

    /// Connection parameters passed to `init`.
    pub fn meeting_info(&self) -> Option<MeetingInfo> {
        self.state().info.clone()
    }
}

impl MeetingClient for MockMeetingClient {
    fn init(&self, info: &MeetingInfo) -> Result<()> {
        let mut state = self.state();
        state.calls.push(ClientCall::Init);
        state.info = Some(info.clone());
        if self.fail_init {
            return Err(BridgeError::Other("mock init failure".to_string()));
        }
        Ok(())
    }

    fn register_participant_events(&self, listener: Arc<dyn ParticipantEvents>) {
        let mut state = self.state();
        state.calls.push(ClientCall::RegisterListener);
        state.listener = Some(listener);
    }

    fn join_room(&self) -> Result<()> {
        self.state().calls.push(ClientCall::JoinRoom);
        if self.fail_join {
            return Err(BridgeError::Other("mock join failure".to_string()));
        }
        Ok(())
    }

    fn local_user(&self) -> ParticipantRef {
        self.local.set_audio_track(true);
        self.local.set_audio_enabled(true);
        self.local.clone()
    }

    fn register_audio_callback(
        &self,
        participant: &ParticipantId,
        callback: NativeAudioCallback,
    ) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(ClientCall::RegisterAudio(participant.clone()));
        if self.fail_register {
            return Err(BridgeError::Other("mock register failure".to_string()));
        }
        state.callbacks.insert(participant.clone(), callback);
        Ok(())
    }

    fn unregister_audio_callback(&self, participant: &ParticipantId) {
        let mut state = self.state();
        state
            .calls
            .push(ClientCall::UnregisterAudio(participant.clone()));
        state.callbacks.remove(participant);
    }

    fn send_audio(&self, participant: &ParticipantId, packet: &PcmPacket<'_>) -> bool {
        let sent = SentPacket {
            participant: participant.clone(),
            data: packet.data.to_vec(),
            bits_per_sample: packet.bits_per_sample,
            sample_rate: packet.sample_rate,
            channels: packet.channels,
            frames: packet.frames,
            capture_time_ms: packet.capture_time_ms,
            sent_at: tokio::time::Instant::now(),
        };
        self.state().sent.push(sent);
        !self.fail_send
    }
}
