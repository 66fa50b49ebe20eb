//! Narrow interface to the native meeting client.
//!
//! The bridge never touches native objects directly. Everything it needs from
//! the SDK (participant identity and track state, audio callback registration,
//! outbound send, lifecycle notifications) goes through the traits here, so a
//! real SDK binding and [`MockMeetingClient`] are interchangeable.

pub mod mock;

pub use mock::{ClientCall, MockMeetingClient, MockParticipant, SentPacket};

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Stable participant identity, comparable for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A meeting participant as seen by the bridge.
///
/// Owned by the meeting client; the bridge only holds shared handles and
/// never mutates participant state.
pub trait Participant: Send + Sync {
    fn id(&self) -> ParticipantId;

    /// Whether the participant currently publishes an audio track.
    fn has_audio_track(&self) -> bool;

    /// Whether the participant's audio is unmuted.
    fn audio_enabled(&self) -> bool;
}

/// Shared handle to a participant.
pub type ParticipantRef = Arc<dyn Participant>;

/// Connection parameters for [`MeetingClient::init`].
#[derive(Clone, PartialEq, Eq)]
pub struct MeetingInfo {
    pub auth_token: String,
    pub enable_audio: bool,
    pub enable_video: bool,
    pub base_url: String,
}

impl fmt::Debug for MeetingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeetingInfo")
            .field("auth_token", &"<redacted>")
            .field("enable_audio", &self.enable_audio)
            .field("enable_video", &self.enable_video)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// One chunk of interleaved PCM plus the metadata the SDK passes with it.
///
/// Used in both directions: the SDK hands one to the audio callback for every
/// inbound chunk, and the egress passes one to [`MeetingClient::send_audio`].
#[derive(Debug, Clone, Copy)]
pub struct PcmPacket<'a> {
    pub data: &'a [u8],
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in `data`.
    pub frames: usize,
    /// Absolute capture time in milliseconds, or -1 when unspecified.
    pub capture_time_ms: i64,
}

impl PcmPacket<'_> {
    /// Payload size implied by the metadata, saturating on absurd frame counts.
    pub fn expected_len(&self) -> usize {
        (self.channels as usize)
            .saturating_mul(self.frames)
            .saturating_mul(self.bits_per_sample as usize / 8)
    }
}

/// Audio callback registered with the SDK for one participant.
///
/// Invoked from an arbitrary native thread. An `Err` means the chunk could
/// not be handed to the pipeline; the binding must surface it, not drop it.
pub type NativeAudioCallback = Arc<dyn Fn(PcmPacket<'_>) -> Result<()> + Send + Sync>;

/// Lifecycle notifications from the participant registry.
///
/// Called on native threads. Implementations must return promptly.
pub trait ParticipantEvents: Send + Sync {
    fn on_join(&self, participant: ParticipantRef);
    fn on_leave(&self, participant: ParticipantRef);
    fn on_audio_update(&self, enabled: bool, participant: ParticipantRef);
}

/// The native meeting client.
///
/// All methods may block the calling thread (the SDK resolves its own
/// futures internally), so the bridge calls them from blocking contexts.
pub trait MeetingClient: Send + Sync + 'static {
    /// Initialize the client with connection parameters.
    fn init(&self, info: &MeetingInfo) -> Result<()>;

    /// Register the participant lifecycle listener.
    fn register_participant_events(&self, listener: Arc<dyn ParticipantEvents>);

    /// Join the meeting room.
    fn join_room(&self) -> Result<()>;

    /// Handle for the local participant.
    fn local_user(&self) -> ParticipantRef;

    /// Register the audio callback for a participant's audio track.
    fn register_audio_callback(
        &self,
        participant: &ParticipantId,
        callback: NativeAudioCallback,
    ) -> Result<()>;

    /// Remove a participant's audio callback, if any.
    ///
    /// SDKs typically wait for an in-flight callback to return before this
    /// completes.
    fn unregister_audio_callback(&self, participant: &ParticipantId);

    /// Push one packet to a participant's outbound audio track.
    fn send_audio(&self, participant: &ParticipantId, packet: &PcmPacket<'_>) -> bool;
}
