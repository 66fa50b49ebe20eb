//! The transport bridge between the meeting client and the speech pipeline.
//!
//! - [`input`]: native audio callbacks → bounded pipeline intake
//! - [`output`]: pipeline audio → paced 10ms packets to the meeting
//! - [`coordinator`]: client lifecycle and participant subscriptions
//! - [`events`]: application-facing join / audio-update / leave handlers

pub mod coordinator;
pub mod events;
pub mod frame;
pub mod input;
pub mod output;

pub use coordinator::{MeetingTransport, ParticipantState, TrackedParticipant, TransportBuilder};
pub use events::{EventHandlers, EventKind, TransportEvent};
pub use frame::AudioFrame;
pub use input::InputTransport;
pub use output::{AudioSink, OutputTransport};
