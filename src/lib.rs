//! roombridge - audio transport between a meeting client and a speech pipeline
//!
//! Converts multi-threaded participant audio callbacks into an ordered,
//! backpressured frame stream for the pipeline, and paces pipeline audio
//! back out to the meeting in real time.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod client;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
#[cfg(feature = "cli")]
pub mod logging;
pub mod transport;

// Composition root for the demo binary
#[cfg(feature = "cli")]
pub mod loopback;

// Meeting client seam
pub use client::{
    MeetingClient, MeetingInfo, MockMeetingClient, MockParticipant, Participant,
    ParticipantEvents, ParticipantId, ParticipantRef, PcmPacket,
};

// Transport
pub use transport::{
    AudioFrame, AudioSink, EventKind, InputTransport, MeetingTransport, OutputTransport,
    TransportBuilder, TransportEvent,
};

// Error handling
pub use error::{BridgeError, Result};

// Config
pub use config::{Config, MeetingConfig, TransportParams};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_hash_suffix_only_with_git_hash() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => assert_eq!(ver.split('+').nth(1), Some(hash)),
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
