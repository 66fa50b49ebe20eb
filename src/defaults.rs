//! Default configuration constants for roombridge.
//!
//! Shared by the transport parameters, the ingest and the paced egress so the
//! wire format is defined in exactly one place.

use std::time::Duration;

/// Default sample rate in Hz for both directions.
pub const SAMPLE_RATE: u32 = 16000;

/// Default channel count for inbound participant audio.
///
/// The meeting client delivers remote audio as interleaved stereo.
pub const AUDIO_IN_CHANNELS: u16 = 2;

/// Default channel count for outbound audio.
pub const AUDIO_OUT_CHANNELS: u16 = 1;

/// Bit depth of every PCM buffer crossing the bridge.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Bytes per 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Samples per outbound packet (10ms at 16kHz).
pub const PACKET_SAMPLES: usize = 160;

/// Outbound packet stride in bytes (160 samples x 16-bit mono).
pub const PACKET_STRIDE: usize = PACKET_SAMPLES * BYTES_PER_SAMPLE;

/// Nominal playback duration of one outbound packet.
pub const PACKET_DURATION: Duration = Duration::from_millis(10);

/// Capture timestamp passed with outbound packets ("unspecified").
pub const OUTBOUND_CAPTURE_TIME_MS: i64 = -1;

/// Default capacity of the pipeline intake queue, in frames.
///
/// At one 10ms chunk per callback this is 160ms of audio per participant
/// burst before native delivery threads start to block.
pub const AUDIO_IN_QUEUE_FRAMES: usize = 16;
