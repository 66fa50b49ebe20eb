//! Audio frame handed from the ingest to the pipeline.

use crate::client::{ParticipantId, PcmPacket};
use crate::defaults;
use crate::error::{BridgeError, Result};

/// One chunk of participant audio, normalized for the pipeline.
///
/// Built once per native callback and consumed exactly once by the
/// pipeline intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Interleaved 16-bit little-endian PCM.
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub num_channels: u16,
    /// Absolute capture time reported by the SDK, in milliseconds.
    pub capture_time_ms: i64,
    /// Participant whose track produced the audio.
    pub source: ParticipantId,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(
        audio: Vec<u8>,
        sample_rate: u32,
        num_channels: u16,
        capture_time_ms: i64,
        source: ParticipantId,
    ) -> Self {
        Self {
            audio,
            sample_rate,
            num_channels,
            capture_time_ms,
            source,
        }
    }

    /// Copy a native chunk into an owned frame.
    ///
    /// Takes the payload size implied by the metadata from the front of the
    /// native buffer; a shorter buffer is copied whole.
    pub fn from_packet(source: &ParticipantId, packet: &PcmPacket<'_>) -> Result<Self> {
        if packet.bits_per_sample != defaults::BITS_PER_SAMPLE {
            return Err(BridgeError::AudioFormatUnsupported {
                message: format!(
                    "{}-bit PCM from participant {} (expected {}-bit)",
                    packet.bits_per_sample,
                    source,
                    defaults::BITS_PER_SAMPLE
                ),
            });
        }

        let len = packet.expected_len().min(packet.data.len());
        Ok(Self::new(
            packet.data[..len].to_vec(),
            packet.sample_rate,
            packet.channels,
            packet.capture_time_ms,
            source.clone(),
        ))
    }

    /// Samples per channel carried by this frame.
    pub fn num_frames(&self) -> usize {
        if self.num_channels == 0 {
            return 0;
        }
        self.audio.len() / (defaults::BYTES_PER_SAMPLE * self.num_channels as usize)
    }

    /// Duration of the frame in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.num_frames() as u64 * 1000 / self.sample_rate as u64) as u32
    }
}
