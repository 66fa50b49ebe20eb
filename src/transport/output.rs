//! Audio egress: paced packets to the local participant's outbound track.

use crate::client::{MeetingClient, ParticipantId, PcmPacket};
use crate::config::TransportParams;
use crate::defaults;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Outbound audio endpoint as seen by the pipeline.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Queue raw 16-bit PCM for playback into the meeting.
    async fn write_raw_audio_frames(&self, buffer: &[u8]);
}

struct PacingState {
    last_send: Instant,
}

/// Pipeline-facing audio sink.
///
/// Splits pipeline audio into 10ms packets of 16 kHz mono PCM and sends them
/// to the meeting at real-time rate.
pub struct OutputTransport {
    client: Arc<dyn MeetingClient>,
    local_id: ParticipantId,
    enabled: bool,
    pacing: Mutex<PacingState>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl OutputTransport {
    pub fn new(
        client: Arc<dyn MeetingClient>,
        params: &TransportParams,
        local_id: ParticipantId,
    ) -> Self {
        if params.audio_out_sample_rate != defaults::SAMPLE_RATE
            || params.audio_out_channels != defaults::AUDIO_OUT_CHANNELS
        {
            warn!(
                sample_rate = params.audio_out_sample_rate,
                channels = params.audio_out_channels,
                "outbound audio is always sent as 16 kHz mono"
            );
        }

        Self {
            client,
            local_id,
            enabled: params.audio_out_enabled,
            pacing: Mutex::new(PacingState {
                last_send: Instant::now(),
            }),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Send a buffer of 16-bit mono PCM in 320-byte packets, one per 10ms.
    ///
    /// A trailing remainder shorter than one packet is discarded. Concurrent
    /// writers are serialized; their packets never interleave within a buffer.
    pub async fn write_raw_audio_frames(&self, buffer: &[u8]) {
        if !self.enabled {
            trace!(bytes = buffer.len(), "audio output disabled, buffer dropped");
            return;
        }

        let mut pacing = self.pacing.lock().await;
        for payload in buffer.chunks_exact(defaults::PACKET_STRIDE) {
            let elapsed = pacing.last_send.elapsed();
            if elapsed < defaults::PACKET_DURATION {
                tokio::time::sleep(defaults::PACKET_DURATION - elapsed).await;
            }
            pacing.last_send = Instant::now();

            let packet = PcmPacket {
                data: payload,
                bits_per_sample: defaults::BITS_PER_SAMPLE,
                sample_rate: defaults::SAMPLE_RATE,
                channels: defaults::AUDIO_OUT_CHANNELS,
                frames: defaults::PACKET_SAMPLES,
                capture_time_ms: defaults::OUTBOUND_CAPTURE_TIME_MS,
            };
            if self.client.send_audio(&self.local_id, &packet) {
                self.sent.fetch_add(1, Ordering::Relaxed);
            } else {
                let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(participant = %self.local_id, failed, "outbound audio packet rejected");
            }
        }

        let remainder = buffer.len() % defaults::PACKET_STRIDE;
        if remainder > 0 {
            debug!(remainder, "discarded partial outbound packet");
        }
    }

    /// Packets accepted by the meeting client.
    pub fn packets_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Packets the meeting client reported as not sent.
    pub fn failed_sends(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl AudioSink for OutputTransport {
    async fn write_raw_audio_frames(&self, buffer: &[u8]) {
        OutputTransport::write_raw_audio_frames(self, buffer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMeetingClient;
    use std::time::Duration;

    fn output(client: &Arc<MockMeetingClient>) -> OutputTransport {
        OutputTransport::new(
            client.clone(),
            &TransportParams::default(),
            ParticipantId::from("bot"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_split_into_whole_packets() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let output = output(&client);

        let buffer: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        output.write_raw_audio_frames(&buffer).await;

        let sent = client.sent_packets();
        assert_eq!(sent.len(), 1000 / 320);
        assert_eq!(output.packets_sent(), 3);
        for (i, packet) in sent.iter().enumerate() {
            assert_eq!(packet.data, buffer[i * 320..(i + 1) * 320]);
            assert_eq!(packet.participant, ParticipantId::from("bot"));
            assert_eq!(packet.bits_per_sample, 16);
            assert_eq!(packet.sample_rate, 16000);
            assert_eq!(packet.channels, 1);
            assert_eq!(packet.frames, 160);
            assert_eq!(packet.capture_time_ms, -1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_buffer_sends_nothing() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let output = output(&client);

        output.write_raw_audio_frames(&[0u8; 319]).await;
        output.write_raw_audio_frames(&[]).await;

        assert!(client.sent_packets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_packets_spaced_at_least_one_packet_apart() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let output = output(&client);

        for len in [640, 320, 960, 100, 1280] {
            output.write_raw_audio_frames(&vec![0u8; len]).await;
        }

        let sent = client.sent_packets();
        assert_eq!(sent.len(), 2 + 1 + 3 + 4);
        for pair in sent.windows(2) {
            assert!(pair[1].sent_at - pair[0].sent_at >= Duration::from_millis(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_writers_are_paced_together() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let output = Arc::new(output(&client));

        let a = {
            let output = output.clone();
            tokio::spawn(async move { output.write_raw_audio_frames(&[1u8; 960]).await })
        };
        let b = {
            let output = output.clone();
            tokio::spawn(async move { output.write_raw_audio_frames(&[2u8; 960]).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        let sent = client.sent_packets();
        assert_eq!(sent.len(), 6);
        for pair in sent.windows(2) {
            assert!(pair[1].sent_at - pair[0].sent_at >= Duration::from_millis(10));
        }
        // One buffer is drained before the other starts.
        assert!(sent[..3].iter().all(|p| p.data[0] == sent[0].data[0]));
        assert!(sent[3..].iter().all(|p| p.data[0] != sent[0].data[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_exactly_one_packet_sends_without_sleeping() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let start = Instant::now();
        let output = output(&client);

        tokio::time::advance(Duration::from_millis(10)).await;
        output.write_raw_audio_frames(&[0u8; 320]).await;

        let sent = client.sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sent_at - start, Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_packet_waits_out_remaining_interval() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let start = Instant::now();
        let output = output(&client);

        tokio::time::advance(Duration::from_millis(4)).await;
        output.write_raw_audio_frames(&[0u8; 320]).await;

        let waited = client.sent_packets()[0].sent_at - start;
        assert!(waited >= Duration::from_millis(10));
        assert!(waited < Duration::from_millis(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_send_is_counted_and_pacing_continues() {
        let client = Arc::new(MockMeetingClient::new("bot").with_send_failure());
        let output = output(&client);

        output.write_raw_audio_frames(&[0u8; 960]).await;

        assert_eq!(client.sent_packets().len(), 3);
        assert_eq!(output.failed_sends(), 3);
        assert_eq!(output.packets_sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_output_discards() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let params = TransportParams {
            audio_out_enabled: false,
            ..Default::default()
        };
        let output = OutputTransport::new(client.clone(), &params, ParticipantId::from("bot"));

        output.write_raw_audio_frames(&[0u8; 960]).await;

        assert!(client.sent_packets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_usable_as_dyn_sink() {
        let client = Arc::new(MockMeetingClient::new("bot"));
        let sink: Arc<dyn AudioSink> = Arc::new(output(&client));

        sink.write_raw_audio_frames(&[0u8; 640]).await;

        assert_eq!(client.sent_packets().len(), 2);
    }
}
