//! In-process loopback: simulated participants talk to the bridge, and a
//! stand-in pipeline echoes every frame back to the meeting.
//!
//! Uses [`MockMeetingClient`] in place of a real SDK. Each participant gets
//! its own native-style thread that delivers 10ms sine chunks in real time.

use crate::client::{
    MeetingInfo, MockMeetingClient, MockParticipant, Participant, ParticipantId, PcmPacket,
};
use crate::config::TransportParams;
use crate::defaults;
use crate::error::{BridgeError, Result};
use crate::transport::{AudioSink, TransportBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    pub participants: usize,
    pub duration: Duration,
    pub params: TransportParams,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            participants: 1,
            duration: Duration::from_secs(2),
            params: TransportParams::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackReport {
    pub joins: usize,
    pub leaves: usize,
    pub chunks_delivered: u64,
    pub delivery_errors: u64,
    pub frames_received: u64,
    pub packets_sent: u64,
    pub failed_sends: u64,
}

/// Run the loopback until every participant has streamed for `duration`.
pub async fn run_loopback(options: LoopbackOptions) -> Result<LoopbackReport> {
    let client = Arc::new(MockMeetingClient::new("roombridge"));
    let info = MeetingInfo {
        auth_token: "loopback".to_string(),
        enable_audio: true,
        enable_video: false,
        base_url: "loopback".to_string(),
    };

    let joins = Arc::new(AtomicUsize::new(0));
    let leaves = Arc::new(AtomicUsize::new(0));
    let (join_count, leave_count) = (joins.clone(), leaves.clone());
    let transport = TransportBuilder::new(client.clone(), info)
        .params(options.params.clone())
        .on_join(move |participant| {
            join_count.fetch_add(1, Ordering::SeqCst);
            async move { info!(participant = %participant.id(), "joined") }
        })
        .on_leave(move |participant| {
            leave_count.fetch_add(1, Ordering::SeqCst);
            async move { info!(participant = %participant.id(), "left") }
        })
        .connect()
        .await?;

    let mut frames = transport
        .input()
        .take_frames()
        .ok_or_else(|| BridgeError::Other("pipeline intake already taken".to_string()))?;
    let output: Arc<dyn AudioSink> = transport.output();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    // Stand-in pipeline: downmix and echo.
    let pipeline = tokio::spawn(async move {
        let mut received = 0u64;
        loop {
            tokio::select! {
                biased;
                Some(frame) = frames.recv() => {
                    received += 1;
                    let mono = downmix_to_mono(&frame.audio, frame.num_channels);
                    output.write_raw_audio_frames(&mono).await;
                }
                _ = &mut stop_rx => break,
            }
        }
        received
    });

    let participants: Vec<Arc<MockParticipant>> = (0..options.participants)
        .map(|i| {
            let name = format!("guest-{}", i + 1);
            Arc::new(MockParticipant::new(&name).with_audio_track())
        })
        .collect();
    for participant in &participants {
        client.emit_join(participant.clone());
    }
    transport.flush().await?;

    let mut speakers = Vec::with_capacity(participants.len());
    for (i, participant) in participants.iter().enumerate() {
        let client = client.clone();
        let id = participant.id();
        let params = options.params.clone();
        let duration = options.duration;
        let frequency = 220.0 * (i + 1) as f32;
        speakers.push(thread::spawn(move || {
            speak(&client, &id, &params, frequency, duration)
        }));
    }

    let mut report = LoopbackReport::default();
    for speaker in speakers {
        let (delivered, errors) = tokio::task::spawn_blocking(move || speaker.join())
            .await
            .map_err(|e| BridgeError::Other(e.to_string()))?
            .map_err(|_| BridgeError::Other("speaker thread panicked".to_string()))?;
        report.chunks_delivered += delivered;
        report.delivery_errors += errors;
    }

    for participant in &participants {
        client.emit_leave(participant.clone());
    }
    transport.flush().await?;

    if stop_tx.send(()).is_err() {
        warn!("pipeline task ended early");
    }
    report.frames_received = pipeline
        .await
        .map_err(|e| BridgeError::Other(e.to_string()))?;
    transport.close().await?;

    let output = transport.output();
    report.packets_sent = output.packets_sent();
    report.failed_sends = output.failed_sends();
    report.joins = joins.load(Ordering::SeqCst);
    report.leaves = leaves.load(Ordering::SeqCst);
    Ok(report)
}

/// Deliver 10ms chunks of a sine tone from the current thread until
/// `duration` has passed. Returns (delivered, failed).
fn speak(
    client: &MockMeetingClient,
    id: &ParticipantId,
    params: &TransportParams,
    frequency: f32,
    duration: Duration,
) -> (u64, u64) {
    let frames = (params.audio_in_sample_rate / 100) as usize;
    let started = Instant::now();
    let mut position = 0u64;
    let (mut delivered, mut failed) = (0u64, 0u64);

    while started.elapsed() < duration {
        let chunk = sine_chunk(
            frequency,
            params.audio_in_sample_rate,
            params.audio_in_channels,
            frames,
            &mut position,
        );
        let packet = PcmPacket {
            data: &chunk,
            bits_per_sample: defaults::BITS_PER_SAMPLE,
            sample_rate: params.audio_in_sample_rate,
            channels: params.audio_in_channels,
            frames,
            capture_time_ms: started.elapsed().as_millis() as i64,
        };
        match client.deliver_audio(id, packet) {
            Some(Ok(())) => delivered += 1,
            Some(Err(e)) => {
                warn!(participant = %id, error = %e, "audio delivery failed");
                failed += 1;
            }
            None => break,
        }
        thread::sleep(defaults::PACKET_DURATION);
    }
    (delivered, failed)
}

/// Interleaved 16-bit little-endian sine samples, same value on every channel.
pub fn sine_chunk(
    frequency: f32,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    position: &mut u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * channels as usize * defaults::BYTES_PER_SAMPLE);
    for _ in 0..frames {
        let t = *position as f32 / sample_rate as f32;
        let sample = ((t * frequency * std::f32::consts::TAU).sin() * i16::MAX as f32 * 0.3) as i16;
        for _ in 0..channels {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        *position += 1;
    }
    out
}

/// Average interleaved 16-bit channels down to mono.
pub fn downmix_to_mono(pcm: &[u8], channels: u16) -> Vec<u8> {
    let channels = channels.max(1) as usize;
    pcm.chunks_exact(channels * defaults::BYTES_PER_SAMPLE)
        .flat_map(|frame| {
            let sum: i32 = frame
                .chunks_exact(defaults::BYTES_PER_SAMPLE)
                .map(|s| i16::from_le_bytes([s[0], s[1]]) as i32)
                .sum();
            ((sum / channels as i32) as i16).to_le_bytes()
        })
        .collect()
}
