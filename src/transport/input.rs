//! Audio ingest: native participant callbacks into the pipeline intake.
//!
//! Native audio callbacks run on SDK threads. Each delivery is handed to the
//! runtime as a spawned task that pushes the frame into a bounded channel, and
//! the native thread blocks until that task reports back. A slow pipeline
//! therefore slows the SDK thread instead of losing audio.

use crate::client::{MeetingClient, NativeAudioCallback, ParticipantId, PcmPacket};
use crate::config::TransportParams;
use crate::error::{BridgeError, Result};
use crate::transport::frame::AudioFrame;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Sending half of the pipeline intake, shared by every subscription.
#[derive(Clone)]
pub(crate) struct Intake {
    tx: mpsc::Sender<AudioFrame>,
    handle: Handle,
    enabled: bool,
    timeout: Option<Duration>,
}

impl Intake {
    pub(crate) fn new(
        tx: mpsc::Sender<AudioFrame>,
        handle: Handle,
        params: &TransportParams,
    ) -> Self {
        Self {
            tx,
            handle,
            enabled: params.audio_in_enabled,
            timeout: params.handoff_timeout(),
        }
    }

    /// Hand a frame to the runtime and wait until the intake accepted it.
    ///
    /// Plain threads wait directly. Threads of a multi-threaded runtime, its
    /// workers and its blocking pool alike, wait inside `block_in_place`.
    /// A current-thread runtime cannot tell its driver thread apart from its
    /// blocking pool, so delivery from one is refused.
    pub(crate) fn deliver_blocking(&self, frame: AudioFrame) -> Result<()> {
        let on_runtime = match Handle::try_current() {
            Err(_) => false,
            Ok(current) => match current.runtime_flavor() {
                RuntimeFlavor::MultiThread => true,
                flavor => {
                    return Err(BridgeError::Handoff {
                        message: format!(
                            "audio callback invoked inside a {flavor:?} runtime context"
                        ),
                    });
                }
            },
        };

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let intake = self.clone();
        self.handle.spawn(async move {
            let result = intake.push(frame).await;
            // The native thread only goes away if it panicked.
            if done_tx.send(result).is_err() {
                trace!("handoff waiter gone");
            }
        });

        let received = if on_runtime {
            tokio::task::block_in_place(|| done_rx.recv())
        } else {
            done_rx.recv()
        };
        received.map_err(|_| BridgeError::Handoff {
            message: "runtime shut down before the frame was accepted".to_string(),
        })?
    }

    async fn push(&self, frame: AudioFrame) -> Result<()> {
        if !self.enabled {
            trace!(participant = %frame.source, "audio input disabled, frame dropped");
            return Ok(());
        }

        let Some(limit) = self.timeout else {
            return self
                .tx
                .send(frame)
                .await
                .map_err(|_| BridgeError::IntakeClosed);
        };

        let source = frame.source.clone();
        match tokio::time::timeout(limit, self.tx.send(frame)).await {
            Ok(sent) => sent.map_err(|_| BridgeError::IntakeClosed),
            Err(_) => {
                let timeout_ms = limit.as_millis() as u64;
                warn!(participant = %source, timeout_ms, "pipeline intake full, frame dropped");
                Err(BridgeError::HandoffTimeout { timeout_ms })
            }
        }
    }
}

struct Subscription {
    delivered: Arc<AtomicU64>,
}

/// Pipeline-facing audio source.
///
/// Holds at most one native audio callback per participant. Frames from every
/// subscribed participant arrive on the single receiver returned by
/// [`InputTransport::take_frames`].
pub struct InputTransport {
    client: Arc<dyn MeetingClient>,
    intake: Intake,
    frames: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    subscriptions: tokio::sync::Mutex<HashMap<ParticipantId, Subscription>>,
}

impl InputTransport {
    pub fn new(client: Arc<dyn MeetingClient>, params: &TransportParams, handle: Handle) -> Self {
        let (tx, rx) = mpsc::channel(params.audio_in_queue_frames.max(1));
        Self {
            client,
            intake: Intake::new(tx, handle, params),
            frames: Mutex::new(Some(rx)),
            subscriptions: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Take the receiving end of the pipeline intake.
    ///
    /// Returns `None` after the first call; the intake has a single consumer.
    pub fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Register the audio callback for a participant.
    ///
    /// No-op if the participant already has an active subscription.
    pub async fn start_listening(&self, participant: &ParticipantId) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(participant) {
            trace!(%participant, "already listening");
            return Ok(());
        }

        let delivered = Arc::new(AtomicU64::new(0));
        let callback = self.callback_for(participant.clone(), delivered.clone());

        let client = self.client.clone();
        let id = participant.clone();
        tokio::task::spawn_blocking(move || client.register_audio_callback(&id, callback))
            .await
            .map_err(|e| BridgeError::Subscription {
                participant: participant.to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| BridgeError::Subscription {
                participant: participant.to_string(),
                message: e.to_string(),
            })?;

        subscriptions.insert(participant.clone(), Subscription { delivered });
        debug!(%participant, "start listening");
        Ok(())
    }

    /// Remove a participant's audio callback. No-op without a subscription.
    pub async fn stop_listening(&self, participant: &ParticipantId) {
        let mut subscriptions = self.subscriptions.lock().await;
        let Some(subscription) = subscriptions.remove(participant) else {
            trace!(%participant, "not listening");
            return;
        };

        let client = self.client.clone();
        let id = participant.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || client.unregister_audio_callback(&id)).await
        {
            warn!(%participant, error = %e, "audio callback unregistration did not complete");
        }

        debug!(
            %participant,
            frames = subscription.delivered.load(Ordering::Relaxed),
            "stop listening"
        );
    }

    pub async fn is_listening(&self, participant: &ParticipantId) -> bool {
        self.subscriptions.lock().await.contains_key(participant)
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Stop every active subscription.
    pub async fn stop_all(&self) {
        let ids: Vec<ParticipantId> = self.subscriptions.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop_listening(&id).await;
        }
    }

    fn callback_for(
        &self,
        participant: ParticipantId,
        delivered: Arc<AtomicU64>,
    ) -> NativeAudioCallback {
        let intake = self.intake.clone();
        Arc::new(move |packet: PcmPacket<'_>| -> Result<()> {
            let frame = AudioFrame::from_packet(&participant, &packet)?;
            intake.deliver_blocking(frame)?;
            delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}
