//! Session lifecycle: owns the ring, the producer handle, the consumer
//! loop, and the sink connection for one session (§4.H state-machine
//! summary, §10.E). Mirrors the source crate's per-stream ownership model
//! in its stream registry, generalized from "one Sonos stream" to "one
//! encode/relay session".

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;

use crate::codec::{
    aac::AacEngine, flac::FlacEngine, pcm::PcmEngine, relay::RelayEngine, vorbis::VorbisEngine, Codec, CodecEngine,
};
use crate::config::{RingElementType, SessionConfig};
use crate::consumer::ConsumerLoop;
use crate::error::{PipelineError, PipelineResult};
use crate::frame_queue::FrameQueue;
use crate::policy::StreamingPolicy;
use crate::producer::Producer;
use crate::protocol_constants::{HANDSHAKE_TIMEOUT_SECS, HEARTBEAT_INTERVAL_SECS, STATS_INTERVAL_MS};
use crate::ring::{self, RingProducerHandle};
use crate::sink::{Sink, WsSink};
use crate::stats::StatsCollector;
use crate::supervisor::{Supervisor, SupervisorCommand, SupervisorMessage};

/// `Idle → Connecting → Running → Draining → Closed` (§4.H). A fatal error
/// at any state transitions directly to `Closed` after a best-effort
/// drain (§7: "Propagation policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Connecting = 1,
    Running = 2,
    Draining = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Running,
            3 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Atomically observable current state, so other tasks (e.g. a health
/// endpoint) can read it without locking.
#[derive(Clone)]
pub struct SessionStateHandle(Arc<AtomicU8>);

impl SessionStateHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Idle as u8)))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }
}

#[derive(Serialize)]
struct HandshakePayload<'a> {
    codec: Codec,
    sample_rate: u32,
    channels: u16,
    bitrate: u32,
    latency_mode: &'a str,
    frame_size_samples: u32,
}

/// Owns one session's ring, consumer, and sink connection for its whole
/// lifetime. Built by [`Session::build`], driven to completion by
/// [`Session::run`].
pub struct Session {
    config: SessionConfig,
    state: SessionStateHandle,
    supervisor: Arc<dyn Supervisor>,
    consumer_handle: Option<ring::RingConsumerHandle>,
}

impl Session {
    /// Validates `config`, builds the ring, and returns the session
    /// together with the producer handle the capture layer will push
    /// blocks into. Returns a `Configuration` error before any thread
    /// starts if `config` is invalid (§7).
    pub fn build(
        config: SessionConfig,
        supervisor: Arc<dyn Supervisor>,
    ) -> PipelineResult<(Self, RingProducerHandle)> {
        config
            .validate()
            .map_err(PipelineError::Configuration)?;

        let (producer_handle, consumer_handle) = ring::init(config.ring.capacity, config.ring.element_type)
            .map_err(PipelineError::Configuration)?;

        Ok((
            Self {
                config,
                state: SessionStateHandle::new(),
                supervisor,
                consumer_handle: Some(consumer_handle),
            },
            producer_handle,
        ))
    }

    pub fn state(&self) -> SessionStateHandle {
        self.state.clone()
    }

    /// Wraps a [`RingProducerHandle`] (the one returned alongside this
    /// session by [`Self::build`]) in a [`Producer`] bound to this
    /// session's channel count and dither seed. Call once; the capture
    /// layer then pushes [`crate::producer::CaptureBlock`] values through
    /// it from a real-time callback.
    pub fn make_producer(&self, handle: RingProducerHandle, dither_seed: u64) -> Producer {
        Producer::new(handle, self.config.encoder.channels, self.config.ring.element_type, dither_seed)
    }

    /// Connects to the sink, performs the handshake (§6), then drives the
    /// consumer loop until a `Stop` command arrives, the sink closes, or a
    /// fatal error occurs.
    pub async fn run(
        mut self,
        mut stop: tokio::sync::mpsc::UnboundedReceiver<SupervisorCommand>,
    ) -> PipelineResult<()> {
        self.state.set(SessionState::Connecting);
        self.supervisor.notify(SupervisorMessage::Ready);

        let sink = self.connect_and_handshake().await?;
        self.state.set(SessionState::Running);

        let consumer_handle = self
            .consumer_handle
            .take()
            .expect("Session::run called more than once");

        let policy = StreamingPolicy::for_mode(self.config.encoder.latency_mode);
        let per_channel_frame_size = self.per_channel_frame_size();
        let frame_queue = (!policy.drop_on_backpressure)
            .then(|| FrameQueue::new(policy.frame_queue_max_bytes, policy.frame_queue_target_bytes));

        let stats_interval = Duration::from_millis(self.config.stats_interval_ms.unwrap_or(STATS_INTERVAL_MS));
        let stats = StatsCollector::new(stats_interval, Instant::now(), 0);

        let encoder = self.build_encoder()?;
        let mut consumer = ConsumerLoop::new(
            consumer_handle,
            self.config.ring.element_type,
            encoder,
            sink.clone(),
            frame_queue,
            stats,
            policy,
            self.config.encoder.sample_rate,
            self.config.encoder.channels,
            per_channel_frame_size,
        );

        let epoch = Instant::now();
        let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut fatal: Option<PipelineError> = None;

        loop {
            tokio::select! {
                biased;
                cmd = stop.recv() => {
                    match cmd {
                        Some(SupervisorCommand::Stop) | None => break,
                        Some(SupervisorCommand::StartPlayback { speaker_ips, .. }) => {
                            self.supervisor.notify(SupervisorMessage::PlaybackStarted);
                            self.supervisor.notify(SupervisorMessage::PlaybackResults { speaker_ips });
                        }
                        Some(SupervisorCommand::MetadataUpdate { metadata }) => {
                            let _ = sink.send_text(json!({"type": "METADATA_UPDATE", "payload": metadata}).to_string()).await;
                        }
                        Some(SupervisorCommand::Init(_)) => {
                            // A session is already running; re-INIT is not supported mid-session.
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if sink.send_text(json!({"type": "HEARTBEAT"}).to_string()).await.is_err() {
                        break;
                    }
                }
                _outcome = consumer.run_cycle(epoch) => {}
            }

            if let Some(message) = consumer.take_encoder_fault() {
                fatal = Some(PipelineError::EncoderFault(message));
                break;
            }

            if let Some(text) = sink.try_recv_text() {
                self.handle_inbound(&text);
            }
        }

        self.state.set(SessionState::Draining);
        let timeline = consumer.shutdown().await;
        sink.close().await;
        if let Some(ref err) = fatal {
            self.supervisor.notify(SupervisorMessage::from(err));
        }
        self.supervisor.notify(SupervisorMessage::Disconnected);
        self.supervisor.notify(SupervisorMessage::MetricsDump { timeline });
        self.state.set(SessionState::Closed);
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn handle_inbound(&self, text: &str) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };
        // §6: "Ignore any incoming text frames that carry a `category`
        // field or a `type` of `INITIAL_STATE`."
        if value.get("category").is_some() {
            return;
        }
        match value.get("type").and_then(|t| t.as_str()) {
            Some("INITIAL_STATE") | None => {}
            Some("STREAM_READY") => self.supervisor.notify(SupervisorMessage::StreamReady),
            Some("PLAYBACK_STARTED") => self.supervisor.notify(SupervisorMessage::PlaybackStarted),
            Some("PLAYBACK_ERROR") => {
                let message = value
                    .get("payload")
                    .and_then(|p| p.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown playback error")
                    .to_string();
                self.supervisor.notify(SupervisorMessage::PlaybackError { message });
            }
            Some("ERROR") => {
                let message = value
                    .get("payload")
                    .and_then(|p| p.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                self.supervisor
                    .notify(SupervisorMessage::Error { code: "sink_error", message });
            }
            _ => {} // unknown messages are ignored per §6
        }
    }

    async fn connect_and_handshake(&self) -> PipelineResult<Arc<dyn Sink>> {
        let sink: Arc<dyn Sink> = Arc::new(
            tokio::time::timeout(
                Duration::from_secs(crate::protocol_constants::WS_CONNECT_TIMEOUT_SECS),
                WsSink::connect(&self.config.sink_url),
            )
            .await
            .map_err(|_| PipelineError::HandshakeFailed("connect timed out".to_string()))??,
        );

        let payload = HandshakePayload {
            codec: self.config.encoder.codec,
            sample_rate: self.config.encoder.sample_rate,
            channels: self.config.encoder.channels,
            bitrate: self.config.encoder.bitrate,
            latency_mode: match self.config.encoder.latency_mode {
                crate::policy::LatencyMode::Realtime => "realtime",
                crate::policy::LatencyMode::Quality => "quality",
            },
            frame_size_samples: self.per_channel_frame_size() as u32,
        };
        let handshake = json!({"type": "HANDSHAKE", "payload": {"encoderConfig": payload}});
        sink.send_text(handshake.to_string()).await?;

        let ack = tokio::time::timeout(Duration::from_secs(HANDSHAKE_TIMEOUT_SECS), async {
            loop {
                if let Some(text) = sink.try_recv_text() {
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    if value.get("category").is_some() {
                        continue;
                    }
                    match value.get("type").and_then(|t| t.as_str()) {
                        Some("INITIAL_STATE") => continue,
                        Some("HANDSHAKE_ACK") => return Ok(value),
                        Some("ERROR") => {
                            let message = value
                                .get("payload")
                                .and_then(|p| p.get("message"))
                                .and_then(|m| m.as_str())
                                .unwrap_or("handshake rejected")
                                .to_string();
                            return Err(PipelineError::HandshakeFailed(message));
                        }
                        _ => continue,
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| PipelineError::HandshakeFailed("no HANDSHAKE_ACK within timeout".to_string()))??;

        let stream_id = ack
            .get("payload")
            .and_then(|p| p.get("streamId"))
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string();
        self.supervisor.notify(SupervisorMessage::Connected { stream_id });

        Ok(sink)
    }

    /// Per-channel frame size. `mode = 'encode'` relay sessions (§6) carry
    /// an explicit `frameSizeSamples`, required by
    /// [`SessionConfig::validate`] whenever the ring is Int16, which always
    /// takes precedence over the codec's own fixed size or PCM's
    /// duration-derived one.
    fn per_channel_frame_size(&self) -> usize {
        if let Some(explicit) = self.config.encoder.frame_size_samples {
            return explicit as usize;
        }
        self.config
            .encoder
            .codec
            .fixed_per_channel_frame_size()
            .map(|n| n as usize)
            .unwrap_or_else(|| {
                let ms = self.config.encoder.effective_pcm_frame_duration_ms();
                (self.config.encoder.sample_rate as u64 * ms as u64 / 1000) as usize
            })
    }

    /// Builds the polymorphic encoder, or, for a relay session (§6, `mode =
    /// 'encode'`: ring carries pre-framed Int16 samples), a
    /// [`RelayEngine`] that relays them unchanged instead of running them
    /// through any of the four codecs.
    fn build_encoder(&self) -> PipelineResult<Box<dyn CodecEngine>> {
        let enc = &self.config.encoder;
        let per_channel = self.per_channel_frame_size();

        if is_relay_mode(self.config.ring.element_type) {
            return Ok(Box::new(RelayEngine::new(per_channel, enc.channels)));
        }

        let engine: Box<dyn CodecEngine> = match enc.codec {
            Codec::AacLc | Codec::HeAac | Codec::HeAacV2 => {
                Box::new(AacEngine::new(enc.codec, enc.sample_rate, enc.channels, enc.bitrate)?)
            }
            Codec::Vorbis => Box::new(VorbisEngine::new(rand::random(), enc.sample_rate, enc.channels, enc.bitrate)),
            Codec::Flac => Box::new(FlacEngine::new(enc.sample_rate, enc.channels, per_channel)),
            Codec::Pcm => Box::new(PcmEngine::new(per_channel, enc.channels, rand::random())),
        };
        Ok(engine)
    }
}

/// Whether a session is a relay session (§6, INIT: `mode = 'encode'`): the
/// ring carries Int16 samples already framed by the producer, so the
/// consumer relays them directly instead of running them through an
/// internal encoder. This implementation infers `mode` from the ring's
/// element type rather than carrying a separate field, matching
/// [`crate::config::SessionConfig::validate`]'s requirement that
/// `frame_size_samples` accompany an Int16 ring.
pub fn is_relay_mode(ring_elem: RingElementType) -> bool {
    matches!(ring_elem, RingElementType::Int16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncoderConfig, RingConfig};
    use crate::supervisor::NoopSupervisor;

    fn relay_config() -> SessionConfig {
        SessionConfig {
            ring: RingConfig {
                capacity: 1 << 14,
                element_type: RingElementType::Int16,
            },
            encoder: EncoderConfig {
                frame_size_samples: Some(4),
                ..EncoderConfig::default()
            },
            sink_url: "ws://localhost:9000".to_string(),
            stats_interval_ms: None,
        }
    }

    fn encode_config() -> SessionConfig {
        SessionConfig {
            ring: RingConfig::default(),
            encoder: EncoderConfig::default(),
            sink_url: "ws://localhost:9000".to_string(),
            stats_interval_ms: None,
        }
    }

    #[test]
    fn relay_mode_is_inferred_from_int16_ring() {
        assert!(is_relay_mode(RingElementType::Int16));
        assert!(!is_relay_mode(RingElementType::Float32));
    }

    #[test]
    fn per_channel_frame_size_prefers_explicit_value_over_codec_default() {
        let (session, _producer) = Session::build(relay_config(), Arc::new(NoopSupervisor)).unwrap();
        assert_eq!(session.per_channel_frame_size(), 4);
    }

    #[test]
    fn per_channel_frame_size_falls_back_to_codec_fixed_size() {
        let mut cfg = encode_config();
        cfg.encoder.codec = Codec::Flac;
        let (session, _producer) = Session::build(cfg, Arc::new(NoopSupervisor)).unwrap();
        assert_eq!(session.per_channel_frame_size(), 4096);
    }

    #[test]
    fn build_encoder_relays_int16_samples_without_encoding() {
        let (session, _producer) = Session::build(relay_config(), Arc::new(NoopSupervisor)).unwrap();
        let mut encoder = session.build_encoder().unwrap();
        let original = [100i16, -200, 32767, -32768];
        let samples: Vec<f32> = original.iter().map(|&v| v as f32 / 32768.0).collect();
        let output = encoder.encode(&samples).expect("full frame produced output");
        let recovered: Vec<i16> = output
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(recovered, original);
    }

    #[test]
    fn build_encoder_uses_configured_codec_when_not_relaying() {
        let (session, _producer) = Session::build(encode_config(), Arc::new(NoopSupervisor)).unwrap();
        let mut encoder = session.build_encoder().unwrap();
        assert_eq!(encoder.encode_queue_size(), 0);
    }

    #[test]
    fn handle_inbound_ignores_messages_carrying_a_category_field() {
        let (session, _producer) = Session::build(encode_config(), Arc::new(NoopSupervisor)).unwrap();
        // Must not panic and must not match any known `type` branch as a
        // side effect; absence of a panic is the assertion (§6: "Ignore any
        // incoming text frames that carry a `category` field").
        session.handle_inbound(r#"{"category":"diagnostic","type":"ERROR"}"#);
    }

    #[test]
    fn handle_inbound_ignores_malformed_json() {
        let (session, _producer) = Session::build(encode_config(), Arc::new(NoopSupervisor)).unwrap();
        session.handle_inbound("not json");
    }
}
