//! Polymorphic encoder (component D). Four codecs share the same
//! encode/flush/advance-timestamp/close surface; each owns its own framer
//! and, where relevant, a real encoder engine.
//!
//! Grounded in the source crate's `Transcoder` trait
//! (`apps/desktop/src-tauri/src/stream/transcoder.rs`), generalized from a
//! single PCM-to-FLAC conversion to the full codec family and from a
//! one-shot `transcode()` call to a stateful encode/flush/reconfigure
//! lifecycle (§4.D).

pub mod adts;
pub mod aac;
pub mod flac;
pub mod ogg;
pub mod pcm;
pub mod relay;
pub mod vorbis;

use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::policy::LatencyMode;

/// Codec identifier, chosen at session construction (§3, Encoder).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    AacLc,
    HeAac,
    HeAacV2,
    Vorbis,
    Flac,
    Pcm,
}

impl Codec {
    /// Per-channel samples in one encoded frame (§3, Frame). PCM's size is
    /// duration-derived and not fixed, so it is not covered here; see
    /// [`crate::config::EncoderConfig::effective_pcm_frame_duration_ms`].
    pub fn fixed_per_channel_frame_size(self) -> Option<u32> {
        match self {
            Codec::AacLc | Codec::HeAac | Codec::HeAacV2 => Some(1024),
            Codec::Vorbis => Some(2048),
            Codec::Flac => Some(4096),
            Codec::Pcm => None,
        }
    }

    pub fn is_aac_family(self) -> bool {
        matches!(self, Codec::AacLc | Codec::HeAac | Codec::HeAacV2)
    }
}

/// Bytes produced by one `encode`/`flush` call, if any.
pub type EncodedOutput = Option<Vec<u8>>;

/// Shared surface every codec variant implements (§4.D).
///
/// `encode`/`flush` never fail outright: a fatal encoder condition is
/// reported once via [`CodecEngine::take_fault`] and surfaces through the
/// consumer loop as a session error, matching "Encoders never throw from
/// `encode`" (§4.D, Failure).
pub trait CodecEngine: Send {
    /// Encodes interleaved samples, returning consolidated output bytes
    /// when a full frame (or more) is ready.
    fn encode(&mut self, samples: &[f32]) -> EncodedOutput;

    /// Requests trailing frames at end-of-session.
    fn flush(&mut self) -> EncodedOutput;

    /// Advances the internal presentation timestamp by `frames` without
    /// emitting data (used when the consumer drops a frame, §4.F step 1).
    fn advance_timestamp(&mut self, frames: u64);

    /// Idempotent teardown.
    fn close(&mut self);

    /// Readable depth hint consulted by the backpressure check (§4.F
    /// step 4).
    fn encode_queue_size(&self) -> usize;

    /// Tears down and rebuilds at a new latency mode, resetting framer
    /// state via `onReconfigure`. Returns any leftover bytes.
    fn reconfigure(&mut self, latency_mode: LatencyMode) -> PipelineResult<EncodedOutput>;

    /// Takes the one-shot fatal fault, if an encoder engine raised one.
    fn take_fault(&mut self) -> Option<String>;
}
