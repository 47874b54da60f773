//! Session configuration types.
//!
//! Mirrors the source crate's `StreamingConfig`/`Config` pattern: plain
//! serde structs with a `validate()` method and a conservative `Default`,
//! called once at session construction and never mutated afterward (§4.E:
//! "All thresholds are derived at session start; never changed mid-session").

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::policy::LatencyMode;
use crate::protocol_constants::{
    ALLOWED_PCM_FRAME_DURATIONS_MS, DEFAULT_CHANNELS, DEFAULT_PCM_FRAME_DURATION_MS,
    DEFAULT_SAMPLE_RATE, MIN_RING_CAPACITY,
};

/// Element type stored in the ring. Chosen at initialization and fixed for
/// the life of the ring (§3, SampleRing).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RingElementType {
    /// Producer quantizes to Int16 before pushing (used with `mode = "encode"`
    /// relay sessions and the PCM codec).
    Int16,
    /// Producer pushes raw Float32; quantization (if any) happens downstream.
    Float32,
}

/// Configuration for the sample ring (component A).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RingConfig {
    /// Capacity in samples. Must be a power of two, >= [`MIN_RING_CAPACITY`].
    pub capacity: u32,
    /// Element type stored in the ring.
    pub element_type: RingElementType,
}

impl RingConfig {
    /// Validates the ring configuration.
    ///
    /// # Errors
    /// Returns a message describing the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity < MIN_RING_CAPACITY {
            return Err(format!(
                "ring capacity must be >= {MIN_RING_CAPACITY}, got {}",
                self.capacity
            ));
        }
        if !self.capacity.is_power_of_two() {
            return Err(format!(
                "ring capacity must be a power of two, got {}",
                self.capacity
            ));
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 16,
            element_type: RingElementType::Float32,
        }
    }
}

/// Configuration for the encoder (component D).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EncoderConfig {
    /// Codec to encode into.
    pub codec: Codec,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 or 2).
    pub channels: u16,
    /// Target bitrate in bits/sec. Ignored by FLAC and PCM.
    pub bitrate: u32,
    /// Selected streaming policy.
    pub latency_mode: LatencyMode,
    /// PCM-only: frame duration in ms. Defaults per Open Question resolution
    /// (see DESIGN.md) to [`DEFAULT_PCM_FRAME_DURATION_MS`] when absent.
    pub frame_duration_ms: Option<u32>,
    /// Explicit frame size in samples-per-channel, required when
    /// `mode = "encode"` relays pre-framed Int16 samples (§6, INIT payload).
    pub frame_size_samples: Option<u32>,
}

impl EncoderConfig {
    /// Validates the encoder configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 || self.channels > 2 {
            return Err(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            ));
        }
        if self.sample_rate == 0 {
            return Err("sample_rate must be nonzero".to_string());
        }
        if let Some(ms) = self.frame_duration_ms {
            if !ALLOWED_PCM_FRAME_DURATIONS_MS.contains(&ms) {
                return Err(format!(
                    "frame_duration_ms must be one of {ALLOWED_PCM_FRAME_DURATIONS_MS:?}, got {ms}"
                ));
            }
        }
        Ok(())
    }

    /// Returns the effective PCM frame duration, applying the Open Question
    /// default (20ms) when the supervisor did not supply one.
    pub fn effective_pcm_frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
            .unwrap_or(DEFAULT_PCM_FRAME_DURATION_MS)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Pcm,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            bitrate: 128_000,
            latency_mode: LatencyMode::Realtime,
            frame_duration_ms: None,
            frame_size_samples: None,
        }
    }
}

/// Top-level, immutable configuration a [`crate::session::Session`] is built
/// from. Constructed from the supervisor's `INIT` payload (§6) and validated
/// once before any thread starts (§7, Configuration error).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Ring configuration.
    #[serde(default)]
    pub ring: RingConfig,
    /// Encoder configuration.
    pub encoder: EncoderConfig,
    /// Sink WebSocket URL.
    pub sink_url: String,
    /// Stats snapshot interval (ms). Overrides
    /// [`crate::protocol_constants::STATS_INTERVAL_MS`] when set.
    #[serde(default)]
    pub stats_interval_ms: Option<u64>,
}

impl SessionConfig {
    /// Validates every nested config and the cross-field invariants that
    /// span them (§7: "missing `frameSizeSamples` in encode mode").
    pub fn validate(&self) -> Result<(), String> {
        self.ring.validate()?;
        self.encoder.validate()?;
        if self.sink_url.is_empty() {
            return Err("sink_url must not be empty".to_string());
        }
        if self.ring.element_type == RingElementType::Int16
            && self.encoder.frame_size_samples.is_none()
        {
            return Err(
                "frame_size_samples is required when the ring carries pre-framed Int16 samples"
                    .to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_config_default_is_valid() {
        assert!(RingConfig::default().validate().is_ok());
    }

    #[test]
    fn ring_config_rejects_non_power_of_two() {
        let cfg = RingConfig {
            capacity: 5000,
            element_type: RingElementType::Float32,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ring_config_rejects_below_minimum() {
        let cfg = RingConfig {
            capacity: 256,
            element_type: RingElementType::Float32,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn encoder_config_rejects_bad_channel_count() {
        let mut cfg = EncoderConfig::default();
        cfg.channels = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn encoder_config_defaults_pcm_frame_duration_to_20ms() {
        let cfg = EncoderConfig::default();
        assert_eq!(cfg.effective_pcm_frame_duration_ms(), 20);
    }

    #[test]
    fn session_config_requires_frame_size_in_int16_mode() {
        let mut cfg = SessionConfig {
            ring: RingConfig {
                capacity: 1 << 14,
                element_type: RingElementType::Int16,
            },
            encoder: EncoderConfig::default(),
            sink_url: "ws://localhost:9000".to_string(),
            stats_interval_ms: None,
        };
        assert!(cfg.validate().is_err());
        cfg.encoder.frame_size_samples = Some(960);
        assert!(cfg.validate().is_ok());
    }
}
