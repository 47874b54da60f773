//! Demo-harness configuration.
//!
//! Supports loading from a YAML file with environment variable overrides,
//! the same pattern the core library's own session config documents (see
//! `sonicpipe_core::config`), scoped down to the handful of knobs this
//! standalone binary needs to build a `SessionConfig`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sonicpipe_core::{Codec, EncoderConfig, LatencyMode, RingConfig, RingElementType, SessionConfig};

/// Demo-harness configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Sink WebSocket URL to stream encoded frames to.
    /// Override: `SONICPIPE_SINK_URL`
    pub sink_url: String,

    /// Codec to encode into.
    /// Override: `SONICPIPE_CODEC`
    pub codec: Codec,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Channel count (1 or 2).
    pub channels: u16,

    /// Target bitrate in bits/sec (ignored by FLAC and PCM).
    pub bitrate: u32,

    /// Streaming policy.
    /// Override: `SONICPIPE_LATENCY_MODE`
    pub latency_mode: LatencyMode,

    /// PCM-only frame duration in ms. Left `None` to take the core
    /// library's 20ms default.
    pub frame_duration_ms: Option<u32>,

    /// Ring capacity in samples. Must be a power of two.
    pub ring_capacity: u32,

    /// Element type the ring carries.
    pub ring_element_type: RingElementType,

    /// Overrides the core library's default stats snapshot interval.
    pub stats_interval_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sink_url: "ws://127.0.0.1:4900/stream".to_string(),
            codec: Codec::Pcm,
            sample_rate: 48000,
            channels: 2,
            bitrate: 128_000,
            latency_mode: LatencyMode::Realtime,
            frame_duration_ms: None,
            ring_capacity: 1 << 16,
            ring_element_type: RingElementType::Float32,
            stats_interval_ms: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("SONICPIPE_SINK_URL") {
            self.sink_url = val;
        }

        if let Ok(val) = std::env::var("SONICPIPE_CODEC") {
            self.codec = serde_yaml::from_str(&val)
                .with_context(|| format!("Invalid SONICPIPE_CODEC value: {val}"))?;
        }

        if let Ok(val) = std::env::var("SONICPIPE_LATENCY_MODE") {
            self.latency_mode = serde_yaml::from_str(&val)
                .with_context(|| format!("Invalid SONICPIPE_LATENCY_MODE value: {val}"))?;
        }

        Ok(())
    }

    /// Converts to the core library's `SessionConfig`.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            ring: RingConfig {
                capacity: self.ring_capacity,
                element_type: self.ring_element_type,
            },
            encoder: EncoderConfig {
                codec: self.codec,
                sample_rate: self.sample_rate,
                channels: self.channels,
                bitrate: self.bitrate,
                latency_mode: self.latency_mode,
                frame_duration_ms: self.frame_duration_ms,
                frame_size_samples: None,
            },
            sink_url: self.sink_url.clone(),
            stats_interval_ms: self.stats_interval_ms,
        }
    }
}
