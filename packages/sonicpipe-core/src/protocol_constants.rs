//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (ADTS/AAC, Ogg/Vorbis,
//! the sink handshake) and changing them would break wire compatibility.

// ─────────────────────────────────────────────────────────────────────────────
// Audio Standards
// ─────────────────────────────────────────────────────────────────────────────

/// Default audio sample rate (Hz).
///
/// 48kHz is the standard for digital audio (DVD, Blu-ray, professional audio).
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default number of audio channels (stereo).
pub const DEFAULT_CHANNELS: u16 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Sink handshake / heartbeat
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for the WebSocket connect handshake (seconds).
pub const WS_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Timeout waiting for `HANDSHAKE_ACK` after sending `HANDSHAKE` (seconds).
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;

/// Interval between outbound `HEARTBEAT` frames once a session is running.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Ring / pacing
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum ring capacity in samples. Enforced by [`crate::config::RingConfig::validate`].
pub const MIN_RING_CAPACITY: u32 = 1024;

/// How long the consumer waits on an empty ring before declaring underflow (ms).
pub const RING_WAIT_TIMEOUT_MS: u64 = 200;

/// Per-cycle time budget for draining the ring into frames (ms).
pub const CONSUMER_DRAIN_BUDGET_MS: u64 = 4;

/// Initial backoff delay under backpressure (ms).
pub const BACKOFF_INITIAL_MS: u64 = 5;

/// Backoff ceiling under backpressure in the realtime policy (ms).
pub const BACKOFF_MAX_REALTIME_MS: u64 = 40;

/// Backoff ceiling under backpressure in the quality policy (ms).
pub const BACKOFF_MAX_QUALITY_MS: u64 = 50;

/// Duration of the ramp-out / ramp-in fade applied around discontinuities (ms).
pub const RAMP_DURATION_MS: u32 = 3;

/// Default PCM frame duration when the supervisor does not supply one (ms).
///
/// Open Question resolution (see DESIGN.md): the distilled spec allows both a
/// 10ms PCM mode and codec-native sizes; absent an explicit
/// `frameDurationMs`, 20ms is used.
pub const DEFAULT_PCM_FRAME_DURATION_MS: u32 = 20;

/// Allowed PCM frame durations (ms).
pub const ALLOWED_PCM_FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 40];

// ─────────────────────────────────────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between `MetricSnapshot` emissions (ms).
pub const STATS_INTERVAL_MS: u64 = 2000;

/// Maximum number of snapshots retained in the rolling timeline (~10 minutes
/// at one snapshot per [`STATS_INTERVAL_MS`]).
pub const STATS_TIMELINE_CAPACITY: usize = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Application identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in logging and the demo binary's `--version` string.
pub const APP_NAME: &str = "sonicpipe";
