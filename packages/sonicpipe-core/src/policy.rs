//! Streaming policy: the immutable threshold set a session is pinned to for
//! its whole lifetime (§4.E). Adapted from the source crate's
//! `StreamingConfig` presets pattern, generalized from a single profile to
//! the two latency modes this pipeline chooses between.

use serde::{Deserialize, Serialize};

/// Latency mode selected per session (§3, StreamingPolicy). Chosen once at
/// session start and never changed mid-session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LatencyMode {
    /// Drops on backpressure, bounded catch-up window, no frame queue.
    Realtime,
    /// Never drops; backpressure is absorbed by a bounded frame queue.
    Quality,
}

/// Bytes. 512 KiB, shared by both latency modes (§3 table).
const WS_BUFFER_HIGH_WATER: usize = 512 * 1024;

/// Bytes. 8 MiB, quality mode only.
const QUALITY_FRAME_QUEUE_MAX_BYTES: usize = 8 * 1024 * 1024;

/// The resolved, immutable threshold set for one session (§3, §4.E). Derived
/// once from [`LatencyMode`] at session construction; consulted everywhere
/// backpressure or catch-up behavior differs between the two modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamingPolicy {
    pub latency_mode: LatencyMode,
    /// Whether the consumer drops frames under backpressure instead of
    /// queuing them.
    pub drop_on_backpressure: bool,
    /// Catch-up triggers once `consumerAvailable()` exceeds this many
    /// samples worth of audio. `None` in quality mode (catch-up disabled).
    pub catch_up_max_ms: Option<u32>,
    /// Catch-up advances `read` to leave this many ms of backlog.
    pub catch_up_target_ms: Option<u32>,
    /// WS send buffer high-water mark, in bytes.
    pub ws_buffer_high_water: usize,
    /// Max outstanding encode-queue depth before backpressure kicks in.
    pub max_encode_queue: usize,
    /// Frame-queue byte cap. Zero in realtime mode (queue unused).
    pub frame_queue_max_bytes: usize,
    /// Hysteretic trim target, in bytes. Zero in realtime mode.
    pub frame_queue_target_bytes: usize,
    /// Initial backoff delay under sustained backpressure, in ms.
    pub backoff_initial_ms: u64,
    /// Backoff delay ceiling, in ms. Differs between modes (§3 table,
    /// §4.F step 4: 40 ms realtime / 50 ms quality).
    pub backoff_max_ms: u64,
}

impl StreamingPolicy {
    /// Builds the policy for `mode` from the fixed thresholds in §3's table.
    pub fn for_mode(mode: LatencyMode) -> Self {
        match mode {
            LatencyMode::Realtime => Self {
                latency_mode: mode,
                drop_on_backpressure: true,
                catch_up_max_ms: Some(1000),
                catch_up_target_ms: Some(200),
                ws_buffer_high_water: WS_BUFFER_HIGH_WATER,
                max_encode_queue: 3,
                frame_queue_max_bytes: 0,
                frame_queue_target_bytes: 0,
                backoff_initial_ms: 5,
                backoff_max_ms: 40,
            },
            LatencyMode::Quality => Self {
                latency_mode: mode,
                drop_on_backpressure: false,
                catch_up_max_ms: None,
                catch_up_target_ms: None,
                ws_buffer_high_water: WS_BUFFER_HIGH_WATER,
                max_encode_queue: 16,
                frame_queue_max_bytes: QUALITY_FRAME_QUEUE_MAX_BYTES,
                // ~75% of max (§3 table, frameQueueTarget).
                frame_queue_target_bytes: QUALITY_FRAME_QUEUE_MAX_BYTES * 3 / 4,
                backoff_initial_ms: 5,
                backoff_max_ms: 50,
            },
        }
    }

    /// Whether catch-up applies at all in this mode.
    #[inline]
    pub fn catch_up_enabled(&self) -> bool {
        self.catch_up_max_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_drops_and_has_no_frame_queue() {
        let policy = StreamingPolicy::for_mode(LatencyMode::Realtime);
        assert!(policy.drop_on_backpressure);
        assert_eq!(policy.frame_queue_max_bytes, 0);
        assert_eq!(policy.max_encode_queue, 3);
        assert_eq!(policy.backoff_max_ms, 40);
        assert!(policy.catch_up_enabled());
    }

    #[test]
    fn quality_never_drops_and_has_bounded_frame_queue() {
        let policy = StreamingPolicy::for_mode(LatencyMode::Quality);
        assert!(!policy.drop_on_backpressure);
        assert_eq!(policy.frame_queue_max_bytes, 8 * 1024 * 1024);
        assert_eq!(policy.frame_queue_target_bytes, 6 * 1024 * 1024);
        assert_eq!(policy.max_encode_queue, 16);
        assert_eq!(policy.backoff_max_ms, 50);
        assert!(!policy.catch_up_enabled());
    }

    #[test]
    fn both_modes_share_ws_high_water() {
        let realtime = StreamingPolicy::for_mode(LatencyMode::Realtime);
        let quality = StreamingPolicy::for_mode(LatencyMode::Quality);
        assert_eq!(realtime.ws_buffer_high_water, quality.ws_buffer_high_water);
    }
}
