//! Per-interval metrics aggregation and timeline (component H, §4.H).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::protocol_constants::STATS_TIMELINE_CAPACITY;

/// One timestamped snapshot, posted to the supervisor and appended to the
/// timeline every `STATS_INTERVAL_MS` (§3, §4.H).
#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub ring_fill_fraction: f32,
    pub overflow_samples: u32,
    pub underflow_events: u32,
    pub frames_encoded: u64,
    pub avg_encode_ms: f32,
    pub encoder_queue_depth: usize,
    pub frames_sent: u64,
    pub ws_pressure_pct: f32,
    pub dropped_frames: u64,
    pub frame_queue_bytes: usize,
    pub catch_up_dropped_samples: u64,
}

/// Per-interval counters plus the bookkeeping needed to compute deltas
/// across 32-bit wrapping counters (§4.H: "producer-drop delta via 32-bit
/// unsigned subtraction from the previous snapshot").
pub struct StatsCollector {
    interval: Duration,
    last_emit: Instant,
    last_dropped: u32,

    underflow_events: u32,
    frames_encoded: u64,
    encode_ms_total: f32,
    encode_samples: u32,
    frames_sent: u64,
    dropped_frames_total: u64,
    catch_up_dropped_total: u64,

    total_samples_read: u64,
    wakeup_count: u64,

    timeline: VecDeque<MetricSnapshot>,
}

impl StatsCollector {
    pub fn new(interval: Duration, now: Instant, initial_dropped: u32) -> Self {
        Self {
            interval,
            last_emit: now,
            last_dropped: initial_dropped,
            underflow_events: 0,
            frames_encoded: 0,
            encode_ms_total: 0.0,
            encode_samples: 0,
            frames_sent: 0,
            dropped_frames_total: 0,
            catch_up_dropped_total: 0,
            total_samples_read: 0,
            wakeup_count: 0,
            timeline: VecDeque::with_capacity(STATS_TIMELINE_CAPACITY),
        }
    }

    pub fn record_wakeup(&mut self, samples_read: usize) {
        self.wakeup_count += 1;
        self.total_samples_read += samples_read as u64;
    }

    pub fn record_underflow(&mut self) {
        self.underflow_events += 1;
    }

    pub fn record_encode(&mut self, elapsed: Duration, encoder_queue_depth: usize) {
        self.frames_encoded += 1;
        self.encode_ms_total += elapsed.as_secs_f32() * 1000.0;
        self.encode_samples += 1;
        let _ = encoder_queue_depth;
    }

    pub fn record_sent(&mut self, count: u64) {
        self.frames_sent += count;
    }

    pub fn record_drop(&mut self, count: u64) {
        self.dropped_frames_total += count;
    }

    /// Records samples discarded by the realtime catch-up step (§4.F step
    /// 1, §7 "Catch-up drop"). Counted separately from consumer/producer
    /// drops since §8 scenario 4 asserts on it by name.
    pub fn record_catch_up_drop(&mut self, samples: u64) {
        self.catch_up_dropped_total += samples;
    }

    /// Checks whether `STATS_INTERVAL_MS` has elapsed since the last
    /// emission and, if so, builds a snapshot, resets the per-interval
    /// counters, and appends the snapshot to the capped timeline.
    #[allow(clippy::too_many_arguments)]
    pub fn maybe_snapshot(
        &mut self,
        now: Instant,
        current_dropped: u32,
        ring_fill: u32,
        ring_capacity: u32,
        encoder_queue_depth: usize,
        ws_buffered_bytes: usize,
        ws_high_water_bytes: usize,
        frame_queue_bytes: usize,
    ) -> Option<MetricSnapshot> {
        if now.duration_since(self.last_emit) < self.interval {
            return None;
        }

        let dropped_delta = current_dropped.wrapping_sub(self.last_dropped);
        self.last_dropped = current_dropped;

        let avg_encode_ms = if self.encode_samples > 0 {
            self.encode_ms_total / self.encode_samples as f32
        } else {
            0.0
        };

        let ring_fill_fraction = if ring_capacity > 0 {
            ring_fill as f32 / ring_capacity as f32
        } else {
            0.0
        };

        let ws_pressure_pct = if ws_high_water_bytes > 0 {
            (ws_buffered_bytes as f32 / ws_high_water_bytes as f32) * 100.0
        } else {
            0.0
        };

        let snapshot = MetricSnapshot {
            ring_fill_fraction,
            overflow_samples: dropped_delta,
            underflow_events: self.underflow_events,
            frames_encoded: self.frames_encoded,
            avg_encode_ms,
            encoder_queue_depth,
            frames_sent: self.frames_sent,
            ws_pressure_pct,
            dropped_frames: self.dropped_frames_total,
            frame_queue_bytes,
            catch_up_dropped_samples: self.catch_up_dropped_total,
        };

        if self.timeline.len() == STATS_TIMELINE_CAPACITY {
            self.timeline.pop_front();
        }
        self.timeline.push_back(snapshot.clone());

        self.last_emit = now;
        self.underflow_events = 0;
        self.frames_encoded = 0;
        self.encode_ms_total = 0.0;
        self.encode_samples = 0;
        self.frames_sent = 0;
        self.dropped_frames_total = 0;
        self.catch_up_dropped_total = 0;
        self.total_samples_read = 0;
        self.wakeup_count = 0;

        Some(snapshot)
    }

    /// The full timeline, emitted as a single message on shutdown (§4.H).
    pub fn timeline(&self) -> Vec<MetricSnapshot> {
        self.timeline.iter().cloned().collect()
    }

    pub fn avg_samples_per_wake(&self) -> f64 {
        if self.wakeup_count == 0 {
            0.0
        } else {
            self.total_samples_read as f64 / self.wakeup_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_snapshot_before_interval_elapses() {
        let now = Instant::now();
        let mut stats = StatsCollector::new(Duration::from_secs(2), now, 0);
        let snap = stats.maybe_snapshot(now + Duration::from_millis(500), 0, 0, 1024, 0, 0, 512_000, 0);
        assert!(snap.is_none());
    }

    #[test]
    fn snapshot_computes_dropped_delta_and_ring_fill() {
        let now = Instant::now();
        let mut stats = StatsCollector::new(Duration::from_secs(2), now, 100);
        let snap = stats
            .maybe_snapshot(now + Duration::from_secs(2), 150, 512, 1024, 2, 100_000, 512_000, 4096)
            .unwrap();
        assert_eq!(snap.overflow_samples, 50);
        assert!((snap.ring_fill_fraction - 0.5).abs() < 1e-6);
        assert!((snap.ws_pressure_pct - (100_000.0 / 512_000.0 * 100.0)).abs() < 1e-3);
    }

    #[test]
    fn dropped_delta_handles_u32_wraparound() {
        let now = Instant::now();
        let mut stats = StatsCollector::new(Duration::from_secs(2), now, u32::MAX - 5);
        let snap = stats
            .maybe_snapshot(now + Duration::from_secs(2), 10, 0, 1024, 0, 0, 512_000, 0)
            .unwrap();
        assert_eq!(snap.overflow_samples, 16);
    }

    #[test]
    fn timeline_caps_at_configured_capacity() {
        let now = Instant::now();
        let mut stats = StatsCollector::new(Duration::from_millis(1), now, 0);
        let mut t = now;
        for _ in 0..(STATS_TIMELINE_CAPACITY + 20) {
            t += Duration::from_millis(2);
            stats.maybe_snapshot(t, 0, 0, 1024, 0, 0, 512_000, 0);
        }
        assert_eq!(stats.timeline().len(), STATS_TIMELINE_CAPACITY);
    }

    #[test]
    fn record_encode_tracks_running_average() {
        let now = Instant::now();
        let mut stats = StatsCollector::new(Duration::from_secs(2), now, 0);
        stats.record_encode(Duration::from_millis(1), 0);
        stats.record_encode(Duration::from_millis(3), 0);
        let snap = stats
            .maybe_snapshot(now + Duration::from_secs(2), 0, 0, 1024, 0, 0, 512_000, 0)
            .unwrap();
        assert!((snap.avg_encode_ms - 2.0).abs() < 1e-3);
        assert_eq!(snap.frames_encoded, 2);
    }

    #[test]
    fn counters_reset_after_each_snapshot() {
        let now = Instant::now();
        let mut stats = StatsCollector::new(Duration::from_secs(2), now, 0);
        stats.record_sent(5);
        stats.record_drop(2);
        stats.maybe_snapshot(now + Duration::from_secs(2), 0, 0, 1024, 0, 0, 512_000, 0);

        let snap2 = stats
            .maybe_snapshot(now + Duration::from_secs(4), 0, 0, 1024, 0, 0, 512_000, 0)
            .unwrap();
        assert_eq!(snap2.frames_sent, 0);
        assert_eq!(snap2.dropped_frames, 0);
    }
}
