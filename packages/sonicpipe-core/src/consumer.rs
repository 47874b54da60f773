//! Single-threaded cooperative consumer loop (component F, §4.F).
//!
//! The timing- and threshold-sensitive arithmetic is extracted into free
//! functions (`compute_backoff_delay`, `align_down`, `is_backpressured`,
//! `clamp_next_due`) so it can be unit tested directly without driving a
//! real ring, encoder, and sink (§10.D notes the `start_paused` pattern as
//! the alternative for the integration-level tests in `session.rs`).
//!
//! The loop itself is `async` but single-threaded and cooperative (§5): it
//! never spawns, and every `.await` point here corresponds to one of the
//! suspension points §5 names (backoff yield, pacing yield, post-budget
//! yield, empty-ring wait).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::CodecEngine;
use crate::config::RingElementType;
use crate::frame_assembler::{samples_to_f32, FrameAssembler};
use crate::frame_queue::FrameQueue;
use crate::policy::StreamingPolicy;
use crate::protocol_constants::{CONSUMER_DRAIN_BUDGET_MS, RAMP_DURATION_MS, RING_WAIT_TIMEOUT_MS};
use crate::ramp;
use crate::ring::RingConsumerHandle;
use crate::sink::Sink;
use crate::stats::StatsCollector;

/// `catchUpMaxSamples`/`catchUpTargetSamples` converted from the policy's
/// ms thresholds (§4.F step 1).
#[inline]
pub fn ms_to_samples(sample_rate: u32, channels: u16, ms: u32) -> u32 {
    (sample_rate as u64 * ms as u64 / 1000) as u32 * channels as u32
}

/// Rounds `value` down to the nearest multiple of `align` (§4.F step 1:
/// "advance read to the frame-aligned position").
#[inline]
pub fn align_down(value: u32, align: u32) -> u32 {
    if align == 0 {
        value
    } else {
        (value / align) * align
    }
}

/// Exponential backoff with a hard ceiling (§4.F step 4: `min(initial x
/// 2^(n-1), max)`). `consecutive` is the number of consecutive
/// backpressured cycles, starting at 1.
#[inline]
pub fn compute_backoff_delay(consecutive: u32, initial_ms: u64, max_ms: u64) -> u64 {
    let shift = consecutive.saturating_sub(1).min(32);
    initial_ms.saturating_mul(1u64 << shift).min(max_ms)
}

/// Backpressure predicate (§4.F step 4): realtime checks the encoder queue
/// and WS buffered bytes; quality checks the encoder queue and the
/// frame-queue byte cap.
#[inline]
pub fn is_backpressured(
    policy: &StreamingPolicy,
    encode_queue_size: usize,
    ws_buffered_bytes: usize,
    frame_queue_bytes: usize,
) -> bool {
    if encode_queue_size >= policy.max_encode_queue {
        return true;
    }
    if policy.drop_on_backpressure {
        ws_buffered_bytes >= policy.ws_buffer_high_water
    } else {
        frame_queue_bytes >= policy.frame_queue_max_bytes
    }
}

/// Per-channel frame period in milliseconds (§4.F step 5).
#[inline]
pub fn frame_period_ms(per_channel_frame_size: usize, sample_rate: u32) -> f64 {
    per_channel_frame_size as f64 * 1000.0 / sample_rate as f64
}

/// Clamps `next_due_ms` so pacing can never fall more than `max_drift_ms`
/// behind `now_ms` (§4.F step 7: "permit burst catch-up after stalls
/// without unbounded drift").
#[inline]
pub fn clamp_next_due(next_due_ms: f64, now_ms: f64, max_drift_ms: f64) -> f64 {
    next_due_ms.max(now_ms - max_drift_ms)
}

/// Outcome of one `run_cycle` call, reported to the driver mostly for
/// logging/testing; the loop has already performed whatever sleep/yield
/// the cycle called for by the time it returns.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Progressed,
    Backoff,
    Pacing,
    BudgetExhausted,
    Underflow,
}

/// Owns everything one session's consumer needs: the ring read side, the
/// frame assembler, the polymorphic encoder, the sink, an optional
/// frame-queue (quality mode only), and the stats collector.
pub struct ConsumerLoop {
    ring: RingConsumerHandle,
    assembler: FrameAssembler,
    encoder: Box<dyn CodecEngine>,
    sink: Arc<dyn Sink>,
    frame_queue: Option<FrameQueue>,
    stats: StatsCollector,
    policy: StreamingPolicy,
    sample_rate: u32,
    channels: u16,
    frame_period_ms: f64,
    max_drift_ms: f64,
    ramp_samples: usize,

    needs_ramp_in: bool,
    consecutive_backpressure: u32,
    next_frame_due_ms: Option<f64>,
    last_dropped: u32,
    f32_scratch: Vec<f32>,
}

impl ConsumerLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ring: RingConsumerHandle,
        ring_elem: RingElementType,
        encoder: Box<dyn CodecEngine>,
        sink: Arc<dyn Sink>,
        frame_queue: Option<FrameQueue>,
        stats: StatsCollector,
        policy: StreamingPolicy,
        sample_rate: u32,
        channels: u16,
        per_channel_frame_size: usize,
    ) -> Self {
        let frame_size_samples = per_channel_frame_size * channels as usize;
        let ramp_samples = ramp::ramp_sample_count(sample_rate, channels, RAMP_DURATION_MS, frame_size_samples);
        let frame_period_ms = frame_period_ms(per_channel_frame_size, sample_rate);
        Self {
            ring,
            assembler: FrameAssembler::new(frame_size_samples, ring_elem),
            encoder,
            sink,
            frame_queue,
            stats,
            policy,
            sample_rate,
            channels,
            frame_period_ms,
            max_drift_ms: frame_period_ms * 6.0,
            ramp_samples,
            needs_ramp_in: false,
            consecutive_backpressure: 0,
            next_frame_due_ms: None,
            last_dropped: 0,
            f32_scratch: Vec::new(),
        }
    }

    /// Runs one cycle of the §4.F pseudocode, using `epoch` as the pacing
    /// clock's zero point so the arithmetic stays in plain `f64`
    /// milliseconds (friendlier to `#[tokio::test(start_paused = true)]`
    /// than juggling `Instant` subtraction throughout).
    pub async fn run_cycle(&mut self, epoch: Instant) -> CycleOutcome {
        let now = Instant::now();
        let now_ms = now.duration_since(epoch).as_secs_f64() * 1000.0;

        self.catch_up();
        self.detect_producer_drops();
        self.quality_flush().await;

        let frame_queue_bytes = self.frame_queue.as_ref().map(FrameQueue::bytes).unwrap_or(0);
        if is_backpressured(
            &self.policy,
            self.encoder.encode_queue_size(),
            self.sink.buffered_bytes(),
            frame_queue_bytes,
        ) {
            self.consecutive_backpressure += 1;
            let delay_ms = compute_backoff_delay(
                self.consecutive_backpressure,
                self.policy.backoff_initial_ms,
                self.policy.backoff_max_ms,
            );
            self.maybe_snapshot(now);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            return CycleOutcome::Backoff;
        }
        self.consecutive_backpressure = 0;

        if let Some(due) = self.next_frame_due_ms {
            if now_ms < due {
                tokio::time::sleep(Duration::from_secs_f64((due - now_ms).max(0.0) / 1000.0)).await;
                return CycleOutcome::Pacing;
            }
        }

        let frames_produced = self.drain_within_budget(now).await;

        if frames_produced > 0 {
            let base = self.next_frame_due_ms.unwrap_or(now_ms);
            let advanced = base + frames_produced as f64 * self.frame_period_ms;
            self.next_frame_due_ms = Some(clamp_next_due(advanced, now_ms, self.max_drift_ms));
        }

        self.maybe_snapshot(now);

        if frames_produced > 0 {
            return CycleOutcome::Progressed;
        }

        if self.ring.consumer_available() > 0 {
            tokio::task::yield_now().await;
            return CycleOutcome::BudgetExhausted;
        }

        let expected_write = self.ring.write_cursor();
        let woken = self
            .ring
            .wait_for_write(expected_write, Duration::from_millis(RING_WAIT_TIMEOUT_MS));
        if woken {
            return CycleOutcome::Progressed;
        }

        self.stats.record_underflow();
        self.send_underflow_ramp().await;
        CycleOutcome::Underflow
    }

    fn catch_up(&mut self) {
        if !self.policy.catch_up_enabled() {
            return;
        }
        let catch_up_max = ms_to_samples(self.sample_rate, self.channels, self.policy.catch_up_max_ms.unwrap());
        if self.ring.consumer_available() <= catch_up_max {
            return;
        }
        let target = ms_to_samples(self.sample_rate, self.channels, self.policy.catch_up_target_ms.unwrap());
        let frame_size = self.assembler.frame_size_samples() as u32;
        let write = self.ring.write_cursor();
        let new_read = write.wrapping_sub(align_down(target, frame_size));
        let dropped_samples = new_read.wrapping_sub(self.ring.read_cursor());
        self.ring.advance_read_to(new_read);
        self.assembler.reset();
        let dropped_frames = dropped_samples as u64 / self.channels.max(1) as u64;
        self.encoder.advance_timestamp(dropped_frames);
        self.stats.record_catch_up_drop(dropped_samples as u64);
    }

    fn detect_producer_drops(&mut self) {
        let current_dropped = self.ring.load_dropped();
        if current_dropped.wrapping_sub(self.last_dropped) != 0 {
            self.needs_ramp_in = true;
        }
        self.last_dropped = current_dropped;
    }

    async fn quality_flush(&mut self) {
        if self.policy.drop_on_backpressure {
            return;
        }
        let high_water = self.policy.ws_buffer_high_water;
        let Some(queue) = &mut self.frame_queue else {
            return;
        };
        if queue.is_empty() {
            return;
        }
        let sent = queue.drain_while(|_| self.sink.buffered_bytes() < high_water);
        for frame in sent {
            if self.sink.send_binary(frame).await.is_ok() {
                self.stats.record_sent(1);
            }
        }
    }

    async fn drain_within_budget(&mut self, cycle_start: Instant) -> u32 {
        let drain_deadline = cycle_start + Duration::from_millis(CONSUMER_DRAIN_BUDGET_MS);
        let mut frames_produced = 0u32;

        loop {
            if Instant::now() >= drain_deadline {
                break;
            }
            if !self.assembler.pull(&self.ring) {
                break;
            }

            samples_to_f32(self.assembler.frame(), &mut self.f32_scratch);
            if self.needs_ramp_in {
                ramp::apply_fade_in(&mut self.f32_scratch, self.channels, self.ramp_samples);
                self.needs_ramp_in = false;
            }

            let encode_start = Instant::now();
            let output = self.encoder.encode(&self.f32_scratch);
            self.stats.record_encode(encode_start.elapsed(), self.encoder.encode_queue_size());
            self.assembler.reset();
            frames_produced += 1;

            if let Some(bytes) = output {
                self.dispatch_output(bytes).await;
            }

            if self.encoder.encode_queue_size() >= self.policy.max_encode_queue {
                break;
            }
            if self.policy.drop_on_backpressure && self.sink.buffered_bytes() >= self.policy.ws_buffer_high_water {
                break;
            }
        }

        frames_produced
    }

    async fn dispatch_output(&mut self, bytes: Vec<u8>) {
        if self.policy.drop_on_backpressure {
            if self.sink.buffered_bytes() < self.policy.ws_buffer_high_water {
                if self.sink.send_binary(bytes).await.is_ok() {
                    self.stats.record_sent(1);
                }
            } else {
                self.stats.record_drop(1);
            }
        } else if let Some(queue) = &mut self.frame_queue {
            let before = queue.overflow_drops();
            queue.enqueue(bytes);
            let dropped = queue.overflow_drops() - before;
            if dropped > 0 {
                self.stats.record_drop(dropped);
            }
        }
    }

    async fn send_underflow_ramp(&mut self) {
        let offset = self.assembler.offset();
        if offset < self.channels as usize {
            return;
        }
        let frame_size = self.assembler.frame_size_samples();
        samples_to_f32(self.assembler.filled(), &mut self.f32_scratch);
        self.f32_scratch.resize(frame_size, 0.0);

        if let Some(last) = ramp::last_channel_values(&self.f32_scratch, self.channels, offset) {
            ramp::fill_fade_out(&mut self.f32_scratch, offset, &last, self.channels, self.ramp_samples);
        } else {
            self.f32_scratch[offset..].fill(0.0);
        }

        let output = self.encoder.encode(&self.f32_scratch);
        self.assembler.reset();
        if let Some(bytes) = output {
            self.dispatch_output(bytes).await;
        }
        self.needs_ramp_in = true;
    }

    fn maybe_snapshot(&mut self, now: Instant) {
        let ring_fill = self.ring.consumer_available();
        let ring_capacity = self.ring.capacity();
        let frame_queue_bytes = self.frame_queue.as_ref().map(FrameQueue::bytes).unwrap_or(0);
        let encode_queue_depth = self.encoder.encode_queue_size();
        let ws_buffered = self.sink.buffered_bytes();
        let ws_high_water = self.policy.ws_buffer_high_water;
        let dropped = self.ring.load_dropped();
        self.stats.maybe_snapshot(
            now,
            dropped,
            ring_fill,
            ring_capacity,
            encode_queue_depth,
            ws_buffered,
            ws_high_water,
            frame_queue_bytes,
        );
    }

    /// Takes the encoder's one-shot fatal fault, if it raised one during
    /// the last cycle (§4.D, Failure: "any encoder may surface a fatal
    /// error via its error callback; the ConsumerLoop translates this into
    /// a session error").
    pub fn take_encoder_fault(&mut self) -> Option<String> {
        self.encoder.take_fault()
    }

    /// Performs the shutdown sequence (§4.F, "Shutdown"): flush any
    /// partial frame, flush the encoder, drain the frame-queue
    /// unconditionally, close the encoder, and return the final timeline
    /// for a `MetricsDump`. Closing the sink itself is the caller's
    /// responsibility (the sink outlives this loop as an `Arc`).
    pub async fn shutdown(mut self) -> Vec<crate::stats::MetricSnapshot> {
        if self.assembler.offset() > 0 {
            samples_to_f32(self.assembler.filled(), &mut self.f32_scratch);
            if let Some(bytes) = self.encoder.encode(&self.f32_scratch) {
                self.dispatch_output(bytes).await;
            }
        }
        if let Some(bytes) = self.encoder.flush() {
            self.dispatch_output(bytes).await;
        }
        if let Some(queue) = &mut self.frame_queue {
            let sent = queue.drain_while(|_| true);
            for frame in sent {
                let _ = self.sink.send_binary(frame).await;
            }
        }
        self.encoder.close();
        self.stats.timeline()
    }
}
