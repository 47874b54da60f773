//! Lock-free single-producer/single-consumer sample ring (component A).
//!
//! Modeled as a fixed-capacity buffer with a header of three atomic 32-bit
//! counters, shared between a producer handle and a consumer handle that
//! each see the same backing storage (see DESIGN.md for why this crate uses
//! a plain heap allocation rather than an OS shared-memory mapping — both
//! contexts live in one process here).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot_core::{self, ParkResult, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

use crate::config::RingElementType;

/// One ring sample. The ring carries exactly one element type for its whole
/// lifetime (§3: "The element type is chosen at initialization and does not
/// change").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Already-quantized 16-bit signed sample.
    Int16(i16),
    /// Full-precision sample in `[-1.0, 1.0]`.
    Float32(f32),
}

impl Sample {
    fn zero(elem: RingElementType) -> Self {
        match elem {
            RingElementType::Int16 => Sample::Int16(0),
            RingElementType::Float32 => Sample::Float32(0.0),
        }
    }
}

struct RingHeader {
    write: AtomicU32,
    read: AtomicU32,
    dropped: AtomicU32,
}

/// The shared backing storage for a ring. Both [`RingProducerHandle`] and
/// [`RingConsumerHandle`] hold an `Arc` to the same instance; neither owns it
/// exclusively, mirroring the cross-context shared-memory model in §5.
struct RingStorage {
    header: RingHeader,
    mask: u32,
    elem: RingElementType,
    data: Box<[UnsafeCell<Sample>]>,
}

// Safety: `data` is accessed through raw pointers in `push`/`pop` below, not
// through `UnsafeCell::get_mut`. The write/read counter protocol (R2)
// guarantees the producer only ever writes slots the consumer has already
// read past, and the consumer only ever reads slots the producer has
// already published via the release-store on `write` — so the two sides
// never touch the same slot concurrently, even though nothing here is a
// lock. This is the same non-overlapping-region argument SPSC ring crates
// such as `rtrb` rely on.
unsafe impl Sync for RingStorage {}

impl RingStorage {
    fn new(capacity: u32, elem: RingElementType) -> Self {
        let data = (0..capacity)
            .map(|_| UnsafeCell::new(Sample::zero(elem)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            header: RingHeader {
                write: AtomicU32::new(0),
                read: AtomicU32::new(0),
                dropped: AtomicU32::new(0),
            },
            mask: capacity - 1,
            elem,
            data,
        }
    }

    #[inline]
    fn fill(&self, write: u32, read: u32) -> u32 {
        write.wrapping_sub(read)
    }

    fn write_addr(&self) -> usize {
        std::ptr::addr_of!(self.header.write) as usize
    }
}

/// Builds a fresh ring, returning a producer handle and a consumer handle
/// that share the same backing storage.
///
/// # Errors
/// Returns a message if `capacity` is not a power of two (R3 requires
/// `capacity` also be `>= 1024`; that floor is enforced by
/// [`crate::config::RingConfig::validate`] before this is called).
pub fn init(
    capacity: u32,
    elem: RingElementType,
) -> Result<(RingProducerHandle, RingConsumerHandle), String> {
    if !capacity.is_power_of_two() {
        return Err(format!("capacity must be a power of two, got {capacity}"));
    }
    let storage = Arc::new(RingStorage::new(capacity, elem));
    Ok((
        RingProducerHandle {
            storage: storage.clone(),
        },
        RingConsumerHandle { storage },
    ))
}

/// Producer-side handle. Called only from the real-time capture callback
/// (§4.B). Never touches `read`.
pub struct RingProducerHandle {
    storage: Arc<RingStorage>,
}

impl RingProducerHandle {
    /// Samples the ring may currently accept without dropping.
    pub fn producer_available(&self) -> u32 {
        let write = self.storage.header.write.load(Ordering::Relaxed);
        let read = self.storage.header.read.load(Ordering::Acquire);
        (self.storage.mask + 1) - self.storage.fill(write, read)
    }

    /// Pushes `samples`, dropping the whole slice if there isn't room (§4.B
    /// step 3: partial writes are forbidden). Returns `true` if written,
    /// `false` if dropped.
    ///
    /// Does not allocate and does not block (P2). Notifies a waiting
    /// consumer only on an empty-to-non-empty transition, per §4.A's
    /// "minimize wakeups" note.
    pub fn push(&self, samples: &[Sample]) -> bool {
        let need = samples.len() as u32;
        let write = self.storage.header.write.load(Ordering::Relaxed);
        let read = self.storage.header.read.load(Ordering::Acquire);
        let fill = self.storage.fill(write, read);
        let avail = (self.storage.mask + 1) - fill;

        if avail < need {
            self.storage
                .header
                .dropped
                .fetch_add(need, Ordering::Relaxed);
            return false;
        }

        let was_empty = write == read;

        for (i, sample) in samples.iter().enumerate() {
            let idx = (write.wrapping_add(i as u32) & self.storage.mask) as usize;
            // Safety: see the `unsafe impl Sync for RingStorage` comment above.
            unsafe {
                *self.storage.data[idx].get() = *sample;
            }
        }

        self.storage
            .header
            .write
            .store(write.wrapping_add(need), Ordering::Release);

        if was_empty {
            unsafe {
                parking_lot_core::unpark_one(self.storage.write_addr(), |_result| {
                    DEFAULT_UNPARK_TOKEN
                });
            }
        }

        true
    }

    /// Current value of the drop counter (monotonic, §3).
    pub fn dropped(&self) -> u32 {
        self.storage.header.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer-side handle. Owned exclusively by the single consumer task
/// (§4.F). Never touches `write`.
pub struct RingConsumerHandle {
    storage: Arc<RingStorage>,
}

impl RingConsumerHandle {
    /// Samples currently available to read (the ring's fill level).
    pub fn consumer_available(&self) -> u32 {
        let write = self.storage.header.write.load(Ordering::Acquire);
        let read = self.storage.header.read.load(Ordering::Relaxed);
        self.storage.fill(write, read)
    }

    /// Current (non-wrapped) read cursor value.
    pub fn read_cursor(&self) -> u32 {
        self.storage.header.read.load(Ordering::Relaxed)
    }

    /// Current (non-wrapped) write cursor value, for catch-up math (§4.F).
    pub fn write_cursor(&self) -> u32 {
        self.storage.header.write.load(Ordering::Acquire)
    }

    /// Copies up to `dst.len()` samples starting at `read` into `dst`,
    /// handling the two-part wraparound copy, and advances `read`.
    /// Returns the number of samples actually copied (may be less than
    /// `dst.len()` if the ring doesn't have that many available).
    pub fn pop(&self, dst: &mut [Sample]) -> usize {
        let avail = self.consumer_available();
        let n = dst.len().min(avail as usize) as u32;
        let read = self.storage.header.read.load(Ordering::Relaxed);

        for i in 0..n {
            let idx = (read.wrapping_add(i) & self.storage.mask) as usize;
            // Safety: see the `unsafe impl Sync for RingStorage` comment above.
            dst[i as usize] = unsafe { *self.storage.data[idx].get() };
        }

        self.storage
            .header
            .read
            .store(read.wrapping_add(n), Ordering::Release);
        n as usize
    }

    /// Advances `read` directly to `new_read` without copying samples, used
    /// by catch-up (§4.F step 1) to discard the oldest samples in bulk.
    pub fn advance_read_to(&self, new_read: u32) {
        self.storage.header.read.store(new_read, Ordering::Release);
    }

    /// Loads the producer's monotonic drop counter (relaxed, stats-only per
    /// §5).
    pub fn load_dropped(&self) -> u32 {
        self.storage.header.dropped.load(Ordering::Relaxed)
    }

    /// Ring capacity in samples.
    pub fn capacity(&self) -> u32 {
        self.storage.mask + 1
    }

    /// Element type the ring carries.
    pub fn element_type(&self) -> RingElementType {
        self.storage.elem
    }

    /// Blocks the current thread until the producer notifies an
    /// empty-to-non-empty transition, `timeout` elapses, or `write` has
    /// already moved past `expected_write` (avoids a lost-wakeup race).
    /// Returns `true` if woken by a notification before the timeout.
    pub fn wait_for_write(&self, expected_write: u32, timeout: std::time::Duration) -> bool {
        let current = self.storage.header.write.load(Ordering::Acquire);
        if current != expected_write {
            return true;
        }
        let addr = self.storage.write_addr();
        let validate = || self.storage.header.write.load(Ordering::Acquire) == expected_write;
        let before_sleep = || {};
        let timed_out = |_, _| {};
        let deadline = std::time::Instant::now() + timeout;
        let result = unsafe {
            parking_lot_core::park(
                addr,
                validate,
                before_sleep,
                timed_out,
                DEFAULT_PARK_TOKEN,
                Some(deadline),
            )
        };
        matches!(result, ParkResult::Unparked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingElementType;

    fn samples(vals: &[f32]) -> Vec<Sample> {
        vals.iter().map(|&v| Sample::Float32(v)).collect()
    }

    #[test]
    fn push_and_pop_roundtrip() {
        let (producer, consumer) = init(1024, RingElementType::Float32).unwrap();
        assert!(producer.push(&samples(&[0.1, 0.2, 0.3])));
        assert_eq!(consumer.consumer_available(), 3);

        let mut dst = vec![Sample::Float32(0.0); 3];
        let n = consumer.pop(&mut dst);
        assert_eq!(n, 3);
        assert_eq!(dst, samples(&[0.1, 0.2, 0.3]));
        assert_eq!(consumer.consumer_available(), 0);
    }

    #[test]
    fn push_drops_whole_block_when_full() {
        let (producer, _consumer) = init(1024, RingElementType::Float32).unwrap();
        let full = vec![Sample::Float32(1.0); 1024];
        assert!(producer.push(&full));
        assert!(!producer.push(&samples(&[0.5])));
        assert_eq!(producer.dropped(), 1);
    }

    #[test]
    fn fill_never_exceeds_capacity_across_wrap() {
        let (producer, consumer) = init(1024, RingElementType::Float32).unwrap();
        let block = vec![Sample::Float32(0.5); 100];
        for _ in 0..300 {
            producer.push(&block);
            let mut dst = vec![Sample::Float32(0.0); 100];
            consumer.pop(&mut dst);
            assert!(consumer.consumer_available() <= consumer.capacity());
        }
    }

    #[test]
    fn ring_wrap_preserves_order_with_no_loss() {
        let (producer, consumer) = init(1024, RingElementType::Float32).unwrap();
        let total_pushed = 1024 * 3;
        let block_size = 37; // deliberately not a divisor of capacity
        let mut expected = Vec::new();
        let mut received = Vec::new();
        let mut next_val = 0u32;

        let mut pushed = 0usize;
        while pushed < total_pushed {
            let n = block_size.min(total_pushed - pushed);
            let block: Vec<Sample> = (0..n)
                .map(|_| {
                    let v = Sample::Float32(next_val as f32);
                    next_val += 1;
                    v
                })
                .collect();
            expected.extend_from_slice(&block);
            assert!(producer.push(&block));
            pushed += n;

            let mut dst = vec![Sample::Float32(0.0); n];
            let got = consumer.pop(&mut dst);
            received.extend_from_slice(&dst[..got]);
        }

        assert_eq!(received.len(), expected.len());
        assert_eq!(received, expected);
    }

    #[test]
    fn counter_wrap_at_u32_max_preserves_fill_semantics() {
        let (producer, consumer) = init(1024, RingElementType::Float32).unwrap();
        // Force both counters close to u32::MAX to exercise the wrap.
        producer
            .storage
            .header
            .write
            .store(u32::MAX - 10, Ordering::Relaxed);
        producer
            .storage
            .header
            .read
            .store(u32::MAX - 10, Ordering::Relaxed);

        let block = samples(&[0.1; 20]);
        assert!(producer.push(&block));
        assert_eq!(consumer.consumer_available(), 20);

        let mut dst = vec![Sample::Float32(0.0); 20];
        let n = consumer.pop(&mut dst);
        assert_eq!(n, 20);
        assert_eq!(consumer.consumer_available(), 0);
    }

    #[test]
    fn dropped_counter_is_monotone_non_decreasing() {
        let (producer, _consumer) = init(1024, RingElementType::Float32).unwrap();
        let full = vec![Sample::Float32(1.0); 1024];
        producer.push(&full);
        let mut last = producer.dropped();
        for _ in 0..5 {
            producer.push(&samples(&[0.0; 10]));
            let now = producer.dropped();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn init_rejects_non_power_of_two_capacity() {
        assert!(init(1000, RingElementType::Float32).is_err());
    }

    #[test]
    fn advance_read_to_performs_bulk_catch_up() {
        let (producer, consumer) = init(1024, RingElementType::Float32).unwrap();
        let block = vec![Sample::Float32(0.5); 800];
        producer.push(&block);
        assert_eq!(consumer.consumer_available(), 800);

        let target = consumer.write_cursor().wrapping_sub(100);
        consumer.advance_read_to(target);
        assert_eq!(consumer.consumer_available(), 100);
    }
}
