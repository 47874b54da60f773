//! Real-time-thread-safe entry point into the ring (component B, §4.B).
//!
//! `Producer` is the only thing the capture callback touches. Every method
//! here must be call-able from a real-time audio thread: no allocation, no
//! locking, no blocking (P2).

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RingElementType;
use crate::dither::tpdf_quantize_i16;
use crate::ring::{RingProducerHandle, Sample};

/// One block handed over by the capture layer: `frame_count` samples per
/// channel, interleaved, in `[-1.0, 1.0]` (clamped on the way in).
pub struct CaptureBlock<'a> {
    pub frame_count: usize,
    pub channels: u16,
    pub interleaved: &'a [f32],
}

/// Wraps a [`RingProducerHandle`] with the scratch state needed to convert
/// a [`CaptureBlock`] into ring samples without allocating per call (§4.B
/// P2): a reusable conversion buffer and, when the ring carries Int16, a
/// dither RNG.
pub struct Producer {
    ring: RingProducerHandle,
    ring_channels: u16,
    ring_elem: RingElementType,
    rng: Option<StdRng>,
    scratch: Vec<Sample>,
}

impl Producer {
    /// `ring_channels` is the channel count the ring was sized for (§3: the
    /// ring stores already-interleaved samples at a fixed channel count for
    /// its whole lifetime). `dither_seed` seeds the TPDF RNG used only when
    /// `ring.element_type()` is `Int16`.
    pub fn new(ring: RingProducerHandle, ring_channels: u16, ring_elem: RingElementType, dither_seed: u64) -> Self {
        let rng = matches!(ring_elem, RingElementType::Int16).then(|| StdRng::seed_from_u64(dither_seed));
        Self {
            ring,
            ring_channels,
            ring_elem,
            rng,
            scratch: Vec::new(),
        }
    }

    /// Samples the ring may currently accept without dropping.
    pub fn available(&self) -> u32 {
        self.ring.producer_available()
    }

    /// Current monotonic drop counter.
    pub fn dropped(&self) -> u32 {
        self.ring.dropped()
    }

    /// Converts and pushes one capture block (§4.B steps 1-7). Returns
    /// `true` if the block was written, `false` if it was dropped whole
    /// because the ring didn't have room.
    ///
    /// Upmixes mono input to the ring's channel count by duplicating the
    /// single channel across all ring channels; any other channel-count
    /// mismatch is the caller's responsibility to avoid (the session layer
    /// only ever builds a ring matching the configured channel count).
    pub fn push_block(&mut self, block: &CaptureBlock<'_>) -> bool {
        let need = block.frame_count * self.ring_channels as usize;
        self.scratch.clear();
        self.scratch.reserve(need);

        let upmix_mono = block.channels == 1 && self.ring_channels > 1;

        for frame in 0..block.frame_count {
            for ch in 0..self.ring_channels as usize {
                let src_ch = if upmix_mono { 0 } else { ch.min(block.channels as usize - 1) };
                let idx = frame * block.channels as usize + src_ch;
                let raw = block.interleaved.get(idx).copied().unwrap_or(0.0);
                let clamped = raw.clamp(-1.0, 1.0);
                let sample = match (self.ring_elem, &mut self.rng) {
                    (RingElementType::Int16, Some(rng)) => Sample::Int16(tpdf_quantize_i16(rng, clamped)),
                    _ => Sample::Float32(clamped),
                };
                self.scratch.push(sample);
            }
        }

        self.ring.push(&self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring;

    #[test]
    fn pushes_stereo_block_unchanged() {
        let (producer, consumer) = ring::init(1024, RingElementType::Float32).unwrap();
        let mut p = Producer::new(producer, 2, RingElementType::Float32, 0);
        let interleaved = [0.1f32, -0.2, 0.3, -0.4];
        let block = CaptureBlock {
            frame_count: 2,
            channels: 2,
            interleaved: &interleaved,
        };
        assert!(p.push_block(&block));
        assert_eq!(consumer.consumer_available(), 4);

        let mut dst = vec![Sample::Float32(0.0); 4];
        consumer.pop(&mut dst);
        assert_eq!(dst, vec![
            Sample::Float32(0.1),
            Sample::Float32(-0.2),
            Sample::Float32(0.3),
            Sample::Float32(-0.4),
        ]);
    }

    #[test]
    fn upmixes_mono_to_stereo_ring() {
        let (producer, consumer) = ring::init(1024, RingElementType::Float32).unwrap();
        let mut p = Producer::new(producer, 2, RingElementType::Float32, 0);
        let interleaved = [0.5f32, -0.5];
        let block = CaptureBlock {
            frame_count: 2,
            channels: 1,
            interleaved: &interleaved,
        };
        assert!(p.push_block(&block));

        let mut dst = vec![Sample::Float32(0.0); 4];
        consumer.pop(&mut dst);
        assert_eq!(dst, vec![
            Sample::Float32(0.5),
            Sample::Float32(0.5),
            Sample::Float32(-0.5),
            Sample::Float32(-0.5),
        ]);
    }

    #[test]
    fn clamps_out_of_range_samples() {
        let (producer, consumer) = ring::init(1024, RingElementType::Float32).unwrap();
        let mut p = Producer::new(producer, 1, RingElementType::Float32, 0);
        let interleaved = [5.0f32, -5.0];
        let block = CaptureBlock {
            frame_count: 2,
            channels: 1,
            interleaved: &interleaved,
        };
        p.push_block(&block);
        let mut dst = vec![Sample::Float32(0.0); 2];
        consumer.pop(&mut dst);
        assert_eq!(dst, vec![Sample::Float32(1.0), Sample::Float32(-1.0)]);
    }

    #[test]
    fn quantizes_to_int16_when_ring_is_int16() {
        let (producer, consumer) = ring::init(1024, RingElementType::Int16).unwrap();
        let mut p = Producer::new(producer, 1, RingElementType::Int16, 7);
        let interleaved = [0.5f32];
        let block = CaptureBlock {
            frame_count: 1,
            channels: 1,
            interleaved: &interleaved,
        };
        p.push_block(&block);
        let mut dst = vec![Sample::Int16(0); 1];
        consumer.pop(&mut dst);
        match dst[0] {
            Sample::Int16(v) => assert!((v as i32 - 16384).abs() < 10),
            Sample::Float32(_) => panic!("expected Int16 sample"),
        }
    }

    #[test]
    fn whole_block_drops_when_ring_full() {
        let (producer, _consumer) = ring::init(1024, RingElementType::Float32).unwrap();
        let mut p = Producer::new(producer, 1, RingElementType::Float32, 0);
        let full = vec![0.0f32; 1024];
        let block = CaptureBlock {
            frame_count: 1024,
            channels: 1,
            interleaved: &full,
        };
        assert!(p.push_block(&block));

        let overflow = vec![0.0f32; 10];
        let block2 = CaptureBlock {
            frame_count: 10,
            channels: 1,
            interleaved: &overflow,
        };
        assert!(!p.push_block(&block2));
        assert_eq!(p.dropped(), 10);
    }
}
