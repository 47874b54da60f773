//! Accumulates ring samples into codec-sized interleaved frames (§4.C).
//!
//! Wrap-around across the ring's buffer boundary is handled entirely by
//! [`crate::ring::RingConsumerHandle::pop`]'s two-segment copy; this type
//! only tracks how much of the pre-allocated frame has been filled so far.

use crate::config::RingElementType;
use crate::ring::{RingConsumerHandle, Sample};

/// Holds a pre-allocated `frameBuffer[frameSizeSamples]` and a fill cursor
/// (§4.C).
pub struct FrameAssembler {
    frame_size_samples: usize,
    buffer: Vec<Sample>,
    offset: usize,
}

impl FrameAssembler {
    pub fn new(frame_size_samples: usize, elem: RingElementType) -> Self {
        let zero = match elem {
            RingElementType::Int16 => Sample::Int16(0),
            RingElementType::Float32 => Sample::Float32(0.0),
        };
        Self {
            frame_size_samples,
            buffer: vec![zero; frame_size_samples],
            offset: 0,
        }
    }

    /// Samples-per-channel-frame size this assembler was built for.
    pub fn frame_size_samples(&self) -> usize {
        self.frame_size_samples
    }

    /// How many samples of the current frame are already filled. Used by
    /// the underflow ramp (§4.F) to find where a partial frame stopped.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pulls as many samples as the ring has available into the frame
    /// buffer. Returns `true` if the frame is now complete (caller should
    /// read [`Self::frame`] then call [`Self::reset`]).
    pub fn pull(&mut self, ring: &RingConsumerHandle) -> bool {
        if self.offset >= self.frame_size_samples {
            return true;
        }
        let n = ring.pop(&mut self.buffer[self.offset..]);
        self.offset += n;
        self.offset >= self.frame_size_samples
    }

    /// The frame buffer's valid prefix (`buffer[..offset]`), whether or
    /// not the frame is complete yet — used by the underflow ramp to see
    /// a partial frame.
    pub fn filled(&self) -> &[Sample] {
        &self.buffer[..self.offset]
    }

    /// The complete frame buffer. Only meaningful once [`Self::pull`]
    /// returns `true`.
    pub fn frame(&self) -> &[Sample] {
        &self.buffer
    }

    /// Resets the fill cursor to start assembling the next frame.
    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// Converts a slice of ring samples to interleaved Float32, the input type
/// every [`crate::codec::CodecEngine::encode`] expects.
pub fn samples_to_f32(samples: &[Sample], out: &mut Vec<f32>) {
    out.clear();
    out.reserve(samples.len());
    for s in samples {
        out.push(match *s {
            Sample::Float32(v) => v,
            Sample::Int16(v) => v as f32 / 32768.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring;

    #[test]
    fn pull_accumulates_across_multiple_ring_pops() {
        let (producer, consumer) = ring::init(1024, RingElementType::Float32).unwrap();
        let mut assembler = FrameAssembler::new(10, RingElementType::Float32);

        let block: Vec<Sample> = (0..4).map(|i| Sample::Float32(i as f32)).collect();
        producer.push(&block);
        assert!(!assembler.pull(&consumer));
        assert_eq!(assembler.offset(), 4);

        let block2: Vec<Sample> = (4..10).map(|i| Sample::Float32(i as f32)).collect();
        producer.push(&block2);
        assert!(assembler.pull(&consumer));
        assert_eq!(assembler.offset(), 10);

        let frame = assembler.frame();
        for (i, s) in frame.iter().enumerate() {
            assert_eq!(*s, Sample::Float32(i as f32));
        }
    }

    #[test]
    fn reset_allows_assembling_next_frame() {
        let (producer, consumer) = ring::init(1024, RingElementType::Float32).unwrap();
        let mut assembler = FrameAssembler::new(4, RingElementType::Float32);
        producer.push(&[Sample::Float32(1.0); 4]);
        assert!(assembler.pull(&consumer));
        assembler.reset();
        assert_eq!(assembler.offset(), 0);

        producer.push(&[Sample::Float32(2.0); 4]);
        assert!(assembler.pull(&consumer));
        assert_eq!(assembler.frame(), &[Sample::Float32(2.0); 4]);
    }

    #[test]
    fn wrap_around_is_transparent_to_assembler() {
        let (producer, consumer) = ring::init(16, RingElementType::Float32).unwrap();
        // Push and pop to advance the cursors near the wrap boundary.
        producer.push(&[Sample::Float32(9.0); 12]);
        let mut dst = vec![Sample::Float32(0.0); 12];
        consumer.pop(&mut dst);

        let mut assembler = FrameAssembler::new(8, RingElementType::Float32);
        let block: Vec<Sample> = (0..8).map(|i| Sample::Float32(i as f32)).collect();
        producer.push(&block); // straddles the ring boundary
        assert!(assembler.pull(&consumer));
        for (i, s) in assembler.frame().iter().enumerate() {
            assert_eq!(*s, Sample::Float32(i as f32));
        }
    }

    #[test]
    fn samples_to_f32_converts_int16_and_float32() {
        let mut out = Vec::new();
        samples_to_f32(&[Sample::Int16(16384), Sample::Float32(0.5)], &mut out);
        assert!((out[0] - 0.5).abs() < 1e-4);
        assert_eq!(out[1], 0.5);
    }
}
