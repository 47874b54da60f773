//! PCM (Int16) codec: TPDF-dithered quantization with a zero-allocation
//! hot path (§4.D, "PCM (Int16)").

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::codec::{CodecEngine, EncodedOutput};
use crate::dither::tpdf_quantize_i16;
use crate::error::PipelineResult;
use crate::policy::LatencyMode;

/// Quantizes Float32 samples to Int16 with triangular-PDF dither and packs
/// full frames into a reused buffer (§4.D: "Returns a byte view of the
/// pre-allocated Int16 buffer for full-size frames... callers must copy
/// before retaining the bytes").
pub struct PcmEngine {
    per_channel_frame_size: usize,
    channels: u16,
    frame_size_samples: usize,
    buffer: Vec<i16>,
    fill: usize,
    rng: StdRng,
    timestamp_frames: u64,
    fault: Option<String>,
    byte_scratch: Vec<u8>,
}

impl PcmEngine {
    /// `seed` fixes the dither RNG for deterministic tests (§8 scenario 3);
    /// production callers should seed from an entropy source.
    pub fn new(per_channel_frame_size: usize, channels: u16, seed: u64) -> Self {
        let frame_size_samples = per_channel_frame_size * channels as usize;
        Self {
            per_channel_frame_size,
            channels,
            frame_size_samples,
            buffer: vec![0i16; frame_size_samples],
            fill: 0,
            rng: StdRng::seed_from_u64(seed),
            timestamp_frames: 0,
            fault: None,
            byte_scratch: vec![0u8; frame_size_samples * 2],
        }
    }

    #[inline]
    fn quantize_one(&mut self, sample: f32) -> i16 {
        tpdf_quantize_i16(&mut self.rng, sample)
    }

    /// Reinterprets `self.buffer[..len]` as bytes into the reused scratch
    /// buffer via a zero-copy cast and hands back a slice of it; callers
    /// must copy before the next call overwrites it (§4.D, §9 zero-allocation
    /// hot path).
    fn bytes_for(&mut self, len: usize) -> &[u8] {
        let needed = len * 2;
        if self.byte_scratch.len() < needed {
            self.byte_scratch.resize(needed, 0);
        }
        self.byte_scratch[..needed].copy_from_slice(bytemuck::cast_slice(&self.buffer[..len]));
        &self.byte_scratch[..needed]
    }
}

impl CodecEngine for PcmEngine {
    fn encode(&mut self, samples: &[f32]) -> EncodedOutput {
        let mut out: Option<Vec<u8>> = None;
        for &sample in samples {
            self.buffer[self.fill] = self.quantize_one(sample);
            self.fill += 1;
            if self.fill == self.frame_size_samples {
                let frame = self.bytes_for(self.frame_size_samples);
                match &mut out {
                    Some(acc) => acc.extend_from_slice(frame),
                    None => out = Some(frame.to_vec()),
                }
                self.timestamp_frames += self.per_channel_frame_size as u64;
                self.fill = 0;
            }
        }
        out
    }

    fn flush(&mut self) -> EncodedOutput {
        if self.fill == 0 {
            return None;
        }
        let partial_per_channel = self.fill / self.channels as usize;
        self.timestamp_frames += partial_per_channel as u64;
        let fill = self.fill;
        let out = self.bytes_for(fill).to_vec();
        self.fill = 0;
        Some(out)
    }

    fn advance_timestamp(&mut self, frames: u64) {
        self.timestamp_frames += frames;
    }

    fn close(&mut self) {
        self.fill = 0;
    }

    fn encode_queue_size(&self) -> usize {
        // The PCM path has no internal async queue; depth is always zero
        // or one partial frame.
        if self.fill == 0 {
            0
        } else {
            1
        }
    }

    fn reconfigure(&mut self, _latency_mode: LatencyMode) -> PipelineResult<EncodedOutput> {
        let leftover = self.flush();
        self.fill = 0;
        Ok(leftover)
    }

    fn take_fault(&mut self) -> Option<String> {
        self.fault.take()
    }
}
