//! Relay engine for `mode = 'encode'` sessions (§6, INIT payload): the ring
//! already carries Int16 samples pre-framed by the producer, so this
//! "encoder" does no encoding at all — it reconstructs the exact Int16
//! bytes from the assembler's Float32 view and relays them unchanged.
//!
//! The `Sample::Int16 -> f32` conversion in [`crate::frame_assembler`]
//! divides by a power of two (`32768.0`), which f32's 24-bit mantissa
//! represents exactly for every in-range `i16`; reversing it with
//! `(x * 32768.0).round() as i16` recovers the original bytes losslessly,
//! so no TPDF dither is applied here (unlike [`super::pcm::PcmEngine`],
//! which quantizes genuine audio and needs it).

use crate::codec::{CodecEngine, EncodedOutput};
use crate::error::PipelineResult;
use crate::policy::LatencyMode;

pub struct RelayEngine {
    frame_size_samples: usize,
    channels: u16,
    buffer: Vec<i16>,
    fill: usize,
    timestamp_frames: u64,
    byte_scratch: Vec<u8>,
}

impl RelayEngine {
    pub fn new(per_channel_frame_size: usize, channels: u16) -> Self {
        let frame_size_samples = per_channel_frame_size * channels as usize;
        Self {
            frame_size_samples,
            channels,
            buffer: vec![0i16; frame_size_samples],
            fill: 0,
            timestamp_frames: 0,
            byte_scratch: vec![0u8; frame_size_samples * 2],
        }
    }

    fn bytes_for(&mut self, len: usize) -> &[u8] {
        let needed = len * 2;
        if self.byte_scratch.len() < needed {
            self.byte_scratch.resize(needed, 0);
        }
        self.byte_scratch[..needed].copy_from_slice(bytemuck::cast_slice(&self.buffer[..len]));
        &self.byte_scratch[..needed]
    }
}

impl CodecEngine for RelayEngine {
    fn encode(&mut self, samples: &[f32]) -> EncodedOutput {
        let mut out: Option<Vec<u8>> = None;
        for &sample in samples {
            self.buffer[self.fill] = (sample * 32768.0).round() as i16;
            self.fill += 1;
            if self.fill == self.frame_size_samples {
                let frame = self.bytes_for(self.frame_size_samples);
                match &mut out {
                    Some(acc) => acc.extend_from_slice(frame),
                    None => out = Some(frame.to_vec()),
                }
                self.timestamp_frames += (self.frame_size_samples / self.channels.max(1) as usize) as u64;
                self.fill = 0;
            }
        }
        out
    }

    fn flush(&mut self) -> EncodedOutput {
        if self.fill == 0 {
            return None;
        }
        let partial_per_channel = self.fill / self.channels.max(1) as usize;
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
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_int16_samples_losslessly() {
        let mut engine = RelayEngine::new(4, 1);
        let original = [1i16, -1, 32767, -32768];
        let samples: Vec<f32> = original.iter().map(|&v| v as f32 / 32768.0).collect();
        let output = engine.encode(&samples).expect("full frame produced output");
        let recovered: Vec<i16> = output
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(recovered, original);
    }

    #[test]
    fn partial_frame_waits_for_flush() {
        let mut engine = RelayEngine::new(4, 1);
        assert!(engine.encode(&[0.0, 0.0]).is_none());
        assert!(engine.flush().is_some());
    }

    #[test]
    fn advances_timestamp_by_per_channel_frame_count() {
        let mut engine = RelayEngine::new(4, 2);
        let samples = vec![0.0f32; 8];
        engine.encode(&samples);
        assert_eq!(engine.timestamp_frames, 4);
    }
}
