//! FLAC codec: native frames with an opaque, one-shot header blob (§4.D,
//! "FLAC"). Adapted from the source crate's `FlacTranscoder`
//! (`apps/desktop/src-tauri/src/stream/transcoder.rs`), generalized from a
//! one-shot `transcode()` call into the stateful [`CodecEngine`] lifecycle
//! so it can participate in `advanceTimestamp`/`reconfigure` like the other
//! codecs.

use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::config;
use flacenc::error::Verify;
use flacenc::source::MemSource;

use crate::codec::{CodecEngine, EncodedOutput};
use crate::error::PipelineResult;
use crate::policy::LatencyMode;

const BITS_PER_SAMPLE: usize = 16;

pub struct FlacEngine {
    config: flacenc::error::Verified<config::Encoder>,
    sample_rate: u32,
    channels: u16,
    block_size: usize,
    pcm: PcmAccumulator,
    header_sent: bool,
    timestamp_frames: u64,
    fault: Option<String>,
}

/// Accumulates Int16 samples up to `block_size` per-channel frames before
/// handing a full block to `flacenc`.
struct PcmAccumulator {
    channels: usize,
    block_size: usize,
    buffer: Vec<i16>,
}

impl PcmAccumulator {
    fn new(channels: usize, block_size: usize) -> Self {
        Self {
            channels,
            block_size,
            buffer: Vec::with_capacity(block_size * channels),
        }
    }

    fn push(&mut self, samples: &[i16]) {
        self.buffer.extend_from_slice(samples);
    }

    fn take_full_block(&mut self) -> Option<Vec<i16>> {
        let needed = self.block_size * self.channels;
        if self.buffer.len() < needed {
            return None;
        }
        let rest = self.buffer.split_off(needed);
        let block = std::mem::replace(&mut self.buffer, rest);
        Some(block)
    }

    fn take_remainder(&mut self) -> Option<Vec<i16>> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }
}

impl FlacEngine {
    pub fn new(sample_rate: u32, channels: u16, block_size: usize) -> Self {
        let config = config::Encoder::default()
            .into_verified()
            .expect("default FLAC encoder config is always valid");

        Self {
            config,
            sample_rate,
            channels,
            block_size,
            pcm: PcmAccumulator::new(channels as usize, block_size),
            header_sent: false,
            timestamp_frames: 0,
            fault: None,
        }
    }

    fn encode_block(&mut self, block: &[i16], per_channel_len: usize) -> Vec<u8> {
        let samples_i32: Vec<i32> = block.iter().map(|&s| i32::from(s)).collect();
        let source = MemSource::from_samples(
            &samples_i32,
            self.channels as usize,
            BITS_PER_SAMPLE,
            self.sample_rate as usize,
        );

        let stream =
            match flacenc::encode_with_fixed_block_size(&self.config, source, per_channel_len) {
                Ok(stream) => stream,
                Err(err) => {
                    self.fault = Some(format!("flac encode failed: {err:?}"));
                    return Vec::new();
                }
            };

        let mut sink = ByteSink::new();
        if !self.header_sent {
            if stream.write(&mut sink).is_err() {
                self.fault = Some("flac stream header write failed".to_string());
                return Vec::new();
            }
            self.header_sent = true;
        } else {
            for i in 0..stream.frame_count() {
                let Ok(frame) = stream.frame(i) else {
                    self.fault = Some("flac frame index out of range".to_string());
                    return Vec::new();
                };
                if frame.write(&mut sink).is_err() {
                    self.fault = Some("flac frame write failed".to_string());
                    return Vec::new();
                }
            }
        }

        self.timestamp_frames += per_channel_len as u64;
        sink.into_inner()
    }
}

impl CodecEngine for FlacEngine {
    fn encode(&mut self, samples: &[f32]) -> EncodedOutput {
        // Samples arrive as Float32 in [-1,1] regardless of ring element
        // type (the assembler always converts via samples_to_f32), so
        // quantize here the same way the PCM engine does before handing
        // blocks to flacenc, which only accepts integer PCM.
        let quantized: Vec<i16> = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        self.pcm.push(&quantized);

        let mut out: Option<Vec<u8>> = None;
        while let Some(block) = self.pcm.take_full_block() {
            let bytes = self.encode_block(&block, self.block_size);
            match &mut out {
                Some(acc) => acc.extend_from_slice(&bytes),
                None => out = Some(bytes),
            }
        }
        out
    }

    fn flush(&mut self) -> EncodedOutput {
        let remainder = self.pcm.take_remainder()?;
        let per_channel_len = remainder.len() / self.channels as usize;
        Some(self.encode_block(&remainder, per_channel_len))
    }

    fn advance_timestamp(&mut self, frames: u64) {
        self.timestamp_frames += frames;
    }

    fn close(&mut self) {
        self.pcm.buffer.clear();
    }

    fn encode_queue_size(&self) -> usize {
        if self.pcm.buffer.is_empty() {
            0
        } else {
            1
        }
    }

    fn reconfigure(&mut self, _latency_mode: LatencyMode) -> PipelineResult<EncodedOutput> {
        let leftover = self.flush();
        self.header_sent = false;
        Ok(leftover)
    }

    fn take_fault(&mut self) -> Option<String> {
        self.fault.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_encodes_with_stream_header_first() {
        let mut engine = FlacEngine::new(48000, 2, 16);
        let samples = vec![0.0f32; 16 * 2];
        let output = engine.encode(&samples).expect("full block produced output");
        assert!(output.starts_with(b"fLaC"));
    }

    #[test]
    fn second_block_has_no_header() {
        let mut engine = FlacEngine::new(48000, 2, 16);
        let samples = vec![0.0f32; 16 * 2];
        let first = engine.encode(&samples).unwrap();
        let second = engine.encode(&samples).unwrap();
        assert!(first.starts_with(b"fLaC"));
        assert!(!second.starts_with(b"fLaC"));
    }

    #[test]
    fn partial_block_flushes_on_demand() {
        let mut engine = FlacEngine::new(48000, 2, 16);
        let samples = vec![0.0f32; 8 * 2];
        assert!(engine.encode(&samples).is_none());
        assert!(engine.flush().is_some());
    }
}
