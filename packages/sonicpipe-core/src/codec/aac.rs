//! AAC-LC / HE-AAC / HE-AAC v2 bitstream engine, wrapping `fdk-aac`.
//! Produces raw AAC payload bytes; [`super::adts::AdtsFramer`] wraps them
//! independently (§4.D: "The underlying AAC bitstream itself... is
//! produced by a real encoder engine... the framer above is independent of
//! that engine").

use fdk_aac::enc::{ChannelMode, Encoder as FdkEncoder, EncoderParams, Transport};

use crate::codec::adts::AdtsFramer;
use crate::codec::{Codec, CodecEngine, EncodedOutput};
use crate::error::{PipelineError, PipelineResult};
use crate::policy::LatencyMode;

const PER_CHANNEL_FRAME_SIZE: usize = 1024;

pub struct AacEngine {
    codec: Codec,
    sample_rate: u32,
    channels: u16,
    bitrate: u32,
    encoder: FdkEncoder,
    framer: AdtsFramer,
    pcm_buffer: Vec<i16>,
    timestamp_frames: u64,
    fault: Option<String>,
}

impl AacEngine {
    pub fn new(codec: Codec, sample_rate: u32, channels: u16, bitrate: u32) -> PipelineResult<Self> {
        let channel_mode = if channels == 1 {
            ChannelMode::Mono
        } else {
            ChannelMode::Stereo
        };

        let params = EncoderParams {
            bit_rate: fdk_aac::enc::BitRate::Cbr(bitrate),
            sample_rate,
            transport: Transport::Raw,
            channels: channel_mode,
        };

        let encoder = FdkEncoder::new(params)
            .map_err(|err| PipelineError::EncoderFault(format!("fdk-aac init failed: {err:?}")))?;

        Ok(Self {
            codec,
            sample_rate,
            channels,
            bitrate,
            encoder,
            framer: AdtsFramer::new(codec, sample_rate, channels),
            pcm_buffer: Vec::with_capacity(PER_CHANNEL_FRAME_SIZE * channels as usize),
            timestamp_frames: 0,
            fault: None,
        })
    }

    fn encode_frame(&mut self, pcm: &[i16]) -> Option<Vec<u8>> {
        let mut output_buf = vec![0u8; 4096];
        match self.encoder.encode(pcm, &mut output_buf) {
            Ok(info) => {
                self.timestamp_frames += PER_CHANNEL_FRAME_SIZE as u64;
                // `Transport::Raw` asks `fdk-aac` for the bare bitstream, so
                // the only ADTS header on the wire is the one our own
                // framer writes (§4.D: "the framer above is independent of
                // that engine").
                let payload = &output_buf[..info.output_size];
                Some(self.framer.frame(payload).to_vec())
            }
            Err(err) => {
                self.fault = Some(format!("fdk-aac encode failed: {err:?}"));
                None
            }
        }
    }
}

impl CodecEngine for AacEngine {
    fn encode(&mut self, samples: &[f32]) -> EncodedOutput {
        let quantized: Vec<i16> = samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16)
            .collect();
        self.pcm_buffer.extend_from_slice(&quantized);

        let frame_samples = PER_CHANNEL_FRAME_SIZE * self.channels as usize;
        let mut out: Option<Vec<u8>> = None;
        while self.pcm_buffer.len() >= frame_samples {
            let frame: Vec<i16> = self.pcm_buffer.drain(..frame_samples).collect();
            if let Some(bytes) = self.encode_frame(&frame) {
                match &mut out {
                    Some(acc) => acc.extend_from_slice(&bytes),
                    None => out = Some(bytes),
                }
            }
        }
        out
    }

    fn flush(&mut self) -> EncodedOutput {
        if self.pcm_buffer.is_empty() {
            return None;
        }
        let remainder = std::mem::take(&mut self.pcm_buffer);
        self.encode_frame(&remainder)
    }

    fn advance_timestamp(&mut self, frames: u64) {
        self.timestamp_frames += frames;
    }

    fn close(&mut self) {
        self.pcm_buffer.clear();
    }

    fn encode_queue_size(&self) -> usize {
        self.pcm_buffer.len() / (PER_CHANNEL_FRAME_SIZE * self.channels as usize).max(1)
    }

    fn reconfigure(&mut self, _latency_mode: LatencyMode) -> PipelineResult<EncodedOutput> {
        let leftover = self.flush();
        let timestamp_frames = self.timestamp_frames;
        *self = AacEngine::new(self.codec, self.sample_rate, self.channels, self.bitrate)?;
        self.timestamp_frames = timestamp_frames;
        Ok(leftover)
    }

    fn take_fault(&mut self) -> Option<String> {
        self.fault.take()
    }
}
