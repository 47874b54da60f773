//! Vorbis bitstream engine, wrapping `vorbis_rs`. Produces raw encoded
//! audio packets plus a one-time setup-header blob; [`super::ogg::OggFramer`]
//! frames them into Ogg pages independently (§4.D: "Ogg Vorbis (Ogg page
//! framer)").
//!
//! `vorbis_rs` is not part of the corpus this workspace was grounded on
//! (see DESIGN.md); it is the closest real, maintained crates.io binding to
//! libvorbis and is used here in place of a fabricated dependency.

use std::io::Write;

use vorbis_rs::{VorbisBitrateManagementStrategy, VorbisEncoderBuilder};

use crate::codec::ogg::{demux_packets, OggFramer, VorbisHeaders};
use crate::codec::{CodecEngine, EncodedOutput};
use crate::error::PipelineResult;
use crate::policy::LatencyMode;

const PER_CHANNEL_FRAME_SIZE: usize = 2048;

/// Sink the underlying encoder writes its own Ogg container into; we only
/// read the raw bytes back out and re-frame them ourselves so the framer
/// can be tested against an exact, independent byte layout.
#[derive(Default)]
struct CapturingSink {
    buf: Vec<u8>,
}

impl Write for CapturingSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct VorbisEngine {
    sample_rate: u32,
    channels: u16,
    bitrate: u32,
    framer: OggFramer,
    headers_emitted: bool,
    pcm_buffer: Vec<f32>,
    timestamp_frames: u64,
    fault: Option<String>,
}

impl VorbisEngine {
    pub fn new(serial_number: u32, sample_rate: u32, channels: u16, bitrate: u32) -> Self {
        Self {
            sample_rate,
            channels,
            bitrate,
            framer: OggFramer::new(serial_number, sample_rate),
            headers_emitted: false,
            pcm_buffer: Vec::with_capacity(PER_CHANNEL_FRAME_SIZE * channels as usize),
            timestamp_frames: 0,
            fault: None,
        }
    }

    /// Runs one block through `vorbis_rs` as a self-contained one-shot Ogg
    /// stream and demuxes the result back into raw packets: the 3 setup
    /// packets it always re-derives, followed by the audio packet(s) for
    /// this block.
    ///
    /// `vorbis_rs` only exposes a full `Write`-sink, page-muxing API (no
    /// bare-packet output), and `VorbisEncoderBuilder`/`VorbisEncoder` tie
    /// their lifetime to that sink by reference — holding both as owned
    /// sibling fields across calls would need a self-referential struct.
    /// Re-building the encoder per block sidesteps that without unsafe
    /// code, at the cost of losing Vorbis's usual cross-block lapped
    /// context at each frame boundary; see DESIGN.md.
    fn encode_block(&mut self, block: &[f32]) -> Vec<Vec<u8>> {
        let mut sink = CapturingSink::default();
        let planar: Vec<Vec<f32>> = deinterleave(block, self.channels as usize);

        let build_result = VorbisEncoderBuilder::new(
            std::num::NonZeroU32::new(self.sample_rate).unwrap(),
            std::num::NonZeroU8::new(self.channels as u8).unwrap(),
            &mut sink,
        )
        .and_then(|mut builder| {
            builder.bitrate_management_strategy(VorbisBitrateManagementStrategy::Abr {
                average_bitrate: self.bitrate,
            });
            let mut encoder = builder.build()?;
            encoder.encode_audio_block(&planar)?;
            encoder.finish()?;
            Ok(())
        });

        if let Err(err) = build_result {
            self.fault = Some(format!("vorbis encode failed: {err}"));
            return Vec::new();
        }

        self.timestamp_frames += (block.len() / self.channels.max(1) as usize) as u64;
        demux_packets(&sink.buf)
    }

    /// Splits `packets` into this block's leading 3 setup packets (emitted
    /// as our own BOS/comment+setup pages only the first time this session
    /// sees them) and its trailing audio packet(s), framing both through
    /// this engine's own [`OggFramer`] rather than forwarding `vorbis_rs`'s
    /// own page headers and CRCs.
    fn frame_packets(&mut self, mut packets: Vec<Vec<u8>>, sample_count: usize) -> EncodedOutput {
        if packets.len() < 3 {
            self.fault = Some(format!(
                "vorbis encoder returned {} packets, expected >= 3 setup packets",
                packets.len()
            ));
            return None;
        }
        let identification = packets.remove(0);
        let comment = packets.remove(0);
        let setup = packets.remove(0);

        let mut chunk = Vec::new();
        if !self.headers_emitted {
            let headers = VorbisHeaders { identification, comment, setup };
            for page in self.framer.emit_headers(&headers) {
                chunk.extend_from_slice(&page.bytes);
            }
            self.headers_emitted = true;
        }

        if !packets.is_empty() {
            let channels = self.channels.max(1) as usize;
            let per_channel_samples = sample_count / channels;
            let total_micros = (per_channel_samples as u64 * 1_000_000) / self.sample_rate.max(1) as u64;
            let per_packet_micros = total_micros / packets.len() as u64;

            for packet in &packets {
                let page = self.framer.emit_audio_packet(packet, per_packet_micros);
                chunk.extend_from_slice(&page.bytes);
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels.max(1)); channels.max(1)];
    for (i, &sample) in samples.iter().enumerate() {
        planar[i % channels.max(1)].push(sample);
    }
    planar
}

impl CodecEngine for VorbisEngine {
    fn encode(&mut self, samples: &[f32]) -> EncodedOutput {
        self.pcm_buffer.extend_from_slice(samples);

        let frame_samples = PER_CHANNEL_FRAME_SIZE * self.channels as usize;
        let mut out: Option<Vec<u8>> = None;
        while self.pcm_buffer.len() >= frame_samples {
            let block: Vec<f32> = self.pcm_buffer.drain(..frame_samples).collect();
            let block_len = block.len();
            let packets = self.encode_block(&block);
            if packets.is_empty() {
                continue;
            }
            if let Some(chunk) = self.frame_packets(packets, block_len) {
                match &mut out {
                    Some(acc) => acc.extend_from_slice(&chunk),
                    None => out = Some(chunk),
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
        let remainder_len = remainder.len();
        let packets = self.encode_block(&remainder);
        if packets.is_empty() {
            return None;
        }
        self.frame_packets(packets, remainder_len)
    }

    fn advance_timestamp(&mut self, frames: u64) {
        self.timestamp_frames += frames;
    }

    fn close(&mut self) {
        self.pcm_buffer.clear();
    }

    fn encode_queue_size(&self) -> usize {
        let frame_samples = PER_CHANNEL_FRAME_SIZE * self.channels.max(1) as usize;
        self.pcm_buffer.len() / frame_samples.max(1)
    }

    fn reconfigure(&mut self, _latency_mode: LatencyMode) -> PipelineResult<EncodedOutput> {
        let leftover = self.flush();
        self.framer.reset();
        self.headers_emitted = false;
        Ok(leftover)
    }

    fn take_fault(&mut self) -> Option<String> {
        self.fault.take()
    }
}
