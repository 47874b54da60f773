//! ADTS header framer for AAC-LC / HE-AAC / HE-AAC v2 (§4.D).
//!
//! Independent of whichever engine produced the underlying AAC payload
//! bytes (see `aac.rs`); this module is tested purely against the byte
//! layout defined by §4.D / §8 scenario 1.

use crate::codec::Codec;

/// ISO/IEC 13818-7 sample-rate table index lookup.
fn sample_rate_index(sample_rate: u32) -> u8 {
    match sample_rate {
        96000 => 0,
        88200 => 1,
        64000 => 2,
        48000 => 3,
        44100 => 4,
        32000 => 5,
        24000 => 6,
        22050 => 7,
        16000 => 8,
        12000 => 9,
        11025 => 10,
        8000 => 11,
        7350 => 12,
        _ => 3, // 48 kHz fallback; validated earlier at config time.
    }
}

fn profile_bits(codec: Codec) -> u8 {
    match codec {
        Codec::AacLc => 1,
        Codec::HeAac | Codec::HeAacV2 => 4,
        other => panic!("adts framer invoked for non-AAC codec {other:?}"),
    }
}

/// Precomputed ADTS header prefix (bytes 0-2) plus the fields needed to
/// rewrite bytes 3-6 per frame.
pub struct AdtsFramer {
    byte2: u8,
    channels: u16,
    scratch: Vec<u8>,
}

impl AdtsFramer {
    pub fn new(codec: Codec, sample_rate: u32, channels: u16) -> Self {
        let sr_index = sample_rate_index(sample_rate);
        let profile = profile_bits(codec);
        let byte2 = ((profile - 1) << 6) | (sr_index << 2) | ((channels >> 2) as u8 & 1);
        Self {
            byte2,
            channels,
            scratch: Vec::new(),
        }
    }

    /// Wraps `payload` in a 7-byte ADTS header (§4.D) using a reused scratch
    /// buffer (§9 zero-allocation hot path); callers must copy before the
    /// next call overwrites it.
    pub fn frame(&mut self, payload: &[u8]) -> &[u8] {
        let frame_len = payload.len() as u32 + 7;
        self.scratch.clear();
        self.scratch.reserve(payload.len() + 7);
        self.scratch.push(0xFF);
        self.scratch.push(0xF1);
        self.scratch.push(self.byte2);
        self.scratch
            .push(((self.channels as u32 & 3) << 6) as u8 | ((frame_len >> 11) & 3) as u8);
        self.scratch.push(((frame_len >> 3) & 0xFF) as u8);
        self.scratch.push((((frame_len & 7) << 5) | 0x1F) as u8);
        self.scratch.push(0xFC);
        self.scratch.extend_from_slice(payload);
        &self.scratch
    }
}
