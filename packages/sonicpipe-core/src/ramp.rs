//! Linear-fade utilities used to mask discontinuities around producer
//! stalls (§4.F: underflow ramp-out, resume ramp-in). Adapted from the
//! source crate's crossfade helpers, generalized from "WAV keepalive" duty
//! to the ring's underflow/resume boundary.
//!
//! Operates on interleaved Float32 frames *before* they reach a codec
//! engine, since the ramp must apply uniformly across all four codec
//! variants rather than just the PCM path (the source's equivalent
//! crossfade helper only ever saw 16-bit PCM, because that was its only
//! caller; here every [`crate::codec::CodecEngine::encode`] takes Float32,
//! so the ramp lives upstream of quantization).

/// Per-channel frame span of the ramp (§4.F, §9: "3ms ramp"), given as an
/// interleaved sample count and capped to one frame's worth of samples
/// (§4.F: "Ramp length = min(round(sampleRate x 3ms / 1000) x channels,
/// frameSizeSamples)").
#[inline]
pub fn ramp_sample_count(
    sample_rate: u32,
    channels: u16,
    ramp_duration_ms: u32,
    frame_size_samples: usize,
) -> usize {
    let per_channel = (sample_rate as u64 * ramp_duration_ms as u64) / 1000;
    let interleaved = per_channel as usize * channels as usize;
    interleaved.min(frame_size_samples)
}

/// Applies a linear fade-in (0 -> 1 across the ramp) to the start of an
/// interleaved Float32 frame, in place (§4.F step 6a, ramp-in).
pub fn apply_fade_in(frame: &mut [f32], channels: u16, ramp_samples: usize) {
    let channels = channels.max(1) as usize;
    if ramp_samples < channels {
        return;
    }
    let ramp_frames = ramp_samples / channels;
    let available_frames = frame.len() / channels;
    let effective = ramp_frames.min(available_frames);
    if effective == 0 {
        return;
    }

    let divisor = (effective - 1).max(1) as f32;
    for i in 0..effective {
        let t = i as f32 / divisor;
        for ch in 0..channels {
            frame[i * channels + ch] *= t;
        }
    }
}

/// Captures the last per-channel sample values from the valid prefix of a
/// partial frame (`frame[..valid_len]`), used to seed the ramp-out fade
/// from wherever the signal actually was (§4.F: "capture the last
/// per-channel sample from the partial frame"). Returns `None` if fewer
/// than one complete per-channel sample is available.
pub fn last_channel_values(frame: &[f32], channels: u16, valid_len: usize) -> Option<Vec<f32>> {
    let channels = channels.max(1) as usize;
    if valid_len < channels {
        return None;
    }
    let last_frame_start = (valid_len / channels - 1) * channels;
    Some(frame[last_frame_start..last_frame_start + channels].to_vec())
}

/// Fills `frame[start_offset..]` with a linear fade from `from` (one value
/// per channel) down to zero over `ramp_samples`, then silence for the
/// remainder (§4.F, underflow ramp).
pub fn fill_fade_out(frame: &mut [f32], start_offset: usize, from: &[f32], channels: u16, ramp_samples: usize) {
    let channels = channels.max(1) as usize;
    debug_assert_eq!(from.len(), channels);
    debug_assert_eq!(start_offset % channels, 0);

    let remaining_frames = (frame.len() - start_offset) / channels;
    let ramp_frames = (ramp_samples / channels).min(remaining_frames);

    if ramp_frames == 0 {
        frame[start_offset..].fill(0.0);
        return;
    }

    let divisor = (ramp_frames - 1).max(1) as f32;
    for i in 0..ramp_frames {
        let t = 1.0 - (i as f32 / divisor);
        for ch in 0..channels {
            frame[start_offset + i * channels + ch] = from[ch] * t;
        }
    }
    let silence_start = start_offset + ramp_frames * channels;
    frame[silence_start..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_sample_count_caps_to_three_ms_at_48khz_stereo() {
        // 48000 * 3 / 1000 = 144 per-channel frames * 2 channels = 288.
        assert_eq!(ramp_sample_count(48000, 2, 3, 4096), 288);
    }

    #[test]
    fn ramp_sample_count_caps_to_frame_size() {
        assert_eq!(ramp_sample_count(48000, 2, 3, 100), 100);
    }

    #[test]
    fn apply_fade_in_reaches_endpoints() {
        let mut frame = vec![1.0f32; 16]; // 8 stereo frames, full scale
        apply_fade_in(&mut frame, 2, 8); // 4 stereo frames of ramp
        assert_eq!(frame[0], 0.0, "fade-in must start at zero");
        assert_eq!(frame[1], 0.0);
        // last ramp frame (index 3) should be near full scale.
        assert!((frame[6] - 1.0).abs() < 1e-6);
        assert!((frame[7] - 1.0).abs() < 1e-6);
        // untouched tail stays full scale.
        assert_eq!(frame[8], 1.0);
    }

    #[test]
    fn last_channel_values_extracts_stereo_pair() {
        let frame = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let last = last_channel_values(&frame, 2, 6).unwrap();
        assert_eq!(last, vec![0.5, 0.6]);
    }

    #[test]
    fn last_channel_values_none_when_too_short() {
        let frame = [0.1];
        assert_eq!(last_channel_values(&frame, 2, 1), None);
    }

    #[test]
    fn fill_fade_out_ramps_to_zero_then_silence() {
        let mut frame = vec![0.0f32; 16]; // 8 stereo frames
        let from = vec![1.0, -0.5];
        fill_fade_out(&mut frame, 4, &from, 2, 8); // ramp over 4 stereo frames starting at offset 4
        assert_eq!(frame[4], 1.0, "ramp-out must start at full amplitude");
        assert_eq!(frame[5], -0.5);
        // index 6 (second ramp frame, t = 1 - 1/3)
        assert!((frame[6] - (1.0 * 2.0 / 3.0)).abs() < 1e-6);
        // last ramp frame reaches (near) zero.
        assert!(frame[10].abs() < 1e-6);
        assert!(frame[11].abs() < 1e-6);
        // remainder stays silent.
        assert_eq!(frame[12], 0.0);
        assert_eq!(frame[15], 0.0);
    }

    #[test]
    fn fill_fade_out_handles_ramp_longer_than_remaining() {
        let mut frame = vec![0.0f32; 8]; // 4 stereo frames
        let from = vec![1.0, 1.0];
        fill_fade_out(&mut frame, 4, &from, 2, 100); // ramp requests more than remains
        assert_eq!(frame[4], 1.0);
        assert!(frame[6].abs() < 1e-6, "should still reach zero by the end");
    }
}
