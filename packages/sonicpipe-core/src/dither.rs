//! Shared TPDF (triangular PDF) dither quantization, used by both the PCM
//! codec engine and the producer's Int16 ring path (§4.B step 5, §4.D
//! "PCM (Int16)") so the two call sites can't drift apart.

use rand::rngs::StdRng;
use rand::Rng;

/// Quantizes one Float32 sample in `[-1, 1]` to Int16 with triangular-PDF
/// dither: scale by 32767, add the sum of two independent uniform
/// `[-0.5, 0.5]` draws, round, clamp.
#[inline]
pub fn tpdf_quantize_i16(rng: &mut StdRng, sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    let dither: f32 = rng.gen_range(-0.5..=0.5) + rng.gen_range(-0.5..=0.5);
    let scaled = clamped * 32767.0 + dither;
    scaled.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn silence_stays_near_zero() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let q = tpdf_quantize_i16(&mut rng, 0.0);
            assert!(q.abs() <= 1, "dithered silence should stay within +-1 LSB, got {q}");
        }
    }

    #[test]
    fn clamps_out_of_range() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(tpdf_quantize_i16(&mut rng, 2.0) >= 32000);
        assert!(tpdf_quantize_i16(&mut rng, -2.0) <= -32000);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);
        let seq_a: Vec<i16> = (0..16).map(|_| tpdf_quantize_i16(&mut a, 0.3)).collect();
        let seq_b: Vec<i16> = (0..16).map(|_| tpdf_quantize_i16(&mut b, 0.3)).collect();
        assert_eq!(seq_a, seq_b);
    }
}
