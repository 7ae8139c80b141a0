//! Noise table generation
//!
//! Noise voices read a half-second buffer of white noise through the same
//! [`TableSource`](super::TableSource) as everything else, looped.

/// Fill a half-second table with uniform white noise in [-1, 1).
pub fn white_noise(sample_rate: u32) -> Vec<f32> {
    let len = (sample_rate / 2).max(1) as usize;
    (0..len).map(|_| fastrand::f32() * 2.0 - 1.0).collect()
}

/// One cycle of a sine wave, the default voice wavetable.
pub fn sine_table(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (std::f64::consts::TAU * i as f64 / len as f64).sin() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_stays_in_range() {
        for v in white_noise(8000) {
            assert!(v >= -1.0 && v <= 1.0);
        }
    }

    #[test]
    fn sine_table_cycles() {
        let t = sine_table(8192);
        assert_eq!(t.len(), 8192);
        assert!(t[0].abs() < 1e-6);
        assert!((t[2048] - 1.0).abs() < 1e-3);
        assert!((t[6144] + 1.0).abs() < 1e-3);
    }
}
