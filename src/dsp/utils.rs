/// Floor reported for silence by the dB read-outs.
pub const SILENCE_DB: f32 = -100.0;

/// Smallest linear gain that still maps above the silence floor.
pub const DB_EPS: f32 = 1e-5;

#[inline]
pub fn lin_to_db(x: f32) -> f32 {
    20.0 * x.max(DB_EPS).log10()
}

/// Linear gain to dB with silence (and anything non-finite) clamped to `SILENCE_DB`.
pub fn gain_to_db_floored(gain: f32) -> f32 {
    if !gain.is_finite() || gain <= DB_EPS {
        return SILENCE_DB;
    }
    lin_to_db(gain).max(SILENCE_DB)
}

/// Sum of squares over one channel slice.
#[inline]
pub fn sum_squares(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    s
}

/// Periodic Hann window of length `n`.
pub fn make_hann_window(n: usize) -> Vec<f32> {
    let mut w = vec![0.0f32; n];
    for (i, v) in w.iter_mut().enumerate() {
        let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
        *v = 0.5 - 0.5 * phase.cos();
    }
    w
}
