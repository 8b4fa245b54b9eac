//! Small shared DSP helpers used by the voice bank and renderer.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

pub const TAU: f32 = std::f32::consts::TAU;

/// Equal-power stereo pan. `pan` in [-1, 1], 0 centered.
pub fn pan2(signal: f32, pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos() * signal, angle.sin() * signal)
}

/// Equal-power crossfade gains for a fade ratio in [0, 1].
/// Returns (outgoing, incoming).
pub fn equal_power_gains(ratio: f32) -> (f32, f32) {
    let theta = ratio.clamp(0.0, 1.0) * FRAC_PI_2;
    (theta.cos(), theta.sin())
}

/// Raised-cosine gate for isochronic pulsing: 0 at phase 0, 1 at pi,
/// back to 0 at 2*pi. Smooth enough to avoid gating clicks.
pub fn raised_cosine(phase: f32) -> f32 {
    0.5 * (1.0 - phase.cos())
}

/// Saturating limiter; unity slope near zero, asymptotic to +/-1.
pub fn soft_limit(x: f32) -> f32 {
    x.tanh()
}

pub fn cents_to_ratio(cents: f32) -> f32 {
    (cents / 1200.0).exp2()
}

pub fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}
