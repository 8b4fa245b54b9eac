use crate::dsp::cents_to_ratio;
use crate::models::NoiseColor;
use crate::timeline::PhaseProgram;

/// Live manual adjustments layered over a phase's nominal parameters.
///
/// Values outside the documented bounds are clamped rather than rejected so
/// an in-flight session is never interrupted by a bad slider value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualOverrides {
    /// Carrier pitch offset in cents, clamped to +/-1200 (one octave).
    pub pitch_cents: f32,
    /// Beat frequency offset as a percentage of the base beat, clamped to
    /// +/-100.
    pub beat_offset_percent: f32,
    /// Multiplier on the phase's noise mix, clamped to [0, 4].
    pub noise_mix_multiplier: f32,
}

impl Default for ManualOverrides {
    fn default() -> Self {
        Self {
            pitch_cents: 0.0,
            beat_offset_percent: 0.0,
            noise_mix_multiplier: 1.0,
        }
    }
}

impl ManualOverrides {
    pub fn new(pitch_cents: f32, beat_offset_percent: f32, noise_mix_multiplier: f32) -> Self {
        Self {
            pitch_cents,
            beat_offset_percent,
            noise_mix_multiplier,
        }
        .clamped()
    }

    pub fn clamped(self) -> Self {
        Self {
            pitch_cents: self.pitch_cents.clamp(-1200.0, 1200.0),
            beat_offset_percent: self.beat_offset_percent.clamp(-100.0, 100.0),
            noise_mix_multiplier: self.noise_mix_multiplier.clamp(0.0, 4.0),
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

/// Parameter set resolved once per render cycle, so every oscillator in a
/// block observes the same values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub carrier: f32,
    pub beat: f32,
    pub noise: Option<NoiseColor>,
    pub noise_mix: f32,
    pub overlay_mix: f32,
}

/// Interpolate a phase at a local time fraction and fold in the overrides.
pub fn resolve(phase: &PhaseProgram, t_frac: f64, overrides: ManualOverrides) -> ResolvedParams {
    let overrides = overrides.clamped();
    let carrier = phase.carrier.value_at(t_frac) as f32 * cents_to_ratio(overrides.pitch_cents);
    let beat =
        (phase.beat.value_at(t_frac) as f32 * (1.0 + overrides.beat_offset_percent / 100.0)).max(0.0);
    let noise_mix = (phase.noise_mix as f32 * overrides.noise_mix_multiplier).clamp(0.0, 1.0);
    ResolvedParams {
        carrier,
        beat,
        noise: phase.noise,
        noise_mix,
        overlay_mix: phase.overlay_mix as f32,
    }
}
