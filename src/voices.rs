use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dsp::{db_to_lin, pan2, raised_cosine, TAU};
use crate::models::SpatialMotion;
use crate::noise::ColoredNoise;
use crate::params::ResolvedParams;
use crate::timeline::PhaseProgram;

/// Gain applied to the primary carrier pair before mixing.
const CARRIER_GAIN: f32 = 0.5;
/// Fifth and octave partials, attenuated relative to the carrier.
const FIFTH_DB: f32 = -6.0;
const OCTAVE_DB: f32 = -9.0;
/// Fixed level for the nested gamma layer.
const GAMMA_GAIN: f32 = 0.2;
/// Stochastic jitter: bound and renewal interval of the rate offset.
const JITTER_MAX_HZ: f32 = 0.3;
const JITTER_INTERVAL_SECS: f32 = 0.12;
/// Rotation rate of the `rotate` spatial motion.
const ROTATE_HZ: f32 = 0.08;

/// Sine oscillator driven by a running phase accumulator.
///
/// Advancing by `2*pi*f*dt` (instead of recomputing from absolute time)
/// keeps the waveform continuous when the target frequency moves mid-ramp.
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    /// Advance one sample at `freq` and return the new sample.
    pub fn tick(&mut self, freq: f32, dt: f32) -> f32 {
        self.phase = (self.phase + TAU * freq.max(0.0) * dt).rem_euclid(TAU);
        self.phase.sin()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }
}

/// Low-pass-filtered random-walk rate offset. A fresh target is drawn on a
/// slow clock and the output glides toward it, so the detune never steps
/// audibly. Offsets the oscillator's rate, never its accumulated phase.
#[derive(Debug, Clone, Default)]
struct JitterSource {
    value: f32,
    target: f32,
    samples_left: u32,
}

impl JitterSource {
    fn tick(&mut self, rng: &mut StdRng, sample_rate: f32, dt: f32) -> f32 {
        if self.samples_left == 0 {
            self.target = rng.gen_range(-JITTER_MAX_HZ..JITTER_MAX_HZ);
            self.samples_left = (JITTER_INTERVAL_SECS * sample_rate) as u32;
        }
        self.samples_left -= 1;
        self.value += (self.target - self.value) * (dt * 33.0).min(1.0);
        self.value
    }
}

/// Pan position generator for the overlay/noise bed.
#[derive(Debug, Clone, Default)]
struct Panner {
    lfo_phase: f32,
    walk: f32,
}

impl Panner {
    fn tick(&mut self, motion: SpatialMotion, rng: &mut StdRng, dt: f32) -> f32 {
        match motion {
            SpatialMotion::Fixed => 0.0,
            SpatialMotion::Rotate => {
                self.lfo_phase = (self.lfo_phase + TAU * ROTATE_HZ * dt).rem_euclid(TAU);
                self.lfo_phase.sin()
            }
            SpatialMotion::Random => {
                self.walk = (self.walk + rng.gen_range(-1.0..1.0) * dt * 0.5).clamp(-1.0, 1.0);
                self.walk
            }
        }
    }
}

/// All per-phase signal generators with their continuous state.
///
/// Owned solely by the render domain. Cloning the bank hands the successor
/// phase the same accumulators, which is what keeps phase-boundary
/// crossfades click-free.
#[derive(Debug, Clone)]
pub struct OscillatorBank {
    sample_rate: f32,
    left: Oscillator,
    right: Oscillator,
    gate: Oscillator,
    fifth: Oscillator,
    octave: Oscillator,
    overlays: Vec<Oscillator>,
    gamma_carrier: Oscillator,
    gamma_mod: Oscillator,
    noise: ColoredNoise,
    jitter_l: JitterSource,
    jitter_r: JitterSource,
    overlay_jitter: Vec<JitterSource>,
    panner: Panner,
    rng: StdRng,
}

impl OscillatorBank {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        Self {
            sample_rate,
            left: Oscillator::default(),
            right: Oscillator::default(),
            gate: Oscillator::default(),
            fifth: Oscillator::default(),
            octave: Oscillator::default(),
            overlays: Vec::new(),
            gamma_carrier: Oscillator::default(),
            gamma_mod: Oscillator::default(),
            noise: ColoredNoise::new(seed),
            jitter_l: JitterSource::default(),
            jitter_r: JitterSource::default(),
            overlay_jitter: Vec::new(),
            panner: Panner::default(),
            rng: StdRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Grow or shrink the overlay slots to match a phase. Surviving slots
    /// keep their accumulators.
    pub fn ensure_layout(&mut self, phase: &PhaseProgram) {
        self.overlays.resize_with(phase.overlays.len(), Oscillator::default);
        self.overlay_jitter
            .resize_with(phase.overlays.len(), JitterSource::default);
    }

    /// Render one stereo frame for `phase` with the block's resolved
    /// parameter set.
    pub fn render_frame(&mut self, phase: &PhaseProgram, p: &ResolvedParams, dt: f32) -> (f32, f32) {
        let (jl, jr) = if phase.stochastic {
            (
                self.jitter_l.tick(&mut self.rng, self.sample_rate, dt),
                self.jitter_r.tick(&mut self.rng, self.sample_rate, dt),
            )
        } else {
            (0.0, 0.0)
        };

        // Primary layer: detuned binaural pair, or an amplitude-gated
        // single carrier in isochronic mode.
        let (mut l, mut r) = if phase.isochronic {
            let tone = self.left.tick(p.carrier + jl, dt);
            // Keep the right accumulator moving so a later mode change
            // does not restart it from a stale angle.
            self.right.tick(p.carrier + jl, dt);
            let gate = if p.beat > 0.0 {
                self.gate.tick(p.beat, dt);
                raised_cosine(self.gate.phase())
            } else {
                1.0
            };
            let s = tone * gate * CARRIER_GAIN;
            (s, s)
        } else {
            let half_beat = p.beat * 0.5;
            let sl = self.left.tick(p.carrier - half_beat + jl, dt);
            let sr = self.right.tick(p.carrier + half_beat + jr, dt);
            (sl * CARRIER_GAIN, sr * CARRIER_GAIN)
        };

        // Harmonic stack: perfect fifth and octave above the nominal
        // carrier, attenuated and centered.
        if phase.harmonic_stacking {
            let h = self.fifth.tick(p.carrier * 1.5, dt) * db_to_lin(FIFTH_DB)
                + self.octave.tick(p.carrier * 2.0, dt) * db_to_lin(OCTAVE_DB);
            let (hl, hr) = pan2(h * CARRIER_GAIN, 0.0);
            l += hl;
            r += hr;
        }

        let pan = self.panner.tick(phase.spatial_motion, &mut self.rng, dt);

        // Overlay tones share one mix level, split across the set.
        if !phase.overlays.is_empty() && p.overlay_mix > 0.0 {
            let per = p.overlay_mix / phase.overlays.len() as f32;
            let mut sum = 0.0;
            for ((slot, jitter), freq) in self
                .overlays
                .iter_mut()
                .zip(self.overlay_jitter.iter_mut())
                .zip(&phase.overlays)
            {
                let j = if phase.stochastic {
                    jitter.tick(&mut self.rng, self.sample_rate, dt)
                } else {
                    0.0
                };
                sum += slot.tick(*freq as f32 + j, dt);
            }
            let (ol, or) = pan2(sum * per, pan);
            l += ol;
            r += or;
        }

        // Nested gamma layer: secondary carrier amplitude-modulated by a
        // fast modulator, independent of the primary pair.
        if let Some(gamma) = phase.gamma {
            let env = 0.5 * (1.0 + self.gamma_mod.tick(gamma.modulator as f32, dt));
            let g = self.gamma_carrier.tick(gamma.carrier as f32, dt) * env * GAMMA_GAIN;
            let (gl, gr) = pan2(g, 0.0);
            l += gl;
            r += gr;
        }

        // Noise bed follows the same spatial motion as the overlays.
        if let Some(color) = p.noise {
            if p.noise_mix > 0.0 {
                let n = self.noise.next_sample(color) * p.noise_mix;
                let (nl, nr) = pan2(n, pan);
                l += nl;
                r += nr;
            }
        }

        (l, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoiseColor, PhaseData};
    use crate::params::{resolve, ManualOverrides};
    use crate::timeline::CompiledTimeline;

    const SR: f32 = 44_100.0;
    const DT: f32 = 1.0 / SR;

    fn compiled(data: PhaseData) -> PhaseProgram {
        let proto = crate::models::ProtocolData {
            id: "t".into(),
            title: String::new(),
            duration: data.duration,
            phases: vec![data],
        };
        CompiledTimeline::compile(&proto).unwrap().phase(0).clone()
    }

    fn render(bank: &mut OscillatorBank, phase: &PhaseProgram, p: &ResolvedParams, n: usize) -> Vec<(f32, f32)> {
        bank.ensure_layout(phase);
        (0..n).map(|_| bank.render_frame(phase, p, DT)).collect()
    }

    /// Count mean-crossings to estimate a dominant frequency.
    fn dominant_freq(samples: &[f32], sample_rate: f32) -> f32 {
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] - mean) <= 0.0 && (w[1] - mean) > 0.0)
            .count();
        crossings as f32 * sample_rate / samples.len() as f32
    }

    #[test]
    fn accumulator_is_continuous_across_a_frequency_jump() {
        let mut osc = Oscillator::default();
        let mut prev = osc.tick(200.0, DT);
        let mut max_delta = 0.0f32;
        for i in 1..4410 {
            let freq = if i < 2205 { 200.0 } else { 320.0 };
            let s = osc.tick(freq, DT);
            max_delta = max_delta.max((s - prev).abs());
            prev = s;
        }
        // A 320 Hz sine moves at most 2*pi*320/SR per sample.
        assert!(max_delta <= TAU * 320.0 / SR + 1e-4, "delta {max_delta}");
    }

    #[test]
    fn binaural_pair_is_detuned_by_the_beat() {
        let phase = compiled(PhaseData::fixed(10.0, 10.0, 200.0));
        let p = resolve(&phase, 0.0, ManualOverrides::default());
        let mut bank = OscillatorBank::new(SR, 1);
        let frames = render(&mut bank, &phase, &p, SR as usize * 2);
        let left: Vec<f32> = frames.iter().map(|f| f.0).collect();
        let right: Vec<f32> = frames.iter().map(|f| f.1).collect();
        let fl = dominant_freq(&left, SR);
        let fr = dominant_freq(&right, SR);
        assert!((fl - 195.0).abs() < 1.5, "left {fl}");
        assert!((fr - 205.0).abs() < 1.5, "right {fr}");
    }

    #[test]
    fn zero_beat_collapses_to_identical_channels() {
        let phase = compiled(PhaseData::fixed(10.0, 0.0, 200.0));
        let p = resolve(&phase, 0.0, ManualOverrides::default());
        let mut bank = OscillatorBank::new(SR, 1);
        for (l, r) in render(&mut bank, &phase, &p, 4410) {
            assert!((l - r).abs() < 1e-6);
        }
    }

    #[test]
    fn isochronic_gate_pulses_at_the_beat_frequency() {
        let mut data = PhaseData::fixed(10.0, 10.0, 200.0);
        data.isochronic = true;
        let phase = compiled(data);
        let p = resolve(&phase, 0.0, ManualOverrides::default());
        let mut bank = OscillatorBank::new(SR, 1);
        let frames = render(&mut bank, &phase, &p, SR as usize);
        // Envelope over 5ms windows: a 10 Hz gate leaves ten near-silent
        // clusters per second.
        let win = (SR / 200.0) as usize;
        let env: Vec<f32> = frames
            .chunks(win)
            .map(|c| c.iter().map(|f| f.0.abs()).fold(0.0, f32::max))
            .collect();
        let mut dips = 0;
        let mut in_dip = false;
        for &e in &env {
            if e < 0.06 {
                if !in_dip {
                    dips += 1;
                    in_dip = true;
                }
            } else {
                in_dip = false;
            }
        }
        assert!((8..=12).contains(&dips), "gate dips {dips}");
        assert!(env.iter().cloned().fold(0.0, f32::max) > 0.3);
    }

    #[test]
    fn harmonic_stack_adds_attenuated_partials() {
        let mut data = PhaseData::fixed(10.0, 0.0, 200.0);
        data.harmonic_stacking = true;
        let phase = compiled(data);
        let p = resolve(&phase, 0.0, ManualOverrides::default());
        let mut bank = OscillatorBank::new(SR, 1);
        let with: f32 = render(&mut bank, &phase, &p, 44_100)
            .iter()
            .map(|f| f.0 * f.0)
            .sum();

        let plain = compiled(PhaseData::fixed(10.0, 0.0, 200.0));
        let mut bank = OscillatorBank::new(SR, 1);
        let without: f32 = render(&mut bank, &plain, &p, 44_100)
            .iter()
            .map(|f| f.0 * f.0)
            .sum();
        assert!(with > without * 1.1, "stack energy {with} vs {without}");
        // Partials stay subordinate to the carrier.
        assert!(with < without * 2.0);
    }

    #[test]
    fn jitter_stays_bounded_and_smooth() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut jitter = JitterSource::default();
        let mut prev = 0.0f32;
        for _ in 0..(SR as usize * 3) {
            let v = jitter.tick(&mut rng, SR, DT);
            assert!(v.abs() <= JITTER_MAX_HZ);
            // Smoothed walk: no audible stepping between samples.
            assert!((v - prev).abs() < 0.001);
            prev = v;
        }
    }

    #[test]
    fn random_pan_walk_is_bounded() {
        let mut data = PhaseData::fixed(10.0, 4.0, 200.0);
        data.spatial_motion = SpatialMotion::Random;
        data.noise = Some(NoiseColor::White);
        data.noise_mix = 0.5;
        let phase = compiled(data);
        let p = resolve(&phase, 0.0, ManualOverrides::default());
        let mut bank = OscillatorBank::new(SR, 9);
        bank.ensure_layout(&phase);
        for _ in 0..44_100 {
            bank.render_frame(&phase, &p, DT);
            assert!(bank.panner.walk.abs() <= 1.0);
        }
    }

    #[test]
    fn cloned_bank_inherits_accumulators() {
        let phase = compiled(PhaseData::fixed(10.0, 10.0, 200.0));
        let p = resolve(&phase, 0.0, ManualOverrides::default());
        let mut bank = OscillatorBank::new(SR, 1);
        render(&mut bank, &phase, &p, 1000);
        let mut clone = bank.clone();
        let a = bank.render_frame(&phase, &p, DT);
        let b = clone.render_frame(&phase, &p, DT);
        assert_eq!(a, b);
    }
}
