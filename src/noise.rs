use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::NoiseColor;

/// Streaming colored-noise source.
///
/// White noise comes straight from the RNG; pink is shaped with the
/// Voss-McCartney filter bank and brown with a leaky integrator. Filter
/// state persists across phase transitions so a color change only swaps
/// which path is read, never resets the shaping filters.
#[derive(Debug, Clone)]
pub struct ColoredNoise {
    rng: StdRng,
    // Voss-McCartney state for pink noise.
    b0: f32,
    b1: f32,
    b2: f32,
    b3: f32,
    b4: f32,
    b5: f32,
    // Leaky integrator state for brown noise.
    brown: f32,
}

impl ColoredNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            b3: 0.0,
            b4: 0.0,
            b5: 0.0,
            brown: 0.0,
        }
    }

    pub fn next_sample(&mut self, color: NoiseColor) -> f32 {
        let w: f32 = self.rng.gen_range(-1.0..1.0);
        match color {
            NoiseColor::White => w,
            NoiseColor::Pink => {
                self.b0 = 0.99886 * self.b0 + w * 0.0555179;
                self.b1 = 0.99332 * self.b1 + w * 0.0750759;
                self.b2 = 0.96900 * self.b2 + w * 0.1538520;
                self.b3 = 0.86650 * self.b3 + w * 0.3104856;
                self.b4 = 0.55000 * self.b4 + w * 0.5329522;
                self.b5 = -0.7616 * self.b5 - w * 0.0168980;
                (self.b0 + self.b1 + self.b2 + self.b3 + self.b4 + self.b5) * 0.11
            }
            NoiseColor::Brown => {
                // Leaky integration keeps the walk bounded; the 3x makeup
                // puts the level next to the pink bed while leaving peak
                // headroom inside full scale.
                self.brown = (self.brown + w * 0.02) / 1.02;
                self.brown * 3.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(noise: &mut ColoredNoise, color: NoiseColor, n: usize) -> f32 {
        let sum: f32 = (0..n).map(|_| noise.next_sample(color).powi(2)).sum();
        (sum / n as f32).sqrt()
    }

    #[test]
    fn all_colors_stay_inside_full_scale() {
        let mut noise = ColoredNoise::new(7);
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown] {
            for _ in 0..48_000 {
                let s = noise.next_sample(color);
                assert!(s.abs() <= 1.0, "{color:?} sample {s} out of range");
            }
        }
    }

    #[test]
    fn brown_level_sits_near_the_other_beds() {
        let mut noise = ColoredNoise::new(17);
        let mut peak = 0.0f32;
        let mut sum = 0.0f32;
        let n = 200_000;
        for _ in 0..n {
            let s = noise.next_sample(NoiseColor::Brown);
            peak = peak.max(s.abs());
            sum += s * s;
        }
        let brown_rms = (sum / n as f32).sqrt();
        assert!(peak <= 1.0, "brown peak {peak}");

        let pink_rms = rms(&mut ColoredNoise::new(17), NoiseColor::Pink, n);
        // Same order of magnitude as pink, not a 10 dB hotter bed.
        assert!(
            brown_rms > pink_rms * 0.5 && brown_rms < pink_rms * 3.0,
            "brown rms {brown_rms} vs pink {pink_rms}"
        );
    }

    #[test]
    fn colors_have_nonzero_energy() {
        let mut noise = ColoredNoise::new(42);
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown] {
            assert!(rms(&mut noise, color, 48_000) > 0.01, "{color:?} silent");
        }
    }

    #[test]
    fn seeded_streams_are_deterministic() {
        let mut a = ColoredNoise::new(1);
        let mut b = ColoredNoise::new(1);
        for _ in 0..256 {
            assert_eq!(
                a.next_sample(NoiseColor::Pink),
                b.next_sample(NoiseColor::Pink)
            );
        }
    }

    #[test]
    fn pink_has_less_high_frequency_energy_than_white() {
        // First-difference energy is a crude high-frequency proxy.
        let mut noise = ColoredNoise::new(3);
        let diff_energy = |samples: &[f32]| -> f32 {
            samples.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f32>()
                / samples.len() as f32
        };
        let white: Vec<f32> = (0..48_000)
            .map(|_| noise.next_sample(NoiseColor::White))
            .collect();
        let pink: Vec<f32> = (0..48_000)
            .map(|_| noise.next_sample(NoiseColor::Pink))
            .collect();
        let white_rms = (white.iter().map(|s| s * s).sum::<f32>() / white.len() as f32).sqrt();
        let pink_rms = (pink.iter().map(|s| s * s).sum::<f32>() / pink.len() as f32).sqrt();
        // Normalize by level before comparing spectral tilt.
        assert!(
            diff_energy(&pink) / (pink_rms * pink_rms)
                < diff_energy(&white) / (white_rms * white_rms)
        );
    }
}
