use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use serde::Deserialize;

use crate::dsp::db_to_lin;

/// Crossfeed blend for free-air listening: level, inter-channel delay.
const XFEED_DB: f32 = -4.5;
const XFEED_DELAY_SECS: f32 = 0.0003;
/// Bone-conduction EQ corner/presence tuning.
const BONE_HP_HZ: f32 = 250.0;
const BONE_PRESENCE_HZ: f32 = 2_700.0;
const BONE_PRESENCE_DB: f32 = 6.0;
/// LFE crossover for the 5.1 mapping.
const LFE_LP_HZ: f32 = 120.0;

/// Output device profile selecting the post-processing chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Maximum inter-channel separation; no processing.
    Headphones,
    /// Crossfeed to reduce phase cancellation in free air.
    Speakers,
    /// Discrete 5.1: carriers to center/LFE, ambience to rears.
    #[serde(rename = "surround_51", alias = "surround51")]
    Surround51,
    /// High-pass plus presence boost for jaw/temple transducers.
    BoneConduction,
}

fn coeffs(ty: Type<f32>, sample_rate: f32, freq: f32, q: f32) -> Coefficients<f32> {
    Coefficients::<f32>::from_params(ty, sample_rate.hz(), freq.hz(), q).unwrap_or(Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    })
}

/// Device-mode-specific post-processing of the mixed stereo frame.
///
/// Mode switches are applied between render cycles by the renderer, so a
/// change never tears a block; the only state carried is the crossfeed
/// delay line and the EQ filter histories.
pub struct OutputStage {
    mode: OutputMode,
    sample_rate: f32,
    delay_l: Vec<f32>,
    delay_r: Vec<f32>,
    delay_idx: usize,
    xfeed_gain: f32,
    xfeed_norm: f32,
    hp_l: DirectForm2Transposed<f32>,
    hp_r: DirectForm2Transposed<f32>,
    presence_l: DirectForm2Transposed<f32>,
    presence_r: DirectForm2Transposed<f32>,
    lfe_lp: DirectForm2Transposed<f32>,
}

impl OutputStage {
    pub fn new(sample_rate: f32) -> Self {
        let delay = ((XFEED_DELAY_SECS * sample_rate) as usize).max(1);
        let hp = coeffs(Type::HighPass, sample_rate, BONE_HP_HZ, Q_BUTTERWORTH_F32);
        let presence = coeffs(
            Type::PeakingEQ(BONE_PRESENCE_DB),
            sample_rate,
            BONE_PRESENCE_HZ,
            1.0,
        );
        let lfe = coeffs(Type::LowPass, sample_rate, LFE_LP_HZ, Q_BUTTERWORTH_F32);
        let xfeed_gain = db_to_lin(XFEED_DB);
        Self {
            mode: OutputMode::Headphones,
            sample_rate,
            delay_l: vec![0.0; delay],
            delay_r: vec![0.0; delay],
            delay_idx: 0,
            xfeed_gain,
            xfeed_norm: 1.0 / (1.0 + xfeed_gain * xfeed_gain).sqrt(),
            hp_l: DirectForm2Transposed::<f32>::new(hp),
            hp_r: DirectForm2Transposed::<f32>::new(hp),
            presence_l: DirectForm2Transposed::<f32>::new(presence),
            presence_r: DirectForm2Transposed::<f32>::new(presence),
            lfe_lp: DirectForm2Transposed::<f32>::new(lfe),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        let mode = self.mode;
        *self = Self::new(sample_rate);
        self.mode = mode;
    }

    pub fn set_mode(&mut self, mode: OutputMode) {
        if mode != self.mode {
            self.mode = mode;
            // Fresh transient state for the newly active chain.
            self.delay_l.fill(0.0);
            self.delay_r.fill(0.0);
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Channels the active mode wants from the sink.
    pub fn preferred_channels(&self) -> usize {
        match self.mode {
            OutputMode::Surround51 => 6,
            _ => 2,
        }
    }

    /// Transform one mixed stereo frame into `out`, whose length is the
    /// sink's channel count. Surround content is downmixed when the sink
    /// has fewer than six channels.
    pub fn process_into(&mut self, l: f32, r: f32, out: &mut [f32]) {
        match self.mode {
            OutputMode::Headphones => self.write_stereo(l, r, out),
            OutputMode::Speakers => {
                let dl = self.delay_l[self.delay_idx];
                let dr = self.delay_r[self.delay_idx];
                self.delay_l[self.delay_idx] = l;
                self.delay_r[self.delay_idx] = r;
                self.delay_idx = (self.delay_idx + 1) % self.delay_l.len();
                let ol = (l + self.xfeed_gain * dr) * self.xfeed_norm;
                let or = (r + self.xfeed_gain * dl) * self.xfeed_norm;
                self.write_stereo(ol, or, out);
            }
            OutputMode::BoneConduction => {
                let ol = self.presence_l.run(self.hp_l.run(l));
                let or = self.presence_r.run(self.hp_r.run(r));
                self.write_stereo(ol, or, out);
            }
            OutputMode::Surround51 => {
                let mid = 0.5 * (l + r);
                let side = 0.5 * (l - r);
                let frame = [
                    l * 0.8,                     // front left
                    r * 0.8,                     // front right
                    mid * 0.7,                   // center
                    self.lfe_lp.run(mid) * 0.8,  // LFE
                    side * 1.2,                  // rear left
                    -side * 1.2,                 // rear right
                ];
                if out.len() >= 6 {
                    out[..6].copy_from_slice(&frame);
                    for s in &mut out[6..] {
                        *s = 0.0;
                    }
                } else {
                    // ITU-style downmix back to the sink's stereo pair.
                    let dl = frame[0] + 0.707 * frame[2] + 0.707 * frame[4] + 0.5 * frame[3];
                    let dr = frame[1] + 0.707 * frame[2] + 0.707 * frame[5] + 0.5 * frame[3];
                    self.write_stereo(dl, dr, out);
                }
            }
        }
    }

    fn write_stereo(&self, l: f32, r: f32, out: &mut [f32]) {
        match out.len() {
            0 => {}
            1 => out[0] = 0.5 * (l + r),
            n => {
                out[0] = l;
                out[1] = r;
                for s in &mut out[2..n] {
                    *s = 0.0;
                }
            }
        }
    }
}
