use serde::Deserialize;

/// Background noise bed color.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
}

/// Pan trajectory for overlay tones and the noise bed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpatialMotion {
    Rotate,
    #[default]
    Fixed,
    Random,
}

/// One timed segment of a protocol, as shipped by the catalog.
///
/// Beat and carrier frequencies may be given either as a fixed value or as a
/// start/end ramp pair; validation happens in the timeline compiler, not here.
#[derive(Deserialize, Debug, Clone)]
pub struct PhaseData {
    /// Segment length in seconds.
    pub duration: f64,
    #[serde(default)]
    pub beat: Option<f64>,
    #[serde(default, alias = "startBeat")]
    pub start_beat: Option<f64>,
    #[serde(default, alias = "endBeat")]
    pub end_beat: Option<f64>,
    pub carrier: f64,
    #[serde(default, alias = "carrierEnd")]
    pub carrier_end: Option<f64>,
    #[serde(default)]
    pub noise: Option<NoiseColor>,
    #[serde(default, alias = "noiseMix")]
    pub noise_mix: f64,
    #[serde(default)]
    pub overlays: Vec<f64>,
    #[serde(default, alias = "overlayMix")]
    pub overlay_mix: f64,
    /// Modulator frequency for the nested gamma layer.
    #[serde(default, alias = "gammaOverlay")]
    pub gamma_overlay: Option<f64>,
    /// Carrier for the nested gamma layer.
    #[serde(default, alias = "gammaCarrier")]
    pub gamma_carrier: Option<f64>,
    /// Amplitude-gate the carrier at the beat frequency instead of detuning.
    #[serde(default)]
    pub isochronic: bool,
    /// Add attenuated fifth and octave partials above the carrier.
    #[serde(default, alias = "harmonicStacking")]
    pub harmonic_stacking: bool,
    /// Slow bounded random detune against habituation.
    #[serde(default)]
    pub stochastic: bool,
    #[serde(default, alias = "spatialMotion")]
    pub spatial_motion: SpatialMotion,
}

impl PhaseData {
    /// Fixed-parameter convenience constructor used by callers and tests.
    pub fn fixed(duration: f64, beat: f64, carrier: f64) -> Self {
        Self {
            duration,
            beat: Some(beat),
            start_beat: None,
            end_beat: None,
            carrier,
            carrier_end: None,
            noise: None,
            noise_mix: 0.0,
            overlays: Vec::new(),
            overlay_mix: 0.0,
            gamma_overlay: None,
            gamma_carrier: None,
            isochronic: false,
            harmonic_stacking: false,
            stochastic: false,
            spatial_motion: SpatialMotion::Fixed,
        }
    }
}

/// A protocol as consumed from the external catalog: an ordered phase list
/// plus the declared total duration. Opaque and immutable to the engine.
#[derive(Deserialize, Debug, Clone)]
pub struct ProtocolData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Declared total duration in seconds; compared against the phase sum.
    pub duration: f64,
    pub phases: Vec<PhaseData>,
}
