use crate::error::EngineError;
use crate::models::{NoiseColor, PhaseData, ProtocolData, SpatialMotion};

/// A parameter that is either constant over a phase or ramps linearly
/// across it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampParam {
    Constant(f64),
    Linear { start: f64, end: f64 },
}

impl RampParam {
    /// Value at a local phase time fraction; the fraction is clamped to
    /// [0, 1] so queries slightly past a boundary stay well defined.
    pub fn value_at(&self, t_frac: f64) -> f64 {
        match *self {
            RampParam::Constant(v) => v,
            RampParam::Linear { start, end } => {
                let t = t_frac.clamp(0.0, 1.0);
                start + (end - start) * t
            }
        }
    }

    pub fn start(&self) -> f64 {
        self.value_at(0.0)
    }

    pub fn end(&self) -> f64 {
        self.value_at(1.0)
    }
}

/// Nested amplitude-modulation layer, independent of the primary pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaPair {
    /// Fast (gamma-range) modulator frequency.
    pub modulator: f64,
    /// Carrier being modulated.
    pub carrier: f64,
}

/// One compiled phase: absolute offsets plus interpolation rules.
#[derive(Debug, Clone)]
pub struct PhaseProgram {
    pub start_offset: f64,
    pub end_offset: f64,
    pub duration: f64,
    pub beat: RampParam,
    pub carrier: RampParam,
    pub noise: Option<NoiseColor>,
    pub noise_mix: f64,
    pub overlays: Vec<f64>,
    pub overlay_mix: f64,
    pub gamma: Option<GammaPair>,
    pub isochronic: bool,
    pub harmonic_stacking: bool,
    pub stochastic: bool,
    pub spatial_motion: SpatialMotion,
}

impl PhaseProgram {
    /// Local time fraction for an absolute timeline offset.
    pub fn local_frac(&self, t: f64) -> f64 {
        ((t - self.start_offset) / self.duration).clamp(0.0, 1.0)
    }
}

/// Immutable timeline compiled from a protocol's phase list. Offsets are
/// contiguous and non-overlapping; queries are pure and re-entrant.
#[derive(Debug, Clone)]
pub struct CompiledTimeline {
    phases: Vec<PhaseProgram>,
    total_duration: f64,
}

fn ramp_of(
    index: usize,
    name: &str,
    fixed: Option<f64>,
    start: Option<f64>,
    end: Option<f64>,
) -> Result<RampParam, EngineError> {
    match (fixed, start, end) {
        (_, Some(s), Some(e)) => Ok(RampParam::Linear { start: s, end: e }),
        (_, Some(_), None) | (_, None, Some(_)) => Err(EngineError::invalid_phase(
            index,
            format!("{name} ramp is missing one endpoint"),
        )),
        (Some(v), None, None) => Ok(RampParam::Constant(v)),
        (None, None, None) => Err(EngineError::invalid_phase(
            index,
            format!("{name} is missing"),
        )),
    }
}

fn check_mix(index: usize, name: &str, v: f64) -> Result<(), EngineError> {
    if !(0.0..=1.0).contains(&v) {
        return Err(EngineError::invalid_phase(
            index,
            format!("{name} {v} outside [0, 1]"),
        ));
    }
    Ok(())
}

fn compile_phase(index: usize, offset: f64, phase: &PhaseData) -> Result<PhaseProgram, EngineError> {
    if phase.duration <= 0.0 {
        return Err(EngineError::invalid_phase(
            index,
            format!("duration {} must be positive", phase.duration),
        ));
    }
    check_mix(index, "noiseMix", phase.noise_mix)?;
    check_mix(index, "overlayMix", phase.overlay_mix)?;

    let beat = ramp_of(index, "beat", phase.beat, phase.start_beat, phase.end_beat)?;
    let carrier = match phase.carrier_end {
        Some(end) => RampParam::Linear {
            start: phase.carrier,
            end,
        },
        None => RampParam::Constant(phase.carrier),
    };
    if carrier.start() <= 0.0 || carrier.end() <= 0.0 {
        return Err(EngineError::invalid_phase(index, "carrier must be positive"));
    }

    let gamma = match (phase.gamma_overlay, phase.gamma_carrier) {
        (Some(modulator), Some(carrier)) => Some(GammaPair { modulator, carrier }),
        (None, None) => None,
        _ => {
            return Err(EngineError::invalid_phase(
                index,
                "gamma nesting needs both gammaOverlay and gammaCarrier",
            ))
        }
    };

    Ok(PhaseProgram {
        start_offset: offset,
        end_offset: offset + phase.duration,
        duration: phase.duration,
        beat,
        carrier,
        noise: phase.noise,
        noise_mix: phase.noise_mix,
        overlays: phase.overlays.clone(),
        overlay_mix: phase.overlay_mix,
        gamma,
        isochronic: phase.isochronic,
        harmonic_stacking: phase.harmonic_stacking,
        stochastic: phase.stochastic,
        spatial_motion: phase.spatial_motion,
    })
}

impl CompiledTimeline {
    /// Compile a protocol's phase list into absolute offsets and ramp rules.
    ///
    /// Fails closed: any invalid phase rejects the whole protocol.
    pub fn compile(protocol: &ProtocolData) -> Result<Self, EngineError> {
        if protocol.phases.is_empty() {
            return Err(EngineError::invalid_phase(0, "protocol has no phases"));
        }

        let mut phases = Vec::with_capacity(protocol.phases.len());
        let mut offset = 0.0;
        for (index, phase) in protocol.phases.iter().enumerate() {
            let compiled = compile_phase(index, offset, phase)?;
            offset = compiled.end_offset;
            phases.push(compiled);
        }

        if protocol.duration > 0.0 && (offset - protocol.duration).abs() > 1e-6 {
            tracing::warn!(
                protocol = %protocol.id,
                declared = protocol.duration,
                computed = offset,
                "declared duration differs from phase sum; using phase sum"
            );
        }

        Ok(Self {
            phases,
            total_duration: offset,
        })
    }

    /// Phase index containing absolute time `t`, or `None` past the end.
    pub fn phase_index_at(&self, t: f64) -> Option<usize> {
        if t < 0.0 {
            return Some(0);
        }
        self.phases.iter().position(|p| t < p.end_offset)
    }

    pub fn phase(&self, index: usize) -> &PhaseProgram {
        &self.phases[index]
    }

    pub fn phases(&self) -> &[PhaseProgram] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }
}
