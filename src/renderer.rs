use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::Consumer;

use crate::command::{Command, CommandReceiver};
use crate::config::EngineConfig;
use crate::dsp::{equal_power_gains, soft_limit};
use crate::output::OutputStage;
use crate::params::{resolve, ManualOverrides, ResolvedParams};
use crate::tap::TapWriter;
use crate::timeline::CompiledTimeline;
use crate::voices::OscillatorBank;

/// Per-sample coefficient for the volume glide, roughly a 10 ms time
/// constant at 48 kHz.
const VOLUME_SMOOTH: f32 = 0.002;

/// Position and progress shared with the control domain.
///
/// The render callback is the only writer; the transport's tick thread
/// reads these without touching the renderer lock.
#[derive(Debug)]
pub struct SharedCursor {
    elapsed_frames: AtomicU64,
    phase_index: AtomicUsize,
    completed: AtomicBool,
    sample_rate: AtomicU32,
    // 0 when healthy, otherwise wall-clock millis of the first unresolved
    // sink fault.
    fault_since_ms: AtomicU64,
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl SharedCursor {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            elapsed_frames: AtomicU64::new(0),
            phase_index: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
            sample_rate: AtomicU32::new(sample_rate),
            fault_since_ms: AtomicU64::new(0),
        })
    }

    /// Record a sink fault; keeps the timestamp of the first one.
    pub fn report_fault(&self) {
        let _ = self.fault_since_ms.compare_exchange(
            0,
            unix_millis().max(1),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    pub fn clear_fault(&self) {
        self.fault_since_ms.store(0, Ordering::Relaxed);
    }

    /// How long the current sink fault has persisted, if any.
    pub fn fault_age(&self) -> Option<Duration> {
        let since = self.fault_since_ms.load(Ordering::Relaxed);
        (since != 0).then(|| Duration::from_millis(unix_millis().saturating_sub(since)))
    }

    pub fn elapsed_secs(&self) -> f64 {
        let sr = self.sample_rate.load(Ordering::Relaxed).max(1);
        self.elapsed_frames.load(Ordering::Relaxed) as f64 / sr as f64
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::Relaxed)
    }
}

struct Crossfade {
    old_bank: OscillatorBank,
    old_phase: usize,
    // Outgoing parameters are frozen at fade start for the tail.
    old_params: ResolvedParams,
    pos: u64,
    len: u64,
}

struct StopFade {
    remaining: u64,
    len: u64,
}

/// Render-domain session state: owns the oscillator bank and drives all
/// audio synthesis from inside the output callback.
///
/// Commands are drained at the start of each cycle so a block is rendered
/// under one consistent configuration.
pub struct SessionRenderer {
    sample_rate: f32,
    timeline: Option<Arc<CompiledTimeline>>,
    bank: OscillatorBank,
    current_phase: usize,
    crossfade: Option<Crossfade>,
    stop_fade: Option<StopFade>,
    playing: bool,
    paused: bool,
    elapsed_frames: u64,
    volume: f32,
    volume_target: f32,
    master_gain: f32,
    overrides: ManualOverrides,
    output: OutputStage,
    crossfade_ms: f32,
    stop_fade_ms: f32,
    commands: CommandReceiver,
    tap: TapWriter,
    cursor: Arc<SharedCursor>,
}

impl SessionRenderer {
    pub fn new(
        sample_rate: f32,
        config: &EngineConfig,
        commands: CommandReceiver,
        tap: TapWriter,
        cursor: Arc<SharedCursor>,
    ) -> Self {
        cursor.sample_rate.store(sample_rate as u32, Ordering::Relaxed);
        Self {
            sample_rate,
            timeline: None,
            bank: OscillatorBank::new(sample_rate, 0x5eed),
            current_phase: 0,
            crossfade: None,
            stop_fade: None,
            playing: false,
            paused: false,
            elapsed_frames: 0,
            volume: 1.0,
            volume_target: 1.0,
            master_gain: config.master_gain,
            overrides: ManualOverrides::default(),
            output: OutputStage::new(sample_rate),
            crossfade_ms: config.crossfade_ms,
            stop_fade_ms: config.stop_fade_ms,
            commands,
            tap,
            cursor,
        }
    }

    /// Called by the audio thread once the device format is known.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.bank.set_sample_rate(sample_rate);
        self.output.set_sample_rate(sample_rate);
        self.cursor
            .sample_rate
            .store(sample_rate as u32, Ordering::Relaxed);
    }

    pub fn preferred_channels(&self) -> usize {
        self.output.preferred_channels()
    }

    pub fn cursor(&self) -> Arc<SharedCursor> {
        Arc::clone(&self.cursor)
    }

    fn crossfade_frames(&self) -> u64 {
        (self.crossfade_ms / 1000.0 * self.sample_rate) as u64
    }

    fn stop_fade_frames(&self) -> u64 {
        ((self.stop_fade_ms / 1000.0 * self.sample_rate) as u64).max(1)
    }

    fn reset_position(&mut self) {
        self.current_phase = 0;
        self.elapsed_frames = 0;
        self.crossfade = None;
        self.stop_fade = None;
        self.cursor.elapsed_frames.store(0, Ordering::Relaxed);
        self.cursor.phase_index.store(0, Ordering::Relaxed);
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Load(timeline) => {
                self.bank.ensure_layout(timeline.phase(0));
                self.timeline = Some(timeline);
                self.playing = false;
                self.paused = false;
                self.overrides = ManualOverrides::default();
                self.reset_position();
                self.cursor.completed.store(false, Ordering::Relaxed);
            }
            Command::Play => {
                if let Some(timeline) = &self.timeline {
                    self.bank.ensure_layout(timeline.phase(0));
                    self.playing = true;
                    self.paused = false;
                    self.reset_position();
                    self.cursor.completed.store(false, Ordering::Relaxed);
                }
            }
            Command::Resume => self.paused = false,
            Command::Pause => self.paused = true,
            Command::Stop { fade } => {
                // A paused renderer never reaches the fade path, so it
                // stops hard.
                if self.playing && !self.paused && fade {
                    self.stop_fade = Some(StopFade {
                        remaining: self.stop_fade_frames(),
                        len: self.stop_fade_frames(),
                    });
                } else {
                    self.playing = false;
                    self.paused = false;
                    self.reset_position();
                }
            }
            Command::SetVolume(v) => self.volume_target = v.clamp(0.0, 1.0),
            Command::SetOutputMode(mode) => self.output.set_mode(mode),
            Command::SetOverrides(ov) => self.overrides = ov.clamped(),
        }
    }

    fn crossfade_len(&self, timeline: &CompiledTimeline, a: usize, b: usize) -> u64 {
        let shorter = timeline.phase(a).duration.min(timeline.phase(b).duration);
        let limit = (shorter * 0.5 * self.sample_rate as f64) as u64;
        self.crossfade_frames().min(limit)
    }

    fn begin_crossfade(&mut self, timeline: &CompiledTimeline, next: usize, t: f64) {
        let old = timeline.phase(self.current_phase);
        let len = self.crossfade_len(timeline, self.current_phase, next);
        if len > 0 {
            // The successor bank is a clone, so it inherits every phase
            // accumulator; the old copy only renders the fade-out tail.
            self.crossfade = Some(Crossfade {
                old_bank: self.bank.clone(),
                old_phase: self.current_phase,
                old_params: resolve(old, old.local_frac(t), self.overrides),
                pos: 0,
                len,
            });
        }
        self.current_phase = next;
        self.bank.ensure_layout(timeline.phase(next));
    }

    /// Render one output block. `data` is interleaved with `channels`
    /// samples per frame.
    pub fn process_block(&mut self, data: &mut [f32], channels: usize) {
        while let Some(cmd) = self.commands.try_pop() {
            self.apply(cmd);
        }
        // A running callback means the sink recovered.
        self.cursor.clear_fault();
        let channels = channels.max(1);
        let dt = 1.0 / self.sample_rate;
        let timeline = self.timeline.clone();

        // One resolved parameter set per cycle; only a mid-block phase
        // boundary forces a re-resolve.
        let mut resolved: Option<(usize, ResolvedParams)> = None;

        for frame in data.chunks_mut(channels) {
            let timeline = match &timeline {
                Some(t) if self.playing && !self.paused => t,
                _ => {
                    frame.fill(0.0);
                    self.tap.push(0.0, 0.0);
                    continue;
                }
            };

            let t = self.elapsed_frames as f64 / self.sample_rate as f64;
            let index = match timeline.phase_index_at(t) {
                Some(i) => i,
                None => {
                    self.playing = false;
                    self.cursor
                        .phase_index
                        .store(timeline.len(), Ordering::Relaxed);
                    self.cursor.completed.store(true, Ordering::Relaxed);
                    frame.fill(0.0);
                    self.tap.push(0.0, 0.0);
                    continue;
                }
            };
            // Transitions straddle the boundary: the fade starts half a
            // window early so the midpoint lands on the phase edge. The
            // late branch covers seeks and fades clamped to zero length.
            if self.crossfade.is_none() {
                if index != self.current_phase {
                    self.begin_crossfade(timeline, index, t);
                } else if index + 1 < timeline.len() {
                    let len = self.crossfade_len(timeline, index, index + 1);
                    let lead = len as f64 * 0.5 / self.sample_rate as f64;
                    if len > 0 && t >= timeline.phase(index).end_offset - lead {
                        self.begin_crossfade(timeline, index + 1, t);
                    }
                }
            }

            let phase = timeline.phase(self.current_phase);
            let params = match resolved {
                Some((index, p)) if index == self.current_phase => p,
                _ => {
                    let p = resolve(phase, phase.local_frac(t), self.overrides);
                    resolved = Some((self.current_phase, p));
                    p
                }
            };
            let (mut l, mut r) = self.bank.render_frame(phase, &params, dt);

            if let Some(fade) = &mut self.crossfade {
                let old_phase = timeline.phase(fade.old_phase);
                let (ol, or) = fade.old_bank.render_frame(old_phase, &fade.old_params, dt);
                let (g_out, g_in) = equal_power_gains(fade.pos as f32 / fade.len as f32);
                l = l * g_in + ol * g_out;
                r = r * g_in + or * g_out;
                fade.pos += 1;
                if fade.pos >= fade.len {
                    self.crossfade = None;
                }
            }

            self.volume += (self.volume_target - self.volume) * VOLUME_SMOOTH;
            let mut gain = self.volume * self.master_gain;

            let mut halted = false;
            if let Some(fade) = &mut self.stop_fade {
                gain *= fade.remaining as f32 / fade.len as f32;
                fade.remaining -= 1;
                halted = fade.remaining == 0;
            }

            let l = soft_limit(l * gain);
            let r = soft_limit(r * gain);
            self.output.process_into(l, r, frame);
            self.tap.push(l, r);

            self.elapsed_frames += 1;
            self.cursor
                .elapsed_frames
                .store(self.elapsed_frames, Ordering::Relaxed);
            self.cursor.phase_index.store(index, Ordering::Relaxed);

            if halted {
                self.playing = false;
                self.paused = false;
                self.reset_position();
            }
        }
    }
}

/// Drive a renderer synchronously through a whole timeline, calling
/// `on_frame` with every post-processed stereo frame. Used by the offline
/// WAV path and by tests; exercises the same code as live playback.
pub fn render_offline(
    timeline: Arc<CompiledTimeline>,
    sample_rate: f32,
    config: &EngineConfig,
    mut on_frame: impl FnMut(f32, f32),
) {
    use ringbuf::traits::Producer;

    let (mut tx, rx) = crate::command::channel(16);
    let (tap_writer, _tap) = crate::tap::tap(64);
    let cursor = SharedCursor::new(sample_rate as u32);
    let total_frames = (timeline.total_duration() * sample_rate as f64) as u64;
    let mut renderer =
        SessionRenderer::new(sample_rate, config, rx, tap_writer, Arc::clone(&cursor));
    let _ = tx.try_push(Command::Load(timeline));
    let _ = tx.try_push(Command::Play);

    let mut block = vec![0.0f32; 1024 * 2];
    let mut emitted = 0u64;
    while !cursor.completed() && emitted < total_frames {
        renderer.process_block(&mut block, 2);
        for frame in block.chunks(2) {
            if emitted == total_frames {
                break;
            }
            on_frame(frame[0], frame[1]);
            emitted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSender;
    use crate::models::{PhaseData, ProtocolData};
    use crate::output::OutputMode;
    use crate::tap::Tap;
    use ringbuf::traits::Producer;

    const SR: f32 = 48_000.0;

    fn timeline(phases: Vec<PhaseData>) -> Arc<CompiledTimeline> {
        let duration = phases.iter().map(|p| p.duration).sum();
        let proto = ProtocolData {
            id: "t".into(),
            title: String::new(),
            duration,
            phases,
        };
        Arc::new(CompiledTimeline::compile(&proto).unwrap())
    }

    fn rig() -> (SessionRenderer, CommandSender, Tap, Arc<SharedCursor>) {
        let (tx, rx) = crate::command::channel(64);
        let (tap_writer, tap) = crate::tap::tap(8192);
        let cursor = SharedCursor::new(SR as u32);
        let renderer = SessionRenderer::new(
            SR,
            &EngineConfig::default(),
            rx,
            tap_writer,
            Arc::clone(&cursor),
        );
        (renderer, tx, tap, cursor)
    }

    fn energy(block: &[f32]) -> f32 {
        block.iter().map(|s| s * s).sum()
    }

    /// Single-bin amplitude of `freq` over a window. Callers pick window
    /// lengths holding an integer number of cycles so there is no leakage.
    fn tone_amp(samples: &[f32], freq: f32, sample_rate: f32) -> f32 {
        let mut s = 0.0f32;
        let mut c = 0.0f32;
        for (i, x) in samples.iter().enumerate() {
            let ph = crate::dsp::TAU * freq * i as f32 / sample_rate;
            s += x * ph.sin();
            c += x * ph.cos();
        }
        2.0 * (s * s + c * c).sqrt() / samples.len() as f32
    }

    /// Mean-crossing estimate of the dominant frequency.
    fn dominant_freq(samples: &[f32], sample_rate: f32) -> f32 {
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] - mean) <= 0.0 && (w[1] - mean) > 0.0)
            .count();
        crossings as f32 * sample_rate / samples.len() as f32
    }

    #[test]
    fn silent_until_play_arrives() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        let mut block = vec![0.0f32; 512 * 2];
        renderer.process_block(&mut block, 2);
        assert_eq!(energy(&block), 0.0);

        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            10.0, 10.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        renderer.process_block(&mut block, 2);
        assert!(energy(&block) > 0.01);
    }

    #[test]
    fn pause_silences_but_keeps_position() {
        let (mut renderer, mut tx, _tap, cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            10.0, 10.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        let mut block = vec![0.0f32; 512 * 2];
        renderer.process_block(&mut block, 2);
        let at_pause = cursor.elapsed_secs();
        assert!(at_pause > 0.0);

        tx.try_push(Command::Pause).unwrap();
        renderer.process_block(&mut block, 2);
        assert_eq!(energy(&block), 0.0);
        assert_eq!(cursor.elapsed_secs(), at_pause);

        tx.try_push(Command::Resume).unwrap();
        renderer.process_block(&mut block, 2);
        assert!(energy(&block) > 0.01);
        assert!(cursor.elapsed_secs() > at_pause);
    }

    #[test]
    fn completion_flags_once_and_goes_silent() {
        let (mut renderer, mut tx, _tap, cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            0.05, 10.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        let mut block = vec![0.0f32; 4096 * 2];
        renderer.process_block(&mut block, 2);
        assert!(cursor.completed());
        assert_eq!(cursor.phase_index(), 1);

        renderer.process_block(&mut block, 2);
        assert_eq!(energy(&block), 0.0);
        assert!(cursor.completed());
    }

    #[test]
    fn phase_boundary_has_no_click() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![
            PhaseData::fixed(0.5, 6.0, 210.0),
            PhaseData::fixed(0.5, 10.0, 320.0),
        ])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();

        let mut samples = Vec::new();
        let mut block = vec![0.0f32; 1024 * 2];
        for _ in 0..((SR as usize) / 1024 + 1) {
            renderer.process_block(&mut block, 2);
            samples.extend(block.chunks(2).map(|f| f[0]));
        }
        // Worst case slope for a 320 Hz carrier at half gain, plus margin
        // for the crossfade mix.
        let bound = crate::dsp::TAU * 320.0 / SR;
        let max_delta = samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_delta < bound * 1.5, "click of {max_delta} at boundary");
    }

    #[test]
    fn phase_index_tracks_the_boundary() {
        let (mut renderer, mut tx, _tap, cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![
            PhaseData::fixed(0.1, 10.0, 200.0),
            PhaseData::fixed(0.1, 8.0, 200.0),
        ])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        let mut block = vec![0.0f32; 2 * 2];
        let mut seen = Vec::new();
        for _ in 0..(SR as usize / 8) {
            renderer.process_block(&mut block, 2);
            seen.push(cursor.phase_index());
        }
        assert!(seen.contains(&0));
        assert!(seen.contains(&1));
        // Index never runs backwards.
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn stop_with_fade_ramps_down_then_resets() {
        let (mut renderer, mut tx, _tap, cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            10.0, 10.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        let mut block = vec![0.0f32; 1024 * 2];
        renderer.process_block(&mut block, 2);

        tx.try_push(Command::Stop { fade: true }).unwrap();
        let mut block = vec![0.0f32; 8192 * 2];
        renderer.process_block(&mut block, 2);
        // Faded region then hard silence after the reset.
        assert_eq!(energy(&block[block.len() - 1024..]), 0.0);
        assert_eq!(cursor.elapsed_secs(), 0.0);

        renderer.process_block(&mut block, 2);
        assert_eq!(energy(&block), 0.0);
    }

    #[test]
    fn stop_while_paused_halts_without_waiting_on_a_fade() {
        let (mut renderer, mut tx, _tap, cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            10.0, 10.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        let mut block = vec![0.0f32; 1024 * 2];
        renderer.process_block(&mut block, 2);

        tx.try_push(Command::Pause).unwrap();
        tx.try_push(Command::Stop { fade: true }).unwrap();
        renderer.process_block(&mut block, 2);
        assert_eq!(energy(&block), 0.0);
        assert_eq!(cursor.elapsed_secs(), 0.0);

        // Fully idle after the stop, so a fresh play starts clean.
        tx.try_push(Command::Play).unwrap();
        renderer.process_block(&mut block, 2);
        assert!(energy(&block) > 0.01);
    }

    #[test]
    fn crossfade_straddles_the_phase_boundary() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![
            PhaseData::fixed(1.0, 0.0, 200.0),
            PhaseData::fixed(1.0, 0.0, 300.0),
        ])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();

        let mut left = Vec::new();
        let mut block = vec![0.0f32; 1024 * 2];
        while left.len() < (SR as usize) * 2 {
            renderer.process_block(&mut block, 2);
            left.extend(block.chunks(2).map(|f| f[0]));
        }

        // 1920 samples hold 8 cycles at 200 Hz and 12 at 300 Hz.
        let win = 1920;
        let boundary = SR as usize;
        let amp = |start: usize, freq: f32| tone_amp(&left[start..start + win], freq, SR);

        // Each side of the edge carries the other side's tone.
        assert!(
            amp(boundary - win, 300.0) > 0.05,
            "incoming tone missing before the edge"
        );
        assert!(
            amp(boundary, 200.0) > 0.05,
            "outgoing tail missing after the edge"
        );
        // Well clear of the fade window the foreign tones are gone.
        assert!(amp(boundary - 5 * win, 300.0) < 0.02);
        assert!(amp(boundary + 4 * win, 200.0) < 0.02);
    }

    #[test]
    fn volume_changes_glide_instead_of_stepping() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            10.0, 0.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();
        let mut block = vec![0.0f32; 4096 * 2];
        renderer.process_block(&mut block, 2);

        tx.try_push(Command::SetVolume(0.0)).unwrap();
        renderer.process_block(&mut block, 2);
        let first: Vec<f32> = block.chunks(2).map(|f| f[0]).collect();
        let max_delta = first
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_delta < 0.05, "volume step of {max_delta}");
        // Later blocks approach silence.
        for _ in 0..20 {
            renderer.process_block(&mut block, 2);
        }
        assert!(energy(&block) < 1e-4);
    }

    #[test]
    fn output_mode_switch_changes_channel_preference() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        assert_eq!(renderer.preferred_channels(), 2);
        tx.try_push(Command::SetOutputMode(OutputMode::Surround51))
            .unwrap();
        let mut block = vec![0.0f32; 64 * 6];
        renderer.process_block(&mut block, 6);
        assert_eq!(renderer.preferred_channels(), 6);
    }

    #[test]
    fn pitch_override_shifts_the_rendered_carrier() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![PhaseData::fixed(
            10.0, 0.0, 200.0,
        )])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();

        let mut block = vec![0.0f32; (SR as usize) * 2];
        renderer.process_block(&mut block, 2);
        let before: Vec<f32> = block.chunks(2).map(|f| f[0]).collect();
        assert!((dominant_freq(&before, SR) - 200.0).abs() < 2.0);

        tx.try_push(Command::SetOverrides(ManualOverrides::new(1200.0, 0.0, 1.0)))
            .unwrap();
        renderer.process_block(&mut block, 2);
        let after: Vec<f32> = block.chunks(2).map(|f| f[0]).collect();
        assert!((dominant_freq(&after, SR) - 400.0).abs() < 2.0);
    }

    #[test]
    fn beat_frequency_transitions_across_the_boundary() {
        let (mut renderer, mut tx, _tap, _cursor) = rig();
        tx.try_push(Command::Load(timeline(vec![
            PhaseData::fixed(2.0, 10.0, 200.0),
            PhaseData::fixed(2.0, 4.0, 200.0),
        ])))
        .unwrap();
        tx.try_push(Command::Play).unwrap();

        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut block = vec![0.0f32; 1024 * 2];
        while left.len() < (SR as usize) * 4 {
            renderer.process_block(&mut block, 2);
            for f in block.chunks(2) {
                left.push(f[0]);
                right.push(f[1]);
            }
        }

        let second = SR as usize;
        let early = dominant_freq(&right[..second], SR) - dominant_freq(&left[..second], SR);
        let late = dominant_freq(&right[3 * second..4 * second], SR)
            - dominant_freq(&left[3 * second..4 * second], SR);
        assert!((early - 10.0).abs() < 1.5, "early beat {early}");
        assert!((late - 4.0).abs() < 1.5, "late beat {late}");
    }

    #[test]
    fn offline_render_covers_the_whole_timeline() {
        let tl = timeline(vec![
            PhaseData::fixed(0.1, 10.0, 200.0),
            PhaseData::fixed(0.1, 6.0, 250.0),
        ]);
        let mut frames = 0u64;
        let mut total = 0.0f32;
        render_offline(Arc::clone(&tl), SR, &EngineConfig::default(), |l, r| {
            frames += 1;
            total += l * l + r * r;
        });
        let expected = (tl.total_duration() * SR as f64) as u64;
        assert_eq!(frames, expected);
        assert!(total > 1.0);
    }
}
