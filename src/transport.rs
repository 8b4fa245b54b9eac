use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ringbuf::traits::Producer;

use crate::command::{Command, CommandSender};
use crate::error::EngineError;
use crate::models::ProtocolData;
use crate::output::OutputMode;
use crate::params::ManualOverrides;
use crate::renderer::SharedCursor;
use crate::timeline::CompiledTimeline;

/// Control-domain playback state. The render side keeps its own flags;
/// this is the externally visible machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Telemetry snapshot delivered to observers on every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub total_elapsed: f64,
    pub phase_elapsed: f64,
    pub phase_index: usize,
}

/// Callbacks for session progress. Delivered from the tick thread, never
/// from the audio callback, so observers may block briefly.
pub trait EngineObserver: Send {
    fn on_tick(&self, _tick: Tick) {}
    fn on_complete(&self) {}
    /// The output sink stayed faulted past the grace window and playback
    /// was stopped.
    fn on_fault(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct ControlState {
    state: PlaybackState,
    timeline: Option<Arc<CompiledTimeline>>,
    volume: f32,
    output_mode: OutputMode,
    overrides: ManualOverrides,
}

/// Control-domain face of the engine.
///
/// Methods mutate local state under a short lock and push a command to the
/// render side; nothing here waits on the audio callback.
pub struct Transport {
    inner: Mutex<ControlState>,
    commands: Mutex<CommandSender>,
    cursor: Arc<SharedCursor>,
    subscribers: Mutex<HashMap<u64, Box<dyn EngineObserver>>>,
    next_subscription: AtomicU64,
    completion_notified: AtomicBool,
    fault_grace: Duration,
    fault_notified: AtomicBool,
}

impl Transport {
    pub fn new(commands: CommandSender, cursor: Arc<SharedCursor>, fault_grace: Duration) -> Self {
        Self {
            inner: Mutex::new(ControlState {
                state: PlaybackState::Idle,
                timeline: None,
                volume: 1.0,
                output_mode: OutputMode::Headphones,
                overrides: ManualOverrides::default(),
            }),
            commands: Mutex::new(commands),
            cursor,
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            completion_notified: AtomicBool::new(false),
            fault_grace,
            fault_notified: AtomicBool::new(false),
        }
    }

    fn send(&self, cmd: Command) {
        if self.commands.lock().try_push(cmd).is_err() {
            tracing::warn!("render command queue full; command dropped");
        }
    }

    /// Validate and hand a protocol to the render side. A rejected
    /// protocol leaves any previously loaded one untouched.
    pub fn load_protocol(&self, protocol: &ProtocolData) -> Result<(), EngineError> {
        let timeline = Arc::new(CompiledTimeline::compile(protocol)?);
        let mut inner = self.inner.lock();
        inner.timeline = Some(Arc::clone(&timeline));
        inner.state = PlaybackState::Idle;
        inner.overrides = ManualOverrides::default();
        drop(inner);
        tracing::info!(
            protocol = %protocol.id,
            phases = protocol.phases.len(),
            "protocol loaded"
        );
        self.send(Command::Load(timeline));
        Ok(())
    }

    /// Start from the beginning, or resume when paused.
    pub fn play(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        match inner.state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                inner.state = PlaybackState::Playing;
                drop(inner);
                self.send(Command::Resume);
                Ok(())
            }
            PlaybackState::Idle | PlaybackState::Stopped => {
                if inner.timeline.is_none() {
                    return Err(EngineError::NoProtocolLoaded);
                }
                inner.state = PlaybackState::Playing;
                drop(inner);
                self.send(Command::Play);
                Ok(())
            }
        }
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Playing {
            inner.state = PlaybackState::Paused;
            drop(inner);
            self.send(Command::Pause);
        }
    }

    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Paused {
            inner.state = PlaybackState::Playing;
            drop(inner);
            self.send(Command::Resume);
        }
    }

    /// Graceful stop with a short fade. Manual overrides reset to neutral
    /// so the next run starts from the protocol's nominal values.
    pub fn stop(&self) {
        self.stop_inner(true);
    }

    /// Hard stop without the fade.
    pub fn stop_immediate(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, fade: bool) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, PlaybackState::Playing | PlaybackState::Paused) {
            inner.state = PlaybackState::Stopped;
            inner.overrides = ManualOverrides::default();
            drop(inner);
            self.send(Command::Stop { fade });
            self.send(Command::SetOverrides(ManualOverrides::default()));
        }
    }

    /// Jump back to the top of the loaded protocol.
    pub fn restart(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.timeline.is_none() {
            return Err(EngineError::NoProtocolLoaded);
        }
        inner.state = PlaybackState::Playing;
        drop(inner);
        self.send(Command::Stop { fade: false });
        self.send(Command::Play);
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.lock().volume = volume;
        self.send(Command::SetVolume(volume));
    }

    pub fn set_output_mode(&self, mode: OutputMode) {
        self.inner.lock().output_mode = mode;
        self.send(Command::SetOutputMode(mode));
    }

    /// Apply live overrides, clamped to their documented ranges. Returns
    /// the values actually applied.
    pub fn update_manual_overrides(&self, overrides: ManualOverrides) -> ManualOverrides {
        let clamped = overrides.clamped();
        self.inner.lock().overrides = clamped;
        self.send(Command::SetOverrides(clamped));
        clamped
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn output_mode(&self) -> OutputMode {
        self.inner.lock().output_mode
    }

    pub fn manual_overrides(&self) -> ManualOverrides {
        self.inner.lock().overrides
    }

    pub fn timeline(&self) -> Option<Arc<CompiledTimeline>> {
        self.inner.lock().timeline.clone()
    }

    pub fn subscribe(&self, observer: Box<dyn EngineObserver>) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, observer);
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().remove(&id.0);
    }

    /// One telemetry cycle: publish a tick while playing and fire the
    /// completion callback the first time the render side reports done.
    /// The tick thread calls this on its clock; tests call it directly.
    pub fn poll(&self) {
        // A fault that outlives the grace window means the callback is no
        // longer running; stop so the session does not silently hang. The
        // render side clears the flag whenever a callback fires, which
        // re-arms the latch here.
        match self.cursor.fault_age() {
            Some(age) if age >= self.fault_grace => {
                if !self.fault_notified.swap(true, Ordering::Relaxed) {
                    self.inner.lock().state = PlaybackState::Stopped;
                    self.send(Command::Stop { fade: false });
                    let subscribers = self.subscribers.lock();
                    for observer in subscribers.values() {
                        observer.on_fault();
                    }
                    tracing::warn!(?age, "output sink fault persisted; session stopped");
                }
                return;
            }
            _ => self.fault_notified.store(false, Ordering::Relaxed),
        }

        // The latch re-arms only once the render side has cleared its
        // completion flag, so a replay never double-fires.
        if !self.cursor.completed() {
            self.completion_notified.store(false, Ordering::Relaxed);
        } else if !self.completion_notified.swap(true, Ordering::Relaxed) {
            self.inner.lock().state = PlaybackState::Stopped;
            let subscribers = self.subscribers.lock();
            for observer in subscribers.values() {
                observer.on_complete();
            }
            tracing::info!("session complete");
            return;
        }

        let (state, timeline) = {
            let inner = self.inner.lock();
            (inner.state, inner.timeline.clone())
        };
        if state != PlaybackState::Playing {
            return;
        }
        let Some(timeline) = timeline else { return };

        let total_elapsed = self.cursor.elapsed_secs();
        let phase_index = self.cursor.phase_index().min(timeline.len() - 1);
        let phase_elapsed = total_elapsed - timeline.phase(phase_index).start_offset;
        let tick = Tick {
            total_elapsed,
            phase_elapsed: phase_elapsed.max(0.0),
            phase_index,
        };
        let subscribers = self.subscribers.lock();
        for observer in subscribers.values() {
            observer.on_tick(tick);
        }
    }
}
