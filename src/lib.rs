//! Phase-sequenced binaural and isochronic session engine.
//!
//! A protocol is a list of timed phases, each describing a beat/carrier
//! pair plus optional noise, overlay and modulation layers. The engine
//! compiles the protocol into an immutable timeline, synthesizes it inside
//! the platform audio callback, and exposes a transport with observer
//! telemetry on the control side.

pub mod command;
pub mod config;
pub mod dsp;
pub mod error;
pub mod models;
pub mod noise;
pub mod output;
pub mod params;
pub mod renderer;
pub mod tap;
pub mod timeline;
pub mod transport;
pub mod voices;

#[cfg(not(target_arch = "wasm32"))]
pub mod audio_io;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

pub use crate::config::EngineConfig;
pub use crate::error::EngineError;
pub use crate::models::{NoiseColor, PhaseData, ProtocolData, SpatialMotion};
pub use crate::output::OutputMode;
pub use crate::params::ManualOverrides;
pub use crate::timeline::CompiledTimeline;
pub use crate::transport::{EngineObserver, PlaybackState, SubscriptionId, Tick, Transport};

use crate::renderer::{SessionRenderer, SharedCursor};
use crate::tap::Tap;

/// Default rate assumed until the audio device reports its own.
const FALLBACK_SAMPLE_RATE: u32 = 48_000;

/// Top-level handle tying the render and control domains together.
///
/// Construction is silent; nothing touches the audio device until
/// [`Engine::unlock`] runs, typically from the first user gesture.
pub struct Engine {
    renderer: Arc<Mutex<SessionRenderer>>,
    transport: Arc<Transport>,
    tap: Mutex<Tap>,
    shutdown: Arc<AtomicBool>,
    sink_started: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(config::CONFIG.clone())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let (tx, rx) = command::channel(1024);
        let (tap_writer, tap) = tap::tap(config.tap_frames);
        let cursor = SharedCursor::new(FALLBACK_SAMPLE_RATE);
        let renderer = Arc::new(Mutex::new(SessionRenderer::new(
            FALLBACK_SAMPLE_RATE as f32,
            &config,
            rx,
            tap_writer,
            Arc::clone(&cursor),
        )));
        let transport = Arc::new(Transport::new(
            tx,
            cursor,
            Duration::from_millis(config.sink_fault_grace_ms),
        ));
        let shutdown = Arc::new(AtomicBool::new(false));

        let ticker = {
            let transport = Arc::clone(&transport);
            let shutdown = Arc::clone(&shutdown);
            let interval = Duration::from_secs_f32(1.0 / config.tick_hz.max(1.0));
            std::thread::spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    transport.poll();
                    std::thread::sleep(interval);
                }
            })
        };

        Self {
            renderer,
            transport,
            tap: Mutex::new(tap),
            shutdown,
            sink_started: AtomicBool::new(false),
            ticker: Mutex::new(Some(ticker)),
        }
    }

    /// Acquire the platform audio output. Idempotent; later calls return
    /// immediately once a sink is running.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn unlock(&self) -> Result<(), EngineError> {
        if self
            .sink_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let result = audio_io::start_output_stream(
            Arc::clone(&self.renderer),
            Arc::clone(&self.shutdown),
        );
        if result.is_err() {
            self.sink_started.store(false, Ordering::SeqCst);
        }
        result
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn load_protocol(&self, protocol: &ProtocolData) -> Result<(), EngineError> {
        self.transport.load_protocol(protocol)
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.transport.play()
    }

    pub fn pause(&self) {
        self.transport.pause()
    }

    pub fn resume(&self) {
        self.transport.resume()
    }

    pub fn stop(&self) {
        self.transport.stop()
    }

    pub fn stop_immediate(&self) {
        self.transport.stop_immediate()
    }

    pub fn restart(&self) -> Result<(), EngineError> {
        self.transport.restart()
    }

    pub fn set_volume(&self, volume: f32) {
        self.transport.set_volume(volume)
    }

    pub fn set_output_mode(&self, mode: OutputMode) {
        self.transport.set_output_mode(mode)
    }

    pub fn update_manual_overrides(&self, overrides: ManualOverrides) -> ManualOverrides {
        self.transport.update_manual_overrides(overrides)
    }

    pub fn state(&self) -> PlaybackState {
        self.transport.state()
    }

    pub fn subscribe(&self, observer: Box<dyn EngineObserver>) -> SubscriptionId {
        self.transport.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.transport.unsubscribe(id)
    }

    /// Latest rendered samples for a waveform view.
    pub fn waveform(&self, n: usize) -> Vec<f32> {
        self.tap.lock().waveform(n)
    }

    /// Magnitude spectrum of the latest rendered samples.
    pub fn spectrum(&self, n: usize) -> Vec<f32> {
        self.tap.lock().spectrum(n)
    }

    /// Render domain handle, shared with the audio callback.
    pub fn renderer(&self) -> &Arc<Mutex<SessionRenderer>> {
        &self.renderer
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.ticker.lock().take() {
            let _ = handle.join();
        }
    }
}
