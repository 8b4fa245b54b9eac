use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam::channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::renderer::SessionRenderer;

/// Open the default output device and run the render callback on it.
///
/// The stream itself cannot cross threads, so it lives entirely on a
/// dedicated thread; the startup result comes back over a channel and the
/// stream is held until `shutdown` flips.
pub fn start_output_stream(
    renderer: Arc<Mutex<SessionRenderer>>,
    shutdown: Arc<AtomicBool>,
) -> Result<(), EngineError> {
    let (tx, rx) = bounded::<Result<(), EngineError>>(1);

    std::thread::spawn(move || {
        let stream = match build_stream(&renderer) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = tx.send(Err(EngineError::AudioSinkUnavailable(e.to_string())));
            return;
        }
        let _ = tx.send(Ok(()));

        while !shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));
        }
        drop(stream);
    });

    rx.recv()
        .unwrap_or_else(|_| Err(EngineError::AudioSinkUnavailable("audio thread exited".into())))
}

fn build_stream(renderer: &Arc<Mutex<SessionRenderer>>) -> Result<cpal::Stream, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::AudioSinkUnavailable("no output device".into()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::AudioSinkUnavailable(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;

    renderer.lock().set_sample_rate(config.sample_rate.0 as f32);
    tracing::info!(
        sample_rate = config.sample_rate.0,
        channels,
        "output stream opening"
    );

    let cb_renderer = Arc::clone(renderer);
    let audio_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        cb_renderer.lock().process_block(data, channels);
    };
    // Faults land on the shared cursor; the transport stops the session
    // if no callback clears them within the grace window.
    let fault_cursor = renderer.lock().cursor();
    let err_fn = move |err| {
        fault_cursor.report_fault();
        tracing::warn!(%err, "output stream error");
    };

    match sample_format {
        SampleFormat::F32 => device
            .build_output_stream(&config, audio_callback, err_fn, None)
            .map_err(|e| EngineError::AudioSinkUnavailable(e.to_string())),
        other => Err(EngineError::AudioSinkUnavailable(format!(
            "unsupported sample format {other}"
        ))),
    }
}
