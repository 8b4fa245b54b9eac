use std::collections::VecDeque;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Render-side half of the visualization tap.
///
/// Frames are pushed after post-processing, from the mixed stereo pair.
/// When the consumer falls behind the push silently drops; the audio
/// callback must never wait on the UI side.
pub struct TapWriter {
    prod: HeapProd<(f32, f32)>,
}

impl TapWriter {
    pub fn push(&mut self, l: f32, r: f32) {
        let _ = self.prod.try_push((l, r));
    }
}

/// Control-side half: drains the queue into a bounded history buffer and
/// serves waveform and spectrum snapshots from it.
pub struct Tap {
    cons: HeapCons<(f32, f32)>,
    history: VecDeque<f32>,
    capacity: usize,
}

pub fn tap(capacity: usize) -> (TapWriter, Tap) {
    let (prod, cons) = HeapRb::<(f32, f32)>::new(capacity.max(64)).split();
    (
        TapWriter { prod },
        Tap {
            cons,
            history: VecDeque::with_capacity(capacity.max(64)),
            capacity: capacity.max(64),
        },
    )
}

impl Tap {
    fn drain(&mut self) {
        while let Some((l, r)) = self.cons.try_pop() {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(0.5 * (l + r));
        }
    }

    /// Most recent `n` mono samples, zero-padded on the left when the
    /// history is still filling.
    pub fn waveform(&mut self, n: usize) -> Vec<f32> {
        self.drain();
        let mut out = vec![0.0; n];
        let have = self.history.len().min(n);
        let start = self.history.len() - have;
        for (dst, src) in out[n - have..].iter_mut().zip(self.history.range(start..)) {
            *dst = *src;
        }
        out
    }

    /// Magnitude spectrum of the latest `n` samples, Hann windowed.
    /// Returns `n / 2` bins; bin k is centered at `k * sample_rate / n`.
    pub fn spectrum(&mut self, n: usize) -> Vec<f32> {
        let samples = self.waveform(n);
        let mut buf: Vec<Complex<f32>> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let w = 0.5
                    * (1.0 - (std::f32::consts::TAU * i as f32 / n.max(1) as f32).cos());
                Complex::new(s * w, 0.0)
            })
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        planner.plan_fft_forward(n).process(&mut buf);
        let norm = 2.0 / n.max(1) as f32;
        buf.iter().take(n / 2).map(|c| c.norm() * norm).collect()
    }
}
