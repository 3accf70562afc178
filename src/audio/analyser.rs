//! Frequency-domain analysis path for the volume meter
//!
//! Mirrors what a browser analyser node reports: a Blackman-windowed FFT over
//! the most recent `fft_size` samples, smoothed over time and mapped from
//! decibels onto byte bins. The volume is the mean of those bins.
//!
//! The spectrum advances once per pushed frame. Reads never touch the
//! smoothing state, so any number of readers see the same value.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use super::device::AudioFrame;
use crate::config::CaptureConfig;

/// Largest value a frequency bin can hold
pub const MAX_BIN_VALUE: u8 = u8::MAX;

/// Volume from byte frequency bins: mean / max bin value, as a percentage
pub fn volume_from_bins(bins: &[u8]) -> u8 {
    if bins.is_empty() {
        return 0;
    }

    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let average = sum as f64 / bins.len() as f64;
    let volume = (average / MAX_BIN_VALUE as f64 * 100.0).clamp(0.0, 100.0);

    volume.round() as u8
}

pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    /// Most recent time-domain samples, mono, in [-1, 1]
    history: VecDeque<f32>,
    /// Smoothed magnitudes as of the last pushed frame
    smoothed: Vec<f32>,
    bins: Vec<u8>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl Analyser {
    pub fn new(config: &CaptureConfig) -> Self {
        let fft_size = config.fft_size.max(32).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window: blackman(fft_size),
            history: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
            bins: vec![0; fft_size / 2],
            smoothing: config.smoothing.clamp(0.0, 0.999),
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    /// Number of frequency bins (half the FFT size)
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Feed a captured frame; multi-channel frames are averaged to mono
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        let channels = frame.channels.max(1) as usize;
        for group in frame.samples.chunks(channels) {
            let sum: f32 = group.iter().map(|&s| s as f32 / i16::MAX as f32).sum();
            self.push_sample(sum / group.len() as f32);
        }
        self.update_spectrum();
    }

    fn push_sample(&mut self, sample: f32) {
        if self.history.len() == self.fft_size {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }

    fn update_spectrum(&mut self) {
        let mut buffer: Vec<Complex<f32>> = self
            .history
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let scale = 1.0 / self.fft_size as f32;
        let range = (self.max_decibels - self.min_decibels).max(f32::EPSILON);

        for ((previous, out), bin) in self.smoothed.iter_mut().zip(&mut self.bins).zip(&buffer) {
            let magnitude = bin.norm() * scale;
            *previous = self.smoothing * *previous + (1.0 - self.smoothing) * magnitude;

            let db = if *previous > 0.0 {
                20.0 * previous.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = MAX_BIN_VALUE as f32 * (db - self.min_decibels) / range;
            *out = scaled.clamp(0.0, MAX_BIN_VALUE as f32) as u8;
        }
    }

    /// Byte frequency data as of the last pushed frame
    pub fn byte_frequency_data(&self) -> &[u8] {
        &self.bins
    }

    /// Instantaneous loudness in [0, 100]
    pub fn volume(&self) -> u8 {
        volume_from_bins(&self.bins)
    }

    /// Drop buffered samples and smoothing state
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
        self.bins.iter_mut().for_each(|b| *b = 0);
    }
}

fn blackman(size: usize) -> Vec<f32> {
    let alpha = 0.16;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;

    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_volume_from_silent_bins() {
        assert_eq!(volume_from_bins(&[0; 1024]), 0);
    }

    #[test]
    fn test_volume_from_saturated_bins() {
        assert_eq!(volume_from_bins(&[MAX_BIN_VALUE; 1024]), 100);
    }

    #[test]
    fn test_volume_rounds_to_nearest() {
        // mean 128 -> 50.196 -> 50
        assert_eq!(volume_from_bins(&[128; 4]), 50);
        // mean 129.5 -> 50.78 -> 51
        assert_eq!(volume_from_bins(&[129, 130]), 51);
        assert_eq!(volume_from_bins(&[]), 0);
    }

    #[test]
    fn test_analyser_silence_reads_zero() {
        let mut analyser = Analyser::new(&CaptureConfig::default());
        analyser.push_frame(&frame(vec![0; 4096]));
        assert_eq!(analyser.bin_count(), 1024);
        assert_eq!(analyser.volume(), 0);
    }

    /// Deterministic full-scale pseudo-noise
    fn loud_noise(len: usize) -> Vec<i16> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                if state & 1 == 0 { i16::MAX } else { i16::MIN + 1 }
            })
            .collect()
    }

    #[test]
    fn test_analyser_loud_noise_reads_above_zero() {
        let config = CaptureConfig {
            smoothing: 0.0,
            ..Default::default()
        };
        let mut analyser = Analyser::new(&config);
        analyser.push_frame(&frame(loud_noise(2048)));

        let volume = analyser.volume();
        assert!(volume > 50, "full-scale noise should read loud, got {}", volume);
        assert!(volume <= 100);
    }

    #[test]
    fn test_reads_do_not_advance_smoothing() {
        let mut analyser = Analyser::new(&CaptureConfig::default());
        analyser.push_frame(&frame(loud_noise(2048)));

        let first = analyser.volume();
        let bins = analyser.byte_frequency_data().to_vec();
        for _ in 0..50 {
            assert_eq!(analyser.volume(), first);
        }
        assert_eq!(analyser.byte_frequency_data(), bins.as_slice());
        assert!(first > 0);

        // Only new input moves the smoothed spectrum
        analyser.push_frame(&frame(loud_noise(2048)));
        assert!(analyser.volume() >= first);
    }

    #[test]
    fn test_reset_clears_history() {
        let config = CaptureConfig {
            smoothing: 0.0,
            ..Default::default()
        };
        let mut analyser = Analyser::new(&config);
        analyser.push_frame(&frame(vec![i16::MAX; 2048]));
        analyser.reset();
        assert_eq!(analyser.volume(), 0);
    }
}
