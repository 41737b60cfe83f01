use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::slot::SampleBlock;

/// Per-tick audio features driving the pulse spawner
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeatureFrame {
    /// Peak loudness after sensitivity gain (0.0-1.0)
    pub envelope: f32,
    /// Dominant-bin ratio shaped by the hue phase (0.0-1.0)
    pub hue_norm: f32,
}

/// Envelope and dominant-bin hue from one block.
///
/// All buffers are sized once from `block_size`; `extract` does not allocate.
pub struct FeatureExtractor {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    mono: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    sensitivity: f32,
}

impl FeatureExtractor {
    pub fn new(block_size: usize, sensitivity: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(block_size);

        Self {
            fft,
            window: hann_window(block_size),
            mono: Vec::with_capacity(block_size),
            spectrum: vec![Complex::new(0.0, 0.0); block_size],
            magnitudes: vec![0.0; block_size / 2 + 1],
            sensitivity,
        }
    }

    /// Number of real-spectrum bins (block_size / 2 + 1)
    pub fn bins(&self) -> usize {
        self.magnitudes.len()
    }

    /// Features for this tick. A missing block is not an error: it yields
    /// silence (envelope 0, hue 0).
    pub fn extract(&mut self, block: Option<&SampleBlock>, hue_phase: f32) -> FeatureFrame {
        let Some(block) = block else {
            return FeatureFrame::default();
        };

        self.mono.clear();
        self.mono.extend(block.mono());

        let peak = self.mono.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let envelope = (peak * self.sensitivity).clamp(0.0, 1.0);

        self.spectrum_of_mono();
        let ratio = self.dominant_bin() as f32 / (self.bins() - 1).max(1) as f32;

        FeatureFrame {
            envelope,
            hue_norm: ratio.powf(hue_phase).clamp(0.0, 1.0),
        }
    }

    fn spectrum_of_mono(&mut self) {
        let n = self.spectrum.len();
        for (i, slot) in self.spectrum.iter_mut().enumerate() {
            let sample = self.mono.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.spectrum);

        // Real input: bins above n/2 mirror the lower half
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.spectrum[..n / 2 + 1]) {
            *mag = c.norm();
        }
    }

    /// First bin holding the largest magnitude
    fn dominant_bin(&self) -> usize {
        let mut best = 0;
        for (i, &m) in self.magnitudes.iter().enumerate() {
            if m > self.magnitudes[best] {
                best = i;
            }
        }
        best
    }
}

/// Symmetric Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
