use super::color::Rgb;
use super::pulse::{Pulse, PulseParams};

/// Simulation state for one output zone.
///
/// `previous` is the only memory carried between frames besides the live
/// pulses; after every step it holds the clamped output for that step.
#[derive(Clone, Debug)]
pub struct ZoneState {
    pulses: Vec<Pulse>,
    previous: Vec<Rgb>,
    scratch: Vec<Rgb>,
}

impl ZoneState {
    pub fn new(element_count: usize) -> Self {
        Self {
            pulses: Vec::new(),
            previous: vec![Rgb::BLACK; element_count],
            scratch: vec![Rgb::BLACK; element_count],
        }
    }

    #[cfg(test)]
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Current output: the clamped buffer from the latest step
    pub fn colors(&self) -> &[Rgb] {
        &self.previous
    }

    pub fn push(&mut self, pulse: Pulse) {
        self.pulses.push(pulse);
    }

    /// Advance, cull, composite, and blend with the decayed previous frame
    pub fn step(&mut self, dt: f32, params: &PulseParams) -> &[Rgb] {
        let n = self.previous.len();
        let width = params.width;
        let upper = n as f32 + width;

        for pulse in &mut self.pulses {
            pulse.position += params.speed * dt;
        }
        self.pulses
            .retain(|p| p.position >= -width && p.position <= upper);

        self.scratch.fill(Rgb::BLACK);
        if n > 0 {
            for pulse in &self.pulses {
                if pulse.amplitude <= 0.0 {
                    continue;
                }
                // Only elements strictly inside the triangle can receive light
                let lo = (pulse.position - width).ceil().max(0.0) as usize;
                let hi = ((pulse.position + width).floor().max(0.0) as usize).min(n - 1);
                for i in lo..=hi {
                    let brightness = pulse.intensity_at(i as f32, width) * pulse.amplitude;
                    if brightness > 0.0 {
                        self.scratch[i] = self.scratch[i] + pulse.color * brightness;
                    }
                }
            }
        }

        for (prev, fresh) in self.previous.iter_mut().zip(&self.scratch) {
            *prev = fresh.max(*prev * params.decay).clamped();
        }

        &self.previous
    }
}
