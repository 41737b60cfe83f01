pub mod color;
pub mod pulse;
pub mod spawner;
pub mod zone;

use crate::audio::features::{FeatureExtractor, FeatureFrame};
use crate::audio::slot::SampleBlock;
use crate::config::ShowSettings;
use crate::sink::ZoneInfo;
use pulse::PulseParams;
use spawner::Spawner;
use zone::ZoneState;

/// What happened during one scheduler tick
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub features: FeatureFrame,
    pub spawned: bool,
}

/// The whole audio-to-light simulation: feature extraction, pulse spawning,
/// and every zone's pulse physics.
pub struct Show {
    extractor: FeatureExtractor,
    spawner: Spawner,
    zones: Vec<ZoneState>,
    pulse: PulseParams,
    substeps: u32,
    frame_dt: f32,
    substep_dt: f32,
}

impl Show {
    pub fn new(settings: &ShowSettings, block_size: usize, zones: &[ZoneInfo]) -> Self {
        Self {
            extractor: FeatureExtractor::new(block_size, settings.sensitivity),
            spawner: Spawner::new(settings.spawn_interval, settings.hue_cycle_speed),
            zones: zones
                .iter()
                .map(|z| ZoneState::new(z.element_count))
                .collect(),
            pulse: settings.pulse,
            substeps: settings.substeps,
            frame_dt: settings.frame_dt(),
            substep_dt: settings.substep_dt(),
        }
    }

    pub fn zones(&self) -> &[ZoneState] {
        &self.zones
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    /// Run one frame. `now` is seconds since start; `block` is the fresh
    /// audio block for this tick, if one arrived.
    pub fn tick(&mut self, now: f64, block: Option<&SampleBlock>) -> TickReport {
        let phase = self.spawner.advance_phase(self.frame_dt);
        let features = self.extractor.extract(block, phase);

        let spawned = match self.spawner.poll(now, &features) {
            Some(pulse) => {
                for zone in &mut self.zones {
                    zone.push(pulse);
                }
                true
            }
            None => false,
        };

        // Simulation stays on the loop thread; only audio runs alongside
        for zone in &mut self.zones {
            for _ in 0..self.substeps {
                zone.step(self.substep_dt, &self.pulse);
            }
        }

        TickReport { features, spawned }
    }
}
