use crate::audio::features::FeatureFrame;

use super::color::Rgb;
use super::pulse::Pulse;

/// Process-wide timing state shared by the spawner and the feature extractor
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GlobalClock {
    /// Exponent applied to the dominant-bin ratio, always in [0, 1)
    pub hue_phase: f32,
    /// Seconds since start of the last scheduled spawn slot
    pub last_spawn: f64,
}

/// Emits one pulse per `interval` seconds, on a fixed grid anchored at start.
pub struct Spawner {
    interval: f64,
    hue_cycle_speed: f32,
    clock: GlobalClock,
    spawned: u64,
}

impl Spawner {
    pub fn new(interval: f64, hue_cycle_speed: f32) -> Self {
        Self {
            interval,
            hue_cycle_speed,
            clock: GlobalClock::default(),
            spawned: 0,
        }
    }

    pub fn hue_phase(&self) -> f32 {
        self.clock.hue_phase
    }

    /// Advance the hue phase by one frame. Independent of spawning.
    pub fn advance_phase(&mut self, frame_dt: f32) -> f32 {
        let next = (self.clock.hue_phase + self.hue_cycle_speed * frame_dt).rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs
        self.clock.hue_phase = if next >= 1.0 { 0.0 } else { next };
        self.clock.hue_phase
    }

    /// Returns a pulse when `now` (seconds since start) has reached the next
    /// spawn slot. The slot advances by exactly one interval per spawn.
    pub fn poll(&mut self, now: f64, features: &FeatureFrame) -> Option<Pulse> {
        if now - self.clock.last_spawn < self.interval {
            return None;
        }
        self.clock.last_spawn += self.interval;
        self.spawned += 1;

        let color = Rgb::from_hue(features.hue_norm);
        log::trace!(
            "spawn #{} at {:.4}s: env={:.3} hue={:.3}",
            self.spawned,
            now,
            features.envelope,
            features.hue_norm
        );
        Some(Pulse::spawn(features.envelope, color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(envelope: f32, hue_norm: f32) -> FeatureFrame {
        FeatureFrame {
            envelope,
            hue_norm,
        }
    }

    #[test]
    fn no_spawn_before_first_interval() {
        let mut spawner = Spawner::new(0.05, 0.25);
        assert!(spawner.poll(0.0, &frame(1.0, 0.0)).is_none());
        assert!(spawner.poll(0.049, &frame(1.0, 0.0)).is_none());
        assert!(spawner.poll(0.05, &frame(1.0, 0.0)).is_some());
        assert!((spawner.clock.last_spawn - 0.05).abs() < 1e-12);
    }

    #[test]
    fn pulse_carries_envelope_and_hue() {
        let mut spawner = Spawner::new(0.1, 0.0);
        let pulse = spawner.poll(0.1, &frame(0.7, 1.0 / 3.0)).expect("spawn");
        assert_eq!(pulse.position, 0.0);
        assert!((pulse.amplitude - 0.7).abs() < 1e-6);
        assert!(pulse.color.g > 0.99 && pulse.color.r < 1e-5 && pulse.color.b < 1e-5);
    }

    #[test]
    fn cadence_does_not_drift_under_jitter() {
        let interval = 0.05;
        let mut spawner = Spawner::new(interval, 0.25);
        let features = frame(0.5, 0.2);

        // Irregular ticks averaging ~5.6 ms
        let jitter = [0.0031, 0.0072, 0.0049, 0.0088, 0.0025, 0.0066, 0.0057];
        let mut now = 0.0;
        let mut count = 0u64;
        let mut i = 0;
        while now < 10.0 {
            now += jitter[i % jitter.len()];
            i += 1;
            if spawner.poll(now, &features).is_some() {
                count += 1;
            }
        }

        let expected = (now / interval).floor() as i64;
        assert!((count as i64 - expected).abs() <= 1, "{count} vs {expected}");
        assert_eq!(spawner.spawned, count);
    }

    #[test]
    fn stalled_loop_catches_up_one_per_tick() {
        let mut spawner = Spawner::new(0.1, 0.0);
        let features = frame(0.0, 0.0);
        // 0.35s stall: three slots owed
        assert!(spawner.poll(0.35, &features).is_some());
        assert!(spawner.poll(0.36, &features).is_some());
        assert!(spawner.poll(0.37, &features).is_some());
        assert!(spawner.poll(0.38, &features).is_none());
    }

    #[test]
    fn hue_phase_wraps() {
        let mut spawner = Spawner::new(0.05, 0.25);
        for _ in 0..1000 {
            let phase = spawner.advance_phase(1.0 / 60.0);
            assert!((0.0..1.0).contains(&phase));
        }
        // 1000 frames at 60 fps is 16.67 s, phase 0.25/s -> 4.1667 turns
        assert!((spawner.hue_phase() - 0.16667).abs() < 1e-2);
    }
}
