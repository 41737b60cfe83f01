use anyhow::Result;

use super::{FrameStamp, RenderSink, ZoneInfo};
use crate::show::color::Rgb;

/// Default sink when no hardware bridge is attached: summarises each zone's
/// mean and peak brightness in the log every `report_every` frames.
pub struct LogSink {
    report_every: u64,
    stamp: FrameStamp,
    zones: Vec<ZoneSummary>,
}

#[derive(Clone, Debug, Default)]
struct ZoneSummary {
    name: String,
    mean_sum: f64,
    peak: f32,
    frames: u64,
}

impl LogSink {
    pub fn new(report_every: u64) -> Self {
        Self {
            report_every: report_every.max(1),
            stamp: FrameStamp { index: 0, time: 0.0 },
            zones: Vec::new(),
        }
    }

    fn report(&mut self) {
        for zone in &mut self.zones {
            if zone.frames == 0 {
                continue;
            }
            log::debug!(
                "[{:>7.2}s] {:<20} mean={:.3} peak={:.3}",
                self.stamp.time,
                zone.name,
                zone.mean_sum / zone.frames as f64,
                zone.peak
            );
            zone.mean_sum = 0.0;
            zone.peak = 0.0;
            zone.frames = 0;
        }
    }
}

impl RenderSink for LogSink {
    fn begin_frame(&mut self, stamp: FrameStamp) {
        self.stamp = stamp;
    }

    fn set_colors(&mut self, zone: &ZoneInfo, colors: &[Rgb]) {
        if self.zones.len() <= zone.id {
            self.zones.resize(zone.id + 1, ZoneSummary::default());
        }
        let summary = &mut self.zones[zone.id];
        if summary.name.is_empty() {
            summary.name = zone.name.clone();
        }

        let (sum, peak) = colors
            .iter()
            .map(|c| c.luma())
            .fold((0.0f64, 0.0f32), |(s, p), l| (s + l as f64, p.max(l)));
        if !colors.is_empty() {
            summary.mean_sum += sum / colors.len() as f64;
        }
        summary.peak = summary.peak.max(peak);
        summary.frames += 1;
    }

    fn end_frame(&mut self) -> Result<()> {
        if (self.stamp.index + 1) % self.report_every == 0 {
            self.report();
        }
        Ok(())
    }
}
