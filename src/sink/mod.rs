pub mod jsonl;
pub mod logger;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::show::color::Rgb;

/// One output zone as enumerated at startup
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneInfo {
    pub id: usize,
    pub name: String,
    pub element_count: usize,
}

impl ZoneInfo {
    pub fn new(id: usize, name: String, element_count: usize) -> Self {
        Self {
            id,
            name,
            element_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Periodic brightness summary in the log
    #[default]
    Log,
    /// One JSON record per zone per frame
    Jsonl,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStamp {
    pub index: u64,
    /// Seconds since the show started
    pub time: f64,
}

/// Receives one color array per zone per frame.
///
/// `set_colors` is fire-and-forget; only `end_frame` may report a failure,
/// which ends the show.
pub trait RenderSink {
    fn begin_frame(&mut self, _stamp: FrameStamp) {}

    fn set_colors(&mut self, zone: &ZoneInfo, colors: &[Rgb]);

    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn open_sink(kind: SinkKind, path: Option<&Path>, fps: u32) -> Result<Box<dyn RenderSink>> {
    Ok(match kind {
        SinkKind::Log => Box::new(logger::LogSink::new(fps as u64)),
        SinkKind::Jsonl => {
            let writer: Box<dyn Write> = match path {
                Some(p) if p != Path::new("-") => Box::new(std::io::BufWriter::new(
                    std::fs::File::create(p)
                        .with_context(|| format!("Failed to create output file: {}", p.display()))?,
                )),
                _ => Box::new(std::io::BufWriter::new(std::io::stdout())),
            };
            Box::new(jsonl::JsonLinesSink::new(writer))
        }
    })
}

/// Paint every zone one solid color, then hold it. Confirms wiring before
/// audio starts.
pub fn flash(sink: &mut dyn RenderSink, zones: &[ZoneInfo], color: Rgb, hold: Duration) -> Result<()> {
    if hold.is_zero() {
        return Ok(());
    }
    sink.begin_frame(FrameStamp { index: 0, time: 0.0 });
    for zone in zones {
        let colors = vec![color; zone.element_count];
        sink.set_colors(zone, &colors);
    }
    sink.end_frame()?;
    std::thread::sleep(hold);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn flash_paints_every_element() {
        let zones = vec![
            ZoneInfo::new(0, "a".into(), 3),
            ZoneInfo::new(1, "b".into(), 5),
        ];
        let mut sink = RecordingSink::default();
        flash(&mut sink, &zones, Rgb::RED, Duration::from_millis(1)).expect("flash");

        assert_eq!(sink.frames.len(), 1);
        let (_, painted) = &sink.frames[0];
        assert_eq!(painted.len(), 2);
        assert_eq!(painted[1].1, vec![Rgb::RED; 5]);
    }

    #[test]
    fn zero_length_flash_is_skipped() {
        let zones = vec![ZoneInfo::new(0, "a".into(), 3)];
        let mut sink = RecordingSink::default();
        flash(&mut sink, &zones, Rgb::RED, Duration::ZERO).expect("flash");
        assert!(sink.frames.is_empty());
    }
}
