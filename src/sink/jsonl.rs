use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use super::{FrameStamp, RenderSink, ZoneInfo};
use crate::show::color::Rgb;

#[derive(Serialize)]
struct ZoneRecord<'a> {
    frame: u64,
    time: f64,
    zone: &'a str,
    colors: Vec<[u8; 3]>,
}

/// Writes one JSON object per zone per frame, 8-bit channels. Each frame is
/// flushed as soon as it is complete so a downstream bridge sees it at frame
/// rate.
pub struct JsonLinesSink {
    writer: Box<dyn Write>,
    stamp: FrameStamp,
    pending: Vec<u8>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self {
            writer,
            stamp: FrameStamp { index: 0, time: 0.0 },
            pending: Vec::new(),
        }
    }
}

impl RenderSink for JsonLinesSink {
    fn begin_frame(&mut self, stamp: FrameStamp) {
        self.stamp = stamp;
        self.pending.clear();
    }

    fn set_colors(&mut self, zone: &ZoneInfo, colors: &[Rgb]) {
        let record = ZoneRecord {
            frame: self.stamp.index,
            time: self.stamp.time,
            zone: &zone.name,
            colors: colors.iter().map(|c| c.to_rgb8()).collect(),
        };
        match serde_json::to_writer(&mut self.pending, &record) {
            Ok(()) => self.pending.push(b'\n'),
            Err(e) => log::warn!("Failed to encode zone '{}': {}", zone.name, e),
        }
    }

    fn end_frame(&mut self) -> Result<()> {
        self.writer
            .write_all(&self.pending)
            .context("Failed to write frame")?;
        self.writer.flush().context("Failed to flush frame")?;
        self.pending.clear();
        Ok(())
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("Failed to flush output: {}", e);
        }
    }
}
