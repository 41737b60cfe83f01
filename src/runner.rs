use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::file_source::OfflineFeeder;
use crate::audio::slot::{BlockReceiver, SampleBlock};
use crate::audio::AudioSource;
use crate::show::Show;
use crate::sink::{FrameStamp, RenderSink, ZoneInfo};

/// Counters for one run (or one reporting window)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoopStats {
    pub frames: u64,
    pub spawns: u64,
    pub fresh_blocks: u64,
    pub overruns: u64,
    pub busy: Duration,
}

impl LoopStats {
    fn record(&mut self, spawned: bool, fresh: bool, busy: Duration) {
        self.frames += 1;
        self.spawns += spawned as u64;
        self.fresh_blocks += fresh as u64;
        self.busy += busy;
    }

    fn mean_busy_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.busy.as_secs_f64() * 1000.0 / self.frames as f64
    }
}

/// Hand every zone's current buffer to the sink as one frame
fn render(show: &Show, zones: &[ZoneInfo], sink: &mut dyn RenderSink, stamp: FrameStamp) -> Result<()> {
    sink.begin_frame(stamp);
    for (info, zone) in zones.iter().zip(show.zones()) {
        sink.set_colors(info, zone.colors());
    }
    sink.end_frame()
}

/// Everything the fixed-rate loop drives
pub struct Stage<'a> {
    pub show: &'a mut Show,
    pub zones: &'a [ZoneInfo],
    pub blocks: &'a mut BlockReceiver,
    pub sink: &'a mut dyn RenderSink,
    pub block_size: usize,
}

/// Real-time loop: one tick per `frame`, sleeping off the rest of the budget.
///
/// Runs until `stop` is set or a finite source runs dry. The source is
/// closed before returning, on both the normal and the error path.
pub fn run_live(
    stage: Stage<'_>,
    source: &mut dyn AudioSource,
    frame: Duration,
    stop: &AtomicBool,
) -> Result<LoopStats> {
    let result = live_loop(stage, &*source, frame, stop);
    let closed = source.close().context("Failed to stop audio source");
    let stats = result?;
    closed?;
    Ok(stats)
}

fn live_loop(
    stage: Stage<'_>,
    source: &dyn AudioSource,
    frame: Duration,
    stop: &AtomicBool,
) -> Result<LoopStats> {
    let Stage {
        show,
        zones,
        blocks,
        sink,
        block_size,
    } = stage;

    let mut block = SampleBlock::silent(block_size);
    let mut total = LoopStats::default();
    let mut window = LoopStats::default();
    let mut window_start = Instant::now();
    let mut peak_envelope = 0.0f32;

    let start = Instant::now();
    let mut deadline = start;

    while !stop.load(Ordering::Relaxed) {
        if source.exhausted() && !blocks.is_ready() {
            log::info!("Audio source finished: {}", source.describe());
            break;
        }

        let tick_start = Instant::now();
        let now = tick_start.duration_since(start).as_secs_f64();

        let fresh = blocks.take_into(&mut block);
        let report = show.tick(now, fresh.then_some(&block));
        render(
            show,
            zones,
            sink,
            FrameStamp {
                index: total.frames,
                time: now,
            },
        )?;

        let busy = tick_start.elapsed();
        total.record(report.spawned, fresh, busy);
        window.record(report.spawned, fresh, busy);
        peak_envelope = peak_envelope.max(report.features.envelope);

        deadline += frame;
        let after = Instant::now();
        if after > deadline + frame {
            // More than a whole frame behind: re-anchor instead of bursting
            total.overruns += 1;
            window.overruns += 1;
            log::warn!(
                "Frame {} overran its budget by {:.1}ms",
                total.frames,
                (after - deadline).as_secs_f64() * 1000.0
            );
            deadline = after;
        } else if deadline > after {
            std::thread::sleep(deadline - after);
        }

        if window_start.elapsed() >= Duration::from_secs(1) {
            log::debug!(
                "{} frames, {} spawns, {} audio blocks, {:.3}ms/tick, {} overruns, {} blocks dropped, peak envelope {:.2}, hue phase {:.3}",
                window.frames,
                window.spawns,
                window.fresh_blocks,
                window.mean_busy_ms(),
                window.overruns,
                blocks.dropped(),
                peak_envelope,
                show.spawner().hue_phase()
            );
            window = LoopStats::default();
            peak_envelope = 0.0;
            window_start = Instant::now();
        }
    }

    Ok(total)
}

/// Virtual-clock render of a decoded file: tick k happens at k / fps
/// seconds, with no sleeping. Output is deterministic.
///
/// The last tick lands at or after the end of the file so the final block
/// is analysed too.
pub fn run_offline(
    stage: Stage<'_>,
    feeder: &mut OfflineFeeder,
    fps: u32,
    stop: &AtomicBool,
) -> Result<LoopStats> {
    let Stage {
        show,
        zones,
        blocks,
        sink,
        block_size,
    } = stage;

    let total_frames = (feeder.duration() * fps as f64 - 1e-9).ceil().max(0.0) as u64 + 1;
    log::info!(
        "Offline render: {} blocks, {:.1}s, {} frames",
        feeder.block_count(),
        feeder.duration(),
        total_frames
    );

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let mut block = SampleBlock::silent(block_size);
    let mut stats = LoopStats::default();

    for index in 0..total_frames {
        if stop.load(Ordering::Relaxed) {
            log::info!("Offline render interrupted at frame {}", index);
            break;
        }
        let tick_start = Instant::now();
        let now = index as f64 / fps as f64;

        feeder.feed(now);
        let fresh = blocks.take_into(&mut block);
        let report = show.tick(now, fresh.then_some(&block));
        render(show, zones, sink, FrameStamp { index, time: now })?;

        stats.record(report.spawned, fresh, tick_start.elapsed());
        pb.set_position(index + 1);
    }

    pb.finish_with_message("Rendering complete");
    if !feeder.exhausted() && !stop.load(Ordering::Relaxed) {
        log::warn!("Offline render ended before the last audio block");
    }
    Ok(stats)
}

/// Ctrl-C sets the returned flag. The listener runs on a dedicated thread
/// with its own single-threaded runtime.
pub fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;

    std::thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::info!("Interrupt received, stopping...");
                        flag.store(true, Ordering::Relaxed);
                    }
                    Err(e) => log::warn!("Failed to listen for interrupt: {}", e),
                }
            });
        })
        .context("Failed to spawn interrupt listener")?;

    Ok(stop)
}
