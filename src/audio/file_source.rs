use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::decode::DecodedAudio;
use super::slot::BlockSender;
use super::AudioSource;

/// Splits decoded audio into whole blocks; a short tail is zero-padded.
fn blocks_of(frames: &[[f32; 2]], block_size: usize) -> Vec<Vec<[f32; 2]>> {
    frames
        .chunks(block_size)
        .map(|chunk| {
            let mut block = chunk.to_vec();
            block.resize(block_size, [0.0, 0.0]);
            block
        })
        .collect()
}

/// Plays a decoded file into the block channel at its natural rate, one block every
/// `block_size / sample_rate` seconds, from a background thread.
pub struct FilePlayback {
    name: String,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FilePlayback {
    pub fn start(name: String, audio: DecodedAudio, block_size: usize, mut sender: BlockSender) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let block_dur = Duration::from_secs_f64(block_size as f64 / audio.sample_rate as f64);
        let blocks = blocks_of(&audio.frames, block_size);

        let handle = {
            let stop = Arc::clone(&stop);
            let finished = Arc::clone(&finished);
            thread::spawn(move || {
                let start = Instant::now();
                for (k, block) in blocks.iter().enumerate() {
                    // A block becomes available once all of its samples have "played"
                    let due = start + block_dur * (k as u32 + 1);
                    while Instant::now() < due {
                        if stop.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(
                            due.saturating_duration_since(Instant::now())
                                .min(Duration::from_millis(5)),
                        );
                    }
                    sender.publish(block);
                }
                finished.store(true, Ordering::Release);
            })
        };

        log::info!(
            "File playback: {} ({:.1}s, {}Hz)",
            name,
            audio.duration(),
            audio.sample_rate
        );

        Self {
            name,
            stop,
            finished,
            handle: Some(handle),
        }
    }
}

impl AudioSource for FilePlayback {
    fn describe(&self) -> String {
        format!("file {}", self.name)
    }

    fn exhausted(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("file playback thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for FilePlayback {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Deterministic feeder for offline rendering on a virtual clock.
///
/// Before each tick the newest block whose end time has passed is published;
/// blocks overtaken in between are skipped, as the live loop would only
/// keep the newest of them.
pub struct OfflineFeeder {
    sender: BlockSender,
    blocks: Vec<Vec<[f32; 2]>>,
    block_size: usize,
    sample_rate: u32,
    block_dur: f64,
    published: usize,
}

impl OfflineFeeder {
    pub fn new(audio: &DecodedAudio, block_size: usize, sender: BlockSender) -> Self {
        Self {
            sender,
            blocks: blocks_of(&audio.frames, block_size),
            block_size,
            sample_rate: audio.sample_rate,
            block_dur: block_size as f64 / audio.sample_rate as f64,
            published: 0,
        }
    }

    /// Length of the padded audio in seconds
    pub fn duration(&self) -> f64 {
        (self.blocks.len() * self.block_size) as f64 / self.sample_rate as f64
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn exhausted(&self) -> bool {
        self.published >= self.blocks.len()
    }

    /// Publish the newest completed block at time `t`, if it is new
    pub fn feed(&mut self, t: f64) -> bool {
        // Small epsilon keeps exact multiples of the block duration on time
        let completed = (((t + 1e-9) / self.block_dur).floor() as usize).min(self.blocks.len());
        if completed <= self.published {
            return false;
        }
        self.published = completed;
        self.sender.publish(&self.blocks[completed - 1])
    }
}
