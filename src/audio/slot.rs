// Block hand-off between the audio producer and the render loop.
//
// Two lock-free SPSC rings carry a fixed set of preallocated blocks:
// - FILLED: producer pushes blocks holding fresh audio, the loop pops them
// - FREE: the loop returns spent blocks, the producer refills them
//
// The loop drains FILLED every tick and keeps only the newest block, so a
// slow tick never sees stale audio. The producer never waits; it drops a
// block only when every buffer is already queued (the loop stalled for
// `depth` blocks).

use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Blocks in circulation. At 48 kHz / 1024 frames this covers a 170 ms stall.
pub const DEFAULT_DEPTH: usize = 8;

/// Fixed-length block of stereo sample pairs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBlock {
    frames: Vec<[f32; 2]>,
}

impl SampleBlock {
    /// Silent block of `len` frames
    pub fn silent(len: usize) -> Self {
        Self {
            frames: vec![[0.0; 2]; len],
        }
    }

    #[cfg(test)]
    pub fn from_frames(frames: Vec<[f32; 2]>) -> Self {
        Self { frames }
    }

    #[cfg(test)]
    pub fn frames(&self) -> &[[f32; 2]] {
        &self.frames
    }

    /// Channel average per frame
    pub fn mono(&self) -> impl Iterator<Item = f32> + '_ {
        self.frames.iter().map(|[l, r]| (l + r) * 0.5)
    }

    fn fill_from(&mut self, frames: &[[f32; 2]]) {
        self.frames.clear();
        self.frames.extend_from_slice(frames);
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Audio-side end: lives in the capture callback or playback thread
pub struct BlockSender {
    filled: Producer<SampleBlock>,
    free: Consumer<SampleBlock>,
    counters: Arc<Counters>,
}

/// Loop-side end
pub struct BlockReceiver {
    filled: Consumer<SampleBlock>,
    free: Producer<SampleBlock>,
    counters: Arc<Counters>,
}

/// Build the pool: `depth` blocks of `block_size` frames, all allocated here.
pub fn block_channel(block_size: usize, depth: usize) -> (BlockSender, BlockReceiver) {
    let depth = depth.max(1);
    let (filled_tx, filled_rx) = RingBuffer::new(depth);
    let (mut free_tx, free_rx) = RingBuffer::new(depth);

    for _ in 0..depth {
        if free_tx.push(SampleBlock::silent(block_size)).is_err() {
            break;
        }
    }

    let counters = Arc::new(Counters::default());
    (
        BlockSender {
            filled: filled_tx,
            free: free_rx,
            counters: Arc::clone(&counters),
        },
        BlockReceiver {
            filled: filled_rx,
            free: free_tx,
            counters,
        },
    )
}

impl BlockSender {
    /// Queue a copy of `frames`. Never blocks; returns false (and counts a
    /// drop) when no free block is available.
    pub fn publish(&mut self, frames: &[[f32; 2]]) -> bool {
        let Ok(mut block) = self.free.pop() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        block.fill_from(frames);
        if self.filled.push(block).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl BlockReceiver {
    /// Move the newest queued block into `out`, recycling everything older
    /// (and the previous contents of `out`). Returns false when nothing new
    /// arrived since the previous take.
    pub fn take_into(&mut self, out: &mut SampleBlock) -> bool {
        let mut fresh = false;
        while let Ok(mut block) = self.filled.pop() {
            std::mem::swap(out, &mut block);
            // FREE has room for every block in circulation
            let _ = self.free.push(block);
            fresh = true;
        }
        fresh
    }

    pub fn is_ready(&self) -> bool {
        !self.filled.is_empty()
    }

    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

/// Regroups interleaved callback buffers of any length into stereo blocks of
/// exactly `block_size` frames.
pub struct BlockAssembler {
    channels: usize,
    block_size: usize,
    pending: Vec<[f32; 2]>,
}

impl BlockAssembler {
    pub fn new(channels: usize, block_size: usize) -> Self {
        Self {
            channels: channels.max(1),
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    /// Feed interleaved samples; `emit` is called once per completed block.
    /// A trailing partial frame (fewer than `channels` samples) is ignored.
    pub fn push_interleaved<F>(&mut self, data: &[f32], mut emit: F)
    where
        F: FnMut(&[[f32; 2]]),
    {
        for frame in data.chunks_exact(self.channels) {
            let pair = match frame {
                [mono] => [*mono, *mono],
                [left, right, ..] => [*left, *right],
                [] => continue,
            };
            self.pending.push(pair);
            if self.pending.len() == self.block_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_averages_channels() {
        let block = SampleBlock::from_frames(vec![[1.0, 0.0], [-0.5, -0.5], [0.2, 0.6]]);
        let mono: Vec<f32> = block.mono().collect();
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.5).abs() < 1e-6);
        assert!((mono[1] + 0.5).abs() < 1e-6);
        assert!((mono[2] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn take_clears_ready_flag() {
        let (mut tx, mut rx) = block_channel(2, 4);
        let mut out = SampleBlock::silent(2);
        assert!(!rx.take_into(&mut out));

        assert!(tx.publish(&[[0.1, 0.1], [0.2, 0.2]]));
        assert!(rx.is_ready());
        assert!(rx.take_into(&mut out));
        assert_eq!(out.frames(), &[[0.1, 0.1], [0.2, 0.2]]);
        assert!(!rx.is_ready());
        assert!(!rx.take_into(&mut out));
    }

    #[test]
    fn last_value_wins() {
        let (mut tx, mut rx) = block_channel(1, 4);
        tx.publish(&[[1.0, 1.0]]);
        tx.publish(&[[2.0, 2.0]]);
        tx.publish(&[[3.0, 3.0]]);
        let mut out = SampleBlock::silent(1);
        assert!(rx.take_into(&mut out));
        assert_eq!(out.frames(), &[[3.0, 3.0]]);
        assert_eq!(rx.published(), 3);
        assert_eq!(rx.dropped(), 0);
    }

    #[test]
    fn spent_blocks_return_to_the_pool() {
        let (mut tx, mut rx) = block_channel(1, 2);
        let mut out = SampleBlock::silent(1);
        // Far more blocks than the pool holds, drained as they arrive
        for i in 0..100 {
            let v = i as f32;
            assert!(tx.publish(&[[v, v]]));
            assert!(rx.take_into(&mut out));
            assert_eq!(out.frames(), &[[v, v]]);
        }
        assert_eq!(rx.dropped(), 0);
    }

    #[test]
    fn producer_does_not_wait_on_a_stalled_consumer() {
        let (mut tx, mut rx) = block_channel(1, 3);
        for i in 0..5 {
            let v = i as f32;
            tx.publish(&[[v, v]]);
        }
        // Pool exhausted after three blocks; the rest are counted, not waited on
        assert_eq!(rx.published(), 3);
        assert_eq!(rx.dropped(), 2);

        let mut out = SampleBlock::silent(1);
        assert!(rx.take_into(&mut out));
        assert_eq!(out.frames(), &[[2.0, 2.0]]);

        // Once drained the producer has room again
        assert!(tx.publish(&[[9.0, 9.0]]));
        assert!(rx.take_into(&mut out));
        assert_eq!(out.frames(), &[[9.0, 9.0]]);
    }

    #[test]
    fn concurrent_publish_and_take() {
        use std::thread;

        let (mut tx, mut rx) = block_channel(64, DEFAULT_DEPTH);
        let producer = thread::spawn(move || {
            for i in 0..2000 {
                let v = i as f32;
                tx.publish(&[[v, v]; 64]);
            }
        });

        let mut out = SampleBlock::silent(64);
        let mut last_seen = -1.0f32;
        for _ in 0..2000 {
            if rx.take_into(&mut out) {
                // Every block is whole: all frames carry the same value
                let first = out.frames()[0][0];
                assert!(out.frames().iter().all(|f| f[0] == first && f[1] == first));
                assert!(first > last_seen);
                last_seen = first;
            }
        }
        producer.join().expect("producer thread");
        assert_eq!(rx.published() + rx.dropped(), 2000);
    }

    #[test]
    fn assembler_regroups_odd_sized_buffers() {
        let mut asm = BlockAssembler::new(2, 4);
        let mut blocks: Vec<Vec<[f32; 2]>> = Vec::new();

        // 3 frames, then 6 frames
        asm.push_interleaved(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());
        assert_eq!(asm.pending.len(), 3);

        let next: Vec<f32> = (3..9).flat_map(|i| [i as f32, -(i as f32)]).collect();
        asm.push_interleaved(&next, |b| blocks.push(b.to_vec()));

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0][3], [3.0, -3.0]);
        assert_eq!(blocks[1][0], [4.0, -4.0]);
        assert_eq!(asm.pending.len(), 1);
    }

    #[test]
    fn assembler_duplicates_mono_and_drops_extra_channels() {
        let mut mono = BlockAssembler::new(1, 2);
        let mut got = Vec::new();
        mono.push_interleaved(&[0.25, 0.5], |b| got.extend_from_slice(b));
        assert_eq!(got, vec![[0.25, 0.25], [0.5, 0.5]]);

        let mut surround = BlockAssembler::new(4, 1);
        let mut got = Vec::new();
        surround.push_interleaved(&[0.1, 0.2, 0.9, 0.9], |b| got.extend_from_slice(b));
        assert_eq!(got, vec![[0.1, 0.2]]);
    }
}
