//! Block Processor
//!
//! Once per tick: claim a writable block from the transport, run the
//! engine on it in place on behalf of one instance, transmit it and give it
//! back. A tick with no block available, or a disabled instance, does
//! nothing at all.
//!
//! # Real-time Safety
//!
//! `update` never allocates: blocks come from a pool filled at start-up and
//! the engine works out of the instance's preallocated memory.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::context::InstanceContext;
use crate::gain::MasterGain;
use crate::switcher::ContextSwitcher;
use howl_dsp::ChunkEngine;

/// A fixed-length block of samples. The length is set at construction and
/// cannot change.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Box<[f32]>,
}

impl AudioBlock {
    /// Silent block of `len` samples
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len].into_boxed_slice(),
        }
    }

    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }
}

/// Source and destination of blocks
pub trait BlockTransport: Send {
    /// Lend out a block filled with input, if one is ready
    fn receive_writable(&mut self) -> Option<AudioBlock>;

    /// Queue the processed block for output
    fn transmit(&mut self, block: &AudioBlock);

    /// Return a block obtained from `receive_writable`
    fn release(&mut self, block: AudioBlock);
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Instance disabled; the transport was not touched
    Disabled,
    /// No block available
    Idle,
    /// One block processed, transmitted and released
    Processed { samples: usize },
    /// Block did not split into whole chunks; released untouched
    Rejected { samples: usize },
}

/// Per-processor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub ticks: u64,
    pub processed: u64,
    pub idle: u64,
    pub disabled: u64,
    pub rejected: u64,
}

/// Drives one instance from one transport
pub struct BlockProcessor {
    transport: Box<dyn BlockTransport>,
    gain: Option<Arc<MasterGain>>,
    stats: ProcessorStats,
}

impl BlockProcessor {
    pub fn new(transport: Box<dyn BlockTransport>) -> Self {
        Self {
            transport,
            gain: None,
            stats: ProcessorStats::default(),
        }
    }

    /// Apply `gain` to every block after the engine has run
    pub fn with_gain(mut self, gain: Arc<MasterGain>) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Run one tick for `ctx`
    pub fn update<E: ChunkEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        ctx: &mut InstanceContext,
    ) -> TickOutcome {
        self.stats.ticks += 1;

        if !ctx.is_enabled() {
            self.stats.disabled += 1;
            return TickOutcome::Disabled;
        }

        let Some(mut block) = self.transport.receive_writable() else {
            self.stats.idle += 1;
            return TickOutcome::Idle;
        };

        if ctx.is_prepared() && ctx.io().check_block(block.len()).is_err() {
            let samples = block.len();
            self.transport.release(block);
            self.stats.rejected += 1;
            return TickOutcome::Rejected { samples };
        }

        {
            let mut lease = ContextSwitcher::lease(engine, ctx);
            lease.process(block.as_mut_slice());
        }

        if let Some(gain) = &self.gain {
            gain.apply(block.as_mut_slice());
        }

        self.transport.transmit(&block);
        let samples = block.len();
        self.transport.release(block);

        self.stats.processed += 1;
        TickOutcome::Processed { samples }
    }
}

/// Transport counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub claimed: u64,
    pub released: u64,
    /// Output samples dropped because the output ring was full
    pub overflow: u64,
}

/// Block transport over a pair of lock-free SPSC rings
///
/// Input samples arrive through one ring; a block is lent out once a full
/// block's worth is queued. Processed samples leave through the other ring.
pub struct RingTransport {
    input: Consumer<f32>,
    output: Producer<f32>,
    pool: Vec<AudioBlock>,
    block_len: usize,
    stats: TransportStats,
}

/// The outside ends of a `RingTransport`
pub struct RingEnds {
    /// Push input samples here
    pub feed: Producer<f32>,
    /// Pop processed samples here
    pub drain: Consumer<f32>,
}

impl RingTransport {
    /// Transport of `block_len`-sample blocks with room for `capacity_blocks`
    /// blocks in each direction
    pub fn pair(block_len: usize, capacity_blocks: usize) -> (Self, RingEnds) {
        let capacity = block_len * capacity_blocks.max(1);
        let (feed, input) = RingBuffer::<f32>::new(capacity);
        let (output, drain) = RingBuffer::<f32>::new(capacity);

        // One block is lent at a time; a spare keeps a late release harmless
        let pool = (0..2).map(|_| AudioBlock::new(block_len)).collect();

        let transport = Self {
            input,
            output,
            pool,
            block_len,
            stats: TransportStats::default(),
        };
        (transport, RingEnds { feed, drain })
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }
}

impl BlockTransport for RingTransport {
    fn receive_writable(&mut self) -> Option<AudioBlock> {
        if self.input.slots() < self.block_len {
            return None;
        }
        let mut block = self.pool.pop()?;

        match self.input.read_chunk(self.block_len) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                let samples = block.as_mut_slice();
                samples[..first.len()].copy_from_slice(first);
                samples[first.len()..].copy_from_slice(second);
                chunk.commit_all();
            }
            Err(_) => {
                self.pool.push(block);
                return None;
            }
        }

        self.stats.claimed += 1;
        Some(block)
    }

    fn transmit(&mut self, block: &AudioBlock) {
        let to_write = block.len().min(self.output.slots());
        if to_write < block.len() {
            // Output side is not draining fast enough
            self.stats.overflow += (block.len() - to_write) as u64;
        }
        if to_write == 0 {
            return;
        }
        if let Ok(chunk) = self.output.write_chunk_uninit(to_write) {
            chunk.fill_from_iter(block.as_slice().iter().copied());
        }
    }

    fn release(&mut self, block: AudioBlock) {
        self.stats.released += 1;
        self.pool.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_length_fixed() {
        let mut block = AudioBlock::new(8);
        assert_eq!(block.len(), 8);
        block.as_mut_slice()[0] = 1.0;
        assert_eq!(block.as_slice()[0], 1.0);
        assert_eq!(block.len(), 8);
    }

    #[test]
    fn test_ring_transport_waits_for_full_block() {
        let (mut transport, mut ends) = RingTransport::pair(4, 4);
        assert_eq!(transport.block_len(), 4);
        for s in [0.1, 0.2, 0.3] {
            ends.feed.push(s).unwrap();
        }
        assert!(transport.receive_writable().is_none());

        ends.feed.push(0.4).unwrap();
        let block = transport.receive_writable().unwrap();
        assert_eq!(block.as_slice(), &[0.1, 0.2, 0.3, 0.4]);

        transport.transmit(&block);
        transport.release(block);

        let out: Vec<f32> = std::iter::from_fn(|| ends.drain.pop().ok()).collect();
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(transport.stats().claimed, 1);
        assert_eq!(transport.stats().released, 1);
    }

    #[test]
    fn test_ring_transport_counts_overflow() {
        let (mut transport, mut ends) = RingTransport::pair(4, 1);
        for round in 0..2 {
            for n in 0..4 {
                ends.feed.push((round * 4 + n) as f32).unwrap();
            }
            let block = transport.receive_writable().unwrap();
            transport.transmit(&block);
            transport.release(block);
        }
        // Nothing drained: the second block had nowhere to go
        assert_eq!(transport.stats().overflow, 4);
        assert_eq!(ends.drain.slots(), 4);
    }
}
