//! Several instances sharing one engine must behave as if each had its own.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use howl_core::{
    AdaptiveEngine, AudioBlock, BlockProcessor, BlockTransport, ChunkEngine, ContextSwitcher,
    Fitting, HostError, InstanceContext, IntParam, IoConfig, Lifecycle, TickOutcome,
};

/// Transport that serves queued blocks and counts every claim and release
struct CountingTransport {
    pending: VecDeque<AudioBlock>,
    transmitted: Arc<Mutex<Vec<Vec<f32>>>>,
    claims: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl CountingTransport {
    fn new(blocks: Vec<AudioBlock>) -> Self {
        Self {
            pending: blocks.into(),
            transmitted: Arc::default(),
            claims: Arc::default(),
            releases: Arc::default(),
        }
    }
}

impl BlockTransport for CountingTransport {
    fn receive_writable(&mut self) -> Option<AudioBlock> {
        let block = self.pending.pop_front()?;
        self.claims.fetch_add(1, Ordering::SeqCst);
        Some(block)
    }

    fn transmit(&mut self, block: &AudioBlock) {
        self.transmitted.lock().push(block.as_slice().to_vec());
    }

    fn release(&mut self, _block: AudioBlock) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn signal(block: usize, len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let t = (block * len + n) as f32;
            0.2 * (t * 0.13).sin() + 0.05 * (t * 1.7).cos()
        })
        .collect()
}

fn loud_fitting() -> Fitting {
    let mut fitting = Fitting::for_chunk(8);
    fitting.prescription.tkgain = [20.0; howl_dsp::MAX_BANDS];
    fitting
}

fn ready(engine: &mut AdaptiveEngine, name: &str, fitting: Fitting) -> InstanceContext {
    let mut ctx = InstanceContext::new(name, fitting);
    ctx.setup(engine, IoConfig::default(), None).unwrap();
    ctx
}

#[test]
fn test_swap_round_trip_preserves_state() {
    let mut engine = AdaptiveEngine::new();
    let mut ctx = ready(&mut engine, "left", Fitting::default());
    let before = *ctx.local_state();

    ContextSwitcher::swap_in(&mut engine, &ctx);
    assert_eq!(*engine.state(), before);
    ContextSwitcher::swap_out(&engine, &mut ctx);
    assert_eq!(*ctx.local_state(), before);
}

#[test]
fn test_interleaved_instances_match_solo_runs() {
    // A and B share one engine, interleaved A, B, A, B, ...
    let mut shared = AdaptiveEngine::new();
    let mut a = ready(&mut shared, "left", Fitting::for_chunk(8));
    let mut b = ready(&mut shared, "right", loud_fitting().for_ear(1));

    // A alone on its own engine sees the same input
    let mut solo_engine = AdaptiveEngine::new();
    let mut solo = ready(&mut solo_engine, "solo", Fitting::for_chunk(8));

    for block in 0..300 {
        let mut shared_a = signal(block, 8);
        let mut shared_b: Vec<f32> = signal(block + 1000, 8);
        let mut solo_a = signal(block, 8);

        ContextSwitcher::lease(&mut shared, &mut a).process(&mut shared_a);
        ContextSwitcher::lease(&mut shared, &mut b).process(&mut shared_b);
        ContextSwitcher::lease(&mut solo_engine, &mut solo).process(&mut solo_a);

        assert_eq!(shared_a, solo_a, "block {} differs", block);
    }

    assert_eq!(a.feedback_model(), solo.feedback_model());
    assert_eq!(a.local_state(), solo.local_state());
    assert_ne!(a.local_state().prescription, b.local_state().prescription);
}

#[test]
fn test_instance_state_untouched_by_other_instance() {
    let mut engine = AdaptiveEngine::new();
    let mut a = ready(&mut engine, "left", Fitting::default());
    let b = ready(&mut engine, "right", loud_fitting());
    let b_before = *b.local_state();
    let b_model: Vec<f32> = b.feedback_model().to_vec();

    for block in 0..50 {
        let mut x = signal(block, 8);
        ContextSwitcher::lease(&mut engine, &mut a).process(&mut x);
    }

    assert_eq!(*b.local_state(), b_before);
    assert_eq!(b.feedback_model(), b_model.as_slice());
    // The engine is left holding A's state
    assert_eq!(engine.state(), a.local_state());
}

#[test]
fn test_prepare_once_per_instance() {
    let mut engine = AdaptiveEngine::new();
    let mut a = ready(&mut engine, "left", Fitting::default());
    let b = ready(&mut engine, "right", Fitting::default());

    assert_eq!(a.local_state().prepared, 1);
    assert_eq!(b.local_state().prepared, 1);
    assert!(matches!(a.prepare(&mut engine), Err(HostError::AlreadyPrepared(_))));
    assert_eq!(a.lifecycle(), Lifecycle::Ready);
}

#[test]
fn test_structural_parameters_locked_after_prepare() {
    let mut engine = AdaptiveEngine::new();
    let mut ctx = InstanceContext::new("left", Fitting::default());
    ctx.configure(&mut engine, IoConfig::default()).unwrap();
    ctx.set_structural(IntParam::AdaptiveFilterLength, 24).unwrap();
    ctx.prepare(&mut engine).unwrap();

    assert_eq!(ctx.params().int(IntParam::AdaptiveFilterLength), 24);
    assert_eq!(ctx.feedback_model().len(), 24);

    assert!(matches!(
        ctx.set_structural(IntParam::HardwareDelay, 10),
        Err(HostError::StructuralParameterLocked(IntParam::HardwareDelay))
    ));
    assert!(ctx
        .params_mut()
        .set_int(IntParam::AdaptiveFilterLength, 8)
        .is_err());
    // Non-structural slots stay writable
    assert!(ctx
        .params_mut()
        .set_int(IntParam::BandLimitUpdatePeriod, 4)
        .is_ok());
}

#[test]
fn test_block_processor_claims_and_releases_once_per_block() {
    let mut engine = AdaptiveEngine::new();
    let mut ctx = ready(&mut engine, "left", Fitting::default());

    let blocks = (0..3).map(|i| AudioBlock::from_samples(&signal(i, 8))).collect();
    let transport = CountingTransport::new(blocks);
    let claims = Arc::clone(&transport.claims);
    let releases = Arc::clone(&transport.releases);
    let log = Arc::clone(&transport.transmitted);
    let mut processor = BlockProcessor::new(Box::new(transport));

    for _ in 0..3 {
        assert_eq!(
            processor.update(&mut engine, &mut ctx),
            TickOutcome::Processed { samples: 8 }
        );
    }
    // Nothing left: no claim, no release
    assert_eq!(processor.update(&mut engine, &mut ctx), TickOutcome::Idle);

    assert_eq!(claims.load(Ordering::SeqCst), 3);
    assert_eq!(releases.load(Ordering::SeqCst), 3);
    let sent = log.lock().clone();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|b| b.len() == 8));

    let stats = processor.stats();
    assert_eq!(stats.ticks, 4);
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.idle, 1);
}

#[test]
fn test_disabled_processor_never_claims() {
    let mut engine = AdaptiveEngine::new();
    let mut ctx = ready(&mut engine, "left", Fitting::default());
    ctx.set_enabled(false);

    let transport = CountingTransport::new(vec![AudioBlock::new(8); 4]);
    let claims = Arc::clone(&transport.claims);
    let mut processor = BlockProcessor::new(Box::new(transport));

    for _ in 0..4 {
        assert_eq!(processor.update(&mut engine, &mut ctx), TickOutcome::Disabled);
    }
    assert_eq!(claims.load(Ordering::SeqCst), 0);
    assert_eq!(processor.stats().disabled, 4);
}

#[test]
fn test_unprepared_engine_passes_block_through() {
    let mut engine = AdaptiveEngine::new();
    let mut ctx = InstanceContext::new("left", Fitting::default());

    let input = signal(0, 8);
    let transport = CountingTransport::new(vec![AudioBlock::from_samples(&input)]);
    let log = Arc::clone(&transport.transmitted);
    let mut processor = BlockProcessor::new(Box::new(transport));

    processor.update(&mut engine, &mut ctx);
    assert_eq!(*log.lock(), vec![input]);
}

#[test]
fn test_partial_chunk_block_is_released_untouched() {
    let mut engine = AdaptiveEngine::new();
    let mut ctx = ready(&mut engine, "left", Fitting::default());
    let before = *ctx.local_state();

    let odd = AudioBlock::from_samples(&signal(0, 12));
    let whole = AudioBlock::from_samples(&signal(1, 16));
    let transport = CountingTransport::new(vec![odd, whole]);
    let claims = Arc::clone(&transport.claims);
    let releases = Arc::clone(&transport.releases);
    let log = Arc::clone(&transport.transmitted);
    let mut processor = BlockProcessor::new(Box::new(transport));

    assert_eq!(
        processor.update(&mut engine, &mut ctx),
        TickOutcome::Rejected { samples: 12 }
    );
    assert!(log.lock().is_empty());
    assert_eq!(ctx.local_state().feedback, before.feedback);

    // Two whole chunks in one block are fine
    assert_eq!(
        processor.update(&mut engine, &mut ctx),
        TickOutcome::Processed { samples: 16 }
    );

    assert_eq!(claims.load(Ordering::SeqCst), 2);
    assert_eq!(releases.load(Ordering::SeqCst), 2);
    assert_eq!(log.lock().len(), 1);
    assert_eq!(processor.stats().rejected, 1);
    assert_eq!(processor.stats().processed, 1);
}
