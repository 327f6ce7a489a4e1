//! Context Switcher
//!
//! The engine holds exactly one `EngineWorkingState`. Before any call on
//! behalf of an instance, that instance's snapshot is copied in; afterwards
//! the (possibly updated) state is copied back out. `EngineLease` ties the
//! two copies to a scope: swap-in on creation, swap-out on drop.

use howl_dsp::{ChunkEngine, DspError, EngineWorkingState, IoConfig};

use crate::context::InstanceContext;

/// Copies instance state into and out of the engine
pub struct ContextSwitcher;

impl ContextSwitcher {
    /// Copy the instance snapshot into the engine's working state
    #[inline]
    pub fn swap_in<E: ChunkEngine + ?Sized>(engine: &mut E, ctx: &InstanceContext) {
        *engine.state_mut() = ctx.local;
    }

    /// Copy the engine's working state back into the instance snapshot
    #[inline]
    pub fn swap_out<E: ChunkEngine + ?Sized>(engine: &E, ctx: &mut InstanceContext) {
        ctx.local = *engine.state();
    }

    /// Swap `ctx` in and hold the engine until the lease is dropped
    pub fn lease<'a, E: ChunkEngine + ?Sized>(
        engine: &'a mut E,
        ctx: &'a mut InstanceContext,
    ) -> EngineLease<'a, E> {
        Self::swap_in(&mut *engine, &*ctx);
        EngineLease { engine, ctx }
    }
}

/// Exclusive use of the engine on behalf of one instance
///
/// Rust pattern: the `&mut` borrows make it impossible to lease the engine
/// to a second instance, or to touch this instance's snapshot, while the
/// lease is alive. Swap-out runs in `Drop`, so early returns and unwinding
/// still leave the snapshot current.
pub struct EngineLease<'a, E: ChunkEngine + ?Sized> {
    engine: &'a mut E,
    ctx: &'a mut InstanceContext,
}

impl<'a, E: ChunkEngine + ?Sized> EngineLease<'a, E> {
    pub fn configure(&mut self, io: &mut IoConfig) {
        self.engine.configure(io);
    }

    /// One-time prepare against the instance's stream and memory
    pub fn prepare(&mut self) -> Result<(), DspError> {
        let io = self.ctx.io;
        self.engine.prepare(&io, &mut self.ctx.memory)
    }

    /// Process `x` in place with this instance's memory
    #[inline]
    pub fn process(&mut self, x: &mut [f32]) {
        self.engine.process_chunk(&mut self.ctx.memory, x);
    }

    /// The working state as the engine currently holds it
    pub fn state(&self) -> &EngineWorkingState {
        self.engine.state()
    }
}

impl<'a, E: ChunkEngine + ?Sized> Drop for EngineLease<'a, E> {
    fn drop(&mut self) {
        ContextSwitcher::swap_out(&*self.engine, &mut *self.ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use howl_dsp::{AdaptiveEngine, Fitting};

    #[test]
    fn test_swap_round_trip() {
        let mut engine = AdaptiveEngine::new();
        let mut ctx = InstanceContext::new("left", Fitting::default());
        ctx.local.feedback.mu = 0.125;
        ctx.local.prepared = 3;

        ContextSwitcher::swap_in(&mut engine, &ctx);
        let before = *engine.state();
        ContextSwitcher::swap_out(&engine, &mut ctx);
        ContextSwitcher::swap_in(&mut engine, &ctx);
        assert_eq!(*engine.state(), before);
    }

    #[test]
    fn test_lease_swaps_out_on_drop() {
        let mut engine = AdaptiveEngine::new();
        let mut ctx = InstanceContext::new("left", Fitting::default());
        {
            let lease = ContextSwitcher::lease(&mut engine, &mut ctx);
            assert_eq!(lease.state().feedback.afl, 42);
        }
        engine.state_mut().feedback.mu = 0.5;

        // The engine changed after the lease ended; the snapshot did not
        assert_ne!(ctx.local.feedback.mu, 0.5);
    }

    #[test]
    fn test_lease_captures_engine_updates() {
        let mut engine = AdaptiveEngine::new();
        let mut ctx = InstanceContext::new("left", Fitting::default());
        {
            let mut lease = ContextSwitcher::lease(&mut engine, &mut ctx);
            let mut io = IoConfig::new(16000.0, 8);
            lease.configure(&mut io);
        }
        assert_eq!(ctx.local.limiter.fs, 16000.0);
    }

    #[test]
    fn test_lease_through_trait_object() {
        let mut engine: Box<dyn ChunkEngine> = Box::new(AdaptiveEngine::new());
        let mut ctx = InstanceContext::new("left", Fitting::default());
        let mut x = [0.25_f32; 8];
        {
            let mut lease = ContextSwitcher::lease(engine.as_mut(), &mut ctx);
            // Unprepared: processing is a no-op
            lease.process(&mut x);
        }
        assert_eq!(x, [0.25; 8]);
    }
}
