// SPDX-License-Identifier: Apache-2.0

//! Mainline control loop: arms the triggers and releases the buffer-full barrier.
//!
//! The channels run on independent periods, so the supervisor cannot assume they fill in lockstep.
//! A capture cycle completes only once every fill signal is set; releasing earlier would throw
//! away a slower channel's partially captured cycle.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::{
    config::{AcquisitionPlan, PlanError},
    engine::AcquisitionEngine,
    trigger::TriggerBank,
};

/// Cooperative stop request for [`Supervisor::wait_cycle`].
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    /// Token that has not been cancelled
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Ask the waiting supervisor to return
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] was called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why [`Supervisor::wait_cycle`] returned without a completed cycle
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitError {
    /// The cancel token was set
    Cancelled,
}

/// Owns the trigger bank and drives capture cycles over a shared [`AcquisitionEngine`].
pub struct Supervisor<'a, B: TriggerBank, const N: usize> {
    /// Capture state shared with the completion handlers
    engine: &'a AcquisitionEngine<N>,
    /// Trigger sources named by `plan`
    triggers: B,
    /// Static channel bindings
    plan: &'a AcquisitionPlan,
    /// Completed capture cycles
    cycles: u32,
}

impl<'a, B: TriggerBank, const N: usize> Supervisor<'a, B, N> {
    /// Take ownership of the trigger bank. Nothing is configured until [`Supervisor::start`].
    ///
    /// `plan` is checked with [`AcquisitionPlan::validate`] first, a rejected plan never reaches
    /// the trigger hardware.
    pub fn new(
        engine: &'a AcquisitionEngine<N>,
        triggers: B,
        plan: &'a AcquisitionPlan,
    ) -> Result<Self, PlanError> {
        plan.validate()?;
        Ok(Self {
            engine,
            triggers,
            plan,
            cycles: 0,
        })
    }

    /// Configure every trigger (disarmed), reset the engine, then arm all triggers together.
    ///
    /// Completion handlers must already be bound and enabled.
    pub fn start(&mut self) {
        for channel in &self.plan.channels {
            match self.triggers.source(channel.conversion.trigger) {
                Some(source) => {
                    source.disarm();
                    source.configure(channel.trigger);
                }
                None => warn!(
                    "Trigger {} for {} channel is not in the bank, channel will never fill",
                    channel.conversion.trigger,
                    channel.conversion.channel
                ),
            }
        }

        self.engine.reset();
        self.cycles = 0;

        self.triggers.arm_together(&self.plan.trigger_ids());
        info!(
            "Triggers armed, capturing {} samples per channel",
            self.engine.capacity()
        );
    }

    /// Disarm every trigger. Buffers and signals are left as they are.
    pub fn stop(&mut self) {
        self.triggers.disarm_all(&self.plan.trigger_ids());
        debug!("Triggers disarmed after {} cycles", self.cycles);
    }

    /// Check the barrier once without blocking. See [`Supervisor::poll_with`].
    pub fn poll(&mut self) -> Option<u32> {
        self.poll_with(|_, _| {})
    }

    /// Check the barrier once without blocking.
    ///
    /// If every channel has filled, `consume` gets the engine and the number of the completed
    /// cycle before the fill signals are cleared, and that number is returned. The handlers keep
    /// writing during `consume`, so it must copy out what it needs well within one buffer period.
    pub fn poll_with(&mut self, consume: impl FnOnce(&AcquisitionEngine<N>, u32)) -> Option<u32> {
        if !self.engine.all_full() {
            return None;
        }

        let cycle = self.cycles.wrapping_add(1);
        consume(self.engine, cycle);

        if self.engine.try_release() {
            self.cycles = cycle;
            debug!("Capture cycle {} complete, fill signals cleared", cycle);
            Some(cycle)
        } else {
            None
        }
    }

    /// Spin until a capture cycle completes or `cancel` is set.
    pub fn wait_cycle(&mut self, cancel: &CancelToken) -> Result<u32, WaitError> {
        loop {
            if cancel.is_cancelled() {
                debug!("Wait for capture cycle {} cancelled", self.cycles.wrapping_add(1));
                return Err(WaitError::Cancelled);
            }
            if let Some(cycle) = self.poll() {
                return Ok(cycle);
            }
            core::hint::spin_loop();
        }
    }

    /// Release capture cycles forever, handing each one to `consume` first.
    ///
    /// If a channel never fills (disarmed trigger, disconnected input) this spins forever.
    pub fn run(mut self, mut consume: impl FnMut(&AcquisitionEngine<N>, u32)) -> ! {
        loop {
            if self.poll_with(&mut consume).is_none() {
                core::hint::spin_loop();
            }
        }
    }

    /// Completed capture cycles since [`Supervisor::start`]
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Shared capture state
    pub fn engine(&self) -> &'a AcquisitionEngine<N> {
        self.engine
    }

    /// Trigger bank, e.g. to pause a single channel
    pub fn triggers_mut(&mut self) -> &mut B {
        &mut self.triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::CaptureState,
        channel::ChannelId,
        config::PLAN,
        conversion::ResultRegister,
        sim::SimTriggers,
        trigger::TriggerConfig,
    };

    /// Supervisor over simulated triggers for the board plan
    fn board_supervisor<const N: usize>(
        engine: &AcquisitionEngine<N>,
    ) -> Supervisor<'_, SimTriggers, N> {
        Supervisor::new(engine, SimTriggers::for_plan(&PLAN), &PLAN).unwrap()
    }

    /// Deposit and immediately drain one conversion
    fn deliver<const N: usize>(engine: &AcquisitionEngine<N>, id: ChannelId, raw: u16) {
        let reg = ResultRegister::new();
        reg.deposit(raw);
        engine.complete(id, &reg);
    }

    #[test]
    fn start_arms_every_trigger_and_resets_engine() {
        let engine = AcquisitionEngine::<4>::new();
        deliver(&engine, ChannelId::Mains, 3);
        let mut supervisor = board_supervisor(&engine);
        supervisor.start();

        assert_eq!(engine.cursor(ChannelId::Mains), 0);
        for id in PLAN.trigger_ids() {
            let trigger = supervisor.triggers_mut().get(id).unwrap();
            assert!(trigger.is_armed());
            assert_eq!(trigger.counter(), 0);
        }

        supervisor.stop();
        for id in PLAN.trigger_ids() {
            assert!(!supervisor.triggers_mut().get(id).unwrap().is_armed());
        }
    }

    #[test]
    fn barrier_waits_while_any_signal_is_clear() {
        let engine = AcquisitionEngine::<1>::new();
        let mut supervisor = board_supervisor(&engine);
        supervisor.start();

        deliver(&engine, ChannelId::Mains, 1);
        deliver(&engine, ChannelId::Terminal, 1);
        assert_eq!(supervisor.poll(), None);

        deliver(&engine, ChannelId::Pilot, 1);
        // one signal cleared behind the supervisor's back
        engine.clear_signal(ChannelId::Mains);
        assert_eq!(supervisor.poll(), None);
        assert_eq!(engine.fill_signals(), [false, true, true]);

        deliver(&engine, ChannelId::Mains, 2);
        assert_eq!(supervisor.poll(), Some(1));
        assert_eq!(engine.fill_signals(), [false; 3]);
        assert_eq!(supervisor.cycles(), 1);
    }

    #[test]
    fn slowest_channel_gates_the_cycle() {
        const TICKS: u32 = 16;
        let engine = AcquisitionEngine::<4>::new();
        let mut supervisor = board_supervisor(&engine);
        supervisor.start();

        let schedule: [(ChannelId, &[u32]); 3] = [
            (ChannelId::Mains, &[1, 2, 3, 4]),
            (ChannelId::Pilot, &[2, 4, 6, 8]),
            (ChannelId::Terminal, &[4, 8, 12, 16]),
        ];

        for tick in 1..=TICKS {
            for (id, ticks) in schedule {
                if ticks.contains(&tick) {
                    deliver(&engine, id, tick as u16);
                }
            }

            let released = supervisor.poll_with(|engine, cycle| {
                assert_eq!(cycle, 1);
                assert_eq!(engine.snapshot(ChannelId::Mains), [1, 2, 3, 4]);
                assert_eq!(engine.snapshot(ChannelId::Pilot), [2, 4, 6, 8]);
                assert_eq!(engine.snapshot(ChannelId::Terminal), [4, 8, 12, 16]);
            });

            if tick < TICKS {
                assert_eq!(released, None, "released early at tick {tick}");
            } else {
                assert_eq!(released, Some(1));
            }

            if (4..TICKS).contains(&tick) {
                assert_eq!(engine.state(ChannelId::Mains), CaptureState::Full);
            }
            if (8..TICKS).contains(&tick) {
                assert_eq!(engine.state(ChannelId::Pilot), CaptureState::Full);
            }
        }

        for id in ChannelId::ALL {
            assert_eq!(engine.cursor(id), 0);
            assert_eq!(engine.state(id), CaptureState::Filling);
        }
    }

    #[test]
    fn wait_cycle_returns_on_cancel() {
        let engine = AcquisitionEngine::<4>::new();
        let mut supervisor = board_supervisor(&engine);
        supervisor.start();

        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(supervisor.wait_cycle(&cancel), Err(WaitError::Cancelled));
    }

    #[test]
    fn wait_cycle_returns_completed_cycle() {
        let engine = AcquisitionEngine::<1>::new();
        let mut supervisor = board_supervisor(&engine);
        supervisor.start();
        for id in ChannelId::ALL {
            deliver(&engine, id, 42);
        }

        assert_eq!(supervisor.wait_cycle(&CancelToken::new()), Ok(1));
    }

    #[test]
    fn concurrent_handlers_release_every_round_once() {
        const ROUNDS: u32 = 2_000;
        let engine = AcquisitionEngine::<1>::new();
        let mut supervisor = board_supervisor(&engine);
        supervisor.start();

        std::thread::scope(|s| {
            let engine = &engine;
            for id in ChannelId::ALL {
                s.spawn(move || {
                    let reg = ResultRegister::new();
                    for round in 0..ROUNDS {
                        // next round only after the supervisor took this one
                        while engine.is_full(id) {
                            std::thread::yield_now();
                        }
                        reg.deposit(round as u16);
                        engine.complete(id, &reg);
                    }
                });
            }

            let mut released = 0;
            while released < ROUNDS {
                match supervisor.poll() {
                    Some(cycle) => {
                        released += 1;
                        assert_eq!(cycle, released);
                    }
                    None => std::thread::yield_now(),
                }
            }
        });

        assert_eq!(supervisor.cycles(), ROUNDS);
        assert_eq!(supervisor.poll(), None);
        assert_eq!(engine.fill_signals(), [false; 3]);
    }

    #[test]
    fn invalid_plan_is_rejected_before_start() {
        let engine = AcquisitionEngine::<4>::new();
        let mut plan = PLAN;
        plan.channels[0].trigger = TriggerConfig::new(0, 0);

        let supervisor = Supervisor::new(&engine, SimTriggers::for_plan(&plan), &plan);
        assert_eq!(
            supervisor.err(),
            Some(PlanError::CompareNotBelowPeriod(ChannelId::Mains))
        );
    }
}
