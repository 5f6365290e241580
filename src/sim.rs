// SPDX-License-Identifier: Apache-2.0

//! Host-side stand-ins for the trigger timers and the converter.
//!
//! Time advances in whole timer ticks. [`Testbench::step`] plays one tick: every armed trigger
//! that reaches its compare threshold starts a conversion, every pending completion is handed
//! to the engine's handler, and the supervisor checks its barrier once.

use crate::{
    buffer::CaptureState,
    channel::{ChannelId, CHANNEL_COUNT},
    config::{AcquisitionPlan, PlanError},
    conversion::{ConversionResult, ResultRegister},
    engine::AcquisitionEngine,
    supervisor::Supervisor,
    trigger::{TriggerBank, TriggerConfig, TriggerId, TriggerSource},
};

/// Simulated up-counting timer
#[derive(Debug, Clone)]
pub struct SimTrigger {
    /// Programmed period and compare threshold
    config: TriggerConfig,
    /// Current count, `0..period`
    counter: u16,
    /// Counter running
    armed: bool,
    /// Start-of-conversion output enabled
    soc_enabled: bool,
}

impl SimTrigger {
    /// Unconfigured, disarmed timer
    pub const fn new() -> Self {
        Self {
            config: TriggerConfig::new(1, 0),
            counter: 0,
            armed: false,
            soc_enabled: false,
        }
    }

    /// Advance one tick. Returns `true` if a start-of-conversion pulse fired on this tick.
    pub fn tick(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        let pulse = self.soc_enabled && self.counter == self.config.compare;
        self.counter = (self.counter + 1) % self.config.period;
        pulse
    }

    /// Current count
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Counter running
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Default for SimTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerSource for SimTrigger {
    fn configure(&mut self, config: TriggerConfig) {
        self.config = config;
        self.counter = 0;
        self.armed = false;
        self.soc_enabled = false;
    }

    fn arm(&mut self) {
        self.soc_enabled = true;
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.soc_enabled = false;
        self.armed = false;
        self.counter = 0;
    }
}

/// One simulated timer per channel, addressed by the plan's trigger ids
#[derive(Debug, Clone)]
pub struct SimTriggers {
    /// Trigger id of each slot, in channel order
    ids: [TriggerId; CHANNEL_COUNT],
    /// Timers in channel order
    sources: [SimTrigger; CHANNEL_COUNT],
}

impl SimTriggers {
    /// Timers for the triggers named by `plan`
    pub fn for_plan(plan: &AcquisitionPlan) -> Self {
        Self {
            ids: plan.trigger_ids(),
            sources: [SimTrigger::new(), SimTrigger::new(), SimTrigger::new()],
        }
    }

    /// Advance every timer one tick. Returns which channels received a pulse.
    pub fn tick(&mut self) -> [bool; CHANNEL_COUNT] {
        let mut pulses = [false; CHANNEL_COUNT];
        for (pulse, source) in pulses.iter_mut().zip(self.sources.iter_mut()) {
            *pulse = source.tick();
        }
        pulses
    }

    /// Timer with id `id`
    pub fn get(&self, id: TriggerId) -> Option<&SimTrigger> {
        self.position(id).map(|i| &self.sources[i])
    }

    /// Slot of `id`
    fn position(&self, id: TriggerId) -> Option<usize> {
        self.ids.iter().position(|&slot| slot == id)
    }
}

impl TriggerBank for SimTriggers {
    fn source(&mut self, id: TriggerId) -> Option<&mut dyn TriggerSource> {
        let i = self.position(id)?;
        Some(&mut self.sources[i])
    }
}

/// Simulated converter: one result register per channel plus the pending interrupt bit.
#[derive(Debug, Default)]
pub struct SimConverter {
    /// Result registers, indexed by [`ChannelId::index`]
    results: [ResultRegister; CHANNEL_COUNT],
    /// Completion interrupt pending
    pending: [bool; CHANNEL_COUNT],
}

impl SimConverter {
    /// Registers empty, nothing pending
    pub const fn new() -> Self {
        Self {
            results: [ResultRegister::new(), ResultRegister::new(), ResultRegister::new()],
            pending: [false; CHANNEL_COUNT],
        }
    }

    /// Finish a conversion on `id` and pend its completion interrupt.
    pub fn convert(&mut self, id: ChannelId, raw: u16) {
        self.results[id.index()].deposit(raw);
        self.pending[id.index()] = true;
    }

    /// Run `id`'s completion handler if its interrupt is pending.
    pub fn drain<const N: usize>(
        &mut self,
        engine: &AcquisitionEngine<N>,
        id: ChannelId,
    ) -> Option<CaptureState> {
        if !core::mem::take(&mut self.pending[id.index()]) {
            return None;
        }
        let result = &self.results[id.index()];
        result
            .is_complete()
            .then(|| engine.complete(id, result))
    }

    /// Run every pending completion handler, in channel order.
    pub fn drain_all<const N: usize>(&mut self, engine: &AcquisitionEngine<N>) {
        for id in ChannelId::ALL {
            self.drain(engine, id);
        }
    }

    /// Result register of `id`
    pub fn result(&self, id: ChannelId) -> &ResultRegister {
        &self.results[id.index()]
    }
}

/// Supervisor, simulated timers and simulated converter wired together.
pub struct Testbench<'a, const N: usize> {
    /// Owns the simulated timers
    supervisor: Supervisor<'a, SimTriggers, N>,
    /// Shared by all channels
    converter: SimConverter,
    /// Analog value seen by a channel at a given tick
    input: fn(ChannelId, u32) -> u16,
    /// Ticks played so far
    tick: u32,
}

impl<'a, const N: usize> Testbench<'a, N> {
    /// Build and [start](Supervisor::start) a supervisor over simulated hardware.
    pub fn start(
        engine: &'a AcquisitionEngine<N>,
        plan: &'a AcquisitionPlan,
        input: fn(ChannelId, u32) -> u16,
    ) -> Result<Self, PlanError> {
        let mut supervisor = Supervisor::new(engine, SimTriggers::for_plan(plan), plan)?;
        supervisor.start();
        Ok(Self {
            supervisor,
            converter: SimConverter::new(),
            input,
            tick: 0,
        })
    }

    /// Play one tick. Returns the cycle number if the barrier released on this tick.
    pub fn step(&mut self) -> Option<u32> {
        self.tick += 1;
        let pulses = self.supervisor.triggers_mut().tick();
        for (id, pulse) in ChannelId::ALL.into_iter().zip(pulses) {
            if pulse {
                self.converter.convert(id, (self.input)(id, self.tick));
            }
        }
        self.converter.drain_all(self.supervisor.engine());
        self.supervisor.poll()
    }

    /// Play `ticks` ticks, returning the cycles released along the way
    pub fn run_for(&mut self, ticks: u32) -> u32 {
        (0..ticks).filter_map(|_| self.step()).count() as u32
    }

    /// Ticks played so far
    pub fn ticks(&self) -> u32 {
        self.tick
    }

    /// The supervisor under test
    pub fn supervisor(&mut self) -> &mut Supervisor<'a, SimTriggers, N> {
        &mut self.supervisor
    }

    /// The simulated converter
    pub fn converter(&mut self) -> &mut SimConverter {
        &mut self.converter
    }
}
