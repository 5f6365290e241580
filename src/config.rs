// SPDX-License-Identifier: Apache-2.0

//! Static acquisition plan.
//!
//! Everything here is fixed at compile time; [`PLAN`] is validated by a `const` assertion, so an
//! invalid binding fails the build instead of misbehaving at runtime.

use core::fmt;

use crate::{
    channel::{ChannelId, CHANNEL_COUNT},
    conversion::{AnalogPin, CompletionLine, ConversionChannel},
    trigger::{TriggerConfig, TriggerId},
};

/// Samples per channel and capture cycle
pub const CAPACITY: usize = 2000;

/// Trigger period in timer ticks. With [`PWM_CLOCK_DIVIDER`] at 2 on a 125 MHz system clock,
/// one period is 10 us.
pub const PERIOD_TICKS: u16 = 625;

/// Start-of-conversion point within the period, mid-period
pub const COMPARE_TICKS: u16 = 312;

/// Sample-and-hold window in converter clock cycles
pub const SAMPLE_WINDOW_CYCLES: u8 = 10;

/// Integer divider between the system clock and the trigger timers
pub const PWM_CLOCK_DIVIDER: u8 = 2;

/// Trigger and conversion binding of one channel
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelPlan {
    /// Pin, trigger and completion binding
    pub conversion: ConversionChannel,
    /// Period and compare threshold of the bound trigger
    pub trigger: TriggerConfig,
}

/// Bindings of all three channels, indexed by [`ChannelId::index`]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquisitionPlan {
    /// Per-channel bindings
    pub channels: [ChannelPlan; CHANNEL_COUNT],
}

/// Reasons an [`AcquisitionPlan`] is rejected
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlanError {
    /// Entry at this index is bound to a different channel
    Misplaced(ChannelId),
    /// Compare threshold is not below the period
    CompareNotBelowPeriod(ChannelId),
    /// Sample window of zero cycles
    ZeroSampleWindow(ChannelId),
    /// Two channels are started by the same trigger source
    SharedTrigger(ChannelId, ChannelId),
    /// Two channels raise the same completion interrupt
    SharedCompletion(ChannelId, ChannelId),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misplaced(id) => write!(f, "{id} binding is stored at another channel's index"),
            Self::CompareNotBelowPeriod(id) => {
                write!(f, "{id} trigger compare threshold must be below its period")
            }
            Self::ZeroSampleWindow(id) => write!(f, "{id} sample window must be at least 1 cycle"),
            Self::SharedTrigger(a, b) => write!(f, "{a} and {b} share a trigger source"),
            Self::SharedCompletion(a, b) => write!(f, "{a} and {b} share a completion interrupt"),
        }
    }
}

impl AcquisitionPlan {
    /// Wrap per-channel bindings
    pub const fn new(channels: [ChannelPlan; CHANNEL_COUNT]) -> Self {
        Self { channels }
    }

    /// Trigger sources in channel order
    pub const fn trigger_ids(&self) -> [TriggerId; CHANNEL_COUNT] {
        [
            self.channels[0].conversion.trigger,
            self.channels[1].conversion.trigger,
            self.channels[2].conversion.trigger,
        ]
    }

    /// Channel started by trigger `id`
    pub fn channel_for_trigger(&self, id: TriggerId) -> Option<ChannelId> {
        self.channels
            .iter()
            .find(|plan| plan.conversion.trigger == id)
            .map(|plan| plan.conversion.channel)
    }

    /// Check the static invariants: entries in channel order, `compare < period`, non-zero
    /// sample windows, and no trigger or completion line shared between channels.
    pub const fn validate(&self) -> Result<(), PlanError> {
        let mut i = 0;
        while i < CHANNEL_COUNT {
            let plan = &self.channels[i];
            let id = plan.conversion.channel;
            if id.index() != i {
                return Err(PlanError::Misplaced(id));
            }
            if !plan.trigger.is_valid() {
                return Err(PlanError::CompareNotBelowPeriod(id));
            }
            if plan.conversion.sample_window == 0 {
                return Err(PlanError::ZeroSampleWindow(id));
            }

            let mut j = i + 1;
            while j < CHANNEL_COUNT {
                let other = &self.channels[j].conversion;
                if plan.conversion.trigger.0 == other.trigger.0 {
                    return Err(PlanError::SharedTrigger(id, other.channel));
                }
                if plan.conversion.completion.0 == other.completion.0 {
                    return Err(PlanError::SharedCompletion(id, other.channel));
                }
                j += 1;
            }
            i += 1;
        }
        Ok(())
    }
}

/// Same trigger timing on every channel, mid-period sampling
const TRIGGER: TriggerConfig = TriggerConfig::new(PERIOD_TICKS, COMPARE_TICKS);

/// Channel bindings of the board.
///
/// | Channel | Input | Trigger | Completion |
/// | ------- | ----- | ------- | ---------- |
/// | mains | ADC0 (GPIO26) | PWM slice 1 | `SW0_IRQ` |
/// | pilot | ADC1 (GPIO27) | PWM slice 2 | `SW1_IRQ` |
/// | terminal | ADC2 (GPIO28) | PWM slice 4 | `SW2_IRQ` |
pub const PLAN: AcquisitionPlan = AcquisitionPlan::new([
    ChannelPlan {
        conversion: ConversionChannel::configure(
            ChannelId::Mains,
            AnalogPin(0),
            TriggerId(1),
            SAMPLE_WINDOW_CYCLES,
            CompletionLine(0),
        ),
        trigger: TRIGGER,
    },
    ChannelPlan {
        conversion: ConversionChannel::configure(
            ChannelId::Pilot,
            AnalogPin(1),
            TriggerId(2),
            SAMPLE_WINDOW_CYCLES,
            CompletionLine(1),
        ),
        trigger: TRIGGER,
    },
    ChannelPlan {
        conversion: ConversionChannel::configure(
            ChannelId::Terminal,
            AnalogPin(2),
            TriggerId(4),
            SAMPLE_WINDOW_CYCLES,
            CompletionLine(2),
        ),
        trigger: TRIGGER,
    },
]);

const _: () = match PLAN.validate() {
    Ok(()) => (),
    Err(_) => panic!("invalid acquisition plan in config::PLAN"),
};

/// Log the build-time configuration
pub fn dump_to_log() {
    info!(
        "Acquisition config: {} samples per channel, period {} ticks, compare {} ticks, \
        sample window {} cycles, timer divider {}",
        CAPACITY,
        PERIOD_TICKS,
        COMPARE_TICKS,
        SAMPLE_WINDOW_CYCLES,
        PWM_CLOCK_DIVIDER,
    );
    for plan in &PLAN.channels {
        info!(
            "- {}: input {} <- {} (period {}, compare {}), completion line {}",
            plan.conversion.channel,
            plan.conversion.pin.0,
            plan.conversion.trigger,
            plan.trigger.period,
            plan.trigger.compare,
            plan.conversion.completion.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_plan_is_valid() {
        assert_eq!(PLAN.validate(), Ok(()));
        assert_eq!(PLAN.trigger_ids(), [TriggerId(1), TriggerId(2), TriggerId(4)]);
        assert_eq!(PLAN.channel_for_trigger(TriggerId(4)), Some(ChannelId::Terminal));
        assert_eq!(PLAN.channel_for_trigger(TriggerId(3)), None);
    }

    #[test]
    fn shared_trigger_rejected() {
        let mut plan = PLAN;
        plan.channels[2].conversion.trigger = TriggerId(1);
        assert_eq!(
            plan.validate(),
            Err(PlanError::SharedTrigger(ChannelId::Mains, ChannelId::Terminal))
        );
    }

    #[test]
    fn shared_completion_rejected() {
        let mut plan = PLAN;
        plan.channels[1].conversion.completion = CompletionLine(2);
        assert_eq!(
            plan.validate(),
            Err(PlanError::SharedCompletion(ChannelId::Pilot, ChannelId::Terminal))
        );
    }

    #[test]
    fn compare_at_period_rejected() {
        let mut plan = PLAN;
        plan.channels[1].trigger = TriggerConfig::new(100, 100);
        assert_eq!(
            plan.validate(),
            Err(PlanError::CompareNotBelowPeriod(ChannelId::Pilot))
        );
    }

    #[test]
    fn zero_sample_window_rejected() {
        let mut plan = PLAN;
        plan.channels[0].conversion.sample_window = 0;
        assert_eq!(plan.validate(), Err(PlanError::ZeroSampleWindow(ChannelId::Mains)));
    }

    #[test]
    fn swapped_entries_rejected() {
        let mut plan = PLAN;
        plan.channels.swap(0, 1);
        assert_eq!(plan.validate(), Err(PlanError::Misplaced(ChannelId::Pilot)));
    }
}
