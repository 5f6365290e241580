// SPDX-License-Identifier: Apache-2.0

//! Periodic start-of-conversion sources.
//!
//! A trigger source is a free-running up-counter. Once [armed](TriggerSource::arm) it emits one
//! start-of-conversion pulse per period, at the tick where the counter reaches its compare
//! threshold. While disarmed the counter is held at zero and nothing is emitted.

use core::fmt;

/// Hardware timer number of a trigger source (e.g. the PWM slice number).
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TriggerId(pub u8);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer{}", self.0)
    }
}

/// Period and compare threshold of a trigger source, fixed for the whole run.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TriggerConfig {
    /// Timer ticks per trigger period
    pub period: u16,
    /// Tick within the period at which the start-of-conversion pulse fires. Must be below
    /// `period`.
    pub compare: u16,
}

impl TriggerConfig {
    /// Create a trigger configuration. Validity is checked with [`TriggerConfig::is_valid`] when
    /// the acquisition plan is validated.
    pub const fn new(period: u16, compare: u16) -> Self {
        Self { period, compare }
    }

    /// `compare < period`, which also excludes a zero period
    pub const fn is_valid(&self) -> bool {
        self.compare < self.period
    }
}

/// Register-level control of one trigger source. None of these operations can fail.
pub trait TriggerSource {
    /// Program period and compare threshold. Leaves the source disarmed with the counter at zero.
    fn configure(&mut self, config: TriggerConfig);

    /// Enable pulse output and let the counter run in up-count mode.
    fn arm(&mut self);

    /// Freeze the counter at zero and suppress pulse output.
    fn disarm(&mut self);
}

/// A set of trigger sources addressed by [`TriggerId`].
pub trait TriggerBank {
    /// Look up a source. `None` if this bank does not drive `id`.
    fn source(&mut self, id: TriggerId) -> Option<&mut dyn TriggerSource>;

    /// Arm all listed sources so their periods start from a common epoch.
    ///
    /// The default arms them one after another; banks whose hardware can start several timers
    /// with one register write should override this.
    fn arm_together(&mut self, ids: &[TriggerId]) {
        for &id in ids {
            match self.source(id) {
                Some(source) => source.arm(),
                None => warn!("No trigger source {} in this bank, not arming it", id),
            }
        }
    }

    /// Disarm all listed sources.
    fn disarm_all(&mut self, ids: &[TriggerId]) {
        for &id in ids {
            match self.source(id) {
                Some(source) => source.disarm(),
                None => warn!("No trigger source {} in this bank, not disarming it", id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_must_be_below_period() {
        assert!(TriggerConfig::new(625, 312).is_valid());
        assert!(TriggerConfig::new(1, 0).is_valid());
        assert!(!TriggerConfig::new(4, 4).is_valid());
        assert!(!TriggerConfig::new(0, 0).is_valid());
    }
}
