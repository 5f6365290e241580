// SPDX-License-Identifier: Apache-2.0

//! Identifiers for the three capture channels.

use core::fmt;

/// Number of independently triggered channels
pub const CHANNEL_COUNT: usize = 3;

/// One of the three capture channels.
///
/// Each channel owns one trigger, one conversion, one capture buffer and one fill signal.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelId {
    /// 500 VAC mains sense input
    Mains,
    /// Control pilot, measured on the controller side
    Pilot,
    /// Control pilot, measured at the charging terminal
    Terminal,
}

impl ChannelId {
    /// All channels, in index order
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [Self::Mains, Self::Pilot, Self::Terminal];

    /// Position of this channel in per-channel arrays
    pub const fn index(self) -> usize {
        match self {
            Self::Mains => 0,
            Self::Pilot => 1,
            Self::Terminal => 2,
        }
    }

    /// Short label used in log output
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mains => "mains",
            Self::Pilot => "pilot",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_position_in_all() {
        for (i, id) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
        assert_eq!(ChannelId::ALL.len(), CHANNEL_COUNT);
    }
}
