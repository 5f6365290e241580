// SPDX-License-Identifier: Apache-2.0

//! Conversion channels and their single-slot result registers.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::{channel::ChannelId, trigger::TriggerId};

/// Analog input number on the converter (e.g. `3` for input A3).
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogPin(pub u8);

/// Interrupt line raised when a channel's conversion completes.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletionLine(pub u8);

/// Static binding of one analog input to one trigger source and one completion line.
///
/// Never reconfigured once the acquisition has started.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConversionChannel {
    /// Channel this binding belongs to
    pub channel: ChannelId,
    /// Converted analog input
    pub pin: AnalogPin,
    /// Sample-and-hold window, in converter clock cycles
    pub sample_window: u8,
    /// Trigger source whose pulses start this channel's conversions
    pub trigger: TriggerId,
    /// Interrupt raised on completion
    pub completion: CompletionLine,
}

impl ConversionChannel {
    /// Bind a channel.
    pub const fn configure(
        channel: ChannelId,
        pin: AnalogPin,
        trigger: TriggerId,
        sample_window: u8,
        completion: CompletionLine,
    ) -> Self {
        Self {
            channel,
            pin,
            sample_window,
            trigger,
            completion,
        }
    }
}

/// Status and result access used by a completion handler.
pub trait ConversionResult {
    /// Latest raw conversion code
    fn result(&self) -> u16;

    /// A result was deposited and has not been acknowledged yet
    fn is_complete(&self) -> bool;

    /// Acknowledge the completion event.
    fn clear_complete(&self);

    /// A result was deposited while the previous one was still unacknowledged
    fn overflow_latched(&self) -> bool;

    /// Clear the latched overflow status.
    fn clear_overflow(&self);
}

/// One channel's result register with its completion and overflow flags.
///
/// Holds a single result: depositing while the previous completion is still unacknowledged
/// overwrites the value and latches overflow. The converter side only calls
/// [`ResultRegister::deposit`]; everything else belongs to the channel's completion handler.
#[derive(Debug)]
pub struct ResultRegister {
    /// Latest raw conversion code
    value: AtomicU16,
    /// Completion event pending
    complete: AtomicBool,
    /// Latched overflow status
    overflow: AtomicBool,
}

impl ResultRegister {
    /// Empty register, no events pending
    pub const fn new() -> Self {
        Self {
            value: AtomicU16::new(0),
            complete: AtomicBool::new(false),
            overflow: AtomicBool::new(false),
        }
    }

    /// Store a finished conversion and raise the completion event.
    pub fn deposit(&self, raw: u16) {
        if self.complete.load(Ordering::Acquire) {
            self.overflow.store(true, Ordering::Release);
        }
        self.value.store(raw, Ordering::Relaxed);
        self.complete.store(true, Ordering::Release);
    }
}

impl Default for ResultRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionResult for ResultRegister {
    fn result(&self) -> u16 {
        self.value.load(Ordering::Relaxed)
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    fn clear_complete(&self) {
        self.complete.store(false, Ordering::Release);
    }

    fn overflow_latched(&self) -> bool {
        self.overflow.load(Ordering::Acquire)
    }

    fn clear_overflow(&self) {
        self.overflow.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_raises_completion() {
        let reg = ResultRegister::new();
        assert!(!reg.is_complete());

        reg.deposit(1234);
        assert!(reg.is_complete());
        assert!(!reg.overflow_latched());
        assert_eq!(reg.result(), 1234);
    }

    #[test]
    fn undrained_deposit_overwrites_and_latches_overflow() {
        let reg = ResultRegister::new();
        reg.deposit(10);
        reg.deposit(20);

        assert_eq!(reg.result(), 20);
        assert!(reg.overflow_latched());

        reg.clear_complete();
        reg.clear_overflow();
        reg.deposit(30);
        assert!(!reg.overflow_latched());
    }
}
