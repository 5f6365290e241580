// SPDX-License-Identifier: Apache-2.0

//! Per-channel capture state and the completion handler.
//!
//! [`AcquisitionEngine`] groups the three capture buffers and fill signals. It is built once
//! (usually as a `static`, its constructor is `const`) and shared by reference between the
//! completion handlers and the [`Supervisor`](crate::supervisor::Supervisor).
//!
//! Each buffer has exactly one writer, its channel's completion handler. Buffer access still
//! goes through a [`critical_section::Mutex`] so that the mainline sees whole appends, and so
//! that the barrier release can observe and clear all fill signals without a handler slipping
//! in between.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::{
    buffer::{CaptureBuffer, CaptureState, FillSignal},
    channel::{ChannelId, CHANNEL_COUNT},
    conversion::ConversionResult,
};

/// Capture buffer and fill signal of one channel
pub struct ChannelState<const N: usize> {
    /// Written only by the channel's completion handler
    buffer: Mutex<RefCell<CaptureBuffer<N>>>,
    /// Set by the completion handler, cleared by the supervisor
    fill: FillSignal,
}

impl<const N: usize> ChannelState<N> {
    /// Empty buffer, signal clear
    pub const fn new() -> Self {
        Self {
            buffer: Mutex::new(RefCell::new(CaptureBuffer::new())),
            fill: FillSignal::new(),
        }
    }
}

impl<const N: usize> Default for ChannelState<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// All capture state of the acquisition, one [`ChannelState`] per channel.
pub struct AcquisitionEngine<const N: usize> {
    /// Indexed by [`ChannelId::index`]
    channels: [ChannelState<N>; CHANNEL_COUNT],
}

impl<const N: usize> AcquisitionEngine<N> {
    /// Engine with zeroed buffers and cleared signals
    pub const fn new() -> Self {
        Self {
            channels: [ChannelState::new(), ChannelState::new(), ChannelState::new()],
        }
    }

    /// Samples per channel and cycle
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Zero all buffers, rewind all cursors and clear all fill signals.
    ///
    /// Only valid while every trigger is disarmed.
    pub fn reset(&self) {
        critical_section::with(|cs| {
            for channel in &self.channels {
                channel.buffer.borrow_ref_mut(cs).clear();
                channel.fill.clear();
            }
        });
    }

    /// Completion handler for `id`.
    ///
    /// Appends the result, wraps the cursor and sets the fill signal when the buffer is full,
    /// then acknowledges the completion and clears a latched overflow. An overflow means a
    /// sample was lost, which is not recovered or counted.
    ///
    /// Runs in interrupt context: never blocks, never allocates, and must not be reentered for
    /// the same channel.
    pub fn complete<R>(&self, id: ChannelId, result: &R) -> CaptureState
    where
        R: ConversionResult + ?Sized,
    {
        let channel = &self.channels[id.index()];
        let sample = result.result();

        let state = critical_section::with(|cs| {
            if channel.buffer.borrow_ref_mut(cs).insert(sample) {
                channel.fill.set();
            }
            Self::state_of(channel)
        });

        result.clear_complete();

        if result.overflow_latched() {
            result.clear_overflow();
            result.clear_complete();
            #[cfg(feature = "trace_overflow")]
            debug!("Conversion overflow on {} channel, a sample was lost", id);
        }

        state
    }

    /// Current write position of a channel's buffer
    pub fn cursor(&self, id: ChannelId) -> usize {
        critical_section::with(|cs| self.channels[id.index()].buffer.borrow_ref(cs).cursor())
    }

    /// Whether the channel has filled since its signal was last cleared
    pub fn is_full(&self, id: ChannelId) -> bool {
        self.channels[id.index()].fill.is_set()
    }

    /// Capture progress of a channel
    pub fn state(&self, id: ChannelId) -> CaptureState {
        Self::state_of(&self.channels[id.index()])
    }

    /// Fill signals of all channels, indexed by [`ChannelId::index`]
    pub fn fill_signals(&self) -> [bool; CHANNEL_COUNT] {
        ChannelId::ALL.map(|id| self.is_full(id))
    }

    /// All three buffers have filled
    pub fn all_full(&self) -> bool {
        self.channels.iter().all(|channel| channel.fill.is_set())
    }

    /// Clear every fill signal if, and only if, all of them are set.
    ///
    /// Observation and clearing happen in one critical section, so a handler cannot set a signal
    /// in between and have it cleared unseen.
    pub fn try_release(&self) -> bool {
        critical_section::with(|_| {
            if self.all_full() {
                for channel in &self.channels {
                    channel.fill.clear();
                }
                true
            } else {
                false
            }
        })
    }

    /// Clear a single fill signal. The buffer itself is not touched.
    pub fn clear_signal(&self, id: ChannelId) {
        self.channels[id.index()].fill.clear();
    }

    /// Run `f` on a channel's buffer without interference from its completion handler.
    ///
    /// Keep `f` short: the handler for this channel cannot run until it returns.
    pub fn with_buffer<T>(&self, id: ChannelId, f: impl FnOnce(&CaptureBuffer<N>) -> T) -> T {
        critical_section::with(|cs| f(&self.channels[id.index()].buffer.borrow_ref(cs)))
    }

    /// Copy a channel's samples out
    pub fn snapshot(&self, id: ChannelId) -> [u16; N] {
        self.with_buffer(id, |buffer| *buffer.samples())
    }

    /// State derived from the fill signal
    fn state_of(channel: &ChannelState<N>) -> CaptureState {
        if channel.fill.is_set() {
            CaptureState::Full
        } else {
            CaptureState::Filling
        }
    }
}

impl<const N: usize> Default for AcquisitionEngine<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::ResultRegister;

    /// Deposit and immediately drain one conversion
    fn deliver<const N: usize>(
        engine: &AcquisitionEngine<N>,
        id: ChannelId,
        raw: u16,
    ) -> CaptureState {
        let reg = ResultRegister::new();
        reg.deposit(raw);
        engine.complete(id, &reg)
    }

    #[test]
    fn capacity_completions_wrap_and_signal() {
        let engine = AcquisitionEngine::<8>::new();
        for id in ChannelId::ALL {
            for k in 0..7 {
                assert_eq!(deliver(&engine, id, k), CaptureState::Filling);
            }
            assert!(!engine.is_full(id));
            assert_eq!(deliver(&engine, id, 7), CaptureState::Full);
            assert_eq!(engine.cursor(id), 0);
            assert!(engine.is_full(id));
        }
    }

    #[test]
    fn slot_k_holds_kth_sample() {
        let engine = AcquisitionEngine::<6>::new();
        let samples = [4095, 0, 17, 2048, 3, 1000];
        for s in samples {
            deliver(&engine, ChannelId::Pilot, s);
        }
        assert_eq!(engine.snapshot(ChannelId::Pilot), samples);
        // other channels untouched
        assert_eq!(engine.snapshot(ChannelId::Mains), [0; 6]);
        assert_eq!(engine.cursor(ChannelId::Terminal), 0);
    }

    #[test]
    fn handler_keeps_writing_after_fill() {
        let engine = AcquisitionEngine::<2>::new();
        deliver(&engine, ChannelId::Mains, 1);
        deliver(&engine, ChannelId::Mains, 2);
        assert_eq!(deliver(&engine, ChannelId::Mains, 3), CaptureState::Full);
        assert_eq!(engine.cursor(ChannelId::Mains), 1);
        assert_eq!(engine.snapshot(ChannelId::Mains), [3, 2]);
    }

    #[test]
    fn overflow_keeps_single_newest_result() {
        let engine = AcquisitionEngine::<4>::new();
        let reg = ResultRegister::new();
        reg.deposit(100);
        reg.deposit(200);
        assert!(reg.overflow_latched());

        engine.complete(ChannelId::Terminal, &reg);

        assert_eq!(engine.cursor(ChannelId::Terminal), 1);
        assert_eq!(engine.with_buffer(ChannelId::Terminal, |b| b.filled()[0]), 200);
        assert!(!reg.overflow_latched());
        assert!(!reg.is_complete());
    }

    #[test]
    fn completion_is_acknowledged() {
        let engine = AcquisitionEngine::<4>::new();
        let reg = ResultRegister::new();
        reg.deposit(9);
        engine.complete(ChannelId::Mains, &reg);
        assert!(!reg.is_complete());
    }

    #[test]
    fn release_requires_all_signals() {
        let engine = AcquisitionEngine::<1>::new();
        deliver(&engine, ChannelId::Mains, 1);
        deliver(&engine, ChannelId::Pilot, 1);
        assert_eq!(engine.fill_signals(), [true, true, false]);
        assert!(!engine.try_release());
        assert_eq!(engine.fill_signals(), [true, true, false]);

        deliver(&engine, ChannelId::Terminal, 1);
        assert!(engine.try_release());
        assert_eq!(engine.fill_signals(), [false; 3]);
        for id in ChannelId::ALL {
            assert_eq!(engine.state(id), CaptureState::Filling);
        }
    }

    #[test]
    fn reset_zeroes_everything() {
        let engine = AcquisitionEngine::<2>::new();
        for id in ChannelId::ALL {
            deliver(&engine, id, 5);
            deliver(&engine, id, 6);
            deliver(&engine, id, 7);
        }
        engine.reset();
        for id in ChannelId::ALL {
            assert_eq!(engine.cursor(id), 0);
            assert!(!engine.is_full(id));
            assert_eq!(engine.snapshot(id), [0, 0]);
        }
    }
}
