// SPDX-License-Identifier: Apache-2.0

//! Per-channel sample ring and the fill signal it raises on wrap-around.

use core::sync::atomic::{AtomicBool, Ordering};

/// Write position into a [`CaptureBuffer`].
#[derive(Default, Debug, Ord, PartialOrd, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cursor(usize);

impl Cursor {
    /// Get current cursor value
    pub fn get(&self) -> usize {
        self.0
    }

    /// Advance by one slot. Reaching `limit` wraps back to 0, in which case `true` is returned.
    pub fn advance(&mut self, limit: usize) -> bool {
        self.0 += 1;
        if self.0 >= limit {
            self.0 = 0;
            true
        } else {
            false
        }
    }
}

/// Capture progress of one channel.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureState {
    /// The buffer has not wrapped since the fill signal was last cleared
    Filling,
    /// The buffer wrapped and the fill signal is waiting for the supervisor
    Full,
}

/// Fixed-capacity sequence of raw conversion codes with a write cursor.
///
/// Only the channel's completion handler writes to it. After `N` inserts the cursor is back at
/// 0, so the next cycle overwrites the oldest samples in place: anything that needs the data
/// must read it before the channel fills again.
pub struct CaptureBuffer<const N: usize> {
    /// Raw conversion codes, zeroed at startup
    samples: [u16; N],
    /// Slot that receives the next sample
    cursor: Cursor,
}

impl<const N: usize> CaptureBuffer<N> {
    /// Number of samples per capture cycle
    pub const CAPACITY: usize = N;
    /// Rejects zero-sized buffers at compile time
    const NONZERO: () = assert!(N > 0, "capture buffers need at least one slot");

    /// Zeroed buffer, cursor at 0
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO;
        Self {
            samples: [0u16; N],
            cursor: Cursor(0),
        }
    }

    /// Store a sample at the cursor and advance it.
    ///
    /// Returns `true` when this sample filled the last slot, in which case the cursor has
    /// already wrapped to 0.
    pub fn insert(&mut self, sample: u16) -> bool {
        self.samples[self.cursor.get()] = sample;
        self.cursor.advance(N)
    }

    /// Slot that receives the next sample
    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    /// All slots. Slot `k` holds the `k`-th sample since the last wrap; slots at and past the
    /// cursor still hold the previous cycle.
    pub fn samples(&self) -> &[u16; N] {
        &self.samples
    }

    /// Samples written since the last wrap
    pub fn filled(&self) -> &[u16] {
        &self.samples[..self.cursor.get()]
    }

    /// Zero every slot and move the cursor back to the start.
    pub fn clear(&mut self) {
        self.samples = [0u16; N];
        self.cursor = Cursor::default();
    }
}

impl<const N: usize> Default for CaptureBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer-full flag of one channel.
///
/// Set by the channel's completion handler when its buffer wraps, cleared by the supervisor once
/// every channel has filled.
#[derive(Debug, Default)]
pub struct FillSignal(AtomicBool);

impl FillSignal {
    /// Cleared signal
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark the buffer as full
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the signal
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Current value
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_hold_samples_in_arrival_order() {
        let mut buffer = CaptureBuffer::<5>::new();
        for sample in [7, 3, 9] {
            assert!(!buffer.insert(sample));
        }

        assert_eq!(buffer.cursor(), 3);
        assert_eq!(buffer.filled(), &[7, 3, 9]);
        assert_eq!(buffer.samples(), &[7, 3, 9, 0, 0]);
    }

    #[test]
    fn last_slot_wraps_cursor() {
        let mut buffer = CaptureBuffer::<3>::new();
        assert!(!buffer.insert(1));
        assert!(!buffer.insert(2));
        assert!(buffer.insert(3));
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.samples(), &[1, 2, 3]);

        // next cycle overwrites in place
        assert!(!buffer.insert(4));
        assert_eq!(buffer.samples(), &[4, 2, 3]);
        assert_eq!(buffer.filled(), &[4]);
    }

    #[test]
    fn single_slot_buffer_wraps_every_insert() {
        let mut buffer = CaptureBuffer::<1>::new();
        assert!(buffer.insert(5));
        assert!(buffer.insert(6));
        assert_eq!(buffer.samples(), &[6]);
    }

    #[test]
    fn clear_zeroes_and_rewinds() {
        let mut buffer = CaptureBuffer::<4>::new();
        buffer.insert(11);
        buffer.insert(12);
        buffer.clear();
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.samples(), &[0; 4]);
    }

    #[test]
    fn fill_signal_set_and_clear() {
        let signal = FillSignal::new();
        assert!(!signal.is_set());
        signal.set();
        assert!(signal.is_set());
        signal.clear();
        assert!(!signal.is_set());
    }
}
