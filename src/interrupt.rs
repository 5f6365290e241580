//! Process-wide state reached from interrupt handlers, plus the handler bodies.

#[cfg(feature = "rp2040")]
use core::cell::RefCell;

#[cfg(feature = "rp2040")]
use critical_section::Mutex;

#[cfg(feature = "rp2040")]
use crate::components::ConversionSequencer;
use crate::{
    channel::{ChannelId, CHANNEL_COUNT},
    config::CAPACITY,
    conversion::{ConversionResult, ResultRegister},
    engine::AcquisitionEngine,
};

/// Capture buffers and fill signals, shared by the completion handlers and the supervisor
pub static ENGINE: AcquisitionEngine<CAPACITY> = AcquisitionEngine::new();

/// Result registers filled by the conversion sequencer, indexed by [`ChannelId::index`]
pub static RESULTS: [ResultRegister; CHANNEL_COUNT] =
    [ResultRegister::new(), ResultRegister::new(), ResultRegister::new()];

/// Conversion sequencer for access in the trigger interrupt
#[cfg(feature = "rp2040")]
pub static SEQUENCER: Mutex<RefCell<Option<ConversionSequencer>>> = Mutex::new(RefCell::new(None));

/// Body of the completion interrupt of channel `id`.
///
/// A pended interrupt can arrive after the previous invocation already acknowledged the result
/// it announces (the result then overflowed into the earlier one); such invocations do nothing.
pub fn conversion_complete(id: ChannelId) {
    let result = &RESULTS[id.index()];
    if result.is_complete() {
        ENGINE.complete(id, result);
    }
}

/// Body of the trigger interrupt: run every conversion whose trigger fired.
#[cfg(feature = "rp2040")]
pub fn trigger_fired() {
    critical_section::with(|cs| match SEQUENCER.borrow_ref_mut(cs).as_mut() {
        Some(sequencer) => sequencer.service(),
        None => warn!("Trigger interrupt taken before the conversion sequencer was installed"),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_without_pending_result_is_ignored() {
        let id = ChannelId::Terminal;
        let before = ENGINE.cursor(id);

        conversion_complete(id);
        assert_eq!(ENGINE.cursor(id), before);

        RESULTS[id.index()].deposit(77);
        conversion_complete(id);
        assert_eq!(ENGINE.cursor(id), before + 1);
        assert_eq!(ENGINE.with_buffer(id, |b| b.samples()[before]), 77);

        // second pend for the same, already acknowledged result
        conversion_complete(id);
        assert_eq!(ENGINE.cursor(id), before + 1);
    }
}
