//! Board components: PWM trigger slices, the conversion sequencer and the pilot-level rails.
//!
//! Everything touching RP2040 peripherals requires the `rp2040` feature.

#[cfg(feature = "rp2040")]
pub use self::board::*;

/// Voltage selected on the control pilot output stage
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PilotLevel {
    /// 9 V rail
    Volts9,
    /// 6 V rail
    Volts6,
    /// 3.3 V rail
    Volts3v3,
}

impl PilotLevel {
    /// Output state of the (9 V, 6 V, 3.3 V) rail selects. Exactly one is high.
    pub const fn rails(self) -> [bool; 3] {
        match self {
            Self::Volts9 => [true, false, false],
            Self::Volts6 => [false, true, false],
            Self::Volts3v3 => [false, false, true],
        }
    }
}

/// Pull-down resistance presented on the pilot line
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PilotLoad {
    /// 220 ohm
    Ohms220,
    /// 680 ohm
    Ohms680,
    /// 1500 ohm
    Ohms1500,
}

impl PilotLoad {
    /// Output state of the (220, 680, 1500 ohm) selects for `load`. `None` disconnects all three.
    pub const fn selects(load: Option<Self>) -> [bool; 3] {
        match load {
            Some(Self::Ohms220) => [true, false, false],
            Some(Self::Ohms680) => [false, true, false],
            Some(Self::Ohms1500) => [false, false, true],
            None => [false; 3],
        }
    }
}

#[cfg(feature = "rp2040")]
mod board {
    use core::convert::Infallible;

    use cortex_m::peripheral::NVIC;
    use embedded_hal::{
        digital::{OutputPin, PinState},
        pwm::SetDutyCycle,
    };
    use embedded_hal_02::adc::OneShot;
    use rp2040_hal::{
        adc::{Adc, AdcPin},
        gpio::{
            bank0::{
                Gpio10, Gpio11, Gpio12, Gpio13, Gpio26, Gpio27, Gpio28, Gpio6, Gpio7, Gpio8, Gpio9,
            },
            FunctionNull, FunctionSio, Pin, PullDown, PullNone, SioInput, SioOutput,
        },
        pac,
        pwm::{FreeRunning, Pwm1, Pwm2, Pwm4, Slice, SliceId, ValidSliceMode},
    };

    use super::{PilotLevel, PilotLoad};
    use crate::{
        channel::ChannelId,
        config::PLAN,
        conversion::CompletionLine,
        interrupt::RESULTS,
        trigger::{TriggerBank, TriggerConfig, TriggerId, TriggerSource},
    };

    /// Mains sense input, ADC0
    pub type MainsInput = AdcPin<Pin<Gpio26, FunctionSio<SioInput>, PullNone>>;
    /// Controller-side pilot input, ADC1
    pub type PilotInput = AdcPin<Pin<Gpio27, FunctionSio<SioInput>, PullNone>>;
    /// Terminal-side pilot input, ADC2
    pub type TerminalInput = AdcPin<Pin<Gpio28, FunctionSio<SioInput>, PullNone>>;

    /// Push-pull rail select output
    type RailPin<I> = Pin<I, FunctionSio<SioOutput>, PullDown>;

    /// Software interrupt raised for a completion line
    pub fn completion_interrupt(line: CompletionLine) -> Option<pac::Interrupt> {
        match line.0 {
            0 => Some(pac::Interrupt::SW0_IRQ),
            1 => Some(pac::Interrupt::SW1_IRQ),
            2 => Some(pac::Interrupt::SW2_IRQ),
            3 => Some(pac::Interrupt::SW3_IRQ),
            4 => Some(pac::Interrupt::SW4_IRQ),
            5 => Some(pac::Interrupt::SW5_IRQ),
            _ => None,
        }
    }

    /// PWM slice used as a trigger source.
    ///
    /// Slices only interrupt on wrap. Arming preloads the counter so the first wrap lands
    /// `compare` ticks after the start, and every later one a full period after that, which is
    /// where a compare-match trigger would fire. Channel A toggles at `compare` so the sampling
    /// instant can be checked on a scope.
    pub struct PwmTrigger<I: SliceId>
    where
        FreeRunning: ValidSliceMode<I>,
    {
        /// The slice
        slice: Slice<I, FreeRunning>,
        /// Last configuration
        config: TriggerConfig,
    }

    impl<I: SliceId> PwmTrigger<I>
    where
        FreeRunning: ValidSliceMode<I>,
    {
        /// Take a slice, stop it, and set its clock divider.
        pub fn new(mut slice: Slice<I, FreeRunning>, divider: u8) -> Self {
            slice.disable_interrupt();
            slice.disable();
            slice.set_div_int(divider);
            slice.set_counter(0);
            Self {
                slice,
                config: TriggerConfig::new(1, 0),
            }
        }

        /// Slice number
        pub fn id(&self) -> TriggerId {
            TriggerId(I::DYN.num)
        }

        /// Bit of this slice in the PWM `EN` and `INTR` registers
        fn mask(&self) -> u32 {
            1 << I::DYN.num
        }

        /// Preload the counter and unmask the wrap interrupt, leaving the slice stopped
        fn prime(&mut self) {
            let top = self.config.period - 1;
            self.slice.set_counter(top - self.config.compare);
            self.slice.clear_interrupt();
            self.slice.enable_interrupt();
        }
    }

    impl<I: SliceId> TriggerSource for PwmTrigger<I>
    where
        FreeRunning: ValidSliceMode<I>,
    {
        fn configure(&mut self, config: TriggerConfig) {
            self.disarm();
            self.slice.set_top(config.period - 1);
            self.slice
                .channel_a
                .set_duty_cycle(config.compare)
                .unwrap_or_else(|never| match never {});
            self.config = config;
        }

        fn arm(&mut self) {
            self.prime();
            self.slice.enable();
        }

        fn disarm(&mut self) {
            self.slice.disable_interrupt();
            self.slice.disable();
            self.slice.set_counter(0);
        }
    }

    /// The three trigger slices of the board
    pub struct PwmTriggers {
        /// Drives the mains channel
        mains: PwmTrigger<Pwm1>,
        /// Drives the controller-side pilot channel
        pilot: PwmTrigger<Pwm2>,
        /// Drives the terminal-side pilot channel
        terminal: PwmTrigger<Pwm4>,
    }

    impl PwmTriggers {
        /// Take the trigger slices. All run from the system clock divided by `divider`.
        pub fn new(
            pwm1: Slice<Pwm1, FreeRunning>,
            pwm2: Slice<Pwm2, FreeRunning>,
            pwm4: Slice<Pwm4, FreeRunning>,
            divider: u8,
        ) -> Self {
            Self {
                mains: PwmTrigger::new(pwm1, divider),
                pilot: PwmTrigger::new(pwm2, divider),
                terminal: PwmTrigger::new(pwm4, divider),
            }
        }

        /// Prime slice `id` and return its enable bit
        fn prime(&mut self, id: TriggerId) -> Option<u32> {
            if id == self.mains.id() {
                self.mains.prime();
                Some(self.mains.mask())
            } else if id == self.pilot.id() {
                self.pilot.prime();
                Some(self.pilot.mask())
            } else if id == self.terminal.id() {
                self.terminal.prime();
                Some(self.terminal.mask())
            } else {
                None
            }
        }
    }

    impl TriggerBank for PwmTriggers {
        fn source(&mut self, id: TriggerId) -> Option<&mut dyn TriggerSource> {
            if id == self.mains.id() {
                Some(&mut self.mains)
            } else if id == self.pilot.id() {
                Some(&mut self.pilot)
            } else if id == self.terminal.id() {
                Some(&mut self.terminal)
            } else {
                None
            }
        }

        /// Starts every listed slice with a single write to the PWM `EN` register.
        fn arm_together(&mut self, ids: &[TriggerId]) {
            let mut enable = 0;
            for &id in ids {
                match self.prime(id) {
                    Some(mask) => enable |= mask,
                    None => warn!("No PWM slice {} in this bank, not arming it", id),
                }
            }

            // SAFETY: only sets enable bits of slices owned by this bank
            let pwm = unsafe { &*pac::PWM::ptr() };
            pwm.en().modify(|r, w| unsafe { w.bits(r.bits() | enable) });
        }
    }

    /// Runs conversions for the trigger interrupt and hands results to the completion handlers.
    ///
    /// The RP2040 has one converter and no hardware trigger input, so the PWM wrap interrupt
    /// plays the trigger: for every slice that wrapped it converts the bound input, deposits the
    /// code in the channel's [`RESULTS`] register and pends the channel's completion interrupt.
    pub struct ConversionSequencer {
        /// The converter
        adc: Adc,
        /// ADC0
        mains: MainsInput,
        /// ADC1
        pilot: PilotInput,
        /// ADC2
        terminal: TerminalInput,
    }

    impl ConversionSequencer {
        /// Take the converter and the three analog inputs.
        pub fn new(
            adc: Adc,
            mains: MainsInput,
            pilot: PilotInput,
            terminal: TerminalInput,
        ) -> Self {
            Self {
                adc,
                mains,
                pilot,
                terminal,
            }
        }

        /// Convert every channel whose trigger wrapped since the last call.
        pub fn service(&mut self) {
            // SAFETY: reads the masked status and acknowledges only the bits handled below
            let pwm = unsafe { &*pac::PWM::ptr() };
            let fired = pwm.ints().read().bits();

            for plan in &PLAN.channels {
                let mask = 1u32 << plan.conversion.trigger.0;
                if fired & mask == 0 {
                    continue;
                }
                pwm.intr().write(|w| unsafe { w.bits(mask) });

                let id = plan.conversion.channel;
                let raw = self.convert(id);
                RESULTS[id.index()].deposit(raw);

                match completion_interrupt(plan.conversion.completion) {
                    Some(irq) => NVIC::pend(irq),
                    None => error!(
                        "No completion interrupt for line {}, {} result dropped",
                        plan.conversion.completion.0,
                        id
                    ),
                }
            }
        }

        /// Blocking single conversion of `id`'s input
        fn convert(&mut self, id: ChannelId) -> u16 {
            let raw: Result<u16, _> = match id {
                ChannelId::Mains => nb::block!(OneShot::<Adc, u16, _>::read(
                    &mut self.adc,
                    &mut self.mains
                )),
                ChannelId::Pilot => nb::block!(OneShot::<Adc, u16, _>::read(
                    &mut self.adc,
                    &mut self.pilot
                )),
                ChannelId::Terminal => nb::block!(OneShot::<Adc, u16, _>::read(
                    &mut self.adc,
                    &mut self.terminal
                )),
            };
            raw.unwrap_or_else(|_| {
                warn!("ADC read failed on {} channel", id);
                0
            })
        }
    }

    /// Rail select outputs of the pilot stage
    pub struct PilotRails {
        /// Currently selected level
        pub level: PilotLevel,
        /// 9 V select
        rail_9v: RailPin<Gpio6>,
        /// 6 V select
        rail_6v: RailPin<Gpio7>,
        /// 3.3 V select
        rail_3v3: RailPin<Gpio8>,
    }

    impl PilotRails {
        /// Configure the select pins and apply `level`.
        pub fn init(
            rail_9v: Pin<Gpio6, FunctionNull, PullDown>,
            rail_6v: Pin<Gpio7, FunctionNull, PullDown>,
            rail_3v3: Pin<Gpio8, FunctionNull, PullDown>,
            level: PilotLevel,
        ) -> Self {
            let mut rails = Self {
                level,
                rail_9v: rail_9v.into_push_pull_output_in_state(PinState::Low),
                rail_6v: rail_6v.into_push_pull_output_in_state(PinState::Low),
                rail_3v3: rail_3v3.into_push_pull_output_in_state(PinState::Low),
            };
            rails.select(level);
            rails
        }

        /// Switch rails. The other selects go low before the new one goes high.
        pub fn select(&mut self, level: PilotLevel) {
            let [on_9v, on_6v, on_3v3] = level.rails();
            if !on_9v {
                drive(&mut self.rail_9v, false);
            }
            if !on_6v {
                drive(&mut self.rail_6v, false);
            }
            if !on_3v3 {
                drive(&mut self.rail_3v3, false);
            }

            drive(&mut self.rail_9v, on_9v);
            drive(&mut self.rail_6v, on_6v);
            drive(&mut self.rail_3v3, on_3v3);

            self.level = level;
            debug!("Pilot level set to {}", level);
        }
    }

    /// Load resistor selects and control outputs of the pilot stage.
    ///
    /// Everything starts released: no load, pilot disabled, unmodified.
    pub struct PilotStage {
        /// Connected load, if any
        pub load: Option<PilotLoad>,
        /// 220 ohm select
        load_220r: RailPin<Gpio9>,
        /// 680 ohm select
        load_680r: RailPin<Gpio10>,
        /// 1500 ohm select
        load_1500r: RailPin<Gpio11>,
        /// Enables the 12 V level adapter
        enable: RailPin<Gpio12>,
        /// Switches to the modified pilot waveform
        modified: RailPin<Gpio13>,
    }

    impl PilotStage {
        /// Configure all outputs low.
        pub fn init(
            load_220r: Pin<Gpio9, FunctionNull, PullDown>,
            load_680r: Pin<Gpio10, FunctionNull, PullDown>,
            load_1500r: Pin<Gpio11, FunctionNull, PullDown>,
            enable: Pin<Gpio12, FunctionNull, PullDown>,
            modified: Pin<Gpio13, FunctionNull, PullDown>,
        ) -> Self {
            Self {
                load: None,
                load_220r: load_220r.into_push_pull_output_in_state(PinState::Low),
                load_680r: load_680r.into_push_pull_output_in_state(PinState::Low),
                load_1500r: load_1500r.into_push_pull_output_in_state(PinState::Low),
                enable: enable.into_push_pull_output_in_state(PinState::Low),
                modified: modified.into_push_pull_output_in_state(PinState::Low),
            }
        }

        /// Connect `load`, or none. The other selects go low first.
        pub fn select_load(&mut self, load: Option<PilotLoad>) {
            let [on_220r, on_680r, on_1500r] = PilotLoad::selects(load);
            if !on_220r {
                drive(&mut self.load_220r, false);
            }
            if !on_680r {
                drive(&mut self.load_680r, false);
            }
            if !on_1500r {
                drive(&mut self.load_1500r, false);
            }

            drive(&mut self.load_220r, on_220r);
            drive(&mut self.load_680r, on_680r);
            drive(&mut self.load_1500r, on_1500r);

            self.load = load;
            debug!("Pilot load set to {}", load);
        }

        /// Enable or disable the pilot level adapter
        pub fn set_enabled(&mut self, on: bool) {
            drive(&mut self.enable, on);
        }

        /// Select the modified pilot waveform
        pub fn set_modified(&mut self, on: bool) {
            drive(&mut self.modified, on);
        }
    }

    /// Set an infallible output
    fn drive(pin: &mut impl OutputPin<Error = Infallible>, high: bool) {
        pin.set_state(PinState::from(high))
            .unwrap_or_else(|never| match never {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_rail_selected() {
        for level in [PilotLevel::Volts9, PilotLevel::Volts6, PilotLevel::Volts3v3] {
            assert_eq!(level.rails().iter().filter(|&&on| on).count(), 1);
        }
        assert_eq!(PilotLevel::Volts9.rails(), [true, false, false]);
    }

    #[test]
    fn at_most_one_load_connected() {
        for load in [PilotLoad::Ohms220, PilotLoad::Ohms680, PilotLoad::Ohms1500] {
            assert_eq!(PilotLoad::selects(Some(load)).iter().filter(|&&on| on).count(), 1);
        }
        assert_eq!(PilotLoad::selects(Some(PilotLoad::Ohms1500)), [false, false, true]);
        assert_eq!(PilotLoad::selects(None), [false; 3]);
    }
}
