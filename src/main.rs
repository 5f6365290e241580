//! Captures mains, pilot and terminal voltages in lockstep cycles on an RP2040.
#![no_std]
#![no_main]
#![doc(html_playground_url = "https://play.rust-lang.org/")]
#![warn(missing_docs)]

use cortex_m::peripheral::NVIC;
use defmt::{debug, info};
#[allow(unused_imports)]
use defmt_rtt as _;
#[allow(unused_imports)]
use panic_probe as _;
use rp2040_hal::{
    adc::{Adc, AdcPin},
    clocks::init_clocks_and_plls,
    entry,
    gpio::Pins,
    pac::{self, interrupt},
    pwm::Slices,
    Clock, Sio, Watchdog,
};
use triggered_capture::{
    channel::ChannelId,
    components::{ConversionSequencer, PilotLevel, PilotRails, PilotStage, PwmTriggers},
    config::{self, PWM_CLOCK_DIVIDER},
    engine::AcquisitionEngine,
    interrupt::{conversion_complete, trigger_fired, ENGINE, SEQUENCER},
    supervisor::Supervisor,
};

/// Second-stage bootloader, from [rp2040-boot2](https://docs.rs/rp2040-boot2)
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
/// External high-speed crystal on the pico board is 12Mhz
pub const XOSC_FREQ_HZ: u32 = 12_000_000;

/// Trigger interrupt preempts every completion handler
const TRIGGER_PRIORITY: u8 = 0x00;
/// Completion handler priorities, in channel order
const COMPLETION_PRIORITIES: [(pac::Interrupt, u8); 3] = [
    (pac::Interrupt::SW0_IRQ, 0x40),
    (pac::Interrupt::SW1_IRQ, 0x80),
    (pac::Interrupt::SW2_IRQ, 0xC0),
];

/// Main operation loop
#[entry]
fn main() -> ! {
    info!("Capture system startup");
    let mut pac = pac::Peripherals::take().unwrap();
    let mut core = pac::CorePeripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    let clocks = init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();
    debug!(
        "System clock at {=u32} Hz, trigger timers at {=u32} Hz",
        clocks.system_clock.freq().to_Hz(),
        clocks.system_clock.freq().to_Hz() / PWM_CLOCK_DIVIDER as u32
    );
    config::dump_to_log();

    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    // Pilot output stage starts on the 9 V rail (state A)
    let _pilot = PilotRails::init(pins.gpio6, pins.gpio7, pins.gpio8, PilotLevel::Volts9);
    let _pilot_stage = PilotStage::init(
        pins.gpio9,
        pins.gpio10,
        pins.gpio11,
        pins.gpio12,
        pins.gpio13,
    );

    // Trigger slices, stopped until the supervisor arms them
    let pwm_slices = Slices::new(pac.PWM, &mut pac.RESETS);
    let triggers = PwmTriggers::new(
        pwm_slices.pwm1,
        pwm_slices.pwm2,
        pwm_slices.pwm4,
        PWM_CLOCK_DIVIDER,
    );

    // Converter and analog inputs
    let adc = Adc::new(pac.ADC, &mut pac.RESETS);
    let mains = AdcPin::new(pins.gpio26.into_floating_input()).unwrap();
    let pilot = AdcPin::new(pins.gpio27.into_floating_input()).unwrap();
    let terminal = AdcPin::new(pins.gpio28.into_floating_input()).unwrap();
    debug!("critical_section: install conversion sequencer");
    critical_section::with(|cs| {
        SEQUENCER.replace(
            cs,
            Some(ConversionSequencer::new(adc, mains, pilot, terminal)),
        )
    });

    // Bind and enable every handler before anything can trigger
    unsafe {
        core.NVIC
            .set_priority(pac::Interrupt::PWM_IRQ_WRAP, TRIGGER_PRIORITY);
        for (irq, priority) in COMPLETION_PRIORITIES {
            core.NVIC.set_priority(irq, priority);
        }
        NVIC::unmask(pac::Interrupt::PWM_IRQ_WRAP);
        for (irq, _) in COMPLETION_PRIORITIES {
            NVIC::unmask(irq);
        }
    }

    let mut supervisor = match Supervisor::new(&ENGINE, triggers, &config::PLAN) {
        Ok(supervisor) => supervisor,
        Err(err) => defmt::panic!("Acquisition plan rejected: {}", err),
    };
    supervisor.start();
    supervisor.run(report_cycle)
}

/// Per-cycle hook of the supervisor
fn report_cycle<const N: usize>(engine: &AcquisitionEngine<N>, cycle: u32) {
    info!("Capture cycle {=u32} complete", cycle);

    #[cfg(feature = "trace_cycle_samples")]
    for id in ChannelId::ALL {
        engine.with_buffer(id, |buffer| {
            defmt::debug!("{}: {=[u16]}", id, &buffer.samples()[..8.min(N)]);
        });
    }
    #[cfg(not(feature = "trace_cycle_samples"))]
    let _ = engine;
}

/// Trigger timers wrapped: run their conversions
#[interrupt]
fn PWM_IRQ_WRAP() {
    trigger_fired();
}

/// Mains conversion complete
#[interrupt]
fn SW0_IRQ() {
    conversion_complete(ChannelId::Mains);
}

/// Pilot conversion complete
#[interrupt]
fn SW1_IRQ() {
    conversion_complete(ChannelId::Pilot);
}

/// Terminal conversion complete
#[interrupt]
fn SW2_IRQ() {
    conversion_complete(ChannelId::Terminal);
}
