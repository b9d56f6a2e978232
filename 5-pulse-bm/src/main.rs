mod bench;

use esp_idf_hal::gpio::{InterruptType, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::task::notification::Notification;
use esp_idf_svc::log::EspLogger;
use log::info;
use pulse::esp::{EspGpio, EspPcnt, EspTimer};
use pulse::{Pcnt, Scheduler};

// GPIO21 must be wired to GPIO22
const OUT_PIN_NUM: i32 = 21;
const IN_PIN_NUM: i32 = 22;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    info!(
        "Testing pulse counter and pulse timer, outputting on pin {} and reading on pin {}",
        OUT_PIN_NUM, IN_PIN_NUM
    );

    let peripherals = Peripherals::take()?;
    let mut out = PinDriver::output(peripherals.pins.gpio21)?;
    out.set_low()?;
    let mut input = PinDriver::input(peripherals.pins.gpio22)?;

    let pcnt_driver = EspPcnt::take().ok_or_else(|| anyhow::anyhow!("PCNT already taken"))?;
    let pcnt = Pcnt::new(pcnt_driver);
    bench::counter(&pcnt, &mut out, input.pin())?;

    let notification = Notification::new();
    let scheduler: &'static bench::PulseScheduler =
        Box::leak(Box::new(Scheduler::new(notification.notifier())));
    static GPIO: EspGpio = EspGpio;
    static CLOCK: EspTimer = EspTimer;

    input.set_interrupt_type(InterruptType::PosEdge)?;
    bench::pulsetimer(&GPIO, &CLOCK, scheduler, &notification, &mut out, &mut input)?;

    info!("DONE");
    loop {
        notification.wait(esp_idf_hal::delay::BLOCK);
        scheduler.run_pending();
    }
}
