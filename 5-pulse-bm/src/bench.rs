use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::ensure;
use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{Input, InputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::task::notification::{Notification, Notifier};
use log::info;
use pulse::esp::{EspGpio, EspPcnt, EspTimer};
use pulse::{
    set_time_handler, Callback, Counter, CounterConfig, GpioIsr, Pcnt, Scheduler, Status, Ticks,
    TimeHandler,
};
use ringbuffer::{ConstGenericRingBuffer, RingBuffer};

pub type PulseScheduler = Scheduler<Arc<Notifier>>;

const PULSE_HISTORY: usize = 32;
const SETTLE: Duration = Duration::from_millis(100);
const PULSE_SPACING: Duration = Duration::from_millis(20);

pub fn counter<P: OutputPin>(
    pcnt: &Pcnt<EspPcnt>,
    out: &mut PinDriver<'_, P, Output>,
    in_pin: i32,
) -> anyhow::Result<()> {
    info!("Instantiating up counter");
    let mut ctr = Counter::new(pcnt.unit(0)?, in_pin, CounterConfig::default())?;

    info!("Testing positive edge");
    ensure!(ctr.value()? == 0, "counter starts at {}", ctr.value()?);
    out.set_high()?;
    ensure!(ctr.value()? == 1, "after rising edge: {}", ctr.value()?);

    info!("Testing negative edge");
    out.set_low()?;
    ensure!(ctr.value()? == 1, "after falling edge: {}", ctr.value()?);

    info!("Testing 100 pulses");
    for _ in 0..100 {
        out.set_high()?;
        out.set_low()?;
    }
    ensure!(ctr.value()? == 101, "after 100 pulses: {}", ctr.value()?);

    Ok(())
}

pub fn pulsetimer<P: OutputPin, I: InputPin>(
    gpio: &'static EspGpio,
    clock: &'static EspTimer,
    scheduler: &'static PulseScheduler,
    notification: &Notification,
    out: &mut PinDriver<'_, P, Output>,
    input: &mut PinDriver<'_, I, Input>,
) -> anyhow::Result<()> {
    info!("Setting up pulsetimer");
    let q = Arc::new(Mutex::new(ConstGenericRingBuffer::<Ticks, PULSE_HISTORY>::new()));
    let sink = q.clone();
    let pulse: Callback = Box::leak(Box::new(move |t: Ticks| {
        if let Ok(mut q) = sink.lock() {
            q.push(t);
        }
    }));
    let handler: &'static TimeHandler =
        Box::leak(Box::new(TimeHandler::new(clock, scheduler, pulse)));

    // esp-idf-hal may have installed the service already
    let status = gpio.install_isr_service();
    ensure!(
        status == Status::OK || status == Status::INVALID_STATE,
        "installing ISR service: {}",
        status
    );
    if let Some(err) = set_time_handler(gpio, input.pin() as u32, handler) {
        anyhow::bail!("set_time_handler: {}", err);
    }
    input.enable_interrupt()?;

    let received = || q.lock().map(|q| q.len()).unwrap_or_default();

    info!("Testing positive edge");
    ensure!(received() == 0, "pulses before any edge");
    out.set_high()?;
    service_for(notification, scheduler, SETTLE);
    ensure!(received() == 1, "after rising edge: {} pulses", received());

    info!("Testing negative edge");
    out.set_low()?;
    service_for(notification, scheduler, SETTLE);
    ensure!(received() == 1, "after falling edge: {} pulses", received());

    info!("Testing 10 pulses");
    for _ in 0..10 {
        out.set_high()?;
        out.set_low()?;
        service_for(notification, scheduler, PULSE_SPACING);
    }
    service_for(notification, scheduler, SETTLE);
    ensure!(received() == 11, "after 10 pulses: {} pulses", received());

    if let Ok(q) = q.lock() {
        let stamps: Vec<Ticks> = q.iter().copied().collect();
        let intervals: Vec<i32> = stamps.windows(2).map(|w| w[1].diff(w[0])).collect();
        info!("Pulse intervals: {:?} us", intervals);
    }

    Ok(())
}

/// Runs scheduled callbacks as they arrive, for `duration`.
fn service_for(notification: &Notification, scheduler: &PulseScheduler, duration: Duration) {
    let deadline = Instant::now() + duration;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        notification.wait(TickType::new_millis(left.as_millis() as u64).ticks());
        scheduler.run_pending();
    }
}
