//! In-memory stand-ins for the ESP-IDF drivers, used off-target.
//!
//! The fakes return the same status codes as the legacy ESP-IDF drivers for the
//! same call sequences, and let tests inject edges on GPIO pins.

use core::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use num_traits::FromPrimitive;

use crate::pcnt::{CountMode, CtrlMode, PcntConfig, PcntDriver, PCNT_CHANNEL_MAX, PCNT_UNIT_MAX};
use crate::pulsetimer::{Clock, GpioIsr, IsrFn};
use crate::status::Status;

/// Number of GPIOs on the ESP32.
pub const GPIO_PIN_COUNT: u32 = 40;

/// Largest glitch filter threshold the PCNT accepts.
pub const PCNT_FILTER_MAX: u16 = 1023;

#[derive(Debug, Clone, Copy)]
struct UnitState {
    configured: bool,
    running: bool,
    count: i16,
    h_lim: i16,
    l_lim: i16,
    pos_mode: CountMode,
    neg_mode: CountMode,
    pulse_gpio_num: i32,
    ctrl_gpio_num: i32,
    filter_value: u16,
    filter_enabled: bool,
    intr_enabled: bool,
}

impl UnitState {
    const RESET: UnitState = UnitState {
        configured: false,
        running: false,
        count: 0,
        h_lim: 0,
        l_lim: 0,
        pos_mode: CountMode::Disable,
        neg_mode: CountMode::Disable,
        pulse_gpio_num: -1,
        ctrl_gpio_num: -1,
        filter_value: 0,
        filter_enabled: false,
        intr_enabled: false,
    };

    fn count(&mut self, mode: CountMode) {
        match mode {
            CountMode::Disable => return,
            CountMode::Increase => self.count = self.count.wrapping_add(1),
            CountMode::Decrease => self.count = self.count.wrapping_sub(1),
        }

        if (self.h_lim > 0 && self.count >= self.h_lim)
            || (self.l_lim < 0 && self.count <= self.l_lim)
        {
            self.count = 0;
        }
    }
}

/// Fake legacy PCNT driver.
pub struct FakePcnt {
    units: Mutex<[UnitState; PCNT_UNIT_MAX as usize]>,
}

impl Default for FakePcnt {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePcnt {
    pub const fn new() -> Self {
        Self {
            units: Mutex::new([UnitState::RESET; PCNT_UNIT_MAX as usize]),
        }
    }

    /// Feeds a rising edge to every running unit that counts `gpio`.
    pub fn rising_edge(&self, gpio: i32) {
        self.edge(gpio, true);
    }

    /// Feeds a falling edge to every running unit that counts `gpio`.
    pub fn falling_edge(&self, gpio: i32) {
        self.edge(gpio, false);
    }

    /// `n` full pulses (rising then falling) on `gpio`.
    pub fn pulses(&self, gpio: i32, n: usize) {
        for _ in 0..n {
            self.rising_edge(gpio);
            self.falling_edge(gpio);
        }
    }

    pub fn is_running(&self, unit: u32) -> bool {
        self.with_unit(unit, |state| state.running)
    }

    /// Programmed filter threshold, if the filter is on.
    pub fn filter(&self, unit: u32) -> Option<u16> {
        self.with_unit(unit, |state| state.filter_enabled.then_some(state.filter_value))
    }

    pub fn pins(&self, unit: u32) -> (i32, i32) {
        self.with_unit(unit, |state| (state.pulse_gpio_num, state.ctrl_gpio_num))
    }

    pub fn intr_enabled(&self, unit: u32) -> bool {
        self.with_unit(unit, |state| state.intr_enabled)
    }

    fn edge(&self, gpio: i32, rising: bool) {
        for state in self.lock().iter_mut() {
            if !state.configured || !state.running || state.pulse_gpio_num != gpio {
                continue;
            }
            let mode = if rising { state.pos_mode } else { state.neg_mode };
            state.count(mode);
        }
    }

    fn with_unit<T>(&self, unit: u32, f: impl FnOnce(&UnitState) -> T) -> T {
        let units = self.lock();
        f(&units[unit as usize])
    }

    fn lock(&self) -> MutexGuard<'_, [UnitState; PCNT_UNIT_MAX as usize]> {
        // a panicking test must not take the other tests' driver down with it
        self.units.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `op` on a configured unit, mapping the driver's argument and state checks.
    fn configured(&self, unit: u32, op: impl FnOnce(&mut UnitState) -> Status) -> Status {
        if unit >= PCNT_UNIT_MAX.into() {
            return Status::INVALID_ARG;
        }
        let mut units = self.lock();
        let state = &mut units[unit as usize];
        if !state.configured {
            return Status::INVALID_STATE;
        }
        op(state)
    }
}

fn valid_gpio(gpio: i32) -> bool {
    gpio < 0 || (gpio as u32) < GPIO_PIN_COUNT
}

impl PcntDriver for FakePcnt {
    fn unit_config(&self, config: &PcntConfig) -> Status {
        let modes = (
            CountMode::from_u32(config.pos_mode),
            CountMode::from_u32(config.neg_mode),
            CtrlMode::from_u32(config.lctrl_mode),
            CtrlMode::from_u32(config.hctrl_mode),
        );
        let (Some(pos_mode), Some(neg_mode), Some(_), Some(_)) = modes else {
            return Status::INVALID_ARG;
        };
        if config.unit >= PCNT_UNIT_MAX.into()
            || config.channel >= PCNT_CHANNEL_MAX
            || !valid_gpio(config.pulse_gpio_num)
            || !valid_gpio(config.ctrl_gpio_num)
        {
            return Status::INVALID_ARG;
        }

        let mut units = self.lock();
        units[config.unit as usize] = UnitState {
            configured: true,
            h_lim: config.counter_h_lim,
            l_lim: config.counter_l_lim,
            pos_mode,
            neg_mode,
            pulse_gpio_num: config.pulse_gpio_num,
            ctrl_gpio_num: config.ctrl_gpio_num,
            ..UnitState::RESET
        };
        Status::OK
    }

    fn get_counter_value(&self, unit: u32, value: &mut i16) -> Status {
        self.configured(unit, |state| {
            *value = state.count;
            Status::OK
        })
    }

    fn counter_pause(&self, unit: u32) -> Status {
        self.configured(unit, |state| {
            state.running = false;
            Status::OK
        })
    }

    fn counter_resume(&self, unit: u32) -> Status {
        self.configured(unit, |state| {
            state.running = true;
            Status::OK
        })
    }

    fn counter_clear(&self, unit: u32) -> Status {
        self.configured(unit, |state| {
            state.count = 0;
            Status::OK
        })
    }

    fn intr_disable(&self, unit: u32) -> Status {
        self.configured(unit, |state| {
            state.intr_enabled = false;
            Status::OK
        })
    }

    fn set_filter_value(&self, unit: u32, value: u16) -> Status {
        self.configured(unit, |state| {
            if value > PCNT_FILTER_MAX {
                return Status::INVALID_ARG;
            }
            state.filter_value = value;
            Status::OK
        })
    }

    fn filter_enable(&self, unit: u32) -> Status {
        self.configured(unit, |state| {
            state.filter_enabled = true;
            Status::OK
        })
    }

    fn filter_disable(&self, unit: u32) -> Status {
        self.configured(unit, |state| {
            state.filter_enabled = false;
            Status::OK
        })
    }

    fn set_pin(&self, unit: u32, channel: u32, pulse_gpio_num: i32, ctrl_gpio_num: i32) -> Status {
        if channel >= PCNT_CHANNEL_MAX
            || !valid_gpio(pulse_gpio_num)
            || !valid_gpio(ctrl_gpio_num)
        {
            return Status::INVALID_ARG;
        }
        self.configured(unit, |state| {
            state.pulse_gpio_num = pulse_gpio_num;
            state.ctrl_gpio_num = ctrl_gpio_num;
            Status::OK
        })
    }
}

type Slot = Option<(IsrFn, usize)>;

/// Fake GPIO ISR service: one handler slot per pin, like `gpio_isr_handler_add`.
pub struct FakeGpio {
    service_installed: AtomicBool,
    handlers: Mutex<[Slot; GPIO_PIN_COUNT as usize]>,
}

impl Default for FakeGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGpio {
    pub const fn new() -> Self {
        Self {
            service_installed: AtomicBool::new(false),
            handlers: Mutex::new([None; GPIO_PIN_COUNT as usize]),
        }
    }

    /// Runs the handler bound to `pin` as the ISR service would on an edge.
    /// Returns `false` when nothing is bound.
    pub fn trigger(&self, pin: u32) -> bool {
        let slot = self.lock().get(pin as usize).copied().flatten();

        let Some((isr, arg)) = slot else {
            return false;
        };
        // SAFETY: `arg` is what was registered together with `isr`.
        unsafe { isr(arg as *mut c_void) };
        true
    }

    fn lock(&self) -> MutexGuard<'_, [Slot; GPIO_PIN_COUNT as usize]> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, pin: u32) -> Status {
        if !self.service_installed.load(Ordering::Acquire) {
            Status::INVALID_STATE
        } else if pin >= GPIO_PIN_COUNT {
            Status::INVALID_ARG
        } else {
            Status::OK
        }
    }
}

impl GpioIsr for FakeGpio {
    fn install_isr_service(&self) -> Status {
        if self.service_installed.swap(true, Ordering::AcqRel) {
            Status::INVALID_STATE
        } else {
            Status::OK
        }
    }

    unsafe fn isr_handler_add(&self, pin: u32, isr: IsrFn, arg: *mut c_void) -> Status {
        let status = self.check(pin);
        if status.is_ok() {
            self.lock()[pin as usize] = Some((isr, arg as usize));
        }
        status
    }

    fn isr_handler_remove(&self, pin: u32) -> Status {
        let status = self.check(pin);
        if status.is_ok() {
            self.lock()[pin as usize] = None;
        }
        status
    }
}

/// Microseconds since the clock was created.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    us: AtomicU64,
}

impl ManualClock {
    pub const fn new(us: u64) -> Self {
        Self {
            us: AtomicU64::new(us),
        }
    }

    pub fn set(&self, us: u64) {
        self.us.store(us, Ordering::Release);
    }

    pub fn advance(&self, us: u64) {
        self.us.fetch_add(us, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.us.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcnt::PcntConfig;

    #[test]
    fn units_start_paused_after_config() {
        let pcnt = FakePcnt::new();
        let config = PcntConfig::new(0, 0, 22).edges(CountMode::Increase, CountMode::Disable);
        assert_eq!(pcnt.unit_config(&config), Status::OK);
        assert!(!pcnt.is_running(0));

        pcnt.pulses(22, 3);
        let mut value = -1;
        assert_eq!(pcnt.get_counter_value(0, &mut value), Status::OK);
        assert_eq!(value, 0);
    }

    #[test]
    fn counter_wraps_at_high_limit() {
        let pcnt = FakePcnt::new();
        let config = PcntConfig::new(1, 0, 5)
            .edges(CountMode::Increase, CountMode::Disable)
            .limits(0, 4);
        pcnt.unit_config(&config);
        pcnt.counter_resume(1);

        pcnt.pulses(5, 6);
        let mut value = 0;
        pcnt.get_counter_value(1, &mut value);
        assert_eq!(value, 2);
    }

    #[test]
    fn out_of_range_unit_is_invalid_arg() {
        let pcnt = FakePcnt::new();
        assert_eq!(pcnt.counter_pause(PCNT_UNIT_MAX.into()), Status::INVALID_ARG);
    }

    #[test]
    fn filter_threshold_is_bounded() {
        let pcnt = FakePcnt::new();
        pcnt.unit_config(&PcntConfig::new(2, 0, 6));
        assert_eq!(pcnt.set_filter_value(2, 1024), Status::INVALID_ARG);
        assert_eq!(pcnt.set_filter_value(2, 800), Status::OK);
    }

    #[test]
    fn isr_service_must_be_installed() {
        extern "C" fn noop(_: *mut c_void) {}

        let gpio = FakeGpio::new();
        let status = unsafe { gpio.isr_handler_add(4, noop, core::ptr::null_mut()) };
        assert_eq!(status, Status::INVALID_STATE);

        assert_eq!(gpio.install_isr_service(), Status::OK);
        assert_eq!(gpio.install_isr_service(), Status::INVALID_STATE);
        let status = unsafe { gpio.isr_handler_add(GPIO_PIN_COUNT, noop, core::ptr::null_mut()) };
        assert_eq!(status, Status::INVALID_ARG);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(5);
        assert_eq!(clock.now_us(), 15);
        clock.set(1);
        assert_eq!(clock.now_us(), 1);
    }
}
