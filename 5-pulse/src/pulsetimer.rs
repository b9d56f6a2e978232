//! Edge timestamps captured in interrupt context.
//!
//! `set_time_handler` binds a GPIO interrupt to [`TimeHandler`]. On every edge the
//! handler reads the microsecond clock, masks it to [`Ticks`] and schedules its
//! callback on the main task. The callback only gets the timestamp, not the pin:
//! pins that need telling apart need handlers of their own.

use core::ffi::c_void;

use crate::sched::{Callback, Schedule};
use crate::status::Status;
use crate::ticks::Ticks;

/// Signature of a GPIO ISR as the driver calls it.
pub type IsrFn = unsafe extern "C" fn(*mut c_void);

/// Free-running microsecond clock, readable from interrupt context.
pub trait Clock: Sync {
    fn now_us(&self) -> u64;
}

/// Per-pin interrupt handler table of the GPIO driver.
///
/// The driver owns the table: adding a handler for a pin replaces the previous one.
pub trait GpioIsr {
    fn install_isr_service(&self) -> Status;

    /// Binds `isr(arg)` to edges on `pin`.
    ///
    /// # Safety
    ///
    /// `arg` must remain valid for `isr` until the pin is rebound or its handler is
    /// removed.
    unsafe fn isr_handler_add(&self, pin: u32, isr: IsrFn, arg: *mut c_void) -> Status;

    fn isr_handler_remove(&self, pin: u32) -> Status;
}

/// What a pulse-timer interrupt does: stamp, schedule, wake.
pub struct TimeHandler {
    clock: &'static dyn Clock,
    scheduler: &'static dyn Schedule,
    callback: Callback,
}

impl TimeHandler {
    pub const fn new(
        clock: &'static dyn Clock,
        scheduler: &'static dyn Schedule,
        callback: Callback,
    ) -> Self {
        Self {
            clock,
            scheduler,
            callback,
        }
    }

    /// Runs the interrupt-side protocol once. Returns `false` if the scheduler
    /// queue was full and this edge was lost.
    #[inline]
    pub fn fire(&self) -> bool {
        let now = Ticks::from_micros(self.clock.now_us());
        let queued = self.scheduler.schedule(self.callback, now);
        self.scheduler.wake_main_from_isr();
        queued
    }
}

unsafe extern "C" fn time_isr(arg: *mut c_void) {
    // SAFETY: `set_time_handler` only ever registers a `&'static TimeHandler` here.
    let handler = unsafe { &*(arg as *const TimeHandler) };
    handler.fire();
}

/// Routes edges on `pin` to `handler`, replacing whatever was bound before.
///
/// The pin's interrupt type must already be configured. Returns `None` on success
/// and the name of the driver's status otherwise.
pub fn set_time_handler<G>(
    gpio: &G,
    pin: u32,
    handler: &'static TimeHandler,
) -> Option<&'static str>
where
    G: GpioIsr + ?Sized,
{
    let arg = handler as *const TimeHandler as *mut c_void;
    // SAFETY: `handler` lives forever and is only read through.
    let status = unsafe { gpio.isr_handler_add(pin, time_isr, arg) };
    failure_name(status)
}

/// Unbinds whatever handler `pin` has.
pub fn remove_time_handler<G>(gpio: &G, pin: u32) -> Option<&'static str>
where
    G: GpioIsr + ?Sized,
{
    failure_name(gpio.isr_handler_remove(pin))
}

fn failure_name(status: Status) -> Option<&'static str> {
    (!status.is_ok()).then(|| status.name())
}
