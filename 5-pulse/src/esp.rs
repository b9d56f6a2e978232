//! ESP-IDF backends for the driver traits.

use core::ffi::c_void;
use core::sync::atomic::{AtomicBool, Ordering};
use std::num::NonZeroU32;
use std::sync::Arc;

use esp_idf_hal::task::notification::Notifier;
use esp_idf_sys::{
    esp_timer_get_time, gpio_install_isr_service, gpio_isr_handler_add, gpio_isr_handler_remove,
    pcnt_config_t, pcnt_counter_clear, pcnt_counter_pause, pcnt_counter_resume,
    pcnt_filter_disable, pcnt_filter_enable, pcnt_get_counter_value, pcnt_intr_disable,
    pcnt_set_filter_value, pcnt_set_pin, pcnt_unit_config,
};

use crate::pcnt::{PcntConfig, PcntDriver};
use crate::pulsetimer::{Clock, GpioIsr, IsrFn};
use crate::sched::Wake;
use crate::status::Status;

static PCNT_TAKEN: AtomicBool = AtomicBool::new(false);

/// The legacy PCNT driver. There is one per program.
pub struct EspPcnt {
    _private: (),
}

impl EspPcnt {
    pub fn take() -> Option<Self> {
        if PCNT_TAKEN.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { _private: () })
        }
    }
}

impl Drop for EspPcnt {
    fn drop(&mut self) {
        PCNT_TAKEN.store(false, Ordering::Release);
    }
}

impl PcntDriver for EspPcnt {
    fn unit_config(&self, config: &PcntConfig) -> Status {
        let config = pcnt_config_t {
            pulse_gpio_num: config.pulse_gpio_num as _,
            ctrl_gpio_num: config.ctrl_gpio_num as _,
            lctrl_mode: config.lctrl_mode as _,
            hctrl_mode: config.hctrl_mode as _,
            pos_mode: config.pos_mode as _,
            neg_mode: config.neg_mode as _,
            counter_h_lim: config.counter_h_lim,
            counter_l_lim: config.counter_l_lim,
            unit: config.unit as _,
            channel: config.channel as _,
        };
        Status(unsafe { pcnt_unit_config(&config) })
    }

    fn get_counter_value(&self, unit: u32, value: &mut i16) -> Status {
        Status(unsafe { pcnt_get_counter_value(unit as _, value as *mut i16) })
    }

    fn counter_pause(&self, unit: u32) -> Status {
        Status(unsafe { pcnt_counter_pause(unit as _) })
    }

    fn counter_resume(&self, unit: u32) -> Status {
        Status(unsafe { pcnt_counter_resume(unit as _) })
    }

    fn counter_clear(&self, unit: u32) -> Status {
        Status(unsafe { pcnt_counter_clear(unit as _) })
    }

    fn intr_disable(&self, unit: u32) -> Status {
        Status(unsafe { pcnt_intr_disable(unit as _) })
    }

    fn set_filter_value(&self, unit: u32, value: u16) -> Status {
        Status(unsafe { pcnt_set_filter_value(unit as _, value) })
    }

    fn filter_enable(&self, unit: u32) -> Status {
        Status(unsafe { pcnt_filter_enable(unit as _) })
    }

    fn filter_disable(&self, unit: u32) -> Status {
        Status(unsafe { pcnt_filter_disable(unit as _) })
    }

    fn set_pin(&self, unit: u32, channel: u32, pulse_gpio_num: i32, ctrl_gpio_num: i32) -> Status {
        Status(unsafe {
            pcnt_set_pin(
                unit as _,
                channel as _,
                pulse_gpio_num as _,
                ctrl_gpio_num as _,
            )
        })
    }
}

/// The GPIO driver's per-pin ISR service.
#[derive(Default)]
pub struct EspGpio;

impl GpioIsr for EspGpio {
    fn install_isr_service(&self) -> Status {
        Status(unsafe { gpio_install_isr_service(0) })
    }

    unsafe fn isr_handler_add(&self, pin: u32, isr: IsrFn, arg: *mut c_void) -> Status {
        Status(unsafe { gpio_isr_handler_add(pin as _, Some(isr), arg) })
    }

    fn isr_handler_remove(&self, pin: u32) -> Status {
        Status(unsafe { gpio_isr_handler_remove(pin as _) })
    }
}

/// `esp_timer`, the clock behind `time.ticks_us`.
#[derive(Default)]
pub struct EspTimer;

impl Clock for EspTimer {
    #[inline(always)]
    fn now_us(&self) -> u64 {
        unsafe { esp_timer_get_time() as u64 }
    }
}

impl Wake for Arc<Notifier> {
    fn wake_from_isr(&self) {
        // Safety: the notified task owns the `Notification` and outlives the handlers.
        unsafe {
            self.notify_and_yield(NonZeroU32::MIN);
        }
    }
}
