//! Pulse counter (PCNT) control.
//!
//! [`PcntDriver`] is the pass-through surface: one method per driver call, each
//! returning the driver's status code as is. [`Pcnt`] owns a driver and hands out
//! [`PcntUnit`]s, so that every unit has exactly one writer at a time.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU8, Ordering};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;
use thiserror::Error;

use crate::status::Status;

/// Number of PCNT units on the ESP32.
pub const PCNT_UNIT_MAX: u8 = 8;
/// Number of channels per PCNT unit.
pub const PCNT_CHANNEL_MAX: u32 = 2;
/// Pin number telling the driver to leave an input unconnected.
pub const PCNT_PIN_NOT_USED: i32 = -1;

/// Action on a pulse edge (`pcnt_count_mode_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToPrimitive, FromPrimitive)]
pub enum CountMode {
    Disable = 0,
    Increase = 1,
    Decrease = 2,
}

/// Action on the control signal level (`pcnt_ctrl_mode_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToPrimitive, FromPrimitive)]
pub enum CtrlMode {
    Keep = 0,
    Reverse = 1,
    Disable = 2,
}

/// Mirror of `pcnt_config_t`.
///
/// Mode fields stay raw so that whatever the caller sets reaches the driver, which
/// owns all validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PcntConfig {
    pub pulse_gpio_num: i32,
    pub ctrl_gpio_num: i32,
    pub lctrl_mode: u32,
    pub hctrl_mode: u32,
    pub pos_mode: u32,
    pub neg_mode: u32,
    pub counter_h_lim: i16,
    pub counter_l_lim: i16,
    pub unit: u32,
    pub channel: u32,
}

impl PcntConfig {
    pub fn new(unit: u32, channel: u32, pulse_gpio_num: i32) -> Self {
        Self {
            pulse_gpio_num,
            ctrl_gpio_num: PCNT_PIN_NOT_USED,
            lctrl_mode: raw(CtrlMode::Keep),
            hctrl_mode: raw(CtrlMode::Keep),
            pos_mode: raw(CountMode::Disable),
            neg_mode: raw(CountMode::Disable),
            counter_h_lim: 0,
            counter_l_lim: 0,
            unit,
            channel,
        }
    }

    pub fn edges(mut self, pos_mode: CountMode, neg_mode: CountMode) -> Self {
        self.pos_mode = raw(pos_mode);
        self.neg_mode = raw(neg_mode);
        self
    }

    pub fn control(
        mut self,
        ctrl_gpio_num: i32,
        lctrl_mode: CtrlMode,
        hctrl_mode: CtrlMode,
    ) -> Self {
        self.ctrl_gpio_num = ctrl_gpio_num;
        self.lctrl_mode = raw(lctrl_mode);
        self.hctrl_mode = raw(hctrl_mode);
        self
    }

    pub fn limits(mut self, counter_l_lim: i16, counter_h_lim: i16) -> Self {
        self.counter_l_lim = counter_l_lim;
        self.counter_h_lim = counter_h_lim;
        self
    }
}

fn raw<T: ToPrimitive>(mode: T) -> u32 {
    // every mode enum is a small non-negative discriminant
    mode.to_u32().unwrap_or_default()
}

/// Legacy PCNT driver calls.
///
/// Implementations forward to the hardware driver and return its status untouched.
/// No locking happens at this level: calls for one unit must not overlap.
pub trait PcntDriver {
    fn unit_config(&self, config: &PcntConfig) -> Status;

    /// Writes the current count into `value`.
    fn get_counter_value(&self, unit: u32, value: &mut i16) -> Status;

    fn counter_pause(&self, unit: u32) -> Status;

    fn counter_resume(&self, unit: u32) -> Status;

    fn counter_clear(&self, unit: u32) -> Status;

    fn intr_disable(&self, unit: u32) -> Status;

    /// Glitch filter threshold, in APB clock cycles.
    fn set_filter_value(&self, unit: u32, value: u16) -> Status;

    fn filter_enable(&self, unit: u32) -> Status;

    fn filter_disable(&self, unit: u32) -> Status;

    fn set_pin(&self, unit: u32, channel: u32, pulse_gpio_num: i32, ctrl_gpio_num: i32) -> Status;
}

impl<D: PcntDriver + ?Sized> PcntDriver for &D {
    fn unit_config(&self, config: &PcntConfig) -> Status {
        (**self).unit_config(config)
    }

    fn get_counter_value(&self, unit: u32, value: &mut i16) -> Status {
        (**self).get_counter_value(unit, value)
    }

    fn counter_pause(&self, unit: u32) -> Status {
        (**self).counter_pause(unit)
    }

    fn counter_resume(&self, unit: u32) -> Status {
        (**self).counter_resume(unit)
    }

    fn counter_clear(&self, unit: u32) -> Status {
        (**self).counter_clear(unit)
    }

    fn intr_disable(&self, unit: u32) -> Status {
        (**self).intr_disable(unit)
    }

    fn set_filter_value(&self, unit: u32, value: u16) -> Status {
        (**self).set_filter_value(unit, value)
    }

    fn filter_enable(&self, unit: u32) -> Status {
        (**self).filter_enable(unit)
    }

    fn filter_disable(&self, unit: u32) -> Status {
        (**self).filter_disable(unit)
    }

    fn set_pin(&self, unit: u32, channel: u32, pulse_gpio_num: i32, ctrl_gpio_num: i32) -> Status {
        (**self).set_pin(unit, channel, pulse_gpio_num, ctrl_gpio_num)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("unit must be in range 0..{max}, got {0}", max = PCNT_UNIT_MAX)]
    OutOfRange(u8),
    #[error("unit {0} is already in use")]
    Busy(u8),
}

/// Owner of the PCNT peripheral.
pub struct Pcnt<D> {
    driver: D,
    taken: AtomicU8,
}

impl<D: PcntDriver> Pcnt<D> {
    pub const fn new(driver: D) -> Self {
        Self {
            driver,
            taken: AtomicU8::new(0),
        }
    }

    /// Claims `unit` until the returned handle is dropped.
    pub fn unit(&self, unit: u8) -> Result<PcntUnit<'_, D>, UnitError> {
        if unit >= PCNT_UNIT_MAX {
            return Err(UnitError::OutOfRange(unit));
        }

        let bit = 1 << unit;
        if self.taken.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Err(UnitError::Busy(unit));
        }

        Ok(PcntUnit {
            pcnt: self,
            unit,
            _not_sync: PhantomData,
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

/// Exclusive handle on one PCNT unit.
///
/// Operations take `&mut self`: a unit has a single writer, and the handle cannot be
/// shared between threads.
pub struct PcntUnit<'a, D: PcntDriver> {
    pcnt: &'a Pcnt<D>,
    unit: u8,
    _not_sync: PhantomData<core::cell::Cell<()>>,
}

impl<D: PcntDriver> PcntUnit<'_, D> {
    pub fn id(&self) -> u8 {
        self.unit
    }

    /// Applies `config` to this unit, as given. A config naming another unit is
    /// `ESP_ERR_INVALID_ARG` and never reaches the driver.
    pub fn config(&mut self, config: &PcntConfig) -> Status {
        if config.unit != self.raw() {
            log::warn!("PCNT unit {} handed a config for unit {}", self.unit, config.unit);
            return Status::INVALID_ARG;
        }
        log::debug!("PCNT unit {} config: {:?}", self.unit, config);
        self.driver().unit_config(config)
    }

    pub fn get_counter_value(&mut self, value: &mut i16) -> Status {
        self.driver().get_counter_value(self.raw(), value)
    }

    pub fn pause(&mut self) -> Status {
        self.driver().counter_pause(self.raw())
    }

    pub fn resume(&mut self) -> Status {
        self.driver().counter_resume(self.raw())
    }

    pub fn clear(&mut self) -> Status {
        self.driver().counter_clear(self.raw())
    }

    pub fn intr_disable(&mut self) -> Status {
        self.driver().intr_disable(self.raw())
    }

    pub fn set_filter_value(&mut self, cycles: u16) -> Status {
        self.driver().set_filter_value(self.raw(), cycles)
    }

    pub fn filter_enable(&mut self) -> Status {
        self.driver().filter_enable(self.raw())
    }

    pub fn filter_disable(&mut self) -> Status {
        self.driver().filter_disable(self.raw())
    }

    pub fn set_pin(&mut self, channel: u32, pulse_gpio_num: i32, ctrl_gpio_num: i32) -> Status {
        self.driver().set_pin(self.raw(), channel, pulse_gpio_num, ctrl_gpio_num)
    }

    fn driver(&self) -> &D {
        &self.pcnt.driver
    }

    fn raw(&self) -> u32 {
        self.unit.into()
    }
}

impl<D: PcntDriver> Drop for PcntUnit<'_, D> {
    fn drop(&mut self) {
        self.pcnt.taken.fetch_and(!(1 << self.unit), Ordering::AcqRel);
    }
}
