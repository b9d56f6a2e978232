//! ESP32 pulse counter control and interrupt-driven pulse timestamps.
//!
//! On `espidf` targets the [`esp`] module binds the driver traits to ESP-IDF; on
//! every other target [`host`] provides in-memory drivers.

pub mod counter;
pub mod pcnt;
pub mod pulsetimer;
pub mod sched;
pub mod status;
pub mod ticks;

#[cfg(target_os = "espidf")]
pub mod esp;
#[cfg(not(target_os = "espidf"))]
pub mod host;

pub use counter::{Counter, CounterConfig, CounterError, Direction, Edge};
pub use pcnt::{Pcnt, PcntConfig, PcntDriver, PcntUnit, UnitError};
pub use pulsetimer::{remove_time_handler, set_time_handler, Clock, GpioIsr, TimeHandler};
pub use sched::{Callback, Schedule, Scheduler, Wake};
pub use status::{err_to_name, Status, StatusError};
pub use ticks::{Ticks, TICKS_PERIOD};
