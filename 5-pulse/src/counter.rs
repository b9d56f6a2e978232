//! Edge counter on top of one PCNT unit.

use log::{debug, warn};
use thiserror::Error;

use crate::pcnt::{CountMode, PcntConfig, PcntDriver, PcntUnit, UnitError, PCNT_PIN_NOT_USED};
use crate::status::{Status, StatusError};

/// APB clock in MHz, which drives the PCNT glitch filter.
pub const APB_CLK_MHZ: u32 = 80;

/// Limit used when none is given.
pub const DEFAULT_LIMIT: i16 = i16::MAX;

const CHANNEL: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    #[default]
    Rising,
    Falling,
    Both,
}

impl Edge {
    fn rising(self) -> bool {
        matches!(self, Edge::Rising | Edge::Both)
    }

    fn falling(self) -> bool {
        matches!(self, Edge::Falling | Edge::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterConfig {
    pub direction: Direction,
    pub edge: Edge,
    /// Count at which the unit wraps back to zero; 0 picks [`DEFAULT_LIMIT`].
    /// Negative limits are rejected.
    pub limit: i16,
    /// Clear the count once configured.
    pub reset: bool,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Up,
            edge: Edge::Rising,
            limit: 0,
            reset: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CounterError {
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("limit must not be negative, got {0}")]
    InvalidLimit(i16),
    #[error("only {expected} can be written to this counter, got {got}")]
    UnsupportedValue { expected: i16, got: i16 },
}

/// Counts edges on one pin.
///
/// Up counters run from 0 towards the limit. Down counters run from the limit
/// towards 0; the unit itself counts from 0 down to `-limit`, and [`Counter::value`]
/// shifts that back.
pub struct Counter<'a, D: PcntDriver> {
    unit: PcntUnit<'a, D>,
    pin: i32,
    direction: Direction,
    limit: i16,
}

impl<'a, D: PcntDriver> Counter<'a, D> {
    pub fn new(
        unit: PcntUnit<'a, D>,
        pin: i32,
        config: CounterConfig,
    ) -> Result<Self, CounterError> {
        let mut counter = Self {
            unit,
            pin,
            direction: config.direction,
            limit: DEFAULT_LIMIT,
        };
        counter.init(config)?;
        Ok(counter)
    }

    /// (Re)configures the unit. It is left running.
    pub fn init(&mut self, config: CounterConfig) -> Result<(), CounterError> {
        if config.limit < 0 {
            return Err(CounterError::InvalidLimit(config.limit));
        }

        let mode = match config.direction {
            Direction::Up => CountMode::Increase,
            Direction::Down => CountMode::Decrease,
        };
        let pick = |on: bool| if on { mode } else { CountMode::Disable };
        let limit = if config.limit == 0 {
            DEFAULT_LIMIT
        } else {
            config.limit
        };
        let (l_lim, h_lim) = match config.direction {
            Direction::Up => (0, limit),
            Direction::Down => (-limit, 0),
        };

        let pcnt_config = PcntConfig::new(self.unit.id().into(), CHANNEL, self.pin)
            .edges(pick(config.edge.rising()), pick(config.edge.falling()))
            .limits(l_lim, h_lim);

        self.unit.config(&pcnt_config).check()?;
        // units come out of configuration paused
        self.unit.resume().check()?;
        if config.reset {
            self.unit.clear().check()?;
        }

        self.direction = config.direction;
        self.limit = limit;
        debug!(
            "Counter on unit {} pin {}: {:?}, limit {}",
            self.unit.id(),
            self.pin,
            config.direction,
            limit
        );
        Ok(())
    }

    /// Ignores pulses shorter than `us` microseconds; 0 turns the filter off.
    pub fn filter(&mut self, us: u32) -> Result<(), CounterError> {
        if us == 0 {
            self.unit.filter_disable().check()?;
            return Ok(());
        }

        // oversized values go through so the driver rejects them
        let cycles = u16::try_from(us.saturating_mul(APB_CLK_MHZ)).unwrap_or(u16::MAX);
        self.unit.set_filter_value(cycles).check()?;
        self.unit.filter_enable().check()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), CounterError> {
        Ok(self.unit.pause().check()?)
    }

    pub fn resume(&mut self) -> Result<(), CounterError> {
        Ok(self.unit.resume().check()?)
    }

    pub fn value(&mut self) -> Result<i16, CounterError> {
        let mut raw = 0i16;
        self.unit.get_counter_value(&mut raw).check()?;
        Ok(match self.direction {
            Direction::Up => raw,
            Direction::Down => raw.wrapping_add(self.limit),
        })
    }

    /// Restarts the count. The hardware can only go back to its start point, so
    /// `value` must be 0 for up counters and the limit for down counters.
    pub fn set_value(&mut self, value: i16) -> Result<(), CounterError> {
        let expected = match self.direction {
            Direction::Up => 0,
            Direction::Down => self.limit,
        };
        if value != expected {
            return Err(CounterError::UnsupportedValue {
                expected,
                got: value,
            });
        }
        Ok(self.unit.clear().check()?)
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    pub fn limit(&self) -> i16 {
        self.limit
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<D: PcntDriver> Drop for Counter<'_, D> {
    fn drop(&mut self) {
        let teardown = [
            ("pause", self.unit.pause()),
            ("intr_disable", self.unit.intr_disable()),
            (
                "set_pin",
                self.unit.set_pin(CHANNEL, PCNT_PIN_NOT_USED, PCNT_PIN_NOT_USED),
            ),
        ];
        for (step, status) in teardown {
            if status != Status::OK {
                warn!("Counter on unit {}: {} failed: {}", self.unit.id(), step, status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FakePcnt;
    use crate::pcnt::Pcnt;

    const PIN: i32 = 22;

    #[test]
    fn counts_rising_edges_like_the_bench_test() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let mut counter =
            Counter::new(pcnt.unit(0).unwrap(), PIN, CounterConfig::default()).unwrap();
        let hw = pcnt.driver();

        assert_eq!(counter.value().unwrap(), 0);
        hw.rising_edge(PIN);
        assert_eq!(counter.value().unwrap(), 1);
        hw.falling_edge(PIN);
        assert_eq!(counter.value().unwrap(), 1);
        hw.pulses(PIN, 100);
        assert_eq!(counter.value().unwrap(), 101);
    }

    #[test]
    fn both_edges_count_twice_per_pulse() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let config = CounterConfig {
            edge: Edge::Both,
            ..Default::default()
        };
        let mut counter = Counter::new(pcnt.unit(1).unwrap(), PIN, config).unwrap();

        pcnt.driver().pulses(PIN, 5);
        assert_eq!(counter.value().unwrap(), 10);
    }

    #[test]
    fn down_counter_reports_from_limit() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let config = CounterConfig {
            direction: Direction::Down,
            limit: 50,
            ..Default::default()
        };
        let mut counter = Counter::new(pcnt.unit(2).unwrap(), PIN, config).unwrap();

        assert_eq!(counter.value().unwrap(), 50);
        pcnt.driver().pulses(PIN, 8);
        assert_eq!(counter.value().unwrap(), 42);

        assert!(matches!(
            counter.set_value(0),
            Err(CounterError::UnsupportedValue { expected: 50, got: 0 })
        ));
        counter.set_value(50).unwrap();
        assert_eq!(counter.value().unwrap(), 50);
    }

    #[test]
    fn up_counter_only_resets_to_zero() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let mut counter =
            Counter::new(pcnt.unit(0).unwrap(), PIN, CounterConfig::default()).unwrap();
        pcnt.driver().pulses(PIN, 3);

        assert!(counter.set_value(3).is_err());
        counter.set_value(0).unwrap();
        assert_eq!(counter.value().unwrap(), 0);
    }

    #[test]
    fn paused_counter_ignores_edges() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let mut counter =
            Counter::new(pcnt.unit(0).unwrap(), PIN, CounterConfig::default()).unwrap();

        counter.pause().unwrap();
        pcnt.driver().pulses(PIN, 4);
        assert_eq!(counter.value().unwrap(), 0);

        counter.resume().unwrap();
        pcnt.driver().pulses(PIN, 4);
        assert_eq!(counter.value().unwrap(), 4);
    }

    #[test]
    fn filter_uses_apb_cycles() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let mut counter =
            Counter::new(pcnt.unit(3).unwrap(), PIN, CounterConfig::default()).unwrap();

        counter.filter(10).unwrap();
        assert_eq!(pcnt.driver().filter(3), Some(800));

        counter.filter(0).unwrap();
        assert_eq!(pcnt.driver().filter(3), None);
    }

    #[test]
    fn oversized_filter_is_rejected_by_driver() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let mut counter =
            Counter::new(pcnt.unit(3).unwrap(), PIN, CounterConfig::default()).unwrap();

        let err = counter.filter(13).unwrap_err();
        assert!(matches!(
            err,
            CounterError::Status(StatusError(Status::INVALID_ARG))
        ));
    }

    #[test]
    fn drop_detaches_the_unit() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let counter = Counter::new(pcnt.unit(4).unwrap(), PIN, CounterConfig::default()).unwrap();
        assert!(pcnt.driver().is_running(4));

        drop(counter);
        let hw = pcnt.driver();
        assert!(!hw.is_running(4));
        assert_eq!(hw.pins(4), (PCNT_PIN_NOT_USED, PCNT_PIN_NOT_USED));
        assert!(pcnt.unit(4).is_ok());
    }

    #[test]
    fn negative_limits_are_rejected() {
        let pcnt = Pcnt::new(FakePcnt::new());

        let config = CounterConfig {
            direction: Direction::Down,
            limit: i16::MIN,
            ..Default::default()
        };
        let result = Counter::new(pcnt.unit(0).unwrap(), PIN, config);
        assert!(matches!(result, Err(CounterError::InvalidLimit(i16::MIN))));

        let config = CounterConfig {
            limit: -5,
            ..Default::default()
        };
        let result = Counter::new(pcnt.unit(0).unwrap(), PIN, config);
        assert!(matches!(result, Err(CounterError::InvalidLimit(-5))));

        // nothing was configured on the way out
        assert!(!pcnt.driver().is_running(0));
        assert_eq!(pcnt.driver().pins(0), (PCNT_PIN_NOT_USED, PCNT_PIN_NOT_USED));
    }

    #[test]
    fn reinit_with_negative_limit_keeps_the_running_config() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let mut counter =
            Counter::new(pcnt.unit(1).unwrap(), PIN, CounterConfig::default()).unwrap();

        let config = CounterConfig {
            limit: -1,
            ..Default::default()
        };
        assert!(matches!(
            counter.init(config),
            Err(CounterError::InvalidLimit(-1))
        ));
        assert_eq!(counter.limit(), DEFAULT_LIMIT);

        pcnt.driver().pulses(PIN, 2);
        assert_eq!(counter.value().unwrap(), 2);
    }

    #[test]
    fn bad_pin_surfaces_driver_status() {
        let pcnt = Pcnt::new(FakePcnt::new());
        let result = Counter::new(pcnt.unit(0).unwrap(), 64, CounterConfig::default());
        assert!(matches!(
            result,
            Err(CounterError::Status(StatusError(Status::INVALID_ARG)))
        ));
    }
}
