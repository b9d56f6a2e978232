//! Microsecond timestamps wrapped to the runtime tick period.

/// Wraparound of every [`Ticks`] value: the positive small-int range of a 32-bit
/// interpreter word (two tag bits lost), so timestamps never need boxing.
pub const TICKS_PERIOD: u32 = 1 << 30;
pub const TICKS_MAX: u32 = TICKS_PERIOD - 1;

const TICKS_HALF_PERIOD: u32 = TICKS_PERIOD / 2;

/// A timestamp in microseconds, modulo [`TICKS_PERIOD`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticks(u32);

impl Ticks {
    /// Masks a raw clock reading down to the tick period.
    pub const fn from_micros(us: u64) -> Self {
        Ticks(mask(us))
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Signed distance `self - start`, correct across one wraparound as long as the
    /// two stamps are less than half a period apart.
    pub const fn diff(self, start: Ticks) -> i32 {
        let raw = self.0.wrapping_sub(start.0).wrapping_add(TICKS_HALF_PERIOD) & TICKS_MAX;
        raw as i32 - TICKS_HALF_PERIOD as i32
    }

    pub const fn add(self, delta: i32) -> Ticks {
        Ticks(self.0.wrapping_add(delta as u32) & TICKS_MAX)
    }
}

impl From<Ticks> for u32 {
    fn from(ticks: Ticks) -> Self {
        ticks.0
    }
}

/// Keeps the low 30 bits of a microsecond counter.
#[inline(always)]
pub const fn mask(us: u64) -> u32 {
    (us & TICKS_MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_idempotent() {
        for us in [0, 1, 999_999, TICKS_MAX as u64, TICKS_PERIOD as u64, u64::MAX] {
            let once = mask(us);
            assert_eq!(mask(once as u64), once);
            assert!(once <= TICKS_MAX);
        }
    }

    #[test]
    fn mask_ignores_whole_periods() {
        let us = 123_456_789;
        for k in [1u64, 2, 7, 1 << 20] {
            assert_eq!(mask(us), mask(us + k * TICKS_PERIOD as u64));
        }
    }

    #[test]
    fn diff_across_wraparound() {
        let before = Ticks::from_micros(TICKS_MAX as u64 - 9);
        let after = before.add(20);
        assert_eq!(after.as_u32(), 10);
        assert_eq!(after.diff(before), 20);
        assert_eq!(before.diff(after), -20);
    }

    #[test]
    fn diff_of_equal_stamps_is_zero() {
        let t = Ticks::from_micros(5_000_000);
        assert_eq!(t.diff(t), 0);
    }
}
