/// A monotonic millisecond clock and busy-wait delay.
///
/// On a microcontroller this is typically a SysTick or timer
/// counter. The counter is allowed to wrap; all comparisons go through
/// [`Deadline`], which copes with that.
pub trait Clock {
    /// Milliseconds since some arbitrary epoch, wrapping at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Block the caller for (at least) `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn delay_ms(&self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// A point in time, relative to some [`Clock`], by which something
/// should have happened.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Deadline(u32);

impl Deadline {
    /// A deadline at a particular clock reading.
    pub const fn new(at: u32) -> Self {
        Self(at)
    }

    /// A deadline `ms` milliseconds from now.
    pub fn after(clock: &impl Clock, ms: u32) -> Self {
        Self(clock.now_ms().wrapping_add(ms))
    }

    /// The clock reading at which the deadline falls due.
    pub fn at(&self) -> u32 {
        self.0
    }

    /// Has the clock reached (or passed) the deadline?
    ///
    /// Correct across counter wraparound, provided the deadline is
    /// less than 2^31 ms away.
    pub fn has_passed(&self, clock: &impl Clock) -> bool {
        (clock.now_ms().wrapping_sub(self.0) as i32) >= 0
    }
}

/// Milliseconds elapsed on `clock` since it read `then`.
pub fn elapsed_since(clock: &impl Clock, then: u32) -> u32 {
    clock.now_ms().wrapping_sub(then)
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/clock.rs"]
mod tests;
