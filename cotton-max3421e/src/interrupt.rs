use core::cell::Cell;
use critical_section::Mutex;

/// A flag shared between the MAX3421E interrupt handler and the
/// polling code.
///
/// The interrupt handler does no protocol work at all: it just calls
/// [`signal()`](InterruptLatch::signal). The next
/// [`Max3421e::device_status()`](crate::max3421e::Max3421e) call
/// consumes the flag and reads HIRQ over SPI, so the SPI bus is only
/// ever touched from the poll loop.
///
/// ```no_run
/// # use cotton_max3421e::interrupt::InterruptLatch;
/// static MAX3421E_IRQ: InterruptLatch = InterruptLatch::new();
///
/// fn gpio_interrupt_handler() {
///     MAX3421E_IRQ.signal();
/// }
/// ```
pub struct InterruptLatch {
    pending: Mutex<Cell<bool>>,
}

impl Default for InterruptLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptLatch {
    /// A latch with no interrupt pending.
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(false)),
        }
    }

    /// Record that the chip has asserted its interrupt line.
    pub fn signal(&self) {
        critical_section::with(|cs| self.pending.borrow(cs).set(true));
    }

    /// Consume any pending interrupt, returning whether there was one.
    pub fn take(&self) -> bool {
        critical_section::with(|cs| self.pending.borrow(cs).replace(false))
    }

    /// Is an interrupt pending (without consuming it)?
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.pending.borrow(cs).get())
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/interrupt.rs"]
mod tests;
