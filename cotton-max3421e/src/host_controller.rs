use crate::types::{DeviceStatus, Endpoint, UsbError};
use crate::wire::SetupPacket;

/// The data stage (if any) of a control transfer.
pub enum DataPhase<'a> {
    In(&'a mut [u8]),
    Out(&'a [u8]),
    None,
}

impl DataPhase<'_> {
    pub fn is_in(&self) -> bool {
        matches!(self, DataPhase::In(_))
    }

    pub fn is_out(&self) -> bool {
        matches!(self, DataPhase::Out(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DataPhase::None)
    }

    /// Run `f` on the buffer, if this is an IN data phase.
    pub fn in_with<F: FnOnce(&mut [u8])>(&mut self, f: F) {
        if let DataPhase::In(x) = self {
            f(x)
        }
    }

    /// Length of the buffer (zero if there is no data phase).
    pub fn len(&self) -> usize {
        match self {
            DataPhase::In(x) => x.len(),
            DataPhase::Out(x) => x.len(),
            DataPhase::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Give up on a transfer after this many NAKs.
pub const NAK_LIMIT: u16 = 32000;

/// Give up on the first NAK: used for polling an endpoint that may
/// have nothing to say.
pub const NAK_NOWAIT: u16 = 1;

/// No NAK limit: only the overall transfer deadline applies.
pub const NAK_UNLIMITED: u16 = 0;

/// The operations that the bus logic needs from a USB host controller.
///
/// This is implemented for real hardware by
/// [`Max3421e`](crate::max3421e::Max3421e), and for tests by
/// `mocks::MockHostController`.
///
/// All operations are synchronous: they may busy-wait, but only up to
/// the controller's own transfer deadline.
pub trait HostController {
    /// Reset and configure the controller for host mode.
    fn init(&mut self) -> Result<(), UsbError>;

    /// Service any pending connect/disconnect interrupt, and return
    /// the current state of the root port.
    fn device_status(&mut self) -> DeviceStatus;

    /// Start signalling a bus reset.
    fn reset_bus(&mut self);

    /// Has the bus reset started by [`reset_bus()`](HostController::reset_bus)
    /// finished?
    fn bus_reset_complete(&mut self) -> bool;

    /// Start generating SOF packets (or low-speed keep-alives).
    fn enable_sof(&mut self);

    /// Has a frame (SOF) been sent since the last call?
    fn sof_seen(&mut self) -> bool;

    /// Perform a complete control transfer (SETUP, optional data, and
    /// status stages) on endpoint zero of device `address`.
    ///
    /// Returns the number of bytes transferred in the data stage.
    fn control_transfer<'a>(
        &mut self,
        address: u8,
        packet_size: u8,
        setup: SetupPacket,
        data_phase: DataPhase<'a>,
    ) -> Result<usize, UsbError>;

    /// Read from an IN endpoint until a short packet arrives or `data`
    /// is full, giving up after `nak_limit` NAKs (0 for no limit).
    ///
    /// The endpoint's receive toggle is updated on success.
    fn bulk_in_transfer(
        &mut self,
        address: u8,
        endpoint: &mut Endpoint,
        data: &mut [u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError>;

    /// Send all of `data` to an OUT endpoint, in packets of at most the
    /// endpoint's max packet size.
    ///
    /// The endpoint's send toggle is updated on success.
    fn bulk_out_transfer(
        &mut self,
        address: u8,
        endpoint: &mut Endpoint,
        data: &[u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError>;
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/host_controller.rs"]
mod tests;
