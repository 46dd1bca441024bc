use crate::clock::{Clock, Deadline};
use crate::debug;
use crate::device_table::{AddressSet, DeviceTable};
use crate::host_controller::{DataPhase, HostController};
use crate::types::{DeviceStatus, UsbError, UsbSpeed};
use crate::wire::{
    SetupPacket, DEVICE_DESCRIPTOR, DEVICE_TO_HOST, GET_DESCRIPTOR,
    HOST_TO_DEVICE, SET_ADDRESS,
};

/// How long a newly-attached device gets to settle before it is reset
/// (USB 2.0 s7.1.7.3 requires at least 100ms).
pub const SETTLE_MS: u32 = 200;

/// How long to generate SOFs after a bus reset before talking to the
/// device.
pub const SOF_WAIT_MS: u32 = 20;

/// SET_ADDRESS recovery interval (USB 2.0 s9.2.6.3).
pub const SET_ADDRESS_RECOVERY_MS: u32 = 2;

/// Sub-states while nothing usable is attached.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum DetachedState {
    /// Forget any devices, then wait
    Initialize,
    WaitForDevice,
    /// The bus is in SE1, which no device should ever cause
    Illegal,
}

/// Sub-states between a device appearing and its first descriptor
/// being read.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AttachedState {
    Settle(Deadline),
    ResetDevice,
    WaitResetComplete,
    WaitSof(Deadline),
    FetchDescriptorSize,
}

/// Where the root port is in the attach/enumerate lifecycle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum UsbState {
    Detached(DetachedState),
    Attached(AttachedState),
    /// Packet size known, about to assign an address
    Addressing,
    /// Addressed; waiting for a class driver to configure the device
    Configuring,
    /// Configured and in use
    Running,
    /// Enumeration failed; stays here until the device is unplugged
    Error(UsbError),
}

impl UsbState {
    pub fn is_detached(&self) -> bool {
        matches!(self, UsbState::Detached(_))
    }
}

/// What (if anything) noteworthy happened during one
/// [`Enumerator::poll()`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum EnumerationEvent {
    Nothing,
    /// These devices were forgotten
    Removed(AddressSet),
    /// A new device now has this address
    Addressed(u8),
    Failed(UsbError),
}

/// The root-port state machine.
///
/// Each call to [`poll()`](Enumerator::poll) first lets the electrical
/// state of the bus override the current state (so that an unplug is
/// noticed wherever enumeration had got to), then performs at most one
/// step of the enumeration sequence. Nothing in here blocks for longer
/// than a single control transfer.
pub struct Enumerator {
    state: UsbState,
    speed: UsbSpeed,
}

impl Default for Enumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Enumerator {
    pub const fn new() -> Self {
        Self {
            state: UsbState::Detached(DetachedState::Initialize),
            speed: UsbSpeed::Full12,
        }
    }

    pub fn state(&self) -> UsbState {
        self.state
    }

    /// The speed of the most recently attached device.
    pub fn speed(&self) -> UsbSpeed {
        self.speed
    }

    /// Mark the addressed device as configured.
    ///
    /// Returns false (and does nothing) unless a device is waiting to
    /// be configured.
    pub fn set_running(&mut self) -> bool {
        if self.state == UsbState::Configuring {
            self.state = UsbState::Running;
            true
        } else {
            false
        }
    }

    /// Apply the bus condition to the state.
    ///
    /// An SE1 always wins; a disconnect only matters if something was
    /// attached; a connect only matters if nothing was.
    pub fn on_bus_condition(
        &mut self,
        status: DeviceStatus,
        clock: &impl Clock,
    ) {
        match status {
            DeviceStatus::Illegal => {
                self.state = UsbState::Detached(DetachedState::Illegal);
            }
            DeviceStatus::Absent => {
                if !self.state.is_detached() {
                    debug::println!("usb: device detached");
                    self.state =
                        UsbState::Detached(DetachedState::Initialize);
                }
            }
            DeviceStatus::Present(speed) => {
                if self.state.is_detached() {
                    debug::println!("usb: device attached {:?}", speed);
                    self.speed = speed;
                    self.state = UsbState::Attached(AttachedState::Settle(
                        Deadline::after(clock, SETTLE_MS),
                    ));
                }
            }
        }
    }

    /// Check the bus, then advance the state machine by one step.
    pub fn poll(
        &mut self,
        hc: &mut impl HostController,
        clock: &impl Clock,
        devices: &mut DeviceTable,
    ) -> EnumerationEvent {
        let status = hc.device_status();
        self.on_bus_condition(status, clock);
        self.step(hc, clock, devices)
    }

    fn fail(&mut self, e: UsbError) -> EnumerationEvent {
        debug::warn!("usb: enumeration failed {:?}", e);
        self.state = UsbState::Error(e);
        EnumerationEvent::Failed(e)
    }

    fn step(
        &mut self,
        hc: &mut impl HostController,
        clock: &impl Clock,
        devices: &mut DeviceTable,
    ) -> EnumerationEvent {
        match self.state {
            UsbState::Detached(DetachedState::Initialize) => {
                let gone = devices.clear();
                self.state = UsbState::Detached(DetachedState::WaitForDevice);
                if gone.is_empty() {
                    EnumerationEvent::Nothing
                } else {
                    EnumerationEvent::Removed(gone)
                }
            }
            UsbState::Detached(DetachedState::Illegal) => {
                let gone = devices.clear();
                if gone.is_empty() {
                    EnumerationEvent::Nothing
                } else {
                    EnumerationEvent::Removed(gone)
                }
            }
            UsbState::Detached(DetachedState::WaitForDevice) => {
                EnumerationEvent::Nothing
            }
            UsbState::Attached(AttachedState::Settle(until)) => {
                if until.has_passed(clock) {
                    self.state =
                        UsbState::Attached(AttachedState::ResetDevice);
                }
                EnumerationEvent::Nothing
            }
            UsbState::Attached(AttachedState::ResetDevice) => {
                hc.reset_bus();
                self.state =
                    UsbState::Attached(AttachedState::WaitResetComplete);
                EnumerationEvent::Nothing
            }
            UsbState::Attached(AttachedState::WaitResetComplete) => {
                if hc.bus_reset_complete() {
                    hc.enable_sof();
                    self.state = UsbState::Attached(AttachedState::WaitSof(
                        Deadline::after(clock, SOF_WAIT_MS),
                    ));
                }
                EnumerationEvent::Nothing
            }
            UsbState::Attached(AttachedState::WaitSof(until)) => {
                if hc.sof_seen() && until.has_passed(clock) {
                    self.state =
                        UsbState::Attached(AttachedState::FetchDescriptorSize);
                }
                EnumerationEvent::Nothing
            }
            UsbState::Attached(AttachedState::FetchDescriptorSize) => {
                self.fetch_descriptor_size(hc, devices)
            }
            UsbState::Addressing => self.assign_address(hc, clock, devices),
            UsbState::Configuring
            | UsbState::Running
            | UsbState::Error(_) => EnumerationEvent::Nothing,
        }
    }

    fn fetch_descriptor_size(
        &mut self,
        hc: &mut impl HostController,
        devices: &mut DeviceTable,
    ) -> EnumerationEvent {
        let device = devices.begin_enumeration(self.speed);

        // Only the first 8 bytes are safe to ask for until we know
        // the real packet size
        let mut descriptor = [0u8; 8];
        let rc = hc.control_transfer(
            0,
            device.control.max_packet_size,
            SetupPacket {
                bmRequestType: DEVICE_TO_HOST,
                bRequest: GET_DESCRIPTOR,
                wValue: (DEVICE_DESCRIPTOR as u16) << 8,
                wIndex: 0,
                wLength: 8,
            },
            DataPhase::In(&mut descriptor),
        );
        match rc {
            Ok(sz) if sz >= 8 => {
                device.class = descriptor[4];
                device.control.max_packet_size = descriptor[7];
                debug::println!(
                    "usb: class {} ep0 size {}",
                    descriptor[4],
                    descriptor[7]
                );
                self.state = UsbState::Addressing;
                EnumerationEvent::Nothing
            }
            Ok(sz) => {
                debug::println!("control in {}/8", sz);
                self.fail(UsbError::ProtocolError)
            }
            Err(e) => self.fail(e),
        }
    }

    fn assign_address(
        &mut self,
        hc: &mut impl HostController,
        clock: &impl Clock,
        devices: &mut DeviceTable,
    ) -> EnumerationEvent {
        let Some(address) = devices.free_address() else {
            return self.fail(UsbError::NoFreeAddress);
        };
        let Some(packet_size) =
            devices.get(0).map(|d| d.control.max_packet_size)
        else {
            return self.fail(UsbError::NoSuchDevice);
        };
        if packet_size == 0 {
            return self.fail(UsbError::ZeroPacketSize);
        }

        let rc = hc.control_transfer(
            0,
            packet_size,
            SetupPacket {
                bmRequestType: HOST_TO_DEVICE,
                bRequest: SET_ADDRESS,
                wValue: address as u16,
                wIndex: 0,
                wLength: 0,
            },
            DataPhase::None,
        );
        if let Err(e) = rc {
            return self.fail(e);
        }

        clock.delay_ms(SET_ADDRESS_RECOVERY_MS);
        if let Err(e) = devices.promote(address) {
            return self.fail(e);
        }
        debug::println!("usb: device at address {}", address);
        self.state = UsbState::Configuring;
        EnumerationEvent::Addressed(address)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/enumeration.rs"]
mod tests;
