use crate::clock::Clock;
use crate::debug;
use crate::device_table::{AddressSet, DeviceTable, UsbDevice};
use crate::enumeration::{EnumerationEvent, Enumerator, UsbState};
use crate::host_controller::{DataPhase, HostController};
use crate::types::{Endpoint, UsbError};
use crate::wire::{
    DeviceDescriptor, SetupPacket, CONFIGURATION_DESCRIPTOR,
    DEVICE_DESCRIPTOR, DEVICE_TO_HOST, GET_DESCRIPTOR, HOST_TO_DEVICE,
    SET_CONFIGURATION, STRING_DESCRIPTOR,
};

/// Something a class driver may want to know about, as reported by
/// [`UsbBus::poll()`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A new device has been addressed, and needs configuring
    ///
    /// Once a driver has chosen a configuration (probably after
    /// reading the configuration descriptors), it should call
    /// [`UsbBus::configure()`].
    Connect(UsbDevice),

    /// Devices at these addresses have gone away
    Disconnect(AddressSet),

    /// A device was attached, but could not be enumerated
    EnumerationError(UsbError),

    None,
}

/// A USB bus with (at most) one device on its root port.
///
/// All the work is done in [`poll()`](UsbBus::poll), which must be
/// called regularly from the main loop; the standard-request and bulk
/// transfer methods are for class drivers to use once a device has
/// been reported via [`DeviceEvent::Connect`].
pub struct UsbBus<HC: HostController, C: Clock> {
    hc: HC,
    clock: C,
    devices: DeviceTable,
    enumerator: Enumerator,
}

impl<HC: HostController, C: Clock> UsbBus<HC, C> {
    pub fn new(hc: HC, clock: C) -> Self {
        Self {
            hc,
            clock,
            devices: DeviceTable::new(),
            enumerator: Enumerator::new(),
        }
    }

    /// Initialise the host controller, and forget any devices.
    pub fn init(&mut self) -> Result<(), UsbError> {
        self.devices.clear();
        self.enumerator = Enumerator::new();
        self.hc.init()
    }

    /// Advance bus enumeration by one step.
    pub fn poll(&mut self) -> DeviceEvent {
        match self
            .enumerator
            .poll(&mut self.hc, &self.clock, &mut self.devices)
        {
            EnumerationEvent::Addressed(address) => self
                .devices
                .get(address)
                .map_or(DeviceEvent::None, |d| DeviceEvent::Connect(*d)),
            EnumerationEvent::Removed(gone) => DeviceEvent::Disconnect(gone),
            EnumerationEvent::Failed(e) => DeviceEvent::EnumerationError(e),
            EnumerationEvent::Nothing => DeviceEvent::None,
        }
    }

    pub fn state(&self) -> UsbState {
        self.enumerator.state()
    }

    pub fn device(&self, address: u8) -> Option<&UsbDevice> {
        self.devices.get(address)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn host_controller(&mut self) -> &mut HC {
        &mut self.hc
    }

    /// Perform a control transfer on a device's endpoint zero, using
    /// its own packet size.
    pub fn control_transfer(
        &mut self,
        address: u8,
        setup: SetupPacket,
        data_phase: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        let packet_size = self
            .devices
            .get(address)
            .ok_or(UsbError::NoSuchDevice)?
            .control
            .max_packet_size;
        self.hc
            .control_transfer(address, packet_size, setup, data_phase)
    }

    fn get_descriptor(
        &mut self,
        address: u8,
        descriptor_type: u8,
        index: u8,
        language: u16,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        let len = buf.len().min(u16::MAX as usize);
        self.control_transfer(
            address,
            SetupPacket {
                bmRequestType: DEVICE_TO_HOST,
                bRequest: GET_DESCRIPTOR,
                wValue: ((descriptor_type as u16) << 8) | index as u16,
                wIndex: language,
                wLength: len as u16,
            },
            DataPhase::In(&mut buf[..len]),
        )
    }

    /// Read the whole (18-byte) device descriptor.
    pub fn get_device_descriptor(
        &mut self,
        address: u8,
    ) -> Result<DeviceDescriptor, UsbError> {
        let mut buf = [0u8; 18];
        let sz =
            self.get_descriptor(address, DEVICE_DESCRIPTOR, 0, 0, &mut buf)?;
        if sz < buf.len() {
            debug::println!("control in {}/18", sz);
            return Err(UsbError::ProtocolError);
        }
        bytemuck::try_pod_read_unaligned(&buf)
            .map_err(|_| UsbError::ProtocolError)
    }

    /// Read configuration descriptor `index`, together with all its
    /// interface and endpoint descriptors, into `buf`.
    ///
    /// The first four bytes are read on their own to learn the total
    /// length; if that is more than `buf` can hold, only the first
    /// `buf.len()` bytes are fetched. Returns the number of bytes read.
    pub fn get_configuration(
        &mut self,
        address: u8,
        index: u8,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        if buf.len() < 4 {
            return Err(UsbError::BufferTooSmall);
        }
        let sz = self.get_descriptor(
            address,
            CONFIGURATION_DESCRIPTOR,
            index,
            0,
            &mut buf[..4],
        )?;
        if sz < 4 {
            debug::println!("control in {}/4", sz);
            return Err(UsbError::ProtocolError);
        }
        let total = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let len = total.min(buf.len());
        if total > len {
            debug::warn!("usb: config {} truncated to {}", total, len);
        }
        self.get_descriptor(
            address,
            CONFIGURATION_DESCRIPTOR,
            index,
            0,
            &mut buf[..len],
        )
    }

    /// Read a string descriptor, raw.
    pub fn get_string_descriptor(
        &mut self,
        address: u8,
        index: u8,
        language: u16,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        self.get_descriptor(address, STRING_DESCRIPTOR, index, language, buf)
    }

    /// The first language ID the device supports (from string
    /// descriptor zero).
    pub fn get_first_language(&mut self, address: u8) -> Result<u16, UsbError> {
        let mut buf = [0u8; 4];
        let sz = self.get_string_descriptor(address, 0, 0, &mut buf)?;
        if sz < 4 || buf[1] != STRING_DESCRIPTOR {
            return Err(UsbError::ProtocolError);
        }
        Ok(u16::from_le_bytes([buf[2], buf[3]]))
    }

    /// Read a string descriptor and narrow it to ASCII.
    ///
    /// Characters outside ASCII are replaced by `?`. Returns the
    /// number of bytes written to `out`, which is truncated if too
    /// short.
    pub fn get_string(
        &mut self,
        address: u8,
        index: u8,
        language: u16,
        out: &mut [u8],
    ) -> Result<usize, UsbError> {
        let mut buf = [0u8; 255];
        let sz = self.get_string_descriptor(address, index, language, &mut buf)?;
        if sz < 2 || buf[0] < 2 || buf[1] != STRING_DESCRIPTOR {
            return Err(UsbError::ProtocolError);
        }
        let len = (buf[0] as usize).min(sz);
        let mut n = 0;
        for (dest, ch) in out.iter_mut().zip(buf[2..len].chunks_exact(2)) {
            *dest = if ch[1] == 0 && ch[0] < 0x80 { ch[0] } else { b'?' };
            n += 1;
        }
        Ok(n)
    }

    /// Send SET_CONFIGURATION.
    pub fn set_configuration(
        &mut self,
        address: u8,
        configuration_value: u8,
    ) -> Result<(), UsbError> {
        self.control_transfer(
            address,
            SetupPacket {
                bmRequestType: HOST_TO_DEVICE,
                bRequest: SET_CONFIGURATION,
                wValue: configuration_value as u16,
                wIndex: 0,
                wLength: 0,
            },
            DataPhase::None,
        )?;
        Ok(())
    }

    /// Configures a device, moving it from "Address" to "Configured"
    /// state (USB 2.0 figure 9-1), and the bus to
    /// [`UsbState::Running`].
    pub fn configure(
        &mut self,
        address: u8,
        configuration_value: u8,
    ) -> Result<(), UsbError> {
        self.set_configuration(address, configuration_value)?;
        self.enumerator.set_running();
        Ok(())
    }

    /// Record which endpoints a class driver will use for bulk
    /// transfers; this resets their data toggles.
    pub fn bind_bulk_endpoints(
        &mut self,
        address: u8,
        bulk_in: Endpoint,
        bulk_out: Endpoint,
    ) -> Result<(), UsbError> {
        if bulk_in.max_packet_size == 0 || bulk_out.max_packet_size == 0 {
            return Err(UsbError::ZeroPacketSize);
        }
        let device = self
            .devices
            .get_mut(address)
            .ok_or(UsbError::NoSuchDevice)?;
        device.bulk_in = Some(Endpoint::new(
            bulk_in.address,
            bulk_in.endpoint_type,
            bulk_in.max_packet_size,
        ));
        device.bulk_out = Some(Endpoint::new(
            bulk_out.address,
            bulk_out.endpoint_type,
            bulk_out.max_packet_size,
        ));
        Ok(())
    }

    /// Read from a device's bound bulk IN endpoint.
    pub fn bulk_in_transfer(
        &mut self,
        address: u8,
        data: &mut [u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError> {
        let device = self
            .devices
            .get_mut(address)
            .ok_or(UsbError::NoSuchDevice)?;
        let endpoint =
            device.bulk_in.as_mut().ok_or(UsbError::NoSuchEndpoint)?;
        self.hc.bulk_in_transfer(address, endpoint, data, nak_limit)
    }

    /// Write to a device's bound bulk OUT endpoint.
    pub fn bulk_out_transfer(
        &mut self,
        address: u8,
        data: &[u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError> {
        let device = self
            .devices
            .get_mut(address)
            .ok_or(UsbError::NoSuchDevice)?;
        let endpoint =
            device.bulk_out.as_mut().ok_or(UsbError::NoSuchEndpoint)?;
        self.hc.bulk_out_transfer(address, endpoint, data, nak_limit)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/usb_bus.rs"]
mod tests;
