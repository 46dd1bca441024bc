/// Everything that can go wrong with a USB transaction.
///
/// The first group of variants are the MAX3421E host result codes
/// (HRSL bits 3:0, datasheet table 6); the rest are conditions detected
/// by the host software itself.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum UsbError {
    /// SIE busy
    Busy,
    /// Bad value in HXFR register
    BadRequest,
    /// Reserved result code
    Undefined,
    /// Peripheral not ready (NAK budget exhausted)
    Nak,
    /// Peripheral refused the request
    Stall,
    /// Data toggle mismatch
    ToggleError,
    /// Received the wrong PID
    WrongPid,
    /// Packet larger than the FIFO
    BadByteCount,
    /// PID check failed
    PidError,
    /// Packet error (stuffing, EOP)
    PacketError,
    /// CRC error
    CrcError,
    /// K-state instead of response
    KError,
    /// J-state instead of response
    JError,
    /// Device did not respond in time (retry budget exhausted)
    Timeout,
    /// Device talked too long
    Babble,

    /// Overall transfer deadline expired
    TransferTimeout,
    /// IN transfer completed without the chip signalling received data
    ReceiveSync,
    /// Endpoint has a max packet size of zero
    ZeroPacketSize,
    /// Device sent more data than the buffer can hold
    BufferTooSmall,
    /// Request type and data phase disagree about direction
    ProtocolError,
    /// Every address in the device table is in use
    NoFreeAddress,
    /// No device at that address
    NoSuchDevice,
    /// Device has no such endpoint bound
    NoSuchEndpoint,
    /// Chip's oscillator never became stable after reset
    ChipNotReady,
}

impl UsbError {
    /// Convert a raw HRSL result code into a `Result`.
    ///
    /// Only the bottom four bits are significant.
    pub fn result_from_code(code: u8) -> Result<(), UsbError> {
        Err(match code & 0x0F {
            0x00 => return Ok(()),
            0x01 => UsbError::Busy,
            0x02 => UsbError::BadRequest,
            0x03 => UsbError::Undefined,
            0x04 => UsbError::Nak,
            0x05 => UsbError::Stall,
            0x06 => UsbError::ToggleError,
            0x07 => UsbError::WrongPid,
            0x08 => UsbError::BadByteCount,
            0x09 => UsbError::PidError,
            0x0A => UsbError::PacketError,
            0x0B => UsbError::CrcError,
            0x0C => UsbError::KError,
            0x0D => UsbError::JError,
            0x0E => UsbError::Timeout,
            _ => UsbError::Babble,
        })
    }

    /// The numeric result code for this error.
    ///
    /// Chip result codes come back verbatim (1-15); host-side
    /// conditions use codes from 0xF0 upwards. Zero is never returned,
    /// as zero means success.
    pub fn code(&self) -> u8 {
        match self {
            UsbError::Busy => 0x01,
            UsbError::BadRequest => 0x02,
            UsbError::Undefined => 0x03,
            UsbError::Nak => 0x04,
            UsbError::Stall => 0x05,
            UsbError::ToggleError => 0x06,
            UsbError::WrongPid => 0x07,
            UsbError::BadByteCount => 0x08,
            UsbError::PidError => 0x09,
            UsbError::PacketError => 0x0A,
            UsbError::CrcError => 0x0B,
            UsbError::KError => 0x0C,
            UsbError::JError => 0x0D,
            UsbError::Timeout => 0x0E,
            UsbError::Babble => 0x0F,
            UsbError::ChipNotReady => 0xF6,
            UsbError::NoSuchEndpoint => 0xF7,
            UsbError::NoSuchDevice => 0xF8,
            UsbError::ProtocolError => 0xF9,
            UsbError::BufferTooSmall => 0xFA,
            UsbError::ZeroPacketSize => 0xFB,
            UsbError::ReceiveSync => 0xFC,
            UsbError::NoFreeAddress => 0xFE,
            UsbError::TransferTimeout => 0xFF,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum UsbSpeed {
    Low1_5,
    Full12,
}

/// The electrical state of the root port, as found by a bus probe.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// SE1: both data lines high, which should never happen
    Illegal,
    /// SE0: nothing attached
    Absent,
    /// J or K idle state: a device at this speed
    Present(UsbSpeed),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum EndpointType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

impl EndpointType {
    /// Decode the transfer type from an endpoint's bmAttributes.
    pub const fn from_attributes(attributes: u8) -> Self {
        match attributes & 3 {
            0 => EndpointType::Control,
            1 => EndpointType::Isochronous,
            2 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }
}

/// One endpoint on one device, together with its data-toggle state.
///
/// The toggles are updated by every successful transfer, and must be
/// kept with the endpoint between transfers.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// bEndpointAddress: number in bits 3:0, direction in bit 7
    pub address: u8,
    pub endpoint_type: EndpointType,
    pub max_packet_size: u8,
    /// Next OUT packet is DATA1
    pub send_toggle: bool,
    /// Next IN packet is expected to be DATA1
    pub receive_toggle: bool,
}

impl Endpoint {
    /// Endpoint zero, before the device has told us its packet size.
    pub const fn control() -> Self {
        Self::new(0, EndpointType::Control, 8)
    }

    pub const fn new(
        address: u8,
        endpoint_type: EndpointType,
        max_packet_size: u8,
    ) -> Self {
        Self {
            address,
            endpoint_type,
            max_packet_size,
            send_toggle: false,
            receive_toggle: false,
        }
    }

    /// The endpoint number, as used in tokens.
    pub const fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub const fn is_in(&self) -> bool {
        (self.address & 0x80) != 0
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/types.rs"]
mod tests;
