use crate::types::{Endpoint, UsbError, UsbSpeed};

/// How many addressed devices the table can hold (not counting the
/// transient address-zero entry used during enumeration).
pub const MAX_DEVICES: usize = 2;

/// What the host knows about one device on the bus.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub address: u8,
    /// bDeviceClass from the device descriptor
    pub class: u8,
    pub speed: UsbSpeed,
    pub control: Endpoint,
    pub bulk_in: Option<Endpoint>,
    pub bulk_out: Option<Endpoint>,
}

impl UsbDevice {
    /// A freshly-reset device, still at address zero.
    pub const fn unaddressed(speed: UsbSpeed) -> Self {
        Self {
            address: 0,
            class: 0,
            speed,
            control: Endpoint::control(),
            bulk_in: None,
            bulk_out: None,
        }
    }
}

/// A set of USB addresses (1-7), e.g. those of devices which have
/// just gone away.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct AddressSet(u8);

impl AddressSet {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, address: u8) {
        if address < 8 {
            self.0 |= 1 << address;
        }
    }

    pub fn contains(&self, address: u8) -> bool {
        address < 8 && (self.0 & (1 << address)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..8).filter(|a| self.contains(*a))
    }
}

/// The devices currently known on the bus, indexed by address.
///
/// Entry zero is only used while a device is being enumerated, and
/// moves to its real address when SET_ADDRESS succeeds.
pub struct DeviceTable {
    entries: [Option<UsbDevice>; MAX_DEVICES + 1],
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_DEVICES + 1],
        }
    }

    /// Forget every device, returning the addresses that were in use.
    pub fn clear(&mut self) -> AddressSet {
        let gone = self.addresses();
        self.entries = [None; MAX_DEVICES + 1];
        gone
    }

    /// The addresses (not including zero) currently in use.
    pub fn addresses(&self) -> AddressSet {
        let mut set = AddressSet::new();
        for (address, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.is_some() {
                set.insert(address as u8);
            }
        }
        set
    }

    pub fn get(&self, address: u8) -> Option<&UsbDevice> {
        self.entries.get(address as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, address: u8) -> Option<&mut UsbDevice> {
        self.entries.get_mut(address as usize)?.as_mut()
    }

    /// The lowest address not yet assigned to a device.
    pub fn free_address(&self) -> Option<u8> {
        (1..=MAX_DEVICES)
            .find(|a| self.entries[*a].is_none())
            .map(|a| a as u8)
    }

    /// Start enumerating a newly-reset device at address zero, with
    /// its control packet size assumed to be 8 until it tells us.
    pub fn begin_enumeration(&mut self, speed: UsbSpeed) -> &mut UsbDevice {
        self.entries[0].insert(UsbDevice::unaddressed(speed))
    }

    /// Move the device at address zero to `address`.
    pub fn promote(&mut self, address: u8) -> Result<&mut UsbDevice, UsbError> {
        let index = address as usize;
        if index == 0 || index > MAX_DEVICES {
            return Err(UsbError::NoFreeAddress);
        }
        let mut device = self.entries[0].take().ok_or(UsbError::NoSuchDevice)?;
        device.address = address;
        device.control.send_toggle = false;
        device.control.receive_toggle = false;
        Ok(self.entries[index].insert(device))
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/device_table.rs"]
mod tests;
