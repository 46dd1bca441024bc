use super::debug;
use cotton_max3421e::wire::{
    parse_descriptors, ConfigurationDescriptor, DescriptorVisitor, Direction,
    EndpointDescriptor, InterfaceDescriptor,
};

pub const ADB_CLASS: u8 = 0xFF;
pub const ADB_SUBCLASS: u8 = 0x42;
pub const ADB_PROTOCOL: u8 = 0x01;

/// Where to find ADB on a device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct AdbInterface {
    /// bConfigurationValue to pass to SET_CONFIGURATION
    pub configuration: u8,
    pub interface: u8,
    pub input_endpoint: u8,
    pub output_endpoint: u8,
    pub input_packet_size: u16,
    pub output_packet_size: u16,
}

/// A descriptor visitor which looks for the ADB interface: vendor
/// class 0xFF, subclass 0x42, protocol 1, with exactly two (bulk)
/// endpoints.
///
/// If more than one interface qualifies, the last one wins.
#[derive(Default)]
pub struct IdentifyAdb {
    current_configuration: u8,
    in_adb_interface: bool,
    found: Option<AdbInterface>,
}

impl DescriptorVisitor for IdentifyAdb {
    fn on_configuration(&mut self, c: &ConfigurationDescriptor) {
        self.current_configuration = c.bConfigurationValue;
    }

    fn on_interface(&mut self, i: &InterfaceDescriptor) {
        self.in_adb_interface = i.bNumEndpoints == 2
            && i.bInterfaceClass == ADB_CLASS
            && i.bInterfaceSubClass == ADB_SUBCLASS
            && i.bInterfaceProtocol == ADB_PROTOCOL;
        if self.in_adb_interface {
            self.found = Some(AdbInterface {
                configuration: self.current_configuration,
                interface: i.bInterfaceNumber,
                ..Default::default()
            });
        } else {
            debug::println!(
                "class {} subclass {} protocol {}",
                i.bInterfaceClass,
                i.bInterfaceSubClass,
                i.bInterfaceProtocol
            );
        }
    }

    fn on_endpoint(&mut self, e: &EndpointDescriptor) {
        if !self.in_adb_interface {
            return;
        }
        if let Some(ref mut found) = self.found {
            match e.direction() {
                Direction::In => {
                    found.input_endpoint = e.bEndpointAddress;
                    found.input_packet_size = e.max_packet_size();
                }
                Direction::Out => {
                    found.output_endpoint = e.bEndpointAddress;
                    found.output_packet_size = e.max_packet_size();
                }
            }
        }
    }
}

impl IdentifyAdb {
    /// The ADB interface, if one was seen with both its endpoints.
    pub fn identify(&self) -> Option<AdbInterface> {
        self.found
            .filter(|f| f.input_endpoint != 0 && f.output_endpoint != 0)
    }

    /// Scan a whole configuration descriptor for an ADB interface.
    pub fn scan(buf: &[u8]) -> Option<AdbInterface> {
        let mut v = Self::default();
        parse_descriptors(buf, &mut v);
        v.identify()
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/identify.rs"]
mod tests;
