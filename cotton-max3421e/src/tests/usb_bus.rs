use super::*;
use crate::enumeration::{AttachedState, DetachedState};
use crate::host_controller::{NAK_LIMIT, NAK_NOWAIT};
use crate::mocks::{FakeClock, MockHostController};
use crate::types::{DeviceStatus, EndpointType, UsbSpeed};

const PHONE_CONFIG: &[u8] = &[
    9, 2, 32, 0, 1, 1, 0, 0x80, 250, // configuration
    9, 4, 0, 0, 2, 0xFF, 0x42, 1, 0, // interface
    7, 5, 0x81, 2, 64, 0, 0, // endpoint
    7, 5, 0x02, 2, 64, 0, 0, // endpoint
];

fn is_control_to<const ADDR: u8, const SIZE: u8>(
    a: &u8,
    p: &u8,
    _: &SetupPacket,
    _: &DataPhase,
) -> bool {
    *a == ADDR && *p == SIZE
}

fn is_get_configuration<const LEN: u16>(
    a: &u8,
    _: &u8,
    s: &SetupPacket,
    d: &DataPhase,
) -> bool {
    *a == 1
        && s.bmRequestType == DEVICE_TO_HOST
        && s.bRequest == GET_DESCRIPTOR
        && s.wValue == 0x200
        && s.wLength == LEN
        && d.is_in()
        && d.len() == LEN as usize
}

fn is_set_configuration<const N: u16>(
    a: &u8,
    p: &u8,
    s: &SetupPacket,
    d: &DataPhase,
) -> bool {
    *a == 1
        && *p == 64
        && s.bmRequestType == HOST_TO_DEVICE
        && s.bRequest == SET_CONFIGURATION
        && s.wValue == N
        && s.wIndex == 0
        && s.wLength == 0
        && d.is_none()
}

#[rustfmt::skip]
fn control_transfer_ok_with<F: FnMut(&mut [u8]) -> usize>(
    mut f: F,
) -> impl FnMut(u8, u8, SetupPacket, DataPhase) -> Result<usize, UsbError> {
    move |_, _, _, mut d| {
        let mut n = 0;
        d.in_with(|bytes| n = f(bytes));
        Ok(n)
    }
}

fn copy_in(src: &'static [u8]) -> impl FnMut(&mut [u8]) -> usize {
    move |b| {
        let n = b.len().min(src.len());
        b[..n].copy_from_slice(&src[..n]);
        n
    }
}

trait ExtraExpectations {
    /// Expect the two-stage read of PHONE_CONFIG from address 1.
    fn expect_get_configuration(&mut self);

    /// Expect SET_CONFIGURATION to address 1.
    fn expect_set_configuration<const VALUE: u16>(&mut self);

    /// Expect a full-speed vendor-class device with a 64-byte control
    /// endpoint to be attached and given address 1.
    fn expect_enumeration(&mut self);
}

impl ExtraExpectations for MockHostController {
    fn expect_get_configuration(&mut self) {
        self.expect_control_transfer()
            .times(1)
            .withf(is_get_configuration::<4>)
            .returning(control_transfer_ok_with(copy_in(PHONE_CONFIG)));
        self.expect_control_transfer()
            .times(1)
            .withf(is_get_configuration::<32>)
            .returning(control_transfer_ok_with(copy_in(PHONE_CONFIG)));
    }

    fn expect_set_configuration<const VALUE: u16>(&mut self) {
        self.expect_control_transfer()
            .times(1)
            .withf(is_set_configuration::<VALUE>)
            .returning(|_, _, _, _| Ok(0));
    }

    fn expect_enumeration(&mut self) {
        self.expect_device_status()
            .returning(|| DeviceStatus::Present(UsbSpeed::Full12));
        self.expect_reset_bus().times(1).return_const(());
        self.expect_bus_reset_complete().return_const(true);
        self.expect_enable_sof().times(1).return_const(());
        self.expect_sof_seen().return_const(true);
        self.expect_control_transfer()
            .times(1)
            .withf(|a, p, s, _| *a == 0 && *p == 8 && s.wLength == 8)
            .returning(control_transfer_ok_with(copy_in(&[
                18, 1, 0, 2, 0xFF, 0, 0, 64,
            ])));
        self.expect_control_transfer()
            .times(1)
            .withf(|a, p, s, _| *a == 0 && *p == 64 && s.wValue == 1)
            .returning(|_, _, _, _| Ok(0));
    }
}

/// Poll until a device is reported.
fn enumerate(bus: &mut UsbBus<MockHostController, FakeClock>) -> UsbDevice {
    for _ in 0..20 {
        bus.clock().advance(50);
        if let DeviceEvent::Connect(d) = bus.poll() {
            return d;
        }
    }
    panic!("device never enumerated");
}

/// A bus with a full-speed device already at address 1, with a
/// 64-byte control endpoint.
fn bus_with_device(
    hc: MockHostController,
) -> UsbBus<MockHostController, FakeClock> {
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    bus.devices
        .begin_enumeration(UsbSpeed::Full12)
        .control
        .max_packet_size = 64;
    bus.devices.promote(1).unwrap();
    bus.enumerator = crate::enumeration::Enumerator::new();
    bus
}

fn bulk_endpoints() -> (Endpoint, Endpoint) {
    (
        Endpoint::new(0x81, EndpointType::Bulk, 64),
        Endpoint::new(0x02, EndpointType::Bulk, 64),
    )
}

#[test]
fn init_resets_controller() {
    let mut hc = MockHostController::new();
    hc.expect_init().times(1).returning(|| Ok(()));
    let mut bus = bus_with_device(hc);
    assert!(bus.init().is_ok());
    assert!(bus.device(1).is_none());
    assert_eq!(bus.state(), UsbState::Detached(DetachedState::Initialize));
}

#[test]
fn init_failure_reported() {
    let mut hc = MockHostController::new();
    hc.expect_init()
        .times(1)
        .returning(|| Err(UsbError::ChipNotReady));
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    assert_eq!(bus.init(), Err(UsbError::ChipNotReady));
}

#[test]
fn poll_reports_nothing_when_idle() {
    let mut hc = MockHostController::new();
    hc.expect_device_status().returning(|| DeviceStatus::Absent);
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    assert_eq!(bus.poll(), DeviceEvent::None);
    assert_eq!(bus.poll(), DeviceEvent::None);
}

#[test]
fn poll_reports_attach() {
    let mut hc = MockHostController::new();
    hc.expect_device_status()
        .returning(|| DeviceStatus::Present(UsbSpeed::Full12));
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    assert_eq!(bus.poll(), DeviceEvent::None);
    assert!(matches!(
        bus.state(),
        UsbState::Attached(AttachedState::Settle(_))
    ));
}

#[test]
fn poll_reports_connect() {
    let mut hc = MockHostController::new();
    hc.expect_enumeration();
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    let d = enumerate(&mut bus);
    assert_eq!(d.address, 1);
    assert_eq!(d.class, 0xFF);
    assert_eq!(d.speed, UsbSpeed::Full12);
    assert_eq!(d.control.max_packet_size, 64);
    assert_eq!(bus.state(), UsbState::Configuring);
    assert_eq!(bus.device(1), Some(&d));
}

#[test]
fn poll_reports_disconnect() {
    let mut hc = MockHostController::new();
    hc.expect_device_status().returning(|| DeviceStatus::Absent);
    let mut bus = bus_with_device(hc);
    bus.enumerator.on_bus_condition(
        DeviceStatus::Present(UsbSpeed::Full12),
        &FakeClock::new(0),
    );
    let mut gone = AddressSet::new();
    gone.insert(1);
    assert_eq!(bus.poll(), DeviceEvent::Disconnect(gone));
    assert!(bus.device(1).is_none());
}

#[test]
fn poll_reports_enumeration_error() {
    let mut hc = MockHostController::new();
    hc.expect_device_status()
        .returning(|| DeviceStatus::Present(UsbSpeed::Full12));
    hc.expect_reset_bus().return_const(());
    hc.expect_bus_reset_complete().return_const(true);
    hc.expect_enable_sof().return_const(());
    hc.expect_sof_seen().return_const(true);
    hc.expect_control_transfer()
        .times(1)
        .returning(|_, _, _, _| Err(UsbError::Stall));
    let mut bus = UsbBus::new(hc, FakeClock::new(0));

    let mut error = None;
    for _ in 0..20 {
        bus.clock().advance(50);
        if let DeviceEvent::EnumerationError(e) = bus.poll() {
            error = Some(e);
            break;
        }
    }
    assert_eq!(error, Some(UsbError::Stall));
    assert_eq!(bus.state(), UsbState::Error(UsbError::Stall));
}

#[test]
fn control_transfer_uses_device_packet_size() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .withf(is_control_to::<1, 64>)
        .returning(|_, _, _, _| Ok(0));
    let mut bus = bus_with_device(hc);
    let rc = bus.control_transfer(
        1,
        SetupPacket {
            bmRequestType: HOST_TO_DEVICE,
            bRequest: 0x42,
            wValue: 0,
            wIndex: 0,
            wLength: 0,
        },
        DataPhase::None,
    );
    assert_eq!(rc, Ok(0));
}

#[test]
fn control_transfer_to_unknown_device() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer().never();
    let mut bus = bus_with_device(hc);
    let rc = bus.control_transfer(
        2,
        SetupPacket {
            bmRequestType: HOST_TO_DEVICE,
            bRequest: 0x42,
            wValue: 0,
            wIndex: 0,
            wLength: 0,
        },
        DataPhase::None,
    );
    assert_eq!(rc, Err(UsbError::NoSuchDevice));
}

#[test]
fn device_descriptor() {
    const DEVICE: &[u8] = &[
        18, 1, 0, 2, 0, 0, 0, 64, 0xD1, 0x18, 0xE7, 0x4E, 0x99, 0x02, 1, 2,
        3, 1,
    ];
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .withf(|_, _, s, d| s.wValue == 0x100 && s.wLength == 18 && d.len() == 18)
        .returning(control_transfer_ok_with(copy_in(DEVICE)));
    let mut bus = bus_with_device(hc);
    let d = bus.get_device_descriptor(1).unwrap();
    assert_eq!(d.vid(), 0x18D1);
    assert_eq!(d.pid(), 0x4EE7);
    assert_eq!(d.iSerialNumber, 3);
}

#[test]
fn short_device_descriptor() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .returning(|_, _, _, _| Ok(8));
    let mut bus = bus_with_device(hc);
    assert_eq!(
        bus.get_device_descriptor(1).err(),
        Some(UsbError::ProtocolError)
    );
}

#[test]
fn configuration_read_in_two_stages() {
    let mut hc = MockHostController::new();
    hc.expect_get_configuration();
    let mut bus = bus_with_device(hc);
    let mut buf = [0u8; 256];
    let n = bus.get_configuration(1, 0, &mut buf).unwrap();
    assert_eq!(n, 32);
    assert_eq!(&buf[..32], PHONE_CONFIG);
}

#[test]
fn configuration_truncated_to_buffer() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .withf(is_get_configuration::<4>)
        .returning(control_transfer_ok_with(copy_in(PHONE_CONFIG)));
    hc.expect_control_transfer()
        .times(1)
        .withf(is_get_configuration::<16>)
        .returning(control_transfer_ok_with(copy_in(PHONE_CONFIG)));
    let mut bus = bus_with_device(hc);
    let mut buf = [0u8; 16];
    let n = bus.get_configuration(1, 0, &mut buf).unwrap();
    assert_eq!(n, 16);
}

#[test]
fn configuration_tiny_buffer() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer().never();
    let mut bus = bus_with_device(hc);
    let mut buf = [0u8; 3];
    assert_eq!(
        bus.get_configuration(1, 0, &mut buf),
        Err(UsbError::BufferTooSmall)
    );
}

#[test]
fn configuration_short_header() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .returning(|_, _, _, _| Ok(2));
    let mut bus = bus_with_device(hc);
    let mut buf = [0u8; 64];
    assert_eq!(
        bus.get_configuration(1, 0, &mut buf),
        Err(UsbError::ProtocolError)
    );
}

#[test]
fn first_language() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .withf(|_, _, s, _| s.wValue == 0x300 && s.wIndex == 0 && s.wLength == 4)
        .returning(control_transfer_ok_with(copy_in(&[4, 3, 0x09, 0x04])));
    let mut bus = bus_with_device(hc);
    assert_eq!(bus.get_first_language(1), Ok(0x0409));
}

#[test]
fn string_narrowed_to_ascii() {
    const STRING: &[u8] = &[
        12, 3, b'G', 0, b'o', 0, 0xE9, 0, b'g', 0, 0x3A, 0x26,
    ];
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .withf(|_, _, s, _| s.wValue == 0x302 && s.wIndex == 0x0409)
        .returning(control_transfer_ok_with(copy_in(STRING)));
    let mut bus = bus_with_device(hc);
    let mut out = [0u8; 16];
    let n = bus.get_string(1, 2, 0x0409, &mut out).unwrap();
    assert_eq!(&out[..n], b"Go?g?");
}

#[test]
fn string_truncated_to_output() {
    const STRING: &[u8] = &[8, 3, b'a', 0, b'b', 0, b'c', 0];
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .returning(control_transfer_ok_with(copy_in(STRING)));
    let mut bus = bus_with_device(hc);
    let mut out = [0u8; 2];
    assert_eq!(bus.get_string(1, 1, 0x0409, &mut out), Ok(2));
    assert_eq!(&out, b"ab");
}

#[test]
fn string_wrong_type() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .returning(control_transfer_ok_with(copy_in(&[4, 2, 0, 0])));
    let mut bus = bus_with_device(hc);
    let mut out = [0u8; 8];
    assert_eq!(
        bus.get_string(1, 1, 0x0409, &mut out),
        Err(UsbError::ProtocolError)
    );
}

#[test]
fn string_with_bad_length() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .returning(control_transfer_ok_with(copy_in(&[0, 3, b'a', 0])));
    let mut bus = bus_with_device(hc);
    let mut out = [0u8; 8];
    assert_eq!(
        bus.get_string(1, 1, 0x0409, &mut out),
        Err(UsbError::ProtocolError)
    );
}

#[test]
fn string_with_empty_body() {
    let mut hc = MockHostController::new();
    hc.expect_control_transfer()
        .times(1)
        .returning(control_transfer_ok_with(copy_in(&[2, 3])));
    let mut bus = bus_with_device(hc);
    let mut out = [0u8; 8];
    assert_eq!(bus.get_string(1, 1, 0x0409, &mut out), Ok(0));
}

#[test]
fn configure_moves_to_running() {
    let mut hc = MockHostController::new();
    hc.expect_enumeration();
    hc.expect_set_configuration::<1>();
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    enumerate(&mut bus);
    assert_eq!(bus.configure(1, 1), Ok(()));
    assert_eq!(bus.state(), UsbState::Running);
}

#[test]
fn configure_failure_stays_configuring() {
    let mut hc = MockHostController::new();
    hc.expect_enumeration();
    hc.expect_control_transfer()
        .times(1)
        .returning(|_, _, _, _| Err(UsbError::Stall));
    let mut bus = UsbBus::new(hc, FakeClock::new(0));
    enumerate(&mut bus);
    assert_eq!(bus.configure(1, 1), Err(UsbError::Stall));
    assert_eq!(bus.state(), UsbState::Configuring);
}

#[test]
fn bulk_transfers_need_binding() {
    let mut hc = MockHostController::new();
    hc.expect_bulk_in_transfer().never();
    hc.expect_bulk_out_transfer().never();
    let mut bus = bus_with_device(hc);
    let mut buf = [0u8; 8];
    assert_eq!(
        bus.bulk_in_transfer(1, &mut buf, NAK_NOWAIT),
        Err(UsbError::NoSuchEndpoint)
    );
    assert_eq!(
        bus.bulk_out_transfer(1, &buf, NAK_LIMIT),
        Err(UsbError::NoSuchEndpoint)
    );
    assert_eq!(
        bus.bulk_in_transfer(2, &mut buf, NAK_NOWAIT),
        Err(UsbError::NoSuchDevice)
    );
}

#[test]
fn bind_rejects_zero_packet_size() {
    let hc = MockHostController::new();
    let mut bus = bus_with_device(hc);
    let (bulk_in, _) = bulk_endpoints();
    let bulk_out = Endpoint::new(0x02, EndpointType::Bulk, 0);
    assert_eq!(
        bus.bind_bulk_endpoints(1, bulk_in, bulk_out),
        Err(UsbError::ZeroPacketSize)
    );
}

#[test]
fn bind_unknown_device() {
    let hc = MockHostController::new();
    let mut bus = bus_with_device(hc);
    let (bulk_in, bulk_out) = bulk_endpoints();
    assert_eq!(
        bus.bind_bulk_endpoints(3, bulk_in, bulk_out),
        Err(UsbError::NoSuchDevice)
    );
}

#[test]
fn bulk_transfers_keep_toggles() {
    let mut hc = MockHostController::new();
    hc.expect_bulk_in_transfer()
        .times(1)
        .withf(|a, ep, _, nak| *a == 1 && ep.address == 0x81 && *nak == NAK_NOWAIT)
        .returning(|_, ep, data, _| {
            data[0] = 0x55;
            ep.receive_toggle = !ep.receive_toggle;
            Ok(1)
        });
    hc.expect_bulk_out_transfer()
        .times(1)
        .withf(|a, ep, data, nak| {
            *a == 1
                && ep.address == 0x02
                && data.iter().eq([1u8, 2, 3].iter())
                && *nak == NAK_LIMIT
        })
        .returning(|_, ep, data, _| {
            ep.send_toggle = !ep.send_toggle;
            Ok(data.len())
        });
    let mut bus = bus_with_device(hc);
    let (mut bulk_in, bulk_out) = bulk_endpoints();
    // Binding resets any stale toggle
    bulk_in.receive_toggle = true;
    bus.bind_bulk_endpoints(1, bulk_in, bulk_out).unwrap();
    assert!(!bus.device(1).unwrap().bulk_in.unwrap().receive_toggle);

    let mut buf = [0u8; 64];
    assert_eq!(bus.bulk_in_transfer(1, &mut buf, NAK_NOWAIT), Ok(1));
    assert_eq!(buf[0], 0x55);
    assert_eq!(bus.bulk_out_transfer(1, &[1, 2, 3], NAK_LIMIT), Ok(3));

    let d = bus.device(1).unwrap();
    assert!(d.bulk_in.unwrap().receive_toggle);
    assert!(d.bulk_out.unwrap().send_toggle);
}
