use super::debug;
use crate::connection::{
    Connection, ConnectionHandle, ConnectionPool, ConnectionStatus,
};
use crate::identify::{AdbInterface, IdentifyAdb};
use crate::message::{checksum_update, Command, Message, HEADER_SIZE};
use cotton_max3421e::clock::{elapsed_since, Clock};
use cotton_max3421e::device_table::UsbDevice;
use cotton_max3421e::host_controller::{HostController, NAK_LIMIT, NAK_NOWAIT};
use cotton_max3421e::types::{Endpoint, EndpointType, UsbError};
use cotton_max3421e::usb_bus::{DeviceEvent, UsbBus};
use cotton_max3421e::wire::{parse_descriptors, ShowDescriptors};

/// Largest packet the MAX3421E FIFOs can hold.
pub const PACKET_SIZE: usize = 64;

/// Size of the scratch buffer used for configuration descriptors and
/// the device's identity string.
pub const MAX_BUF_SIZE: usize = 256;

/// Tunable parameters of the ADB host.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct AdbConfig {
    /// Sent (NUL-terminated) as the CNXN payload
    pub banner: &'static str,
    /// CNXN arg0
    pub version: u32,
    /// CNXN arg1, and the largest payload [`Adb::write()`] accepts
    pub max_payload: u32,
    /// How long to wait before retrying an OPEN
    pub retry_cooldown_ms: u32,
    /// How often to repeat CNXN while waiting for an answer
    pub handshake_interval_ms: u32,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            banner: "host::microbridge",
            version: 0x0100_0000,
            max_payload: 4096,
            retry_cooldown_ms: 1000,
            handshake_interval_ms: 500,
        }
    }
}

/// Things the application is told about.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Event<'a> {
    /// The device answered CNXN; `identity` is its system identity
    /// string (e.g. `device::ro.product.name=...`)
    Connect { identity: &'a [u8] },
    /// The ADB device was unplugged
    Disconnect,
    ConnectionOpen(ConnectionHandle),
    ConnectionClose(ConnectionHandle),
    /// The device refused to open the connection
    ConnectionFailed(ConnectionHandle),
    /// Some data arrived; it must be consumed before the next poll
    ConnectionReceive(ConnectionHandle, &'a [u8]),
}

/// Receives [`Event`]s, synchronously, from inside [`Adb::poll()`].
pub trait EventHandler {
    fn on_event(&mut self, event: Event<'_>);
}

impl<F: FnMut(Event<'_>)> EventHandler for F {
    fn on_event(&mut self, event: Event<'_>) {
        self(event)
    }
}

/// Why [`Adb::write()`] refused.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AdbError {
    /// No ADB device is attached
    NoDevice,
    /// The device hasn't answered CNXN yet
    NotConnected,
    /// The handle refers to a connection that no longer exists
    InvalidHandle,
    /// The connection isn't open (or is busy)
    NotOpen,
    /// Larger than the negotiated maximum payload
    PayloadTooLarge,
    Usb(UsbError),
}

impl AdbError {
    /// A numeric status, as returned by other ADB host
    /// implementations: negative for ADB-level errors, the USB result
    /// code for transfer failures.
    pub fn code(&self) -> i32 {
        match self {
            AdbError::NoDevice | AdbError::NotConnected => -1,
            AdbError::InvalidHandle | AdbError::NotOpen => -2,
            AdbError::PayloadTooLarge => -3,
            AdbError::Usb(e) => e.code() as i32,
        }
    }
}

impl From<UsbError> for AdbError {
    fn from(e: UsbError) -> Self {
        AdbError::Usb(e)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
struct BoundDevice {
    address: u8,
    in_packet_size: u8,
}

fn clamp_packet_size(advertised: u16) -> u8 {
    if advertised == 0 || advertised as usize > PACKET_SIZE {
        PACKET_SIZE as u8
    } else {
        advertised as u8
    }
}

fn send<HC: HostController, C: Clock>(
    bus: &mut UsbBus<HC, C>,
    address: u8,
    message: &Message,
    payload: &[u8],
) -> Result<(), UsbError> {
    bus.bulk_out_transfer(address, &message.to_bytes(), NAK_LIMIT)?;
    if !payload.is_empty() {
        bus.bulk_out_transfer(address, payload, NAK_LIMIT)?;
    }
    Ok(())
}

/// Read and throw away `len` bytes of payload.
fn discard<HC: HostController, C: Clock>(
    bus: &mut UsbBus<HC, C>,
    address: u8,
    packet_size: u8,
    mut len: u32,
) {
    let mut buf = [0u8; PACKET_SIZE];
    while len > 0 {
        let chunk = (len as usize).min(packet_size as usize);
        match bus.bulk_in_transfer(address, &mut buf[..chunk], NAK_LIMIT) {
            Ok(n) if n > 0 => len = len.saturating_sub(n as u32),
            _ => {
                debug::warn!("adb: lost {} bytes", len);
                return;
            }
        }
    }
}

/// An ADB host, multiplexing several connections over one USB device.
///
/// Everything happens inside [`poll()`](Adb::poll), which must be
/// called regularly: it drives USB enumeration, binds to an ADB
/// device when one appears, performs the CNXN handshake, opens
/// connections, and delivers incoming messages as [`Event`]s to the
/// handler.
pub struct Adb<HC: HostController, C: Clock, H: EventHandler> {
    bus: UsbBus<HC, C>,
    handler: H,
    config: AdbConfig,
    connections: ConnectionPool,
    device: Option<BoundDevice>,
    connected: bool,
    last_handshake: Option<u32>,
    buf: [u8; MAX_BUF_SIZE],
}

impl<HC: HostController, C: Clock, H: EventHandler> Adb<HC, C, H> {
    pub fn new(bus: UsbBus<HC, C>, handler: H) -> Self {
        Self::with_config(bus, handler, AdbConfig::default())
    }

    pub fn with_config(
        bus: UsbBus<HC, C>,
        handler: H,
        config: AdbConfig,
    ) -> Self {
        Self {
            bus,
            handler,
            config,
            connections: ConnectionPool::new(),
            device: None,
            connected: false,
            last_handshake: None,
            buf: [0u8; MAX_BUF_SIZE],
        }
    }

    /// Initialise the USB host, forgetting any device and all
    /// connections.
    pub fn init(&mut self) -> Result<(), UsbError> {
        self.connections.clear();
        self.device = None;
        self.connected = false;
        self.last_handshake = None;
        self.bus.init()
    }

    pub fn bus(&mut self) -> &mut UsbBus<HC, C> {
        &mut self.bus
    }

    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn config(&self) -> &AdbConfig {
        &self.config
    }

    /// USB address of the bound ADB device, if any.
    pub fn device_address(&self) -> Option<u8> {
        self.device.map(|d| d.address)
    }

    /// Has the device answered our CNXN?
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connection(&self, h: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(h)
    }

    /// Add a connection (e.g. `"shell:"` or `"tcp:4567"`) to be
    /// opened as soon as a device is connected.
    ///
    /// If `reconnect` is set, the connection is reopened whenever the
    /// device closes it; otherwise its slot is freed. Returns `None`
    /// if all the slots are in use.
    pub fn add_connection(
        &mut self,
        connection_string: &str,
        reconnect: bool,
    ) -> Option<ConnectionHandle> {
        let h = self.connections.add(connection_string, reconnect)?;
        debug::println!("adb: connection {} added", h.local_id());
        Some(h)
    }

    /// Send data on an open connection.
    ///
    /// The connection is busy (state `Writing`) until the device
    /// acknowledges the data; further writes are refused until then.
    pub fn write(
        &mut self,
        h: ConnectionHandle,
        data: &[u8],
    ) -> Result<(), AdbError> {
        let device = self.device.ok_or(AdbError::NoDevice)?;
        if !self.connected {
            return Err(AdbError::NotConnected);
        }
        let c = self.connections.get_mut(h).ok_or(AdbError::InvalidHandle)?;
        if c.status != ConnectionStatus::Open {
            return Err(AdbError::NotOpen);
        }
        if data.len() > self.config.max_payload as usize {
            return Err(AdbError::PayloadTooLarge);
        }

        c.status = ConnectionStatus::Writing;
        let message =
            Message::new(Command::Write, c.local_id(), c.remote_id, data);
        if let Err(e) = send(&mut self.bus, device.address, &message, data) {
            debug::warn!("adb: write failed {:?}", e);
            c.status = ConnectionStatus::Open;
            return Err(e.into());
        }
        Ok(())
    }

    /// Send a string, with its terminating NUL, on an open connection.
    ///
    /// The NUL-terminated copy is built on the stack, so strings are
    /// limited to `MAX_BUF_SIZE - 1` (255) bytes; longer ones get
    /// [`AdbError::PayloadTooLarge`]. Use [`write()`](Adb::write) for
    /// larger payloads.
    pub fn write_str(
        &mut self,
        h: ConnectionHandle,
        s: &str,
    ) -> Result<(), AdbError> {
        let len = s.len();
        if len + 1 > MAX_BUF_SIZE {
            return Err(AdbError::PayloadTooLarge);
        }
        let mut payload = [0u8; MAX_BUF_SIZE];
        payload[..len].copy_from_slice(s.as_bytes());
        self.write(h, &payload[..len + 1])
    }

    /// Do everything that needs doing.
    pub fn poll(&mut self) {
        match self.bus.poll() {
            DeviceEvent::Connect(device) => self.on_device_connect(device),
            DeviceEvent::Disconnect(gone) => {
                if let Some(bound) = self.device {
                    if gone.contains(bound.address) {
                        self.on_device_disconnect();
                    }
                }
            }
            DeviceEvent::EnumerationError(_) | DeviceEvent::None => {}
        }

        let Some(device) = self.device else {
            return;
        };

        if self.connected {
            self.open_connections(device);
        } else {
            self.handshake(device);
        }

        self.receive(device);
    }

    fn on_device_connect(&mut self, device: UsbDevice) {
        match self.bind(&device) {
            Ok(Some(bound)) => {
                debug::println!("adb: bound device {}", bound.address);
                self.device = Some(bound);
                self.connected = false;
                self.last_handshake = None;
            }
            Ok(None) => {
                debug::println!("adb: device {} is not ADB", device.address);
            }
            Err(e) => {
                debug::warn!("adb: bind failed {:?}", e);
            }
        }
    }

    fn bind(
        &mut self,
        device: &UsbDevice,
    ) -> Result<Option<BoundDevice>, UsbError> {
        let address = device.address;
        let n = self.bus.get_configuration(address, 0, &mut self.buf)?;
        parse_descriptors(&self.buf[..n], &mut ShowDescriptors);
        let Some(adb) = IdentifyAdb::scan(&self.buf[..n]) else {
            return Ok(None);
        };
        self.bind_interface(address, &adb).map(Some)
    }

    fn bind_interface(
        &mut self,
        address: u8,
        adb: &AdbInterface,
    ) -> Result<BoundDevice, UsbError> {
        let in_packet_size = clamp_packet_size(adb.input_packet_size);
        self.bus.bind_bulk_endpoints(
            address,
            Endpoint::new(adb.input_endpoint, EndpointType::Bulk, in_packet_size),
            Endpoint::new(
                adb.output_endpoint,
                EndpointType::Bulk,
                clamp_packet_size(adb.output_packet_size),
            ),
        )?;
        self.bus.configure(address, adb.configuration)?;
        Ok(BoundDevice {
            address,
            in_packet_size,
        })
    }

    fn on_device_disconnect(&mut self) {
        debug::println!("adb: device gone");
        for (h, c) in self.connections.iter_mut() {
            if c.is_active() {
                let event = if c.close() {
                    Event::ConnectionFailed(h)
                } else {
                    Event::ConnectionClose(h)
                };
                self.handler.on_event(event);
            }
        }
        self.device = None;
        self.connected = false;
        self.last_handshake = None;
        self.handler.on_event(Event::Disconnect);
    }

    fn handshake(&mut self, device: BoundDevice) {
        if let Some(then) = self.last_handshake {
            if elapsed_since(self.bus.clock(), then)
                < self.config.handshake_interval_ms
            {
                return;
            }
        }
        self.last_handshake = Some(self.bus.clock().now_ms());

        let banner = self.config.banner.as_bytes();
        let len = banner.len().min(MAX_BUF_SIZE - 1);
        let mut payload = [0u8; MAX_BUF_SIZE];
        payload[..len].copy_from_slice(&banner[..len]);
        let payload = &payload[..len + 1];

        let message = Message::new(
            Command::Connect,
            self.config.version,
            self.config.max_payload,
            payload,
        );
        if let Err(e) = send(&mut self.bus, device.address, &message, payload)
        {
            debug::warn!("adb: CNXN failed {:?}", e);
        }
    }

    fn open_connections(&mut self, device: BoundDevice) {
        let now = self.bus.clock().now_ms();
        let cooldown = self.config.retry_cooldown_ms;
        for (h, c) in self.connections.iter_mut() {
            if !c.ready_to_open(now, cooldown) {
                continue;
            }
            c.stamp_attempt(now);
            let payload = c.open_payload();
            let message = Message::new(Command::Open, c.local_id(), 0, payload);
            match send(&mut self.bus, device.address, &message, payload) {
                Ok(()) => {
                    debug::println!("adb: opening {}", h.local_id());
                    c.status = ConnectionStatus::Opening;
                }
                Err(e) => {
                    debug::warn!("adb: OPEN {} failed {:?}", h.local_id(), e);
                }
            }
        }
    }

    fn receive(&mut self, device: BoundDevice) {
        let mut frame = [0u8; PACKET_SIZE];
        let n = match self.bus.bulk_in_transfer(
            device.address,
            &mut frame,
            NAK_NOWAIT,
        ) {
            Ok(n) => n,
            Err(UsbError::Nak) => return,
            Err(e) => {
                debug::println!("adb: receive {:?}", e);
                return;
            }
        };
        if n != HEADER_SIZE {
            if n != 0 {
                debug::warn!("adb: dropped {}-byte frame", n);
            }
            return;
        }
        let Some(message) = Message::from_bytes(&frame[..HEADER_SIZE]) else {
            return;
        };
        if !message.is_valid() {
            debug::warn!("adb: bad magic {:x}", message.magic);
            return;
        }
        self.dispatch(device, &message);
    }

    fn dispatch(&mut self, device: BoundDevice, message: &Message) {
        let Some(command) = message.command() else {
            discard(
                &mut self.bus,
                device.address,
                device.in_packet_size,
                message.data_length,
            );
            return;
        };

        if command == Command::Connect {
            self.on_cnxn(device, message);
            return;
        }

        let Some((h, c)) = self.connections.find(message.arg1) else {
            debug::println!("adb: no connection {}", message.arg1);
            discard(
                &mut self.bus,
                device.address,
                device.in_packet_size,
                message.data_length,
            );
            return;
        };

        match command {
            Command::Okay => match c.status {
                ConnectionStatus::Opening => {
                    c.remote_id = message.arg0;
                    c.status = ConnectionStatus::Open;
                    debug::println!("adb: connection {} open", h.local_id());
                    self.handler.on_event(Event::ConnectionOpen(h));
                }
                ConnectionStatus::Writing => {
                    c.status = ConnectionStatus::Open;
                }
                _ => {}
            },
            Command::Close => {
                if c.is_active() {
                    let event = if c.close() {
                        Event::ConnectionFailed(h)
                    } else {
                        Event::ConnectionClose(h)
                    };
                    debug::println!("adb: connection {} closed", h.local_id());
                    self.handler.on_event(event);
                }
            }
            Command::Write => {
                self.on_wrte(device, message, h);
                return;
            }
            Command::Sync | Command::Open | Command::Connect => {}
        }

        if message.data_length > 0 {
            discard(
                &mut self.bus,
                device.address,
                device.in_packet_size,
                message.data_length,
            );
        }
    }

    fn on_cnxn(&mut self, device: BoundDevice, message: &Message) {
        let want = message.data_length as usize;
        let keep = want.min(MAX_BUF_SIZE);
        let mut got = 0;
        while got < keep {
            let chunk = (keep - got).min(device.in_packet_size as usize);
            match self.bus.bulk_in_transfer(
                device.address,
                &mut self.buf[got..got + chunk],
                NAK_LIMIT,
            ) {
                Ok(n) if n > 0 => got += n,
                _ => break,
            }
        }
        if got == keep && want > keep {
            discard(
                &mut self.bus,
                device.address,
                device.in_packet_size,
                (want - keep) as u32,
            );
        }

        // Identity strings are NUL-terminated, or not
        let mut identity = &self.buf[..got];
        if let Some((&0, rest)) = identity.split_last() {
            identity = rest;
        }
        debug::println!("adb: connected, {} byte identity", identity.len());
        self.connected = true;
        self.handler.on_event(Event::Connect { identity });
    }

    fn on_wrte(
        &mut self,
        device: BoundDevice,
        message: &Message,
        h: ConnectionHandle,
    ) {
        let Self {
            bus,
            handler,
            connections,
            buf,
            ..
        } = self;
        let Some(c) = connections.get_mut(h) else {
            return;
        };

        c.status = ConnectionStatus::Receiving;
        c.data_size = message.data_length;
        c.data_read = 0;
        let mut sum = 0u32;

        while c.data_read < c.data_size {
            let chunk = ((c.data_size - c.data_read) as usize)
                .min(device.in_packet_size as usize);
            match bus.bulk_in_transfer(
                device.address,
                &mut buf[..chunk],
                NAK_LIMIT,
            ) {
                Ok(n) if n > 0 => {
                    c.data_read += n as u32;
                    sum = checksum_update(sum, &buf[..n]);
                    handler.on_event(Event::ConnectionReceive(h, &buf[..n]));
                }
                rc => {
                    debug::warn!(
                        "adb: WRTE on {} abandoned at {}/{} {:?}",
                        h.local_id(),
                        c.data_read,
                        c.data_size,
                        rc
                    );
                    c.status = ConnectionStatus::Open;
                    return;
                }
            }
        }

        if sum != message.data_check {
            debug::warn!(
                "adb: checksum {:x} expected {:x} on {}",
                sum,
                message.data_check,
                h.local_id()
            );
        }

        let reply =
            Message::new(Command::Okay, message.arg1, message.arg0, &[]);
        if let Err(e) = send(bus, device.address, &reply, &[]) {
            debug::warn!("adb: OKAY failed {:?}", e);
        }
        c.status = ConnectionStatus::Open;
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/adb.rs"]
mod tests;
