use crate::clock::{Clock, Deadline};
use crate::debug;
use crate::host_controller::{DataPhase, HostController, NAK_LIMIT};
use crate::interrupt::InterruptLatch;
use crate::registers::*;
use crate::types::{DeviceStatus, Endpoint, EndpointType, UsbError, UsbSpeed};
use crate::wire::SetupPacket;

/// The MAX3421E transaction engine.
///
/// Drives individual SETUP, IN and OUT tokens through the chip's
/// serial interface engine, with the NAK, retry and deadline policy
/// applied to every token, and builds control and bulk transfers on
/// top of them.
///
/// Everything here busy-waits, but never for longer than
/// [`TRANSFER_TIMEOUT_MS`](Max3421e::TRANSFER_TIMEOUT_MS) per transfer.
pub struct Max3421e<R: Registers, C: Clock> {
    regs: R,
    clock: C,
    status: DeviceStatus,
    latch: Option<&'static InterruptLatch>,
}

impl<R: Registers, C: Clock> Max3421e<R, C> {
    /// Overall deadline for one transfer, from first token to last.
    pub const TRANSFER_TIMEOUT_MS: u32 = 5000;

    /// Attempts made on a token that gets no response (HRSL TIMEOUT).
    pub const RETRY_LIMIT: u8 = 3;

    /// How many times to poll for the oscillator after a chip reset.
    pub const OSCILLATOR_ATTEMPTS: u16 = 256;

    const SAMPLE_TIMEOUT_MS: u32 = 10;

    /// A controller which samples HIRQ on every
    /// [`device_status()`](HostController::device_status) call.
    pub fn new(regs: R, clock: C) -> Self {
        Self {
            regs,
            clock,
            status: DeviceStatus::Absent,
            latch: None,
        }
    }

    /// A controller which only samples HIRQ after the interrupt
    /// handler has signalled `latch`.
    pub fn with_interrupt(
        regs: R,
        clock: C,
        latch: &'static InterruptLatch,
    ) -> Self {
        Self {
            regs,
            clock,
            status: DeviceStatus::Absent,
            latch: Some(latch),
        }
    }

    /// Direct register access, e.g. for the chip's GPIO pins.
    pub fn registers(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Reset the chip and wait for its oscillator to stabilise.
    pub fn reset(&mut self) -> Result<(), UsbError> {
        self.regs.write(USBCTL, CHIPRES);
        self.regs.write(USBCTL, 0);

        for _ in 0..Self::OSCILLATOR_ATTEMPTS {
            if (self.regs.read(USBIRQ) & OSCOKIRQ) != 0 {
                return Ok(());
            }
        }
        Err(UsbError::ChipNotReady)
    }

    /// Bring the chip up in host mode and find out what (if anything)
    /// is attached.
    pub fn power_on(&mut self) -> Result<(), UsbError> {
        // Full-duplex SPI, level-triggered interrupt, SOF on GPX
        self.regs.write(PINCTL, FDUPSPI | INTLEVEL | GPXB);

        self.reset()?;

        let revision = self.regs.read(REVISION);
        debug::println!("MAX3421E revision {:x}", revision);

        self.regs.write(MODE, DPPULLDN | DMPULLDN | HOST | SEPIRQ);
        self.regs.write(HIEN, CONDETIRQ | FRAMEIRQ);

        self.regs.write(HCTL, SAMPLEBUS);
        let deadline = Deadline::after(&self.clock, Self::SAMPLE_TIMEOUT_MS);
        while (self.regs.read(HCTL) & SAMPLEBUS) == 0
            && !deadline.has_passed(&self.clock)
        {}

        self.probe_bus();
        self.regs.write(HIRQ, CONDETIRQ);
        self.regs.write(CPUCTL, IE);
        Ok(())
    }

    /// Sample the J/K state of the bus and set host mode to match.
    ///
    /// The chip reports J and K relative to the speed it is currently
    /// configured for, so a K state in full-speed mode (or a J state in
    /// low-speed mode) means a low-speed device.
    pub fn probe_bus(&mut self) -> DeviceStatus {
        let bus = self.regs.read(HRSL) & (JSTATUS | KSTATUS);
        let low_speed_mode = (self.regs.read(MODE) & LOWSPEED) != 0;

        self.status = match (bus, low_speed_mode) {
            (JSTATUS, false) | (KSTATUS, true) => {
                self.regs.write(MODE, MODE_FS_HOST);
                DeviceStatus::Present(UsbSpeed::Full12)
            }
            (JSTATUS, true) | (KSTATUS, false) => {
                self.regs.write(MODE, MODE_LS_HOST);
                DeviceStatus::Present(UsbSpeed::Low1_5)
            }
            (SE1, _) => DeviceStatus::Illegal,
            _ => DeviceStatus::Absent,
        };
        debug::println!("bus probe: {:?}", self.status);
        self.status
    }

    /// Read HIRQ and deal with connection changes, returning the
    /// interrupt bits which were serviced (and acknowledged).
    pub fn service_interrupts(&mut self) -> u8 {
        let hirq = self.regs.read(HIRQ);
        let mut serviced = 0;

        if (hirq & CONDETIRQ) != 0 {
            self.probe_bus();
            serviced |= CONDETIRQ;
        }

        if serviced != 0 {
            self.regs.write(HIRQ, serviced);
        }
        serviced
    }

    fn wait_for_completion(
        &mut self,
        deadline: &Deadline,
    ) -> Result<u8, UsbError> {
        loop {
            if (self.regs.read(HIRQ) & HXFRDNIRQ) != 0 {
                self.regs.write(HIRQ, HXFRDNIRQ);
                return Ok(self.regs.read(HRSL) & HRSLT_MASK);
            }
            if deadline.has_passed(&self.clock) {
                return Err(UsbError::TransferTimeout);
            }
        }
    }

    /// Send one token to an endpoint of the current peripheral address,
    /// retrying as necessary.
    ///
    /// NAKs are retried until `nak_limit` of them have been seen (zero
    /// means no limit); "no response" is retried up to
    /// [`RETRY_LIMIT`](Max3421e::RETRY_LIMIT) times; anything else fails
    /// straight away. Whatever happens, the whole thing gives up after
    /// [`TRANSFER_TIMEOUT_MS`](Max3421e::TRANSFER_TIMEOUT_MS).
    pub fn dispatch_token(
        &mut self,
        token: Token,
        endpoint: u8,
        nak_limit: u16,
    ) -> Result<(), UsbError> {
        let deadline = Deadline::after(&self.clock, Self::TRANSFER_TIMEOUT_MS);
        let mut naks = 0u16;
        let mut retries = 0u8;

        loop {
            if deadline.has_passed(&self.clock) {
                return Err(UsbError::TransferTimeout);
            }

            self.regs.write(HXFR, token.hxfr(endpoint));

            match self.wait_for_completion(&deadline)? {
                HRSL_SUCCESS => return Ok(()),
                HRSL_NAK => {
                    naks = naks.saturating_add(1);
                    if nak_limit != 0 && naks >= nak_limit {
                        return Err(UsbError::Nak);
                    }
                }
                HRSL_TIMEOUT => {
                    retries += 1;
                    if retries >= Self::RETRY_LIMIT {
                        return Err(UsbError::Timeout);
                    }
                }
                code => return UsbError::result_from_code(code),
            }
        }
    }

    /// Perform a control transfer on endpoint zero of `address`.
    ///
    /// The direction of the data stage comes from `bmRequestType`, and
    /// must agree with `data_phase`. The status stage goes the other
    /// way. Returns the number of bytes moved in the data stage.
    pub fn control_transfer(
        &mut self,
        address: u8,
        packet_size: u8,
        setup: SetupPacket,
        data_phase: DataPhase<'_>,
    ) -> Result<usize, UsbError> {
        let length = setup.wLength as usize;
        if length > 0
            && !((setup.is_in() && data_phase.is_in())
                || (!setup.is_in() && data_phase.is_out()))
        {
            return Err(UsbError::ProtocolError);
        }

        self.regs.write(PERADDR, address);
        self.regs.write_multiple(SUDFIFO, &setup.to_bytes());
        self.dispatch_token(Token::Setup, 0, NAK_LIMIT)?;

        // Data stages always start with DATA1
        let mut ep0 = Endpoint::new(0, EndpointType::Control, packet_size);
        let (count, handshake) = match data_phase {
            DataPhase::In(buf) if length > 0 => {
                ep0.receive_toggle = true;
                let len = length.min(buf.len());
                let n = self.in_transfer(&mut ep0, &mut buf[..len], NAK_LIMIT)?;
                (n, Token::OutHandshake)
            }
            DataPhase::Out(buf) if length > 0 => {
                ep0.send_toggle = true;
                let len = length.min(buf.len());
                let n = self.out_transfer(&mut ep0, &buf[..len], NAK_LIMIT)?;
                (n, Token::InHandshake)
            }
            _ => (0, Token::InHandshake),
        };

        self.dispatch_token(handshake, 0, NAK_LIMIT)?;
        Ok(count)
    }

    /// Read from an IN endpoint until a short packet is received or
    /// `data` is full.
    pub fn in_transfer(
        &mut self,
        endpoint: &mut Endpoint,
        data: &mut [u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError> {
        let packet_size = endpoint.max_packet_size as usize;
        if packet_size == 0 {
            return Err(UsbError::ZeroPacketSize);
        }

        self.regs.write(
            HCTL,
            if endpoint.receive_toggle {
                RCVTOG1
            } else {
                RCVTOG0
            },
        );

        let mut total = 0;
        loop {
            self.dispatch_token(Token::In, endpoint.number(), nak_limit)?;

            if (self.regs.read(HIRQ) & RCVDAVIRQ) == 0 {
                return Err(UsbError::ReceiveSync);
            }

            let count = self.regs.read(RCVBC) as usize;
            let room = data.len() - total;
            let n = count.min(room);
            if n > 0 {
                self.regs.read_multiple(RCVFIFO, &mut data[total..total + n]);
            }

            if count > room {
                // Drain the rest so the FIFO is free for the next packet
                let mut scratch = [0u8; 64];
                let excess = (count - room).min(scratch.len());
                self.regs.read_multiple(RCVFIFO, &mut scratch[..excess]);
                self.regs.write(HIRQ, RCVDAVIRQ);
                endpoint.receive_toggle =
                    (self.regs.read(HRSL) & RCVTOGRD) != 0;
                return Err(UsbError::BufferTooSmall);
            }

            self.regs.write(HIRQ, RCVDAVIRQ);
            total += n;

            if count < packet_size || total >= data.len() {
                endpoint.receive_toggle =
                    (self.regs.read(HRSL) & RCVTOGRD) != 0;
                return Ok(total);
            }
        }
    }

    /// Send all of `data` to an OUT endpoint.
    pub fn out_transfer(
        &mut self,
        endpoint: &mut Endpoint,
        data: &[u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError> {
        let packet_size = endpoint.max_packet_size as usize;
        if packet_size == 0 {
            return Err(UsbError::ZeroPacketSize);
        }

        self.regs.write(
            HCTL,
            if endpoint.send_toggle {
                SNDTOG1
            } else {
                SNDTOG0
            },
        );

        let deadline = Deadline::after(&self.clock, Self::TRANSFER_TIMEOUT_MS);
        let hxfr = Token::Out.hxfr(endpoint.number());

        for chunk in data.chunks(packet_size) {
            self.regs.write_multiple(SNDFIFO, chunk);
            self.regs.write(SNDBC, chunk.len() as u8);
            self.regs.write(HXFR, hxfr);
            let mut code = self.wait_for_completion(&deadline)?;

            let mut naks = 0u16;
            let mut retries = 0u8;
            while code != HRSL_SUCCESS {
                match code {
                    HRSL_NAK => {
                        naks = naks.saturating_add(1);
                        if nak_limit != 0 && naks >= nak_limit {
                            return Err(UsbError::Nak);
                        }
                    }
                    HRSL_TIMEOUT => {
                        retries += 1;
                        if retries >= Self::RETRY_LIMIT {
                            return Err(UsbError::Timeout);
                        }
                    }
                    _ => {
                        UsbError::result_from_code(code)?;
                    }
                }

                if deadline.has_passed(&self.clock) {
                    return Err(UsbError::TransferTimeout);
                }

                // Erratum: after a failed OUT the SNDFIFO must be
                // re-armed before the retry. Zeroing SNDBC and writing a
                // single byte is enough; the packet itself is intact.
                self.regs.write(SNDBC, 0);
                self.regs.write(SNDFIFO, chunk[0]);
                self.regs.write(SNDBC, chunk.len() as u8);
                self.regs.write(HXFR, hxfr);
                code = self.wait_for_completion(&deadline)?;
            }
        }

        endpoint.send_toggle = (self.regs.read(HRSL) & SNDTOGRD) != 0;
        Ok(data.len())
    }
}

impl<R: Registers, C: Clock> HostController for Max3421e<R, C> {
    fn init(&mut self) -> Result<(), UsbError> {
        self.power_on()
    }

    fn device_status(&mut self) -> DeviceStatus {
        let pending = match self.latch {
            Some(latch) => latch.take(),
            None => true,
        };
        if pending {
            self.service_interrupts();
        }
        self.status
    }

    fn reset_bus(&mut self) {
        self.regs.write(HCTL, BUSRST);
    }

    fn bus_reset_complete(&mut self) -> bool {
        (self.regs.read(HCTL) & BUSRST) == 0
    }

    fn enable_sof(&mut self) {
        let mode = self.regs.read(MODE);
        self.regs.write(MODE, mode | SOFKAENAB);
    }

    fn sof_seen(&mut self) -> bool {
        if (self.regs.read(HIRQ) & FRAMEIRQ) != 0 {
            self.regs.write(HIRQ, FRAMEIRQ);
            true
        } else {
            false
        }
    }

    fn control_transfer<'a>(
        &mut self,
        address: u8,
        packet_size: u8,
        setup: SetupPacket,
        data_phase: DataPhase<'a>,
    ) -> Result<usize, UsbError> {
        Max3421e::control_transfer(self, address, packet_size, setup, data_phase)
    }

    fn bulk_in_transfer(
        &mut self,
        address: u8,
        endpoint: &mut Endpoint,
        data: &mut [u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError> {
        self.regs.write(PERADDR, address);
        self.in_transfer(endpoint, data, nak_limit)
    }

    fn bulk_out_transfer(
        &mut self,
        address: u8,
        endpoint: &mut Endpoint,
        data: &[u8],
        nak_limit: u16,
    ) -> Result<usize, UsbError> {
        self.regs.write(PERADDR, address);
        self.out_transfer(endpoint, data, nak_limit)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/max3421e.rs"]
mod tests;
