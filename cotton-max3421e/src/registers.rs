//! MAX3421E register map and the transport trait used to reach it.
//!
//! Register numbers here are the values which appear in the top five
//! bits of the SPI command byte (i.e. the register index shifted left
//! by three). The transport is responsible for OR-ing in the write
//! bit (0x02) when writing.

/// Byte-level access to the MAX3421E registers.
///
/// This is implemented by the board support code, usually over an
/// SPI peripheral with a chip-select GPIO. Transfers are assumed not
/// to fail: the chip has no way of reporting a bad SPI cycle.
pub trait Registers {
    /// Read a single register.
    fn read(&mut self, reg: u8) -> u8;

    /// Write a single register.
    fn write(&mut self, reg: u8, value: u8);

    /// Read `data.len()` bytes from one register (typically a FIFO).
    fn read_multiple(&mut self, reg: u8, data: &mut [u8]);

    /// Write all of `data` to one register (typically a FIFO).
    fn write_multiple(&mut self, reg: u8, data: &[u8]);
}

impl<R: Registers + ?Sized> Registers for &mut R {
    fn read(&mut self, reg: u8) -> u8 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: u8, value: u8) {
        (**self).write(reg, value)
    }

    fn read_multiple(&mut self, reg: u8, data: &mut [u8]) {
        (**self).read_multiple(reg, data)
    }

    fn write_multiple(&mut self, reg: u8, data: &[u8]) {
        (**self).write_multiple(reg, data)
    }
}

// Registers (MAX3421E datasheet table 2, host mode)
pub const RCVFIFO: u8 = 0x08;
pub const SNDFIFO: u8 = 0x10;
pub const SUDFIFO: u8 = 0x20;
pub const RCVBC: u8 = 0x30;
pub const SNDBC: u8 = 0x38;
pub const USBIRQ: u8 = 0x68;
pub const USBIEN: u8 = 0x70;
pub const USBCTL: u8 = 0x78;
pub const CPUCTL: u8 = 0x80;
pub const PINCTL: u8 = 0x88;
pub const REVISION: u8 = 0x90;
pub const IOPINS1: u8 = 0xA0;
pub const IOPINS2: u8 = 0xA8;
pub const HIRQ: u8 = 0xC8;
pub const HIEN: u8 = 0xD0;
pub const MODE: u8 = 0xD8;
pub const PERADDR: u8 = 0xE0;
pub const HCTL: u8 = 0xE8;
pub const HXFR: u8 = 0xF0;
pub const HRSL: u8 = 0xF8;

// USBIRQ
pub const OSCOKIRQ: u8 = 0x01;
pub const NOVBUSIRQ: u8 = 0x20;
pub const VBUSIRQ: u8 = 0x40;

// USBCTL
pub const PWRDOWN: u8 = 0x10;
pub const CHIPRES: u8 = 0x20;

// CPUCTL
pub const IE: u8 = 0x01;

// PINCTL
pub const GPXA: u8 = 0x01;
pub const GPXB: u8 = 0x02;
pub const POSINT: u8 = 0x04;
pub const INTLEVEL: u8 = 0x08;
pub const FDUPSPI: u8 = 0x10;

// HIRQ (and the matching HIEN enables)
pub const BUSEVENTIRQ: u8 = 0x01;
pub const RWUIRQ: u8 = 0x02;
pub const RCVDAVIRQ: u8 = 0x04;
pub const SNDBAVIRQ: u8 = 0x08;
pub const SUSDNIRQ: u8 = 0x10;
pub const CONDETIRQ: u8 = 0x20;
pub const FRAMEIRQ: u8 = 0x40;
pub const HXFRDNIRQ: u8 = 0x80;

// MODE
pub const HOST: u8 = 0x01;
pub const LOWSPEED: u8 = 0x02;
pub const HUBPRE: u8 = 0x04;
pub const SOFKAENAB: u8 = 0x08;
pub const SEPIRQ: u8 = 0x10;
pub const DELAYISO: u8 = 0x20;
pub const DMPULLDN: u8 = 0x40;
pub const DPPULLDN: u8 = 0x80;

pub const MODE_FS_HOST: u8 = DPPULLDN | DMPULLDN | HOST | SOFKAENAB;
pub const MODE_LS_HOST: u8 = MODE_FS_HOST | LOWSPEED;

// HCTL
pub const BUSRST: u8 = 0x01;
pub const FRMRST: u8 = 0x02;
pub const SAMPLEBUS: u8 = 0x04;
pub const SIGRSM: u8 = 0x08;
pub const RCVTOG0: u8 = 0x10;
pub const RCVTOG1: u8 = 0x20;
pub const SNDTOG0: u8 = 0x40;
pub const SNDTOG1: u8 = 0x80;

// HRSL
pub const HRSLT_MASK: u8 = 0x0F;
pub const RCVTOGRD: u8 = 0x10;
pub const SNDTOGRD: u8 = 0x20;
pub const KSTATUS: u8 = 0x40;
pub const JSTATUS: u8 = 0x80;
pub const SE0: u8 = 0;
pub const SE1: u8 = JSTATUS | KSTATUS;

// Host result codes (low nibble of HRSL)
pub const HRSL_SUCCESS: u8 = 0x00;
pub const HRSL_NAK: u8 = 0x04;
pub const HRSL_TIMEOUT: u8 = 0x0E;

/// Transfer tokens, written to HXFR together with the endpoint number.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Token {
    Setup = 0x10,
    In = 0x00,
    Out = 0x20,
    /// Status stage of a control-write (or no-data) transfer.
    InHandshake = 0x80,
    /// Status stage of a control-read transfer.
    OutHandshake = 0xA0,
}

impl Token {
    /// The byte to write to HXFR to send this token to an endpoint.
    pub const fn hxfr(self, endpoint: u8) -> u8 {
        self as u8 | (endpoint & 0x0F)
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/registers.rs"]
mod tests;
