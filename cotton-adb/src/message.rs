/// Size of an ADB message header on the wire.
pub const HEADER_SIZE: usize = 24;

pub const A_SYNC: u32 = 0x434e5953;
pub const A_CNXN: u32 = 0x4e584e43;
pub const A_OPEN: u32 = 0x4e45504f;
pub const A_OKAY: u32 = 0x59414b4f;
pub const A_CLSE: u32 = 0x45534c43;
pub const A_WRTE: u32 = 0x45545257;

/// The ADB commands, each of which is the little-endian reading of
/// its four-character name.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Command {
    Sync,
    Connect,
    Open,
    Okay,
    Close,
    Write,
}

impl Command {
    pub const fn code(self) -> u32 {
        match self {
            Command::Sync => A_SYNC,
            Command::Connect => A_CNXN,
            Command::Open => A_OPEN,
            Command::Okay => A_OKAY,
            Command::Close => A_CLSE,
            Command::Write => A_WRTE,
        }
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            A_SYNC => Some(Command::Sync),
            A_CNXN => Some(Command::Connect),
            A_OPEN => Some(Command::Open),
            A_OKAY => Some(Command::Okay),
            A_CLSE => Some(Command::Close),
            A_WRTE => Some(Command::Write),
            _ => None,
        }
    }
}

/// Unsigned, wrapping sum of `data`, continuing from `sum`.
///
/// A payload received in several pieces can be checked by feeding
/// each piece through in turn, starting from zero.
pub fn checksum_update(sum: u32, data: &[u8]) -> u32 {
    data.iter().fold(sum, |acc, b| acc.wrapping_add(*b as u32))
}

pub fn checksum(data: &[u8]) -> u32 {
    checksum_update(0, data)
}

/// An ADB message header (the payload, if any, follows separately).
///
/// All fields are little-endian on the wire.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct Message {
    pub command: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub data_length: u32,
    pub data_check: u32,
    /// `command ^ 0xFFFF_FFFF`
    pub magic: u32,
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for Message {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for Message {}

impl Message {
    /// A header for `payload`, with its length, checksum and magic
    /// filled in.
    pub fn new(command: Command, arg0: u32, arg1: u32, payload: &[u8]) -> Self {
        let command = command.code();
        Self {
            command,
            arg0,
            arg1,
            data_length: payload.len() as u32,
            data_check: checksum(payload),
            magic: command ^ 0xFFFF_FFFF,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let le = Self {
            command: self.command.to_le(),
            arg0: self.arg0.to_le(),
            arg1: self.arg1.to_le(),
            data_length: self.data_length.to_le(),
            data_check: self.data_check.to_le(),
            magic: self.magic.to_le(),
        };
        bytemuck::cast(le)
    }

    /// Parse a header; `buf` must be exactly [`HEADER_SIZE`] bytes.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let m = bytemuck::try_pod_read_unaligned::<Self>(buf).ok()?;
        Some(Self {
            command: u32::from_le(m.command),
            arg0: u32::from_le(m.arg0),
            arg1: u32::from_le(m.arg1),
            data_length: u32::from_le(m.data_length),
            data_check: u32::from_le(m.data_check),
            magic: u32::from_le(m.magic),
        })
    }

    /// Does the magic field match the command?
    pub fn is_valid(&self) -> bool {
        self.magic == self.command ^ 0xFFFF_FFFF
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.command)
    }

    /// Does `payload` match this header's length and checksum?
    pub fn verify(&self, payload: &[u8]) -> bool {
        payload.len() as u32 == self.data_length
            && checksum(payload) == self.data_check
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/message.rs"]
mod tests;
