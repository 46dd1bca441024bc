/// Size of the connection pool.
pub const MAX_CONNECTIONS: usize = 4;

/// Space for a connection string, including its terminating NUL.
pub const CONNECTION_STRING_LENGTH: usize = 64;

/// Lifecycle of one logical ADB connection.
///
/// `Closed` connections are (re)opened by [`Adb::poll()`](crate::Adb::poll)
/// once the device is connected; `Writing` and `Receiving` return to
/// `Open` when the transfer completes.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unused,
    Closed,
    Opening,
    Open,
    Writing,
    Receiving,
}

/// Refers to one slot in the connection pool.
///
/// If the slot is released and reused by another connection, old
/// handles to it stop working.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    slot: u8,
    generation: u16,
}

impl ConnectionHandle {
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Our ID for this connection in ADB messages (never zero).
    pub fn local_id(&self) -> u32 {
        self.slot as u32 + 1
    }
}

/// One logical ADB connection, e.g. `shell:` or `tcp:4567`.
pub struct Connection {
    name: [u8; CONNECTION_STRING_LENGTH],
    name_len: usize,
    local_id: u32,
    pub(crate) remote_id: u32,
    pub(crate) status: ConnectionStatus,
    reconnect: bool,
    last_attempt: Option<u32>,
    pub(crate) data_size: u32,
    pub(crate) data_read: u32,
    generation: u16,
}

impl Connection {
    const fn unused(local_id: u32) -> Self {
        Self {
            name: [0u8; CONNECTION_STRING_LENGTH],
            name_len: 0,
            local_id,
            remote_id: 0,
            status: ConnectionStatus::Unused,
            reconnect: false,
            last_attempt: None,
            data_size: 0,
            data_read: 0,
            generation: 0,
        }
    }

    /// The connection string, without its NUL.
    pub fn connection_string(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    /// The connection string as sent in OPEN, with its NUL.
    pub(crate) fn open_payload(&self) -> &[u8] {
        &self.name[..self.name_len + 1]
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    /// The device's ID for this connection (zero until it is open).
    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn reconnect(&self) -> bool {
        self.reconnect
    }

    pub fn last_attempt(&self) -> Option<u32> {
        self.last_attempt
    }

    /// Is it time to send another OPEN?
    pub(crate) fn ready_to_open(&self, now: u32, cooldown_ms: u32) -> bool {
        self.status == ConnectionStatus::Closed
            && self
                .last_attempt
                .map_or(true, |t| now.wrapping_sub(t) > cooldown_ms)
    }

    pub(crate) fn stamp_attempt(&mut self, now: u32) {
        self.last_attempt = Some(now);
    }

    /// Go back to `Closed` (if persistent) or `Unused`.
    ///
    /// Returns true if the connection had not yet been opened.
    pub(crate) fn close(&mut self) -> bool {
        let was_opening = self.status == ConnectionStatus::Opening;
        self.remote_id = 0;
        self.data_size = 0;
        self.data_read = 0;
        self.status = if self.reconnect {
            ConnectionStatus::Closed
        } else {
            ConnectionStatus::Unused
        };
        was_opening
    }

    /// Is there a device-side connection to close?
    pub(crate) fn is_active(&self) -> bool {
        !matches!(
            self.status,
            ConnectionStatus::Unused | ConnectionStatus::Closed
        )
    }
}

/// A fixed-size pool of connections; a connection's local ID is its
/// slot number plus one.
pub struct ConnectionPool {
    slots: [Connection; MAX_CONNECTIONS],
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub const fn new() -> Self {
        Self {
            slots: [
                Connection::unused(1),
                Connection::unused(2),
                Connection::unused(3),
                Connection::unused(4),
            ],
        }
    }

    /// Claim the first unused slot for a connection to `name`.
    ///
    /// Names longer than [`CONNECTION_STRING_LENGTH`]` - 1` bytes are
    /// truncated. Returns `None` if every slot is in use.
    pub fn add(
        &mut self,
        name: &str,
        reconnect: bool,
    ) -> Option<ConnectionHandle> {
        let slot = self
            .slots
            .iter()
            .position(|c| c.status == ConnectionStatus::Unused)?;
        let c = &mut self.slots[slot];
        let len = name.len().min(CONNECTION_STRING_LENGTH - 1);
        c.name = [0u8; CONNECTION_STRING_LENGTH];
        c.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        c.name_len = len;
        c.remote_id = 0;
        c.status = ConnectionStatus::Closed;
        c.reconnect = reconnect;
        c.last_attempt = None;
        c.data_size = 0;
        c.data_read = 0;
        c.generation = c.generation.wrapping_add(1);
        Some(ConnectionHandle {
            slot: slot as u8,
            generation: c.generation,
        })
    }

    fn handle(&self, slot: usize) -> ConnectionHandle {
        ConnectionHandle {
            slot: slot as u8,
            generation: self.slots[slot].generation,
        }
    }

    pub fn get(&self, h: ConnectionHandle) -> Option<&Connection> {
        self.slots
            .get(h.slot())
            .filter(|c| c.generation == h.generation)
            .filter(|c| c.status != ConnectionStatus::Unused)
    }

    pub(crate) fn get_mut(
        &mut self,
        h: ConnectionHandle,
    ) -> Option<&mut Connection> {
        self.slots
            .get_mut(h.slot())
            .filter(|c| c.generation == h.generation)
            .filter(|c| c.status != ConnectionStatus::Unused)
    }

    /// Find the in-use connection with this local ID.
    pub(crate) fn find(
        &mut self,
        local_id: u32,
    ) -> Option<(ConnectionHandle, &mut Connection)> {
        let slot = self.slots.iter().position(|c| {
            c.local_id == local_id && c.status != ConnectionStatus::Unused
        })?;
        let h = self.handle(slot);
        Some((h, &mut self.slots[slot]))
    }

    /// Every in-use connection, with its handle.
    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (ConnectionHandle, &mut Connection)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(|(_, c)| c.status != ConnectionStatus::Unused)
            .map(|(slot, c)| {
                (
                    ConnectionHandle {
                        slot: slot as u8,
                        generation: c.generation,
                    },
                    c,
                )
            })
    }

    /// Release every slot.
    pub fn clear(&mut self) {
        for c in self.slots.iter_mut() {
            c.status = ConnectionStatus::Unused;
        }
    }

    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|c| c.status != ConnectionStatus::Unused)
            .count()
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/connection.rs"]
mod tests;
