//! Test doubles for the hardware-facing traits, for use in this
//! crate's tests and in those of class drivers built on it.
use crate::clock::Clock;
use crate::host_controller::DataPhase;
use crate::types::{DeviceStatus, Endpoint, UsbError};
use crate::wire::SetupPacket;
use mockall::mock;
use std::cell::Cell;

mock! {
    pub Registers {}

    impl crate::registers::Registers for Registers {
        fn read(&mut self, reg: u8) -> u8;
        fn write(&mut self, reg: u8, value: u8);
        fn read_multiple(&mut self, reg: u8, data: &mut [u8]);
        fn write_multiple(&mut self, reg: u8, data: &[u8]);
    }
}

mock! {
    pub HostController {}

    impl crate::host_controller::HostController for HostController {
        fn init(&mut self) -> Result<(), UsbError>;

        fn device_status(&mut self) -> DeviceStatus;

        fn reset_bus(&mut self);

        fn bus_reset_complete(&mut self) -> bool;

        fn enable_sof(&mut self);

        fn sof_seen(&mut self) -> bool;

        fn control_transfer<'a>(
            &mut self,
            address: u8,
            packet_size: u8,
            setup: SetupPacket,
            data_phase: DataPhase<'a>,
        ) -> Result<usize, UsbError>;

        fn bulk_in_transfer(
            &mut self,
            address: u8,
            endpoint: &mut Endpoint,
            data: &mut [u8],
            nak_limit: u16,
        ) -> Result<usize, UsbError>;

        fn bulk_out_transfer(
            &mut self,
            address: u8,
            endpoint: &mut Endpoint,
            data: &[u8],
            nak_limit: u16,
        ) -> Result<usize, UsbError>;
    }
}

/// A clock which only moves when told to.
///
/// Optionally, every reading of the clock also advances it by a fixed
/// step, which lets busy-wait loops reach their deadlines.
#[derive(Default)]
pub struct FakeClock {
    now: Cell<u32>,
    step: Cell<u32>,
}

impl FakeClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Cell::new(start),
            step: Cell::new(0),
        }
    }

    /// A clock which advances by `step` ms each time it is read.
    pub fn with_step(start: u32, step: u32) -> Self {
        Self {
            now: Cell::new(start),
            step: Cell::new(step),
        }
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn set_step(&self, step: u32) {
        self.step.set(step);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(self.step.get()));
        now
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(ms);
    }
}
