#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod clock;
mod debug;
pub mod device_table;
pub mod enumeration;
pub mod host_controller;
pub mod interrupt;
pub mod max3421e;
pub mod registers;
pub mod types;
pub mod usb_bus;
pub mod wire;

#[cfg(feature = "std")]
pub mod mocks;
