#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![allow(clippy::uninlined_format_args)]

pub mod adb;
pub mod connection;
mod debug;
pub mod identify;
pub mod message;

pub use adb::{Adb, AdbConfig, AdbError, Event, EventHandler};
pub use connection::{ConnectionHandle, ConnectionStatus};
pub use identify::{AdbInterface, IdentifyAdb};
