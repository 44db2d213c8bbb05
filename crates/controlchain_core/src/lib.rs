// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Wire protocol core for the Control Chain serial bus.
//!
//! Control Chain connects a host computer to a daisy-chain of controller
//! devices (foot-switches, knobs, button pages) over a shared half-duplex
//! serial line. This crate holds everything that is observable on the wire:
//! the CRC-8 used by every frame, the frame layout itself, the closed command
//! set, and the typed payload codecs for each command. The chain engine that
//! drives a real serial port lives in `controlchain_master`; IPC servers and
//! clients consume the same types through that crate.
//!
//! Nothing here performs I/O. Codecs operate on byte slices so they can be
//! exercised from unit tests and device simulators alike.

pub mod crc;
pub mod errors;
pub mod frame;
pub mod message;
pub mod util;

/// Protocol version spoken by this host, sent back to devices during the
/// handshake. Devices announcing an older major version are rejected.
pub const PROTOCOL_MAJOR: u8 = 0;
pub const PROTOCOL_MINOR: u8 = 7;

/// Byte value that starts every frame on the wire.
pub const SYNC_BYTE: u8 = 0xA7;

/// Size of the frame header: device id, command, and the 16-bit data size.
pub const HEADER_SIZE: usize = 4;

/// Upper bound for a whole frame, header and payload included. Anything
/// announcing more data than fits here is treated as line noise.
pub const SERIAL_BUFFER_SIZE: usize = 2048;

/// Devices on a single chain. Device id 0 is the broadcast/host address, so
/// valid device ids are 1 through `MAX_DEVICES`.
pub const MAX_DEVICES: usize = 8;

/// Assignment slots per device.
pub const MAX_ASSIGNMENTS: usize = 256;

/// Virtual actuator page overlays a device may report.
pub const MAX_ACTUATOR_PAGES: usize = 16;

pub mod timing {
  //! Chain cadence and read deadlines. All of these are observable by
  //! devices, which budget their own replies around the sync period.

  use std::time::Duration;

  /// Period between two chain-sync frames.
  pub const SYNC_PERIOD: Duration = Duration::from_millis(10);

  /// Every Nth sync cycle grants devices permission to handshake.
  pub const HANDSHAKE_PERIOD: u32 = 20;

  /// Every Nth sync cycle (outside handshake cycles) opens a request window.
  pub const REQUEST_PERIOD: u32 = 2;

  /// Sync cycles without any frame from a device before it is evicted.
  pub const DEVICE_TIMEOUT_CYCLES: u32 = 100;

  /// Deadline for a device to answer a descriptor request.
  pub const RESPONSE_DEADLINE: Duration = Duration::from_millis(100);

  /// Read deadline while hunting for a sync byte.
  pub const SYNC_READ_DEADLINE: Duration = Duration::from_millis(500);

  /// Read deadline for the 4 header bytes following a sync byte.
  pub const HEADER_READ_DEADLINE: Duration = Duration::from_millis(10);

  /// Read deadline for the payload and CRC bytes.
  pub const DATA_READ_DEADLINE: Duration = Duration::from_secs(1);
}

pub use errors::{ControlChainError, ControlChainResult, ProtocolError};
pub use frame::Frame;
