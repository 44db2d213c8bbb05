// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Typed payload codecs for every Control Chain command.
//!
//! The command numbering is fixed forever: it is observable on the wire and
//! burned into device firmware. Strings travel as a length byte followed by
//! UTF-8 bytes; multi-byte integers and floats are little-endian.

mod cursor;
pub mod assignment;
pub mod descriptor;
pub mod handshake;
mod mode;
pub mod update;

pub use assignment::{
  AssignmentPayload,
  EnumerationUpdatePayload,
  OptionItem,
  SetValuePayload,
  UnassignmentPayload,
};
pub use descriptor::{ActuatorDecl, ActuatorGroupDecl, DescriptorAction, DeviceDescriptor};
pub use handshake::{DeviceHello, HandshakeReply, HandshakeStatus};
pub use mode::AssignmentMode;
pub use update::{Update, UpdateList};

pub(crate) use cursor::{ByteReader, ByteWriter};

use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, FromRepr};

/// The closed command set, in wire order.
#[derive(
  Debug, Display, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Command {
  ChainSync = 0,
  Handshake = 1,
  DevControl = 2,
  DevDescriptor = 3,
  Assignment = 4,
  DataUpdate = 5,
  Unassignment = 6,
  SetValue = 7,
  UpdateEnumeration = 8,
  RequestControlPage = 9,
}

/// Size of the command set; the first invalid command byte.
pub const COMMAND_COUNT: u8 = 10;

/// Chain-sync cycle kinds. `Setup` is broadcast once after the port opens
/// (and after every hot-plug recovery) and resets all listening devices;
/// `Handshake` cycles grant devices permission to send unsolicited handshake
/// frames.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum SyncCycle {
  Setup = 0,
  Regular = 1,
  Handshake = 2,
}

/// Payload of a `DevControl` frame.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum DeviceControlAction {
  Disable = 0,
  Enable = 1,
}

/// A dotted protocol or firmware version.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Version {
  pub major: u8,
  pub minor: u8,
  pub micro: u8,
}

impl Version {
  pub fn new(major: u8, minor: u8, micro: u8) -> Self {
    Self {
      major,
      minor,
      micro,
    }
  }
}

impl std::fmt::Display for Version {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
  }
}

/// Payload of a `RequestControlPage` frame sent by a device.
pub fn parse_page_request(data: &[u8]) -> Result<u8, ProtocolError> {
  let mut reader = ByteReader::new(data);
  reader.read_u8("page")
}

/// Payload of a `ChainSync` frame.
pub fn sync_payload(cycle: SyncCycle) -> Vec<u8> {
  vec![cycle as u8]
}

/// Payload of a `DevControl` frame.
pub fn control_payload(action: DeviceControlAction) -> Vec<u8> {
  vec![action as u8]
}
