// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Frame layout and encoding.
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! SYNC (0xA7) | device_id u8 | command u8 | data_size u16 LE | data[] | crc u8
//! ```
//!
//! The CRC covers the 4-byte header plus the payload; the sync byte is
//! excluded. Frames are always written as one contiguous buffer so two
//! frames can never interleave on the half-duplex line.

use crate::{
  crc::crc8,
  errors::ProtocolError,
  message::Command,
  HEADER_SIZE,
  MAX_DEVICES,
  SERIAL_BUFFER_SIZE,
  SYNC_BYTE,
};
use getset::{CopyGetters, Getters};

/// One framed message, minus the sync byte and CRC which only exist on the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Frame {
  /// Chain address. 0 is the broadcast/host address.
  #[getset(get_copy = "pub")]
  device_id: u8,
  #[getset(get_copy = "pub")]
  command: Command,
  #[getset(get = "pub")]
  data: Vec<u8>,
}

impl Frame {
  pub fn new(device_id: u8, command: Command, data: Vec<u8>) -> Self {
    Self {
      device_id,
      command,
      data,
    }
  }

  /// Serialize to wire form: sync byte, header, payload, CRC.
  pub fn encode(&self) -> Vec<u8> {
    let size = self.data.len() as u16;
    let mut buffer = Vec::with_capacity(HEADER_SIZE + self.data.len() + 2);
    buffer.push(SYNC_BYTE);
    buffer.push(self.device_id);
    buffer.push(self.command as u8);
    buffer.extend_from_slice(&size.to_le_bytes());
    buffer.extend_from_slice(&self.data);
    buffer.push(crc8(&buffer[1..]));
    buffer
  }

  /// Parse a complete wire buffer back into a frame. The receiver state
  /// machine reassembles frames incrementally instead; this form exists for
  /// tests and offline tooling.
  pub fn decode(wire: &[u8]) -> Result<Self, ProtocolError> {
    if wire.len() < HEADER_SIZE + 2 {
      return Err(ProtocolError::Truncated("header"));
    }
    if wire[0] != SYNC_BYTE {
      return Err(ProtocolError::InvalidField("sync"));
    }
    let header = FrameHeader::parse(&wire[1..1 + HEADER_SIZE])?;
    let total = 1 + HEADER_SIZE + header.data_size as usize + 1;
    if wire.len() < total {
      return Err(ProtocolError::Truncated("data"));
    }
    let crc_index = total - 1;
    let expected = crc8(&wire[1..crc_index]);
    if expected != wire[crc_index] {
      return Err(ProtocolError::CrcMismatch {
        expected,
        actual: wire[crc_index],
      });
    }
    Ok(Self {
      device_id: header.device_id,
      command: header.command,
      data: wire[1 + HEADER_SIZE..crc_index].to_vec(),
    })
  }
}

/// Validated frame header. Rejecting impossible headers early is what lets
/// the receiver resynchronise instead of reading garbage payload lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
  pub device_id: u8,
  pub command: Command,
  pub data_size: u16,
}

impl FrameHeader {
  pub fn parse(header: &[u8]) -> Result<Self, ProtocolError> {
    if header.len() < HEADER_SIZE {
      return Err(ProtocolError::Truncated("header"));
    }
    let device_id = header[0];
    if device_id as usize > MAX_DEVICES {
      return Err(ProtocolError::InvalidDeviceId(device_id));
    }
    let command =
      Command::from_repr(header[1]).ok_or(ProtocolError::UnknownCommand(header[1]))?;
    let data_size = u16::from_le_bytes([header[2], header[3]]);
    if data_size as usize > SERIAL_BUFFER_SIZE - HEADER_SIZE {
      return Err(ProtocolError::OversizeData(data_size));
    }
    Ok(Self {
      device_id,
      command,
      data_size,
    })
  }
}
