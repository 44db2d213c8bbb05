// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Handshake payloads.
//!
//! During a handshake sync cycle a freshly plugged device announces itself
//! with a [`DeviceHello`]; the master answers with a [`HandshakeReply`]
//! carrying the device's own random id (bit-exact, so concurrent handshake
//! attempts can be told apart), a compatibility status, and the assigned
//! chain address.

use super::{ByteReader, ByteWriter, Version};
use crate::errors::ProtocolError;
use getset::{CopyGetters, Getters};
use strum_macros::{Display, FromRepr};

/// Protocol compatibility verdict sent back to the device.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum HandshakeStatus {
  Ok = 0,
  UpdateAvailable = 1,
  UpdateRequired = 2,
}

/// Device-to-host half of the handshake.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct DeviceHello {
  #[getset(get = "pub")]
  uri: String,
  #[getset(get_copy = "pub")]
  random_id: u16,
  #[getset(get_copy = "pub")]
  protocol: Version,
  #[getset(get_copy = "pub")]
  firmware: Version,
}

impl DeviceHello {
  pub fn new(uri: &str, random_id: u16, protocol: Version, firmware: Version) -> Self {
    Self {
      uri: uri.to_owned(),
      random_id,
      protocol,
      firmware,
    }
  }

  pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
    let mut reader = ByteReader::new(data);
    let uri = reader.read_string("uri")?;
    let random_id = reader.read_u16("random_id")?;
    // Devices announce only major.minor for the protocol.
    let protocol = Version::new(
      reader.read_u8("protocol_major")?,
      reader.read_u8("protocol_minor")?,
      0,
    );
    let firmware = Version::new(
      reader.read_u8("firmware_major")?,
      reader.read_u8("firmware_minor")?,
      reader.read_u8("firmware_micro")?,
    );
    Ok(Self {
      uri,
      random_id,
      protocol,
      firmware,
    })
  }

  pub fn encode(&self) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.put_str(&self.uri);
    writer.put_u16(self.random_id);
    writer.put_u8(self.protocol.major);
    writer.put_u8(self.protocol.minor);
    writer.put_u8(self.firmware.major);
    writer.put_u8(self.firmware.minor);
    writer.put_u8(self.firmware.micro);
    writer.finish()
  }
}

/// Host-to-device half of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct HandshakeReply {
  random_id: u16,
  status: HandshakeStatus,
  device_id: u8,
  /// Ordinal among devices sharing the same URI, so two identical pedals can
  /// be told apart by the user.
  channel: u8,
}

impl HandshakeReply {
  pub fn new(random_id: u16, status: HandshakeStatus, device_id: u8, channel: u8) -> Self {
    Self {
      random_id,
      status,
      device_id,
      channel,
    }
  }

  pub fn encode(&self) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.put_u16(self.random_id);
    writer.put_u8(self.status as u8);
    writer.put_u8(self.device_id);
    writer.put_u8(self.channel);
    writer.finish()
  }

  pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
    let mut reader = ByteReader::new(data);
    let random_id = reader.read_u16("random_id")?;
    let status = HandshakeStatus::from_repr(reader.read_u8("status")?)
      .ok_or(ProtocolError::InvalidField("status"))?;
    let device_id = reader.read_u8("device_id")?;
    let channel = reader.read_u8("channel")?;
    Ok(Self {
      random_id,
      status,
      device_id,
      channel,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hello_decodes_wire_bytes() {
    // uri "foo", random id 0x1234, protocol 0.7, firmware 1.2.3
    let data = [
      0x03, b'f', b'o', b'o', 0x34, 0x12, 0x00, 0x07, 0x01, 0x02, 0x03,
    ];
    let hello = DeviceHello::decode(&data).unwrap();
    assert_eq!(hello.uri(), "foo");
    assert_eq!(hello.random_id(), 0x1234);
    assert_eq!(hello.protocol(), Version::new(0, 7, 0));
    assert_eq!(hello.firmware(), Version::new(1, 2, 3));
    assert_eq!(hello.encode(), data);
  }

  #[test]
  fn reply_preserves_random_id_bit_exact() {
    for random_id in [0x0000u16, 0x1234, 0xFFFF, 0xA7A7] {
      let reply = HandshakeReply::new(random_id, HandshakeStatus::Ok, 1, 0);
      let wire = reply.encode();
      assert_eq!(u16::from_le_bytes([wire[0], wire[1]]), random_id);
      assert_eq!(HandshakeReply::decode(&wire).unwrap(), reply);
    }
  }

  #[test]
  fn reply_layout() {
    let reply = HandshakeReply::new(0xBEEF, HandshakeStatus::UpdateAvailable, 3, 2);
    assert_eq!(reply.encode(), vec![0xEF, 0xBE, 0x01, 0x03, 0x02]);
  }

  #[test]
  fn truncated_hello_rejected() {
    assert!(DeviceHello::decode(&[0x03, b'f', b'o']).is_err());
  }
}
