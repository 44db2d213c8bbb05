// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Data-update payloads: batches of (assignment id, value) pairs a device
//! reports after a sync frame.
//!
//! The raw payload bytes are kept alongside the parsed list so the IPC layer
//! can pass them through to clients without re-encoding.

use super::{ByteReader, ByteWriter};
use crate::errors::ProtocolError;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

/// One value change reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Update {
  assignment_id: u8,
  value: f32,
}

impl Update {
  pub fn new(assignment_id: u8, value: f32) -> Self {
    Self {
      assignment_id,
      value,
    }
  }
}

/// A full `DataUpdate` frame, parsed.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct UpdateList {
  #[getset(get_copy = "pub")]
  device_id: u8,
  #[getset(get = "pub")]
  updates: Vec<Update>,
  /// Opaque copy of the payload for pass-through.
  #[getset(get = "pub")]
  raw: Vec<u8>,
}

impl UpdateList {
  pub fn new(device_id: u8, updates: Vec<Update>) -> Self {
    let mut writer = ByteWriter::new();
    writer.put_u8(updates.len() as u8);
    for update in &updates {
      writer.put_u8(update.assignment_id);
      writer.put_f32(update.value);
    }
    Self {
      device_id,
      updates,
      raw: writer.finish(),
    }
  }

  pub fn decode(device_id: u8, data: &[u8]) -> Result<Self, ProtocolError> {
    let mut reader = ByteReader::new(data);
    let count = reader.read_u8("count")?;
    let mut updates = Vec::with_capacity(count as usize);
    for _ in 0..count {
      updates.push(Update {
        assignment_id: reader.read_u8("assignment_id")?,
        value: reader.read_f32("value")?,
      });
    }
    Ok(Self {
      device_id,
      updates,
      raw: data.to_vec(),
    })
  }

}
