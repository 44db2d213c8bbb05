// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Assignment-related payloads: pushing an assignment to a device, removing
//! it, setting its value, and refreshing the visible slice of an option list.
//!
//! For options-mode assignments the device can only display a handful of
//! items at once, so the master never ships the whole list: it ships the
//! window around the current selection and a window-relative `list_index`.

use super::{ByteReader, ByteWriter};
use crate::errors::ProtocolError;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

/// One entry of an option list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct OptionItem {
  #[getset(get = "pub")]
  label: String,
  #[getset(get_copy = "pub")]
  value: f32,
}

impl OptionItem {
  pub fn new(label: &str, value: f32) -> Self {
    Self {
      label: label.to_owned(),
      value,
    }
  }
}

/// Host-to-device `Assignment` payload.
///
/// Borrows everything from the engine's assignment record; `items` is the
/// enumeration window slice (or empty for non-option assignments).
#[derive(Debug, Clone, Copy)]
pub struct AssignmentPayload<'a> {
  pub id: u8,
  pub actuator_id: u8,
  pub label: &'a str,
  pub value: f32,
  pub min: f32,
  pub max: f32,
  pub def: f32,
  pub mode: u32,
  pub steps: u16,
  pub unit: &'a str,
  /// Selected index relative to the transmitted window.
  pub list_index: u8,
  pub items: &'a [OptionItem],
}

impl AssignmentPayload<'_> {
  pub fn encode(&self) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.put_u8(self.id);
    writer.put_u8(self.actuator_id);
    writer.put_str(self.label);
    writer.put_f32(self.value);
    writer.put_f32(self.min);
    writer.put_f32(self.max);
    writer.put_f32(self.def);
    writer.put_u32(self.mode);
    writer.put_u16(self.steps);
    writer.put_str(self.unit);
    writer.put_u8(self.list_index);
    writer.put_u8(self.items.len() as u8);
    for item in self.items {
      writer.put_str(item.label());
      writer.put_f32(item.value());
    }
    writer.finish()
  }
}

/// Host-to-device `Unassignment` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnassignmentPayload {
  pub assignment_id: u8,
}

impl UnassignmentPayload {
  pub fn encode(&self) -> Vec<u8> {
    vec![self.assignment_id]
  }
}

/// Host-to-device `SetValue` payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetValuePayload {
  pub assignment_id: u8,
  pub actuator_id: u8,
  pub value: f32,
}

impl SetValuePayload {
  pub fn encode(&self) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.put_u8(self.assignment_id);
    writer.put_u8(self.actuator_id);
    writer.put_f32(self.value);
    writer.finish()
  }

  pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
    let mut reader = ByteReader::new(data);
    Ok(Self {
      assignment_id: reader.read_u8("assignment_id")?,
      actuator_id: reader.read_u8("actuator_id")?,
      value: reader.read_f32("value")?,
    })
  }
}

/// Host-to-device `UpdateEnumeration` payload: a fresh window of an option
/// list after the selection moved.
#[derive(Debug, Clone, Copy)]
pub struct EnumerationUpdatePayload<'a> {
  pub assignment_id: u8,
  pub actuator_id: u8,
  /// Selected index relative to the transmitted window.
  pub list_index: u8,
  pub items: &'a [OptionItem],
}

impl EnumerationUpdatePayload<'_> {
  pub fn encode(&self) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.put_u8(self.assignment_id);
    writer.put_u8(self.actuator_id);
    writer.put_u8(self.list_index);
    writer.put_u8(self.items.len() as u8);
    for item in self.items {
      writer.put_str(item.label());
      writer.put_f32(item.value());
    }
    writer.finish()
  }
}
