// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Device descriptor payloads.
//!
//! After admission the master requests the device's self-description: its
//! label, actuators, actuator groups, enumeration display capacity, and how
//! many virtual actuator pages it offers. The request direction is a single
//! action byte; the reply is the full [`DeviceDescriptor`].

use super::{ByteReader, ByteWriter};
use crate::errors::ProtocolError;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use strum_macros::FromRepr;

/// Host-to-device descriptor action byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum DescriptorAction {
  Request = 0,
  Ack = 1,
}

/// One physical input declared by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct ActuatorDecl {
  #[getset(get = "pub")]
  name: String,
  /// Bitmask of assignment modes the actuator can host.
  #[getset(get_copy = "pub")]
  supported_modes: u32,
  /// How many simultaneous assignments the actuator accepts.
  #[getset(get_copy = "pub")]
  max_assignments: u8,
}

impl ActuatorDecl {
  pub fn new(name: &str, supported_modes: u32, max_assignments: u8) -> Self {
    Self {
      name: name.to_owned(),
      supported_modes,
      max_assignments,
    }
  }
}

/// A named pair of actuators addressable as one control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct ActuatorGroupDecl {
  #[getset(get = "pub")]
  name: String,
  #[getset(get_copy = "pub")]
  actuators: (u8, u8),
}

impl ActuatorGroupDecl {
  pub fn new(name: &str, first: u8, second: u8) -> Self {
    Self {
      name: name.to_owned(),
      actuators: (first, second),
    }
  }
}

/// Device-to-host descriptor reply.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct DeviceDescriptor {
  #[getset(get = "pub")]
  uri: String,
  #[getset(get = "pub")]
  label: String,
  #[getset(get = "pub")]
  actuators: Vec<ActuatorDecl>,
  #[getset(get = "pub")]
  actuator_groups: Vec<ActuatorGroupDecl>,
  /// Maximum option-list items the device can display at once.
  #[getset(get_copy = "pub")]
  enum_frame_size: u8,
  #[getset(get_copy = "pub")]
  page_count: u8,
  #[getset(get_copy = "pub")]
  chain_id: u8,
}

impl DeviceDescriptor {
  pub fn new(
    uri: &str,
    label: &str,
    actuators: Vec<ActuatorDecl>,
    actuator_groups: Vec<ActuatorGroupDecl>,
    enum_frame_size: u8,
    page_count: u8,
    chain_id: u8,
  ) -> Self {
    Self {
      uri: uri.to_owned(),
      label: label.to_owned(),
      actuators,
      actuator_groups,
      enum_frame_size,
      page_count,
      chain_id,
    }
  }

  pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
    let mut reader = ByteReader::new(data);
    let uri = reader.read_string("uri")?;
    let label = reader.read_string("label")?;

    let actuator_count = reader.read_u8("actuator_count")?;
    let mut actuators = Vec::with_capacity(actuator_count as usize);
    for _ in 0..actuator_count {
      let name = reader.read_string("actuator_name")?;
      let supported_modes = reader.read_u32("supported_modes")?;
      let max_assignments = reader.read_u8("max_assignments")?;
      actuators.push(ActuatorDecl {
        name,
        supported_modes,
        max_assignments,
      });
    }

    let group_count = reader.read_u8("group_count")?;
    let mut actuator_groups = Vec::with_capacity(group_count as usize);
    for _ in 0..group_count {
      let name = reader.read_string("group_name")?;
      let first = reader.read_u8("group_actuator_1")?;
      let second = reader.read_u8("group_actuator_2")?;
      actuator_groups.push(ActuatorGroupDecl {
        name,
        actuators: (first, second),
      });
    }

    let enum_frame_size = reader.read_u8("enum_frame_size")?;
    let page_count = reader.read_u8("page_count")?;
    let chain_id = reader.read_u8("chain_id")?;

    Ok(Self {
      uri,
      label,
      actuators,
      actuator_groups,
      enum_frame_size,
      page_count,
      chain_id,
    })
  }

  /// Wire form of the descriptor, as a device would send it. The master only
  /// parses descriptors; this is for simulators and tests.
  pub fn encode(&self) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    writer.put_str(&self.uri);
    writer.put_str(&self.label);
    writer.put_u8(self.actuators.len() as u8);
    for actuator in &self.actuators {
      writer.put_str(&actuator.name);
      writer.put_u32(actuator.supported_modes);
      writer.put_u8(actuator.max_assignments);
    }
    writer.put_u8(self.actuator_groups.len() as u8);
    for group in &self.actuator_groups {
      writer.put_str(&group.name);
      writer.put_u8(group.actuators.0);
      writer.put_u8(group.actuators.1);
    }
    writer.put_u8(self.enum_frame_size);
    writer.put_u8(self.page_count);
    writer.put_u8(self.chain_id);
    writer.finish()
  }
}
