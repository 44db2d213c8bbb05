// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Device registry: a fixed table of eight chain addresses with
//! `Option`-vacant slots, plus the per-device actuator and assignment state.
//!
//! A device is created when its handshake is accepted and stays
//! `Disconnected` until the descriptor round-trip completes. It is destroyed
//! on explicit removal or when it misses 100 consecutive sync cycles.

use crate::assignment::Assignment;
use controlchain_core::errors::ControlChainError;
use controlchain_core::message::{
  handshake::DeviceHello,
  AssignmentMode,
  DeviceDescriptor,
  Version,
};
use controlchain_core::{MAX_ACTUATOR_PAGES, MAX_ASSIGNMENTS, MAX_DEVICES};
use getset::{CopyGetters, Getters};
use strum_macros::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
  Disconnected,
  Connected,
}

/// Filter for device listings. `Registered` devices have delivered their
/// descriptor; `Unregistered` ones are still being interrogated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFilter {
  All,
  Registered,
  Unregistered,
}

/// One physical input on a device.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Actuator {
  #[getset(get_copy = "pub")]
  id: u8,
  #[getset(get = "pub")]
  name: String,
  /// Bitmask of assignment modes this actuator supports.
  #[getset(get_copy = "pub")]
  supported_modes: u32,
  #[getset(get_copy = "pub")]
  max_assignments: u8,
  #[getset(get_copy = "pub")]
  assignments_count: u8,
}

/// A named pair of actuators addressable as a single control.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct ActuatorGroup {
  /// Virtual id of the group on page 0: group ids follow the plain actuator
  /// ids within each page span.
  #[getset(get_copy = "pub")]
  id: u8,
  #[getset(get = "pub")]
  name: String,
  #[getset(get_copy = "pub")]
  actuators: (u8, u8),
}

/// What a virtual actuator id points at once the page is peeled off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActuatorTarget {
  Actuator { page: u8, index: u8 },
  Group { page: u8, index: u8 },
}

#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Device {
  #[getset(get_copy = "pub")]
  id: u8,
  #[getset(get = "pub")]
  uri: String,
  #[getset(get = "pub")]
  label: String,
  /// Ordinal among devices sharing this URI.
  #[getset(get_copy = "pub")]
  channel: u8,
  #[getset(get_copy = "pub")]
  status: DeviceStatus,
  #[getset(get_copy = "pub")]
  protocol: Version,
  #[getset(get_copy = "pub")]
  firmware: Version,
  #[getset(get = "pub")]
  actuators: Vec<Actuator>,
  #[getset(get = "pub")]
  actuator_groups: Vec<ActuatorGroup>,
  /// Maximum option-list items the device can display at once.
  #[getset(get_copy = "pub")]
  enum_frame_size: u8,
  #[getset(get_copy = "pub")]
  page_count: u8,
  #[getset(get_copy = "pub")]
  chain_id: u8,
  #[getset(get_copy = "pub")]
  current_page: u8,
  /// True once the descriptor round-trip completed.
  #[getset(get_copy = "pub")]
  registered: bool,
  /// Sync cycles since the last frame from this device.
  pub(crate) timeout_cycles: u32,
  assignments: Vec<Option<Assignment>>,
}

impl Device {
  pub(crate) fn new(id: u8, channel: u8, hello: &DeviceHello) -> Self {
    Self {
      id,
      uri: hello.uri().clone(),
      label: String::new(),
      channel,
      status: DeviceStatus::Disconnected,
      protocol: hello.protocol(),
      firmware: hello.firmware(),
      actuators: Vec::new(),
      actuator_groups: Vec::new(),
      enum_frame_size: 0,
      page_count: 1,
      chain_id: 0,
      current_page: 0,
      registered: false,
      timeout_cycles: 0,
      assignments: vec![None; MAX_ASSIGNMENTS],
    }
  }

  pub(crate) fn apply_descriptor(&mut self, descriptor: &DeviceDescriptor) {
    self.label = descriptor.label().clone();
    if !descriptor.uri().is_empty() {
      self.uri = descriptor.uri().clone();
    }
    self.actuators = descriptor
      .actuators()
      .iter()
      .enumerate()
      .map(|(index, decl)| Actuator {
        id: index as u8,
        name: decl.name().clone(),
        supported_modes: decl.supported_modes(),
        max_assignments: decl.max_assignments(),
        assignments_count: 0,
      })
      .collect();
    let actuator_count = self.actuators.len() as u8;
    self.actuator_groups = descriptor
      .actuator_groups()
      .iter()
      .enumerate()
      .map(|(index, decl)| ActuatorGroup {
        id: actuator_count + index as u8,
        name: decl.name().clone(),
        actuators: decl.actuators(),
      })
      .collect();
    self.enum_frame_size = descriptor.enum_frame_size();
    self.page_count = descriptor
      .page_count()
      .clamp(1, MAX_ACTUATOR_PAGES as u8);
    self.chain_id = descriptor.chain_id();
    self.registered = true;
    self.status = DeviceStatus::Connected;
  }

  pub(crate) fn set_status(&mut self, status: DeviceStatus) {
    self.status = status;
  }

  pub(crate) fn set_current_page(&mut self, page: u8) {
    self.current_page = page;
  }

  /// Actuator ids per page: plain actuators first, then groups.
  pub(crate) fn page_span(&self) -> usize {
    self.actuators.len() + self.actuator_groups.len()
  }

  pub(crate) fn resolve_actuator(&self, actuator_id: u8) -> Option<ActuatorTarget> {
    let span = self.page_span();
    if span == 0 {
      return None;
    }
    let page = actuator_id as usize / span;
    let base = actuator_id as usize % span;
    if page >= self.page_count as usize {
      return None;
    }
    if base < self.actuators.len() {
      Some(ActuatorTarget::Actuator {
        page: page as u8,
        index: base as u8,
      })
    } else {
      Some(ActuatorTarget::Group {
        page: page as u8,
        index: (base - self.actuators.len()) as u8,
      })
    }
  }

  pub(crate) fn group(&self, index: u8) -> Option<&ActuatorGroup> {
    self.actuator_groups.get(index as usize)
  }

  /// The base (page-0) actuator an assignment counts against.
  fn base_actuator_mut(&mut self, actuator_id: u8) -> Option<&mut Actuator> {
    match self.resolve_actuator(actuator_id)? {
      ActuatorTarget::Actuator { index, .. } => self.actuators.get_mut(index as usize),
      ActuatorTarget::Group { .. } => None,
    }
  }

  /// Store an assignment: allocate the lowest free slot, enforce the
  /// actuator quota, apply the momentary value override, and compute the
  /// enumeration window and page id.
  pub(crate) fn add_assignment(
    &mut self,
    mut assignment: Assignment,
  ) -> Result<u8, ControlChainError> {
    let device_id = self.id;
    let enum_frame_size = self.enum_frame_size;
    let span = self.page_span().max(1);
    let actuator_id = assignment.actuator_id;
    {
      let actuator = self
        .base_actuator_mut(actuator_id)
        .ok_or(ControlChainError::UnknownActuator(actuator_id, device_id))?;
      if actuator.assignments_count >= actuator.max_assignments {
        return Err(ControlChainError::CapacityExhausted("actuator assignments"));
      }
    }
    let slot = self
      .assignments
      .iter()
      .position(Option::is_none)
      .ok_or(ControlChainError::CapacityExhausted("assignment table"))?;

    assignment.id = slot as u8;
    assignment.actuator_page_id = (actuator_id as usize / span) as u8;
    if assignment.mode.contains(AssignmentMode::Momentary) {
      assignment.value = if assignment.mode.contains(AssignmentMode::Reverse) {
        assignment.max
      } else {
        assignment.min
      };
    }
    if assignment.mode.contains(AssignmentMode::Options) && !assignment.options.is_empty() {
      let selected = assignment.selected_option(assignment.value);
      assignment.update_window(selected, enum_frame_size);
    }

    self.assignments[slot] = Some(assignment);
    if let Some(actuator) = self.base_actuator_mut(actuator_id) {
      actuator.assignments_count += 1;
    }
    Ok(slot as u8)
  }

  /// Free a slot and release its actuator quota. Unknown ids are a no-op.
  pub(crate) fn remove_assignment(&mut self, id: u8) -> Option<Assignment> {
    let removed = self.assignments.get_mut(id as usize)?.take()?;
    if let Some(actuator) = self.base_actuator_mut(removed.actuator_id) {
      actuator.assignments_count = actuator.assignments_count.saturating_sub(1);
    }
    Some(removed)
  }

  pub(crate) fn assignment(&self, id: u8) -> Option<&Assignment> {
    self.assignments.get(id as usize)?.as_ref()
  }

  pub(crate) fn assignment_mut(&mut self, id: u8) -> Option<&mut Assignment> {
    self.assignments.get_mut(id as usize)?.as_mut()
  }

  pub(crate) fn assignment_by_actuator_mut(
    &mut self,
    actuator_id: u8,
  ) -> Option<&mut Assignment> {
    self
      .assignments
      .iter_mut()
      .flatten()
      .find(|assignment| assignment.actuator_id == actuator_id)
  }

  pub(crate) fn assignments(&self) -> impl Iterator<Item = &Assignment> {
    self.assignments.iter().flatten()
  }

  pub(crate) fn link_pair(&mut self, first: u8, second: u8) {
    if let Some(assignment) = self.assignment_mut(first) {
      assignment.assignment_pair_id = Some(second);
    }
    if let Some(assignment) = self.assignment_mut(second) {
      assignment.assignment_pair_id = Some(first);
    }
  }

  /// JSON self-description served to IPC clients.
  pub fn descriptor_json(&self) -> String {
    serde_json::json!({
      "label": self.label,
      "uri": self.uri,
      "channel": self.channel,
      "protocol": self.protocol.to_string(),
      "version": self.firmware.to_string(),
      "pages": self.page_count,
      "actuators": self.actuators.iter().map(|actuator| {
        serde_json::json!({
          "id": actuator.id,
          "name": actuator.name,
          "modes": actuator.supported_modes,
          "max_assignments": actuator.max_assignments,
        })
      }).collect::<Vec<_>>(),
      "actuator_groups": self.actuator_groups.iter().map(|group| {
        serde_json::json!({
          "id": group.id,
          "name": group.name,
          "actuators": [group.actuators.0, group.actuators.1],
        })
      }).collect::<Vec<_>>(),
    })
    .to_string()
  }
}

/// The fixed table of chain addresses. Slot `i` owns device id `i + 1`;
/// id 0 stays reserved for broadcast.
#[derive(Debug, Default)]
pub(crate) struct DeviceTable {
  slots: [Option<Device>; MAX_DEVICES],
}

impl DeviceTable {
  /// Admit a device: lowest free id, channel numbered among same-URI peers.
  pub fn admit(&mut self, hello: &DeviceHello) -> Result<u8, ControlChainError> {
    let channel = self.count_with_uri(hello.uri()) as u8;
    let slot = self
      .slots
      .iter()
      .position(Option::is_none)
      .ok_or(ControlChainError::CapacityExhausted("device table"))?;
    let id = (slot + 1) as u8;
    self.slots[slot] = Some(Device::new(id, channel, hello));
    Ok(id)
  }

  pub fn get(&self, id: u8) -> Option<&Device> {
    if id == 0 || id as usize > MAX_DEVICES {
      return None;
    }
    self.slots[id as usize - 1].as_ref()
  }

  pub fn get_mut(&mut self, id: u8) -> Option<&mut Device> {
    if id == 0 || id as usize > MAX_DEVICES {
      return None;
    }
    self.slots[id as usize - 1].as_mut()
  }

  pub fn remove(&mut self, id: u8) -> Option<Device> {
    if id == 0 || id as usize > MAX_DEVICES {
      return None;
    }
    self.slots[id as usize - 1].take()
  }

  pub fn list(&self, filter: DeviceFilter) -> Vec<u8> {
    self
      .iter()
      .filter(|device| match filter {
        DeviceFilter::All => true,
        DeviceFilter::Registered => device.registered,
        DeviceFilter::Unregistered => !device.registered,
      })
      .map(|device| device.id)
      .collect()
  }

  pub fn count_with_uri(&self, uri: &str) -> usize {
    self.iter().filter(|device| device.uri == uri).count()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Device> {
    self.slots.iter().flatten()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
    self.slots.iter_mut().flatten()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use controlchain_core::message::{ActuatorDecl, ActuatorGroupDecl};

  fn hello(uri: &str) -> DeviceHello {
    DeviceHello::new(uri, 0x1234, Version::new(0, 7, 0), Version::new(1, 0, 0))
  }

  fn paged_descriptor() -> DeviceDescriptor {
    DeviceDescriptor::new(
      "https://mod.audio/dwarf/",
      "Dwarf",
      vec![
        ActuatorDecl::new("A", 0xFFF, 4),
        ActuatorDecl::new("B", 0xFFF, 4),
        ActuatorDecl::new("C", 0xFFF, 4),
      ],
      vec![ActuatorGroupDecl::new("A+B", 0, 1)],
      5,
      3,
      0,
    )
  }

  #[test]
  fn ids_allocated_lowest_first() {
    let mut table = DeviceTable::default();
    for expected in 1..=4u8 {
      assert_eq!(table.admit(&hello("u")).unwrap(), expected);
    }
    // Freeing a middle slot hands its id to the next admission.
    table.remove(2);
    assert_eq!(table.admit(&hello("u")).unwrap(), 2);
    assert_eq!(table.admit(&hello("u")).unwrap(), 5);
  }

  #[test]
  fn table_capacity_is_bounded() {
    let mut table = DeviceTable::default();
    for _ in 0..MAX_DEVICES {
      table.admit(&hello("u")).unwrap();
    }
    assert!(matches!(
      table.admit(&hello("u")),
      Err(ControlChainError::CapacityExhausted(_))
    ));
  }

  #[test]
  fn channel_counts_same_uri_devices() {
    let mut table = DeviceTable::default();
    let a = table.admit(&hello("uri-x")).unwrap();
    let b = table.admit(&hello("uri-x")).unwrap();
    let c = table.admit(&hello("uri-y")).unwrap();
    let d = table.admit(&hello("uri-x")).unwrap();
    assert_eq!(table.get(a).unwrap().channel(), 0);
    assert_eq!(table.get(b).unwrap().channel(), 1);
    assert_eq!(table.get(c).unwrap().channel(), 0);
    assert_eq!(table.get(d).unwrap().channel(), 2);
    // Status transitions do not disturb the numbering.
    table.get_mut(a).unwrap().set_status(DeviceStatus::Connected);
    assert_eq!(table.count_with_uri("uri-x"), 3);
  }

  #[test]
  fn device_id_zero_is_reserved() {
    let mut table = DeviceTable::default();
    table.admit(&hello("u")).unwrap();
    assert!(table.get(0).is_none());
    assert!(table.remove(0).is_none());
  }

  #[test]
  fn descriptor_fills_device() {
    let mut table = DeviceTable::default();
    let id = table.admit(&hello("old-uri")).unwrap();
    let device = table.get_mut(id).unwrap();
    assert_eq!(device.status(), DeviceStatus::Disconnected);
    assert!(!device.registered());

    device.apply_descriptor(&paged_descriptor());
    assert_eq!(device.status(), DeviceStatus::Connected);
    assert!(device.registered());
    assert_eq!(device.label(), "Dwarf");
    assert_eq!(device.uri(), "https://mod.audio/dwarf/");
    assert_eq!(device.actuators().len(), 3);
    assert_eq!(device.actuator_groups()[0].id(), 3);
    assert_eq!(device.page_span(), 4);
  }

  #[test]
  fn virtual_actuator_ids_resolve_across_pages() {
    let mut table = DeviceTable::default();
    let id = table.admit(&hello("u")).unwrap();
    let device = table.get_mut(id).unwrap();
    device.apply_descriptor(&paged_descriptor());

    // Page 0: actuators 0..2, group 3. Page 1 starts at 4.
    assert_eq!(
      device.resolve_actuator(1),
      Some(ActuatorTarget::Actuator { page: 0, index: 1 })
    );
    assert_eq!(
      device.resolve_actuator(3),
      Some(ActuatorTarget::Group { page: 0, index: 0 })
    );
    assert_eq!(
      device.resolve_actuator(6),
      Some(ActuatorTarget::Actuator { page: 1, index: 2 })
    );
    assert_eq!(
      device.resolve_actuator(11),
      Some(ActuatorTarget::Group { page: 2, index: 0 })
    );
    // Page 3 does not exist on a 3-page device.
    assert_eq!(device.resolve_actuator(12), None);
  }

  #[test]
  fn descriptor_json_shape() {
    let mut table = DeviceTable::default();
    let id = table.admit(&hello("u")).unwrap();
    let device = table.get_mut(id).unwrap();
    device.apply_descriptor(&paged_descriptor());

    let json: serde_json::Value =
      serde_json::from_str(&device.descriptor_json()).unwrap();
    assert_eq!(json["label"], "Dwarf");
    assert_eq!(json["version"], "1.0.0");
    assert_eq!(json["actuators"].as_array().unwrap().len(), 3);
    assert_eq!(json["actuators"][0]["name"], "A");
    assert_eq!(json["actuator_groups"][0]["actuators"][1], 1);
  }
}
