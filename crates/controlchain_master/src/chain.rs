// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Chain state: the device table plus everything that happens to it.
//!
//! `ChainState` is pure bookkeeping behind the engine's coarse lock. Frame
//! handlers and API operations return [`Action`]s — frames to put on the
//! wire and events to surface — which the calling thread executes after the
//! lock is released. That keeps serial writes and consumer callbacks out of
//! the critical section and makes every protocol interaction testable
//! without a port.

use crate::assignment::{Assignment, AssignmentKey, SetValue};
use crate::device::{ActuatorTarget, Device, DeviceFilter, DeviceStatus, DeviceTable};
use controlchain_core::errors::{ControlChainError, ControlChainResult};
use controlchain_core::message::{
  handshake::{DeviceHello, HandshakeReply, HandshakeStatus},
  parse_page_request,
  AssignmentMode,
  Command,
  DescriptorAction,
  DeviceDescriptor,
  EnumerationUpdatePayload,
  SetValuePayload,
  UnassignmentPayload,
  Update,
  UpdateList,
};
use controlchain_core::timing::DEVICE_TIMEOUT_CYCLES;
use controlchain_core::{Frame, PROTOCOL_MAJOR, PROTOCOL_MINOR};
use tracing::{debug, info, warn};

/// Side effects produced while the chain lock is held, executed after it is
/// released.
#[derive(Debug)]
pub(crate) enum Action {
  Send(Frame),
  DeviceStatus(Device),
  DataUpdate(UpdateList),
}

#[derive(Debug, Default)]
pub(crate) struct ChainState {
  devices: DeviceTable,
}

impl ChainState {
  // ---- frame handling (receiver thread) ----

  pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Action> {
    if let Some(device) = self.devices.get_mut(frame.device_id()) {
      device.timeout_cycles = 0;
    }
    let mut actions = Vec::new();
    match frame.command() {
      Command::Handshake => self.on_handshake(frame, &mut actions),
      Command::DevDescriptor => self.on_descriptor(frame, &mut actions),
      Command::DataUpdate => self.on_data_update(frame, &mut actions),
      Command::RequestControlPage => self.on_page_request(frame, &mut actions),
      // Devices do not originate the remaining commands; a frame claiming
      // otherwise is noise that happened to carry a valid CRC.
      other => debug!("Ignoring unexpected {} frame from device", other),
    }
    actions
  }

  fn on_handshake(&mut self, frame: &Frame, actions: &mut Vec<Action>) {
    let hello = match DeviceHello::decode(frame.data()) {
      Ok(hello) => hello,
      Err(err) => {
        warn!("Dropping malformed handshake: {}", err);
        return;
      }
    };

    let status = if hello.protocol().major < PROTOCOL_MAJOR {
      HandshakeStatus::UpdateRequired
    } else if hello.protocol().minor < PROTOCOL_MINOR {
      HandshakeStatus::UpdateAvailable
    } else {
      HandshakeStatus::Ok
    };

    if status == HandshakeStatus::UpdateRequired {
      info!(
        "Rejecting device '{}' protocol {}: firmware update required",
        hello.uri(),
        hello.protocol()
      );
      let reply = HandshakeReply::new(hello.random_id(), status, 0, 0);
      actions.push(Action::Send(Frame::new(0, Command::Handshake, reply.encode())));
      return;
    }

    match self.devices.admit(&hello) {
      Ok(id) => {
        let channel = self
          .devices
          .get(id)
          .map(Device::channel)
          .unwrap_or_default();
        info!(
          "Admitted device '{}' as id {} channel {} (firmware {})",
          hello.uri(),
          id,
          channel,
          hello.firmware()
        );
        let reply = HandshakeReply::new(hello.random_id(), status, id, channel);
        actions.push(Action::Send(Frame::new(id, Command::Handshake, reply.encode())));
      }
      Err(err) => warn!("Cannot admit device '{}': {}", hello.uri(), err),
    }
  }

  fn on_descriptor(&mut self, frame: &Frame, actions: &mut Vec<Action>) {
    let descriptor = match DeviceDescriptor::decode(frame.data()) {
      Ok(descriptor) => descriptor,
      Err(err) => {
        warn!(
          "Dropping malformed descriptor from device {}: {}",
          frame.device_id(),
          err
        );
        return;
      }
    };
    let Some(device) = self.devices.get_mut(frame.device_id()) else {
      return;
    };
    device.apply_descriptor(&descriptor);
    let snapshot = device.clone();
    info!(
      "Device {} registered as '{}' ({} actuators, {} pages)",
      snapshot.id(),
      snapshot.label(),
      snapshot.actuators().len(),
      snapshot.page_count()
    );
    actions.push(Action::Send(Frame::new(
      frame.device_id(),
      Command::DevDescriptor,
      vec![DescriptorAction::Ack as u8],
    )));
    actions.push(Action::DeviceStatus(snapshot));
  }

  fn on_data_update(&mut self, frame: &Frame, actions: &mut Vec<Action>) {
    let device_id = frame.device_id();
    let Some(device) = self.devices.get_mut(device_id) else {
      return;
    };
    if !device.registered() {
      return;
    }
    let list = match UpdateList::decode(device_id, frame.data()) {
      Ok(list) => list,
      Err(err) => {
        warn!("Dropping malformed data update from device {}: {}", device_id, err);
        return;
      }
    };

    let enum_frame_size = device.enum_frame_size();
    let mut kept = Vec::with_capacity(list.updates().len());
    for update in list.updates() {
      let Some(assignment) = device.assignment(update.assignment_id()) else {
        continue;
      };
      // The second half of a grouped assignment reports under its own id;
      // consumers only know the primary.
      let mut target_id = update.assignment_id();
      if assignment.mode().contains(AssignmentMode::Group)
        && !assignment.mode().contains(AssignmentMode::Reverse)
      {
        if let Some(pair_id) = assignment.assignment_pair_id() {
          target_id = pair_id;
        }
      }
      let Some(target) = device.assignment_mut(target_id) else {
        continue;
      };
      target.value = update.value();
      kept.push(Update::new(target_id, update.value()));

      if target.mode().contains(AssignmentMode::Options) && !target.options().is_empty() {
        let selected = target.selected_option(update.value());
        target.update_window(selected, enum_frame_size);
        actions.push(Action::Send(enumeration_frame(device_id, target)));
        let pair_id = target.assignment_pair_id();
        if let Some(pair) = pair_id.and_then(|id| device.assignment_mut(id)) {
          pair.value = update.value();
          let selected = pair.selected_option(update.value());
          pair.update_window(selected, enum_frame_size);
          actions.push(Action::Send(enumeration_frame(device_id, pair)));
        }
      }
    }

    if !kept.is_empty() {
      actions.push(Action::DataUpdate(UpdateList::new(device_id, kept)));
    }
  }

  fn on_page_request(&mut self, frame: &Frame, actions: &mut Vec<Action>) {
    let Ok(page) = parse_page_request(frame.data()) else {
      return;
    };
    let Some(device) = self.devices.get_mut(frame.device_id()) else {
      return;
    };
    if page >= device.page_count() {
      warn!(
        "Device {} requested page {} but only has {}",
        device.id(),
        page,
        device.page_count()
      );
      return;
    }
    debug!("Device {} switching to control page {}", device.id(), page);
    device.set_current_page(page);
    for push in self.page_frames(frame.device_id(), page) {
      actions.push(Action::Send(push));
    }
  }

  // ---- scheduler bookkeeping ----

  /// Age all registered devices by one sync cycle; devices that missed 100
  /// consecutive cycles are evicted with exactly one status notification.
  pub fn age_devices(&mut self) -> Vec<Action> {
    let mut evicted = Vec::new();
    for device in self.devices.iter_mut() {
      if !device.registered() {
        continue;
      }
      device.timeout_cycles += 1;
      if device.timeout_cycles >= DEVICE_TIMEOUT_CYCLES {
        evicted.push(device.id());
      }
    }
    let mut actions = Vec::new();
    for id in evicted {
      if let Some(mut device) = self.devices.remove(id) {
        info!("Device {} timed out, releasing chain address", id);
        device.set_status(DeviceStatus::Disconnected);
        actions.push(Action::DeviceStatus(device));
      }
    }
    actions
  }

  /// Drop a device without ceremony (descriptor request went unanswered).
  pub fn destroy_device(&mut self, id: u8) -> Option<Device> {
    self.devices.remove(id)
  }

  // ---- caller operations ----

  /// Register an assignment and return its id plus the frames to flush.
  /// With `new_assignment` false the registry is left untouched and the
  /// existing assignment on that actuator is re-encoded (page re-push).
  pub fn add_assignment(
    &mut self,
    assignment: Assignment,
    new_assignment: bool,
  ) -> ControlChainResult<(u8, Vec<Frame>)> {
    let device_id = assignment.device_id();
    let device = self
      .devices
      .get_mut(device_id)
      .ok_or(ControlChainError::UnknownDevice(device_id))?;

    if !new_assignment {
      let actuator_id = assignment.actuator_id();
      let current_page = device.current_page();
      let existing = device
        .assignment_by_actuator_mut(actuator_id)
        .ok_or(ControlChainError::UnknownActuator(actuator_id, device_id))?;
      let frames = if existing.actuator_page_id() == current_page {
        vec![assignment_frame(device_id, existing)]
      } else {
        Vec::new()
      };
      return Ok((existing.id(), frames));
    }

    if assignment.mode().contains(AssignmentMode::Group) {
      return self.add_grouped_assignment(assignment);
    }

    let current_page = device.current_page();
    let id = device.add_assignment(assignment)?;
    let mut frames = Vec::new();
    if let Some(stored) = device.assignment(id) {
      if stored.actuator_page_id() == current_page {
        frames.push(assignment_frame(device_id, stored));
      }
    }
    Ok((id, frames))
  }

  /// A group-mode assignment addresses an actuator group and expands into
  /// two linked assignments: the primary on the group's first actuator with
  /// `Reverse` set, the pair on the second without it.
  fn add_grouped_assignment(
    &mut self,
    assignment: Assignment,
  ) -> ControlChainResult<(u8, Vec<Frame>)> {
    let device_id = assignment.device_id();
    let device = self
      .devices
      .get_mut(device_id)
      .ok_or(ControlChainError::UnknownDevice(device_id))?;

    let target = device
      .resolve_actuator(assignment.actuator_id())
      .ok_or(ControlChainError::UnknownActuator(assignment.actuator_id(), device_id))?;
    let ActuatorTarget::Group { page, index } = target else {
      return Err(ControlChainError::UnknownActuator(
        assignment.actuator_id(),
        device_id,
      ));
    };
    let group = device
      .group(index)
      .ok_or(ControlChainError::UnknownActuator(assignment.actuator_id(), device_id))?;
    let span = device.page_span() as u8;
    let first_actuator = page * span + group.actuators().0;
    let second_actuator = page * span + group.actuators().1;

    let mut primary = assignment.clone();
    primary.actuator_id = first_actuator;
    primary.mode |= AssignmentMode::Reverse;
    primary.actuator_pair_id = Some(second_actuator);

    let mut pair = assignment;
    pair.actuator_id = second_actuator;
    pair.mode.remove(AssignmentMode::Reverse);
    pair.actuator_pair_id = Some(first_actuator);

    let primary_id = device.add_assignment(primary)?;
    let pair_id = match device.add_assignment(pair) {
      Ok(id) => id,
      Err(err) => {
        device.remove_assignment(primary_id);
        return Err(err);
      }
    };
    device.link_pair(primary_id, pair_id);

    let current_page = device.current_page();
    let mut frames = Vec::new();
    for id in [primary_id, pair_id] {
      if let Some(stored) = device.assignment(id) {
        if stored.actuator_page_id() == current_page {
          frames.push(assignment_frame(device_id, stored));
        }
      }
    }
    Ok((primary_id, frames))
  }

  /// Remove an assignment, cascading over pair links. Unknown ids are a
  /// silent no-op. Returns unassignment frames for every removed assignment
  /// that was live on the current page.
  pub fn remove_assignment(&mut self, key: &AssignmentKey) -> Vec<Frame> {
    let Some(device) = self.devices.get_mut(key.device_id) else {
      return Vec::new();
    };
    let current_page = device.current_page();

    let mut ids = vec![key.id];
    if let Some(pair) = key.pair_id {
      ids.push(pair);
    }
    if let Some(stored_pair) = device.assignment(key.id).and_then(Assignment::assignment_pair_id)
    {
      ids.push(stored_pair);
    }
    ids.dedup();

    let mut frames = Vec::new();
    for id in ids {
      if let Some(removed) = device.remove_assignment(id) {
        if removed.actuator_page_id() == current_page {
          frames.push(Frame::new(
            key.device_id,
            Command::Unassignment,
            UnassignmentPayload { assignment_id: id }.encode(),
          ));
        }
      }
    }
    frames
  }

  /// Update an assignment's value from the host side. Options-mode
  /// assignments get a fresh enumeration window (the pair too); everything
  /// else gets a `SetValue` frame when its page is active.
  pub fn set_value(&mut self, update: &SetValue) -> ControlChainResult<(u8, Vec<Frame>)> {
    let device = self
      .devices
      .get_mut(update.device_id)
      .ok_or(ControlChainError::UnknownDevice(update.device_id))?;
    let enum_frame_size = device.enum_frame_size();
    let current_page = device.current_page();

    let Some(assignment) = device.assignment_by_actuator_mut(update.actuator_id) else {
      return Err(ControlChainError::UnknownAssignment(
        update.assignment_id,
        update.device_id,
      ));
    };
    let id = assignment.id();
    assignment.value = update.value;

    let mut frames = Vec::new();
    if assignment.mode().contains(AssignmentMode::Options) && !assignment.options().is_empty()
    {
      let selected = assignment.selected_option(update.value);
      assignment.update_window(selected, enum_frame_size);
      frames.push(enumeration_frame(update.device_id, assignment));
      let pair_id = assignment.assignment_pair_id();
      if let Some(pair) = pair_id.and_then(|pair_id| device.assignment_mut(pair_id)) {
        pair.value = update.value;
        let selected = pair.selected_option(update.value);
        pair.update_window(selected, enum_frame_size);
        frames.push(enumeration_frame(update.device_id, pair));
      }
    } else if assignment.actuator_page_id() == current_page {
      frames.push(Frame::new(
        update.device_id,
        Command::SetValue,
        SetValuePayload {
          assignment_id: id,
          actuator_id: update.actuator_id,
          value: update.value,
        }
        .encode(),
      ));
    }
    Ok((id, frames))
  }

  /// Host-initiated page switch: same re-push as a device-requested one.
  pub fn switch_page(&mut self, device_id: u8, page: u8) -> Vec<Frame> {
    let Some(device) = self.devices.get_mut(device_id) else {
      return Vec::new();
    };
    if page >= device.page_count() {
      return Vec::new();
    }
    device.set_current_page(page);
    self.page_frames(device_id, page)
  }

  fn page_frames(&self, device_id: u8, page: u8) -> Vec<Frame> {
    let Some(device) = self.devices.get(device_id) else {
      return Vec::new();
    };
    device
      .assignments()
      .filter(|assignment| assignment.actuator_page_id() == page)
      .map(|assignment| assignment_frame(device_id, assignment))
      .collect()
  }

  // ---- queries ----

  pub fn device_list(&self, filter: DeviceFilter) -> Vec<u8> {
    self.devices.list(filter)
  }

  pub fn device(&self, id: u8) -> Option<&Device> {
    self.devices.get(id)
  }

  pub fn count_with_uri(&self, uri: &str) -> usize {
    self.devices.count_with_uri(uri)
  }

  #[cfg(test)]
  pub fn device_mut(&mut self, id: u8) -> Option<&mut Device> {
    self.devices.get_mut(id)
  }
}

fn assignment_frame(device_id: u8, assignment: &Assignment) -> Frame {
  Frame::new(device_id, Command::Assignment, assignment.to_payload().encode())
}

fn enumeration_frame(device_id: u8, assignment: &Assignment) -> Frame {
  Frame::new(
    device_id,
    Command::UpdateEnumeration,
    EnumerationUpdatePayload {
      assignment_id: assignment.id(),
      actuator_id: assignment.actuator_id(),
      list_index: assignment.list_index(),
      items: assignment.window_items(),
    }
    .encode(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assignment::AssignmentBuilder;
  use controlchain_core::message::{
    ActuatorDecl,
    ActuatorGroupDecl,
    OptionItem,
    Version,
  };

  fn hello_frame(uri: &str, random_id: u16, minor: u8) -> Frame {
    let hello = DeviceHello::new(
      uri,
      random_id,
      Version::new(0, minor, 0),
      Version::new(1, 2, 3),
    );
    Frame::new(0, Command::Handshake, hello.encode())
  }

  fn descriptor_frame(device_id: u8, descriptor: &DeviceDescriptor) -> Frame {
    Frame::new(device_id, Command::DevDescriptor, descriptor.encode())
  }

  fn footswitch_descriptor(max_assignments: u8) -> DeviceDescriptor {
    DeviceDescriptor::new(
      "https://mod.audio/fp/",
      "Footswitch",
      vec![
        ActuatorDecl::new("Foot #1", 0xFFF, max_assignments),
        ActuatorDecl::new("Foot #2", 0xFFF, max_assignments),
      ],
      vec![ActuatorGroupDecl::new("Foots 1+2", 0, 1)],
      5,
      2,
      0,
    )
  }

  /// Run a device through handshake + descriptor so assignments can land.
  fn connected_state(descriptor: &DeviceDescriptor) -> ChainState {
    let mut state = ChainState::default();
    state.handle_frame(&hello_frame(descriptor.uri(), 0x1111, 7));
    state.handle_frame(&descriptor_frame(1, descriptor));
    state
  }

  fn sends(actions: &[Action]) -> Vec<&Frame> {
    actions
      .iter()
      .filter_map(|action| match action {
        Action::Send(frame) => Some(frame),
        _ => None,
      })
      .collect()
  }

  fn real_assignment(actuator_id: u8, value: f32) -> Assignment {
    AssignmentBuilder::default()
      .device_id(1u8)
      .actuator_id(actuator_id)
      .label("Gain")
      .value(value)
      .min(0.0)
      .max(1.0)
      .def(0.5)
      .mode(AssignmentMode::Real.into())
      .steps(32u16)
      .unit("dB")
      .build()
      .unwrap()
  }

  fn options_assignment(actuator_id: u8, count: usize, value: f32) -> Assignment {
    let options = (0..count)
      .map(|index| OptionItem::new(&format!("opt{index}"), index as f32))
      .collect::<Vec<_>>();
    AssignmentBuilder::default()
      .device_id(1u8)
      .actuator_id(actuator_id)
      .label("Preset")
      .value(value)
      .min(0.0)
      .max((count - 1) as f32)
      .def(0.0)
      .mode(AssignmentMode::Options.into())
      .options(options)
      .build()
      .unwrap()
  }

  /// Walk the assignment payload layout up to the option window.
  fn assignment_window(data: &[u8]) -> (u8, Vec<u8>) {
    let mut pos = 2; // id, actuator id
    pos += 1 + data[pos] as usize; // label
    pos += 16; // value, min, max, def
    pos += 4; // mode
    pos += 2; // steps
    pos += 1 + data[pos] as usize; // unit
    let list_index = data[pos];
    let count = data[pos + 1] as usize;
    pos += 2;
    let mut item_values = Vec::with_capacity(count);
    for _ in 0..count {
      pos += 1 + data[pos] as usize; // item label
      let value = f32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
      item_values.push(value as u8);
      pos += 4;
    }
    (list_index, item_values)
  }

  fn enumeration_window_of(data: &[u8]) -> (u8, Vec<u8>) {
    let list_index = data[2];
    let count = data[3] as usize;
    let mut pos = 4;
    let mut item_values = Vec::with_capacity(count);
    for _ in 0..count {
      pos += 1 + data[pos] as usize;
      let value = f32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
      item_values.push(value as u8);
      pos += 4;
    }
    (list_index, item_values)
  }

  #[test]
  fn cold_plug_handshake_admits_device() {
    let mut state = ChainState::default();
    let actions = state.handle_frame(&hello_frame("foo", 0x1234, 7));

    let replies = sends(&actions);
    assert_eq!(replies.len(), 1);
    let reply_frame = replies[0];
    assert_eq!(reply_frame.command(), Command::Handshake);
    assert_eq!(reply_frame.device_id(), 1);
    let reply = HandshakeReply::decode(reply_frame.data()).unwrap();
    assert_eq!(reply.random_id(), 0x1234);
    assert_eq!(reply.status(), HandshakeStatus::Ok);
    assert_eq!(reply.device_id(), 1);
    assert_eq!(reply.channel(), 0);

    let device = state.device(1).unwrap();
    assert_eq!(device.status(), DeviceStatus::Disconnected);
    assert!(!device.registered());
  }

  #[test]
  fn old_minor_version_gets_update_available_but_joins() {
    let mut state = ChainState::default();
    let actions = state.handle_frame(&hello_frame("foo", 0x0001, 5));
    let reply = HandshakeReply::decode(sends(&actions)[0].data()).unwrap();
    assert_eq!(reply.status(), HandshakeStatus::UpdateAvailable);
    assert_eq!(reply.device_id(), 1);
    assert!(state.device(1).is_some());
  }

  #[test]
  fn same_uri_devices_get_increasing_channels() {
    let mut state = ChainState::default();
    for (random_id, expected_channel) in [(1u16, 0u8), (2, 1), (3, 2)] {
      let actions = state.handle_frame(&hello_frame("twin", random_id, 7));
      let reply = HandshakeReply::decode(sends(&actions)[0].data()).unwrap();
      assert_eq!(reply.channel(), expected_channel);
    }
  }

  #[test]
  fn descriptor_reply_acks_and_connects() {
    let mut state = ChainState::default();
    state.handle_frame(&hello_frame("https://mod.audio/fp/", 0x1234, 7));

    let actions = state.handle_frame(&descriptor_frame(1, &footswitch_descriptor(1)));
    let replies = sends(&actions);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].command(), Command::DevDescriptor);
    assert_eq!(replies[0].device_id(), 1);
    assert_eq!(replies[0].data(), &[DescriptorAction::Ack as u8]);

    let status = actions
      .iter()
      .find_map(|action| match action {
        Action::DeviceStatus(device) => Some(device),
        _ => None,
      })
      .expect("descriptor receipt must fire a status notification");
    assert_eq!(status.status(), DeviceStatus::Connected);
    assert!(status.registered());
    assert_eq!(status.label(), "Footswitch");
  }

  #[test]
  fn assign_set_value_unassign_round() {
    let mut state = connected_state(&footswitch_descriptor(1));

    let (id, frames) = state.add_assignment(real_assignment(0, 0.5), true).unwrap();
    assert_eq!(id, 0);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Command::Assignment);
    assert_eq!(frames[0].device_id(), 1);
    assert_eq!(
      state.device(1).unwrap().actuators()[0].assignments_count(),
      1
    );

    let (set_id, frames) = state
      .set_value(&SetValue {
        device_id: 1,
        assignment_id: id,
        actuator_id: 0,
        value: 0.8,
      })
      .unwrap();
    assert_eq!(set_id, id);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Command::SetValue);
    let payload = SetValuePayload::decode(frames[0].data()).unwrap();
    assert_eq!(payload.assignment_id, id);
    assert_eq!(payload.value, 0.8);

    let frames = state.remove_assignment(&AssignmentKey {
      id,
      device_id: 1,
      pair_id: None,
    });
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Command::Unassignment);
    assert_eq!(frames[0].data(), &[id]);
    assert_eq!(
      state.device(1).unwrap().actuators()[0].assignments_count(),
      0
    );
  }

  #[test]
  fn actuator_quota_is_enforced() {
    let mut state = connected_state(&footswitch_descriptor(1));
    state.add_assignment(real_assignment(0, 0.1), true).unwrap();
    let err = state.add_assignment(real_assignment(0, 0.2), true);
    assert!(matches!(err, Err(ControlChainError::CapacityExhausted(_))));
    // The failed add left nothing behind.
    let device = state.device(1).unwrap();
    assert_eq!(device.actuators()[0].assignments_count(), 1);
    assert_eq!(device.assignments().count(), 1);
  }

  #[test]
  fn assignment_to_unknown_device_fails() {
    let mut state = ChainState::default();
    assert!(matches!(
      state.add_assignment(real_assignment(0, 0.5), true),
      Err(ControlChainError::UnknownDevice(1))
    ));
  }

  #[test]
  fn option_assignment_ships_window_slice() {
    let mut state = connected_state(&footswitch_descriptor(4));

    // 12 options, display of 5, initial selection at index 3.
    let (_, frames) = state
      .add_assignment(options_assignment(0, 12, 3.0), true)
      .unwrap();
    let (list_index, items) = assignment_window(frames[0].data());
    assert_eq!(items, vec![1, 2, 3, 4, 5]);
    assert_eq!(list_index, 2);

    // Moving the selection to index 8 refreshes the window.
    let (_, frames) = state
      .set_value(&SetValue {
        device_id: 1,
        assignment_id: 0,
        actuator_id: 0,
        value: 8.0,
      })
      .unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Command::UpdateEnumeration);
    let (list_index, items) = enumeration_window_of(frames[0].data());
    assert_eq!(items, vec![6, 7, 8, 9, 10]);
    assert_eq!(list_index, 2);
  }

  #[test]
  fn momentary_value_follows_reverse_bit() {
    let mut state = connected_state(&footswitch_descriptor(4));

    let mut momentary = real_assignment(0, 0.3);
    momentary.mode = AssignmentMode::Momentary.into();
    let (id, _) = state.add_assignment(momentary, true).unwrap();
    assert_eq!(state.device(1).unwrap().assignment(id).unwrap().value(), 0.0);

    let mut reversed = real_assignment(1, 0.3);
    reversed.mode = AssignmentMode::Momentary | AssignmentMode::Reverse;
    let (id, _) = state.add_assignment(reversed, true).unwrap();
    assert_eq!(state.device(1).unwrap().assignment(id).unwrap().value(), 1.0);
  }

  #[test]
  fn grouped_assignment_creates_linked_halves() {
    let mut state = connected_state(&footswitch_descriptor(4));

    // Virtual id 2 is the group on page 0 (two actuators + one group).
    let mut grouped = real_assignment(2, 0.0);
    grouped.mode = AssignmentMode::Toggle | AssignmentMode::Group;
    let (primary_id, frames) = state.add_assignment(grouped, true).unwrap();
    assert_eq!(frames.len(), 2);

    let device = state.device(1).unwrap();
    let primary = device.assignment(primary_id).unwrap();
    let pair_id = primary.assignment_pair_id().unwrap();
    let pair = device.assignment(pair_id).unwrap();
    assert!(primary.mode().contains(AssignmentMode::Reverse));
    assert!(!pair.mode().contains(AssignmentMode::Reverse));
    assert_eq!(pair.assignment_pair_id(), Some(primary_id));
    assert_eq!(primary.actuator_id(), 0);
    assert_eq!(pair.actuator_id(), 1);
    assert_eq!(device.actuators()[0].assignments_count(), 1);
    assert_eq!(device.actuators()[1].assignments_count(), 1);
  }

  #[test]
  fn unassign_cascades_over_pair_links_in_any_order() {
    for remove_first in [true, false] {
      let mut state = connected_state(&footswitch_descriptor(4));
      let mut grouped = real_assignment(2, 0.0);
      grouped.mode = AssignmentMode::Toggle | AssignmentMode::Group;
      let (primary_id, _) = state.add_assignment(grouped, true).unwrap();
      let pair_id = state
        .device(1)
        .unwrap()
        .assignment(primary_id)
        .unwrap()
        .assignment_pair_id()
        .unwrap();

      let target = if remove_first { primary_id } else { pair_id };
      let frames = state.remove_assignment(&AssignmentKey {
        id: target,
        device_id: 1,
        pair_id: None,
      });
      assert_eq!(frames.len(), 2);

      let device = state.device(1).unwrap();
      assert_eq!(device.assignments().count(), 0);
      assert_eq!(device.actuators()[0].assignments_count(), 0);
      assert_eq!(device.actuators()[1].assignments_count(), 0);
    }
  }

  #[test]
  fn grouped_update_reports_under_primary_id() {
    let mut state = connected_state(&footswitch_descriptor(4));
    let mut grouped = real_assignment(2, 0.0);
    grouped.mode = AssignmentMode::Toggle | AssignmentMode::Group;
    let (primary_id, _) = state.add_assignment(grouped, true).unwrap();
    let pair_id = state
      .device(1)
      .unwrap()
      .assignment(primary_id)
      .unwrap()
      .assignment_pair_id()
      .unwrap();

    // The second half reports under its own id; consumers see the primary.
    let list = UpdateList::new(1, vec![Update::new(pair_id, 1.0)]);
    let actions =
      state.handle_frame(&Frame::new(1, Command::DataUpdate, list.raw().clone()));
    let surfaced = actions
      .iter()
      .find_map(|action| match action {
        Action::DataUpdate(list) => Some(list),
        _ => None,
      })
      .expect("update must surface");
    assert_eq!(surfaced.updates().len(), 1);
    assert_eq!(surfaced.updates()[0].assignment_id(), primary_id);
    assert_eq!(surfaced.raw()[1], primary_id);
  }

  #[test]
  fn updates_for_unknown_assignments_are_filtered() {
    let mut state = connected_state(&footswitch_descriptor(4));
    state.add_assignment(real_assignment(0, 0.5), true).unwrap();

    let list = UpdateList::new(1, vec![Update::new(0, 0.9), Update::new(200, 1.0)]);
    let actions =
      state.handle_frame(&Frame::new(1, Command::DataUpdate, list.raw().clone()));
    let surfaced = actions
      .iter()
      .find_map(|action| match action {
        Action::DataUpdate(list) => Some(list),
        _ => None,
      })
      .unwrap();
    assert_eq!(surfaced.updates().len(), 1);
    assert_eq!(surfaced.raw()[0], 1);
    // Value landed on the stored assignment.
    assert_eq!(state.device(1).unwrap().assignment(0).unwrap().value(), 0.9);
  }

  #[test]
  fn page_switch_repushes_only_matching_assignments() {
    let mut state = connected_state(&footswitch_descriptor(4));

    // Page span is 3 (two actuators + one group): actuator 0 is page 0,
    // actuator 3 is the first actuator of page 1.
    state.add_assignment(real_assignment(0, 0.1), true).unwrap();
    let (page1_id, frames) = state.add_assignment(real_assignment(3, 0.2), true).unwrap();
    // Not on the active page: retained but not pushed.
    assert!(frames.is_empty());

    let actions = state.handle_frame(&Frame::new(1, Command::RequestControlPage, vec![1]));
    let pushed = sends(&actions);
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].command(), Command::Assignment);
    assert_eq!(pushed[0].data()[0], page1_id);
    assert_eq!(state.device(1).unwrap().current_page(), 1);

    // Values set on the now-inactive page stay silent.
    let (_, frames) = state
      .set_value(&SetValue {
        device_id: 1,
        assignment_id: 0,
        actuator_id: 0,
        value: 0.7,
      })
      .unwrap();
    assert!(frames.is_empty());
  }

  #[test]
  fn host_page_switch_matches_device_requested_one() {
    let mut state = connected_state(&footswitch_descriptor(4));
    state.add_assignment(real_assignment(3, 0.2), true).unwrap();
    let frames = state.switch_page(1, 1);
    assert_eq!(frames.len(), 1);
    assert_eq!(state.device(1).unwrap().current_page(), 1);
    // Out-of-range pages are refused.
    assert!(state.switch_page(1, 9).is_empty());
    assert_eq!(state.device(1).unwrap().current_page(), 1);
  }

  #[test]
  fn device_times_out_after_hundred_silent_cycles() {
    let mut state = connected_state(&footswitch_descriptor(1));

    for _ in 0..DEVICE_TIMEOUT_CYCLES - 1 {
      assert!(state.age_devices().is_empty());
    }
    let actions = state.age_devices();
    assert_eq!(actions.len(), 1);
    match &actions[0] {
      Action::DeviceStatus(device) => {
        assert_eq!(device.id(), 1);
        assert_eq!(device.status(), DeviceStatus::Disconnected);
      }
      other => panic!("expected a status notification, got {other:?}"),
    }
    assert!(state.device(1).is_none());
    // Eviction fires exactly once.
    assert!(state.age_devices().is_empty());

    // The slot is free for the next handshake.
    let actions = state.handle_frame(&hello_frame("foo", 0x9999, 7));
    let reply = HandshakeReply::decode(sends(&actions)[0].data()).unwrap();
    assert_eq!(reply.device_id(), 1);
  }

  #[test]
  fn any_frame_resets_the_timeout_counter() {
    let mut state = connected_state(&footswitch_descriptor(1));
    for _ in 0..DEVICE_TIMEOUT_CYCLES - 1 {
      state.age_devices();
    }
    state.handle_frame(&Frame::new(1, Command::DataUpdate, vec![0]));
    assert_eq!(state.device(1).unwrap().timeout_cycles, 0);
    // The clock starts over.
    assert!(state.age_devices().is_empty());
  }

  #[test]
  fn unregistered_devices_do_not_age() {
    let mut state = ChainState::default();
    state.handle_frame(&hello_frame("foo", 0x1234, 7));
    for _ in 0..DEVICE_TIMEOUT_CYCLES * 2 {
      assert!(state.age_devices().is_empty());
    }
    assert!(state.device(1).is_some());
  }

  #[test]
  fn data_update_from_unknown_device_is_ignored() {
    let mut state = ChainState::default();
    let list = UpdateList::new(5, vec![Update::new(0, 1.0)]);
    let actions = state.handle_frame(&Frame::new(5, Command::DataUpdate, list.raw().clone()));
    assert!(actions.is_empty());
  }
}
