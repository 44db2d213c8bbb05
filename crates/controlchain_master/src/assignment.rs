// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Assignment records and the enumeration window math.
//!
//! An assignment binds one logical control (a plugin parameter, a preset
//! switch) to one actuator of one device. The engine owns the stored copy:
//! callers build an [`Assignment`] with [`AssignmentBuilder`], hand it over,
//! and get back the id the chain will use on the wire.

use controlchain_core::message::{AssignmentMode, AssignmentPayload, OptionItem};
use derive_builder::Builder;
use enumflags2::BitFlags;
use getset::{CopyGetters, Getters};

/// A binding of one logical control to one actuator.
///
/// The engine-managed fields (id, pair links, enumeration window, page) are
/// filled in when the assignment is added and are read-only outside the
/// crate.
#[derive(Debug, Clone, Builder, Getters, CopyGetters)]
pub struct Assignment {
  /// Chain address of the owning device.
  #[getset(get_copy = "pub")]
  pub(crate) device_id: u8,
  /// Virtual actuator id (page-relative ids laid out back to back).
  #[getset(get_copy = "pub")]
  pub(crate) actuator_id: u8,
  #[getset(get = "pub")]
  #[builder(setter(into))]
  pub(crate) label: String,
  #[getset(get_copy = "pub")]
  pub(crate) value: f32,
  #[getset(get_copy = "pub")]
  pub(crate) min: f32,
  #[getset(get_copy = "pub")]
  pub(crate) max: f32,
  #[getset(get_copy = "pub")]
  pub(crate) def: f32,
  #[getset(get_copy = "pub")]
  pub(crate) mode: BitFlags<AssignmentMode>,
  #[getset(get_copy = "pub")]
  #[builder(default)]
  pub(crate) steps: u16,
  #[getset(get = "pub")]
  #[builder(setter(into), default)]
  pub(crate) unit: String,
  /// Ordered option list for `Options`-mode assignments.
  #[getset(get = "pub")]
  #[builder(default)]
  pub(crate) options: Vec<OptionItem>,

  /// Slot id, unique per device, stable for the assignment's lifetime.
  #[getset(get_copy = "pub")]
  #[builder(setter(skip), default)]
  pub(crate) id: u8,
  /// Actuator id of the other half of a grouped assignment.
  #[getset(get_copy = "pub")]
  #[builder(setter(skip), default)]
  pub(crate) actuator_pair_id: Option<u8>,
  /// Assignment id of the other half of a grouped assignment.
  #[getset(get_copy = "pub")]
  #[builder(setter(skip), default)]
  pub(crate) assignment_pair_id: Option<u8>,
  /// Selected option index, relative to the transmitted window.
  #[getset(get_copy = "pub")]
  #[builder(setter(skip), default)]
  pub(crate) list_index: u8,
  #[builder(setter(skip), default)]
  pub(crate) frame_min: usize,
  #[builder(setter(skip), default)]
  pub(crate) frame_max: usize,
  /// Which virtual actuator page this assignment lives on.
  #[getset(get_copy = "pub")]
  #[builder(setter(skip), default)]
  pub(crate) actuator_page_id: u8,
}

impl Assignment {
  /// Recompute the enumeration window around `selected` for a device that
  /// can display `frame_size` items at once.
  pub(crate) fn update_window(&mut self, selected: usize, frame_size: u8) {
    let window = enumeration_window(selected, self.options.len(), frame_size);
    self.frame_min = window.min;
    self.frame_max = window.max;
    self.list_index = window.index;
  }

  /// Index of the option matching the current value. Values are compared
  /// exactly; a value not present in the list falls back to treating it as
  /// an index, then to 0.
  pub(crate) fn selected_option(&self, value: f32) -> usize {
    if let Some(position) = self.options.iter().position(|item| item.value() == value) {
      return position;
    }
    let index = value as usize;
    if index < self.options.len() { index } else { 0 }
  }

  /// The option-list slice inside the current window.
  pub(crate) fn window_items(&self) -> &[OptionItem] {
    if self.options.is_empty() {
      return &[];
    }
    let max = self.frame_max.min(self.options.len() - 1);
    &self.options[self.frame_min..=max]
  }

  pub(crate) fn to_payload(&self) -> AssignmentPayload<'_> {
    AssignmentPayload {
      id: self.id,
      actuator_id: self.actuator_id,
      label: &self.label,
      value: self.value,
      min: self.min,
      max: self.max,
      def: self.def,
      mode: self.mode.bits(),
      steps: self.steps,
      unit: &self.unit,
      list_index: self.list_index,
      items: self.window_items(),
    }
  }
}

/// Caller-side handle for removing an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentKey {
  pub id: u8,
  pub device_id: u8,
  /// Pair id supplied by callers that tracked a grouped assignment
  /// themselves; `None` lets the engine follow its own pair links.
  pub pair_id: Option<u8>,
}

/// Caller-side value update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetValue {
  pub device_id: u8,
  pub assignment_id: u8,
  pub actuator_id: u8,
  pub value: f32,
}

pub(crate) struct EnumerationWindow {
  pub min: usize,
  pub max: usize,
  /// Selected index relative to `min`.
  pub index: u8,
}

/// Window of an option list centered on the selection, sized to what the
/// device can display. Clamping at either end re-expands the other bound so
/// the device screen stays full whenever the list allows it.
pub(crate) fn enumeration_window(
  selected: usize,
  list_count: usize,
  frame_size: u8,
) -> EnumerationWindow {
  if list_count == 0 {
    return EnumerationWindow {
      min: 0,
      max: 0,
      index: 0,
    };
  }
  let frame_size = frame_size.max(1) as isize;
  let count = list_count as isize;
  let selected = (selected as isize).min(count - 1);
  let half = frame_size / 2;

  let mut min = selected - half;
  let mut max = selected + half;
  if min < 0 {
    min = 0;
    max = if count < frame_size - 1 {
      count
    } else {
      frame_size - 1
    };
  }
  if max >= count {
    max = count - 1;
    min = (max - (frame_size - 1)).max(0);
  }
  max = max.min(count - 1);

  EnumerationWindow {
    min: min as usize,
    max: max as usize,
    index: (selected - min) as u8,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn window(selected: usize, count: usize, frame: u8) -> (usize, usize, u8) {
    let w = enumeration_window(selected, count, frame);
    (w.min, w.max, w.index)
  }

  #[test]
  fn window_at_list_start() {
    assert_eq!(window(0, 10, 5), (0, 4, 0));
    assert_eq!(window(1, 10, 5), (0, 4, 1));
  }

  #[test]
  fn window_in_the_middle() {
    assert_eq!(window(5, 10, 5), (3, 7, 2));
  }

  #[test]
  fn window_at_list_end() {
    assert_eq!(window(9, 10, 5), (5, 9, 4));
    assert_eq!(window(8, 10, 5), (5, 9, 3));
  }

  #[test]
  fn window_transmitted_index_is_relative() {
    // 12 items, display of 5: selecting 3 ships items 1..=5 as index 2,
    // selecting 8 ships items 6..=10 as index 2.
    assert_eq!(window(3, 12, 5), (1, 5, 2));
    assert_eq!(window(8, 12, 5), (6, 10, 2));
  }

  #[test]
  fn window_on_short_list() {
    assert_eq!(window(0, 3, 5), (0, 2, 0));
    assert_eq!(window(2, 3, 5), (0, 2, 2));
    assert_eq!(window(0, 1, 5), (0, 0, 0));
  }

  #[test]
  fn window_with_degenerate_frame_size() {
    assert_eq!(window(4, 10, 1), (4, 4, 0));
    assert_eq!(window(4, 10, 0), (4, 4, 0));
  }

  #[test]
  fn builder_fills_engine_fields_with_defaults() {
    let assignment = AssignmentBuilder::default()
      .device_id(1)
      .actuator_id(0)
      .label("Gain")
      .value(0.5)
      .min(0.0)
      .max(1.0)
      .def(0.5)
      .mode(AssignmentMode::Real.into())
      .steps(32u16)
      .build()
      .unwrap();
    assert_eq!(assignment.id(), 0);
    assert_eq!(assignment.assignment_pair_id(), None);
    assert_eq!(assignment.unit(), "");
    assert!(assignment.options().is_empty());
  }

  #[test]
  fn selected_option_prefers_exact_value_match() {
    let mut assignment = AssignmentBuilder::default()
      .device_id(1)
      .actuator_id(0)
      .label("List")
      .value(20.0)
      .min(0.0)
      .max(2.0)
      .def(0.0)
      .mode(AssignmentMode::Options.into())
      .options(vec![
        OptionItem::new("a", 10.0),
        OptionItem::new("b", 20.0),
        OptionItem::new("c", 30.0),
      ])
      .build()
      .unwrap();
    assert_eq!(assignment.selected_option(20.0), 1);
    // No exact match: small integers read as indices.
    assert_eq!(assignment.selected_option(2.0), 2);
    assert_eq!(assignment.selected_option(99.0), 0);
    assignment.update_window(1, 5);
    assert_eq!(assignment.window_items().len(), 3);
  }
}
