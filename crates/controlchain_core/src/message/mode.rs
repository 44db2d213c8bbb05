// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use enumflags2::bitflags;

/// Assignment mode bits, as they appear in the 32-bit mode field on the wire.
///
/// An assignment usually carries one value-interpretation bit (`Toggle`,
/// `Trigger`, `Options`, `Real`, `Integer`, ...) plus optional behavior bits.
/// `Reverse` inverts momentary polarity and marks the primary half of a
/// grouped assignment; `Group` addresses an actuator group instead of a
/// single actuator.
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentMode {
  Toggle = 0x001,
  Trigger = 0x002,
  Options = 0x004,
  TapTempo = 0x008,
  Real = 0x010,
  Integer = 0x020,
  Logarithmic = 0x040,
  Coloured = 0x100,
  Momentary = 0x200,
  Reverse = 0x400,
  Group = 0x800,
}
