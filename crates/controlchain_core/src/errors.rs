// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Control Chain error enums.
//!
//! Frame-level problems (`ProtocolError`) never escape the receiver: a bad
//! frame is dropped and the reader resynchronises. `ControlChainError` is
//! what the engine and its consumers see.

use displaydoc::Display;
use thiserror::Error;

pub type ControlChainResult<T = ()> = Result<T, ControlChainError>;

/// Errors raised while decoding or validating a single frame. These are
/// logged and swallowed by the receiver; the line stays up.
#[derive(Debug, Error, Display, Clone, PartialEq, Eq)]
pub enum ProtocolError {
  /// Frame payload ended before field '{0}' could be read
  Truncated(&'static str),
  /// CRC mismatch, expected {expected:#04x} got {actual:#04x}
  CrcMismatch { expected: u8, actual: u8 },
  /// Device id {0} is outside the chain address space
  InvalidDeviceId(u8),
  /// Unknown command byte {0:#04x}
  UnknownCommand(u8),
  /// Announced data size {0} exceeds the frame buffer
  OversizeData(u16),
  /// Field '{0}' holds an out-of-range value
  InvalidField(&'static str),
  /// String field is not valid UTF-8
  BadString,
}

/// Errors surfaced by the chain engine and its public API.
#[derive(Debug, Error, Display)]
pub enum ControlChainError {
  /// Serial port unavailable: {0}
  SerialUnavailable(String),
  /// Serial line is down, waiting for the port to come back
  SerialDisabled,
  /// No reply from device {0} within the response deadline
  Timeout(u8),
  /// Device protocol version {0} requires a firmware update
  ProtocolMismatch(String),
  /// No free slot left ({0})
  CapacityExhausted(&'static str),
  /// No device with id {0} on the chain
  UnknownDevice(u8),
  /// No assignment with id {0} on device {1}
  UnknownAssignment(u8, u8),
  /// No actuator with id {0} on device {1}
  UnknownActuator(u8, u8),
  /// Engine is shutting down
  Shutdown,
  /// Frame error: {0}
  #[error(transparent)]
  Protocol(#[from] ProtocolError),
}
