// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Receiver thread: frame reassembly over the raw byte stream.
//!
//! Four states, mirroring the deadlines devices are built around: hunt for a
//! sync byte (500 ms reads), pull the header (10 ms), pull the payload (1 s),
//! check the CRC. Any validation failure falls straight back to sync hunting,
//! so a corrupt or misaligned byte costs at most one frame, never the stream.

use crate::chain::Action;
use crate::handle::ChainShared;
use crate::serial::{ReadOutcome, SerialController};
use controlchain_core::frame::FrameHeader;
use controlchain_core::message::Command;
use controlchain_core::timing::{
  DATA_READ_DEADLINE,
  HEADER_READ_DEADLINE,
  SYNC_READ_DEADLINE,
};
use controlchain_core::{crc::crc8, Frame, HEADER_SIZE, SERIAL_BUFFER_SIZE, SYNC_BYTE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Anything that can hand over exact byte counts under a deadline. The real
/// implementation is the serial port; tests use scripted byte sources.
pub(crate) trait ByteSource {
  fn read_exact_deadline(&mut self, buf: &mut [u8], deadline: Duration) -> ReadOutcome;
}

impl ByteSource for &SerialController {
  fn read_exact_deadline(&mut self, buf: &mut [u8], deadline: Duration) -> ReadOutcome {
    SerialController::read_exact_deadline(*self, buf, deadline)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
  AwaitSync,
  AwaitHeader,
  AwaitData,
  AwaitCrc,
}

pub(crate) enum StepOutcome {
  /// A frame passed validation.
  Frame(Frame),
  /// State advanced (or resynced); call again.
  Continue,
  /// Nothing on the line during a sync hunt.
  Idle,
  /// The byte source is gone.
  Down,
}

/// Incremental frame reassembler. One `step` performs one state's read, like
/// one iteration of the receive loop.
pub(crate) struct FrameReassembler {
  state: ReadState,
  header_bytes: [u8; HEADER_SIZE],
  header: Option<FrameHeader>,
  payload: Vec<u8>,
}

impl FrameReassembler {
  pub fn new() -> Self {
    Self {
      state: ReadState::AwaitSync,
      header_bytes: [0; HEADER_SIZE],
      header: None,
      payload: Vec::with_capacity(SERIAL_BUFFER_SIZE),
    }
  }

  pub fn reset(&mut self) {
    self.state = ReadState::AwaitSync;
    self.header = None;
    self.payload.clear();
  }

  pub fn step<S: ByteSource>(&mut self, source: &mut S) -> StepOutcome {
    match self.state {
      ReadState::AwaitSync => {
        let mut byte = [0u8; 1];
        match source.read_exact_deadline(&mut byte, SYNC_READ_DEADLINE) {
          ReadOutcome::Full => {
            if byte[0] == SYNC_BYTE {
              self.state = ReadState::AwaitHeader;
            }
            StepOutcome::Continue
          }
          ReadOutcome::TimedOut => StepOutcome::Idle,
          ReadOutcome::Down => StepOutcome::Down,
        }
      }
      ReadState::AwaitHeader => {
        match source.read_exact_deadline(&mut self.header_bytes, HEADER_READ_DEADLINE) {
          ReadOutcome::Full => match FrameHeader::parse(&self.header_bytes) {
            Ok(header) => {
              self.header = Some(header);
              self.payload.clear();
              self.state = if header.data_size == 0 {
                ReadState::AwaitCrc
              } else {
                ReadState::AwaitData
              };
              StepOutcome::Continue
            }
            Err(err) => {
              trace!("Resync: {}", err);
              self.reset();
              StepOutcome::Continue
            }
          },
          ReadOutcome::TimedOut => {
            self.reset();
            StepOutcome::Continue
          }
          ReadOutcome::Down => StepOutcome::Down,
        }
      }
      ReadState::AwaitData => {
        let size = self.header.map(|h| h.data_size as usize).unwrap_or(0);
        self.payload.resize(size, 0);
        match source.read_exact_deadline(&mut self.payload, DATA_READ_DEADLINE) {
          ReadOutcome::Full => {
            self.state = ReadState::AwaitCrc;
            StepOutcome::Continue
          }
          ReadOutcome::TimedOut => {
            self.reset();
            StepOutcome::Continue
          }
          ReadOutcome::Down => StepOutcome::Down,
        }
      }
      ReadState::AwaitCrc => {
        let mut byte = [0u8; 1];
        match source.read_exact_deadline(&mut byte, DATA_READ_DEADLINE) {
          ReadOutcome::Full => {
            let header = self.header.expect("crc state always follows a header");
            let mut covered = Vec::with_capacity(HEADER_SIZE + self.payload.len());
            covered.extend_from_slice(&self.header_bytes);
            covered.extend_from_slice(&self.payload);
            let expected = crc8(&covered);
            let outcome = if expected == byte[0] {
              StepOutcome::Frame(Frame::new(
                header.device_id,
                header.command,
                std::mem::take(&mut self.payload),
              ))
            } else {
              trace!(
                "Dropping frame with bad CRC (expected {expected:#04x}, got {:#04x})",
                byte[0]
              );
              StepOutcome::Continue
            };
            self.reset();
            outcome
          }
          ReadOutcome::TimedOut => {
            self.reset();
            StepOutcome::Continue
          }
          ReadOutcome::Down => StepOutcome::Down,
        }
      }
    }
  }
}

/// Receiver loop body. Owns the frame reassembler, recovers the port after
/// hot-unplug, and executes the state machine's side effects.
pub(crate) fn run(shared: Arc<ChainShared>) {
  let mut reassembler = FrameReassembler::new();
  while !shared.cancel.is_cancelled() {
    if !shared.serial.is_enabled() {
      shared.serial.drop_reader();
      reassembler.reset();
      match shared.serial.connect(&shared.cancel) {
        Ok(()) => debug!("Serial line recovered"),
        Err(err) => {
          warn!("Giving up on serial reopen: {}", err);
          return;
        }
      }
      continue;
    }
    let mut source = &shared.serial;
    match reassembler.step(&mut source) {
      StepOutcome::Frame(frame) => dispatch(&shared, frame),
      StepOutcome::Continue | StepOutcome::Idle => {}
      StepOutcome::Down => {
        // Loop around into the reconnect path.
      }
    }
  }
}

fn dispatch(shared: &Arc<ChainShared>, frame: Frame) {
  crate::debug::trace_frame("RECV", &frame);
  // Descriptor replies unblock the scheduler's response wait no matter what
  // the payload turns out to contain.
  if frame.command() == Command::DevDescriptor {
    shared.response.notify();
  }
  let actions = {
    let mut state = shared.state.lock().expect("chain state lock poisoned");
    state.handle_frame(&frame)
  };
  for action in actions {
    match action {
      Action::Send(out) => {
        let _ = shared.serial.write_frame(&out);
      }
      Action::DeviceStatus(device) => shared.events.fire_device_status(&device),
      Action::DataUpdate(updates) => shared.events.fire_data_update(&updates),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use controlchain_core::message::Command;

  /// Scripted byte source: hands out its buffer as requested, then times out
  /// forever.
  struct ScriptedSource {
    bytes: Vec<u8>,
    pos: usize,
  }

  impl ScriptedSource {
    fn new(bytes: Vec<u8>) -> Self {
      Self { bytes, pos: 0 }
    }
  }

  impl ByteSource for ScriptedSource {
    fn read_exact_deadline(&mut self, buf: &mut [u8], _deadline: Duration) -> ReadOutcome {
      if self.pos + buf.len() > self.bytes.len() {
        return ReadOutcome::TimedOut;
      }
      buf.copy_from_slice(&self.bytes[self.pos..self.pos + buf.len()]);
      self.pos += buf.len();
      ReadOutcome::Full
    }
  }

  fn collect_frames(bytes: Vec<u8>) -> Vec<Frame> {
    let mut source = ScriptedSource::new(bytes);
    let mut reassembler = FrameReassembler::new();
    let mut frames = Vec::new();
    loop {
      match reassembler.step(&mut source) {
        StepOutcome::Frame(frame) => frames.push(frame),
        StepOutcome::Continue => {}
        StepOutcome::Idle | StepOutcome::Down => break,
      }
    }
    frames
  }

  #[test]
  fn reassembles_consecutive_frames() {
    let first = Frame::new(1, Command::Handshake, vec![1, 2, 3]);
    let second = Frame::new(2, Command::DataUpdate, vec![0]);
    let mut bytes = first.encode();
    bytes.extend(second.encode());
    assert_eq!(collect_frames(bytes), vec![first, second]);
  }

  #[test]
  fn stray_byte_between_frames_does_not_lose_the_second() {
    let first = Frame::new(1, Command::Handshake, vec![9, 9]);
    let second = Frame::new(1, Command::DataUpdate, vec![0]);
    let mut bytes = first.encode();
    bytes.push(0x42); // line noise
    bytes.extend(second.encode());
    assert_eq!(collect_frames(bytes), vec![first, second]);
  }

  #[test]
  fn corrupt_crc_drops_only_that_frame() {
    let first = Frame::new(1, Command::SetValue, vec![1, 2, 3, 4, 5, 6]);
    let second = Frame::new(1, Command::ChainSync, vec![1]);
    let mut bytes = first.encode();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    bytes.extend(second.encode());
    assert_eq!(collect_frames(bytes), vec![second]);
  }

  #[test]
  fn impossible_header_triggers_resync() {
    // device id 200 is far outside the chain address space
    let mut bytes = vec![SYNC_BYTE, 200, 0, 0, 0];
    let good = Frame::new(3, Command::Unassignment, vec![7]);
    bytes.extend(good.encode());
    assert_eq!(collect_frames(bytes), vec![good]);
  }

  #[test]
  fn oversize_data_length_triggers_resync() {
    let mut bytes = vec![SYNC_BYTE, 1, 4, 0xFF, 0xFF];
    let good = Frame::new(1, Command::ChainSync, vec![2]);
    bytes.extend(good.encode());
    assert_eq!(collect_frames(bytes), vec![good]);
  }

  #[test]
  fn sync_byte_inside_payload_is_not_a_frame_start() {
    let tricky = Frame::new(1, Command::Handshake, vec![SYNC_BYTE, SYNC_BYTE]);
    assert_eq!(collect_frames(tricky.encode()), vec![tricky]);
  }
}
