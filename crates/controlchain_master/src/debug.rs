// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Frame tracing, gated by `LIBCONTROLCHAIN_DEBUG`.
//!
//! Unset or `0` keeps the wire quiet; `1` traces high-level frame events;
//! `2` adds hex dumps of every non-sync frame. Read once per process.

use controlchain_core::message::Command;
use controlchain_core::Frame;
use std::sync::OnceLock;
use tracing::{debug, trace};

pub(crate) fn debug_level() -> u8 {
  static LEVEL: OnceLock<u8> = OnceLock::new();
  *LEVEL.get_or_init(|| {
    std::env::var("LIBCONTROLCHAIN_DEBUG")
      .ok()
      .and_then(|value| value.parse().ok())
      .unwrap_or(0)
  })
}

pub(crate) fn trace_frame(direction: &'static str, frame: &Frame) {
  let level = debug_level();
  // Sync frames fire every 10 ms, dumping them would drown everything else.
  if level == 0 || frame.command() == Command::ChainSync {
    return;
  }
  debug!(
    "{} device {} command {} ({} bytes)",
    direction,
    frame.device_id(),
    frame.command(),
    frame.data().len()
  );
  if level >= 2 {
    trace!("{} data: {:02X?}", direction, frame.data());
  }
}
