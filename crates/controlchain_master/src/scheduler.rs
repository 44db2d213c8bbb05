// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Scheduler thread: the chain's heartbeat.
//!
//! Every 10 ms the chain gets one sync frame. Every 20th cycle is a
//! handshake cycle (devices may announce themselves afterwards), every 2nd
//! cycle is a request cycle: first missing descriptors are fetched, otherwise
//! one pending caller frame is flushed. Devices budget their own replies
//! around this cadence, so the scheduler emits the cycle's sync frame only
//! after its request traffic is done.

use crate::chain::Action;
use crate::handle::ChainShared;
use crate::request::ChainRequest;
use controlchain_core::message::{sync_payload, Command, DescriptorAction, SyncCycle};
use controlchain_core::timing::{
  HANDSHAKE_PERIOD,
  REQUEST_PERIOD,
  RESPONSE_DEADLINE,
  SYNC_PERIOD,
};
use controlchain_core::Frame;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::device::DeviceFilter;

fn sync_frame(cycle: SyncCycle) -> Frame {
  Frame::new(0, Command::ChainSync, sync_payload(cycle))
}

fn descriptor_request(device_id: u8) -> Frame {
  Frame::new(
    device_id,
    Command::DevDescriptor,
    vec![DescriptorAction::Request as u8],
  )
}

pub(crate) fn run(shared: Arc<ChainShared>, mut requests: mpsc::Receiver<ChainRequest>) {
  let mut cycle: u32 = 0;

  while !shared.cancel.is_cancelled() {
    std::thread::sleep(SYNC_PERIOD);
    if shared.cancel.is_cancelled() {
      break;
    }

    // Age devices first so an eviction never races its own frames below.
    let evictions = {
      let mut state = shared.state.lock().expect("chain state lock poisoned");
      state.age_devices()
    };
    for action in evictions {
      if let Action::DeviceStatus(device) = action {
        shared.events.fire_device_status(&device);
      }
    }

    if !shared.serial.is_enabled() {
      // Line is down; the receiver is busy reopening it. Emit nothing.
      continue;
    }

    // The first sync after open, and after every hot-plug recovery, is a
    // setup cycle: every listening device resets to its initial state.
    if shared.serial.take_needs_setup() {
      let _ = shared.serial.write_frame(&sync_frame(SyncCycle::Setup));
      cycle = 0;
      continue;
    }

    cycle = cycle.wrapping_add(1);

    let mut kind = SyncCycle::Regular;
    if cycle % HANDSHAKE_PERIOD == 0 {
      kind = SyncCycle::Handshake;
    } else if cycle % REQUEST_PERIOD == 0 {
      let unregistered = {
        let state = shared.state.lock().expect("chain state lock poisoned");
        state.device_list(DeviceFilter::Unregistered)
      };
      if !unregistered.is_empty() {
        fetch_descriptors(&shared, &unregistered);
      } else if let Ok(request) = requests.try_recv() {
        let _ = shared.serial.write_frame(&request.frame);
        // A dropped caller is fine; the frame is already out.
        let _ = request.done.send(());
      }
    }

    let _ = shared.serial.write_frame(&sync_frame(kind));
  }
}

/// Ask every descriptor-less device for its self-description, waiting up to
/// the response deadline per device. No reply means the handshake went
/// nowhere (wrong baud, dying cable) and the address is given back; a
/// healthy device will simply handshake again.
fn fetch_descriptors(shared: &Arc<ChainShared>, device_ids: &[u8]) {
  for &device_id in device_ids {
    if shared.cancel.is_cancelled() {
      return;
    }
    shared.response.arm();
    if shared.serial.write_frame(&descriptor_request(device_id)).is_err() {
      return;
    }
    if !shared.response.wait(RESPONSE_DEADLINE) {
      debug!(
        "Device {} did not answer the descriptor request, dropping it",
        device_id
      );
      let mut state = shared.state.lock().expect("chain state lock poisoned");
      state.destroy_device(device_id);
    }
  }
}
