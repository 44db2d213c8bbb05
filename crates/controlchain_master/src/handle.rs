// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The public handle: opens the port, spawns the receiver and scheduler
//! threads, and exposes the caller API.

use crate::assignment::{Assignment, AssignmentKey, SetValue};
use crate::chain::ChainState;
use crate::device::{Device, DeviceFilter};
use crate::event::{ChainEvent, EventBus};
use crate::request::{request_channel, RequestQueue, ResponseSignal};
use crate::serial::SerialController;
use crate::{receiver, scheduler};
use controlchain_core::errors::ControlChainResult;
use controlchain_core::message::{control_payload, Command, DeviceControlAction, UpdateList};
use controlchain_core::util::stream::convert_broadcast_receiver_to_stream;
use controlchain_core::Frame;
use futures::Stream;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// State shared by the receiver, the scheduler, and caller threads.
pub(crate) struct ChainShared {
  /// The one coarse lock around all chain bookkeeping.
  pub state: Mutex<ChainState>,
  pub serial: SerialController,
  pub response: ResponseSignal,
  pub events: EventBus,
  pub cancel: CancellationToken,
}

/// A running Control Chain master.
///
/// Returned by [`open`](ControlChainMaster::open); dropping it (or calling
/// [`close`](ControlChainMaster::close)) stops both engine threads and
/// releases the port.
pub struct ControlChainMaster {
  shared: Arc<ChainShared>,
  requests: RequestQueue,
  receiver_thread: Option<JoinHandle<()>>,
  scheduler_thread: Option<JoinHandle<()>>,
}

impl ControlChainMaster {
  /// Open the serial port and start the chain. Blocks until the port exists;
  /// a missing device node is polled forever, matching the behavior callers
  /// expect from a pedal that is simply not powered yet.
  pub fn open(port_path: &str, baud_rate: u32) -> ControlChainResult<Self> {
    let shared = Arc::new(ChainShared {
      state: Mutex::new(ChainState::default()),
      serial: SerialController::new(port_path, baud_rate),
      response: ResponseSignal::default(),
      events: EventBus::new(),
      cancel: CancellationToken::new(),
    });
    shared.serial.connect(&shared.cancel)?;

    let (requests, request_receiver) = request_channel();

    let receiver_thread = {
      let shared = shared.clone();
      std::thread::Builder::new()
        .name("cc-receiver".into())
        .spawn(move || receiver::run(shared))
        .expect("failed to spawn receiver thread")
    };
    let scheduler_thread = {
      let shared = shared.clone();
      std::thread::Builder::new()
        .name("cc-scheduler".into())
        .spawn(move || scheduler::run(shared, request_receiver))
        .expect("failed to spawn scheduler thread")
    };

    Ok(Self {
      shared,
      requests,
      receiver_thread: Some(receiver_thread),
      scheduler_thread: Some(scheduler_thread),
    })
  }

  /// Stop both threads and release the port. Also runs on drop.
  pub fn close(mut self) {
    self.shutdown();
  }

  fn shutdown(&mut self) {
    self.shared.cancel.cancel();
    if let Some(thread) = self.receiver_thread.take() {
      let _ = thread.join();
    }
    if let Some(thread) = self.scheduler_thread.take() {
      let _ = thread.join();
    }
  }

  /// Add an assignment and push it to its device. Returns the assignment id,
  /// or −1 when the device is unknown, the actuator is out of slots, or the
  /// engine is shutting down. With `new_assignment` false the stored
  /// assignment is re-pushed instead of re-registered (page restore).
  pub fn assign(&self, assignment: Assignment, new_assignment: bool) -> i32 {
    let result = {
      let mut state = self.shared.state.lock().expect("chain state lock poisoned");
      state.add_assignment(assignment, new_assignment)
    };
    match result {
      Ok((id, frames)) => {
        for frame in frames {
          if let Err(err) = self.requests.submit(frame) {
            warn!("Assignment {} not pushed: {}", id, err);
            return -1;
          }
        }
        id as i32
      }
      Err(err) => {
        warn!("Assignment rejected: {}", err);
        -1
      }
    }
  }

  /// Remove an assignment (and its grouped pair, if any). Unknown ids are a
  /// silent no-op.
  pub fn unassign(&self, key: &AssignmentKey) {
    let frames = {
      let mut state = self.shared.state.lock().expect("chain state lock poisoned");
      state.remove_assignment(key)
    };
    for frame in frames {
      if self.requests.submit(frame).is_err() {
        return;
      }
    }
  }

  /// Update an assignment's value. Returns the assignment id or −1.
  pub fn set_value(&self, update: &SetValue) -> i32 {
    let result = {
      let mut state = self.shared.state.lock().expect("chain state lock poisoned");
      state.set_value(update)
    };
    match result {
      Ok((id, frames)) => {
        for frame in frames {
          if self.requests.submit(frame).is_err() {
            return -1;
          }
        }
        id as i32
      }
      Err(err) => {
        warn!("Value update rejected: {}", err);
        -1
      }
    }
  }

  /// Switch a device to another control page and re-push that page's
  /// assignments.
  pub fn switch_page(&self, device_id: u8, page: u8) {
    let frames = {
      let mut state = self.shared.state.lock().expect("chain state lock poisoned");
      state.switch_page(device_id, page)
    };
    for frame in frames {
      if self.requests.submit(frame).is_err() {
        return;
      }
    }
  }

  /// Tell a device to stop reporting and blank its controls.
  pub fn disable_device(&self, device_id: u8) {
    let frame = Frame::new(
      device_id,
      Command::DevControl,
      control_payload(DeviceControlAction::Disable),
    );
    let _ = self.requests.submit(frame);
  }

  /// Register a callback for device status transitions. Runs on engine
  /// threads: return promptly and do not call back into the engine.
  pub fn set_device_status_callback<F>(&self, callback: F)
  where
    F: Fn(&Device) + Send + Sync + 'static,
  {
    self.shared.events.set_device_status_callback(Box::new(callback));
  }

  /// Register a callback for device data updates. Same re-entrancy rules as
  /// [`set_device_status_callback`](Self::set_device_status_callback).
  pub fn set_data_update_callback<F>(&self, callback: F)
  where
    F: Fn(&UpdateList) + Send + Sync + 'static,
  {
    self.shared.events.set_data_update_callback(Box::new(callback));
  }

  /// Chain events as a stream, for consumers that would rather not deal
  /// with callback re-entrancy rules.
  pub fn event_stream(&self) -> impl Stream<Item = ChainEvent> + use<> {
    convert_broadcast_receiver_to_stream(self.shared.events.subscribe())
  }

  /// Ids of the devices currently on the chain.
  pub fn device_list(&self, filter: DeviceFilter) -> Vec<u8> {
    let state = self.shared.state.lock().expect("chain state lock poisoned");
    state.device_list(filter)
  }

  /// Snapshot of one device.
  pub fn device_by_id(&self, id: u8) -> Option<Device> {
    let state = self.shared.state.lock().expect("chain state lock poisoned");
    state.device(id).cloned()
  }

  /// How many chain devices share `uri`.
  pub fn device_count_with_uri(&self, uri: &str) -> usize {
    let state = self.shared.state.lock().expect("chain state lock poisoned");
    state.count_with_uri(uri)
  }

  /// JSON descriptor for the IPC layer.
  pub fn device_descriptor_json(&self, id: u8) -> Option<String> {
    let state = self.shared.state.lock().expect("chain state lock poisoned");
    state.device(id).map(Device::descriptor_json)
  }
}

impl Drop for ControlChainMaster {
  fn drop(&mut self) {
    self.shutdown();
  }
}
