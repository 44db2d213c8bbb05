// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Consumer notifications.
//!
//! Two delivery paths exist side by side: classic callbacks, which run on
//! the engine's own threads and therefore must return promptly and never
//! call back into the engine, and a broadcast event stream that decouples
//! consumers completely.

use crate::device::Device;
use controlchain_core::message::UpdateList;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Events surfaced by the chain engine.
#[derive(Debug, Clone)]
pub enum ChainEvent {
  /// A device connected, disconnected, or timed out.
  DeviceStatus(Device),
  /// A device reported value changes.
  DataUpdate(UpdateList),
}

type DeviceStatusCallback = Box<dyn Fn(&Device) + Send + Sync>;
type DataUpdateCallback = Box<dyn Fn(&UpdateList) + Send + Sync>;

pub(crate) struct EventBus {
  device_status: RwLock<Option<DeviceStatusCallback>>,
  data_update: RwLock<Option<DataUpdateCallback>>,
  broadcast: broadcast::Sender<ChainEvent>,
}

impl EventBus {
  pub fn new() -> Self {
    let (broadcast, _) = broadcast::channel(256);
    Self {
      device_status: RwLock::new(None),
      data_update: RwLock::new(None),
      broadcast,
    }
  }

  pub fn set_device_status_callback(&self, callback: DeviceStatusCallback) {
    *self.device_status.write().expect("callback lock poisoned") = Some(callback);
  }

  pub fn set_data_update_callback(&self, callback: DataUpdateCallback) {
    *self.data_update.write().expect("callback lock poisoned") = Some(callback);
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
    self.broadcast.subscribe()
  }

  pub fn fire_device_status(&self, device: &Device) {
    if let Some(callback) = &*self.device_status.read().expect("callback lock poisoned") {
      callback(device);
    }
    // send() only fails when nobody subscribed, which is fine.
    let _ = self.broadcast.send(ChainEvent::DeviceStatus(device.clone()));
  }

  pub fn fire_data_update(&self, updates: &UpdateList) {
    if let Some(callback) = &*self.data_update.read().expect("callback lock poisoned") {
      callback(updates);
    }
    let _ = self.broadcast.send(ChainEvent::DataUpdate(updates.clone()));
  }
}
