// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Master-side engine for the Control Chain serial bus.
//!
//! The engine drives a single half-duplex serial line shared by up to eight
//! daisy-chained controller devices. Three execution contexts cooperate per
//! handle:
//!
//! - a **receiver** thread blocks on timed serial reads, reassembles frames,
//!   and mutates the chain state (admissions, descriptors, value updates);
//! - a **scheduler** thread paces the 10 ms chain-sync cadence, ages devices,
//!   fetches missing descriptors, and opens the per-cycle request window in
//!   which one pending caller frame is flushed;
//! - any number of **caller** threads use [`ControlChainMaster`] to push
//!   assignments, set values, and query devices.
//!
//! All registries sit behind one coarse lock; the serial line is protected by
//! a send lock so frames never interleave. Consumers observe the chain either
//! through registered callbacks (invoked on the receiver/scheduler threads —
//! do not call back into the engine from inside them) or through the
//! re-entrancy-safe [`ControlChainMaster::event_stream`].
//!
//! ## Getting started
//!
//! ```no_run
//! use controlchain_master::ControlChainMaster;
//!
//! let master = ControlChainMaster::open("/dev/ttyUSB0", 115_200).unwrap();
//! master.set_device_status_callback(|device| {
//!   println!("device {} is now {}", device.id(), device.status());
//! });
//! ```

mod assignment;
mod chain;
mod debug;
mod device;
mod event;
mod handle;
mod receiver;
mod request;
mod scheduler;
mod serial;

pub use assignment::{Assignment, AssignmentBuilder, AssignmentKey, SetValue};
pub use controlchain_core::message::{AssignmentMode, OptionItem, Update, UpdateList};
pub use controlchain_core::{ControlChainError, ControlChainResult};
pub use device::{Actuator, ActuatorGroup, Device, DeviceFilter, DeviceStatus};
pub use event::ChainEvent;
pub use handle::ControlChainMaster;
