// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Serial port lifecycle and hot-plug recovery.
//!
//! Opening tolerates everything a USB serial adapter can throw at us: the
//! device node not existing yet (poll once a second, forever), udev symlinks
//! that appear before their permissions do (chase with bounded retries), and
//! Arduino-style bootloaders that eat bytes for a few seconds after open.
//!
//! During operation a failed write (`EIO` when the adapter is yanked) drops
//! the port and clears the enabled flag; the receiver re-runs the open
//! sequence before its next read cycle, and the scheduler broadcasts a setup
//! sync once the line is back.

use controlchain_core::errors::{ControlChainError, ControlChainResult};
use controlchain_core::timing::SYNC_READ_DEADLINE;
use controlchain_core::Frame;
use serialport::{FlowControl, SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PATH_POLL_INTERVAL: Duration = Duration::from_secs(1);
const PERMISSION_RETRIES: u32 = 10;
const PERMISSION_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const BOOTLOADER_SETTLE: Duration = Duration::from_secs(3);

pub(crate) enum ReadOutcome {
  Full,
  TimedOut,
  Down,
}

pub(crate) struct SerialController {
  path: String,
  baud_rate: u32,
  /// Writer handle doubles as the send lock: one frame on the wire at a time.
  writer: Mutex<Option<Box<dyn SerialPort>>>,
  /// Reader handle, only ever touched by the receiver thread.
  reader: Mutex<Option<Box<dyn SerialPort>>>,
  enabled: AtomicBool,
  needs_setup: AtomicBool,
}

impl SerialController {
  pub fn new(path: &str, baud_rate: u32) -> Self {
    Self {
      path: path.to_owned(),
      baud_rate,
      writer: Mutex::new(None),
      reader: Mutex::new(None),
      enabled: AtomicBool::new(false),
      needs_setup: AtomicBool::new(false),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled.load(Ordering::Acquire)
  }

  /// True once per reopen: the scheduler turns it into a setup sync.
  pub fn take_needs_setup(&self) -> bool {
    self.needs_setup.swap(false, Ordering::AcqRel)
  }

  /// Run the open sequence and install fresh reader/writer handles.
  pub fn connect(&self, cancel: &CancellationToken) -> ControlChainResult<()> {
    let port = self.open_port(cancel)?;
    let reader = port.try_clone().map_err(|err| {
      ControlChainError::SerialUnavailable(format!("cannot clone port handle: {err}"))
    })?;
    *self.writer.lock().expect("serial writer lock poisoned") = Some(port);
    *self.reader.lock().expect("serial reader lock poisoned") = Some(reader);
    self.enabled.store(true, Ordering::Release);
    self.needs_setup.store(true, Ordering::Release);
    info!("Serial port {} up at {} baud", self.path, self.baud_rate);
    Ok(())
  }

  fn open_port(&self, cancel: &CancellationToken) -> ControlChainResult<Box<dyn SerialPort>> {
    // Wait for the device node. Unplugged at startup is not an error, the
    // pedal may simply not be powered yet.
    let target = loop {
      if cancel.is_cancelled() {
        return Err(ControlChainError::Shutdown);
      }
      match std::fs::symlink_metadata(&self.path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
          break self.resolve_symlink(cancel)?;
        }
        Ok(_) => break PathBuf::from(&self.path),
        Err(err) if err.kind() == ErrorKind::NotFound => {
          std::thread::sleep(PATH_POLL_INTERVAL);
        }
        Err(err) => {
          return Err(ControlChainError::SerialUnavailable(format!(
            "{}: {err}",
            self.path
          )));
        }
      }
    };

    let mut permission_attempts = 0;
    let port = loop {
      if cancel.is_cancelled() {
        return Err(ControlChainError::Shutdown);
      }
      match serialport::new(target.to_string_lossy(), self.baud_rate)
        .flow_control(FlowControl::None)
        .timeout(SYNC_READ_DEADLINE)
        .open()
      {
        Ok(port) => break port,
        Err(err) if is_permission_error(&err) && permission_attempts < PERMISSION_RETRIES => {
          // udev grants group access a beat after the node appears
          permission_attempts += 1;
          std::thread::sleep(PERMISSION_RETRY_INTERVAL);
        }
        Err(err) => {
          return Err(ControlChainError::SerialUnavailable(format!(
            "{}: {err}",
            target.display()
          )));
        }
      }
    };

    if self.is_arduino(&target) {
      debug!("Arduino adapter detected, waiting for the bootloader to settle");
      std::thread::sleep(BOOTLOADER_SETTLE);
    }
    Ok(port)
  }

  fn resolve_symlink(&self, cancel: &CancellationToken) -> ControlChainResult<PathBuf> {
    let mut attempts = 0;
    loop {
      if cancel.is_cancelled() {
        return Err(ControlChainError::Shutdown);
      }
      match std::fs::canonicalize(&self.path) {
        Ok(target) => return Ok(target),
        Err(err)
          if err.kind() == ErrorKind::PermissionDenied && attempts < PERMISSION_RETRIES =>
        {
          attempts += 1;
          std::thread::sleep(PERMISSION_RETRY_INTERVAL);
        }
        Err(err) => {
          return Err(ControlChainError::SerialUnavailable(format!(
            "{}: {err}",
            self.path
          )));
        }
      }
    }
  }

  fn is_arduino(&self, target: &Path) -> bool {
    let Ok(ports) = serialport::available_ports() else {
      return false;
    };
    let target = target.to_string_lossy();
    ports.iter().any(|info| {
      info.port_name == target
        && matches!(
          &info.port_type,
          SerialPortType::UsbPort(usb)
            if usb.manufacturer.as_deref().is_some_and(|m| m.contains("Arduino"))
        )
    })
  }

  /// Encode and write a frame under the send lock. A failed write (`EIO`
  /// after an unplug) takes the line down instead of erroring the chain.
  pub fn write_frame(&self, frame: &Frame) -> ControlChainResult<()> {
    if !self.is_enabled() {
      return Err(ControlChainError::SerialDisabled);
    }
    crate::debug::trace_frame("SEND", frame);
    let wire = frame.encode();
    let mut writer = self.writer.lock().expect("serial writer lock poisoned");
    let Some(port) = writer.as_mut() else {
      return Err(ControlChainError::SerialDisabled);
    };
    match port.write_all(&wire) {
      Ok(()) => Ok(()),
      Err(err) => {
        warn!("Serial write failed ({err}), disabling port until it returns");
        *writer = None;
        self.enabled.store(false, Ordering::Release);
        Err(ControlChainError::SerialDisabled)
      }
    }
  }

  /// Read exactly `buf.len()` bytes within `deadline`. Partial reads keep
  /// going until the deadline elapses; any hard error takes the line down.
  pub fn read_exact_deadline(&self, buf: &mut [u8], deadline: Duration) -> ReadOutcome {
    let mut reader = self.reader.lock().expect("serial reader lock poisoned");
    let Some(port) = reader.as_mut() else {
      return ReadOutcome::Down;
    };
    let until = Instant::now() + deadline;
    let mut filled = 0;
    while filled < buf.len() {
      let remaining = until.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return ReadOutcome::TimedOut;
      }
      let _ = port.set_timeout(remaining);
      match port.read(&mut buf[filled..]) {
        Ok(0) => {
          *reader = None;
          self.enabled.store(false, Ordering::Release);
          return ReadOutcome::Down;
        }
        Ok(n) => filled += n,
        Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
          return ReadOutcome::TimedOut;
        }
        Err(err) if err.kind() == ErrorKind::Interrupted => continue,
        Err(err) => {
          warn!("Serial read failed ({err}), disabling port until it returns");
          *reader = None;
          self.enabled.store(false, Ordering::Release);
          return ReadOutcome::Down;
        }
      }
    }
    ReadOutcome::Full
  }

  /// Drop the reader handle after the writer side detected an unplug, so
  /// the next `connect` starts from a clean slate.
  pub fn drop_reader(&self) {
    *self.reader.lock().expect("serial reader lock poisoned") = None;
  }
}

fn is_permission_error(err: &serialport::Error) -> bool {
  matches!(err.kind(), serialport::ErrorKind::Io(ErrorKind::PermissionDenied))
}
