// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Request/response coordination.
//!
//! All devices share one serial line, so caller-initiated frames are
//! serialised through a bounded queue: at most one request sits in the queue,
//! the scheduler drains at most one per request sub-slot, and the caller
//! blocks until its frame actually went out. Descriptor round-trips use a
//! counting signal the scheduler waits on with an absolute deadline.

use controlchain_core::errors::{ControlChainError, ControlChainResult};
use controlchain_core::Frame;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// One caller frame waiting for a request window. `done` fires once the
/// frame is on the wire (or is dropped on shutdown).
pub(crate) struct ChainRequest {
  pub frame: Frame,
  pub done: oneshot::Sender<()>,
}

/// Caller-side handle of the request queue.
#[derive(Clone)]
pub(crate) struct RequestQueue {
  sender: mpsc::Sender<ChainRequest>,
}

impl RequestQueue {
  /// Enqueue a frame and block until the scheduler dispatches it. Aborts
  /// with `Shutdown` when the engine is going down.
  pub fn submit(&self, frame: Frame) -> ControlChainResult<()> {
    let (done, dispatched) = oneshot::channel();
    self
      .sender
      .blocking_send(ChainRequest { frame, done })
      .map_err(|_| ControlChainError::Shutdown)?;
    dispatched
      .blocking_recv()
      .map_err(|_| ControlChainError::Shutdown)
  }
}

/// Capacity 1: one request in flight, the next caller waits its turn.
pub(crate) fn request_channel() -> (RequestQueue, mpsc::Receiver<ChainRequest>) {
  let (sender, receiver) = mpsc::channel(1);
  (RequestQueue { sender }, receiver)
}

/// Counting signal the scheduler blocks on while waiting for a descriptor
/// reply. Waits use an absolute deadline so spurious wakeups just retry.
#[derive(Default)]
pub(crate) struct ResponseSignal {
  pending: Mutex<u32>,
  condvar: Condvar,
}

impl ResponseSignal {
  /// Discard stale notifications before sending a new request.
  pub fn arm(&self) {
    *self.pending.lock().expect("response signal poisoned") = 0;
  }

  /// Called by the receiver when a reply frame arrives.
  pub fn notify(&self) {
    let mut pending = self.pending.lock().expect("response signal poisoned");
    *pending += 1;
    self.condvar.notify_one();
  }

  /// Wait for a notification, up to `timeout`. Returns false on deadline.
  pub fn wait(&self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut pending = self.pending.lock().expect("response signal poisoned");
    loop {
      if *pending > 0 {
        *pending -= 1;
        return true;
      }
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      let (guard, _) = self
        .condvar
        .wait_timeout(pending, deadline - now)
        .expect("response signal poisoned");
      pending = guard;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use controlchain_core::message::Command;
  use std::sync::Arc;
  use std::thread;

  fn frame(tag: u8) -> Frame {
    Frame::new(1, Command::Unassignment, vec![tag])
  }

  #[test]
  fn submit_blocks_until_dispatched() {
    let (queue, mut receiver) = request_channel();
    let worker = thread::spawn(move || queue.submit(frame(7)));

    // Scheduler side: take the request and acknowledge dispatch.
    let request = receiver.blocking_recv().unwrap();
    assert_eq!(request.frame.data(), &[7]);
    request.done.send(()).unwrap();
    assert!(worker.join().unwrap().is_ok());
  }

  #[test]
  fn concurrent_callers_are_serialised() {
    let (queue, mut receiver) = request_channel();
    let first = {
      let queue = queue.clone();
      thread::spawn(move || queue.submit(frame(1)))
    };
    // Let the first request occupy the single queue slot before the second
    // caller shows up and parks in the bounded send.
    thread::sleep(Duration::from_millis(30));
    let second = {
      let queue = queue.clone();
      thread::spawn(move || queue.submit(frame(2)))
    };
    thread::sleep(Duration::from_millis(30));

    // The scheduler drains one request per window, in arrival order.
    let request = receiver.blocking_recv().unwrap();
    assert_eq!(request.frame.data(), &[1]);
    request.done.send(()).unwrap();
    let request = receiver.blocking_recv().unwrap();
    assert_eq!(request.frame.data(), &[2]);
    request.done.send(()).unwrap();

    assert!(first.join().unwrap().is_ok());
    assert!(second.join().unwrap().is_ok());
  }

  #[test]
  fn shutdown_aborts_blocked_callers() {
    let (queue, receiver) = request_channel();
    let worker = thread::spawn(move || queue.submit(frame(3)));
    // Dropping the scheduler side closes the queue.
    drop(receiver);
    assert!(matches!(
      worker.join().unwrap(),
      Err(ControlChainError::Shutdown)
    ));
  }

  #[test]
  fn response_signal_round_trip() {
    let signal = Arc::new(ResponseSignal::default());
    signal.arm();
    let notifier = {
      let signal = signal.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        signal.notify();
      })
    };
    assert!(signal.wait(Duration::from_millis(500)));
    notifier.join().unwrap();
  }

  #[test]
  fn response_signal_times_out() {
    let signal = ResponseSignal::default();
    let start = Instant::now();
    assert!(!signal.wait(Duration::from_millis(30)));
    assert!(start.elapsed() >= Duration::from_millis(30));
  }

  #[test]
  fn arm_discards_stale_notifications() {
    let signal = ResponseSignal::default();
    signal.notify();
    signal.arm();
    assert!(!signal.wait(Duration::from_millis(10)));
  }
}
