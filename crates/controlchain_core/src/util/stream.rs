// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use futures::Stream;
use tokio::sync::broadcast;

/// Adapt a broadcast receiver into a `Stream`, dropping lag errors. Slow
/// consumers lose old events rather than stalling the sender.
pub fn convert_broadcast_receiver_to_stream<T>(
  mut receiver: broadcast::Receiver<T>,
) -> impl Stream<Item = T>
where
  T: Clone + Send + 'static,
{
  async_stream::stream! {
    loop {
      match receiver.recv().await {
        Ok(item) => yield item,
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          tracing::warn!("Event stream lagged, {} events dropped", skipped);
          continue;
        }
        Err(broadcast::error::RecvError::Closed) => break,
      }
    }
  }
}
