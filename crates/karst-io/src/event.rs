// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The cross-thread wake primitive the dispatcher worker sleeps on.
//!
//! Producers signal the queue after enqueuing work; the worker blocks on it
//! when idle. Shutdown travels through the same channel as wakes, so the
//! worker observes it at its next wake with no separate polled stop flag.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

/// A message delivered to the dispatcher worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerEvent {
    /// New work was enqueued.
    Wake,
    /// The dispatcher is shutting down; the worker must exit its loop.
    Shutdown,
}

/// The notify/wait channel between caller threads and the worker.
#[derive(Debug, Clone)]
pub(crate) struct EventQueue {
    sender: Sender<WorkerEvent>,
    receiver: Receiver<WorkerEvent>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Signals the worker that new work is available.
    ///
    /// A send failure means the worker is gone; submission paths treat that
    /// as a caller bug during teardown and only log it.
    pub(crate) fn notify(&self) {
        if self.sender.send(WorkerEvent::Wake).is_err() {
            log::error!("dispatcher worker is gone; wake dropped");
        }
    }

    /// Asks the worker to exit. Returns `false` if it already has.
    pub(crate) fn request_shutdown(&self) -> bool {
        self.sender.send(WorkerEvent::Shutdown).is_ok()
    }

    /// Blocks until an event arrives. A disconnected channel counts as
    /// shutdown.
    pub(crate) fn wait(&self) -> WorkerEvent {
        self.receiver.recv().unwrap_or(WorkerEvent::Shutdown)
    }

    /// Non-blocking drain of redundant wakes accumulated while the worker
    /// was busy. Returns `true` if a shutdown was observed.
    pub(crate) fn drain_pending(&self) -> bool {
        loop {
            match self.receiver.try_recv() {
                Ok(WorkerEvent::Wake) => continue,
                Ok(WorkerEvent::Shutdown) | Err(TryRecvError::Disconnected) => return true,
                Err(TryRecvError::Empty) => return false,
            }
        }
    }
}
