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

//! The contract between the dispatcher and a chunk store.
//!
//! A backend maps [`ChunkId`]s to bytes. How it does so (archive files,
//! loose files, a network store) is outside this crate: the dispatcher only
//! asks it to resolve requests and to report the low-level block transfers
//! it has finished.

use crate::chunk::ChunkId;
use crate::io::{IoStatus, ReadOptions, StatusOr};
use std::fmt::Debug;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Describes a chunk store to be mounted into a backend.
///
/// `order` ranks stores when several are mounted: a chunk found in a
/// higher-order store shadows the same chunk in a lower-order one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEnvironment {
    /// Location of the store (interpretation is backend-specific).
    pub path: PathBuf,
    /// Mount priority; higher values are consulted first.
    pub order: i32,
}

impl MountEnvironment {
    /// Creates an environment for `path` with the given priority.
    pub fn new(path: impl Into<PathBuf>, order: i32) -> Self {
        Self {
            path: path.into(),
            order,
        }
    }
}

/// An opaque handle identifying one in-flight request across the backend
/// boundary.
///
/// Minted by the dispatcher when it resolves a request; the backend echoes
/// it back on every [`CompletedBlock`] belonging to that request and never
/// interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(
    /// Raw token bits; meaningful only to the dispatcher that minted them.
    pub u64,
);

/// One read request handed to [`ChunkBackend::resolve`].
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    /// Token the backend must attach to every completed block of this read.
    pub token: RequestToken,
    /// The chunk to read.
    pub chunk_id: ChunkId,
    /// The byte range to read within the chunk.
    pub options: ReadOptions,
}

/// The outcome of resolving a request against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The chunk is not present; no transfer was scheduled.
    NotFound,
    /// The chunk is present and transfers were scheduled.
    Resolved {
        /// Total number of bytes the request will produce (range already
        /// clamped to the chunk's length).
        size: u64,
        /// Number of low-level blocks the transfer was split into. Each will
        /// surface exactly once as a [`CompletedBlock`].
        blocks: u32,
    },
}

/// One finished low-level transfer reported by the backend.
#[derive(Debug)]
pub struct CompletedBlock {
    /// Token of the request this block belongs to.
    pub token: RequestToken,
    /// Byte offset of this block within the request's result buffer.
    pub offset: u64,
    /// The block's bytes, or the status describing why the transfer failed.
    /// A single failed block fails the whole request.
    pub payload: StatusOr<Vec<u8>>,
}

/// A store of chunks the dispatcher reads from.
///
/// Methods take `&self`; implementations provide their own interior
/// synchronization, since the dispatcher worker and arbitrary caller threads
/// (via mount/existence queries) use the backend concurrently.
pub trait ChunkBackend: Send + Sync + Debug + 'static {
    /// Mounts a chunk store described by `environment`.
    fn mount(&self, environment: &MountEnvironment) -> IoStatus;

    /// Resolves a request against the store, scheduling its transfers.
    ///
    /// A `NotFound` resolution must not schedule anything: the dispatcher
    /// completes such requests without ever polling for their blocks.
    fn resolve(&self, request: ResolveRequest) -> Resolution;

    /// Drains one finished transfer, if any is ready.
    fn poll_completed_block(&self) -> Option<CompletedBlock>;

    /// Blocks up to `timeout` for a finished transfer.
    ///
    /// The default implementation polls with a short sleep; backends with a
    /// real completion signal should override it.
    fn wait_for_completed_block(&self, timeout: Duration) -> Option<CompletedBlock> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(block) = self.poll_completed_block() {
                return Some(block);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_micros(100));
        }
    }

    /// Returns `true` if the chunk exists in any mounted store.
    fn does_chunk_exist(&self, chunk_id: &ChunkId) -> bool;

    /// Returns the logical size of the chunk's data, or the status
    /// describing why it is unavailable.
    fn get_size_for_chunk(&self, chunk_id: &ChunkId) -> StatusOr<u64>;
}
