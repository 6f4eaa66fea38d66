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

use ahash::AHashMap;
use karst_core::io::{
    CompletedBlock, MountEnvironment, Resolution, ResolveRequest,
};
use karst_core::{ChunkBackend, ChunkId, IoStatus, StatusOr};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default transfer block size, in bytes.
const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
struct StoredChunk {
    data: Vec<u8>,
    /// Artificial completion delay for scheduling tests.
    delay: Option<Duration>,
    /// Injected failure carried by the chunk's first block.
    failure: Option<IoStatus>,
}

#[derive(Debug)]
struct PendingBlock {
    block: CompletedBlock,
    ready_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryInner {
    chunks: AHashMap<ChunkId, StoredChunk>,
    pending: VecDeque<PendingBlock>,
    mounts: Vec<MountEnvironment>,
}

/// An in-memory [`ChunkBackend`] over a `Mutex`-guarded chunk map.
///
/// Chunks are inserted programmatically; `mount` only records the
/// environment. Resolving a request splits the clamped byte range into
/// blocks of a configurable size and queues them for
/// [`poll_completed_block`](ChunkBackend::poll_completed_block), optionally
/// behind a per-chunk artificial delay or with a per-chunk injected
/// failure, so tests can exercise the dispatcher's scheduling against
/// out-of-order backend completion and failed transfers.
#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
    block_size: usize,
    polls: AtomicU64,
}

impl MemoryBackend {
    /// Creates an empty backend with the default block size.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Creates an empty backend splitting transfers into `block_size`-byte
    /// blocks.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            block_size: block_size.max(1),
            polls: AtomicU64::new(0),
        }
    }

    /// Inserts (or replaces) a chunk.
    pub fn insert_chunk(&self, chunk_id: ChunkId, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.chunks.insert(
            chunk_id,
            StoredChunk {
                data,
                delay: None,
                failure: None,
            },
        );
    }

    /// Delays every block of `chunk_id` by `delay` after resolution.
    pub fn set_chunk_delay(&self, chunk_id: &ChunkId, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(chunk) = inner.chunks.get_mut(chunk_id) {
            chunk.delay = Some(delay);
        }
    }

    /// Makes the first block of `chunk_id` complete with `status` instead
    /// of data. The chunk still resolves normally; the failure only
    /// surfaces at transfer time.
    pub fn set_chunk_failure(&self, chunk_id: &ChunkId, status: IoStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(chunk) = inner.chunks.get_mut(chunk_id) {
            chunk.failure = Some(status);
        }
    }

    /// Number of completion polls the dispatcher has issued so far.
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkBackend for MemoryBackend {
    fn mount(&self, environment: &MountEnvironment) -> IoStatus {
        let mut inner = self.inner.lock().unwrap();
        inner.mounts.push(environment.clone());
        IoStatus::Ok
    }

    fn resolve(&self, request: ResolveRequest) -> Resolution {
        let mut inner = self.inner.lock().unwrap();
        let Some(chunk) = inner.chunks.get(&request.chunk_id) else {
            return Resolution::NotFound;
        };
        let delay = chunk.delay;
        let failure = chunk.failure;
        let ready_at = match delay {
            Some(delay) => Instant::now() + delay,
            None => Instant::now(),
        };

        // Clamp the requested range to the chunk's actual length.
        let len = chunk.data.len() as u64;
        let start = request.options.offset.min(len);
        let end = start.saturating_add(request.options.size).min(len);
        let slice = chunk.data[start as usize..end as usize].to_vec();
        let size = slice.len();

        let mut scheduled = 0u32;
        for (index, piece) in slice.chunks(self.block_size).enumerate() {
            let payload = match failure {
                Some(status) if index == 0 => StatusOr::Err(status),
                _ => StatusOr::Ok(piece.to_vec()),
            };
            inner.pending.push_back(PendingBlock {
                block: CompletedBlock {
                    token: request.token,
                    offset: (index * self.block_size) as u64,
                    payload,
                },
                ready_at,
            });
            scheduled += 1;
        }
        if scheduled == 0 {
            // Empty range still surfaces exactly one (empty) block.
            inner.pending.push_back(PendingBlock {
                block: CompletedBlock {
                    token: request.token,
                    offset: 0,
                    payload: match failure {
                        Some(status) => StatusOr::Err(status),
                        None => StatusOr::Ok(Vec::new()),
                    },
                },
                ready_at,
            });
            scheduled = 1;
        }

        Resolution::Resolved {
            size: size as u64,
            blocks: scheduled,
        }
    }

    fn poll_completed_block(&self) -> Option<CompletedBlock> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        // Any ready block may surface, not just the oldest: completion
        // order across requests is deliberately unordered.
        let position = inner.pending.iter().position(|p| p.ready_at <= now)?;
        inner.pending.remove(position).map(|p| p.block)
    }

    fn does_chunk_exist(&self, chunk_id: &ChunkId) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.chunks.contains_key(chunk_id)
    }

    fn get_size_for_chunk(&self, chunk_id: &ChunkId) -> StatusOr<u64> {
        let inner = self.inner.lock().unwrap();
        match inner.chunks.get(chunk_id) {
            Some(chunk) => StatusOr::Ok(chunk.data.len() as u64),
            None => StatusOr::Err(IoStatus::NotFound),
        }
    }
}
