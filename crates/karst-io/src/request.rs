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

//! In-flight request and batch records.
//!
//! Both live in [`SlotPool`]s and reference each other exclusively through
//! generation-checked keys: a request's back-reference to its owning batch
//! is a relation, never ownership, and fails safely once the batch is gone.
//! Queue and batch membership are intrusive singly-linked lists storing the
//! *next key* in the pooled record itself, so pushing and popping never
//! allocate.

use crate::pool::{PoolKey, SlotPool};
use karst_core::io::RequestToken;
use karst_core::{ChunkBuffer, ChunkId, IoStatus, ReadOptions, StatusOr};

/// A completion callback, consumed on first (and only) invocation.
pub(crate) type ReadCallback = Box<dyn FnOnce(StatusOr<ChunkBuffer>) + Send + 'static>;

/// Generation-checked key of a pooled [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RequestKey(pub(crate) PoolKey);

/// Generation-checked key of a pooled [`Batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BatchKey(pub(crate) PoolKey);

impl RequestKey {
    /// Packs the key into the opaque token echoed back by the backend.
    pub(crate) fn to_token(self) -> RequestToken {
        RequestToken(((self.0.generation as u64) << 32) | self.0.index as u64)
    }

    /// Recovers a key from a backend token.
    pub(crate) fn from_token(token: RequestToken) -> Self {
        Self(PoolKey {
            index: token.0 as u32,
            generation: (token.0 >> 32) as u32,
        })
    }
}

/// One in-flight read operation.
///
/// Exclusively owned by the dispatcher until completion; afterwards either
/// freed immediately (standalone requests) or kept alive by its batch so the
/// caller can inspect the terminal state.
pub(crate) struct Request {
    pub(crate) chunk_id: ChunkId,
    pub(crate) options: ReadOptions,
    /// Transitions monotonically `Unknown -> (Pending ->)? terminal` and
    /// never regresses.
    pub(crate) status: IoStatus,
    /// Bytes under assembly while backend blocks arrive.
    pub(crate) assembly: Vec<u8>,
    /// Frozen result, populated only on success.
    pub(crate) result: Option<ChunkBuffer>,
    /// First failure reported by a backend block, applied when the request
    /// completes.
    pub(crate) failure: Option<IoStatus>,
    /// Backend blocks still outstanding for this request.
    pub(crate) unfinished_blocks: u32,
    pub(crate) callback: Option<ReadCallback>,
    /// Owning batch, as a relation: the request never keeps a batch alive.
    pub(crate) owner: Option<BatchKey>,
    /// Link for the waiting / in-flight queue (at most one at a time).
    pub(crate) queue_next: Option<RequestKey>,
    /// Link for the owning batch's request list.
    pub(crate) batch_next: Option<RequestKey>,
}

impl Request {
    pub(crate) fn new(
        chunk_id: ChunkId,
        options: ReadOptions,
        callback: Option<ReadCallback>,
        owner: Option<BatchKey>,
    ) -> Self {
        Self {
            chunk_id,
            options,
            status: IoStatus::Unknown,
            assembly: Vec::new(),
            result: None,
            failure: None,
            unfinished_blocks: 0,
            callback,
            owner,
            queue_next: None,
            batch_next: None,
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("chunk_id", &self.chunk_id)
            .field("status", &self.status)
            .field("unfinished_blocks", &self.unfinished_blocks)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// An ordered group of requests created, issued, and waited on as a unit.
///
/// The batch owns its requests: freeing it reclaims every request it still
/// holds. `head`/`tail` thread the requests in submission order through
/// their `batch_next` links.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    pub(crate) head: Option<RequestKey>,
    pub(crate) tail: Option<RequestKey>,
    pub(crate) len: u32,
    pub(crate) issued: bool,
}

impl Batch {
    /// Appends a request to the batch list, preserving submission order.
    pub(crate) fn push(&mut self, pool: &mut SlotPool<Request>, key: RequestKey) {
        match self.tail {
            Some(tail) => {
                if let Some(prev) = pool.get_mut(tail.0) {
                    prev.batch_next = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.len += 1;
    }

    /// Collects the batch's request keys in submission order.
    pub(crate) fn keys(&self, pool: &SlotPool<Request>) -> Vec<RequestKey> {
        let mut keys = Vec::with_capacity(self.len as usize);
        let mut cursor = self.head;
        while let Some(key) = cursor {
            keys.push(key);
            cursor = pool.get(key.0).and_then(|request| request.batch_next);
        }
        keys
    }
}

/// Head/tail of an intrusive FIFO of requests, linked through `queue_next`.
///
/// Used for both the *waiting* queue (shared with producers) and the
/// worker-local *in-flight* queue.
#[derive(Debug, Default)]
pub(crate) struct RequestList {
    head: Option<RequestKey>,
    tail: Option<RequestKey>,
}

impl RequestList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Key of the front request without removing it.
    pub(crate) fn front(&self) -> Option<RequestKey> {
        self.head
    }

    /// Appends a request at the tail.
    pub(crate) fn push_back(&mut self, pool: &mut SlotPool<Request>, key: RequestKey) {
        if let Some(request) = pool.get_mut(key.0) {
            request.queue_next = None;
        }
        match self.tail {
            Some(tail) => {
                if let Some(prev) = pool.get_mut(tail.0) {
                    prev.queue_next = Some(key);
                }
            }
            None => self.head = Some(key),
        }
        self.tail = Some(key);
    }

    /// Pops the front request, clearing its link.
    pub(crate) fn pop_front(&mut self, pool: &mut SlotPool<Request>) -> Option<RequestKey> {
        let key = self.head?;
        let next = pool.get_mut(key.0).and_then(|request| request.queue_next.take());
        self.head = next;
        if self.head.is_none() {
            self.tail = None;
        }
        Some(key)
    }

    /// Detaches the whole list, leaving this one empty.
    pub(crate) fn take_all(&mut self) -> RequestList {
        RequestList {
            head: self.head.take(),
            tail: self.tail.take(),
        }
    }
}
