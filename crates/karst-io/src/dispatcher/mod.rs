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

//! The public dispatcher surface.
//!
//! [`ChunkDispatcher`] accepts chunk read requests from any thread, hands
//! them to a single dedicated worker, and delivers results through
//! completion callbacks or blocking [`ReadBatch::wait`] calls. Requests can
//! be submitted standalone or grouped into batches; within one batch,
//! completions are FIFO in submission order. Across batches and standalone
//! reads no ordering is guaranteed.

mod worker;

use crate::error::{DispatchError, DispatchResult};
use crate::event::EventQueue;
use crate::pool::SlotPool;
use crate::request::{Batch, BatchKey, ReadCallback, Request, RequestKey, RequestList};
use anyhow::Context;
use karst_core::io::MountEnvironment;
use karst_core::{ChunkBackend, ChunkBuffer, ChunkId, IoStatus, ReadOptions, StatusOr};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Everything guarded by the dispatcher's state mutex: the pooled request
/// and batch storage plus the *waiting* queue producers push into.
///
/// The *in-flight* queue is worker-local; only its intrusive links live in
/// `requests` and are therefore mutated under this lock as well.
pub(crate) struct DispatchState {
    pub(crate) requests: SlotPool<Request>,
    pub(crate) batches: SlotPool<Batch>,
    pub(crate) waiting: RequestList,
}

impl DispatchState {
    fn new() -> Self {
        Self {
            requests: SlotPool::new(),
            batches: SlotPool::new(),
            waiting: RequestList::new(),
        }
    }
}

/// State shared between the dispatcher handle, its worker thread, and
/// outstanding [`ReadBatch`]/[`ReadRequest`] handles.
pub(crate) struct DispatchShared {
    pub(crate) state: Mutex<DispatchState>,
    /// Signaled by the worker whenever requests reach a terminal status;
    /// pairs with the `state` mutex for [`ReadBatch::wait`].
    pub(crate) completed: Condvar,
    pub(crate) events: EventQueue,
    pub(crate) backend: Arc<dyn ChunkBackend>,
}

/// An asynchronous chunk-addressed I/O dispatcher.
///
/// Construction spawns the worker thread immediately; dropping the
/// dispatcher sends it a shutdown through the same queue that carries wakes
/// and joins it. In-flight requests run to completion or are abandoned at
/// shutdown; there is no cancellation at this layer.
pub struct ChunkDispatcher {
    shared: Arc<DispatchShared>,
    worker: Option<JoinHandle<()>>,
}

impl ChunkDispatcher {
    /// Creates a dispatcher over `backend` and starts its worker thread.
    pub fn new(backend: Arc<dyn ChunkBackend>) -> anyhow::Result<Self> {
        let shared = Arc::new(DispatchShared {
            state: Mutex::new(DispatchState::new()),
            completed: Condvar::new(),
            events: EventQueue::new(),
            backend,
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("karst-io".to_string())
            .spawn(move || worker::run(worker_shared))
            .context("failed to spawn chunk dispatcher worker thread")?;
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Mounts a chunk store. Pass-through to the backend; the request
    /// queues are not involved.
    pub fn mount(&self, environment: &MountEnvironment) -> IoStatus {
        let status = self.shared.backend.mount(environment);
        log::info!(
            "mounted chunk store {:?} (order {}): {status}",
            environment.path,
            environment.order
        );
        status
    }

    /// Submits a standalone read completed through `callback`.
    ///
    /// Non-blocking; returns immediately. The callback is invoked exactly
    /// once from the worker thread with either the bytes or the terminal
    /// status, after which the request is freed.
    pub fn read_with_callback<F>(&self, chunk_id: ChunkId, options: ReadOptions, callback: F)
    where
        F: FnOnce(StatusOr<ChunkBuffer>) + Send + 'static,
    {
        let callback: ReadCallback = Box::new(callback);
        {
            let mut state = self.shared.state.lock().unwrap();
            let key = RequestKey(
                state
                    .requests
                    .insert(Request::new(chunk_id, options, Some(callback), None)),
            );
            let DispatchState {
                requests, waiting, ..
            } = &mut *state;
            waiting.push_back(requests, key);
            log::trace!("submitted standalone read for {chunk_id}");
        }
        self.shared.events.notify();
    }

    /// Allocates an empty batch.
    pub fn new_batch(&self) -> ReadBatch {
        let key = {
            let mut state = self.shared.state.lock().unwrap();
            BatchKey(state.batches.insert(Batch::default()))
        };
        ReadBatch {
            shared: Arc::clone(&self.shared),
            key,
        }
    }

    /// Frees a batch and the requests it owns.
    ///
    /// Completed requests are reclaimed immediately, as is every request of
    /// a batch that was never issued. Requests still moving through the
    /// pipeline are disowned and reclaimed by the worker when they
    /// complete; their handles go stale either way.
    pub fn free_batch(&self, batch: ReadBatch) -> DispatchResult<()> {
        let mut state = self.shared.state.lock().unwrap();
        let record = state
            .batches
            .remove(batch.key.0)
            .ok_or(DispatchError::StaleBatch)?;
        for key in record.keys(&state.requests) {
            // An unissued batch's requests are in no queue, so the worker
            // would never see them; they must be reclaimed here.
            let reclaim = !record.issued
                || state
                    .requests
                    .get(key.0)
                    .map(|request| request.status.is_completed())
                    .unwrap_or(true);
            if reclaim {
                state.requests.remove(key.0);
            } else if let Some(request) = state.requests.get_mut(key.0) {
                request.owner = None;
            }
        }
        Ok(())
    }

    /// Synchronous existence query. Pass-through to the backend.
    pub fn does_chunk_exist(&self, chunk_id: &ChunkId) -> bool {
        self.shared.backend.does_chunk_exist(chunk_id)
    }

    /// Synchronous size query. Pass-through to the backend.
    pub fn get_size_for_chunk(&self, chunk_id: &ChunkId) -> StatusOr<u64> {
        self.shared.backend.get_size_for_chunk(chunk_id)
    }

    /// Releases idle pool memory. No-op while requests or batches are
    /// outstanding; intended for memory-pressure callers.
    pub fn trim_pools(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.requests.trim();
        state.batches.trim();
    }

    /// Number of requests currently alive in the pool (queued, in flight,
    /// or completed-but-batch-owned).
    pub fn live_request_count(&self) -> usize {
        self.shared.state.lock().unwrap().requests.live_count()
    }

    /// Number of batches currently alive in the pool.
    pub fn live_batch_count(&self) -> usize {
        self.shared.state.lock().unwrap().batches.live_count()
    }
}

impl Drop for ChunkDispatcher {
    fn drop(&mut self) {
        self.shared.events.request_shutdown();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("chunk dispatcher worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for ChunkDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDispatcher").finish_non_exhaustive()
    }
}

/// An ordered group of reads submitted and awaited as a unit.
///
/// Build it with [`ReadBatch::read`], submit with [`ReadBatch::issue`], then
/// either poll the returned [`ReadRequest`]s or block on
/// [`ReadBatch::wait`]. The batch owns its requests until it is freed via
/// [`ChunkDispatcher::free_batch`], so their terminal state stays
/// inspectable after completion.
pub struct ReadBatch {
    shared: Arc<DispatchShared>,
    key: BatchKey,
}

impl ReadBatch {
    /// Appends a read to the batch and returns its (non-owning) handle.
    ///
    /// Fails if the batch was freed or already issued.
    pub fn read(&self, chunk_id: ChunkId, options: ReadOptions) -> DispatchResult<ReadRequest> {
        let mut state = self.shared.state.lock().unwrap();
        let DispatchState {
            requests, batches, ..
        } = &mut *state;
        let batch = batches.get_mut(self.key.0).ok_or(DispatchError::StaleBatch)?;
        if batch.issued {
            return Err(DispatchError::BatchAlreadyIssued);
        }
        let key = RequestKey(requests.insert(Request::new(
            chunk_id,
            options,
            None,
            Some(self.key),
        )));
        batch.push(requests, key);
        Ok(ReadRequest {
            shared: Arc::clone(&self.shared),
            key,
        })
    }

    /// Submits the batch's requests to the worker as one contiguous run, in
    /// submission order. The batch is frozen afterwards.
    pub fn issue(&self) -> DispatchResult<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            let DispatchState {
                requests,
                batches,
                waiting,
            } = &mut *state;
            let batch = batches.get_mut(self.key.0).ok_or(DispatchError::StaleBatch)?;
            if batch.issued {
                return Err(DispatchError::BatchAlreadyIssued);
            }
            batch.issued = true;
            for key in batch.keys(requests) {
                waiting.push_back(requests, key);
            }
            log::trace!("issued batch of {} reads", batch.len);
        }
        self.shared.events.notify();
        Ok(())
    }

    /// Blocks the calling thread until every request in the batch reports a
    /// terminal status.
    ///
    /// Waiters sleep on a condition variable signaled by the worker; no
    /// cycles are spent polling. Waiting on a batch that was never issued
    /// is rejected, since it could never return.
    pub fn wait(&self) -> DispatchResult<()> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            let batch = state.batches.get(self.key.0).ok_or(DispatchError::StaleBatch)?;
            if !batch.issued {
                return Err(DispatchError::BatchNotIssued);
            }
            let all_completed = batch.keys(&state.requests).into_iter().all(|key| {
                state
                    .requests
                    .get(key.0)
                    .map(|request| request.status.is_completed())
                    .unwrap_or(true)
            });
            if all_completed {
                return Ok(());
            }
            state = self.shared.completed.wait(state).unwrap();
        }
    }

    /// Visits every request in submission order until `visit` returns
    /// `false`.
    pub fn for_each_request(
        &self,
        mut visit: impl FnMut(&ReadRequest) -> bool,
    ) -> DispatchResult<()> {
        let keys = {
            let state = self.shared.state.lock().unwrap();
            let batch = state.batches.get(self.key.0).ok_or(DispatchError::StaleBatch)?;
            batch.keys(&state.requests)
        };
        for key in keys {
            let handle = ReadRequest {
                shared: Arc::clone(&self.shared),
                key,
            };
            if !visit(&handle) {
                break;
            }
        }
        Ok(())
    }

    /// Cancellation is not implemented: in-flight requests always run to
    /// completion. The stub fails loudly instead of silently succeeding.
    pub fn cancel(&self) -> DispatchResult<()> {
        log::error!("ReadBatch::cancel is not implemented; requests will run to completion");
        Err(DispatchError::Unimplemented)
    }

    /// Number of requests in the batch.
    pub fn len(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state
            .batches
            .get(self.key.0)
            .map(|batch| batch.len as usize)
            .unwrap_or(0)
    }

    /// Returns `true` if the batch holds no requests (or was freed).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ReadBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBatch").field("key", &self.key).finish()
    }
}

/// A lightweight, non-owning handle to one read in a batch.
///
/// All accessors observe the request's current state: before completion they
/// report [`IoStatus::Unknown`] / an empty result, which is a caller
/// sequencing bug rather than a detected error. After the owning batch is
/// freed the handle goes stale and keeps reporting `Unknown`.
#[derive(Clone)]
pub struct ReadRequest {
    shared: Arc<DispatchShared>,
    key: RequestKey,
}

impl ReadRequest {
    /// Current status of the read. Stable once terminal.
    pub fn status(&self) -> IoStatus {
        let state = self.shared.state.lock().unwrap();
        state
            .requests
            .get(self.key.0)
            .map(|request| request.status)
            .unwrap_or(IoStatus::Unknown)
    }

    /// Returns `true` once the read completed successfully.
    pub fn is_ok(&self) -> bool {
        self.status().is_ok()
    }

    /// The chunk this read targets, or [`ChunkId::INVALID`] for a stale
    /// handle.
    pub fn chunk_id(&self) -> ChunkId {
        let state = self.shared.state.lock().unwrap();
        state
            .requests
            .get(self.key.0)
            .map(|request| request.chunk_id)
            .unwrap_or(ChunkId::INVALID)
    }

    /// The read's result: the buffer on success, the status otherwise.
    ///
    /// Idempotent after completion; the buffer is shared, not copied.
    pub fn get_result(&self) -> StatusOr<ChunkBuffer> {
        let state = self.shared.state.lock().unwrap();
        match state.requests.get(self.key.0) {
            Some(request) if request.status.is_ok() => match &request.result {
                Some(buffer) => StatusOr::Ok(buffer.clone()),
                None => StatusOr::Err(IoStatus::Unknown),
            },
            Some(request) => StatusOr::Err(request.status),
            None => StatusOr::Err(IoStatus::Unknown),
        }
    }
}

impl std::fmt::Debug for ReadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadRequest")
            .field("key", &self.key)
            .field("status", &self.status())
            .finish()
    }
}
