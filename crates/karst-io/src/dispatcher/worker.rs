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

//! The dispatcher's single worker thread.
//!
//! The worker owns all queue mutation after the hand-off point: it drains
//! the *waiting* queue producers push into, resolves each request against
//! the backend, tracks resolved requests in a worker-local *in-flight*
//! queue, and completes them head-first as the backend reports their block
//! transfers done. Head-first completion is what gives batches their FIFO
//! completion guarantee.
//!
//! The worker blocks on the event queue only when both queues are empty;
//! with transfers in flight it waits on the backend with a short bound so
//! new submissions and shutdown stay responsive.

use super::{DispatchShared, DispatchState};
use crate::event::WorkerEvent;
use crate::request::{ReadCallback, RequestKey, RequestList};
use karst_core::io::{CompletedBlock, Resolution, ResolveRequest};
use karst_core::{ChunkBuffer, IoStatus, StatusOr};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on one backend completion wait while transfers are in
/// flight.
const BACKEND_WAIT: Duration = Duration::from_millis(1);

/// Runs the worker loop until shutdown is observed on the event queue.
pub(crate) fn run(shared: Arc<DispatchShared>) {
    log::info!("chunk dispatcher worker started");
    let mut in_flight = RequestList::new();

    loop {
        let idle = in_flight.is_empty() && shared.state.lock().unwrap().waiting.is_empty();
        if idle {
            match shared.events.wait() {
                WorkerEvent::Shutdown => break,
                WorkerEvent::Wake => {}
            }
        } else if shared.events.drain_pending() {
            break;
        }

        resolve_incoming(&shared, &mut in_flight);
        // Poll only while transfers are outstanding: a not-found resolution
        // must complete without the backend's block machinery ever running.
        if !in_flight.is_empty() {
            while let Some(block) = shared.backend.poll_completed_block() {
                apply_block(&shared, block);
            }
        }
        complete_ready(&shared, &mut in_flight);

        if !in_flight.is_empty() {
            if let Some(block) = shared.backend.wait_for_completed_block(BACKEND_WAIT) {
                apply_block(&shared, block);
                complete_ready(&shared, &mut in_flight);
            }
        }
    }

    log::info!("chunk dispatcher worker stopped");
}

/// Drains the waiting queue and resolves each request in submission order.
///
/// Requests the backend cannot find complete immediately with `NotFound`
/// and never enter the in-flight queue. After each resolution the backend
/// is polled for blocks finished so far, bounding in-flight growth under
/// sustained load.
fn resolve_incoming(shared: &Arc<DispatchShared>, in_flight: &mut RequestList) {
    // Swap the queue out quickly so producers are not held up.
    let mut incoming = {
        let mut state = shared.state.lock().unwrap();
        state.waiting.take_all()
    };

    loop {
        let Some((key, resolve)) = pop_resolvable(shared, &mut incoming) else {
            break;
        };
        match shared.backend.resolve(resolve) {
            Resolution::NotFound => {
                log::trace!("chunk not found for request {key:?}");
                complete_unresolved(shared, key, IoStatus::NotFound);
            }
            Resolution::Resolved { size, blocks } => {
                let mut state = shared.state.lock().unwrap();
                if let Some(request) = state.requests.get_mut(key.0) {
                    request.assembly = vec![0; size as usize];
                    request.unfinished_blocks = blocks;
                    request.status = IoStatus::Pending;
                }
                let DispatchState { requests, .. } = &mut *state;
                in_flight.push_back(requests, key);
            }
        }
        if !in_flight.is_empty() {
            while let Some(block) = shared.backend.poll_completed_block() {
                apply_block(shared, block);
            }
        }
    }
}

/// Pops the next waiting request and snapshots what the backend needs to
/// resolve it. Stale entries (request freed while queued) are skipped.
fn pop_resolvable(
    shared: &Arc<DispatchShared>,
    incoming: &mut RequestList,
) -> Option<(RequestKey, ResolveRequest)> {
    let mut state = shared.state.lock().unwrap();
    loop {
        let key = incoming.pop_front(&mut state.requests)?;
        if let Some(request) = state.requests.get(key.0) {
            return Some((
                key,
                ResolveRequest {
                    token: key.to_token(),
                    chunk_id: request.chunk_id,
                    options: request.options,
                },
            ));
        }
    }
}

/// Routes one finished backend block into its request: copies the bytes
/// into the assembly buffer (or records the failure) and decrements the
/// outstanding-block count.
fn apply_block(shared: &Arc<DispatchShared>, block: CompletedBlock) {
    let key = RequestKey::from_token(block.token);
    let mut state = shared.state.lock().unwrap();
    let Some(request) = state.requests.get_mut(key.0) else {
        log::error!("backend reported a block for an unknown request token");
        return;
    };
    match block.payload {
        StatusOr::Ok(data) => {
            let start = block.offset as usize;
            let end = start.saturating_add(data.len());
            if end <= request.assembly.len() {
                request.assembly[start..end].copy_from_slice(&data);
            } else if request.failure.is_none() {
                log::error!("backend block exceeds the resolved request size");
                request.failure = Some(IoStatus::ReadError);
            }
        }
        StatusOr::Err(status) => {
            // First failure wins; the whole request fails.
            if request.failure.is_none() {
                request.failure = Some(status);
            }
        }
    }
    request.unfinished_blocks = request.unfinished_blocks.saturating_sub(1);
}

/// Pops completed requests off the in-flight head, in order, finalizing
/// each one. Stops at the first request that still has outstanding blocks,
/// which is what keeps per-batch completion FIFO.
fn complete_ready(shared: &Arc<DispatchShared>, in_flight: &mut RequestList) {
    loop {
        let finished = {
            let mut state = shared.state.lock().unwrap();
            let Some(head) = in_flight.front() else {
                break;
            };
            let ready = state
                .requests
                .get(head.0)
                .map(|request| request.unfinished_blocks == 0)
                .unwrap_or(true);
            if !ready {
                break;
            }
            in_flight.pop_front(&mut state.requests);
            finalize_locked(&mut state, head)
        };
        deliver(shared, finished);
    }
}

/// Completes a request that never reached the in-flight queue (resolution
/// already produced its terminal status).
fn complete_unresolved(shared: &Arc<DispatchShared>, key: RequestKey, status: IoStatus) {
    let finished = {
        let mut state = shared.state.lock().unwrap();
        if let Some(request) = state.requests.get_mut(key.0) {
            request.failure = Some(status);
        }
        finalize_locked(&mut state, key)
    };
    deliver(shared, finished);
}

/// Freezes a request's terminal state and detaches its callback.
///
/// The request is freed here unless a live batch still owns it; batched
/// requests stay in the pool so callers can inspect them until the batch is
/// freed. Returns what must happen outside the lock.
fn finalize_locked(
    state: &mut DispatchState,
    key: RequestKey,
) -> Option<(Option<ReadCallback>, StatusOr<ChunkBuffer>)> {
    let DispatchState {
        requests, batches, ..
    } = state;
    let request = requests.get_mut(key.0)?;
    let status = request.failure.take().unwrap_or(IoStatus::Ok);
    request.status = status;
    let payload = if status.is_ok() {
        let buffer = ChunkBuffer::from_vec(std::mem::take(&mut request.assembly));
        request.result = Some(buffer.clone());
        StatusOr::Ok(buffer)
    } else {
        // Partial data from a failed transfer is never exposed.
        request.assembly = Vec::new();
        StatusOr::Err(status)
    };
    let callback = request.callback.take();
    let owned = request
        .owner
        .is_some_and(|owner| batches.get(owner.0).is_some());
    if !owned {
        requests.remove(key.0);
    }
    Some((callback, payload))
}

/// Runs the completion callback outside the lock and wakes batch waiters.
fn deliver(
    shared: &Arc<DispatchShared>,
    finished: Option<(Option<ReadCallback>, StatusOr<ChunkBuffer>)>,
) {
    let Some((callback, payload)) = finished else {
        return;
    };
    log::trace!("request completed with status {}", payload.status());
    if let Some(callback) = callback {
        callback(payload);
    }
    shared.completed.notify_all();
}
