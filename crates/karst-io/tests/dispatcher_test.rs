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

use anyhow::Result;
use karst_core::io::MountEnvironment;
use karst_core::{ChunkId, IoStatus, ReadOptions};
use karst_io::backend::MemoryBackend;
use karst_io::{ChunkDispatcher, DispatchError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn chunk(byte: u8) -> ChunkId {
    ChunkId::from_bytes([byte; 12])
}

fn dispatcher_with(
    chunks: &[(u8, Vec<u8>)],
) -> Result<(ChunkDispatcher, Arc<MemoryBackend>)> {
    let backend = Arc::new(MemoryBackend::new());
    for (byte, data) in chunks {
        backend.insert_chunk(chunk(*byte), data.clone());
    }
    let dispatcher = ChunkDispatcher::new(backend.clone())?;
    Ok((dispatcher, backend))
}

#[test]
fn present_chunk_is_delivered_exactly_once() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(1, vec![1, 2, 3, 4])])?;

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_callback = calls.clone();
    let (tx, rx) = crossbeam_channel::bounded(1);
    dispatcher.read_with_callback(chunk(1), ReadOptions::whole_chunk(), move |result| {
        calls_in_callback.fetch_add(1, Ordering::SeqCst);
        tx.send(result).unwrap();
    });

    let result = rx.recv_timeout(Duration::from_secs(5))?;
    assert!(result.is_ok());
    assert_eq!(result.status(), IoStatus::Ok);
    assert_eq!(&*result.ok().unwrap(), &[1, 2, 3, 4]);

    // Give a buggy double-invocation a chance to show up.
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn absent_chunk_reports_not_found_without_block_polling() -> Result<()> {
    let (dispatcher, backend) = dispatcher_with(&[])?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    dispatcher.read_with_callback(chunk(2), ReadOptions::whole_chunk(), move |result| {
        tx.send(result.status()).unwrap();
    });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, IoStatus::NotFound);
    assert_eq!(
        backend.poll_count(),
        0,
        "a not-found read must never reach the block completion machinery"
    );
    Ok(())
}

#[test]
fn ranged_read_returns_the_requested_window() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(3, (0..32).collect())])?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    dispatcher.read_with_callback(chunk(3), ReadOptions::range(8, 4), move |result| {
        tx.send(result).unwrap();
    });

    let result = rx.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(&*result.ok().unwrap(), &[8, 9, 10, 11]);
    Ok(())
}

#[test]
fn standalone_reads_complete_in_submission_order() -> Result<()> {
    let (dispatcher, backend) = dispatcher_with(&[
        (10, vec![b'a']),
        (11, vec![b'b']),
        (12, vec![b'c']),
    ])?;
    // The first submission finishes its transfer last; completion must
    // still come back in submission order because the dispatcher only ever
    // pops the in-flight head.
    backend.set_chunk_delay(&chunk(10), Duration::from_millis(50));

    let (tx, rx) = crossbeam_channel::unbounded();
    for byte in [10u8, 11, 12] {
        let tx = tx.clone();
        dispatcher.read_with_callback(chunk(byte), ReadOptions::whole_chunk(), move |result| {
            tx.send(result.ok().unwrap()[0]).unwrap();
        });
    }

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(rx.recv_timeout(Duration::from_secs(5))?);
    }
    assert_eq!(order, vec![b'a', b'b', b'c']);
    Ok(())
}

#[test]
fn batch_completion_is_fifo_even_with_a_slow_head() -> Result<()> {
    let (dispatcher, backend) = dispatcher_with(&[
        (20, vec![1]),
        (21, vec![2]),
        (22, vec![3]),
    ])?;
    backend.set_chunk_delay(&chunk(20), Duration::from_millis(100));

    let batch = dispatcher.new_batch();
    let first = batch.read(chunk(20), ReadOptions::whole_chunk())?;
    let second = batch.read(chunk(21), ReadOptions::whole_chunk())?;
    let third = batch.read(chunk(22), ReadOptions::whole_chunk())?;
    batch.issue()?;

    // While the head is stalled, the later requests must not surface as
    // completed, even though the backend has already finished them.
    std::thread::sleep(Duration::from_millis(30));
    assert!(!first.status().is_completed());
    assert!(!second.status().is_completed());
    assert!(!third.status().is_completed());

    batch.wait()?;
    for request in [&first, &second, &third] {
        assert!(request.is_ok());
    }
    assert_eq!(&*first.get_result().ok().unwrap(), &[1]);
    assert_eq!(&*second.get_result().ok().unwrap(), &[2]);
    assert_eq!(&*third.get_result().ok().unwrap(), &[3]);

    dispatcher.free_batch(batch)?;
    Ok(())
}

#[test]
fn wait_blocks_until_the_slowest_request_completes() -> Result<()> {
    let chunks: Vec<(u8, Vec<u8>)> = (0..100).map(|i| (i, vec![i])).collect();
    let (dispatcher, backend) = dispatcher_with(&chunks)?;
    backend.set_chunk_delay(&chunk(50), Duration::from_millis(100));

    let batch = dispatcher.new_batch();
    let mut requests = Vec::new();
    for i in 0..100u8 {
        requests.push(batch.read(chunk(i), ReadOptions::whole_chunk())?);
    }
    batch.issue()?;

    let started = Instant::now();
    batch.wait()?;
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "wait returned before the delayed request could have completed"
    );
    for request in &requests {
        assert!(request.status().is_completed());
        assert!(request.is_ok());
    }

    dispatcher.free_batch(batch)?;
    Ok(())
}

#[test]
fn accessors_are_idempotent_after_completion() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(4, vec![9, 9])])?;

    let batch = dispatcher.new_batch();
    let request = batch.read(chunk(4), ReadOptions::whole_chunk())?;
    batch.issue()?;
    batch.wait()?;

    let first_status = request.status();
    let first_result = request.get_result();
    for _ in 0..3 {
        assert_eq!(request.status(), first_status);
        assert_eq!(request.get_result(), first_result);
        assert_eq!(request.chunk_id(), chunk(4));
    }
    assert_eq!(first_status, IoStatus::Ok);

    dispatcher.free_batch(batch)?;
    Ok(())
}

#[test]
fn for_each_request_visits_in_submission_order_and_can_stop() -> Result<()> {
    let (dispatcher, _backend) =
        dispatcher_with(&[(30, vec![0]), (31, vec![0]), (32, vec![0])])?;

    let batch = dispatcher.new_batch();
    for byte in [30u8, 31, 32] {
        batch.read(chunk(byte), ReadOptions::whole_chunk())?;
    }
    batch.issue()?;
    batch.wait()?;

    let mut visited = Vec::new();
    batch.for_each_request(|request| {
        visited.push(request.chunk_id());
        visited.len() < 2
    })?;
    assert_eq!(visited, vec![chunk(30), chunk(31)]);

    dispatcher.free_batch(batch)?;
    Ok(())
}

#[test]
fn concurrent_submissions_all_complete() -> Result<()> {
    let chunks: Vec<(u8, Vec<u8>)> = (0..8).map(|i| (i, vec![i; 16])).collect();
    let (dispatcher, _backend) = dispatcher_with(&chunks)?;
    let dispatcher = Arc::new(dispatcher);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut handles = Vec::new();
    for thread_index in 0..8u8 {
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..25 {
                let tx = tx.clone();
                dispatcher.read_with_callback(
                    chunk(thread_index),
                    ReadOptions::whole_chunk(),
                    move |result| tx.send(result.status()).unwrap(),
                );
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for _ in 0..200 {
        assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, IoStatus::Ok);
    }
    Ok(())
}

#[test]
fn freeing_a_batch_reclaims_its_requests() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(5, vec![1])])?;

    let batch = dispatcher.new_batch();
    let request = batch.read(chunk(5), ReadOptions::whole_chunk())?;
    batch.issue()?;
    batch.wait()?;

    assert_eq!(dispatcher.live_request_count(), 1);
    assert_eq!(dispatcher.live_batch_count(), 1);

    dispatcher.free_batch(batch)?;
    assert_eq!(dispatcher.live_request_count(), 0);
    assert_eq!(dispatcher.live_batch_count(), 0);

    // The request handle outlives the batch but fails safely.
    assert_eq!(request.status(), IoStatus::Unknown);
    assert_eq!(request.chunk_id(), ChunkId::INVALID);
    assert!(!request.get_result().is_ok());

    dispatcher.trim_pools();
    Ok(())
}

#[test]
fn freeing_an_unissued_batch_reclaims_its_requests() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(40, vec![1])])?;

    // These requests never enter the waiting queue, so only free_batch can
    // reclaim them.
    let batch = dispatcher.new_batch();
    for _ in 0..3 {
        batch.read(chunk(40), ReadOptions::whole_chunk())?;
    }
    assert_eq!(dispatcher.live_request_count(), 3);

    dispatcher.free_batch(batch)?;
    assert_eq!(
        dispatcher.live_request_count(),
        0,
        "unissued batch requests were leaked"
    );
    assert_eq!(dispatcher.live_batch_count(), 0);
    Ok(())
}

#[test]
fn failed_block_fails_the_request_without_exposing_data() -> Result<()> {
    let (dispatcher, backend) = dispatcher_with(&[
        (41, vec![1, 2, 3, 4]),
        (42, vec![5, 6, 7, 8]),
    ])?;
    backend.set_chunk_failure(&chunk(41), IoStatus::ReadError);
    backend.set_chunk_failure(&chunk(42), IoStatus::CorruptData);

    // Callback path.
    let (tx, rx) = crossbeam_channel::bounded(1);
    dispatcher.read_with_callback(chunk(41), ReadOptions::whole_chunk(), move |result| {
        tx.send(result).unwrap();
    });
    let result = rx.recv_timeout(Duration::from_secs(5))?;
    assert!(!result.is_ok());
    assert_eq!(result.status(), IoStatus::ReadError);
    assert!(result.value().is_none(), "a failed read must carry no bytes");

    // Accessor path.
    let batch = dispatcher.new_batch();
    let request = batch.read(chunk(42), ReadOptions::whole_chunk())?;
    batch.issue()?;
    batch.wait()?;
    assert_eq!(request.status(), IoStatus::CorruptData);
    assert!(!request.is_ok());
    assert!(!request.get_result().is_ok());

    dispatcher.free_batch(batch)?;
    Ok(())
}

#[test]
fn standalone_requests_are_freed_after_their_callback() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(6, vec![1])])?;

    let (tx, rx) = crossbeam_channel::bounded(1);
    dispatcher.read_with_callback(chunk(6), ReadOptions::whole_chunk(), move |result| {
        tx.send(result.status()).unwrap();
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(5))?, IoStatus::Ok);

    // The worker frees standalone requests once the callback has run.
    let deadline = Instant::now() + Duration::from_secs(1);
    while dispatcher.live_request_count() != 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(dispatcher.live_request_count(), 0);
    Ok(())
}

#[test]
fn batch_misuse_is_rejected() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(7, vec![1])])?;

    let batch = dispatcher.new_batch();
    assert_eq!(batch.wait(), Err(DispatchError::BatchNotIssued));

    batch.read(chunk(7), ReadOptions::whole_chunk())?;
    batch.issue()?;
    assert_eq!(
        batch.read(chunk(7), ReadOptions::whole_chunk()).err(),
        Some(DispatchError::BatchAlreadyIssued)
    );
    assert_eq!(batch.issue(), Err(DispatchError::BatchAlreadyIssued));
    assert_eq!(batch.cancel(), Err(DispatchError::Unimplemented));

    batch.wait()?;
    dispatcher.free_batch(batch)?;
    Ok(())
}

#[test]
fn queries_pass_through_to_the_backend() -> Result<()> {
    let (dispatcher, _backend) = dispatcher_with(&[(8, vec![0; 64])])?;

    assert_eq!(
        dispatcher.mount(&MountEnvironment::new("/packs/base", 0)),
        IoStatus::Ok
    );
    assert!(dispatcher.does_chunk_exist(&chunk(8)));
    assert!(!dispatcher.does_chunk_exist(&chunk(9)));
    assert_eq!(dispatcher.get_size_for_chunk(&chunk(8)).ok(), Some(64));
    assert_eq!(
        dispatcher.get_size_for_chunk(&chunk(9)).status(),
        IoStatus::NotFound
    );
    Ok(())
}
