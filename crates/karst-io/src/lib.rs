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

//! # Karst I/O
//!
//! An asynchronous, chunk-addressed I/O dispatcher.
//!
//! Reads are identified by opaque [`karst_core::ChunkId`]s, resolved against
//! a [`karst_core::ChunkBackend`], and executed behind a single dedicated
//! worker thread. Callers on any thread submit standalone callback reads or
//! build [`ReadBatch`]es that complete FIFO and can be waited on as a unit.
//!
//! ```no_run
//! use std::sync::Arc;
//! use karst_core::{ChunkId, ReadOptions};
//! use karst_io::{backend::MemoryBackend, ChunkDispatcher};
//!
//! # fn main() -> anyhow::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! backend.insert_chunk(ChunkId::from_bytes([1; 12]), vec![1, 2, 3, 4]);
//!
//! let dispatcher = ChunkDispatcher::new(backend)?;
//! dispatcher.read_with_callback(
//!     ChunkId::from_bytes([1; 12]),
//!     ReadOptions::whole_chunk(),
//!     |result| println!("read finished: {:?}", result.status()),
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
mod dispatcher;
mod error;
mod event;
pub mod pool;
mod request;

pub use dispatcher::{ChunkDispatcher, ReadBatch, ReadRequest};
pub use error::{DispatchError, DispatchResult};
